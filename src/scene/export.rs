use std::collections::HashMap;

use bevy::log::info;

use super::{SceneDescription, SceneMesh, remap_track};
use crate::nif::codec::NifFile;
use crate::nif::config::NifSettings;
use crate::nif::error::{BlockContext, NifError, Result};
use crate::nif::registry::{BlockRef, BlockRegistry};
use crate::nif::sidecar::bone_name_for_nif;
use crate::nif::skin::build_skin_data;
use crate::nif::transform::{decompose_srt_within, export_channel, total_from_channel};
use crate::nif::types::{
    Block, BoundingSphere, ExtraData, Matrix4x4, NiGeometryData, NiNode, NiSkinInstance,
    NiTextKeyExtraData, NiTransform, NiTriShape, NiTriShapeData, RecordLink, TexCoord, Triangle,
};
use crate::nif::version::NifVersion;
use crate::nif_animation::chain::ChainBuilder;
use crate::nif_animation::merge::KeyframeTrack;
use crate::nif_animation::text_keys::export_text_keys;

/// Builds a file from a scene description.
///
/// Every transform, skin and track is checked before the first block is
/// created, so a failing export leaves nothing half built.
pub fn export(scene: &SceneDescription, settings: &NifSettings) -> Result<NifFile> {
    let plan = ExportPlan::validate(scene, settings)?;
    let mut file = NifFile::new(settings.header());
    let version = file.header.version;
    let root = plan.build(&mut file.blocks, scene, settings, version)?;
    file.roots.push(root);
    info!(
        "Exported {} blocks for NIF {}",
        file.blocks.len(),
        file.header.version
    );
    Ok(file)
}

/// A node to create, with its transform already checked.
struct PlannedNode {
    scene_name: String,
    file_name: String,
    parent: Option<String>,
    local: NiTransform,
}

struct PlannedMesh<'s> {
    mesh: &'s SceneMesh,
    file_name: String,
    local: NiTransform,
    /// Mesh space into the space of each skin bone.
    binds: Vec<NiTransform>,
}

struct PlannedTrack {
    target: String,
    /// File space, keyed in frames.
    track: KeyframeTrack,
    rest: NiTransform,
}

struct ExportPlan<'s> {
    nodes: Vec<PlannedNode>,
    meshes: Vec<PlannedMesh<'s>>,
    tracks: Vec<PlannedTrack>,
    text_keys: Option<NiTextKeyExtraData>,
}

fn srt(matrix: &Matrix4x4, settings: &NifSettings, at: BlockContext) -> Result<NiTransform> {
    decompose_srt_within(matrix, settings.scale_epsilon).map_err(|err| match err {
        NifError::NonUniformScale { scales, .. } => NifError::NonUniformScale { at, scales },
        NifError::InvalidData { reason, .. } => NifError::InvalidData { at, reason },
        other => other,
    })
}

impl<'s> ExportPlan<'s> {
    fn validate(scene: &'s SceneDescription, settings: &NifSettings) -> Result<Self> {
        let file_name = |name: &str| {
            scene
                .full_names
                .get(name)
                .cloned()
                .unwrap_or_else(|| bone_name_for_nif(name))
        };
        let node_at = |name: &str| BlockContext::new("NiNode").named(name);

        // Local transforms, parents by scene name.
        let mut locals: Vec<(String, Option<String>, Matrix4x4)> = Vec::new();
        for object in &scene.objects {
            locals.push((object.name.clone(), object.parent.clone(), object.matrix));
        }
        for armature in &scene.armatures {
            locals.push((armature.name.clone(), armature.parent.clone(), armature.matrix));
            let file_space: Vec<Matrix4x4> = armature
                .bones
                .iter()
                .map(|bone| {
                    let extra = scene.extra_matrices.get_or_identity(&bone.name);
                    extra.inverse().mul(&bone.matrix)
                })
                .collect();
            for (bone, matrix) in armature.bones.iter().zip(&file_space) {
                let parent = bone
                    .parent
                    .and_then(|p| armature.bones.get(p).zip(file_space.get(p)));
                let (parent, local) = match parent {
                    Some((parent, parent_matrix)) => {
                        (parent.name.clone(), matrix.mul(&parent_matrix.inverse()))
                    }
                    None => (armature.name.clone(), *matrix),
                };
                locals.push((bone.name.clone(), Some(parent), local));
            }
        }

        let mut nodes = Vec::with_capacity(locals.len());
        for (name, parent, matrix) in &locals {
            nodes.push(PlannedNode {
                scene_name: name.clone(),
                file_name: file_name(name),
                parent: parent.clone(),
                local: srt(matrix, settings, node_at(name))?,
            });
        }
        let index: HashMap<&str, usize> = locals
            .iter()
            .enumerate()
            .map(|(i, (name, _, _))| (name.as_str(), i))
            .collect();
        for node in &nodes {
            if let Some(parent) = &node.parent {
                if !index.contains_key(parent.as_str()) {
                    return Err(NifError::invalid(
                        node_at(&node.scene_name),
                        format!("parent '{parent}' does not exist"),
                    ));
                }
            }
        }
        let world_of = |start: Option<&str>| -> Matrix4x4 {
            let mut world = Matrix4x4::IDENTITY;
            let mut current = start;
            let mut steps = 0;
            while let Some(i) = current.and_then(|n| index.get(n).copied()) {
                world = world.mul(&locals[i].2);
                current = locals[i].1.as_deref();
                steps += 1;
                if steps > locals.len() {
                    break;
                }
            }
            world
        };
        let mut meshes = Vec::with_capacity(scene.meshes.len());
        for mesh in &scene.meshes {
            let at = BlockContext::new("NiTriShape").named(mesh.name.as_str());
            let local = srt(&mesh.matrix, settings, at.clone())?;
            if let Some(parent) = &mesh.parent {
                if !index.contains_key(parent.as_str()) {
                    return Err(NifError::invalid(at, format!("parent '{parent}' does not exist")));
                }
            }
            if let Some(skin) = &mesh.skin {
                skin.weights.validate_for_export(mesh.vertices.len(), &at)?;
                for bone in &skin.bones {
                    if !index.contains_key(bone.as_str()) {
                        return Err(NifError::invalid(
                            at,
                            format!("skin bone '{bone}' does not exist"),
                        ));
                    }
                }
                if !index.contains_key(skin.armature.as_str()) {
                    return Err(NifError::invalid(
                        at,
                        format!("skeleton root '{}' does not exist", skin.armature),
                    ));
                }
            }
            if mesh.vertices.len() > usize::from(u16::MAX) {
                return Err(NifError::invalid(at, "more than 65535 vertices"));
            }
            let world = mesh.matrix.mul(&world_of(mesh.parent.as_deref()));
            let mut binds = Vec::new();
            for bone in mesh.skin.iter().flat_map(|skin| &skin.bones) {
                let bone_world = world_of(Some(bone.as_str()));
                binds.push(srt(&world.mul(&bone_world.inverse()), settings, at.clone())?);
            }
            meshes.push(PlannedMesh {
                mesh,
                file_name: file_name(&mesh.name),
                local,
                binds,
            });
        }

        let mut tracks = Vec::with_capacity(scene.tracks.len());
        for scene_track in &scene.tracks {
            let Some(node) = nodes.iter().find(|n| n.scene_name == scene_track.target) else {
                return Err(NifError::invalid(
                    BlockContext::new("track").named(scene_track.target.as_str()),
                    "animates an object that is not exported",
                ));
            };
            let merged = scene_track.merged()?;
            let rest = node.local;
            let track = if scene.armature_of_bone(&scene_track.target).is_some() {
                let extra = scene.extra_matrices.transform_for(&scene_track.target)?;
                remap_track(&merged, &rest, |channel| {
                    total_from_channel(&export_channel(&extra, channel), &rest)
                })
            } else {
                merged
            };
            tracks.push(PlannedTrack {
                target: scene_track.target.clone(),
                track,
                rest,
            });
        }

        let text_keys = if tracks.is_empty() && scene.markers.is_empty() {
            None
        } else {
            let (first, last) = tracks
                .iter()
                .filter_map(|t| t.track.time_span())
                .fold(None, |span: Option<(f32, f32)>, (a, b)| match span {
                    Some((lo, hi)) => Some((lo.min(a), hi.max(b))),
                    None => Some((a, b)),
                })
                .map_or((0, 0), |(a, b)| (a.floor() as i32, b.ceil() as i32));
            let first = scene.markers.iter().map(|m| m.frame).fold(first, i32::min);
            let last = scene.markers.iter().map(|m| m.frame).fold(last, i32::max);
            Some(export_text_keys(&scene.markers, first, last, scene.fps)?)
        };

        Ok(ExportPlan {
            nodes,
            meshes,
            tracks,
            text_keys,
        })
    }

    fn build(
        self,
        blocks: &mut BlockRegistry,
        scene: &SceneDescription,
        settings: &NifSettings,
        version: NifVersion,
    ) -> Result<BlockRef> {
        let top_level =
            self.nodes.iter().filter(|n| n.parent.is_none()).count()
                + self.meshes.iter().filter(|m| m.mesh.parent.is_none()).count();
        let single_root = top_level == 1 && self.nodes.iter().any(|n| n.parent.is_none());
        let scene_root = if single_root {
            None
        } else {
            Some(blocks.register(Block::Node(NiNode::named("Scene Root")), Some("Scene Root")))
        };

        let mut keys: HashMap<&str, BlockRef> = HashMap::new();
        for node in &self.nodes {
            let mut block = NiNode::named(node.file_name.as_str());
            block.av_base.transform = node.local;
            let key = blocks.register(Block::Node(block), Some(node.scene_name.as_str()));
            keys.insert(node.scene_name.as_str(), key);
        }
        let root = match scene_root {
            Some(root) => root,
            None => self
                .nodes
                .iter()
                .find(|n| n.parent.is_none())
                .and_then(|n| keys.get(n.scene_name.as_str()).copied())
                .ok_or_else(|| NifError::invalid(BlockContext::new("NiNode"), "no root node"))?,
        };
        for node in &self.nodes {
            let Some(child) = keys.get(node.scene_name.as_str()).copied() else {
                continue;
            };
            let parent = match &node.parent {
                Some(parent) => keys.get(parent.as_str()).copied(),
                None if child != root => Some(root),
                None => None,
            };
            if let Some(parent) = parent {
                add_child(blocks, parent, child);
            }
        }

        for planned in &self.meshes {
            let shape = Self::build_mesh(blocks, planned, &keys)?;
            let parent = planned
                .mesh
                .parent
                .as_deref()
                .and_then(|p| keys.get(p).copied())
                .unwrap_or(root);
            add_child(blocks, parent, shape);
        }

        let chains = ChainBuilder::from_settings(settings, scene.fps);
        for planned in &self.tracks {
            let Some(target) = keys.get(planned.target.as_str()).copied() else {
                continue;
            };
            chains.build(blocks, target, &planned.track, &planned.rest, &planned.target)?;
        }

        if let Some(text_keys) = self.text_keys {
            let extra = blocks.register(Block::ExtraData(ExtraData::TextKeys(text_keys)), None);
            if let Some(net) = blocks.resolve_mut(root).and_then(Block::net_mut) {
                if version <= NifVersion::V4_2_2_0 {
                    net.extra_data_link = extra.into();
                } else {
                    net.extra_data_list.push(extra.into());
                }
            }
        }
        Ok(root)
    }

    fn build_mesh(
        blocks: &mut BlockRegistry,
        planned: &PlannedMesh,
        keys: &HashMap<&str, BlockRef>,
    ) -> Result<BlockRef> {
        let mesh = planned.mesh;
        let at = BlockContext::new("NiTriShape").named(planned.file_name.as_str());
        let mut shape = NiTriShape::named(planned.file_name.as_str());
        shape.av_base.transform = planned.local;
        let shape_key = blocks.register(Block::TriShape(shape), Some(mesh.name.as_str()));

        let data = NiTriShapeData {
            geom_base: NiGeometryData {
                vertices: mesh.vertices.clone(),
                normals: mesh.normals.clone(),
                bounding_sphere: bounding_sphere(&mesh.vertices),
                uv_sets: mesh
                    .uv_layers
                    .iter()
                    .map(|layer| layer.iter().map(|uv| TexCoord { u: uv.x, v: uv.y }).collect())
                    .collect(),
                ..Default::default()
            },
            triangles: mesh
                .triangles
                .iter()
                .map(|[v1, v2, v3]| Triangle {
                    v1: *v1,
                    v2: *v2,
                    v3: *v3,
                })
                .collect(),
            ..Default::default()
        };
        let data_key = blocks.register(Block::TriShapeData(data), Some(mesh.name.as_str()));

        let mut skin_key = None;
        if let Some(skin) = &mesh.skin {
            let bone_keys: Vec<RecordLink> = skin
                .bones
                .iter()
                .map(|bone| keys.get(bone.as_str()).copied().into())
                .collect();
            let skin_data = build_skin_data(
                &skin.weights,
                &mesh.vertices,
                NiTransform::default(),
                &planned.binds,
                &at,
            )?;
            let data = blocks.register(Block::SkinData(skin_data), Some(mesh.name.as_str()));
            let instance = NiSkinInstance {
                data: data.into(),
                skeleton_root: keys.get(skin.armature.as_str()).copied().into(),
                bones: bone_keys,
                ..Default::default()
            };
            skin_key = Some(blocks.register(Block::SkinInstance(instance), Some(mesh.name.as_str())));
        }

        if let Some(Block::TriShape(shape)) = blocks.resolve_mut(shape_key) {
            shape.data_link = data_key.into();
            shape.skin_link = skin_key.into();
        }
        Ok(shape_key)
    }
}

fn add_child(blocks: &mut BlockRegistry, parent: BlockRef, child: BlockRef) {
    if let Some(Block::Node(node)) = blocks.resolve_mut(parent) {
        node.children.push(child.into());
    }
}

fn bounding_sphere(vertices: &[bevy::math::Vec3]) -> BoundingSphere {
    if vertices.is_empty() {
        return BoundingSphere::default();
    }
    let center = vertices.iter().copied().sum::<bevy::math::Vec3>() / vertices.len() as f32;
    let radius = vertices
        .iter()
        .map(|v| v.distance(center))
        .fold(0.0, f32::max);
    BoundingSphere { center, radius }
}
