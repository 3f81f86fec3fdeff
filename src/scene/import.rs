use std::collections::HashMap;

use bevy::log::{debug, info, warn};
use bevy::math::{Vec2, Vec3};
use slotmap::SecondaryMap;

use super::{
    ImportedScene, SceneArmature, SceneBone, SceneDescription, SceneMesh, SceneObject, SceneSkin,
    SceneTrack, remap_track,
};
use crate::nif::codec::NifFile;
use crate::nif::config::{Game, NifSettings};
use crate::nif::error::{NifWarning, Result};
use crate::nif::registry::BlockRef;
use crate::nif::resolver::SceneGraph;
use crate::nif::sidecar::{FullNames, UniqueNames, bone_name_for_scene};
use crate::nif::skeleton::Skeleton;
use crate::nif::skin::VertexWeightTable;
use crate::nif::transform::{
    channel_from_total, correction_for, extra_matrix, import_channel,
    realign_bone,
};
use crate::nif::types::{Block, NiTransform, NiTriShape, Property};
use crate::nif_animation::chain::{controllers_of, detect_fps, import_chain, key_times};
use crate::nif_animation::text_keys::{import_text_keys, pair_stream_helper, text_keys_of};

/// Builds the scene view of a decoded file.
///
/// Graph problems, detached skin roots, odd controller flags and bad UV
/// references are collected as warnings; only malformed data aborts.
pub fn import(file: &NifFile, settings: &NifSettings) -> Result<ImportedScene> {
    let graph = SceneGraph::new(&file.blocks, &file.roots);
    let skeleton = Skeleton::classify(
        &graph,
        settings.skeleton,
        file.header.version,
        settings.combine_shapes,
        settings.import_extra_nodes,
    );
    let mut importer = Importer {
        graph: &graph,
        skeleton: &skeleton,
        settings,
        names: SecondaryMap::new(),
        scene: SceneDescription::default(),
        warnings: graph.report.warnings.clone(),
    };
    importer.warnings.extend(skeleton.warnings.iter().cloned());
    let full_names = importer.assign_names()?;
    importer.armatures();
    importer.objects_and_meshes()?;
    if settings.animation {
        importer.animation(file)?;
    }
    importer.scene.full_names = full_names;

    let game = Game::detect(&file.header);
    info!(
        "Imported {} objects, {} armatures, {} meshes, {} tracks ({} warnings)",
        importer.scene.objects.len(),
        importer.scene.armatures.len(),
        importer.scene.meshes.len(),
        importer.scene.tracks.len(),
        importer.warnings.len()
    );
    Ok(ImportedScene {
        scene: importer.scene,
        game,
        warnings: importer.warnings,
    })
}

struct Importer<'a, 'g> {
    graph: &'a SceneGraph<'g>,
    skeleton: &'a Skeleton,
    settings: &'a NifSettings,
    names: SecondaryMap<BlockRef, String>,
    scene: SceneDescription,
    warnings: Vec<NifWarning>,
}

impl Importer<'_, '_> {
    fn assign_names(&mut self) -> Result<FullNames> {
        let mut unique = UniqueNames::new(self.settings.max_name_length);
        for key in &self.graph.report.reachable {
            let Some(block) = self.graph.block(*key) else {
                continue;
            };
            if block.av().is_none() {
                continue;
            }
            let name = unique.claim(block.name().unwrap_or_default(), block.type_name())?;
            self.names.insert(*key, name);
        }
        Ok(unique.full_names)
    }

    fn name_of(&self, key: BlockRef) -> String {
        self.names.get(key).cloned().unwrap_or_default()
    }

    fn parent_name(&self, key: BlockRef) -> Option<String> {
        self.graph
            .parent_of(key)
            .and_then(|p| self.names.get(p).cloned())
    }

    fn local(&self, key: BlockRef) -> NiTransform {
        self.graph.node_transform(key).unwrap_or_default()
    }

    fn armatures(&mut self) {
        for armature in &self.skeleton.armatures {
            let mut bones = Vec::with_capacity(armature.bones.len());
            let mut index_of: HashMap<BlockRef, usize> = HashMap::new();
            for bone in &armature.bones {
                let old = self.graph.matrix_relative_to(*bone, Some(armature.root));
                let children: Vec<Vec3> = self
                    .graph
                    .children_of(*bone)
                    .into_iter()
                    .filter(|c| self.skeleton.is_bone(*c))
                    .map(|c| self.local(c).translation)
                    .collect();
                let correction = correction_for(self.local(*bone).translation, &children);
                let new = realign_bone(self.settings.realign, &old, &correction);
                let name = self.name_of(*bone);
                self.scene
                    .extra_matrices
                    .insert(name.clone(), extra_matrix(&new, &old));

                let mut parent = self.graph.parent_of(*bone);
                while let Some(p) = parent {
                    if p == armature.root || index_of.contains_key(&p) {
                        break;
                    }
                    parent = self.graph.parent_of(p);
                }
                bones.push(SceneBone {
                    name,
                    parent: parent.and_then(|p| index_of.get(&p).copied()),
                    matrix: new,
                });
                index_of.insert(*bone, bones.len() - 1);
            }
            let armature = SceneArmature {
                name: self.name_of(armature.root),
                parent: self.parent_name(armature.root),
                matrix: self.local(armature.root).to_matrix(),
                bones,
            };
            self.scene.armatures.push(armature);
        }
    }

    fn objects_and_meshes(&mut self) -> Result<()> {
        let combine = self.settings.combine_shapes;
        let graph = self.graph;
        for key in &graph.report.reachable {
            let key = *key;
            match graph.block(key) {
                Some(Block::Node(_)) => {
                    if self.skeleton.is_bone(key) || self.skeleton.is_armature_root(key) {
                        continue;
                    }
                    let parts = self.graph.grouping_children(key, combine);
                    if parts.is_empty() {
                        let object = SceneObject {
                            name: self.name_of(key),
                            parent: self.parent_name(key),
                            matrix: self.local(key).to_matrix(),
                        };
                        self.scene.objects.push(object);
                        continue;
                    }
                    let mut mesh = SceneMesh::new(self.name_of(key));
                    mesh.parent = self.parent_name(key);
                    mesh.matrix = self.local(key).to_matrix();
                    for part in parts {
                        if let Some(Block::TriShape(shape)) = graph.block(part) {
                            let piece = self.mesh(part, shape)?;
                            append_mesh(&mut mesh, piece, &self.local(part));
                        }
                    }
                    debug!("Merged shapes into '{}'", mesh.name);
                    self.scene.meshes.push(mesh);
                }
                Some(Block::TriShape(shape)) => {
                    let grouped = self
                        .graph
                        .parent_of(key)
                        .is_some_and(|p| self.graph.grouping_children(p, combine).contains(&key));
                    if grouped {
                        continue;
                    }
                    let mut mesh = self.mesh(key, shape)?;
                    mesh.parent = self.parent_name(key);
                    mesh.matrix = self.local(key).to_matrix();
                    self.scene.meshes.push(mesh);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn mesh(&mut self, key: BlockRef, shape: &NiTriShape) -> Result<SceneMesh> {
        let mut mesh = SceneMesh::new(self.name_of(key));
        let Some(Block::TriShapeData(data)) =
            shape.data_link.block().and_then(|k| self.graph.block(k))
        else {
            warn!("{} has no geometry", self.graph.blocks.context(key));
            return Ok(mesh);
        };
        mesh.vertices = data.vertices.clone();
        mesh.normals = data.normals.clone();
        mesh.triangles = data.triangles.iter().map(|t| [t.v1, t.v2, t.v3]).collect();
        mesh.uv_layers = data
            .uv_sets
            .iter()
            .map(|set| set.iter().map(|uv| Vec2::new(uv.u, uv.v)).collect())
            .collect();
        mesh.active_uv_layer = self.uv_layer(key, shape, data.uv_sets.len());
        mesh.skin = self.skin(shape, data.num_vertices());
        Ok(mesh)
    }

    /// UV set of the base texture, or 0 when it points past the geometry's sets.
    fn uv_layer(&mut self, key: BlockRef, shape: &NiTriShape, available: usize) -> usize {
        for link in &shape.properties {
            let Some(Block::Property(Property::Texturing(texturing))) =
                link.block().and_then(|k| self.graph.block(k))
            else {
                continue;
            };
            let Some(base) = &texturing.base_texture else {
                continue;
            };
            if (base.uv_set as usize) < available.max(1) {
                return base.uv_set as usize;
            }
            let warning = NifWarning::BadUVLayerReference {
                at: self.graph.blocks.context(key),
                uv_set: base.uv_set,
                available,
            };
            warn!("{warning}");
            self.warnings.push(warning);
        }
        0
    }

    fn skin(&self, shape: &NiTriShape, vertex_count: usize) -> Option<SceneSkin> {
        let Some(Block::SkinInstance(instance)) =
            shape.skin_link.block().and_then(|k| self.graph.block(k))
        else {
            return None;
        };
        let bones = instance
            .bones
            .iter()
            .map(|l| l.block().map(|b| self.name_of(b)).unwrap_or_default())
            .collect();
        let data = match instance.data.block().and_then(|k| self.graph.block(k)) {
            Some(Block::SkinData(data)) => Some(data),
            _ => None,
        };
        let partition_link = match data {
            Some(d) if !d.skin_partition.is_null() => d.skin_partition,
            _ => instance.skin_partition,
        };
        let weights = match (data, partition_link.block().and_then(|k| self.graph.block(k))) {
            (Some(data), _) if data.has_vertex_weights => {
                VertexWeightTable::from_skin_data(vertex_count, data)
            }
            (_, Some(Block::SkinPartition(partition))) => {
                VertexWeightTable::from_partitions(vertex_count, &partition.partitions)
            }
            _ => VertexWeightTable::new(vertex_count),
        };
        Some(SceneSkin {
            armature: instance
                .skeleton_root
                .block()
                .map(|k| self.name_of(k))
                .unwrap_or_default(),
            bones,
            weights,
        })
    }

    fn animation(&mut self, file: &NifFile) -> Result<()> {
        let blocks = &file.blocks;
        let fps = match self.settings.fps {
            Some(fps) => fps,
            None => detect_fps(&key_times(blocks)),
        };
        self.scene.fps = fps;

        for key in self.graph.report.reachable.clone() {
            if self.graph.block(key).and_then(Block::av).is_none() {
                continue;
            }
            for controller in controllers_of(blocks, key) {
                let Some(track) = import_chain(blocks, controller, &mut self.warnings)? else {
                    continue;
                };
                let name = self.name_of(key);
                let track = track.retimed(fps);
                let track = if self.skeleton.is_bone(key) {
                    let rest = self.local(key);
                    let extra = self.scene.extra_matrices.transform_for(&name)?;
                    remap_track(&track, &rest, |total| {
                        import_channel(&extra, &channel_from_total(total, &rest))
                    })
                } else {
                    track
                };
                self.scene.tracks.push(SceneTrack::from_track(name, &track));
            }
        }

        for root in &file.roots {
            if matches!(blocks.resolve(*root), Some(Block::SequenceStreamHelper(_))) {
                for binding in pair_stream_helper(blocks, *root)? {
                    if let Some(track) = import_chain(blocks, binding.controller, &mut self.warnings)? {
                        self.scene.tracks.push(SceneTrack::from_track(
                            bone_name_for_scene(&binding.bone),
                            &track.retimed(fps),
                        ));
                    }
                }
            }
            if let Some(text_keys) = text_keys_of(blocks, *root) {
                self.scene
                    .markers
                    .extend(import_text_keys(&text_keys.text_keys, fps));
            }
        }
        Ok(())
    }
}

/// Appends a shape's geometry, moved by its local transform, to a merged mesh.
fn append_mesh(into: &mut SceneMesh, piece: SceneMesh, local: &NiTransform) {
    let offset = into.vertices.len();
    let Ok(offset_u16) = u16::try_from(offset) else {
        warn!("'{}' is too large to merge '{}'", into.name, piece.name);
        return;
    };
    let old_layers = into.uv_layers.len();
    if piece.uv_layers.len() > old_layers {
        into.uv_layers
            .resize(piece.uv_layers.len(), vec![Vec2::ZERO; offset]);
    }
    for (i, layer) in into.uv_layers.iter_mut().enumerate() {
        match piece.uv_layers.get(i) {
            Some(uvs) => layer.extend(uvs),
            None => layer.extend(std::iter::repeat_n(Vec2::ZERO, piece.vertices.len())),
        }
    }
    into.vertices.extend(
        piece
            .vertices
            .iter()
            .map(|v| local.rotation.transform_vector(*v * local.scale) + local.translation),
    );
    into.normals.extend(
        piece
            .normals
            .iter()
            .map(|n| local.rotation.transform_vector(*n)),
    );
    into.triangles.extend(
        piece
            .triangles
            .iter()
            .map(|t| t.map(|i| i.saturating_add(offset_u16))),
    );
    if into.active_uv_layer == 0 {
        into.active_uv_layer = piece.active_uv_layer;
    }

    let target = offset + piece.vertices.len();
    let Some(piece_skin) = piece.skin else {
        if let Some(skin) = &mut into.skin {
            skin.weights.resize(target);
        }
        return;
    };
    let skin = into.skin.get_or_insert_with(|| SceneSkin {
        armature: piece_skin.armature.clone(),
        bones: Vec::new(),
        weights: VertexWeightTable::new(offset),
    });
    skin.weights.resize(offset);
    for (vertex, influences) in piece_skin.weights.iter() {
        for (bone, weight) in influences {
            let Some(name) = piece_skin.bones.get(*bone) else {
                continue;
            };
            let index = match skin.bones.iter().position(|b| b == name) {
                Some(i) => i,
                None => {
                    skin.bones.push(name.clone());
                    skin.bones.len() - 1
                }
            };
            skin.weights.add(offset + vertex, index, *weight);
        }
    }
    skin.weights.resize(target);
}
