//! Host-side view of a NIF: named objects, armatures, meshes and tracks.
//!
//! [`import`] turns a decoded file into a [`SceneDescription`]; [`export`]
//! validates a description and builds a block graph from it. Names in a
//! description are scene names: unique, short, with `Bip01 Foot.L` side
//! suffixes. The full file names travel in `full_names`.

mod export;
mod import;

use std::ops::Deref;

use bevy::math::{Vec2, Vec3};

pub use export::export;
pub use import::import;

use crate::nif::config::Game;
use crate::nif::error::{BlockContext, NifWarning, Result};
use crate::nif::sidecar::FullNames;
use crate::nif::skin::VertexWeightTable;
use crate::nif::transform::ExtraMatrixTable;
use crate::nif::types::{Matrix4x4, NiTransform};
use crate::nif_animation::merge::{
    Channel, Extrapolation, KeyframeTrack, Rotation, RotationSamples, Sample, merge_channels,
};
use crate::nif_animation::text_keys::TextMarker;

/// A plain node.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub name: String,
    pub parent: Option<String>,
    /// Relative to the parent.
    pub matrix: Matrix4x4,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneBone {
    pub name: String,
    /// Index into the armature's bone list.
    pub parent: Option<usize>,
    /// Armature space, after realignment.
    pub matrix: Matrix4x4,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneArmature {
    pub name: String,
    pub parent: Option<String>,
    pub matrix: Matrix4x4,
    /// Parents before children.
    pub bones: Vec<SceneBone>,
}

impl SceneArmature {
    pub fn bone(&self, name: &str) -> Option<&SceneBone> {
        self.bones.iter().find(|b| b.name == name)
    }
}

/// Skin binding of a mesh; weight bone indices point into `bones`.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSkin {
    pub armature: String,
    pub bones: Vec<String>,
    pub weights: VertexWeightTable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneMesh {
    pub name: String,
    pub parent: Option<String>,
    pub matrix: Matrix4x4,
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub triangles: Vec<[u16; 3]>,
    pub uv_layers: Vec<Vec<Vec2>>,
    /// Layer the base texture samples.
    pub active_uv_layer: usize,
    pub skin: Option<SceneSkin>,
}

impl SceneMesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            matrix: Matrix4x4::IDENTITY,
            vertices: Vec::new(),
            normals: Vec::new(),
            triangles: Vec::new(),
            uv_layers: Vec::new(),
            active_uv_layer: 0,
            skin: None,
        }
    }
}

/// Per-object animation as the host keys it: frames, separate rotation forms.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SceneTrack {
    pub target: String,
    pub scale: Channel<f32>,
    pub rotation: RotationSamples,
    pub translation: Channel<Vec3>,
    pub extrapolation: Extrapolation,
}

impl SceneTrack {
    pub fn from_track(target: impl Into<String>, track: &KeyframeTrack) -> Self {
        let mut rotation = RotationSamples::default();
        match &track.rotation {
            Rotation::None => {}
            Rotation::Quaternion(channel) => rotation.quaternions = channel.clone(),
            Rotation::Euler(channel) => {
                for (axis, out) in rotation.euler.iter_mut().enumerate() {
                    *out = Channel::new(
                        channel.interpolation,
                        channel
                            .samples
                            .iter()
                            .map(|s| Sample::new(s.time, s.value[axis]))
                            .collect(),
                    );
                }
            }
        }
        Self {
            target: target.into(),
            scale: track.scale.clone(),
            rotation,
            translation: track.translation.clone(),
            extrapolation: track.extrapolation,
        }
    }

    /// One track with a single rotation form.
    pub fn merged(&self) -> Result<KeyframeTrack> {
        let at = BlockContext::new("track").named(self.target.as_str());
        let mut track = merge_channels(
            self.scale.clone(),
            self.rotation.clone(),
            self.translation.clone(),
            &at,
        )?;
        track.extrapolation = self.extrapolation;
        Ok(track)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneDescription {
    pub objects: Vec<SceneObject>,
    pub armatures: Vec<SceneArmature>,
    pub meshes: Vec<SceneMesh>,
    pub tracks: Vec<SceneTrack>,
    pub markers: Vec<TextMarker>,
    pub fps: f32,
    /// Scene bone = extra * file bone, per bone name.
    pub extra_matrices: ExtraMatrixTable,
    pub full_names: FullNames,
}

impl Default for SceneDescription {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            armatures: Vec::new(),
            meshes: Vec::new(),
            tracks: Vec::new(),
            markers: Vec::new(),
            fps: 30.0,
            extra_matrices: ExtraMatrixTable::new(),
            full_names: FullNames::new(),
        }
    }
}

impl SceneDescription {
    pub fn armature_of_bone(&self, bone: &str) -> Option<&SceneArmature> {
        self.armatures.iter().find(|a| a.bone(bone).is_some())
    }

    pub fn track(&self, target: &str) -> Option<&SceneTrack> {
        self.tracks.iter().find(|t| t.target == target)
    }
}

/// Result of an import, with everything recoverable that went wrong.
#[derive(Debug, Clone)]
pub struct ImportedScene {
    pub scene: SceneDescription,
    pub game: Option<Game>,
    pub warnings: Vec<NifWarning>,
}

impl Deref for ImportedScene {
    type Target = SceneDescription;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.scene
    }
}

/// Rewrites every key through `convert`, keyed on the union of key times.
///
/// `convert` sees the full transform at each time, with `rest` filling
/// channels that have no keys. Only channels that had keys get keys back.
fn remap_track(
    track: &KeyframeTrack,
    rest: &NiTransform,
    convert: impl Fn(&NiTransform) -> NiTransform,
) -> KeyframeTrack {
    let times = track.times();
    let converted: Vec<(f32, NiTransform)> = times
        .iter()
        .map(|t| (*t, convert(&track.sample(*t, rest))))
        .collect();
    let mut out = KeyframeTrack {
        extrapolation: track.extrapolation,
        ..Default::default()
    };
    if !track.scale.is_empty() {
        out.scale = Channel::new(
            track.scale.interpolation,
            converted.iter().map(|(t, x)| Sample::new(*t, x.scale)).collect(),
        );
    }
    if !track.rotation.is_empty() {
        out.rotation = Rotation::Quaternion(Channel::new(
            track.rotation.interpolation(),
            converted
                .iter()
                .map(|(t, x)| Sample::new(*t, x.rotation.to_quat()))
                .collect(),
        ));
    }
    if !track.translation.is_empty() {
        out.translation = Channel::new(
            track.translation.interpolation,
            converted
                .iter()
                .map(|(t, x)| Sample::new(*t, x.translation))
                .collect(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::error::NifError;
    use crate::nif::transform::{channel_from_total, import_channel};
    use crate::nif::types::Matrix3x3;
    use crate::nif_animation::merge::Interpolation;
    use bevy::math::Quat;

    #[test]
    fn track_forms_survive_the_scene_view() {
        let track = KeyframeTrack {
            rotation: Rotation::Euler(Channel::linear([
                (0.0, Vec3::ZERO),
                (10.0, Vec3::new(0.5, 0.0, 0.0)),
            ])),
            ..Default::default()
        };
        let scene = SceneTrack::from_track("Box", &track);
        assert_eq!(scene.rotation.euler[0].len(), 2);
        assert!(scene.rotation.quaternions.is_empty());
        assert_eq!(scene.merged().unwrap(), track);
    }

    #[test]
    fn overlapping_rotation_forms_are_rejected() {
        let mut scene = SceneTrack {
            target: "Box".into(),
            ..Default::default()
        };
        scene.rotation.quaternions = Channel::linear([(0.0, Quat::IDENTITY), (5.0, Quat::IDENTITY)]);
        scene.rotation.euler[2] = Channel::linear([(2.0, 0.0), (4.0, 1.0)]);
        assert!(matches!(
            scene.merged(),
            Err(NifError::ConflictingRotationRepresentation { .. })
        ));
    }

    #[test]
    fn remap_keeps_each_channel_interpolation() {
        let track = KeyframeTrack {
            translation: Channel::new(
                Interpolation::Constant,
                vec![Sample::new(0.0, Vec3::ZERO), Sample::new(10.0, Vec3::X)],
            ),
            rotation: Rotation::Euler(Channel::new(
                Interpolation::Quadratic,
                vec![Sample::new(5.0, Vec3::ZERO)],
            )),
            ..Default::default()
        };
        let out = remap_track(
            &track,
            &NiTransform::new(1.0, Matrix3x3::IDENTITY, Vec3::ZERO),
            |total| *total,
        );
        assert_eq!(out.translation.interpolation, Interpolation::Constant);
        assert_eq!(out.rotation.interpolation(), Interpolation::Quadratic);
        // Stepped keys hold their value between times.
        assert_eq!(out.translation.samples[1].value, Vec3::ZERO);
    }

    #[test]
    fn remap_keys_every_present_channel() {
        let rest = NiTransform::new(1.0, Matrix3x3::IDENTITY, Vec3::new(0.0, 1.0, 0.0));
        let extra = NiTransform::new(
            1.0,
            Matrix3x3::from_quat(Quat::from_rotation_z(0.5)),
            Vec3::ZERO,
        );
        let track = KeyframeTrack {
            translation: Channel::linear([(0.0, Vec3::ZERO), (10.0, Vec3::X)]),
            rotation: Rotation::Quaternion(Channel::linear([(5.0, Quat::IDENTITY)])),
            ..Default::default()
        };
        let out = remap_track(&track, &rest, |total| {
            import_channel(&extra, &channel_from_total(total, &rest))
        });
        assert!(out.scale.is_empty());
        assert_eq!(out.translation.len(), 3);
        assert_eq!(out.rotation.len(), 3);
        let at_five = out.translation.samples[1].value;
        assert!(at_five.abs_diff_eq(
            Matrix3x3::from_quat(Quat::from_rotation_z(0.5))
                .inverse()
                .transform_vector(Vec3::new(0.5, -1.0, 0.0)),
            1e-4
        ));
    }
}
