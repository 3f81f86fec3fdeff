//! Controller → interpolator → data chains, in both directions.

use bevy::log::{debug, info, warn};
use bevy::math::{Quat, Vec3};

use super::merge::{
    Channel, Extrapolation, Interpolation, KeyframeTrack, Rotation, RotationSamples, Sample,
    merge_channels,
};
use crate::nif::config::{NifSettings, QuaternionKeyType};
use crate::nif::error::{BlockContext, NifError, NifWarning, Result};
use crate::nif::registry::{BlockRef, BlockRegistry};
use crate::nif::types::{
    Block, Controller, Interpolator, Key, KeyGroup, KeyQuaternion, KeyType, KeyframeDataKind,
    NiKeyframeController, NiKeyframeData, NiTimeController, NiTransform,
    NiTransformInterpolator, RecordLink, RotationKeys,
};
use crate::nif::version::NifVersion;

/// Interpolator translations below this are the "unset" sentinel some games write.
const INVALID_TRANSLATION: f32 = -1.0e6;

/// Converts the keys of one data block into a merged track.
pub fn track_from_data(data: &NiKeyframeData, at: &BlockContext) -> Result<KeyframeTrack> {
    let scale = channel_from_group(&data.scales);
    let translation = channel_from_group(&data.translations);
    let rotation = match &data.rotations {
        RotationKeys::None => RotationSamples::default(),
        RotationKeys::Quaternion { key_type, keys } => RotationSamples {
            quaternions: Channel::new(
                Interpolation::from_key_type(*key_type),
                keys.iter().map(|k| Sample::new(k.time, k.value)).collect(),
            ),
            ..Default::default()
        },
        RotationKeys::Euler { axes, .. } => RotationSamples {
            euler: axes.each_ref().map(channel_from_group),
            ..Default::default()
        },
    };
    merge_channels(scale, rotation, translation, at)
}

fn channel_from_group<T: Copy>(group: &KeyGroup<T>) -> Channel<T> {
    Channel::new(
        Interpolation::from_key_type(group.interpolation),
        group
            .keys
            .iter()
            .map(|k| Sample::new(k.time, k.value))
            .collect(),
    )
}

fn group_from_channel<T: Copy>(channel: &Channel<T>) -> KeyGroup<T> {
    KeyGroup::new(
        channel.interpolation.key_type(),
        channel
            .samples
            .iter()
            .map(|s| Key::linear(s.time, s.value))
            .collect(),
    )
}

/// Data block for a track whose times are already in seconds.
pub fn data_from_track(
    track: &KeyframeTrack,
    kind: KeyframeDataKind,
    quaternion_keys: QuaternionKeyType,
) -> NiKeyframeData {
    let rotations = match &track.rotation {
        Rotation::None => RotationKeys::None,
        Rotation::Quaternion(channel) => RotationKeys::Quaternion {
            key_type: match (channel.interpolation, quaternion_keys) {
                (Interpolation::Constant, _) => KeyType::Const,
                (_, QuaternionKeyType::Quadratic) => KeyType::Quadratic,
                (_, QuaternionKeyType::Linear) => KeyType::Linear,
            },
            keys: channel
                .samples
                .iter()
                .map(|s| KeyQuaternion {
                    time: s.time,
                    value: s.value,
                    tbc: None,
                })
                .collect(),
        },
        Rotation::Euler(channel) => {
            let axis = |pick: fn(Vec3) -> f32| {
                Channel::new(
                    channel.interpolation,
                    channel
                        .samples
                        .iter()
                        .map(|s| Sample::new(s.time, pick(s.value)))
                        .collect(),
                )
            };
            RotationKeys::Euler {
                order: 0.0,
                axes: [
                    group_from_channel(&axis(|v| v.x)),
                    group_from_channel(&axis(|v| v.y)),
                    group_from_channel(&axis(|v| v.z)),
                ],
            }
        }
    };
    NiKeyframeData {
        kind,
        rotations,
        translations: group_from_channel(&track.translation),
        scales: group_from_channel(&track.scale),
    }
}

/// Reads the track a controller drives.
///
/// New files go controller → interpolator → data, old ones controller →
/// data. An interpolator without data yields a one-key track from its
/// static value. Returns `None` for blocks that are not keyframe controllers.
pub fn import_chain(
    blocks: &BlockRegistry,
    controller: BlockRef,
    warnings: &mut Vec<NifWarning>,
) -> Result<Option<KeyframeTrack>> {
    let Some(Block::Controller(c)) = blocks.resolve(controller) else {
        return Ok(None);
    };
    let at = blocks.context(controller);
    let c = c.keyframe();
    let extrapolation = Extrapolation::from_flags(c.flags, &at, warnings);

    let mut track = match c.interpolator.block().and_then(|k| blocks.resolve(k)) {
        Some(Block::Interpolator(Interpolator::Transform(interpolator))) => {
            match keyframe_data(blocks, interpolator.data)? {
                Some(track) => track,
                None => static_track(interpolator, &at),
            }
        }
        _ => keyframe_data(blocks, c.data)?.unwrap_or_default(),
    };
    track.extrapolation = extrapolation;
    debug!("{at}: {} keys", track.key_count());
    Ok(Some(track))
}

fn keyframe_data(blocks: &BlockRegistry, link: RecordLink) -> Result<Option<KeyframeTrack>> {
    let Some(key) = link.block() else {
        return Ok(None);
    };
    match blocks.resolve(key) {
        Some(Block::KeyframeData(data)) => track_from_data(data, &blocks.context(key)).map(Some),
        _ => Ok(None),
    }
}

/// One key at time zero; scale in interpolators is not trusted.
fn static_track(interpolator: &NiTransformInterpolator, at: &BlockContext) -> KeyframeTrack {
    let mut track = KeyframeTrack {
        rotation: Rotation::Quaternion(Channel::linear([(0.0, interpolator.rotation)])),
        ..Default::default()
    };
    if interpolator.translation.x < INVALID_TRANSLATION {
        warn!("{at}: ignored unset interpolator translation");
    } else {
        track.translation = Channel::linear([(0.0, interpolator.translation)]);
    }
    track
}

/// Builds controller chains for export.
#[derive(Debug, Clone, Copy)]
pub struct ChainBuilder {
    pub version: NifVersion,
    pub fps: f32,
    pub quaternion_keys: QuaternionKeyType,
}

impl ChainBuilder {
    pub fn new(version: NifVersion, fps: f32, quaternion_keys: QuaternionKeyType) -> Self {
        Self {
            version,
            fps,
            quaternion_keys,
        }
    }

    pub fn from_settings(settings: &NifSettings, fps: f32) -> Self {
        Self::new(settings.version(), fps, settings.quaternion_keys)
    }

    /// Creates the chain for `target` and appends it to the target's controllers.
    ///
    /// `track` is keyed in frames. `rest` seeds the interpolator on files
    /// that have one. Returns the controller.
    pub fn build(
        &self,
        blocks: &mut BlockRegistry,
        target: BlockRef,
        track: &KeyframeTrack,
        rest: &NiTransform,
        owner: &str,
    ) -> Result<BlockRef> {
        if self.fps <= 0.0 {
            return Err(NifError::invalid(
                blocks.context(target),
                format!("frame rate {} is not positive", self.fps),
            ));
        }
        let track = track.clone().retimed(1.0 / self.fps);
        let (start_time, stop_time) = track.time_span().unwrap_or((0.0, 0.0));
        let base = NiTimeController {
            flags: track.extrapolation.to_flags(),
            frequency: 1.0,
            phase: 0.0,
            start_time,
            stop_time,
            target: target.into(),
            ..Default::default()
        };

        let controller = if self.version >= NifVersion::V10_2_0_0 {
            let controller = blocks.register(
                Block::Controller(Controller::Transform(NiKeyframeController {
                    base,
                    ..Default::default()
                })),
                Some(owner),
            );
            let mut interpolator = NiTransformInterpolator {
                translation: rest.translation,
                rotation: rest.rotation.to_quat(),
                scale: rest.scale,
                ..Default::default()
            };
            if track.is_static() {
                if let Some(t) = track.translation.samples.first() {
                    interpolator.translation = t.value;
                }
                if let Some(r) = track.rotation.value_at(start_time) {
                    interpolator.rotation = r;
                }
                interpolator.scale = 1.0;
            }
            let data = (!track.is_static()).then(|| {
                blocks.register(
                    Block::KeyframeData(data_from_track(
                        &track,
                        KeyframeDataKind::Transform,
                        self.quaternion_keys,
                    )),
                    Some(owner),
                )
            });
            interpolator.data = data.into();
            let interpolator = blocks.register(
                Block::Interpolator(Interpolator::Transform(interpolator)),
                Some(owner),
            );
            if let Some(Block::Controller(c)) = blocks.resolve_mut(controller) {
                c.keyframe_mut().interpolator = interpolator.into();
            }
            controller
        } else {
            let data = blocks.register(
                Block::KeyframeData(data_from_track(
                    &track,
                    KeyframeDataKind::Keyframe,
                    self.quaternion_keys,
                )),
                Some(owner),
            );
            blocks.register(
                Block::Controller(Controller::Keyframe(NiKeyframeController {
                    base,
                    data: data.into(),
                    ..Default::default()
                })),
                Some(owner),
            )
        };
        attach_controller(blocks, target, controller)?;
        info!(
            "{}: {} keys from {start_time:.3}s to {stop_time:.3}s",
            blocks.context(controller),
            track.key_count()
        );
        Ok(controller)
    }
}

/// Appends `controller` to the end of the controller list of `target`.
pub fn attach_controller(
    blocks: &mut BlockRegistry,
    target: BlockRef,
    controller: BlockRef,
) -> Result<()> {
    let head = match blocks.resolve(target).and_then(Block::net) {
        Some(net) => net.controller_link,
        None => {
            return Err(NifError::invalid(
                blocks.context(target),
                "cannot hold controllers",
            ));
        }
    };
    let Some(mut last) = head.block() else {
        if let Some(net) = blocks.resolve_mut(target).and_then(Block::net_mut) {
            net.controller_link = controller.into();
        }
        return Ok(());
    };
    let mut steps = 0;
    while let Some(Block::Controller(c)) = blocks.resolve(last) {
        match c.keyframe().next_controller.block() {
            Some(next) if steps < blocks.len() => {
                last = next;
                steps += 1;
            }
            _ => break,
        }
    }
    if let Some(Block::Controller(c)) = blocks.resolve_mut(last) {
        c.keyframe_mut().next_controller = controller.into();
    }
    Ok(())
}

/// Controllers of a block in list order.
pub fn controllers_of(blocks: &BlockRegistry, key: BlockRef) -> Vec<BlockRef> {
    let mut out = Vec::new();
    let mut link = blocks
        .resolve(key)
        .and_then(Block::net)
        .map_or(RecordLink::Null, |net| net.controller_link);
    while let Some(next) = link.block() {
        if out.contains(&next) {
            break;
        }
        let Some(Block::Controller(c)) = blocks.resolve(next) else {
            break;
        };
        out.push(next);
        link = c.keyframe().next_controller;
    }
    out
}

/// Frames per second the key times fit best, preferring 30 on ties.
pub fn detect_fps(times: &[f32]) -> f32 {
    const CANDIDATES: [f32; 5] = [30.0, 20.0, 24.0, 25.0, 35.0];
    if times.is_empty() {
        return 30.0;
    }
    let error = |fps: f32| -> f32 {
        times
            .iter()
            .map(|t| {
                let frames = t * fps;
                ((frames + 0.5).floor() - frames).abs()
            })
            .sum()
    };
    let mut best = (CANDIDATES[0], error(CANDIDATES[0]));
    for fps in &CANDIDATES[1..] {
        let e = error(*fps);
        if e < best.1 {
            best = (*fps, e);
        }
    }
    info!("Animation estimated at {} frames per second", best.0);
    best.0
}

/// Every key time stored in the file's keyframe data blocks.
pub fn key_times(blocks: &BlockRegistry) -> Vec<f32> {
    let mut times = Vec::new();
    for (_, block) in blocks.iter() {
        let Block::KeyframeData(data) = block else {
            continue;
        };
        times.extend(data.translations.keys.iter().map(|k| k.time));
        times.extend(data.scales.keys.iter().map(|k| k.time));
        match &data.rotations {
            RotationKeys::None => {}
            RotationKeys::Quaternion { keys, .. } => times.extend(keys.iter().map(|k| k.time)),
            RotationKeys::Euler { axes, .. } => {
                times.extend(axes.iter().flat_map(|a| a.keys.iter().map(|k| k.time)))
            }
        }
    }
    times
}

/// Quaternion of the rest rotation, for callers that key rotations relative to it.
pub fn rest_quat(rest: &NiTransform) -> Quat {
    rest.rotation.to_quat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::types::{ControllerFlags, Matrix3x3, NiNode};
    use approx::assert_relative_eq;

    fn moving_track() -> KeyframeTrack {
        KeyframeTrack {
            translation: Channel::linear([
                (0.0, Vec3::ZERO),
                (30.0, Vec3::new(0.0, 0.0, 3.0)),
            ]),
            rotation: Rotation::Quaternion(Channel::linear([
                (0.0, Quat::IDENTITY),
                (15.0, Quat::from_rotation_z(0.5)),
                (30.0, Quat::from_rotation_z(1.0)),
            ])),
            extrapolation: Extrapolation::Cyclic,
            ..Default::default()
        }
    }

    fn target(blocks: &mut BlockRegistry) -> BlockRef {
        blocks.register(Block::Node(NiNode::named("Bip01 Head")), None)
    }

    #[test]
    fn new_versions_build_interpolator_chain() {
        let mut blocks = BlockRegistry::new();
        let node = target(&mut blocks);
        let builder = ChainBuilder::new(NifVersion::V20_0_0_5, 30.0, QuaternionKeyType::Quadratic);
        let controller = builder
            .build(&mut blocks, node, &moving_track(), &NiTransform::default(), "Head")
            .unwrap();
        let Some(Block::Controller(Controller::Transform(c))) = blocks.resolve(controller) else {
            panic!("expected a transform controller");
        };
        assert_eq!(c.flags, ControllerFlags::ACTIVE);
        assert_relative_eq!(c.stop_time, 1.0);
        assert_eq!(c.target, RecordLink::Block(node));
        let Some(Block::Interpolator(Interpolator::Transform(i))) =
            c.interpolator.block().and_then(|k| blocks.resolve(k))
        else {
            panic!("expected an interpolator");
        };
        let Some(Block::KeyframeData(data)) = i.data.block().and_then(|k| blocks.resolve(k))
        else {
            panic!("expected data");
        };
        assert_eq!(data.kind, KeyframeDataKind::Transform);
        assert_relative_eq!(data.translations.keys[1].time, 1.0);
        assert!(matches!(
            &data.rotations,
            RotationKeys::Quaternion { key_type: KeyType::Quadratic, keys } if keys.len() == 3
        ));
        assert_eq!(controllers_of(&blocks, node), vec![controller]);
    }

    #[test]
    fn static_track_sets_interpolator_only() {
        let mut blocks = BlockRegistry::new();
        let node = target(&mut blocks);
        let track = KeyframeTrack {
            translation: Channel::linear([(0.0, Vec3::new(1.0, 2.0, 3.0))]),
            ..Default::default()
        };
        let builder = ChainBuilder::new(NifVersion::V20_2_0_7, 30.0, QuaternionKeyType::Linear);
        let controller = builder
            .build(&mut blocks, node, &track, &NiTransform::default(), "Head")
            .unwrap();
        assert!(!blocks.iter().any(|(_, b)| matches!(b, Block::KeyframeData(_))));
        let mut warnings = Vec::new();
        let back = import_chain(&blocks, controller, &mut warnings).unwrap().unwrap();
        assert_eq!(back.translation.samples[0].value, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(back.key_count(), 1);
        assert!(warnings.is_empty());
    }

    #[test]
    fn old_versions_write_data_on_controller() {
        let mut blocks = BlockRegistry::new();
        let node = target(&mut blocks);
        let track = KeyframeTrack {
            scale: Channel::linear([(0.0, 2.0)]),
            ..Default::default()
        };
        let builder = ChainBuilder::new(NifVersion::V4_0_0_2, 25.0, QuaternionKeyType::Quadratic);
        let first = builder
            .build(&mut blocks, node, &track, &NiTransform::default(), "Head")
            .unwrap();
        let second = builder
            .build(&mut blocks, node, &moving_track(), &NiTransform::default(), "Head")
            .unwrap();
        let Some(Block::Controller(Controller::Keyframe(c))) = blocks.resolve(first) else {
            panic!("expected a keyframe controller");
        };
        assert_eq!(c.interpolator, RecordLink::Null);
        let Some(Block::KeyframeData(data)) = c.data.block().and_then(|k| blocks.resolve(k)) else {
            panic!("expected data");
        };
        assert_eq!(data.kind, KeyframeDataKind::Keyframe);
        assert_eq!(data.scales.keys.len(), 1);
        assert_eq!(controllers_of(&blocks, node), vec![first, second]);
    }

    #[test]
    fn chain_import_reads_back_export() {
        let mut blocks = BlockRegistry::new();
        let node = target(&mut blocks);
        let builder = ChainBuilder::new(NifVersion::V10_0_1_0, 30.0, QuaternionKeyType::Linear);
        let controller = builder
            .build(&mut blocks, node, &moving_track(), &NiTransform::default(), "Head")
            .unwrap();
        let mut warnings = Vec::new();
        let track = import_chain(&blocks, controller, &mut warnings)
            .unwrap()
            .unwrap();
        assert_eq!(track.extrapolation, Extrapolation::Cyclic);
        assert_eq!(track.key_count(), 3);
        assert_eq!(track.time_span(), Some((0.0, 1.0)));
        assert!(import_chain(&blocks, node, &mut warnings).unwrap().is_none());
    }

    #[test]
    fn unset_interpolator_translation_is_dropped() {
        let interpolator = NiTransformInterpolator {
            translation: Vec3::splat(-f32::MAX),
            rotation: Quat::from_rotation_y(0.3),
            ..Default::default()
        };
        let track = static_track(&interpolator, &BlockContext::new("NiTransformInterpolator"));
        assert!(track.translation.is_empty());
        assert_eq!(track.rotation.len(), 1);
    }

    #[test]
    fn fps_detection_picks_best_fit() {
        assert_eq!(detect_fps(&[]), 30.0);
        assert_eq!(detect_fps(&[0.0, 0.04, 0.08, 0.12]), 25.0);
        assert_eq!(detect_fps(&[0.0, 0.05, 0.1]), 20.0);
        assert_eq!(detect_fps(&[0.0, 1.0, 2.0]), 30.0);
    }

    #[test]
    fn rest_values_seed_interpolator() {
        let mut blocks = BlockRegistry::new();
        let node = target(&mut blocks);
        let rest = NiTransform {
            rotation: Matrix3x3::from_quat(Quat::from_rotation_x(0.25)),
            translation: Vec3::new(0.0, 5.0, 0.0),
            scale: 1.0,
        };
        let builder = ChainBuilder::new(NifVersion::V20_0_0_4, 30.0, QuaternionKeyType::Linear);
        let controller = builder
            .build(&mut blocks, node, &KeyframeTrack::default(), &rest, "Head")
            .unwrap();
        let Some(Block::Controller(c)) = blocks.resolve(controller) else {
            panic!("expected controller");
        };
        let Some(Block::Interpolator(Interpolator::Transform(i))) =
            c.keyframe().interpolator.block().and_then(|k| blocks.resolve(k))
        else {
            panic!("expected interpolator");
        };
        assert_eq!(i.translation, Vec3::new(0.0, 5.0, 0.0));
        assert!(i.rotation.abs_diff_eq(rest_quat(&rest), 1e-5));
    }
}
