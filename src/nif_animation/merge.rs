//! Keyframe tracks and the rules for merging per-channel samples into them.

use std::cmp::Ordering;

use bevy::log::warn;
use bevy::math::{EulerRot, Quat, Vec3};

use crate::nif::error::{BlockContext, NifError, NifWarning, Result};
use crate::nif::transform::MATRIX_EPSILON;
use crate::nif::types::{ControllerFlags, KeyType, Matrix3x3, NiTransform};

/// How values are interpolated between keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    Constant,
    #[default]
    Linear,
    Quadratic,
}

impl Interpolation {
    pub fn from_key_type(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Linear | KeyType::XyzRotation => Interpolation::Linear,
            KeyType::Quadratic | KeyType::TBC => Interpolation::Quadratic,
            KeyType::Const => Interpolation::Constant,
            KeyType::Unknown(raw) => {
                warn!("Unknown key type {raw}, using constant interpolation");
                Interpolation::Constant
            }
        }
    }

    pub fn key_type(self) -> KeyType {
        match self {
            Interpolation::Constant => KeyType::Const,
            Interpolation::Linear => KeyType::Linear,
            Interpolation::Quadratic => KeyType::Quadratic,
        }
    }
}

/// Behavior outside the keyed time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extrapolation {
    #[default]
    Clamp,
    Cyclic,
}

impl Extrapolation {
    /// Cycle bits 0 loop, 4 clamp. Reverse and the undefined pattern fall
    /// back to clamp with a warning.
    pub fn from_flags(
        flags: ControllerFlags,
        at: &BlockContext,
        warnings: &mut Vec<NifWarning>,
    ) -> Self {
        match flags.cycle_bits() {
            0 => Extrapolation::Cyclic,
            4 => Extrapolation::Clamp,
            _ => {
                let warning = NifWarning::InconsistentCurveExtrapolation {
                    at: at.clone(),
                    flags: flags.bits(),
                };
                warn!("{warning}");
                warnings.push(warning);
                Extrapolation::Clamp
            }
        }
    }

    /// Controller flags for export: always active.
    pub fn to_flags(self) -> ControllerFlags {
        match self {
            Extrapolation::Clamp => ControllerFlags::ACTIVE | ControllerFlags::CYCLE_CLAMP,
            Extrapolation::Cyclic => ControllerFlags::ACTIVE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample<T> {
    pub time: f32,
    pub value: T,
}

impl<T> Sample<T> {
    pub fn new(time: f32, value: T) -> Self {
        Self { time, value }
    }
}

/// Time ordered samples of one animated quantity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Channel<T> {
    pub interpolation: Interpolation,
    pub samples: Vec<Sample<T>>,
}

impl<T: Copy> Channel<T> {
    pub fn new(interpolation: Interpolation, samples: Vec<Sample<T>>) -> Self {
        Self {
            interpolation,
            samples,
        }
    }

    pub fn linear(samples: impl IntoIterator<Item = (f32, T)>) -> Self {
        Self::new(
            Interpolation::Linear,
            samples.into_iter().map(|(t, v)| Sample::new(t, v)).collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn time_span(&self) -> Option<(f32, f32)> {
        let first = self.samples.first()?.time;
        let last = self.samples.last()?.time;
        Some((first.min(last), first.max(last)))
    }

    fn sort(&mut self, tie_break: impl Fn(&T, &T) -> Ordering) {
        self.samples.sort_by(|a, b| {
            a.time
                .total_cmp(&b.time)
                .then_with(|| tie_break(&a.value, &b.value))
        });
    }

    fn retime(&mut self, factor: f32) {
        for sample in &mut self.samples {
            sample.time *= factor;
        }
    }

    /// Pair of samples around `time` and the blend factor between them.
    fn bracket(&self, time: f32) -> Option<(T, T, f32)> {
        let samples = &self.samples;
        let first = samples.first()?;
        if samples.len() == 1 || time <= first.time {
            return Some((first.value, first.value, 0.0));
        }
        let last = samples[samples.len() - 1];
        if time >= last.time {
            return Some((last.value, last.value, 0.0));
        }
        let next = samples.partition_point(|s| s.time <= time);
        let (a, b) = (samples[next - 1], samples[next]);
        let span = b.time - a.time;
        let t = if span > 0.0 { (time - a.time) / span } else { 0.0 };
        match self.interpolation {
            Interpolation::Constant => Some((a.value, a.value, 0.0)),
            _ => Some((a.value, b.value, t)),
        }
    }
}

impl Channel<f32> {
    /// Value at `time`, clamped to the keyed range.
    pub fn value_at(&self, time: f32) -> Option<f32> {
        self.bracket(time).map(|(a, b, t)| a + (b - a) * t)
    }
}

impl Channel<Vec3> {
    pub fn value_at(&self, time: f32) -> Option<Vec3> {
        self.bracket(time).map(|(a, b, t)| a.lerp(b, t))
    }
}

impl Channel<Quat> {
    pub fn value_at(&self, time: f32) -> Option<Quat> {
        self.bracket(time).map(|(a, b, t)| a.slerp(b, t))
    }
}

/// Rotation of a merged track. Euler angles are radians, x y z.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Rotation {
    #[default]
    None,
    Quaternion(Channel<Quat>),
    Euler(Channel<Vec3>),
}

impl Rotation {
    pub fn len(&self) -> usize {
        match self {
            Rotation::None => 0,
            Rotation::Quaternion(c) => c.len(),
            Rotation::Euler(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn interpolation(&self) -> Interpolation {
        match self {
            Rotation::None => Interpolation::default(),
            Rotation::Quaternion(c) => c.interpolation,
            Rotation::Euler(c) => c.interpolation,
        }
    }

    pub fn value_at(&self, time: f32) -> Option<Quat> {
        match self {
            Rotation::None => None,
            Rotation::Quaternion(c) => c.value_at(time),
            Rotation::Euler(c) => c.value_at(time).map(euler_to_quat),
        }
    }

    fn times(&self) -> Vec<f32> {
        match self {
            Rotation::None => Vec::new(),
            Rotation::Quaternion(c) => c.samples.iter().map(|s| s.time).collect(),
            Rotation::Euler(c) => c.samples.iter().map(|s| s.time).collect(),
        }
    }
}

/// Rotation input to [`merge_channels`], in either representation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RotationSamples {
    pub quaternions: Channel<Quat>,
    pub euler: [Channel<f32>; 3],
}

impl RotationSamples {
    fn euler_span(&self) -> Option<(f32, f32)> {
        self.euler
            .iter()
            .filter_map(Channel::time_span)
            .reduce(|(a0, a1), (b0, b1)| (a0.min(b0), a1.max(b1)))
    }
}

/// Animation of one object: uniform scale, rotation and translation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyframeTrack {
    pub scale: Channel<f32>,
    pub rotation: Rotation,
    pub translation: Channel<Vec3>,
    pub extrapolation: Extrapolation,
}

impl KeyframeTrack {
    /// Keys in the longest channel.
    pub fn key_count(&self) -> usize {
        self.scale
            .len()
            .max(self.rotation.len())
            .max(self.translation.len())
    }

    /// Fewer than two keys: expressible as a single interpolator value.
    pub fn is_static(&self) -> bool {
        self.key_count() < 2
    }

    pub fn is_empty(&self) -> bool {
        self.key_count() == 0
    }

    /// Sorted, deduplicated key times over all channels.
    pub fn times(&self) -> Vec<f32> {
        let mut times: Vec<f32> = self
            .scale
            .samples
            .iter()
            .map(|s| s.time)
            .chain(self.rotation.times())
            .chain(self.translation.samples.iter().map(|s| s.time))
            .collect();
        sorted_union(&mut times);
        times
    }

    pub fn time_span(&self) -> Option<(f32, f32)> {
        let times = self.times();
        Some((*times.first()?, *times.last()?))
    }

    /// Multiplies every key time, e.g. by `1 / fps` to turn frames into seconds.
    pub fn retimed(mut self, factor: f32) -> Self {
        self.scale.retime(factor);
        self.translation.retime(factor);
        match &mut self.rotation {
            Rotation::None => {}
            Rotation::Quaternion(c) => c.retime(factor),
            Rotation::Euler(c) => c.retime(factor),
        }
        self
    }

    /// Transform at `time`; channels without keys keep the `rest` value.
    pub fn sample(&self, time: f32, rest: &NiTransform) -> NiTransform {
        NiTransform {
            scale: self.scale.value_at(time).unwrap_or(rest.scale),
            rotation: self
                .rotation
                .value_at(time)
                .map(Matrix3x3::from_quat)
                .unwrap_or(rest.rotation),
            translation: self.translation.value_at(time).unwrap_or(rest.translation),
        }
    }
}

/// Euler angles, x applied first, as a quaternion.
pub fn euler_to_quat(angles: Vec3) -> Quat {
    Quat::from_euler(EulerRot::ZYX, angles.z, angles.y, angles.x)
}

/// Merges separately sampled channels into one track.
///
/// Euler axes are resampled onto the union of their key times. Euler and
/// quaternion samples may share a track only when their time spans do not
/// overlap; the Euler part is then converted and merged by time.
pub fn merge_channels(
    mut scale: Channel<f32>,
    mut rotation: RotationSamples,
    mut translation: Channel<Vec3>,
    at: &BlockContext,
) -> Result<KeyframeTrack> {
    scale.sort(|a, b| a.total_cmp(b));
    translation.sort(|a, b| a.x.total_cmp(&b.x));
    rotation.quaternions.sort(|a, b| a.w.total_cmp(&b.w));
    for axis in &mut rotation.euler {
        axis.sort(|a, b| a.total_cmp(b));
    }

    let euler_span = rotation.euler_span();
    let quat_span = rotation.quaternions.time_span();
    let merged = match (quat_span, euler_span) {
        (None, None) => Rotation::None,
        (Some(_), None) => Rotation::Quaternion(rotation.quaternions),
        (None, Some(_)) => Rotation::Euler(resample_euler(&rotation.euler)),
        (Some((q0, q1)), Some((e0, e1))) => {
            if q0 <= e1 && e0 <= q1 {
                return Err(NifError::ConflictingRotationRepresentation { at: at.clone() });
            }
            let euler = resample_euler(&rotation.euler);
            let mut quats = rotation.quaternions;
            quats.samples.extend(
                euler
                    .samples
                    .iter()
                    .map(|s| Sample::new(s.time, euler_to_quat(s.value))),
            );
            quats.sort(|a, b| a.w.total_cmp(&b.w));
            Rotation::Quaternion(quats)
        }
    };

    Ok(KeyframeTrack {
        scale,
        rotation: merged,
        translation,
        extrapolation: Extrapolation::default(),
    })
}

/// Resamples the three axes on the union of their key times.
fn resample_euler(axes: &[Channel<f32>; 3]) -> Channel<Vec3> {
    let mut times: Vec<f32> = axes
        .iter()
        .flat_map(|axis| axis.samples.iter().map(|s| s.time))
        .collect();
    sorted_union(&mut times);
    let interpolation = axes
        .iter()
        .find(|axis| !axis.is_empty())
        .map_or(Interpolation::Linear, |axis| axis.interpolation);
    let samples = times
        .into_iter()
        .map(|t| {
            let [x, y, z] = axes.each_ref().map(|axis| held_value(&axis.samples, t));
            Sample::new(t, Vec3::new(x, y, z))
        })
        .collect();
    Channel::new(interpolation, samples)
}

/// Piecewise linear inside the keyed range, held at the end keys outside it.
fn held_value(samples: &[Sample<f32>], time: f32) -> f32 {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return 0.0;
    };
    if time <= first.time {
        return first.value;
    }
    if time >= last.time {
        return last.value;
    }
    let next = samples.partition_point(|s| s.time <= time);
    let (a, b) = (samples[next - 1], samples[next]);
    let span = b.time - a.time;
    if span.abs() <= f32::EPSILON {
        return a.value;
    }
    a.value + (b.value - a.value) * (time - a.time) / span
}

fn sorted_union(times: &mut Vec<f32>) {
    times.sort_by(f32::total_cmp);
    times.dedup_by(|a, b| (*a - *b).abs() <= MATRIX_EPSILON);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn axis(keys: &[(f32, f32)]) -> Channel<f32> {
        Channel::linear(keys.iter().copied())
    }

    fn ctx() -> BlockContext {
        BlockContext::new("NiKeyframeData").at(4)
    }

    #[test]
    fn euler_axes_resample_on_union_of_times() {
        let rotation = RotationSamples {
            euler: [
                axis(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]),
                axis(&[(0.0, 0.0), (2.0, 4.0)]),
                axis(&[(1.0, 1.0), (2.0, 3.0)]),
            ],
            ..Default::default()
        };
        let track =
            merge_channels(Channel::default(), rotation, Channel::default(), &ctx()).unwrap();
        let Rotation::Euler(euler) = &track.rotation else {
            panic!("expected euler rotation");
        };
        let times: Vec<f32> = euler.samples.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        // Y is interpolated at t=1, Z holds its first key at t=0.
        assert_relative_eq!(euler.samples[1].value.y, 2.0);
        assert_relative_eq!(euler.samples[0].value.z, 1.0);
        assert!(euler.samples[2].value.abs_diff_eq(Vec3::new(2.0, 4.0, 3.0), 1e-6));
    }

    #[test]
    fn shorter_euler_axis_holds_its_last_key() {
        let rotation = RotationSamples {
            euler: [
                axis(&[(0.0, 0.0), (2.0, 0.5)]),
                axis(&[(0.0, 0.0), (10.0, 1.0)]),
                Channel::default(),
            ],
            ..Default::default()
        };
        let track =
            merge_channels(Channel::default(), rotation, Channel::default(), &ctx()).unwrap();
        let Rotation::Euler(euler) = &track.rotation else {
            panic!("expected euler rotation");
        };
        let last = euler.samples.last().unwrap();
        assert_relative_eq!(last.time, 10.0);
        assert_relative_eq!(last.value.x, 0.5);
        assert_relative_eq!(last.value.y, 1.0);
        assert_relative_eq!(euler.samples[1].value.y, 0.2);
    }

    #[test]
    fn merge_ignores_input_order() {
        let forward = RotationSamples {
            euler: [
                axis(&[(0.0, 0.1), (0.5, 0.2), (1.0, 0.4)]),
                axis(&[(0.25, 1.0), (1.0, 0.0)]),
                axis(&[(0.75, 2.0)]),
            ],
            ..Default::default()
        };
        let mut reversed = forward.clone();
        for channel in &mut reversed.euler {
            channel.samples.reverse();
        }
        let a = merge_channels(Channel::default(), forward, Channel::default(), &ctx()).unwrap();
        let b = merge_channels(Channel::default(), reversed, Channel::default(), &ctx()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn overlapping_representations_conflict() {
        let rotation = RotationSamples {
            quaternions: Channel::linear([(0.0, Quat::IDENTITY), (1.0, Quat::IDENTITY)]),
            euler: [axis(&[(0.5, 0.0)]), Channel::default(), Channel::default()],
        };
        let err = merge_channels(Channel::default(), rotation, Channel::default(), &ctx())
            .unwrap_err();
        match err {
            NifError::ConflictingRotationRepresentation { at } => assert_eq!(at.index, Some(4)),
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn disjoint_representations_merge_by_time() {
        let rotation = RotationSamples {
            quaternions: Channel::linear([(0.0, Quat::IDENTITY), (1.0, Quat::IDENTITY)]),
            euler: [
                axis(&[(2.0, std::f32::consts::FRAC_PI_2)]),
                Channel::default(),
                Channel::default(),
            ],
        };
        let track =
            merge_channels(Channel::default(), rotation, Channel::default(), &ctx()).unwrap();
        let Rotation::Quaternion(quats) = &track.rotation else {
            panic!("expected quaternion rotation");
        };
        assert_eq!(quats.len(), 3);
        assert_relative_eq!(quats.samples[2].time, 2.0);
        let expected = Quat::from_rotation_x(std::f32::consts::FRAC_PI_2);
        assert!(quats.samples[2].value.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn extrapolation_follows_cycle_bits() {
        let mut warnings = Vec::new();
        let at = ctx();
        let cyclic = Extrapolation::from_flags(ControllerFlags::ACTIVE, &at, &mut warnings);
        let clamp = Extrapolation::from_flags(
            ControllerFlags::ACTIVE | ControllerFlags::CYCLE_CLAMP,
            &at,
            &mut warnings,
        );
        assert_eq!((cyclic, clamp), (Extrapolation::Cyclic, Extrapolation::Clamp));
        assert!(warnings.is_empty());
        let odd = Extrapolation::from_flags(ControllerFlags::CYCLE_REVERSE, &at, &mut warnings);
        assert_eq!(odd, Extrapolation::Clamp);
        assert!(matches!(
            warnings[0],
            NifWarning::InconsistentCurveExtrapolation { flags: 0x0002, .. }
        ));
        assert_eq!(Extrapolation::Clamp.to_flags().bits(), 12);
        assert_eq!(Extrapolation::Cyclic.to_flags().bits(), 8);
    }

    #[test]
    fn key_types_map_to_interpolation() {
        assert_eq!(Interpolation::from_key_type(KeyType::Linear), Interpolation::Linear);
        assert_eq!(Interpolation::from_key_type(KeyType::TBC), Interpolation::Quadratic);
        assert_eq!(Interpolation::from_key_type(KeyType::XyzRotation), Interpolation::Linear);
        assert_eq!(Interpolation::from_key_type(KeyType::Const), Interpolation::Constant);
        assert_eq!(Interpolation::from_key_type(KeyType::Unknown(0)), Interpolation::Constant);
    }

    #[test]
    fn sampling_holds_rest_for_empty_channels() {
        let track = KeyframeTrack {
            translation: Channel::linear([
                (0.0, Vec3::ZERO),
                (2.0, Vec3::new(2.0, 0.0, 0.0)),
            ]),
            ..Default::default()
        };
        let rest = NiTransform {
            scale: 3.0,
            ..Default::default()
        };
        let at_one = track.sample(1.0, &rest);
        assert_relative_eq!(at_one.translation.x, 1.0);
        assert_relative_eq!(at_one.scale, 3.0);
        assert_relative_eq!(track.sample(5.0, &rest).translation.x, 2.0);
        assert!(track.retimed(0.5).time_span() == Some((0.0, 1.0)));
    }
}
