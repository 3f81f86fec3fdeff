use super::base::{RecordLink, Vector3};
use super::scene::NiObjectNET;
use bitflags::bitflags;
use std::ops::{Deref, DerefMut};

pub type Quaternion = bevy::math::Quat;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyType {
    // Interpolation type for keys
    #[default]
    Linear,
    Quadratic,   // Bezier interpolation
    TBC,         // Tension Bias Continuity interpolation
    XyzRotation, // Euler angles
    Const,       // Step function - value is constant between keys
    Unknown(u32),
}

impl From<u32> for KeyType {
    fn from(value: u32) -> Self {
        match value {
            1 => KeyType::Linear,
            2 => KeyType::Quadratic,
            3 => KeyType::TBC,
            4 => KeyType::XyzRotation,
            5 => KeyType::Const,
            _ => KeyType::Unknown(value),
        }
    }
}

impl From<KeyType> for u32 {
    fn from(value: KeyType) -> Self {
        match value {
            KeyType::Linear => 1,
            KeyType::Quadratic => 2,
            KeyType::TBC => 3,
            KeyType::XyzRotation => 4,
            KeyType::Const => 5,
            KeyType::Unknown(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Tbc {
    pub tension: f32,
    pub bias: f32,
    pub continuity: f32,
}

/// One key of a float or vector group. Tangents exist for quadratic groups, TBC for TBC groups.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Key<T> {
    pub time: f32,
    pub value: T,
    pub forward_tangent: Option<T>,
    pub backward_tangent: Option<T>,
    pub tbc: Option<Tbc>,
}

impl<T> Key<T> {
    pub fn linear(time: f32, value: T) -> Self {
        Key {
            time,
            value,
            forward_tangent: None,
            backward_tangent: None,
            tbc: None,
        }
    }
}

pub type KeyFloat = Key<f32>;
pub type KeyVec3 = Key<Vector3>;

/// Quaternion keys never carry tangents, only TBC parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KeyQuaternion {
    pub time: f32,
    pub value: Quaternion,
    pub tbc: Option<Tbc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct KeyGroup<T> {
    pub interpolation: KeyType,
    pub keys: Vec<Key<T>>,
}

impl<T> KeyGroup<T> {
    pub fn new(interpolation: KeyType, keys: Vec<Key<T>>) -> Self {
        Self {
            interpolation,
            keys,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RotationKeys {
    #[default]
    None,
    Quaternion {
        key_type: KeyType,
        keys: Vec<KeyQuaternion>,
    },
    /// Per-axis angle curves in radians, x then y then z.
    Euler {
        order: f32,
        axes: [KeyGroup<f32>; 3],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyframeDataKind {
    #[default]
    Keyframe,
    Transform,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NiKeyframeData {
    pub kind: KeyframeDataKind,
    pub rotations: RotationKeys,
    pub translations: KeyGroup<Vector3>,
    pub scales: KeyGroup<f32>,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ControllerFlags: u16 {
        const APP_INIT = 0x0001;
        const CYCLE_REVERSE = 0x0002;
        const CYCLE_CLAMP = 0x0004;
        const ACTIVE = 0x0008;
        const PLAY_BACKWARDS = 0x0010;
        const MANAGER_CONTROLLED = 0x0020;
        const COMPUTE_SCALED_TIME = 0x0040;
        const FORCE_UPDATE = 0x0080;
    }
}

impl ControllerFlags {
    /// The two bits that select loop, reverse or clamp.
    pub const CYCLE_MASK: u16 = 0x0006;

    pub fn cycle_bits(self) -> u16 {
        self.bits() & Self::CYCLE_MASK
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiTimeController {
    pub next_controller: RecordLink,
    pub flags: ControllerFlags,
    pub frequency: f32,
    pub phase: f32,
    pub start_time: f32,
    pub stop_time: f32,
    pub target: RecordLink,
}

impl Default for NiTimeController {
    fn default() -> Self {
        Self {
            next_controller: RecordLink::Null,
            flags: ControllerFlags::ACTIVE | ControllerFlags::CYCLE_CLAMP,
            frequency: 1.0,
            phase: 0.0,
            start_time: 0.0,
            stop_time: 0.0,
            target: RecordLink::Null,
        }
    }
}

/// Layout shared by NiKeyframeController and NiTransformController.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NiKeyframeController {
    pub base: NiTimeController,
    pub interpolator: RecordLink,
    pub data: RecordLink,
}

impl Deref for NiKeyframeController {
    type Target = NiTimeController;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl DerefMut for NiKeyframeController {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Controller {
    Keyframe(NiKeyframeController),
    Transform(NiKeyframeController),
}

impl Controller {
    pub fn time_controller(&self) -> &NiTimeController {
        match self {
            Controller::Keyframe(c) | Controller::Transform(c) => &c.base,
        }
    }

    pub fn keyframe(&self) -> &NiKeyframeController {
        match self {
            Controller::Keyframe(c) | Controller::Transform(c) => c,
        }
    }

    pub fn keyframe_mut(&mut self) -> &mut NiKeyframeController {
        match self {
            Controller::Keyframe(c) | Controller::Transform(c) => c,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiTransformInterpolator {
    pub translation: Vector3,
    pub rotation: Quaternion,
    pub scale: f32,
    pub trs_valid: [bool; 3],
    pub data: RecordLink,
}

impl Default for NiTransformInterpolator {
    fn default() -> Self {
        Self {
            translation: Vector3::ZERO,
            rotation: Quaternion::IDENTITY,
            scale: 1.0,
            trs_valid: [true; 3],
            data: RecordLink::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interpolator {
    Transform(NiTransformInterpolator),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextKey {
    pub time: f32,
    pub value: String,
}

/// Root of a Morrowind style KF file: string extra data names the bones, controllers animate them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiSequenceStreamHelper {
    pub net_base: NiObjectNET,
}

impl Deref for NiSequenceStreamHelper {
    type Target = NiObjectNET;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.net_base
    }
}
