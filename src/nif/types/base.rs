use bevy::math::{Vec2, Vec3};
use binrw::binrw;

use crate::nif::registry::BlockRef;

pub type Vector2 = Vec2;
pub type Vector3 = Vec3;

/// A reference field. Decoding stores the raw index, the resolver swaps it for a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordLink {
    #[default]
    Null,
    Index(u32),
    Block(BlockRef),
}

impl RecordLink {
    /// Interprets an on-disk link; -1 is null, other negatives are rejected.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            -1 => Some(RecordLink::Null),
            r if r < -1 => None,
            r => Some(RecordLink::Index(r as u32)),
        }
    }

    pub fn block(self) -> Option<BlockRef> {
        match self {
            RecordLink::Block(key) => Some(key),
            _ => None,
        }
    }

    pub fn is_null(self) -> bool {
        matches!(self, RecordLink::Null)
    }
}

impl From<BlockRef> for RecordLink {
    fn from(key: BlockRef) -> Self {
        RecordLink::Block(key)
    }
}

impl From<Option<BlockRef>> for RecordLink {
    fn from(key: Option<BlockRef>) -> Self {
        key.map_or(RecordLink::Null, RecordLink::Block)
    }
}

/// Row-major 3x3 as stored in the file. Vectors multiply from the left.
#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3x3(pub [[f32; 3]; 3]);

impl Default for Matrix3x3 {
    fn default() -> Self {
        Matrix3x3::IDENTITY
    }
}

/// Row-major homogeneous matrix, translation in the fourth row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix4x4(pub [[f32; 4]; 4]);

impl Default for Matrix4x4 {
    fn default() -> Self {
        Matrix4x4::IDENTITY
    }
}

/// Scale, rotation and translation as the file stores them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NiTransform {
    pub rotation: Matrix3x3,
    pub translation: Vector3,
    pub scale: f32,
}

impl Default for NiTransform {
    fn default() -> Self {
        NiTransform {
            rotation: Matrix3x3::IDENTITY,
            translation: Vector3::ZERO,
            scale: 1.0,
        }
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color3 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color4 {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TexCoord {
    pub u: f32,
    pub v: f32,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Triangle {
    pub v1: u16,
    pub v2: u16,
    pub v3: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Plane {
    pub normal: Vector3,
    pub constant: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: Vector3,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub center: Vector3,
    /// One box axis per row.
    pub axes: Matrix3x3,
    /// Half sizes along each axis.
    pub extent: Vector3,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingCapsule {
    pub center: Vector3,
    pub origin: Vector3,
    pub extent: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingHalfSpace {
    pub plane: Plane,
    pub center: Vector3,
}

/// Collision volume variants, tagged on disk by a u32.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundingVolume {
    Sphere(BoundingSphere),
    Box(BoundingBox),
    Capsule(BoundingCapsule),
    Union(Vec<BoundingVolume>),
    HalfSpace(BoundingHalfSpace),
}

impl BoundingVolume {
    pub fn type_id(&self) -> u32 {
        match self {
            BoundingVolume::Sphere(_) => 0,
            BoundingVolume::Box(_) => 1,
            BoundingVolume::Capsule(_) => 2,
            BoundingVolume::Union(_) => 4,
            BoundingVolume::HalfSpace(_) => 5,
        }
    }
}
