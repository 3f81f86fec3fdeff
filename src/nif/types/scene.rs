use super::base::{BoundingVolume, NiTransform, RecordLink, Vector3};
use std::ops::{Deref, DerefMut};

// --- Structs using Pure Composition ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiObjectNET {
    pub name: String,
    /// Head of the legacy singly linked extra data chain.
    pub extra_data_link: RecordLink,
    pub extra_data_list: Vec<RecordLink>,
    pub controller_link: RecordLink,
}

impl NiObjectNET {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiAVObject {
    pub net_base: NiObjectNET,
    /// Stored wide; newer Bethesda streams write all 32 bits.
    pub flags: u32,
    pub transform: NiTransform,
    pub velocity: Vector3,
    pub properties: Vec<RecordLink>,
    pub bounding_volume: Option<BoundingVolume>,
    pub collision_object: RecordLink,
}

impl NiAVObject {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            net_base: NiObjectNET::named(name),
            ..Default::default()
        }
    }

    pub fn transform(&self) -> &NiTransform {
        &self.transform
    }
}

/// Node block types that share the NiNode layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeKind {
    #[default]
    Node,
    RootCollisionNode,
    BsAnimationNode,
    BsParticleNode,
    AvoidNode,
    BsFadeNode,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiNode {
    pub av_base: NiAVObject,
    pub kind: NodeKind,
    pub children: Vec<RecordLink>,
    pub effects: Vec<RecordLink>,
}

impl NiNode {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            av_base: NiAVObject::named(name),
            ..Default::default()
        }
    }

    pub fn children(&self) -> &[RecordLink] {
        &self.children
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderInfo {
    pub name: String,
    pub unknown_integer: i32,
}

/// Per-geometry material list written by 20.2 streams.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialList {
    pub names: Vec<String>,
    pub extra_data: Vec<i32>,
    pub active: i32,
    pub needs_update: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiTriShape {
    pub av_base: NiAVObject,
    pub data_link: RecordLink,
    pub skin_link: RecordLink,
    pub shader: Option<ShaderInfo>,
    pub materials: MaterialList,
}

impl NiTriShape {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            av_base: NiAVObject::named(name),
            ..Default::default()
        }
    }
}

// --- Deref Implementations for Automatic Method/Field Forwarding ---

impl Deref for NiAVObject {
    type Target = NiObjectNET;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.net_base
    }
}

impl DerefMut for NiAVObject {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.net_base
    }
}

impl Deref for NiNode {
    type Target = NiAVObject;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.av_base
    }
}

impl DerefMut for NiNode {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.av_base
    }
}

impl Deref for NiTriShape {
    type Target = NiAVObject;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.av_base
    }
}

impl DerefMut for NiTriShape {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.av_base
    }
}
