use super::base::{BoundingSphere, NiTransform, RecordLink, Triangle};
use binrw::binrw;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiSkinInstance {
    // Note: Inherits NiObject, not NiObjectNET
    pub data: RecordLink,
    pub skin_partition: RecordLink,
    pub skeleton_root: RecordLink,
    pub bones: Vec<RecordLink>,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoneVertData {
    pub index: u16,
    pub weight: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoneData {
    /// Maps skin space into bone space.
    pub transform: NiTransform,
    pub bounding_sphere: BoundingSphere,
    /// Kept even when weights are not stored, the count is written anyway.
    pub num_vertices: u16,
    pub vertex_weights: Vec<BoneVertData>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiSkinData {
    pub skin_transform: NiTransform,
    pub skin_partition: RecordLink,
    pub has_vertex_weights: bool,
    pub bone_list: Vec<BoneData>,
}

impl Default for NiSkinData {
    fn default() -> Self {
        Self {
            skin_transform: NiTransform::default(),
            skin_partition: RecordLink::Null,
            has_vertex_weights: true,
            bone_list: Vec::new(),
        }
    }
}

/// One hardware skinning batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkinPartition {
    pub num_vertices: u16,
    pub num_weights_per_vertex: u16,
    /// Indices into the skin instance bone list.
    pub bones: Vec<u16>,
    /// Partition vertex → geometry vertex.
    pub vertex_map: Option<Vec<u16>>,
    pub vertex_weights: Option<Vec<Vec<f32>>>,
    pub strips: Vec<Vec<u16>>,
    pub triangles: Vec<Triangle>,
    pub has_faces: bool,
    /// Indices into `bones`, one row per partition vertex.
    pub bone_indices: Option<Vec<Vec<u8>>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiSkinPartition {
    pub partitions: Vec<SkinPartition>,
}
