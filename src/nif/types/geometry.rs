use super::base::{BoundingSphere, Color4, RecordLink, TexCoord, Triangle, Vector3};
use std::ops::{Deref, DerefMut};

/// Vector flag bit marking tangent space arrays.
pub const VECTOR_FLAG_TANGENTS: u16 = 0x1000;

// Base class for geometry data blocks
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiGeometryData {
    pub group_id: i32,
    pub keep_flags: u8,
    pub compress_flags: u8,
    pub vertices: Vec<Vector3>,
    /// UV count and tangent bits; UV count is rewritten from `uv_sets` on save.
    pub vector_flags: u16,
    pub normals: Vec<Vector3>,
    pub tangents: Vec<Vector3>,
    pub bitangents: Vec<Vector3>,
    pub bounding_sphere: BoundingSphere,
    pub vertex_colors: Vec<Color4>,
    pub uv_sets: Vec<Vec<TexCoord>>,
    pub consistency_flags: u16,
    pub additional_data: RecordLink,
}

impl NiGeometryData {
    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiTriShapeData {
    pub geom_base: NiGeometryData,
    pub triangles: Vec<Triangle>,
    pub match_groups: Vec<Vec<u16>>,
}

impl Deref for NiTriShapeData {
    type Target = NiGeometryData;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.geom_base
    }
}

impl DerefMut for NiTriShapeData {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.geom_base
    }
}
