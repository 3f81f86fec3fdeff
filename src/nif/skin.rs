//! Per-vertex bone weights, gathered from skin data or skin partitions.

use bevy::log::{debug, warn};

use super::error::{BlockContext, NifError, Result};
use super::types::{
    BoneData, BoneVertData, BoundingSphere, NiSkinData, NiTransform, SkinPartition, Vector3,
};

/// Weights below this are treated as absent.
const WEIGHT_EPSILON: f32 = 1.0e-6;

/// Vertex index → (bone index, weight) pairs.
///
/// Bone indices refer to the skin instance bone list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexWeightTable {
    weights: Vec<Vec<(usize, f32)>>,
}

impl VertexWeightTable {
    pub fn new(vertex_count: usize) -> Self {
        Self {
            weights: vec![Vec::new(); vertex_count],
        }
    }

    /// Builds the table from one `(vertex, weight)` list per bone.
    ///
    /// Weights are normalized per vertex; vertices whose weights sum to zero
    /// end up without influences.
    pub fn from_bone_lists(vertex_count: usize, bones: &[Vec<BoneVertData>]) -> Self {
        let mut table = Self::new(vertex_count);
        for (bone, list) in bones.iter().enumerate() {
            for entry in list {
                let vertex = entry.index as usize;
                match table.weights.get_mut(vertex) {
                    Some(slot) => slot.push((bone, entry.weight)),
                    None => warn!("Invalid vertex index {vertex} in skin data"),
                }
            }
        }
        for slot in &mut table.weights {
            let sum: f32 = slot.iter().map(|(_, w)| w).sum();
            if sum.abs() > WEIGHT_EPSILON {
                for (_, w) in slot.iter_mut() {
                    *w /= sum;
                }
            } else {
                slot.clear();
            }
        }
        table
    }

    /// Convenience over the bone list of a skin data block.
    pub fn from_skin_data(vertex_count: usize, data: &NiSkinData) -> Self {
        let lists: Vec<Vec<BoneVertData>> = data
            .bone_list
            .iter()
            .map(|bone| bone.vertex_weights.clone())
            .collect();
        Self::from_bone_lists(vertex_count, &lists)
    }

    /// Builds the table from hardware partitions.
    ///
    /// Only positive weights count, the first partition that mentions a
    /// vertex wins, and nothing is renormalized.
    pub fn from_partitions(vertex_count: usize, partitions: &[SkinPartition]) -> Self {
        let mut table = Self::new(vertex_count);
        let mut claimed = vec![false; vertex_count];
        for (p, partition) in partitions.iter().enumerate() {
            let (Some(map), Some(weights), Some(indices)) = (
                &partition.vertex_map,
                &partition.vertex_weights,
                &partition.bone_indices,
            ) else {
                debug!("Partition {p} has no vertex map, weights or bone indices");
                continue;
            };
            for ((vertex, row), bone_row) in map.iter().zip(weights).zip(indices) {
                let vertex = *vertex as usize;
                let Some(seen) = claimed.get_mut(vertex) else {
                    warn!("Invalid vertex index {vertex} in skin partition {p}");
                    continue;
                };
                if *seen {
                    continue;
                }
                *seen = true;
                for (weight, local) in row.iter().zip(bone_row) {
                    if *weight <= 0.0 {
                        continue;
                    }
                    match partition.bones.get(*local as usize) {
                        Some(bone) => table.weights[vertex].push((*bone as usize, *weight)),
                        None => warn!("Partition {p} bone index {local} out of range"),
                    }
                }
            }
        }
        table
    }

    pub fn add(&mut self, vertex: usize, bone: usize, weight: f32) {
        if vertex >= self.weights.len() {
            self.weights.resize(vertex + 1, Vec::new());
        }
        self.weights[vertex].push((bone, weight));
    }

    /// Grows or truncates to `vertex_count` vertices; new ones have no weights.
    pub fn resize(&mut self, vertex_count: usize) {
        self.weights.resize(vertex_count, Vec::new());
    }

    pub fn vertex_count(&self) -> usize {
        self.weights.len()
    }

    pub fn weights_of(&self, vertex: usize) -> &[(usize, f32)] {
        self.weights.get(vertex).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[(usize, f32)])> {
        self.weights.iter().map(Vec::as_slice).enumerate()
    }

    /// Highest bone index plus one.
    pub fn bone_count(&self) -> usize {
        self.weights
            .iter()
            .flatten()
            .map(|(bone, _)| bone + 1)
            .max()
            .unwrap_or(0)
    }

    /// Every one of `vertex_count` vertices needs at least one influence.
    pub fn validate_for_export(&self, vertex_count: usize, at: &BlockContext) -> Result<()> {
        for vertex in 0..vertex_count {
            let weighted = self
                .weights_of(vertex)
                .iter()
                .any(|(_, w)| w.abs() > WEIGHT_EPSILON);
            if !weighted {
                return Err(NifError::UnweightedVertex {
                    at: at.clone(),
                    vertex,
                });
            }
        }
        Ok(())
    }
}

/// Skin data for export: per-bone weight lists, bind transforms and bounds.
///
/// `bone_binds[i]` maps skin space into the space of bone `i`; the bounding
/// sphere of each bone covers its influenced vertices in bone space.
pub fn build_skin_data(
    table: &VertexWeightTable,
    vertices: &[Vector3],
    skin_transform: NiTransform,
    bone_binds: &[NiTransform],
    at: &BlockContext,
) -> Result<NiSkinData> {
    table.validate_for_export(vertices.len(), at)?;
    if table.bone_count() > bone_binds.len() {
        return Err(NifError::invalid(
            at.clone(),
            format!(
                "weights use {} bones but only {} are bound",
                table.bone_count(),
                bone_binds.len()
            ),
        ));
    }
    let mut bone_list: Vec<BoneData> = bone_binds
        .iter()
        .map(|bind| BoneData {
            transform: *bind,
            ..Default::default()
        })
        .collect();
    for (vertex, influences) in table.iter().take(vertices.len()) {
        let index = u16::try_from(vertex)
            .map_err(|_| NifError::invalid(at.clone(), "more than 65535 skinned vertices"))?;
        for (bone, weight) in influences {
            bone_list[*bone].vertex_weights.push(BoneVertData {
                index,
                weight: *weight,
            });
        }
    }
    for bone in &mut bone_list {
        bone.num_vertices = u16::try_from(bone.vertex_weights.len())
            .map_err(|_| NifError::invalid(at.clone(), "more than 65535 weights on one bone"))?;
        bone.bounding_sphere = bounding_sphere(
            bone.vertex_weights
                .iter()
                .map(|w| bone_space(&bone.transform, vertices[w.index as usize])),
        );
    }
    Ok(NiSkinData {
        skin_transform,
        bone_list,
        ..Default::default()
    })
}

fn bone_space(bind: &NiTransform, v: Vector3) -> Vector3 {
    bind.rotation.transform_vector(v * bind.scale) + bind.translation
}

fn bounding_sphere(points: impl Iterator<Item = Vector3> + Clone) -> BoundingSphere {
    let (sum, count) = points
        .clone()
        .fold((Vector3::ZERO, 0usize), |(s, n), p| (s + p, n + 1));
    if count == 0 {
        return BoundingSphere::default();
    }
    let center = sum / count as f32;
    let radius = points.map(|p| p.distance(center)).fold(0.0, f32::max);
    BoundingSphere { center, radius }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn w(index: u16, weight: f32) -> BoneVertData {
        BoneVertData { index, weight }
    }

    #[test]
    fn bone_lists_normalize_per_vertex() {
        let table = VertexWeightTable::from_bone_lists(
            3,
            &[vec![w(0, 0.2), w(1, 1.0)], vec![w(0, 0.6), w(2, 0.0)]],
        );
        let v0 = table.weights_of(0);
        assert_eq!(v0.len(), 2);
        assert_relative_eq!(v0[0].1, 0.25);
        assert_relative_eq!(v0[1].1, 0.75);
        assert_eq!(table.weights_of(1), &[(0usize, 1.0f32)]);
        assert!(table.weights_of(2).is_empty());
    }

    #[test]
    fn partitions_keep_first_claim_and_skip_zero_weights() {
        let first = SkinPartition {
            num_vertices: 2,
            num_weights_per_vertex: 2,
            bones: vec![4, 7],
            vertex_map: Some(vec![0, 1]),
            vertex_weights: Some(vec![vec![0.5, 0.5], vec![1.0, 0.0]]),
            bone_indices: Some(vec![vec![0, 1], vec![1, 0]]),
            ..Default::default()
        };
        let second = SkinPartition {
            num_vertices: 1,
            num_weights_per_vertex: 1,
            bones: vec![2],
            vertex_map: Some(vec![1]),
            vertex_weights: Some(vec![vec![0.3]]),
            bone_indices: Some(vec![vec![0]]),
            ..Default::default()
        };
        let table = VertexWeightTable::from_partitions(2, &[first, second]);
        assert_eq!(table.weights_of(0), &[(4usize, 0.5f32), (7, 0.5)]);
        assert_eq!(table.weights_of(1), &[(7usize, 1.0f32)]);
    }

    #[test]
    fn export_rejects_unweighted_vertex() {
        let mut table = VertexWeightTable::new(3);
        table.add(0, 0, 1.0);
        table.add(2, 0, 1.0);
        let at = BlockContext::new("NiTriShape").named("Body");
        match table.validate_for_export(3, &at).unwrap_err() {
            NifError::UnweightedVertex { at, vertex } => {
                assert_eq!(vertex, 1);
                assert_eq!(at.name.as_deref(), Some("Body"));
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[test]
    fn skin_data_lists_weights_per_bone() {
        let mut table = VertexWeightTable::new(2);
        table.add(0, 0, 1.0);
        table.add(1, 0, 0.5);
        table.add(1, 1, 0.5);
        let vertices = [Vector3::new(1.0, 0.0, 0.0), Vector3::new(-1.0, 0.0, 0.0)];
        let binds = [NiTransform::default(), NiTransform::default()];
        let at = BlockContext::new("NiTriShape");
        let data =
            build_skin_data(&table, &vertices, NiTransform::default(), &binds, &at).unwrap();
        assert_eq!(data.bone_list.len(), 2);
        assert_eq!(data.bone_list[0].num_vertices, 2);
        assert_eq!(data.bone_list[1].vertex_weights, vec![w(1, 0.5)]);
        assert_relative_eq!(data.bone_list[0].bounding_sphere.radius, 1.0);
        let missing_bind = build_skin_data(&table, &vertices, NiTransform::default(), &binds[..1], &at);
        assert!(matches!(missing_bind, Err(NifError::InvalidData { .. })));
    }

    #[test]
    fn bone_weight_count_must_fit_the_field() {
        let count = usize::from(u16::MAX) + 1;
        let mut table = VertexWeightTable::new(count);
        for vertex in 0..count {
            table.add(vertex, 0, 1.0);
        }
        let vertices = vec![Vector3::ZERO; count];
        let at = BlockContext::new("NiTriShape");
        let binds = [NiTransform::default()];
        let err = build_skin_data(&table, &vertices, NiTransform::default(), &binds, &at)
            .unwrap_err();
        assert!(
            matches!(&err, NifError::InvalidData { reason, .. } if reason.contains("one bone")),
            "{err}"
        );
    }
}
