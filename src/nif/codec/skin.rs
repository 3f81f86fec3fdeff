use super::stream::{Reader, Writer};
use super::{Load, Save};
use crate::nif::error::Result;
use crate::nif::schema::Field;
use crate::nif::types::*;

// Skin transforms put the rotation first, unlike AV objects.
fn read_skin_transform(r: &mut Reader) -> Result<NiTransform> {
    Ok(NiTransform {
        rotation: r.matrix3()?,
        translation: r.vec3()?,
        scale: r.f32()?,
    })
}

fn write_skin_transform(w: &mut Writer, t: &NiTransform) -> Result<()> {
    w.matrix3(&t.rotation)?;
    w.vec3(t.translation)?;
    w.f32(t.scale)
}

impl Load for NiSkinInstance {
    fn load(r: &mut Reader) -> Result<Self> {
        let data = r.link()?;
        let skin_partition = if r.has(Field::SkinInstancePartition) {
            r.link()?
        } else {
            RecordLink::Null
        };
        Ok(NiSkinInstance {
            data,
            skin_partition,
            skeleton_root: r.link()?,
            bones: r.link_list()?,
        })
    }
}

impl Save for NiSkinInstance {
    fn save(&self, w: &mut Writer) -> Result<()> {
        w.link(self.data)?;
        if w.has(Field::SkinInstancePartition) {
            w.link(self.skin_partition)?;
        }
        w.link(self.skeleton_root)?;
        w.link_list(&self.bones)
    }
}

impl Load for NiSkinData {
    fn load(r: &mut Reader) -> Result<Self> {
        let skin_transform = read_skin_transform(r)?;
        let num_bones = r.count(54)?;
        let skin_partition = if r.has(Field::SkinDataPartition) {
            r.link()?
        } else {
            RecordLink::Null
        };
        let has_vertex_weights = if r.has(Field::SkinDataHasWeights) {
            r.byte_bool()?
        } else {
            true
        };
        let mut bone_list = Vec::with_capacity(num_bones);
        for _ in 0..num_bones {
            let transform = read_skin_transform(r)?;
            let bounding_sphere = BoundingSphere {
                center: r.vec3()?,
                radius: r.f32()?,
            };
            let num_vertices = r.u16()?;
            let vertex_weights = if has_vertex_weights {
                r.check_count(num_vertices as usize, 6)?;
                r.pods(num_vertices as usize)?
            } else {
                Vec::new()
            };
            bone_list.push(BoneData {
                transform,
                bounding_sphere,
                num_vertices,
                vertex_weights,
            });
        }
        Ok(NiSkinData {
            skin_transform,
            skin_partition,
            has_vertex_weights,
            bone_list,
        })
    }
}

impl Save for NiSkinData {
    fn save(&self, w: &mut Writer) -> Result<()> {
        write_skin_transform(w, &self.skin_transform)?;
        w.count(self.bone_list.len())?;
        if w.has(Field::SkinDataPartition) {
            w.link(self.skin_partition)?;
        }
        let has_weights = self.has_vertex_weights || !w.has(Field::SkinDataHasWeights);
        if w.has(Field::SkinDataHasWeights) {
            w.byte_bool(self.has_vertex_weights)?;
        }
        for bone in &self.bone_list {
            write_skin_transform(w, &bone.transform)?;
            w.vec3(bone.bounding_sphere.center)?;
            w.f32(bone.bounding_sphere.radius)?;
            if has_weights {
                w.short_count(bone.vertex_weights.len())?;
                w.pods(&bone.vertex_weights)?;
            } else {
                w.u16(bone.num_vertices)?;
            }
        }
        Ok(())
    }
}

impl Load for SkinPartition {
    fn load(r: &mut Reader) -> Result<Self> {
        let num_vertices = r.u16()?;
        let num_triangles = r.u16()? as usize;
        let num_bones = r.short_count(2)?;
        let num_strips = r.short_count(2)?;
        let num_weights_per_vertex = r.u16()?;
        let n = num_vertices as usize;
        let per_vertex = num_weights_per_vertex as usize;
        let flagged = r.has(Field::SkinPartitionFlags);

        let bones = (0..num_bones).map(|_| r.u16()).collect::<Result<_>>()?;
        let mut vertex_map = None;
        if !flagged || r.bool()? {
            r.check_count(n, 2)?;
            vertex_map = Some((0..n).map(|_| r.u16()).collect::<Result<_>>()?);
        }
        let mut vertex_weights = None;
        if !flagged || r.bool()? {
            r.check_count(n * per_vertex, 4)?;
            let mut rows = Vec::with_capacity(n);
            for _ in 0..n {
                rows.push((0..per_vertex).map(|_| r.f32()).collect::<Result<_>>()?);
            }
            vertex_weights = Some(rows);
        }
        let strip_lengths: Vec<u16> = (0..num_strips).map(|_| r.u16()).collect::<Result<_>>()?;
        let has_faces = if flagged { r.bool()? } else { true };
        let mut strips = Vec::new();
        let mut triangles = Vec::new();
        if has_faces {
            if num_strips != 0 {
                for len in &strip_lengths {
                    let len = r.check_count(*len as usize, 2)?;
                    strips.push((0..len).map(|_| r.u16()).collect::<Result<_>>()?);
                }
            } else {
                r.check_count(num_triangles, 6)?;
                triangles = r.pods(num_triangles)?;
            }
        }
        let mut bone_indices = None;
        if r.bool()? {
            r.check_count(n * per_vertex, 1)?;
            let mut rows = Vec::with_capacity(n);
            for _ in 0..n {
                rows.push(r.bytes(per_vertex)?);
            }
            bone_indices = Some(rows);
        }
        Ok(SkinPartition {
            num_vertices,
            num_weights_per_vertex,
            bones,
            vertex_map,
            vertex_weights,
            strips,
            triangles,
            has_faces,
            bone_indices,
        })
    }
}

impl Save for SkinPartition {
    fn save(&self, w: &mut Writer) -> Result<()> {
        let n = self.num_vertices as usize;
        let per_vertex = self.num_weights_per_vertex as usize;
        let flagged = w.has(Field::SkinPartitionFlags);
        let num_triangles = if self.strips.is_empty() {
            self.triangles.len()
        } else {
            self.strips.iter().map(|s| s.len().saturating_sub(2)).sum()
        };
        if self.vertex_map.as_ref().is_some_and(|m| m.len() != n) {
            return Err(w.invalid("vertex map does not match the vertex count"));
        }
        if let Some(rows) = &self.vertex_weights {
            if rows.len() != n || rows.iter().any(|row| row.len() != per_vertex) {
                return Err(w.invalid("partition weights do not match the vertex count"));
            }
        }
        if let Some(rows) = &self.bone_indices {
            if rows.len() != n || rows.iter().any(|row| row.len() != per_vertex) {
                return Err(w.invalid("partition bone indices do not match the vertex count"));
            }
        }
        if !flagged && (self.vertex_map.is_none() || self.vertex_weights.is_none()) {
            return Err(w.invalid("partitions before 10.1.0.0 need a vertex map and weights"));
        }

        w.u16(self.num_vertices)?;
        w.short_count(num_triangles)?;
        w.short_count(self.bones.len())?;
        w.short_count(self.strips.len())?;
        w.u16(self.num_weights_per_vertex)?;
        self.bones.iter().try_for_each(|b| w.u16(*b))?;
        if flagged {
            w.bool(self.vertex_map.is_some())?;
        }
        if let Some(map) = &self.vertex_map {
            map.iter().try_for_each(|v| w.u16(*v))?;
        }
        if flagged {
            w.bool(self.vertex_weights.is_some())?;
        }
        for row in self.vertex_weights.iter().flatten() {
            row.iter().try_for_each(|v| w.f32(*v))?;
        }
        for strip in &self.strips {
            w.short_count(strip.len())?;
        }
        let has_faces = self.has_faces || !flagged;
        if flagged {
            w.bool(self.has_faces)?;
        }
        if has_faces {
            if self.strips.is_empty() {
                w.pods(&self.triangles)?;
            } else {
                for strip in &self.strips {
                    strip.iter().try_for_each(|v| w.u16(*v))?;
                }
            }
        }
        w.bool(self.bone_indices.is_some())?;
        for row in self.bone_indices.iter().flatten() {
            w.bytes(row)?;
        }
        Ok(())
    }
}

impl Load for NiSkinPartition {
    fn load(r: &mut Reader) -> Result<Self> {
        let count = r.count(10)?;
        let partitions = (0..count)
            .map(|_| SkinPartition::load(r))
            .collect::<Result<_>>()?;
        Ok(NiSkinPartition { partitions })
    }
}

impl Save for NiSkinPartition {
    fn save(&self, w: &mut Writer) -> Result<()> {
        w.count(self.partitions.len())?;
        self.partitions.iter().try_for_each(|p| p.save(w))
    }
}
