use super::stream::{Reader, Writer};
use super::{Load, Save};
use crate::nif::error::Result;
use crate::nif::schema::Field;
use crate::nif::types::geometry::VECTOR_FLAG_TANGENTS;
use crate::nif::types::*;

const UV_COUNT_MASK: u16 = 0x003F;
const BS_HAS_UV: u16 = 0x0001;

impl Load for NiTriShapeData {
    fn load(r: &mut Reader) -> Result<Self> {
        let mut geom = NiGeometryData::default();
        if r.has(Field::GeomGroupId) {
            geom.group_id = r.i32()?;
        }
        let num_vertices = r.u16()? as usize;
        if r.has(Field::GeomKeepCompress) {
            geom.keep_flags = r.u8()?;
            geom.compress_flags = r.u8()?;
        }
        if r.bool()? {
            r.check_count(num_vertices, 12)?;
            geom.vertices = r.vec3s(num_vertices)?;
        }
        if r.has(Field::GeomVectorFlags) {
            geom.vector_flags = r.u16()?;
        }
        let has_normals = r.bool()?;
        if has_normals {
            r.check_count(num_vertices, 12)?;
            geom.normals = r.vec3s(num_vertices)?;
        }
        if r.has(Field::GeomTangents) && has_normals && geom.vector_flags & VECTOR_FLAG_TANGENTS != 0
        {
            r.check_count(num_vertices, 24)?;
            geom.tangents = r.vec3s(num_vertices)?;
            geom.bitangents = r.vec3s(num_vertices)?;
        }
        geom.bounding_sphere = BoundingSphere {
            center: r.vec3()?,
            radius: r.f32()?,
        };
        if r.bool()? {
            r.check_count(num_vertices, 16)?;
            geom.vertex_colors = r.pods(num_vertices)?;
        }

        let mut num_uv_sets = 0;
        if r.has(Field::GeomNumUvSets) {
            num_uv_sets = r.u16()? as usize;
        }
        if r.has(Field::GeomHasUv) && !r.bool()? {
            num_uv_sets = 0;
        }
        if r.has(Field::GeomBsVectorFlags) {
            num_uv_sets = (geom.vector_flags & BS_HAS_UV) as usize;
        } else if r.has(Field::GeomVectorFlags) {
            num_uv_sets = (geom.vector_flags & UV_COUNT_MASK) as usize;
        }
        r.check_count(num_uv_sets * num_vertices, 8)?;
        for _ in 0..num_uv_sets {
            geom.uv_sets.push(r.pods(num_vertices)?);
        }

        if r.has(Field::GeomConsistency) {
            geom.consistency_flags = r.u16()?;
        }
        if r.has(Field::GeomAdditionalData) {
            geom.additional_data = r.link()?;
        }

        let num_triangles = r.u16()? as usize;
        let num_points = r.u32()? as usize;
        if num_points != num_triangles * 3 {
            return Err(r.invalid(format!(
                "{num_triangles} triangles but {num_points} triangle points"
            )));
        }
        let has_triangles = if r.has(Field::TriHasTriangles) {
            r.bool()?
        } else {
            true
        };
        let mut triangles = Vec::new();
        if has_triangles {
            r.check_count(num_triangles, 6)?;
            triangles = r.pods(num_triangles)?;
        }
        let num_groups = r.short_count(2)?;
        let mut match_groups = Vec::with_capacity(num_groups);
        for _ in 0..num_groups {
            let count = r.short_count(2)?;
            match_groups.push((0..count).map(|_| r.u16()).collect::<Result<_>>()?);
        }
        Ok(NiTriShapeData {
            geom_base: geom,
            triangles,
            match_groups,
        })
    }
}

impl Save for NiTriShapeData {
    fn save(&self, w: &mut Writer) -> Result<()> {
        let geom = &self.geom_base;
        let n = geom.num_vertices();
        let per_vertex = [
            ("normals", geom.normals.len()),
            ("tangents", geom.tangents.len()),
            ("bitangents", geom.bitangents.len()),
            ("vertex colors", geom.vertex_colors.len()),
        ];
        for (what, len) in per_vertex
            .into_iter()
            .chain(geom.uv_sets.iter().map(|uv| ("UV set", uv.len())))
        {
            if len != 0 && len != n {
                return Err(w.invalid(format!("{len} {what} for {n} vertices")));
            }
        }
        if geom.tangents.len() != geom.bitangents.len() {
            return Err(w.invalid("tangents and bitangents differ in length"));
        }

        let mut vector_flags = geom.vector_flags;
        if w.has(Field::GeomTangents) && !geom.normals.is_empty() {
            vector_flags &= !VECTOR_FLAG_TANGENTS;
            if !geom.tangents.is_empty() {
                vector_flags |= VECTOR_FLAG_TANGENTS;
            }
        }
        if w.has(Field::GeomBsVectorFlags) {
            if geom.uv_sets.len() > 1 {
                return Err(w.invalid("Bethesda geometry holds at most one UV set"));
            }
            vector_flags = (vector_flags & !BS_HAS_UV) | geom.uv_sets.len() as u16;
        } else if w.has(Field::GeomVectorFlags) {
            if geom.uv_sets.len() > UV_COUNT_MASK as usize {
                return Err(w.invalid(format!("{} UV sets", geom.uv_sets.len())));
            }
            vector_flags = (vector_flags & !UV_COUNT_MASK) | geom.uv_sets.len() as u16;
        }

        if w.has(Field::GeomGroupId) {
            w.i32(geom.group_id)?;
        }
        w.short_count(n)?;
        if w.has(Field::GeomKeepCompress) {
            w.u8(geom.keep_flags)?;
            w.u8(geom.compress_flags)?;
        }
        w.bool(n > 0)?;
        w.vec3s(&geom.vertices)?;
        if w.has(Field::GeomVectorFlags) {
            w.u16(vector_flags)?;
        }
        w.bool(!geom.normals.is_empty())?;
        w.vec3s(&geom.normals)?;
        if w.has(Field::GeomTangents)
            && !geom.normals.is_empty()
            && vector_flags & VECTOR_FLAG_TANGENTS != 0
        {
            w.vec3s(&geom.tangents)?;
            w.vec3s(&geom.bitangents)?;
        }
        w.vec3(geom.bounding_sphere.center)?;
        w.f32(geom.bounding_sphere.radius)?;
        w.bool(!geom.vertex_colors.is_empty())?;
        w.pods(&geom.vertex_colors)?;
        if w.has(Field::GeomNumUvSets) {
            w.short_count(geom.uv_sets.len())?;
        }
        if w.has(Field::GeomHasUv) {
            w.bool(!geom.uv_sets.is_empty())?;
        }
        for uv_set in &geom.uv_sets {
            w.pods(uv_set)?;
        }
        if w.has(Field::GeomConsistency) {
            w.u16(geom.consistency_flags)?;
        }
        if w.has(Field::GeomAdditionalData) {
            w.link(geom.additional_data)?;
        }

        w.short_count(self.triangles.len())?;
        w.count(self.triangles.len() * 3)?;
        if w.has(Field::TriHasTriangles) {
            w.bool(!self.triangles.is_empty())?;
        }
        w.pods(&self.triangles)?;
        w.short_count(self.match_groups.len())?;
        for group in &self.match_groups {
            w.short_count(group.len())?;
            group.iter().try_for_each(|v| w.u16(*v))?;
        }
        Ok(())
    }
}
