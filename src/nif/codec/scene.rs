use super::stream::{Reader, Writer};
use super::{Load, Save};
use crate::nif::error::Result;
use crate::nif::schema::Field;
use crate::nif::types::*;

impl Load for NiObjectNET {
    fn load(r: &mut Reader) -> Result<Self> {
        let name = r.string()?;
        r.label(&name);
        let extra_data_link = if r.has(Field::NetExtraData) {
            r.link()?
        } else {
            RecordLink::Null
        };
        let extra_data_list = if r.has(Field::NetExtraDataList) {
            r.link_list()?
        } else {
            Vec::new()
        };
        let controller_link = r.link()?;
        Ok(NiObjectNET {
            name,
            extra_data_link,
            extra_data_list,
            controller_link,
        })
    }
}

impl Save for NiObjectNET {
    fn save(&self, w: &mut Writer) -> Result<()> {
        w.string(&self.name)?;
        if w.has(Field::NetExtraData) {
            w.link(self.extra_data_link)?;
        }
        if w.has(Field::NetExtraDataList) {
            w.link_list(&self.extra_data_list)?;
        }
        w.link(self.controller_link)
    }
}

impl Load for BoundingVolume {
    fn load(r: &mut Reader) -> Result<Self> {
        let volume = match r.u32()? {
            0 => BoundingVolume::Sphere(BoundingSphere {
                center: r.vec3()?,
                radius: r.f32()?,
            }),
            1 => BoundingVolume::Box(BoundingBox {
                center: r.vec3()?,
                axes: r.matrix3()?,
                extent: r.vec3()?,
            }),
            2 => BoundingVolume::Capsule(BoundingCapsule {
                center: r.vec3()?,
                origin: r.vec3()?,
                extent: r.f32()?,
                radius: r.f32()?,
            }),
            4 => {
                let count = r.count(4)?;
                let volumes = (0..count)
                    .map(|_| BoundingVolume::load(r))
                    .collect::<Result<_>>()?;
                BoundingVolume::Union(volumes)
            }
            5 => BoundingVolume::HalfSpace(BoundingHalfSpace {
                plane: Plane {
                    normal: r.vec3()?,
                    constant: r.f32()?,
                },
                center: r.vec3()?,
            }),
            other => return Err(r.invalid(format!("bounding volume type {other}"))),
        };
        Ok(volume)
    }
}

impl Save for BoundingVolume {
    fn save(&self, w: &mut Writer) -> Result<()> {
        w.u32(self.type_id())?;
        match self {
            BoundingVolume::Sphere(s) => {
                w.vec3(s.center)?;
                w.f32(s.radius)
            }
            BoundingVolume::Box(b) => {
                w.vec3(b.center)?;
                w.matrix3(&b.axes)?;
                w.vec3(b.extent)
            }
            BoundingVolume::Capsule(c) => {
                w.vec3(c.center)?;
                w.vec3(c.origin)?;
                w.f32(c.extent)?;
                w.f32(c.radius)
            }
            BoundingVolume::Union(volumes) => {
                w.count(volumes.len())?;
                volumes.iter().try_for_each(|v| v.save(w))
            }
            BoundingVolume::HalfSpace(h) => {
                w.vec3(h.plane.normal)?;
                w.f32(h.plane.constant)?;
                w.vec3(h.center)
            }
        }
    }
}

impl Load for NiAVObject {
    fn load(r: &mut Reader) -> Result<Self> {
        let net_base = NiObjectNET::load(r)?;
        let flags = if r.has(Field::AvFlagsU32) {
            r.u32()?
        } else {
            r.u16()? as u32
        };
        let transform = r.transform()?;
        let velocity = if r.has(Field::AvVelocity) {
            r.vec3()?
        } else {
            Vector3::ZERO
        };
        let properties = r.link_list()?;
        let mut bounding_volume = None;
        if r.has(Field::AvBoundingVolume) && r.bool()? {
            bounding_volume = Some(BoundingVolume::load(r)?);
        }
        let collision_object = if r.has(Field::AvCollisionObject) {
            r.link()?
        } else {
            RecordLink::Null
        };
        Ok(NiAVObject {
            net_base,
            flags,
            transform,
            velocity,
            properties,
            bounding_volume,
            collision_object,
        })
    }
}

impl Save for NiAVObject {
    fn save(&self, w: &mut Writer) -> Result<()> {
        self.net_base.save(w)?;
        if w.has(Field::AvFlagsU32) {
            w.u32(self.flags)?;
        } else {
            let flags = u16::try_from(self.flags)
                .map_err(|_| w.invalid(format!("flags {:#x} need 32 bits", self.flags)))?;
            w.u16(flags)?;
        }
        w.transform(&self.transform)?;
        if w.has(Field::AvVelocity) {
            w.vec3(self.velocity)?;
        }
        w.link_list(&self.properties)?;
        if w.has(Field::AvBoundingVolume) {
            w.bool(self.bounding_volume.is_some())?;
            if let Some(volume) = &self.bounding_volume {
                volume.save(w)?;
            }
        }
        if w.has(Field::AvCollisionObject) {
            w.link(self.collision_object)?;
        }
        Ok(())
    }
}

impl Load for NiNode {
    fn load(r: &mut Reader) -> Result<Self> {
        Ok(NiNode {
            av_base: NiAVObject::load(r)?,
            kind: NodeKind::default(),
            children: r.link_list()?,
            effects: r.link_list()?,
        })
    }
}

impl Save for NiNode {
    fn save(&self, w: &mut Writer) -> Result<()> {
        self.av_base.save(w)?;
        w.link_list(&self.children)?;
        w.link_list(&self.effects)
    }
}

impl Load for NiTriShape {
    fn load(r: &mut Reader) -> Result<Self> {
        let av_base = NiAVObject::load(r)?;
        let data_link = r.link()?;
        let skin_link = r.link()?;
        let mut shader = None;
        if r.has(Field::ShapeShader) && r.bool()? {
            shader = Some(ShaderInfo {
                name: r.string()?,
                unknown_integer: r.i32()?,
            });
        }
        let mut materials = MaterialList::default();
        if r.has(Field::ShapeMaterials) {
            let count = r.count(8)?;
            materials.names = (0..count).map(|_| r.string()).collect::<Result<_>>()?;
            materials.extra_data = (0..count).map(|_| r.i32()).collect::<Result<_>>()?;
            materials.active = r.i32()?;
        }
        if r.has(Field::ShapeMaterialNeedsUpdate) {
            materials.needs_update = r.byte_bool()?;
        }
        Ok(NiTriShape {
            av_base,
            data_link,
            skin_link,
            shader,
            materials,
        })
    }
}

impl Save for NiTriShape {
    fn save(&self, w: &mut Writer) -> Result<()> {
        self.av_base.save(w)?;
        w.link(self.data_link)?;
        w.link(self.skin_link)?;
        if w.has(Field::ShapeShader) {
            w.bool(self.shader.is_some())?;
            if let Some(shader) = &self.shader {
                w.string(&shader.name)?;
                w.i32(shader.unknown_integer)?;
            }
        }
        if w.has(Field::ShapeMaterials) {
            let m = &self.materials;
            if m.extra_data.len() != m.names.len() {
                return Err(w.invalid("material names and extra data differ in length"));
            }
            w.count(m.names.len())?;
            m.names.iter().try_for_each(|name| w.string(name))?;
            m.extra_data.iter().try_for_each(|v| w.i32(*v))?;
            w.i32(m.active)?;
        }
        if w.has(Field::ShapeMaterialNeedsUpdate) {
            w.byte_bool(self.materials.needs_update)?;
        }
        Ok(())
    }
}

impl Load for NiCollisionData {
    fn load(r: &mut Reader) -> Result<Self> {
        let target = r.link()?;
        let propagation_mode = r.u32()?;
        let collision_mode = if r.has(Field::CollisionMode) {
            r.u32()?
        } else {
            NiCollisionData::default().collision_mode
        };
        let mut bounding_volume = None;
        if r.byte_bool()? {
            bounding_volume = Some(BoundingVolume::load(r)?);
        }
        Ok(NiCollisionData {
            target,
            propagation_mode,
            collision_mode,
            bounding_volume,
        })
    }
}

impl Save for NiCollisionData {
    fn save(&self, w: &mut Writer) -> Result<()> {
        w.link(self.target)?;
        w.u32(self.propagation_mode)?;
        if w.has(Field::CollisionMode) {
            w.u32(self.collision_mode)?;
        }
        w.byte_bool(self.bounding_volume.is_some())?;
        if let Some(volume) = &self.bounding_volume {
            volume.save(w)?;
        }
        Ok(())
    }
}

impl Load for NiSequenceStreamHelper {
    fn load(r: &mut Reader) -> Result<Self> {
        Ok(NiSequenceStreamHelper {
            net_base: NiObjectNET::load(r)?,
        })
    }
}

impl Save for NiSequenceStreamHelper {
    fn save(&self, w: &mut Writer) -> Result<()> {
        self.net_base.save(w)
    }
}
