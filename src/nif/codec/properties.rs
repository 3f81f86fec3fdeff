use super::stream::{Reader, Writer};
use super::{Load, Save};
use crate::nif::error::Result;
use crate::nif::schema::Field;
use crate::nif::types::*;

impl Load for NiProperty {
    fn load(r: &mut Reader) -> Result<Self> {
        Ok(NiProperty {
            net_base: NiObjectNET::load(r)?,
        })
    }
}

impl Save for NiProperty {
    fn save(&self, w: &mut Writer) -> Result<()> {
        self.net_base.save(w)
    }
}

impl Load for NiMaterialProperty {
    fn load(r: &mut Reader) -> Result<Self> {
        let mut m = NiMaterialProperty {
            property_base: NiProperty::load(r)?,
            ..Default::default()
        };
        if r.has(Field::MaterialFlags) {
            m.flags = r.u16()?;
        }
        if r.has(Field::MaterialAmbientDiffuse) {
            m.ambient_color = r.pod()?;
            m.diffuse_color = r.pod()?;
        }
        m.specular_color = r.pod()?;
        m.emissive_color = r.pod()?;
        m.glossiness = r.f32()?;
        m.alpha = r.f32()?;
        if r.has(Field::MaterialEmissiveMult) {
            m.emissive_mult = r.f32()?;
        }
        Ok(m)
    }
}

impl Save for NiMaterialProperty {
    fn save(&self, w: &mut Writer) -> Result<()> {
        self.property_base.save(w)?;
        if w.has(Field::MaterialFlags) {
            w.u16(self.flags)?;
        }
        if w.has(Field::MaterialAmbientDiffuse) {
            w.pod(&self.ambient_color)?;
            w.pod(&self.diffuse_color)?;
        }
        w.pod(&self.specular_color)?;
        w.pod(&self.emissive_color)?;
        w.f32(self.glossiness)?;
        w.f32(self.alpha)?;
        if w.has(Field::MaterialEmissiveMult) {
            w.f32(self.emissive_mult)?;
        }
        Ok(())
    }
}

impl Load for NiAlphaProperty {
    fn load(r: &mut Reader) -> Result<Self> {
        Ok(NiAlphaProperty {
            property_base: NiProperty::load(r)?,
            flags: r.u16()?,
            threshold: r.u8()?,
        })
    }
}

impl Save for NiAlphaProperty {
    fn save(&self, w: &mut Writer) -> Result<()> {
        self.property_base.save(w)?;
        w.u16(self.flags)?;
        w.u8(self.threshold)
    }
}

impl Load for TextureTransform {
    fn load(r: &mut Reader) -> Result<Self> {
        Ok(TextureTransform {
            translation: r.pod()?,
            scale: r.pod()?,
            rotation: r.f32()?,
            method: r.u32()?,
            center: r.pod()?,
        })
    }
}

impl Save for TextureTransform {
    fn save(&self, w: &mut Writer) -> Result<()> {
        w.pod(&self.translation)?;
        w.pod(&self.scale)?;
        w.f32(self.rotation)?;
        w.u32(self.method)?;
        w.pod(&self.center)
    }
}

// Packed TexDesc flags from 20.1.0.3: uv set in the low byte, then filter, then clamp.
const PACKED_UV_MASK: u16 = 0x00FF;
const PACKED_FILTER_SHIFT: u16 = 8;
const PACKED_CLAMP_SHIFT: u16 = 12;

impl Load for TexDesc {
    fn load(r: &mut Reader) -> Result<Self> {
        let mut desc = TexDesc {
            source: r.link()?,
            ..Default::default()
        };
        if r.has(Field::TexDescClampFilter) {
            desc.clamp_mode = ClampMode::from(r.u32()?);
            desc.filter_mode = FilterMode::from(r.u32()?);
        }
        if r.has(Field::TexDescPackedFlags) {
            let flags = r.u16()?;
            desc.uv_set = (flags & PACKED_UV_MASK) as u32;
            desc.filter_mode = FilterMode::from(((flags >> PACKED_FILTER_SHIFT) & 0xF) as u32);
            desc.clamp_mode = ClampMode::from(((flags >> PACKED_CLAMP_SHIFT) & 0x3) as u32);
        }
        if r.has(Field::TexDescUvSet) {
            desc.uv_set = r.u32()?;
        }
        if r.has(Field::TexDescPs2) {
            desc.ps2_l = r.i16()?;
            desc.ps2_k = r.i16()?;
        }
        if r.has(Field::TexDescUnknown1) {
            desc.unknown1 = r.u16()?;
        }
        if r.has(Field::TexDescTransform) && r.bool()? {
            desc.transform = Some(TextureTransform::load(r)?);
        }
        Ok(desc)
    }
}

impl Save for TexDesc {
    fn save(&self, w: &mut Writer) -> Result<()> {
        w.link(self.source)?;
        if w.has(Field::TexDescClampFilter) {
            w.u32(self.clamp_mode.into())?;
            w.u32(self.filter_mode.into())?;
        }
        if w.has(Field::TexDescPackedFlags) {
            let clamp: u32 = self.clamp_mode.into();
            let filter: u32 = self.filter_mode.into();
            if clamp > 0x3 || filter > 0xF || self.uv_set > PACKED_UV_MASK as u32 {
                return Err(w.invalid("texture flags do not fit the packed layout"));
            }
            let flags = (clamp as u16) << PACKED_CLAMP_SHIFT
                | (filter as u16) << PACKED_FILTER_SHIFT
                | self.uv_set as u16;
            w.u16(flags)?;
        }
        if w.has(Field::TexDescUvSet) {
            w.u32(self.uv_set)?;
        }
        if w.has(Field::TexDescPs2) {
            w.i16(self.ps2_l)?;
            w.i16(self.ps2_k)?;
        }
        if w.has(Field::TexDescUnknown1) {
            w.u16(self.unknown1)?;
        }
        if w.has(Field::TexDescTransform) {
            w.bool(self.transform.is_some())?;
            if let Some(transform) = &self.transform {
                transform.save(w)?;
            }
        }
        Ok(())
    }
}

fn load_slot(r: &mut Reader) -> Result<Option<TexDesc>> {
    if r.bool()? {
        Ok(Some(TexDesc::load(r)?))
    } else {
        Ok(None)
    }
}

fn save_slot(w: &mut Writer, slot: Option<&TexDesc>) -> Result<()> {
    w.bool(slot.is_some())?;
    match slot {
        Some(desc) => desc.save(w),
        None => Ok(()),
    }
}

/// Slots before the first decal: base, dark, detail, gloss, glow, bump,
/// plus normal and parallax from 20.2.0.5.
fn fixed_slots(has_normal_parallax: bool) -> u32 {
    if has_normal_parallax { 8 } else { 6 }
}

/// Number of decal slots stored for a texture count.
fn decal_slots(texture_count: u32, has_normal_parallax: bool) -> usize {
    texture_count.saturating_sub(fixed_slots(has_normal_parallax)).min(4) as usize
}

impl Load for NiTexturingProperty {
    fn load(r: &mut Reader) -> Result<Self> {
        let mut t = NiTexturingProperty {
            property_base: NiProperty::load(r)?,
            ..Default::default()
        };
        if r.has(Field::TexturingFlagsOld) || r.has(Field::TexturingFlagsNew) {
            t.flags = r.u16()?;
        }
        if r.has(Field::TexturingApplyMode) {
            t.apply_mode = ApplyMode::from(r.u32()?);
        }
        t.texture_count = r.u32()?;
        t.base_texture = load_slot(r)?;
        t.dark_texture = load_slot(r)?;
        t.detail_texture = load_slot(r)?;
        t.gloss_texture = load_slot(r)?;
        t.glow_texture = load_slot(r)?;
        if r.bool()? {
            let desc = TexDesc::load(r)?;
            let settings = BumpMapSettings {
                luma_scale: r.f32()?,
                luma_offset: r.f32()?,
                matrix: [r.f32()?, r.f32()?, r.f32()?, r.f32()?],
            };
            t.bump_map_texture = Some((desc, settings));
        }
        let has_normal_parallax = r.has(Field::TexturingNormalParallax);
        if has_normal_parallax {
            t.normal_texture = load_slot(r)?;
            if r.bool()? {
                let desc = TexDesc::load(r)?;
                t.parallax_texture = Some((desc, r.f32()?));
            }
        }
        for _ in 0..decal_slots(t.texture_count, has_normal_parallax) {
            t.decal_textures.push(load_slot(r)?);
        }
        if r.has(Field::TexturingShaderTextures) {
            let count = r.count(1)?;
            for _ in 0..count {
                let shader = if r.bool()? {
                    Some(ShaderTexture {
                        desc: TexDesc::load(r)?,
                        map_id: r.u32()?,
                    })
                } else {
                    None
                };
                t.shader_textures.push(shader);
            }
        }
        Ok(t)
    }
}

impl Save for NiTexturingProperty {
    fn save(&self, w: &mut Writer) -> Result<()> {
        self.property_base.save(w)?;
        if w.has(Field::TexturingFlagsOld) || w.has(Field::TexturingFlagsNew) {
            w.u16(self.flags)?;
        }
        if w.has(Field::TexturingApplyMode) {
            w.u32(self.apply_mode.into())?;
        }
        let has_normal_parallax = w.has(Field::TexturingNormalParallax);
        if self.decal_textures.len() > 4 {
            return Err(w.invalid("at most four decal textures"));
        }
        // The count must cover every decal slot that is written.
        let texture_count = if self.decal_textures.is_empty() {
            self.texture_count
        } else {
            self.texture_count
                .max(fixed_slots(has_normal_parallax) + self.decal_textures.len() as u32)
        };
        w.u32(texture_count)?;
        save_slot(w, self.base_texture.as_ref())?;
        save_slot(w, self.dark_texture.as_ref())?;
        save_slot(w, self.detail_texture.as_ref())?;
        save_slot(w, self.gloss_texture.as_ref())?;
        save_slot(w, self.glow_texture.as_ref())?;
        w.bool(self.bump_map_texture.is_some())?;
        if let Some((desc, settings)) = &self.bump_map_texture {
            desc.save(w)?;
            w.f32(settings.luma_scale)?;
            w.f32(settings.luma_offset)?;
            settings.matrix.iter().try_for_each(|v| w.f32(*v))?;
        }
        if has_normal_parallax {
            save_slot(w, self.normal_texture.as_ref())?;
            w.bool(self.parallax_texture.is_some())?;
            if let Some((desc, offset)) = &self.parallax_texture {
                desc.save(w)?;
                w.f32(*offset)?;
            }
        }
        for i in 0..decal_slots(texture_count, has_normal_parallax) {
            save_slot(w, self.decal_textures.get(i).and_then(Option::as_ref))?;
        }
        if w.has(Field::TexturingShaderTextures) {
            w.count(self.shader_textures.len())?;
            for shader in &self.shader_textures {
                w.bool(shader.is_some())?;
                if let Some(shader) = shader {
                    shader.desc.save(w)?;
                    w.u32(shader.map_id)?;
                }
            }
        }
        Ok(())
    }
}

impl Load for NiSourceTexture {
    fn load(r: &mut Reader) -> Result<Self> {
        let net_base = NiObjectNET::load(r)?;
        let source = if r.u8()? != 0 {
            let file_name = r.string()?;
            let unknown_link = if r.has(Field::SourceUnknownLink) {
                r.link()?
            } else {
                RecordLink::Null
            };
            TextureSource::External {
                file_name,
                unknown_link,
            }
        } else {
            let unknown_byte = if r.has(Field::SourceUnknownByte) {
                r.u8()?
            } else {
                0
            };
            let original_file_name = if r.has(Field::SourceOriginalName) {
                r.string()?
            } else {
                String::new()
            };
            TextureSource::Internal {
                unknown_byte,
                original_file_name,
                pixel_data: r.link()?,
            }
        };
        let mut texture = NiSourceTexture {
            net_base,
            source,
            pixel_layout: r.u32()?,
            use_mipmaps: r.u32()?,
            alpha_format: r.u32()?,
            is_static: r.byte_bool()?,
            ..Default::default()
        };
        if r.has(Field::SourceDirectRender) {
            texture.direct_render = r.byte_bool()?;
        }
        if r.has(Field::SourcePersist) {
            texture.persist_render_data = r.byte_bool()?;
        }
        Ok(texture)
    }
}

impl Save for NiSourceTexture {
    fn save(&self, w: &mut Writer) -> Result<()> {
        self.net_base.save(w)?;
        match &self.source {
            TextureSource::External {
                file_name,
                unknown_link,
            } => {
                w.u8(1)?;
                w.string(file_name)?;
                if w.has(Field::SourceUnknownLink) {
                    w.link(*unknown_link)?;
                }
            }
            TextureSource::Internal {
                unknown_byte,
                original_file_name,
                pixel_data,
            } => {
                w.u8(0)?;
                if w.has(Field::SourceUnknownByte) {
                    w.u8(*unknown_byte)?;
                }
                if w.has(Field::SourceOriginalName) {
                    w.string(original_file_name)?;
                }
                w.link(*pixel_data)?;
            }
        }
        w.u32(self.pixel_layout)?;
        w.u32(self.use_mipmaps)?;
        w.u32(self.alpha_format)?;
        w.byte_bool(self.is_static)?;
        if w.has(Field::SourceDirectRender) {
            w.byte_bool(self.direct_render)?;
        }
        if w.has(Field::SourcePersist) {
            w.byte_bool(self.persist_render_data)?;
        }
        Ok(())
    }
}
