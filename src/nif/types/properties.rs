use super::base::{Color3, RecordLink, TexCoord};
use super::scene::NiObjectNET;
use std::ops::Deref;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiProperty {
    pub net_base: NiObjectNET,
}

impl Deref for NiProperty {
    type Target = NiObjectNET;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.net_base
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiMaterialProperty {
    pub property_base: NiProperty,
    pub flags: u16,
    pub ambient_color: Color3,
    pub diffuse_color: Color3,
    pub specular_color: Color3,
    pub emissive_color: Color3,
    pub glossiness: f32,
    pub alpha: f32,
    pub emissive_mult: f32,
}

impl Default for NiMaterialProperty {
    fn default() -> Self {
        let white = Color3 {
            r: 1.0,
            g: 1.0,
            b: 1.0,
        };
        Self {
            property_base: NiProperty::default(),
            flags: 0,
            ambient_color: white,
            diffuse_color: white,
            specular_color: Color3::default(),
            emissive_color: Color3::default(),
            glossiness: 10.0,
            alpha: 1.0,
            emissive_mult: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiAlphaProperty {
    pub property_base: NiProperty,
    pub flags: u16,
    pub threshold: u8,
}

impl Default for NiAlphaProperty {
    fn default() -> Self {
        // Blend src alpha / inv src alpha.
        Self {
            property_base: NiProperty::default(),
            flags: 0x00ED,
            threshold: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApplyMode {
    Replace,
    Decal,
    #[default]
    Modulate,
    Hilight,
    Hilight2,
    Unknown(u32),
}

impl From<u32> for ApplyMode {
    fn from(value: u32) -> Self {
        match value {
            0 => ApplyMode::Replace,
            1 => ApplyMode::Decal,
            2 => ApplyMode::Modulate,
            3 => ApplyMode::Hilight,
            4 => ApplyMode::Hilight2,
            other => ApplyMode::Unknown(other),
        }
    }
}

impl From<ApplyMode> for u32 {
    fn from(value: ApplyMode) -> Self {
        match value {
            ApplyMode::Replace => 0,
            ApplyMode::Decal => 1,
            ApplyMode::Modulate => 2,
            ApplyMode::Hilight => 3,
            ApplyMode::Hilight2 => 4,
            ApplyMode::Unknown(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClampMode {
    ClampSClampT,
    ClampSWrapT,
    WrapSClampT,
    #[default]
    WrapSWrapT,
    Unknown(u32),
}

impl From<u32> for ClampMode {
    fn from(value: u32) -> Self {
        match value {
            0 => ClampMode::ClampSClampT,
            1 => ClampMode::ClampSWrapT,
            2 => ClampMode::WrapSClampT,
            3 => ClampMode::WrapSWrapT,
            other => ClampMode::Unknown(other),
        }
    }
}

impl From<ClampMode> for u32 {
    fn from(value: ClampMode) -> Self {
        match value {
            ClampMode::ClampSClampT => 0,
            ClampMode::ClampSWrapT => 1,
            ClampMode::WrapSClampT => 2,
            ClampMode::WrapSWrapT => 3,
            ClampMode::Unknown(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    Nearest,
    Bilerp,
    #[default]
    Trilerp,
    NearestMipNearest,
    NearestMipLerp,
    BilerpMipNearest,
    Unknown(u32),
}

impl From<u32> for FilterMode {
    fn from(value: u32) -> Self {
        match value {
            0 => FilterMode::Nearest,
            1 => FilterMode::Bilerp,
            2 => FilterMode::Trilerp,
            3 => FilterMode::NearestMipNearest,
            4 => FilterMode::NearestMipLerp,
            5 => FilterMode::BilerpMipNearest,
            other => FilterMode::Unknown(other),
        }
    }
}

impl From<FilterMode> for u32 {
    fn from(value: FilterMode) -> Self {
        match value {
            FilterMode::Nearest => 0,
            FilterMode::Bilerp => 1,
            FilterMode::Trilerp => 2,
            FilterMode::NearestMipNearest => 3,
            FilterMode::NearestMipLerp => 4,
            FilterMode::BilerpMipNearest => 5,
            FilterMode::Unknown(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TextureTransform {
    pub translation: TexCoord,
    pub scale: TexCoord,
    pub rotation: f32,
    pub method: u32,
    pub center: TexCoord,
}

/// One texture slot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TexDesc {
    pub source: RecordLink,
    pub clamp_mode: ClampMode,
    pub filter_mode: FilterMode,
    pub uv_set: u32,
    pub ps2_l: i16,
    pub ps2_k: i16,
    pub unknown1: u16,
    pub transform: Option<TextureTransform>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BumpMapSettings {
    pub luma_scale: f32,
    pub luma_offset: f32,
    /// m11, m12, m21, m22
    pub matrix: [f32; 4],
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ShaderTexture {
    pub desc: TexDesc,
    pub map_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiTexturingProperty {
    pub property_base: NiProperty,
    pub flags: u16,
    pub apply_mode: ApplyMode,
    /// Slot count as stored; decides how many decal slots exist.
    pub texture_count: u32,
    pub base_texture: Option<TexDesc>,
    pub dark_texture: Option<TexDesc>,
    pub detail_texture: Option<TexDesc>,
    pub gloss_texture: Option<TexDesc>,
    pub glow_texture: Option<TexDesc>,
    pub bump_map_texture: Option<(TexDesc, BumpMapSettings)>,
    pub normal_texture: Option<TexDesc>,
    pub parallax_texture: Option<(TexDesc, f32)>,
    pub decal_textures: Vec<Option<TexDesc>>,
    pub shader_textures: Vec<Option<ShaderTexture>>,
}

impl NiTexturingProperty {
    /// Every used slot, for callers that only care about sources and UV sets.
    pub fn slots(&self) -> Vec<(&'static str, &TexDesc)> {
        let mut slots = Vec::new();
        let named = [
            ("base", self.base_texture.as_ref()),
            ("dark", self.dark_texture.as_ref()),
            ("detail", self.detail_texture.as_ref()),
            ("gloss", self.gloss_texture.as_ref()),
            ("glow", self.glow_texture.as_ref()),
            ("bump", self.bump_map_texture.as_ref().map(|(d, _)| d)),
            ("normal", self.normal_texture.as_ref()),
            ("parallax", self.parallax_texture.as_ref().map(|(d, _)| d)),
        ];
        for (name, desc) in named {
            if let Some(desc) = desc {
                slots.push((name, desc));
            }
        }
        for desc in self.decal_textures.iter().flatten() {
            slots.push(("decal", desc));
        }
        for shader in self.shader_textures.iter().flatten() {
            slots.push(("shader", &shader.desc));
        }
        slots
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Material(NiMaterialProperty),
    Alpha(NiAlphaProperty),
    Texturing(NiTexturingProperty),
}

impl Property {
    pub fn net(&self) -> &NiObjectNET {
        match self {
            Property::Material(p) => &p.property_base.net_base,
            Property::Alpha(p) => &p.property_base.net_base,
            Property::Texturing(p) => &p.property_base.net_base,
        }
    }

    pub fn net_mut(&mut self) -> &mut NiObjectNET {
        match self {
            Property::Material(p) => &mut p.property_base.net_base,
            Property::Alpha(p) => &mut p.property_base.net_base,
            Property::Texturing(p) => &mut p.property_base.net_base,
        }
    }
}
