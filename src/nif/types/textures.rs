use super::base::RecordLink;
use super::scene::NiObjectNET;
use std::ops::Deref;

/// Where the pixels of a source texture live.
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    External {
        file_name: String,
        unknown_link: RecordLink,
    },
    Internal {
        unknown_byte: u8,
        original_file_name: String,
        pixel_data: RecordLink,
    },
}

impl Default for TextureSource {
    fn default() -> Self {
        TextureSource::External {
            file_name: String::new(),
            unknown_link: RecordLink::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NiSourceTexture {
    pub net_base: NiObjectNET,
    pub source: TextureSource,
    pub pixel_layout: u32,
    pub use_mipmaps: u32,
    pub alpha_format: u32,
    pub is_static: bool,
    pub direct_render: bool,
    pub persist_render_data: bool,
}

impl Default for NiSourceTexture {
    fn default() -> Self {
        Self {
            net_base: NiObjectNET::default(),
            source: TextureSource::default(),
            pixel_layout: 5,
            use_mipmaps: 2,
            alpha_format: 3,
            is_static: true,
            direct_render: true,
            persist_render_data: false,
        }
    }
}

impl NiSourceTexture {
    pub fn file_name(&self) -> Option<&str> {
        match &self.source {
            TextureSource::External { file_name, .. } => Some(file_name),
            TextureSource::Internal { .. } => None,
        }
    }
}

impl Deref for NiSourceTexture {
    type Target = NiObjectNET;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.net_base
    }
}
