use super::animation::TextKey;
use super::base::RecordLink;
use std::ops::Deref;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraFields {
    /// Written from 10.0.1.0 on.
    pub name: String,
    /// Link to the next NiExtraData in the chain attached to the owner node.
    pub next_extra_data_link: RecordLink,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiTextKeyExtraData {
    pub extra_base: ExtraFields,
    /// Legacy field before the key list in old streams.
    pub unknown_int: u32,
    pub text_keys: Vec<TextKey>,
}

impl Deref for NiTextKeyExtraData {
    type Target = ExtraFields;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.extra_base
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NiStringExtraData {
    pub extra_base: ExtraFields,
    pub string_data: String,
}

impl Deref for NiStringExtraData {
    type Target = ExtraFields;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.extra_base
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtraData {
    TextKeys(NiTextKeyExtraData),
    String(NiStringExtraData),
}

impl ExtraData {
    pub fn fields(&self) -> &ExtraFields {
        match self {
            ExtraData::TextKeys(e) => &e.extra_base,
            ExtraData::String(e) => &e.extra_base,
        }
    }

    pub fn fields_mut(&mut self) -> &mut ExtraFields {
        match self {
            ExtraData::TextKeys(e) => &mut e.extra_base,
            ExtraData::String(e) => &mut e.extra_base,
        }
    }
}
