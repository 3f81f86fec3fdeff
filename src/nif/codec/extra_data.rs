use super::stream::{Reader, Writer};
use super::{Load, Save};
use crate::nif::error::Result;
use crate::nif::schema::Field;
use crate::nif::types::*;

impl Load for ExtraFields {
    fn load(r: &mut Reader) -> Result<Self> {
        let mut fields = ExtraFields::default();
        if r.has(Field::ExtraName) {
            fields.name = r.string()?;
            r.label(&fields.name);
        }
        if r.has(Field::ExtraNext) {
            fields.next_extra_data_link = r.link()?;
        }
        Ok(fields)
    }
}

impl Save for ExtraFields {
    fn save(&self, w: &mut Writer) -> Result<()> {
        if w.has(Field::ExtraName) {
            w.string(&self.name)?;
        }
        if w.has(Field::ExtraNext) {
            w.link(self.next_extra_data_link)?;
        }
        Ok(())
    }
}

impl Load for NiTextKeyExtraData {
    fn load(r: &mut Reader) -> Result<Self> {
        let extra_base = ExtraFields::load(r)?;
        let unknown_int = if r.has(Field::ExtraLegacyInt) {
            r.u32()?
        } else {
            0
        };
        let count = r.count(8)?;
        let mut text_keys = Vec::with_capacity(count);
        for _ in 0..count {
            text_keys.push(TextKey {
                time: r.f32()?,
                value: r.string()?,
            });
        }
        Ok(NiTextKeyExtraData {
            extra_base,
            unknown_int,
            text_keys,
        })
    }
}

impl Save for NiTextKeyExtraData {
    fn save(&self, w: &mut Writer) -> Result<()> {
        self.extra_base.save(w)?;
        if w.has(Field::ExtraLegacyInt) {
            w.u32(self.unknown_int)?;
        }
        w.count(self.text_keys.len())?;
        for key in &self.text_keys {
            w.f32(key.time)?;
            w.string(&key.value)?;
        }
        Ok(())
    }
}

impl Load for NiStringExtraData {
    fn load(r: &mut Reader) -> Result<Self> {
        let extra_base = ExtraFields::load(r)?;
        if r.has(Field::ExtraLegacyInt) {
            // Byte count of the string that follows, recomputed on save.
            r.u32()?;
        }
        Ok(NiStringExtraData {
            extra_base,
            string_data: r.string()?,
        })
    }
}

impl Save for NiStringExtraData {
    fn save(&self, w: &mut Writer) -> Result<()> {
        self.extra_base.save(w)?;
        if w.has(Field::ExtraLegacyInt) {
            w.count(self.string_data.len() + 4)?;
        }
        w.string(&self.string_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::registry::BlockRegistry;
    use crate::nif::schema::StreamFormat;
    use crate::nif::version::NifVersion;

    #[test]
    fn morrowind_string_extra_data_counts_its_bytes() {
        let registry = BlockRegistry::new();
        let format = StreamFormat::new(NifVersion::V4_0_0_2, 0, 0);
        let mut w = Writer::new(format, &registry);
        let data = NiStringExtraData {
            string_data: "Bip01".into(),
            ..Default::default()
        };
        data.save(&mut w).unwrap();
        let (bytes, _) = w.finish();
        // next link, byte count, length, text
        assert_eq!(&bytes[..12], &[255, 255, 255, 255, 9, 0, 0, 0, 5, 0, 0, 0]);
        let mut r = Reader::new(&bytes);
        r.format = format;
        assert_eq!(NiStringExtraData::load(&mut r).unwrap(), data);
    }
}
