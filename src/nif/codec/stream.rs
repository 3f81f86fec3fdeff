//! Primitive readers and writers shared by every block codec.

use std::collections::HashMap;
use std::io::{self, Cursor, Read};

use binrw::{BinRead, BinWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::WINDOWS_1252;

use crate::nif::error::{BlockContext, NifError, Result};
use crate::nif::registry::BlockRegistry;
use crate::nif::schema::{Field, StreamFormat};
use crate::nif::types::{Matrix3x3, NiTransform, Quaternion, RecordLink, Vector2, Vector3};
use crate::nif::version::NifVersion;

/// Longest string accepted from a stream.
const MAX_STRING_LEN: usize = 0x000C_8000;

/// Names in older files are Windows-1252, newer tools write UTF-8.
fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => WINDOWS_1252.decode(err.as_bytes()).0.into_owned(),
    }
}

fn encode_text(text: &str) -> Vec<u8> {
    if text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
    if unmappable {
        text.as_bytes().to_vec()
    } else {
        bytes.into_owned()
    }
}

pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
    pub format: StreamFormat,
    /// Header string table, from 20.1.0.1.
    pub strings: Vec<String>,
    at: BlockContext,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            format: StreamFormat::default(),
            strings: Vec::new(),
            at: BlockContext::header(),
        }
    }

    /// Sets the block that errors are reported against.
    pub fn enter(&mut self, at: BlockContext) {
        self.at = at;
    }

    pub fn context(&self) -> &BlockContext {
        &self.at
    }

    /// Adds the block name to later errors once it is known.
    pub fn label(&mut self, name: &str) {
        self.at = self.at.clone().named(name);
    }

    pub fn has(&self, field: Field) -> bool {
        self.format.has(field)
    }

    pub fn version(&self) -> NifVersion {
        self.format.version
    }

    pub fn position(&self) -> u64 {
        self.cursor.position()
    }

    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position()) as usize
    }

    pub fn invalid(&self, reason: impl Into<String>) -> NifError {
        NifError::invalid(self.at.clone(), reason)
    }

    fn truncated(&self) -> NifError {
        NifError::TruncatedStream {
            at: self.at.clone(),
        }
    }

    fn io<T>(&self, result: io::Result<T>) -> Result<T> {
        result.map_err(|err| match err.kind() {
            io::ErrorKind::UnexpectedEof => self.truncated(),
            _ => NifError::Io(err),
        })
    }

    pub fn u8(&mut self) -> Result<u8> {
        let r = self.cursor.read_u8();
        self.io(r)
    }

    pub fn u16(&mut self) -> Result<u16> {
        let r = self.cursor.read_u16::<LittleEndian>();
        self.io(r)
    }

    pub fn i16(&mut self) -> Result<i16> {
        let r = self.cursor.read_i16::<LittleEndian>();
        self.io(r)
    }

    pub fn u32(&mut self) -> Result<u32> {
        let r = self.cursor.read_u32::<LittleEndian>();
        self.io(r)
    }

    pub fn i32(&mut self) -> Result<i32> {
        let r = self.cursor.read_i32::<LittleEndian>();
        self.io(r)
    }

    pub fn f32(&mut self) -> Result<f32> {
        let r = self.cursor.read_f32::<LittleEndian>();
        self.io(r)
    }

    /// A version sized bool: u32 in the oldest files, a byte afterwards.
    pub fn bool(&mut self) -> Result<bool> {
        if self.has(Field::BoolAsU32) {
            Ok(self.u32()? != 0)
        } else {
            Ok(self.u8()? != 0)
        }
    }

    pub fn byte_bool(&mut self) -> Result<bool> {
        Ok(self.u8()? != 0)
    }

    pub fn vec2(&mut self) -> Result<Vector2> {
        Ok(Vector2::new(self.f32()?, self.f32()?))
    }

    pub fn vec3(&mut self) -> Result<Vector3> {
        Ok(Vector3::new(self.f32()?, self.f32()?, self.f32()?))
    }

    /// Quaternions are stored w first.
    pub fn quat(&mut self) -> Result<Quaternion> {
        let w = self.f32()?;
        let x = self.f32()?;
        let y = self.f32()?;
        let z = self.f32()?;
        Ok(Quaternion::from_xyzw(x, y, z, w))
    }

    pub fn matrix3(&mut self) -> Result<Matrix3x3> {
        self.pod()
    }

    /// Translation, rotation, scale, in the order every block stores them.
    pub fn transform(&mut self) -> Result<NiTransform> {
        let translation = self.vec3()?;
        let rotation = self.matrix3()?;
        let scale = self.f32()?;
        Ok(NiTransform {
            rotation,
            translation,
            scale,
        })
    }

    /// A fixed record with a derived layout.
    pub fn pod<T>(&mut self) -> Result<T>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        T::read_le(&mut self.cursor).map_err(|err| {
            if err.is_eof() {
                self.truncated()
            } else {
                self.invalid(err.to_string())
            }
        })
    }

    pub fn pods<T>(&mut self, count: usize) -> Result<Vec<T>>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        (0..count).map(|_| self.pod()).collect()
    }

    pub fn vec3s(&mut self, count: usize) -> Result<Vec<Vector3>> {
        (0..count).map(|_| self.vec3()).collect()
    }

    /// Rejects counts that cannot fit in the rest of the stream.
    pub fn check_count(&self, count: usize, element_size: usize) -> Result<usize> {
        if count.saturating_mul(element_size) > self.remaining() {
            return Err(self.truncated());
        }
        Ok(count)
    }

    /// A u32 element count.
    pub fn count(&mut self, element_size: usize) -> Result<usize> {
        let count = self.u32()? as usize;
        self.check_count(count, element_size)
    }

    /// A u16 element count.
    pub fn short_count(&mut self, element_size: usize) -> Result<usize> {
        let count = self.u16()? as usize;
        self.check_count(count, element_size)
    }

    pub fn bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.check_count(len, 1)?;
        let mut buf = vec![0u8; len];
        let r = self.cursor.read_exact(&mut buf);
        self.io(r)?;
        Ok(buf)
    }

    /// u32 length followed by the characters.
    pub fn sized_string(&mut self) -> Result<String> {
        let len = self.u32()? as usize;
        if len > MAX_STRING_LEN {
            return Err(self.invalid(format!("string length {len} too long")));
        }
        let bytes = self.bytes(len)?;
        Ok(decode_text(bytes))
    }

    /// Byte length including a trailing zero.
    pub fn export_string(&mut self) -> Result<String> {
        let len = self.u8()? as usize;
        let mut bytes = self.bytes(len)?;
        if bytes.last() == Some(&0) {
            bytes.pop();
        }
        Ok(decode_text(bytes))
    }

    /// Inline string in old files, string table index in new ones.
    pub fn string(&mut self) -> Result<String> {
        if !self.has(Field::StringIndexed) {
            return self.sized_string();
        }
        let index = self.u32()?;
        if index == u32::MAX {
            return Ok(String::new());
        }
        self.strings
            .get(index as usize)
            .cloned()
            .ok_or_else(|| self.invalid(format!("string index {index} out of range")))
    }

    /// The newline terminated header line.
    pub fn line(&mut self) -> Result<String> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.u8()?;
            if byte == b'\n' {
                break;
            }
            bytes.push(byte);
            if bytes.len() > 128 {
                return Err(self.invalid("header line too long"));
            }
        }
        Ok(String::from_utf8_lossy(&bytes)
            .trim_end_matches('\r')
            .to_string())
    }

    pub fn link(&mut self) -> Result<RecordLink> {
        let raw = self.i32()?;
        RecordLink::from_raw(raw).ok_or_else(|| self.invalid(format!("invalid link index {raw}")))
    }

    pub fn link_list(&mut self) -> Result<Vec<RecordLink>> {
        let count = self.count(4)?;
        (0..count).map(|_| self.link()).collect()
    }
}

pub struct Writer<'a> {
    out: Cursor<Vec<u8>>,
    pub format: StreamFormat,
    registry: &'a BlockRegistry,
    strings: Vec<String>,
    string_ids: HashMap<String, u32>,
    at: BlockContext,
}

impl<'a> Writer<'a> {
    pub fn new(format: StreamFormat, registry: &'a BlockRegistry) -> Self {
        Self {
            out: Cursor::new(Vec::new()),
            format,
            registry,
            strings: Vec::new(),
            string_ids: HashMap::new(),
            at: BlockContext::header(),
        }
    }

    pub fn enter(&mut self, at: BlockContext) {
        self.at = at;
    }

    pub fn has(&self, field: Field) -> bool {
        self.format.has(field)
    }

    pub fn version(&self) -> NifVersion {
        self.format.version
    }

    pub fn position(&self) -> u64 {
        self.out.position()
    }

    pub fn invalid(&self, reason: impl Into<String>) -> NifError {
        NifError::invalid(self.at.clone(), reason)
    }

    /// The written bytes and the string table collected on the way.
    pub fn finish(self) -> (Vec<u8>, Vec<String>) {
        (self.out.into_inner(), self.strings)
    }

    pub fn u8(&mut self, value: u8) -> Result<()> {
        Ok(self.out.write_u8(value)?)
    }

    pub fn u16(&mut self, value: u16) -> Result<()> {
        Ok(self.out.write_u16::<LittleEndian>(value)?)
    }

    pub fn i16(&mut self, value: i16) -> Result<()> {
        Ok(self.out.write_i16::<LittleEndian>(value)?)
    }

    pub fn u32(&mut self, value: u32) -> Result<()> {
        Ok(self.out.write_u32::<LittleEndian>(value)?)
    }

    pub fn i32(&mut self, value: i32) -> Result<()> {
        Ok(self.out.write_i32::<LittleEndian>(value)?)
    }

    pub fn f32(&mut self, value: f32) -> Result<()> {
        Ok(self.out.write_f32::<LittleEndian>(value)?)
    }

    pub fn bool(&mut self, value: bool) -> Result<()> {
        if self.has(Field::BoolAsU32) {
            self.u32(value as u32)
        } else {
            self.u8(value as u8)
        }
    }

    pub fn byte_bool(&mut self, value: bool) -> Result<()> {
        self.u8(value as u8)
    }

    pub fn vec2(&mut self, value: Vector2) -> Result<()> {
        self.f32(value.x)?;
        self.f32(value.y)
    }

    pub fn vec3(&mut self, value: Vector3) -> Result<()> {
        self.f32(value.x)?;
        self.f32(value.y)?;
        self.f32(value.z)
    }

    pub fn quat(&mut self, value: Quaternion) -> Result<()> {
        self.f32(value.w)?;
        self.f32(value.x)?;
        self.f32(value.y)?;
        self.f32(value.z)
    }

    pub fn matrix3(&mut self, value: &Matrix3x3) -> Result<()> {
        self.pod(value)
    }

    pub fn transform(&mut self, value: &NiTransform) -> Result<()> {
        self.vec3(value.translation)?;
        self.matrix3(&value.rotation)?;
        self.f32(value.scale)
    }

    pub fn pod<T>(&mut self, value: &T) -> Result<()>
    where
        T: for<'b> BinWrite<Args<'b> = ()>,
    {
        value
            .write_le(&mut self.out)
            .map_err(|err| self.invalid(err.to_string()))
    }

    pub fn pods<T>(&mut self, values: &[T]) -> Result<()>
    where
        T: for<'b> BinWrite<Args<'b> = ()>,
    {
        values.iter().try_for_each(|v| self.pod(v))
    }

    pub fn vec3s(&mut self, values: &[Vector3]) -> Result<()> {
        values.iter().try_for_each(|v| self.vec3(*v))
    }

    pub fn count(&mut self, count: usize) -> Result<()> {
        let count =
            u32::try_from(count).map_err(|_| self.invalid(format!("{count} elements")))?;
        self.u32(count)
    }

    pub fn short_count(&mut self, count: usize) -> Result<()> {
        let count = u16::try_from(count)
            .map_err(|_| self.invalid(format!("{count} elements do not fit a u16 count")))?;
        self.u16(count)
    }

    pub fn bytes(&mut self, bytes: &[u8]) -> Result<()> {
        Ok(io::Write::write_all(&mut self.out, bytes)?)
    }

    pub fn sized_string(&mut self, value: &str) -> Result<()> {
        let bytes = encode_text(value);
        self.count(bytes.len())?;
        self.bytes(&bytes)
    }

    pub fn export_string(&mut self, value: &str) -> Result<()> {
        let mut bytes = encode_text(value);
        bytes.push(0);
        let len = u8::try_from(bytes.len())
            .map_err(|_| self.invalid(format!("export string '{value}' too long")))?;
        self.u8(len)?;
        self.bytes(&bytes)
    }

    pub fn string(&mut self, value: &str) -> Result<()> {
        if !self.has(Field::StringIndexed) {
            return self.sized_string(value);
        }
        if value.is_empty() {
            return self.u32(u32::MAX);
        }
        let next = self.strings.len() as u32;
        let index = *self.string_ids.entry(value.to_string()).or_insert(next);
        if index == next {
            self.strings.push(value.to_string());
        }
        self.u32(index)
    }

    pub fn line(&mut self, value: &str) -> Result<()> {
        self.bytes(value.as_bytes())?;
        self.u8(b'\n')
    }

    pub fn link(&mut self, link: RecordLink) -> Result<()> {
        let index = match link {
            RecordLink::Null => return self.i32(-1),
            RecordLink::Index(index) if (index as usize) < self.registry.len() => Some(index as usize),
            RecordLink::Index(_) => None,
            RecordLink::Block(key) => self.registry.index_of(key),
        };
        match index {
            Some(index) => self.i32(index as i32),
            None => Err(NifError::DanglingLink {
                at: self.at.clone(),
                field: "link",
                index: match link {
                    RecordLink::Index(index) => index as i64,
                    _ => -1,
                },
            }),
        }
    }

    pub fn link_list(&mut self, links: &[RecordLink]) -> Result<()> {
        self.count(links.len())?;
        links.iter().try_for_each(|link| self.link(*link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn morrowind() -> StreamFormat {
        StreamFormat::new(NifVersion::V4_0_0_2, 0, 0)
    }

    #[test]
    fn bool_width_follows_version() {
        let registry = BlockRegistry::new();
        let mut old = Writer::new(morrowind(), &registry);
        old.bool(true).unwrap();
        assert_eq!(old.finish().0, vec![1, 0, 0, 0]);

        let format = StreamFormat::new(NifVersion::V20_0_0_5, 11, 11);
        let mut new = Writer::new(format, &registry);
        new.bool(true).unwrap();
        assert_eq!(new.finish().0, vec![1]);
    }

    #[test]
    fn indexed_strings_are_interned() {
        let registry = BlockRegistry::new();
        let format = StreamFormat::new(NifVersion::V20_2_0_7, 11, 34);
        let mut writer = Writer::new(format, &registry);
        writer.string("Bip01").unwrap();
        writer.string("").unwrap();
        writer.string("Bip01").unwrap();
        let (bytes, strings) = writer.finish();
        assert_eq!(strings, vec!["Bip01".to_string()]);
        assert_eq!(bytes, [0, 0, 0, 0, 255, 255, 255, 255, 0, 0, 0, 0]);

        let mut reader = Reader::new(&bytes);
        reader.format = format;
        reader.strings = strings;
        assert_eq!(reader.string().unwrap(), "Bip01");
        assert_eq!(reader.string().unwrap(), "");
    }

    #[test]
    fn latin1_names_survive() {
        let registry = BlockRegistry::new();
        let mut writer = Writer::new(morrowind(), &registry);
        writer.sized_string("Köpf").unwrap();
        let (bytes, _) = writer.finish();
        assert_eq!(bytes.len(), 4 + 4);
        let mut reader = Reader::new(&bytes);
        reader.format = morrowind();
        assert_eq!(reader.sized_string().unwrap(), "Köpf");
    }

    #[test]
    fn short_read_is_truncation() {
        let bytes = [1u8, 0];
        let mut reader = Reader::new(&bytes);
        reader.enter(BlockContext::new("NiNode").at(2));
        let err = reader.u32().unwrap_err();
        assert!(matches!(err, NifError::TruncatedStream { at } if at.index == Some(2)));
    }

    #[test]
    fn oversized_count_is_truncation() {
        let bytes = [0xFFu8, 0xFF, 0, 0, 1, 2];
        let mut reader = Reader::new(&bytes);
        assert!(matches!(
            reader.count(12),
            Err(NifError::TruncatedStream { .. })
        ));
    }
}
