use bevy::log::debug;

use super::stream::{Reader, Writer};
use crate::nif::error::{NifError, Result};
use crate::nif::schema::{Field, StreamFormat};
use crate::nif::types::BlockType;
use crate::nif::version::NifVersion;

/// The version triple plus the Bethesda export info strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    pub version: NifVersion,
    pub user_version: u32,
    /// Bethesda stream version, also known as user version 2.
    pub bs_version: u32,
    pub author: String,
    pub process_script: String,
    pub export_script: String,
}

impl Header {
    pub fn new(version: NifVersion, user_version: u32, bs_version: u32) -> Self {
        Self {
            version,
            user_version,
            bs_version,
            ..Default::default()
        }
    }

    pub fn format(&self) -> StreamFormat {
        StreamFormat::new(self.version, self.user_version, self.bs_version)
    }

    pub fn check_supported(&self) -> Result<()> {
        if !self.version.is_supported() || self.bs_version > NifVersion::MAX_BS_VERSION {
            return Err(NifError::UnsupportedVersion {
                version: self.version,
                user_version: self.user_version,
            });
        }
        Ok(())
    }
}

/// Header parts that describe the block records rather than the file.
#[derive(Debug, Clone, Default)]
pub struct BlockTable {
    pub num_blocks: usize,
    pub block_types: Vec<BlockType>,
    /// Per block index into `block_types`.
    pub type_indices: Vec<u16>,
    pub block_sizes: Vec<u32>,
    pub strings: Vec<String>,
}

impl BlockTable {
    /// Type of the block at `index`, from the header table.
    pub fn block_type(&self, index: usize) -> Option<BlockType> {
        let type_index = *self.type_indices.get(index)?;
        self.block_types.get(type_index as usize).copied()
    }
}

fn parse_version_line(reader: &Reader, line: &str) -> Result<NifVersion> {
    let known = ["NetImmerse File Format", "Gamebryo File Format"];
    if !known.iter().any(|prefix| line.starts_with(prefix)) {
        return Err(reader.invalid("not a NIF file"));
    }
    let (_, dotted) = line
        .split_once("Version ")
        .ok_or_else(|| reader.invalid(format!("no version in '{line}'")))?;
    dotted.parse().map_err(|err: String| reader.invalid(err))
}

pub fn read_header(r: &mut Reader) -> Result<(Header, BlockTable)> {
    let line = r.line()?;
    let version = parse_version_line(r, &line)?;
    let mut header = Header::new(version, 0, 0);
    if !version.is_supported() {
        return Err(NifError::UnsupportedVersion {
            version,
            user_version: 0,
        });
    }
    let stored = NifVersion(r.u32()?);
    if stored != version {
        return Err(r.invalid(format!(
            "header line says {version} but version field is {stored}"
        )));
    }
    r.format = header.format();

    if r.has(Field::HeaderEndian) && r.u8()? == 0 {
        return Err(r.invalid("big endian streams are not supported"));
    }
    if r.has(Field::HeaderUserVersion) {
        header.user_version = r.u32()?;
        r.format = header.format();
    }
    let num_blocks = r.count(1)?;

    if r.has(Field::HeaderBsStream) {
        header.bs_version = r.u32()?;
        r.format = header.format();
        header.author = r.export_string()?;
        if r.has(Field::HeaderBsProcessScript) {
            header.process_script = r.export_string()?;
        }
        header.export_script = r.export_string()?;
    }
    header.check_supported()?;
    debug!(
        "NIF {} user version {} stream {} with {num_blocks} blocks",
        header.version, header.user_version, header.bs_version
    );

    let mut table = BlockTable {
        num_blocks,
        ..Default::default()
    };
    if r.has(Field::HeaderBlockTypes) {
        let num_types = r.short_count(4)?;
        for _ in 0..num_types {
            let name = r.sized_string()?;
            let block_type =
                BlockType::from_name(&name).ok_or(NifError::UnknownBlockType {
                    type_name: name,
                    index: None,
                })?;
            table.block_types.push(block_type);
        }
        for index in 0..num_blocks {
            // The top bit flags PhysX blocks in later streams.
            let type_index = r.u16()? & 0x7FFF;
            if type_index as usize >= num_types {
                return Err(r.invalid(format!(
                    "block {index} uses type {type_index} of {num_types}"
                )));
            }
            table.type_indices.push(type_index);
        }
    }
    if r.has(Field::HeaderBlockSizes) {
        r.check_count(num_blocks, 4)?;
        for _ in 0..num_blocks {
            table.block_sizes.push(r.u32()?);
        }
    }
    if r.has(Field::HeaderStrings) {
        let num_strings = r.count(4)?;
        let _max_length = r.u32()?;
        for _ in 0..num_strings {
            table.strings.push(r.sized_string()?);
        }
    }
    if r.has(Field::HeaderGroups) {
        let num_groups = r.count(4)?;
        for _ in 0..num_groups {
            r.u32()?;
        }
    }
    Ok((header, table))
}

pub fn write_header(w: &mut Writer, header: &Header, table: &BlockTable) -> Result<()> {
    w.line(&header.version.header_line())?;
    w.u32(header.version.0)?;
    if w.has(Field::HeaderEndian) {
        w.u8(1)?;
    }
    if w.has(Field::HeaderUserVersion) {
        w.u32(header.user_version)?;
    }
    w.count(table.num_blocks)?;
    if w.has(Field::HeaderBsStream) {
        w.u32(header.bs_version)?;
        w.export_string(&header.author)?;
        if w.has(Field::HeaderBsProcessScript) {
            w.export_string(&header.process_script)?;
        }
        w.export_string(&header.export_script)?;
    }
    if w.has(Field::HeaderBlockTypes) {
        w.short_count(table.block_types.len())?;
        for block_type in &table.block_types {
            w.sized_string(block_type.name())?;
        }
        for type_index in &table.type_indices {
            w.u16(*type_index)?;
        }
    }
    if w.has(Field::HeaderBlockSizes) {
        for size in &table.block_sizes {
            w.u32(*size)?;
        }
    }
    if w.has(Field::HeaderStrings) {
        w.count(table.strings.len())?;
        let max_length = table.strings.iter().map(String::len).max().unwrap_or(0);
        w.count(max_length)?;
        for string in &table.strings {
            w.sized_string(string)?;
        }
    }
    if w.has(Field::HeaderGroups) {
        w.u32(0)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::registry::BlockRegistry;

    fn write(header: &Header, table: &BlockTable) -> Vec<u8> {
        let registry = BlockRegistry::new();
        let mut w = Writer::new(header.format(), &registry);
        write_header(&mut w, header, table).unwrap();
        w.finish().0
    }

    #[test]
    fn morrowind_header_is_minimal() {
        let header = Header::new(NifVersion::V4_0_0_2, 0, 0);
        let table = BlockTable {
            num_blocks: 3,
            ..Default::default()
        };
        let bytes = write(&header, &table);
        let mut expected = b"NetImmerse File Format, Version 4.0.0.2\n".to_vec();
        expected.extend_from_slice(&[2, 0, 0, 4, 3, 0, 0, 0]);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn bethesda_header_round_trips() {
        let header = Header {
            author: "nif_graph".into(),
            export_script: "export.py".into(),
            ..Header::new(NifVersion::V20_2_0_7, 11, 34)
        };
        let table = BlockTable {
            num_blocks: 2,
            block_types: vec![BlockType::BSFadeNode, BlockType::NiTriShape],
            type_indices: vec![0, 1],
            block_sizes: vec![100, 60],
            strings: vec!["Scene Root".into(), "Shape".into()],
        };
        let bytes = write(&header, &table);
        let mut r = Reader::new(&bytes);
        let (read, read_table) = read_header(&mut r).unwrap();
        assert_eq!(read, header);
        assert_eq!(read_table.block_type(1), Some(BlockType::NiTriShape));
        assert_eq!(read_table.block_sizes, vec![100, 60]);
        assert_eq!(read_table.strings, table.strings);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn unsupported_version_stops_early() {
        let mut bytes = b"Gamebryo File Format, Version 20.3.0.9\n".to_vec();
        bytes.extend_from_slice(&0x1403_0009u32.to_le_bytes());
        let mut r = Reader::new(&bytes);
        assert!(matches!(
            read_header(&mut r),
            Err(NifError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn unknown_type_in_table() {
        let header = Header::new(NifVersion::V20_0_0_5, 11, 11);
        let registry = BlockRegistry::new();
        let mut w = Writer::new(header.format(), &registry);
        w.line(&header.version.header_line()).unwrap();
        w.u32(header.version.0).unwrap();
        w.u8(1).unwrap();
        w.u32(11).unwrap();
        w.u32(1).unwrap();
        w.u32(11).unwrap();
        w.export_string("").unwrap();
        w.export_string("").unwrap();
        w.export_string("").unwrap();
        w.u16(1).unwrap();
        w.sized_string("NiParticleSystem").unwrap();
        w.u16(0).unwrap();
        let bytes = w.finish().0;
        let err = read_header(&mut Reader::new(&bytes)).unwrap_err();
        assert!(
            matches!(err, NifError::UnknownBlockType { ref type_name, .. } if type_name == "NiParticleSystem")
        );
    }
}
