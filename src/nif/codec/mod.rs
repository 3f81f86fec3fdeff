//! Binary NIF codec.
//!
//! Every block type implements [`Load`] and [`Save`]; both sides consult the
//! schema table for version gated fields. Decoding stores raw link indices
//! and hands the registry to the resolver; encoding checks every link first
//! and only then produces bytes.

pub mod animation;
pub mod extra_data;
pub mod geometry;
pub mod header;
pub mod properties;
pub mod scene;
pub mod skin;
pub mod stream;

use std::path::Path;

use bevy::log::info;

pub use header::{BlockTable, Header};
use stream::{Reader, Writer};

use super::error::{BlockContext, NifError, Result};
use super::registry::{BlockRef, BlockRegistry};
use super::resolver;
use super::schema::Field;
use super::types::*;

pub trait Load: Sized {
    fn load(r: &mut Reader) -> Result<Self>;
}

pub trait Save {
    fn save(&self, w: &mut Writer) -> Result<()>;
}

/// A decoded or ready to encode file.
#[derive(Debug, Clone, Default)]
pub struct NifFile {
    pub header: Header,
    pub blocks: BlockRegistry,
    pub roots: Vec<BlockRef>,
}

impl NifFile {
    pub fn new(header: Header) -> Self {
        Self {
            header,
            blocks: BlockRegistry::new(),
            roots: Vec::new(),
        }
    }
}

fn read_block(r: &mut Reader, block_type: BlockType) -> Result<Block> {
    let block = match block_type {
        BlockType::NiTriShape => Block::TriShape(NiTriShape::load(r)?),
        BlockType::NiTriShapeData => Block::TriShapeData(NiTriShapeData::load(r)?),
        BlockType::NiKeyframeController => {
            Block::Controller(Controller::Keyframe(NiKeyframeController::load(r)?))
        }
        BlockType::NiTransformController => {
            Block::Controller(Controller::Transform(NiKeyframeController::load(r)?))
        }
        BlockType::NiTransformInterpolator => {
            Block::Interpolator(Interpolator::Transform(NiTransformInterpolator::load(r)?))
        }
        BlockType::NiKeyframeData => Block::KeyframeData(NiKeyframeData::load(r)?),
        BlockType::NiTransformData => Block::KeyframeData(NiKeyframeData {
            kind: KeyframeDataKind::Transform,
            ..NiKeyframeData::load(r)?
        }),
        BlockType::NiMaterialProperty => {
            Block::Property(Property::Material(NiMaterialProperty::load(r)?))
        }
        BlockType::NiAlphaProperty => Block::Property(Property::Alpha(NiAlphaProperty::load(r)?)),
        BlockType::NiTexturingProperty => {
            Block::Property(Property::Texturing(NiTexturingProperty::load(r)?))
        }
        BlockType::NiSourceTexture => Block::SourceTexture(NiSourceTexture::load(r)?),
        BlockType::NiTextKeyExtraData => {
            Block::ExtraData(ExtraData::TextKeys(NiTextKeyExtraData::load(r)?))
        }
        BlockType::NiStringExtraData => {
            Block::ExtraData(ExtraData::String(NiStringExtraData::load(r)?))
        }
        BlockType::NiSkinInstance => Block::SkinInstance(NiSkinInstance::load(r)?),
        BlockType::NiSkinData => Block::SkinData(NiSkinData::load(r)?),
        BlockType::NiSkinPartition => Block::SkinPartition(NiSkinPartition::load(r)?),
        BlockType::NiCollisionData => Block::Collision(NiCollisionData::load(r)?),
        BlockType::NiSequenceStreamHelper => {
            Block::SequenceStreamHelper(NiSequenceStreamHelper::load(r)?)
        }
        // Every node flavour shares the NiNode layout.
        node_type => {
            let mut node = NiNode::load(r)?;
            node.kind = node_type.node_kind().unwrap_or_default();
            Block::Node(node)
        }
    };
    Ok(block)
}

fn write_block(w: &mut Writer, block: &Block) -> Result<()> {
    match block {
        Block::Node(node) => node.save(w),
        Block::TriShape(shape) => shape.save(w),
        Block::TriShapeData(data) => data.save(w),
        Block::Controller(controller) => controller.keyframe().save(w),
        Block::Interpolator(Interpolator::Transform(interpolator)) => interpolator.save(w),
        Block::KeyframeData(data) => data.save(w),
        Block::Property(Property::Material(p)) => p.save(w),
        Block::Property(Property::Alpha(p)) => p.save(w),
        Block::Property(Property::Texturing(p)) => p.save(w),
        Block::SourceTexture(texture) => texture.save(w),
        Block::ExtraData(ExtraData::TextKeys(e)) => e.save(w),
        Block::ExtraData(ExtraData::String(e)) => e.save(w),
        Block::SkinInstance(skin) => skin.save(w),
        Block::SkinData(data) => data.save(w),
        Block::SkinPartition(partition) => partition.save(w),
        Block::Collision(collision) => collision.save(w),
        Block::SequenceStreamHelper(helper) => helper.save(w),
    }
}

/// Reads a whole stream: header, every block record, footer, then resolves links.
pub fn decode(bytes: &[u8]) -> Result<NifFile> {
    let mut r = Reader::new(bytes);
    let (header, table) = header::read_header(&mut r)?;
    r.strings = table.strings.clone();

    let mut blocks = BlockRegistry::with_capacity(table.num_blocks);
    for index in 0..table.num_blocks {
        let block_type = if r.has(Field::RecordTypeName) {
            r.enter(BlockContext::new("block record").at(index));
            let type_name = r.sized_string()?;
            BlockType::from_name(&type_name).ok_or(NifError::UnknownBlockType {
                type_name,
                index: Some(index),
            })?
        } else {
            table
                .block_type(index)
                .ok_or_else(|| r.invalid(format!("no type for block {index}")))?
        };
        r.enter(BlockContext::new(block_type.name()).at(index));
        if r.has(Field::RecordSeparator) {
            let separator = r.u32()?;
            if separator != 0 {
                return Err(r.invalid(format!("record separator {separator:#x}")));
            }
        }
        let start = r.position();
        let block = read_block(&mut r, block_type)?;
        if let Some(size) = table.block_sizes.get(index) {
            let read = r.position() - start;
            if read != *size as u64 {
                return Err(r.invalid(format!("read {read} bytes of a {size} byte block")));
            }
        }
        blocks.register(block, None);
    }

    r.enter(BlockContext::new("footer"));
    let root_links = r.link_list()?;
    resolver::resolve(&mut blocks)?;
    let mut roots = Vec::with_capacity(root_links.len());
    for link in root_links {
        let RecordLink::Index(index) = link else {
            continue;
        };
        let key = blocks
            .block_at(index as usize)
            .ok_or_else(|| NifError::DanglingLink {
                at: BlockContext::new("footer"),
                field: "roots",
                index: index as i64,
            })?;
        roots.push(key);
    }
    info!(
        "Decoded NIF {} with {} blocks and {} roots",
        header.version,
        blocks.len(),
        roots.len()
    );
    Ok(NifFile {
        header,
        blocks,
        roots,
    })
}

/// Writes a file. Links and roots are checked before any byte is produced.
pub fn encode(file: &NifFile) -> Result<Vec<u8>> {
    file.header.check_supported()?;
    resolver::check_links(&file.blocks)?;
    for root in &file.roots {
        if file.blocks.index_of(*root).is_none() {
            return Err(NifError::DanglingLink {
                at: BlockContext::new("footer"),
                field: "roots",
                index: -1,
            });
        }
    }

    let format = file.header.format();
    let mut table = BlockTable {
        num_blocks: file.blocks.len(),
        ..Default::default()
    };
    let mut body = Writer::new(format, &file.blocks);
    for (index, (_, block)) in file.blocks.iter().enumerate() {
        let block_type = block.block_type();
        body.enter(block.context(Some(index)));
        if body.has(Field::RecordTypeName) {
            body.sized_string(block_type.name())?;
        }
        if body.has(Field::RecordSeparator) {
            body.u32(0)?;
        }
        let type_index = match table.block_types.iter().position(|t| *t == block_type) {
            Some(i) => i,
            None => {
                table.block_types.push(block_type);
                table.block_types.len() - 1
            }
        };
        table.type_indices.push(type_index as u16);
        let start = body.position();
        write_block(&mut body, block)?;
        table.block_sizes.push((body.position() - start) as u32);
    }
    body.enter(BlockContext::new("footer"));
    let roots: Vec<RecordLink> = file.roots.iter().map(|key| RecordLink::Block(*key)).collect();
    body.link_list(&roots)?;
    let (body_bytes, strings) = body.finish();
    table.strings = strings;

    let mut head = Writer::new(format, &file.blocks);
    header::write_header(&mut head, &file.header, &table)?;
    let (mut bytes, _) = head.finish();
    bytes.extend_from_slice(&body_bytes);
    Ok(bytes)
}

pub fn read_path(path: impl AsRef<Path>) -> Result<NifFile> {
    let bytes = std::fs::read(path.as_ref())?;
    decode(&bytes)
}

/// Encodes fully in memory first, so a failed export leaves no file behind.
pub fn write_path(file: &NifFile, path: impl AsRef<Path>) -> Result<()> {
    let bytes = encode(file)?;
    std::fs::write(path.as_ref(), bytes)?;
    info!("Wrote {}", path.as_ref().display());
    Ok(())
}
