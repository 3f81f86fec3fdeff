//! Session arena for blocks.
//!
//! Every block of one decode or export session lives in a `DenseSlotMap`
//! and is addressed by a `BlockRef`. Creation order is kept separately and
//! is the order blocks are written, so a block's stream index is its
//! position in that list.

use bevy::log::{debug, info};
use slotmap::{DenseSlotMap, SecondaryMap, new_key_type};

use super::error::{BlockContext, NifError, Result};
use super::types::{Block, BlockType};

new_key_type! { pub struct BlockRef; }

#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    blocks: DenseSlotMap<BlockRef, Block>,
    order: Vec<BlockRef>,
    positions: SecondaryMap<BlockRef, usize>,
    owners: SecondaryMap<BlockRef, String>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            blocks: DenseSlotMap::with_capacity_and_key(capacity),
            order: Vec::with_capacity(capacity),
            positions: SecondaryMap::new(),
            owners: SecondaryMap::new(),
        }
    }

    /// Builds a default block of the named type.
    pub fn create(&mut self, type_name: &str, owner: Option<&str>) -> Result<BlockRef> {
        let block_type =
            BlockType::from_name(type_name).ok_or_else(|| NifError::UnknownBlockType {
                type_name: type_name.to_string(),
                index: None,
            })?;
        Ok(self.register(Block::new(block_type), owner))
    }

    /// Adds a block built elsewhere. The owner is only kept for diagnostics.
    pub fn register(&mut self, block: Block, owner: Option<&str>) -> BlockRef {
        let type_name = block.type_name();
        match owner {
            Some(owner) => info!("Exporting {owner} as {type_name} block"),
            None => debug!("Adding {type_name} block #{}", self.order.len()),
        }
        let key = self.blocks.insert(block);
        self.positions.insert(key, self.order.len());
        self.order.push(key);
        if let Some(owner) = owner {
            self.owners.insert(key, owner.to_string());
        }
        key
    }

    pub fn resolve(&self, key: BlockRef) -> Option<&Block> {
        self.blocks.get(key)
    }

    pub fn resolve_mut(&mut self, key: BlockRef) -> Option<&mut Block> {
        self.blocks.get_mut(key)
    }

    /// Stream index of a block.
    pub fn index_of(&self, key: BlockRef) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn block_at(&self, index: usize) -> Option<BlockRef> {
        self.order.get(index).copied()
    }

    pub fn owner_of(&self, key: BlockRef) -> Option<&str> {
        self.owners.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = BlockRef> + '_ {
        self.order.iter().copied()
    }

    /// Blocks in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockRef, &Block)> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.blocks.get(*key).map(|block| (*key, block)))
    }

    /// Diagnostic label for a block: type, stream index and name.
    pub fn context(&self, key: BlockRef) -> BlockContext {
        match self.blocks.get(key) {
            Some(block) => block.context(self.index_of(key)),
            None => BlockContext::new("<removed block>"),
        }
    }

    /// First block with the given name, in creation order.
    pub fn find_by_name(&self, name: &str) -> Option<BlockRef> {
        self.iter()
            .find(|(_, block)| block.name() == Some(name))
            .map(|(key, _)| key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::types::{NiNode, NodeKind};

    #[test]
    fn create_assigns_positions_in_order() {
        let mut registry = BlockRegistry::new();
        let root = registry.create("NiNode", Some("Scene Root")).unwrap();
        let shape = registry.create("NiTriShape", None).unwrap();
        assert_eq!(registry.index_of(root), Some(0));
        assert_eq!(registry.index_of(shape), Some(1));
        assert_eq!(registry.block_at(1), Some(shape));
        assert_eq!(registry.owner_of(root), Some("Scene Root"));
        assert_eq!(registry.owner_of(shape), None);
        assert_eq!(
            registry.resolve(shape).map(Block::block_type),
            Some(BlockType::NiTriShape)
        );
    }

    #[test]
    fn unknown_type_is_rejected() {
        let mut registry = BlockRegistry::new();
        let err = registry.create("NiParticleSystem", None).unwrap_err();
        assert!(matches!(err, NifError::UnknownBlockType { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn register_keeps_block_as_given() {
        let mut registry = BlockRegistry::new();
        let mut node = NiNode::named("Bip01");
        node.kind = NodeKind::BsFadeNode;
        let key = registry.register(Block::Node(node), Some("Armature"));
        assert_eq!(registry.find_by_name("Bip01"), Some(key));
        assert_eq!(registry.context(key).to_string(), "BSFadeNode #0 'Bip01'");
    }
}
