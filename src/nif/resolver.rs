//! Link resolution and scene graph queries.
//!
//! Decoding leaves raw indices in every link field. [`resolve`] swaps them for
//! registry handles and type-checks each target; [`validate_graph`] then walks
//! the graph from the footer roots and derives the parent table.

use std::collections::HashSet;

use bevy::log::{debug, warn};
use slotmap::SecondaryMap;

use super::error::{BlockContext, NifError, NifWarning, Result};
use super::registry::{BlockRef, BlockRegistry};
use super::types::{Block, BlockFamily, BlockType, LinkRole, Matrix4x4, NiTransform, RecordLink};

/// Swaps every raw index for a block handle, checking the target family.
pub fn resolve(blocks: &mut BlockRegistry) -> Result<()> {
    let keys: Vec<BlockRef> = blocks.keys().collect();
    let families: Vec<BlockFamily> = blocks.iter().map(|(_, b)| b.family()).collect();
    let contexts: Vec<BlockContext> = keys.iter().map(|k| blocks.context(*k)).collect();
    for (position, key) in keys.iter().enumerate() {
        let Some(block) = blocks.resolve_mut(*key) else {
            continue;
        };
        for (spec, link) in block.links_mut() {
            let RecordLink::Index(index) = *link else {
                continue;
            };
            let index = index as usize;
            let Some(family) = families.get(index) else {
                return Err(NifError::DanglingLink {
                    at: contexts[position].clone(),
                    field: spec.field,
                    index: index as i64,
                });
            };
            if !spec.accepts(*family) {
                return Err(NifError::LinkTypeMismatch {
                    at: contexts[position].clone(),
                    field: spec.field,
                    target: contexts[index].clone(),
                });
            }
            *link = RecordLink::Block(keys[index]);
        }
    }
    debug!("Resolved links of {} blocks", keys.len());
    Ok(())
}

/// Checks that every link of every block points at a registered block of an
/// accepted family. Encoding runs this before writing anything.
pub fn check_links(blocks: &BlockRegistry) -> Result<()> {
    for (key, block) in blocks.iter() {
        for (spec, link) in block.links() {
            let target = match link {
                RecordLink::Null => continue,
                RecordLink::Index(index) => blocks.block_at(index as usize).ok_or_else(|| {
                    NifError::DanglingLink {
                        at: blocks.context(key),
                        field: spec.field,
                        index: index as i64,
                    }
                })?,
                RecordLink::Block(target) => target,
            };
            let Some(target_block) = blocks.resolve(target) else {
                return Err(NifError::DanglingLink {
                    at: blocks.context(key),
                    field: spec.field,
                    index: -1,
                });
            };
            if !spec.accepts(target_block.family()) {
                return Err(NifError::LinkTypeMismatch {
                    at: blocks.context(key),
                    field: spec.field,
                    target: blocks.context(target),
                });
            }
        }
    }
    Ok(())
}

/// Derived structure of a resolved graph.
#[derive(Debug, Clone, Default)]
pub struct GraphReport {
    /// Scene graph parent of every block reached through a child link.
    pub parents: SecondaryMap<BlockRef, BlockRef>,
    /// Every block reached from the roots, in visiting order.
    pub reachable: Vec<BlockRef>,
    pub warnings: Vec<NifWarning>,
}

/// Walks from the roots through every link that is not a pointer.
///
/// Only child links feed the parent table; the first parent wins and later
/// ones are reported. Each block is expanded once.
pub fn validate_graph(blocks: &BlockRegistry, roots: &[BlockRef]) -> GraphReport {
    let mut report = GraphReport::default();
    let root_set: HashSet<BlockRef> = roots.iter().copied().collect();
    let mut visited = HashSet::new();
    let mut stack: Vec<BlockRef> = roots.iter().rev().copied().collect();

    while let Some(key) = stack.pop() {
        if !visited.insert(key) {
            continue;
        }
        report.reachable.push(key);
        let Some(block) = blocks.resolve(key) else {
            continue;
        };
        let mut next = Vec::new();
        for (spec, link) in block.links() {
            let Some(target) = link.block() else {
                continue;
            };
            match spec.role {
                LinkRole::Pointer => continue,
                LinkRole::Child => {
                    if root_set.contains(&target) {
                        report.warn(NifWarning::MultipleParents {
                            block: blocks.context(target),
                            first_parent: BlockContext::new("footer"),
                            other_parent: blocks.context(key),
                        });
                        continue;
                    }
                    match report.parents.get(target) {
                        Some(first) if *first != key => {
                            let warning = NifWarning::MultipleParents {
                                block: blocks.context(target),
                                first_parent: blocks.context(*first),
                                other_parent: blocks.context(key),
                            };
                            report.warn(warning);
                            continue;
                        }
                        Some(_) => {}
                        None => {
                            report.parents.insert(target, key);
                        }
                    }
                }
                LinkRole::Owned | LinkRole::Shared => {}
            }
            next.push(target);
        }
        stack.extend(next.into_iter().rev());
    }
    report
}

impl GraphReport {
    fn warn(&mut self, warning: NifWarning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }
}

/// Read-only view of a resolved graph with its parent table.
pub struct SceneGraph<'a> {
    pub blocks: &'a BlockRegistry,
    pub roots: Vec<BlockRef>,
    pub report: GraphReport,
}

impl<'a> SceneGraph<'a> {
    pub fn new(blocks: &'a BlockRegistry, roots: &[BlockRef]) -> Self {
        Self {
            blocks,
            roots: roots.to_vec(),
            report: validate_graph(blocks, roots),
        }
    }

    pub fn block(&self, key: BlockRef) -> Option<&'a Block> {
        self.blocks.resolve(key)
    }

    pub fn parent_of(&self, key: BlockRef) -> Option<BlockRef> {
        self.report.parents.get(key).copied()
    }

    /// Children in link order, skipping null links and blocks claimed by another parent.
    pub fn children_of(&self, key: BlockRef) -> Vec<BlockRef> {
        let Some(Block::Node(node)) = self.block(key) else {
            return Vec::new();
        };
        node.children
            .iter()
            .filter_map(|link| link.block())
            .filter(|child| self.parent_of(*child) == Some(key))
            .collect()
    }

    /// Local transform of a scene object.
    pub fn node_transform(&self, key: BlockRef) -> Option<NiTransform> {
        self.block(key)?.av().map(|av| av.transform)
    }

    pub fn world_matrix(&self, key: BlockRef) -> Matrix4x4 {
        self.matrix_relative_to(key, None)
    }

    /// Product of local transforms from `key` up to, not including, `ancestor`.
    /// Walks to the graph root when `ancestor` is not above `key`.
    pub fn matrix_relative_to(&self, key: BlockRef, ancestor: Option<BlockRef>) -> Matrix4x4 {
        let mut matrix = Matrix4x4::IDENTITY;
        let mut current = Some(key);
        while let Some(node) = current {
            if Some(node) == ancestor {
                break;
            }
            if let Some(local) = self.node_transform(node) {
                matrix = matrix.mul(&local.to_matrix());
            }
            current = self.parent_of(node);
        }
        matrix
    }

    /// True when `ancestor` is `key` or above it.
    pub fn is_ancestor(&self, ancestor: BlockRef, key: BlockRef) -> bool {
        let mut current = Some(key);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent_of(node);
        }
        false
    }

    /// Geometry children that merge into their parent node on import.
    ///
    /// A root collision node takes every shape. Otherwise the node name, with
    /// a trailing " nonaccum" removed, must occur in the shape name.
    pub fn grouping_children(&self, key: BlockRef, combine_shapes: bool) -> Vec<BlockRef> {
        if !combine_shapes {
            return Vec::new();
        }
        let Some(Block::Node(node)) = self.block(key) else {
            return Vec::new();
        };
        let shapes = self
            .children_of(key)
            .into_iter()
            .filter(|child| matches!(self.block(*child), Some(Block::TriShape(_))));
        if node.kind.block_type() == BlockType::RootCollisionNode {
            return shapes.collect();
        }
        let name = node.name.as_str();
        if name.is_empty() {
            return Vec::new();
        }
        let stem = match name.len().checked_sub(9) {
            Some(cut)
                if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(" nonaccum") =>
            {
                &name[..cut]
            }
            _ => name,
        };
        shapes
            .filter(|child| {
                self.block(*child)
                    .and_then(Block::name)
                    .is_some_and(|shape_name| shape_name.contains(stem))
            })
            .collect()
    }
}
