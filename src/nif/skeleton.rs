//! Armature and bone classification over a resolved graph.

use std::collections::HashSet;

use bevy::log::{info, warn};
use serde::{Deserialize, Serialize};

use super::error::NifWarning;
use super::registry::BlockRef;
use super::resolver::SceneGraph;
use super::types::{Block, BlockType};
use super::version::NifVersion;

/// Where armatures come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkeletonMode {
    /// Skeleton roots of skin instances.
    #[default]
    Skinned,
    /// Treat one node as the armature and every node under it as a bone.
    SkeletonOnly,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Armature {
    pub root: BlockRef,
    /// Depth first from the root, parents before children.
    pub bones: Vec<BlockRef>,
}

#[derive(Debug, Default)]
pub struct Skeleton {
    pub armatures: Vec<Armature>,
    bones: HashSet<BlockRef>,
    pub warnings: Vec<NifWarning>,
}

impl Skeleton {
    /// Finds armature roots and marks their bones.
    ///
    /// In skinned mode every skin influence is a bone, plus each node on the
    /// way up to the skeleton root. `extra_nodes` also takes every other node
    /// under an armature, as skeleton-only mode always does.
    pub fn classify(
        graph: &SceneGraph,
        mode: SkeletonMode,
        version: NifVersion,
        combine_shapes: bool,
        extra_nodes: bool,
    ) -> Skeleton {
        let mut skeleton = Skeleton::default();
        let mut marked: Vec<(BlockRef, HashSet<BlockRef>)> = Vec::new();

        match mode {
            SkeletonMode::Skinned => {
                for key in &graph.report.reachable {
                    let Some(Block::TriShape(shape)) = graph.block(*key) else {
                        continue;
                    };
                    let Some(Block::SkinInstance(skin)) =
                        shape.skin_link.block().and_then(|k| graph.block(k))
                    else {
                        continue;
                    };
                    let Some(root) = skin.skeleton_root.block() else {
                        continue;
                    };
                    let slot = match marked.iter().position(|(r, _)| *r == root) {
                        Some(i) => i,
                        None => {
                            marked.push((root, HashSet::new()));
                            marked.len() - 1
                        }
                    };
                    for bone in skin.bones.iter().filter_map(|l| l.block()) {
                        skeleton.mark_path(graph, root, bone, &mut marked[slot].1);
                    }
                }
            }
            SkeletonMode::SkeletonOnly => {
                if let Some(root) = skeleton_only_root(graph, version) {
                    marked.push((root, HashSet::new()));
                }
            }
        }

        let take_all = extra_nodes || mode == SkeletonMode::SkeletonOnly;
        for (root, set) in marked {
            if take_all {
                for node in descendants(graph, root) {
                    if graph.grouping_children(node, combine_shapes).is_empty() {
                        insert_if_node(graph, node, &mut skeleton.bones);
                    }
                }
            }
            skeleton.bones.extend(set.iter().copied());
            let bones: Vec<BlockRef> = descendants(graph, root)
                .into_iter()
                .filter(|k| skeleton.bones.contains(k))
                .collect();
            info!(
                "Armature {} with {} bones",
                graph.blocks.context(root),
                bones.len()
            );
            skeleton.armatures.push(Armature { root, bones });
        }
        skeleton
    }

    // Marks `bone` and every node between it and `root`.
    fn mark_path(
        &mut self,
        graph: &SceneGraph,
        root: BlockRef,
        bone: BlockRef,
        set: &mut HashSet<BlockRef>,
    ) {
        set.insert(bone);
        let mut current = graph.parent_of(bone);
        while let Some(node) = current {
            if node == root {
                return;
            }
            set.insert(node);
            current = graph.parent_of(node);
        }
        let warning = NifWarning::DetachedSkinRoot {
            root: graph.blocks.context(root),
            bone: graph.blocks.context(bone),
        };
        warn!("{warning}");
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub fn is_bone(&self, key: BlockRef) -> bool {
        self.bones.contains(&key)
    }

    pub fn is_armature_root(&self, key: BlockRef) -> bool {
        self.armatures.iter().any(|a| a.root == key)
    }

    pub fn armature_of(&self, bone: BlockRef) -> Option<&Armature> {
        self.armatures.iter().find(|a| a.bones.contains(&bone))
    }

    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }
}

fn insert_if_node(graph: &SceneGraph, key: BlockRef, set: &mut HashSet<BlockRef>) {
    if matches!(graph.block(key), Some(Block::Node(_))) {
        set.insert(key);
    }
}

/// Old Morrowind files put the skeleton under `Bip01`; otherwise the first root.
fn skeleton_only_root(graph: &SceneGraph, version: NifVersion) -> Option<BlockRef> {
    if version == NifVersion::V4_0_0_2 {
        let bip = graph.report.reachable.iter().copied().find(|k| {
            graph
                .block(*k)
                .is_some_and(|b| b.block_type() == BlockType::NiNode && b.name() == Some("Bip01"))
        });
        if bip.is_some() {
            return bip;
        }
    }
    graph
        .roots
        .iter()
        .copied()
        .find(|k| matches!(graph.block(*k), Some(Block::Node(_))))
}

/// Nodes strictly below `root`, depth first, parents first.
fn descendants(graph: &SceneGraph, root: BlockRef) -> Vec<BlockRef> {
    let mut out = Vec::new();
    let mut stack: Vec<BlockRef> = graph.children_of(root).into_iter().rev().collect();
    while let Some(key) = stack.pop() {
        if !matches!(graph.block(key), Some(Block::Node(_))) {
            continue;
        }
        out.push(key);
        stack.extend(graph.children_of(key).into_iter().rev());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nif::registry::BlockRegistry;
    use crate::nif::types::{NiNode, NiSkinInstance, NiTriShape, RecordLink};

    fn node(blocks: &mut BlockRegistry, name: &str, children: &[BlockRef]) -> BlockRef {
        let mut n = NiNode::named(name);
        n.children = children.iter().map(|c| RecordLink::Block(*c)).collect();
        blocks.register(Block::Node(n), None)
    }

    fn skinned_shape(blocks: &mut BlockRegistry, root: BlockRef, bones: &[BlockRef]) -> BlockRef {
        let skin = NiSkinInstance {
            skeleton_root: root.into(),
            bones: bones.iter().map(|b| RecordLink::Block(*b)).collect(),
            ..Default::default()
        };
        let skin = blocks.register(Block::SkinInstance(skin), None);
        let mut shape = NiTriShape::named("Body");
        shape.skin_link = skin.into();
        blocks.register(Block::TriShape(shape), None)
    }

    fn attach(blocks: &mut BlockRegistry, parent: BlockRef, child: BlockRef) {
        if let Some(Block::Node(n)) = blocks.resolve_mut(parent) {
            n.children.push(child.into());
        }
    }

    #[test]
    fn lone_node_is_not_an_armature() {
        let mut blocks = BlockRegistry::new();
        let root = node(&mut blocks, "Scene Root", &[]);
        let graph = SceneGraph::new(&blocks, &[root]);
        let skeleton =
            Skeleton::classify(&graph, SkeletonMode::Skinned, NifVersion::V20_0_0_5, false, false);
        assert!(!skeleton.is_armature_root(root));
        assert_eq!(skeleton.bone_count(), 0);
        assert!(graph.report.warnings.is_empty());
    }

    #[test]
    fn skin_bone_marks_intermediate_nodes() {
        let mut blocks = BlockRegistry::new();
        let grandchild = node(&mut blocks, "Bip01 Hand", &[]);
        let child = node(&mut blocks, "Bip01 Arm", &[grandchild]);
        let sibling = node(&mut blocks, "Prop", &[]);
        let root = node(&mut blocks, "Bip01", &[child, sibling]);
        let shape = skinned_shape(&mut blocks, root, &[grandchild]);
        attach(&mut blocks, root, shape);
        let graph = SceneGraph::new(&blocks, &[root]);
        let skeleton =
            Skeleton::classify(&graph, SkeletonMode::Skinned, NifVersion::V20_0_0_5, false, false);
        assert!(skeleton.is_armature_root(root));
        assert!(skeleton.is_bone(grandchild));
        assert!(skeleton.is_bone(child));
        assert!(!skeleton.is_bone(sibling));
        assert!(!skeleton.is_bone(root));
        assert_eq!(skeleton.armatures[0].bones, vec![child, grandchild]);

        // Order and repetition do not matter.
        let again =
            Skeleton::classify(&graph, SkeletonMode::Skinned, NifVersion::V20_0_0_5, false, false);
        assert_eq!(again.armatures, skeleton.armatures);
    }

    #[test]
    fn extra_nodes_join_the_armature() {
        let mut blocks = BlockRegistry::new();
        let hand = node(&mut blocks, "Bip01 Hand", &[]);
        let prop = node(&mut blocks, "Prop", &[]);
        let root = node(&mut blocks, "Bip01", &[hand, prop]);
        let shape = skinned_shape(&mut blocks, root, &[hand]);
        attach(&mut blocks, root, shape);
        let graph = SceneGraph::new(&blocks, &[root]);
        let skeleton =
            Skeleton::classify(&graph, SkeletonMode::Skinned, NifVersion::V20_0_0_5, false, true);
        assert!(skeleton.is_bone(prop));
    }

    #[test]
    fn detached_skin_root_warns() {
        let mut blocks = BlockRegistry::new();
        let bone = node(&mut blocks, "Bip01 Hand", &[]);
        let elsewhere = node(&mut blocks, "Elsewhere", &[]);
        let root = node(&mut blocks, "Scene Root", &[bone, elsewhere]);
        let shape = skinned_shape(&mut blocks, elsewhere, &[bone]);
        attach(&mut blocks, root, shape);
        let graph = SceneGraph::new(&blocks, &[root]);
        let skeleton =
            Skeleton::classify(&graph, SkeletonMode::Skinned, NifVersion::V20_0_0_5, false, false);
        assert_eq!(skeleton.warnings.len(), 1);
        assert!(matches!(
            skeleton.warnings[0],
            NifWarning::DetachedSkinRoot { .. }
        ));
        assert!(skeleton.is_bone(bone));
    }

    #[test]
    fn skeleton_only_prefers_bip01_on_morrowind() {
        let mut blocks = BlockRegistry::new();
        let spine = node(&mut blocks, "Bip01 Spine", &[]);
        let bip = node(&mut blocks, "Bip01", &[spine]);
        let root = node(&mut blocks, "Scene Root", &[bip]);
        let graph = SceneGraph::new(&blocks, &[root]);
        let skeleton =
            Skeleton::classify(&graph, SkeletonMode::SkeletonOnly, NifVersion::V4_0_0_2, false, false);
        assert!(skeleton.is_armature_root(bip));
        assert!(skeleton.is_bone(spine));
        let skeleton =
            Skeleton::classify(&graph, SkeletonMode::SkeletonOnly, NifVersion::V20_0_0_5, false, false);
        assert!(skeleton.is_armature_root(root));
        assert!(skeleton.is_bone(bip));
    }
}
