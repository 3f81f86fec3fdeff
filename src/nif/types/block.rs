use super::animation::{
    Controller, Interpolator, KeyframeDataKind, NiKeyframeController, NiKeyframeData,
    NiSequenceStreamHelper, NiTransformInterpolator,
};
use super::base::RecordLink;
use super::collision::NiCollisionData;
use super::extra_data::{ExtraData, NiStringExtraData, NiTextKeyExtraData};
use super::geometry::NiTriShapeData;
use super::properties::{
    NiAlphaProperty, NiMaterialProperty, NiTexturingProperty, Property, TexDesc,
};
use super::scene::{NiAVObject, NiNode, NiObjectNET, NiTriShape, NodeKind};
use super::skin::{NiSkinData, NiSkinInstance, NiSkinPartition};
use super::textures::{NiSourceTexture, TextureSource};
use crate::nif::error::BlockContext;

/// Every block type with a known layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    NiNode,
    RootCollisionNode,
    NiBSAnimationNode,
    NiBSParticleNode,
    AvoidNode,
    BSFadeNode,
    NiTriShape,
    NiTriShapeData,
    NiKeyframeController,
    NiTransformController,
    NiTransformInterpolator,
    NiKeyframeData,
    NiTransformData,
    NiMaterialProperty,
    NiAlphaProperty,
    NiTexturingProperty,
    NiSourceTexture,
    NiTextKeyExtraData,
    NiStringExtraData,
    NiSkinInstance,
    NiSkinData,
    NiSkinPartition,
    NiCollisionData,
    NiSequenceStreamHelper,
}

impl BlockType {
    pub const ALL: [BlockType; 24] = [
        BlockType::NiNode,
        BlockType::RootCollisionNode,
        BlockType::NiBSAnimationNode,
        BlockType::NiBSParticleNode,
        BlockType::AvoidNode,
        BlockType::BSFadeNode,
        BlockType::NiTriShape,
        BlockType::NiTriShapeData,
        BlockType::NiKeyframeController,
        BlockType::NiTransformController,
        BlockType::NiTransformInterpolator,
        BlockType::NiKeyframeData,
        BlockType::NiTransformData,
        BlockType::NiMaterialProperty,
        BlockType::NiAlphaProperty,
        BlockType::NiTexturingProperty,
        BlockType::NiSourceTexture,
        BlockType::NiTextKeyExtraData,
        BlockType::NiStringExtraData,
        BlockType::NiSkinInstance,
        BlockType::NiSkinData,
        BlockType::NiSkinPartition,
        BlockType::NiCollisionData,
        BlockType::NiSequenceStreamHelper,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BlockType::NiNode => "NiNode",
            BlockType::RootCollisionNode => "RootCollisionNode",
            BlockType::NiBSAnimationNode => "NiBSAnimationNode",
            BlockType::NiBSParticleNode => "NiBSParticleNode",
            BlockType::AvoidNode => "AvoidNode",
            BlockType::BSFadeNode => "BSFadeNode",
            BlockType::NiTriShape => "NiTriShape",
            BlockType::NiTriShapeData => "NiTriShapeData",
            BlockType::NiKeyframeController => "NiKeyframeController",
            BlockType::NiTransformController => "NiTransformController",
            BlockType::NiTransformInterpolator => "NiTransformInterpolator",
            BlockType::NiKeyframeData => "NiKeyframeData",
            BlockType::NiTransformData => "NiTransformData",
            BlockType::NiMaterialProperty => "NiMaterialProperty",
            BlockType::NiAlphaProperty => "NiAlphaProperty",
            BlockType::NiTexturingProperty => "NiTexturingProperty",
            BlockType::NiSourceTexture => "NiSourceTexture",
            BlockType::NiTextKeyExtraData => "NiTextKeyExtraData",
            BlockType::NiStringExtraData => "NiStringExtraData",
            BlockType::NiSkinInstance => "NiSkinInstance",
            BlockType::NiSkinData => "NiSkinData",
            BlockType::NiSkinPartition => "NiSkinPartition",
            BlockType::NiCollisionData => "NiCollisionData",
            BlockType::NiSequenceStreamHelper => "NiSequenceStreamHelper",
        }
    }

    pub fn from_name(name: &str) -> Option<BlockType> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn family(self) -> BlockFamily {
        match self {
            BlockType::NiNode
            | BlockType::RootCollisionNode
            | BlockType::NiBSAnimationNode
            | BlockType::NiBSParticleNode
            | BlockType::AvoidNode
            | BlockType::BSFadeNode => BlockFamily::Node,
            BlockType::NiTriShape => BlockFamily::Geometry,
            BlockType::NiTriShapeData => BlockFamily::GeometryData,
            BlockType::NiKeyframeController | BlockType::NiTransformController => {
                BlockFamily::Controller
            }
            BlockType::NiTransformInterpolator => BlockFamily::Interpolator,
            BlockType::NiKeyframeData | BlockType::NiTransformData => BlockFamily::KeyframeData,
            BlockType::NiMaterialProperty
            | BlockType::NiAlphaProperty
            | BlockType::NiTexturingProperty => BlockFamily::Property,
            BlockType::NiSourceTexture => BlockFamily::Texture,
            BlockType::NiTextKeyExtraData | BlockType::NiStringExtraData => BlockFamily::ExtraData,
            BlockType::NiSkinInstance => BlockFamily::SkinInstance,
            BlockType::NiSkinData => BlockFamily::SkinData,
            BlockType::NiSkinPartition => BlockFamily::SkinPartition,
            BlockType::NiCollisionData => BlockFamily::Collision,
            BlockType::NiSequenceStreamHelper => BlockFamily::SequenceHelper,
        }
    }

    pub fn node_kind(self) -> Option<NodeKind> {
        match self {
            BlockType::NiNode => Some(NodeKind::Node),
            BlockType::RootCollisionNode => Some(NodeKind::RootCollisionNode),
            BlockType::NiBSAnimationNode => Some(NodeKind::BsAnimationNode),
            BlockType::NiBSParticleNode => Some(NodeKind::BsParticleNode),
            BlockType::AvoidNode => Some(NodeKind::AvoidNode),
            BlockType::BSFadeNode => Some(NodeKind::BsFadeNode),
            _ => None,
        }
    }
}

impl NodeKind {
    pub fn block_type(self) -> BlockType {
        match self {
            NodeKind::Node => BlockType::NiNode,
            NodeKind::RootCollisionNode => BlockType::RootCollisionNode,
            NodeKind::BsAnimationNode => BlockType::NiBSAnimationNode,
            NodeKind::BsParticleNode => BlockType::NiBSParticleNode,
            NodeKind::AvoidNode => BlockType::AvoidNode,
            NodeKind::BsFadeNode => BlockType::BSFadeNode,
        }
    }
}

/// Coarse block families used to type-check links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockFamily {
    Node,
    Geometry,
    GeometryData,
    Controller,
    Interpolator,
    KeyframeData,
    Property,
    Texture,
    ExtraData,
    SkinInstance,
    SkinData,
    SkinPartition,
    Collision,
    SequenceHelper,
}

/// How a link relates its holder to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Scene graph ownership; a target has one such parent.
    Child,
    /// Owned by the holder, such as controller chains and data blocks.
    Owned,
    /// Legitimately referenced from many holders (properties, textures).
    Shared,
    /// Upward or sideways pointer, never ownership.
    Pointer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSpec {
    pub field: &'static str,
    pub role: LinkRole,
    pub accepts: &'static [BlockFamily],
}

impl LinkSpec {
    const fn new(field: &'static str, role: LinkRole, accepts: &'static [BlockFamily]) -> Self {
        Self {
            field,
            role,
            accepts,
        }
    }

    pub fn accepts(&self, family: BlockFamily) -> bool {
        self.accepts.contains(&family)
    }
}

const AV_OBJECT: &[BlockFamily] = &[BlockFamily::Node, BlockFamily::Geometry];

pub mod links {
    use super::BlockFamily as F;
    use super::LinkRole::*;
    use super::{AV_OBJECT, LinkSpec};

    pub const EXTRA_DATA: LinkSpec = LinkSpec::new("extra_data", Owned, &[F::ExtraData]);
    pub const EXTRA_DATA_LIST: LinkSpec =
        LinkSpec::new("extra_data_list", Owned, &[F::ExtraData]);
    pub const CONTROLLER: LinkSpec = LinkSpec::new("controller", Owned, &[F::Controller]);
    pub const PROPERTIES: LinkSpec = LinkSpec::new("properties", Shared, &[F::Property]);
    pub const COLLISION_OBJECT: LinkSpec =
        LinkSpec::new("collision_object", Owned, &[F::Collision]);
    pub const CHILDREN: LinkSpec = LinkSpec::new("children", Child, AV_OBJECT);
    pub const EFFECTS: LinkSpec = LinkSpec::new("effects", Child, &[]);
    pub const GEOMETRY_DATA: LinkSpec = LinkSpec::new("data", Shared, &[F::GeometryData]);
    pub const SKIN_INSTANCE: LinkSpec = LinkSpec::new("skin_instance", Owned, &[F::SkinInstance]);
    pub const ADDITIONAL_DATA: LinkSpec = LinkSpec::new("additional_data", Owned, &[]);
    pub const NEXT_CONTROLLER: LinkSpec =
        LinkSpec::new("next_controller", Owned, &[F::Controller]);
    pub const TARGET: LinkSpec = LinkSpec::new("target", Pointer, AV_OBJECT);
    pub const INTERPOLATOR: LinkSpec = LinkSpec::new("interpolator", Owned, &[F::Interpolator]);
    pub const KEYFRAME_DATA: LinkSpec = LinkSpec::new("data", Owned, &[F::KeyframeData]);
    pub const TEXTURE_SOURCE: LinkSpec = LinkSpec::new("source", Shared, &[F::Texture]);
    pub const PIXEL_DATA: LinkSpec = LinkSpec::new("pixel_data", Owned, &[]);
    pub const NEXT_EXTRA_DATA: LinkSpec =
        LinkSpec::new("next_extra_data", Owned, &[F::ExtraData]);
    pub const SKIN_DATA: LinkSpec = LinkSpec::new("data", Owned, &[F::SkinData]);
    pub const SKIN_PARTITION: LinkSpec =
        LinkSpec::new("skin_partition", Owned, &[F::SkinPartition]);
    pub const SKELETON_ROOT: LinkSpec = LinkSpec::new("skeleton_root", Pointer, &[F::Node]);
    pub const BONES: LinkSpec = LinkSpec::new("bones", Pointer, &[F::Node]);
}

/// One decoded or freshly built block.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Node(NiNode),
    TriShape(NiTriShape),
    TriShapeData(NiTriShapeData),
    Controller(Controller),
    Interpolator(Interpolator),
    KeyframeData(NiKeyframeData),
    Property(Property),
    SourceTexture(NiSourceTexture),
    ExtraData(ExtraData),
    SkinInstance(NiSkinInstance),
    SkinData(NiSkinData),
    SkinPartition(NiSkinPartition),
    Collision(NiCollisionData),
    SequenceStreamHelper(NiSequenceStreamHelper),
}

impl Block {
    /// A block of the given type with default field values.
    pub fn new(block_type: BlockType) -> Block {
        if let Some(kind) = block_type.node_kind() {
            return Block::Node(NiNode {
                kind,
                ..Default::default()
            });
        }
        match block_type {
            BlockType::NiTriShape => Block::TriShape(NiTriShape::default()),
            BlockType::NiTriShapeData => Block::TriShapeData(NiTriShapeData::default()),
            BlockType::NiKeyframeController => {
                Block::Controller(Controller::Keyframe(NiKeyframeController::default()))
            }
            BlockType::NiTransformController => {
                Block::Controller(Controller::Transform(NiKeyframeController::default()))
            }
            BlockType::NiTransformInterpolator => Block::Interpolator(Interpolator::Transform(
                NiTransformInterpolator::default(),
            )),
            BlockType::NiKeyframeData => Block::KeyframeData(NiKeyframeData::default()),
            BlockType::NiTransformData => Block::KeyframeData(NiKeyframeData {
                kind: KeyframeDataKind::Transform,
                ..Default::default()
            }),
            BlockType::NiMaterialProperty => {
                Block::Property(Property::Material(NiMaterialProperty::default()))
            }
            BlockType::NiAlphaProperty => {
                Block::Property(Property::Alpha(NiAlphaProperty::default()))
            }
            BlockType::NiTexturingProperty => {
                Block::Property(Property::Texturing(NiTexturingProperty::default()))
            }
            BlockType::NiSourceTexture => Block::SourceTexture(NiSourceTexture::default()),
            BlockType::NiTextKeyExtraData => {
                Block::ExtraData(ExtraData::TextKeys(NiTextKeyExtraData::default()))
            }
            BlockType::NiStringExtraData => {
                Block::ExtraData(ExtraData::String(NiStringExtraData::default()))
            }
            BlockType::NiSkinInstance => Block::SkinInstance(NiSkinInstance::default()),
            BlockType::NiSkinData => Block::SkinData(NiSkinData::default()),
            BlockType::NiSkinPartition => Block::SkinPartition(NiSkinPartition::default()),
            BlockType::NiCollisionData => Block::Collision(NiCollisionData::default()),
            _ => Block::SequenceStreamHelper(NiSequenceStreamHelper::default()),
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            Block::Node(n) => n.kind.block_type(),
            Block::TriShape(_) => BlockType::NiTriShape,
            Block::TriShapeData(_) => BlockType::NiTriShapeData,
            Block::Controller(Controller::Keyframe(_)) => BlockType::NiKeyframeController,
            Block::Controller(Controller::Transform(_)) => BlockType::NiTransformController,
            Block::Interpolator(Interpolator::Transform(_)) => BlockType::NiTransformInterpolator,
            Block::KeyframeData(d) => match d.kind {
                KeyframeDataKind::Keyframe => BlockType::NiKeyframeData,
                KeyframeDataKind::Transform => BlockType::NiTransformData,
            },
            Block::Property(Property::Material(_)) => BlockType::NiMaterialProperty,
            Block::Property(Property::Alpha(_)) => BlockType::NiAlphaProperty,
            Block::Property(Property::Texturing(_)) => BlockType::NiTexturingProperty,
            Block::SourceTexture(_) => BlockType::NiSourceTexture,
            Block::ExtraData(ExtraData::TextKeys(_)) => BlockType::NiTextKeyExtraData,
            Block::ExtraData(ExtraData::String(_)) => BlockType::NiStringExtraData,
            Block::SkinInstance(_) => BlockType::NiSkinInstance,
            Block::SkinData(_) => BlockType::NiSkinData,
            Block::SkinPartition(_) => BlockType::NiSkinPartition,
            Block::Collision(_) => BlockType::NiCollisionData,
            Block::SequenceStreamHelper(_) => BlockType::NiSequenceStreamHelper,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.block_type().name()
    }

    pub fn family(&self) -> BlockFamily {
        self.block_type().family()
    }

    pub fn net(&self) -> Option<&NiObjectNET> {
        match self {
            Block::Node(n) => Some(&n.av_base.net_base),
            Block::TriShape(s) => Some(&s.av_base.net_base),
            Block::Property(p) => Some(p.net()),
            Block::SourceTexture(t) => Some(&t.net_base),
            Block::SequenceStreamHelper(h) => Some(&h.net_base),
            _ => None,
        }
    }

    pub fn net_mut(&mut self) -> Option<&mut NiObjectNET> {
        match self {
            Block::Node(n) => Some(&mut n.av_base.net_base),
            Block::TriShape(s) => Some(&mut s.av_base.net_base),
            Block::Property(p) => Some(p.net_mut()),
            Block::SourceTexture(t) => Some(&mut t.net_base),
            Block::SequenceStreamHelper(h) => Some(&mut h.net_base),
            _ => None,
        }
    }

    pub fn av(&self) -> Option<&NiAVObject> {
        match self {
            Block::Node(n) => Some(&n.av_base),
            Block::TriShape(s) => Some(&s.av_base),
            _ => None,
        }
    }

    pub fn av_mut(&mut self) -> Option<&mut NiAVObject> {
        match self {
            Block::Node(n) => Some(&mut n.av_base),
            Block::TriShape(s) => Some(&mut s.av_base),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Block::ExtraData(e) => Some(e.fields().name.as_str()),
            other => other.net().map(|n| n.name.as_str()),
        }
    }

    /// Diagnostic label for errors and warnings.
    pub fn context(&self, index: Option<usize>) -> BlockContext {
        let mut ctx = BlockContext::new(self.type_name());
        ctx.index = index;
        match self.name() {
            Some(name) => ctx.named(name),
            None => ctx,
        }
    }

    /// Every reference field with its current value, in stream order.
    pub fn links(&self) -> Vec<(LinkSpec, RecordLink)> {
        let mut out = Vec::new();
        match self {
            Block::Node(n) => {
                av_links(&n.av_base, &mut out);
                out.extend(n.children.iter().map(|l| (links::CHILDREN, *l)));
                out.extend(n.effects.iter().map(|l| (links::EFFECTS, *l)));
            }
            Block::TriShape(s) => {
                av_links(&s.av_base, &mut out);
                out.push((links::GEOMETRY_DATA, s.data_link));
                out.push((links::SKIN_INSTANCE, s.skin_link));
            }
            Block::TriShapeData(d) => out.push((links::ADDITIONAL_DATA, d.additional_data)),
            Block::Controller(c) => {
                let c = c.keyframe();
                out.push((links::NEXT_CONTROLLER, c.next_controller));
                out.push((links::TARGET, c.target));
                out.push((links::INTERPOLATOR, c.interpolator));
                out.push((links::KEYFRAME_DATA, c.data));
            }
            Block::Interpolator(Interpolator::Transform(i)) => {
                out.push((links::KEYFRAME_DATA, i.data))
            }
            Block::KeyframeData(_) => {}
            Block::Property(p) => {
                net_links(p.net(), &mut out);
                if let Property::Texturing(t) = p {
                    out.extend(
                        t.slots()
                            .into_iter()
                            .map(|(_, desc)| (links::TEXTURE_SOURCE, desc.source)),
                    );
                }
            }
            Block::SourceTexture(t) => {
                net_links(&t.net_base, &mut out);
                match &t.source {
                    TextureSource::External { unknown_link, .. } => {
                        out.push((links::PIXEL_DATA, *unknown_link))
                    }
                    TextureSource::Internal { pixel_data, .. } => {
                        out.push((links::PIXEL_DATA, *pixel_data))
                    }
                }
            }
            Block::ExtraData(e) => out.push((links::NEXT_EXTRA_DATA, e.fields().next_extra_data_link)),
            Block::SkinInstance(s) => {
                out.push((links::SKIN_DATA, s.data));
                out.push((links::SKIN_PARTITION, s.skin_partition));
                out.push((links::SKELETON_ROOT, s.skeleton_root));
                out.extend(s.bones.iter().map(|l| (links::BONES, *l)));
            }
            Block::SkinData(d) => out.push((links::SKIN_PARTITION, d.skin_partition)),
            Block::SkinPartition(_) => {}
            Block::Collision(c) => out.push((links::TARGET, c.target)),
            Block::SequenceStreamHelper(h) => net_links(&h.net_base, &mut out),
        }
        out
    }

    /// Mutable view of the same fields `links` reports, in the same order.
    pub fn links_mut(&mut self) -> Vec<(LinkSpec, &mut RecordLink)> {
        let mut out = Vec::new();
        match self {
            Block::Node(n) => {
                let NiNode {
                    av_base,
                    children,
                    effects,
                    ..
                } = n;
                av_links_mut(av_base, &mut out);
                out.extend(children.iter_mut().map(|l| (links::CHILDREN, l)));
                out.extend(effects.iter_mut().map(|l| (links::EFFECTS, l)));
            }
            Block::TriShape(s) => {
                let NiTriShape {
                    av_base,
                    data_link,
                    skin_link,
                    ..
                } = s;
                av_links_mut(av_base, &mut out);
                out.push((links::GEOMETRY_DATA, data_link));
                out.push((links::SKIN_INSTANCE, skin_link));
            }
            Block::TriShapeData(d) => out.push((links::ADDITIONAL_DATA, &mut d.additional_data)),
            Block::Controller(c) => {
                let NiKeyframeController {
                    base,
                    interpolator,
                    data,
                } = c.keyframe_mut();
                out.push((links::NEXT_CONTROLLER, &mut base.next_controller));
                out.push((links::TARGET, &mut base.target));
                out.push((links::INTERPOLATOR, interpolator));
                out.push((links::KEYFRAME_DATA, data));
            }
            Block::Interpolator(Interpolator::Transform(i)) => {
                out.push((links::KEYFRAME_DATA, &mut i.data))
            }
            Block::KeyframeData(_) => {}
            Block::Property(p) => match p {
                Property::Material(m) => net_links_mut(&mut m.property_base.net_base, &mut out),
                Property::Alpha(a) => net_links_mut(&mut a.property_base.net_base, &mut out),
                Property::Texturing(t) => {
                    let NiTexturingProperty {
                        property_base,
                        base_texture,
                        dark_texture,
                        detail_texture,
                        gloss_texture,
                        glow_texture,
                        bump_map_texture,
                        normal_texture,
                        parallax_texture,
                        decal_textures,
                        shader_textures,
                        ..
                    } = t;
                    net_links_mut(&mut property_base.net_base, &mut out);
                    let mut descs: Vec<&mut TexDesc> = Vec::new();
                    descs.extend(base_texture.as_mut());
                    descs.extend(dark_texture.as_mut());
                    descs.extend(detail_texture.as_mut());
                    descs.extend(gloss_texture.as_mut());
                    descs.extend(glow_texture.as_mut());
                    descs.extend(bump_map_texture.as_mut().map(|(d, _)| d));
                    descs.extend(normal_texture.as_mut());
                    descs.extend(parallax_texture.as_mut().map(|(d, _)| d));
                    descs.extend(decal_textures.iter_mut().flatten());
                    descs.extend(shader_textures.iter_mut().flatten().map(|s| &mut s.desc));
                    out.extend(
                        descs
                            .into_iter()
                            .map(|desc| (links::TEXTURE_SOURCE, &mut desc.source)),
                    );
                }
            },
            Block::SourceTexture(t) => {
                let NiSourceTexture {
                    net_base, source, ..
                } = t;
                net_links_mut(net_base, &mut out);
                match source {
                    TextureSource::External { unknown_link, .. } => {
                        out.push((links::PIXEL_DATA, unknown_link))
                    }
                    TextureSource::Internal { pixel_data, .. } => {
                        out.push((links::PIXEL_DATA, pixel_data))
                    }
                }
            }
            Block::ExtraData(e) => {
                out.push((links::NEXT_EXTRA_DATA, &mut e.fields_mut().next_extra_data_link))
            }
            Block::SkinInstance(s) => {
                let NiSkinInstance {
                    data,
                    skin_partition,
                    skeleton_root,
                    bones,
                } = s;
                out.push((links::SKIN_DATA, data));
                out.push((links::SKIN_PARTITION, skin_partition));
                out.push((links::SKELETON_ROOT, skeleton_root));
                out.extend(bones.iter_mut().map(|l| (links::BONES, l)));
            }
            Block::SkinData(d) => out.push((links::SKIN_PARTITION, &mut d.skin_partition)),
            Block::SkinPartition(_) => {}
            Block::Collision(c) => out.push((links::TARGET, &mut c.target)),
            Block::SequenceStreamHelper(h) => net_links_mut(&mut h.net_base, &mut out),
        }
        out
    }
}

fn net_links(net: &NiObjectNET, out: &mut Vec<(LinkSpec, RecordLink)>) {
    out.push((links::EXTRA_DATA, net.extra_data_link));
    out.extend(net.extra_data_list.iter().map(|l| (links::EXTRA_DATA_LIST, *l)));
    out.push((links::CONTROLLER, net.controller_link));
}

fn av_links(av: &NiAVObject, out: &mut Vec<(LinkSpec, RecordLink)>) {
    net_links(&av.net_base, out);
    out.extend(av.properties.iter().map(|l| (links::PROPERTIES, *l)));
    out.push((links::COLLISION_OBJECT, av.collision_object));
}

fn net_links_mut<'a>(net: &'a mut NiObjectNET, out: &mut Vec<(LinkSpec, &'a mut RecordLink)>) {
    let NiObjectNET {
        extra_data_link,
        extra_data_list,
        controller_link,
        ..
    } = net;
    out.push((links::EXTRA_DATA, extra_data_link));
    out.extend(extra_data_list.iter_mut().map(|l| (links::EXTRA_DATA_LIST, l)));
    out.push((links::CONTROLLER, controller_link));
}

fn av_links_mut<'a>(av: &'a mut NiAVObject, out: &mut Vec<(LinkSpec, &'a mut RecordLink)>) {
    let NiAVObject {
        net_base,
        properties,
        collision_object,
        ..
    } = av;
    net_links_mut(net_base, out);
    out.extend(properties.iter_mut().map(|l| (links::PROPERTIES, l)));
    out.push((links::COLLISION_OBJECT, collision_object));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip() {
        for t in BlockType::ALL {
            assert_eq!(BlockType::from_name(t.name()), Some(t));
            assert_eq!(Block::new(t).block_type(), t);
        }
        assert_eq!(BlockType::from_name("NiParticleSystem"), None);
    }

    #[test]
    fn links_and_links_mut_agree() {
        let mut texturing = NiTexturingProperty::default();
        texturing.base_texture = Some(TexDesc {
            source: RecordLink::Index(4),
            ..Default::default()
        });
        texturing.decal_textures = vec![None, Some(TexDesc::default())];
        let mut node = NiNode::named("Scene Root");
        node.children = vec![RecordLink::Index(1), RecordLink::Null];
        node.av_base.properties = vec![RecordLink::Index(2)];
        let blocks = [
            Block::Node(node),
            Block::Property(Property::Texturing(texturing)),
            Block::new(BlockType::NiSkinInstance),
            Block::new(BlockType::NiTransformController),
        ];
        for mut block in blocks {
            let read: Vec<_> = block.links();
            let written: Vec<_> = block
                .links_mut()
                .into_iter()
                .map(|(spec, link)| (spec, *link))
                .collect();
            assert_eq!(read, written, "{}", block.type_name());
        }
    }

    #[test]
    fn children_accept_nodes_and_geometry_only() {
        assert!(links::CHILDREN.accepts(BlockFamily::Node));
        assert!(links::CHILDREN.accepts(BlockFamily::Geometry));
        assert!(!links::CHILDREN.accepts(BlockFamily::Property));
    }
}
