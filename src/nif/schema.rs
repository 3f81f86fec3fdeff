//! Version gates for every conditionally present field.
//!
//! Reader and writer both ask `StreamFormat::has(Field::X)` before touching
//! a gated field, so the two directions share one table and cannot drift.

use super::version::NifVersion;

/// Which header a stream was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamFormat {
    pub version: NifVersion,
    pub user_version: u32,
    /// Bethesda stream version ("user version 2"), 0 for other games.
    pub bs_version: u32,
}

impl StreamFormat {
    pub fn new(version: NifVersion, user_version: u32, bs_version: u32) -> Self {
        Self {
            version,
            user_version,
            bs_version,
        }
    }

    pub fn has(&self, field: Field) -> bool {
        SCHEMA[field as usize].applies(self)
    }
}

/// Extra condition on top of the version range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCondition {
    Always,
    UserVersionAtLeast(u32),
    BsVersionBelow(u32),
    BsVersionAbove(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Field {
    HeaderEndian,
    HeaderUserVersion,
    HeaderBsStream,
    HeaderBsProcessScript,
    HeaderBlockTypes,
    HeaderBlockSizes,
    HeaderStrings,
    HeaderGroups,
    RecordTypeName,
    RecordSeparator,
    BoolAsU32,
    StringIndexed,
    NetExtraData,
    NetExtraDataList,
    AvFlagsU32,
    AvVelocity,
    AvBoundingVolume,
    AvCollisionObject,
    ShapeShader,
    ShapeMaterials,
    ShapeMaterialNeedsUpdate,
    GeomGroupId,
    GeomKeepCompress,
    GeomVectorFlags,
    GeomBsVectorFlags,
    GeomTangents,
    GeomNumUvSets,
    GeomHasUv,
    GeomConsistency,
    GeomAdditionalData,
    TriHasTriangles,
    CtrlInterpolator,
    CtrlData,
    InterpTrsValid,
    KeyEulerOrder,
    SkinInstancePartition,
    SkinDataPartition,
    SkinDataHasWeights,
    SkinPartitionFlags,
    ExtraName,
    ExtraNext,
    ExtraLegacyInt,
    MaterialFlags,
    MaterialAmbientDiffuse,
    MaterialEmissiveMult,
    TexturingFlagsOld,
    TexturingFlagsNew,
    TexturingApplyMode,
    TexturingNormalParallax,
    TexturingShaderTextures,
    TexDescClampFilter,
    TexDescPackedFlags,
    TexDescUvSet,
    TexDescPs2,
    TexDescUnknown1,
    TexDescTransform,
    SourceUnknownLink,
    SourceUnknownByte,
    SourceOriginalName,
    SourceDirectRender,
    SourcePersist,
    CollisionMode,
}

#[derive(Debug, Clone, Copy)]
pub struct Gate {
    pub field: Field,
    /// Block (or header part) the field belongs to.
    pub owner: &'static str,
    pub since: Option<NifVersion>,
    pub until: Option<NifVersion>,
    pub condition: StreamCondition,
}

impl Gate {
    const fn range(
        field: Field,
        owner: &'static str,
        since: Option<NifVersion>,
        until: Option<NifVersion>,
    ) -> Self {
        Self {
            field,
            owner,
            since,
            until,
            condition: StreamCondition::Always,
        }
    }

    const fn since(field: Field, owner: &'static str, since: NifVersion) -> Self {
        Self::range(field, owner, Some(since), None)
    }

    const fn until(field: Field, owner: &'static str, until: NifVersion) -> Self {
        Self::range(field, owner, None, Some(until))
    }

    const fn when(mut self, condition: StreamCondition) -> Self {
        self.condition = condition;
        self
    }

    /// Bounds are inclusive on both ends.
    pub fn applies(&self, format: &StreamFormat) -> bool {
        let version = format.version;
        if self.since.is_some_and(|since| version < since) {
            return false;
        }
        if self.until.is_some_and(|until| version > until) {
            return false;
        }
        match self.condition {
            StreamCondition::Always => true,
            StreamCondition::UserVersionAtLeast(v) => format.user_version >= v,
            StreamCondition::BsVersionBelow(v) => format.bs_version < v,
            StreamCondition::BsVersionAbove(v) => format.bs_version > v,
        }
    }
}

use Field as F;
use NifVersion as V;
use StreamCondition as C;

/// One gate per `Field`, in discriminant order.
pub static SCHEMA: [Gate; 62] = [
    Gate::since(F::HeaderEndian, "Header", V::V20_0_0_3),
    Gate::since(F::HeaderUserVersion, "Header", V::V10_0_1_8),
    Gate::since(F::HeaderBsStream, "Header", V::V10_0_1_8).when(C::UserVersionAtLeast(3)),
    Gate::since(F::HeaderBsProcessScript, "Header", V::V10_0_1_8)
        .when(C::BsVersionBelow(131)),
    Gate::since(F::HeaderBlockTypes, "Header", V::V5_0_0_1),
    Gate::since(F::HeaderBlockSizes, "Header", V::V20_2_0_5),
    Gate::since(F::HeaderStrings, "Header", V::V20_1_0_1),
    Gate::since(F::HeaderGroups, "Header", V::V5_0_0_6),
    Gate::until(F::RecordTypeName, "Record", V::new(5, 0, 0, 0)),
    Gate::range(
        F::RecordSeparator,
        "Record",
        Some(V::V5_0_0_1),
        Some(V::V10_1_0_106),
    ),
    Gate::until(F::BoolAsU32, "bool", V::new(4, 1, 0, 0)),
    Gate::since(F::StringIndexed, "string", V::V20_1_0_1),
    Gate::until(F::NetExtraData, "NiObjectNET", V::V4_2_2_0),
    Gate::since(F::NetExtraDataList, "NiObjectNET", V::V5_0_0_1),
    Gate::range(F::AvFlagsU32, "NiAVObject", None, None).when(C::BsVersionAbove(26)),
    Gate::until(F::AvVelocity, "NiAVObject", V::V4_2_2_0),
    Gate::until(F::AvBoundingVolume, "NiAVObject", V::V4_2_2_0),
    Gate::since(F::AvCollisionObject, "NiAVObject", V::V10_0_1_0),
    Gate::range(
        F::ShapeShader,
        "NiTriShape",
        Some(V::V10_0_1_0),
        Some(V::V20_1_0_3),
    ),
    Gate::since(F::ShapeMaterials, "NiTriShape", V::V20_2_0_5),
    Gate::since(F::ShapeMaterialNeedsUpdate, "NiTriShape", V::V20_2_0_7),
    Gate::since(F::GeomGroupId, "NiGeometryData", V::V10_1_0_114),
    Gate::since(F::GeomKeepCompress, "NiGeometryData", V::V10_1_0_0),
    Gate::since(F::GeomVectorFlags, "NiGeometryData", V::V10_0_1_0),
    Gate::since(F::GeomBsVectorFlags, "NiGeometryData", V::V20_2_0_7)
        .when(C::BsVersionAbove(0)),
    Gate::since(F::GeomTangents, "NiGeometryData", V::V10_1_0_0),
    Gate::until(F::GeomNumUvSets, "NiGeometryData", V::V4_2_2_0),
    Gate::until(F::GeomHasUv, "NiGeometryData", V::V4_0_0_2),
    Gate::since(F::GeomConsistency, "NiGeometryData", V::V10_0_1_0),
    Gate::since(F::GeomAdditionalData, "NiGeometryData", V::V20_0_0_4),
    Gate::since(F::TriHasTriangles, "NiTriShapeData", V::V10_1_0_0),
    Gate::since(F::CtrlInterpolator, "NiKeyframeController", V::V10_1_0_104),
    Gate::until(F::CtrlData, "NiKeyframeController", V::V10_1_0_103),
    Gate::range(
        F::InterpTrsValid,
        "NiTransformInterpolator",
        Some(V::V10_1_0_104),
        Some(V::V10_1_0_108),
    ),
    Gate::until(F::KeyEulerOrder, "NiKeyframeData", V::V10_1_0_0),
    Gate::since(F::SkinInstancePartition, "NiSkinInstance", V::V10_1_0_101),
    Gate::range(
        F::SkinDataPartition,
        "NiSkinData",
        Some(V::V4_0_0_2),
        Some(V::V10_1_0_0),
    ),
    Gate::since(F::SkinDataHasWeights, "NiSkinData", V::V4_2_1_0),
    Gate::since(F::SkinPartitionFlags, "NiSkinPartition", V::V10_1_0_0),
    Gate::since(F::ExtraName, "NiExtraData", V::V10_0_1_0),
    Gate::until(F::ExtraNext, "NiExtraData", V::V4_2_2_0),
    Gate::until(F::ExtraLegacyInt, "NiExtraData", V::V4_2_2_0),
    Gate::until(F::MaterialFlags, "NiMaterialProperty", V::V10_0_1_2),
    Gate::range(F::MaterialAmbientDiffuse, "NiMaterialProperty", None, None)
        .when(C::BsVersionBelow(26)),
    Gate::since(F::MaterialEmissiveMult, "NiMaterialProperty", V::V20_2_0_7)
        .when(C::BsVersionAbove(21)),
    Gate::until(F::TexturingFlagsOld, "NiTexturingProperty", V::V10_0_1_2),
    Gate::since(F::TexturingFlagsNew, "NiTexturingProperty", V::V20_1_0_2),
    Gate::range(
        F::TexturingApplyMode,
        "NiTexturingProperty",
        Some(V::V3_3_0_13),
        Some(V::V20_1_0_1),
    ),
    Gate::since(F::TexturingNormalParallax, "NiTexturingProperty", V::V20_2_0_5),
    Gate::since(F::TexturingShaderTextures, "NiTexturingProperty", V::V10_0_1_0),
    Gate::until(F::TexDescClampFilter, "TexDesc", V::V20_1_0_2),
    Gate::since(F::TexDescPackedFlags, "TexDesc", V::V20_1_0_3),
    Gate::until(F::TexDescUvSet, "TexDesc", V::V20_1_0_2),
    Gate::until(F::TexDescPs2, "TexDesc", V::new(10, 4, 0, 1)),
    Gate::until(F::TexDescUnknown1, "TexDesc", V::new(4, 1, 0, 12)),
    Gate::since(F::TexDescTransform, "TexDesc", V::V10_1_0_0),
    Gate::since(F::SourceUnknownLink, "NiSourceTexture", V::V10_1_0_0),
    Gate::until(F::SourceUnknownByte, "NiSourceTexture", V::V10_0_1_0),
    Gate::since(F::SourceOriginalName, "NiSourceTexture", V::V10_1_0_0),
    Gate::since(F::SourceDirectRender, "NiSourceTexture", V::V10_1_0_103),
    Gate::since(F::SourcePersist, "NiSourceTexture", V::new(20, 2, 0, 4)),
    Gate::since(F::CollisionMode, "NiCollisionData", V::V10_1_0_0),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_is_indexed_by_field() {
        for (i, gate) in SCHEMA.iter().enumerate() {
            assert_eq!(gate.field as usize, i, "{:?} is out of place", gate.field);
        }
    }

    #[test]
    fn morrowind_layout() {
        let format = StreamFormat::new(NifVersion::V4_0_0_2, 0, 0);
        assert!(format.has(Field::RecordTypeName));
        assert!(format.has(Field::BoolAsU32));
        assert!(format.has(Field::NetExtraData));
        assert!(format.has(Field::GeomHasUv));
        assert!(format.has(Field::CtrlData));
        assert!(!format.has(Field::HeaderBlockTypes));
        assert!(!format.has(Field::CtrlInterpolator));
        assert!(!format.has(Field::SkinDataHasWeights));
    }

    #[test]
    fn fallout3_layout() {
        let format = StreamFormat::new(NifVersion::V20_2_0_7, 11, 34);
        assert!(format.has(Field::HeaderBsStream));
        assert!(format.has(Field::HeaderBsProcessScript));
        assert!(format.has(Field::HeaderBlockSizes));
        assert!(format.has(Field::StringIndexed));
        assert!(format.has(Field::AvFlagsU32));
        assert!(format.has(Field::GeomBsVectorFlags));
        assert!(format.has(Field::MaterialEmissiveMult));
        assert!(!format.has(Field::MaterialAmbientDiffuse));
        assert!(!format.has(Field::RecordSeparator));
        assert!(!format.has(Field::ShapeShader));
    }

    #[test]
    fn record_separator_window() {
        let gated = |v| StreamFormat::new(v, 0, 0).has(Field::RecordSeparator);
        assert!(!gated(NifVersion::V4_2_2_0));
        assert!(gated(NifVersion::V10_0_1_0));
        assert!(!gated(NifVersion::V10_2_0_0));
    }
}
