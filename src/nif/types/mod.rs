//! In-memory block types. Each struct mirrors one NIF record, composed
//! from its base records the same way the file format inherits them.

pub mod animation;
pub mod base;
pub mod block;
pub mod collision;
pub mod extra_data;
pub mod geometry;
pub mod properties;
pub mod scene;
pub mod skin;
pub mod textures;

pub use animation::{
    Controller, ControllerFlags, Interpolator, Key, KeyFloat, KeyGroup, KeyQuaternion, KeyType,
    KeyVec3, KeyframeDataKind, NiKeyframeController, NiKeyframeData, NiSequenceStreamHelper,
    NiTimeController, NiTransformInterpolator, Quaternion, RotationKeys, Tbc, TextKey,
};
pub use base::{
    BoundingBox, BoundingCapsule, BoundingHalfSpace, BoundingSphere, BoundingVolume, Color3,
    Color4, Matrix3x3, Matrix4x4, NiTransform, Plane, RecordLink, TexCoord, Triangle, Vector2,
    Vector3,
};
pub use block::{Block, BlockFamily, BlockType, LinkRole, LinkSpec};
pub use collision::NiCollisionData;
pub use extra_data::{ExtraData, ExtraFields, NiStringExtraData, NiTextKeyExtraData};
pub use geometry::{NiGeometryData, NiTriShapeData};
pub use properties::{
    ApplyMode, BumpMapSettings, ClampMode, FilterMode, NiAlphaProperty, NiMaterialProperty,
    NiProperty, NiTexturingProperty, Property, ShaderTexture, TexDesc, TextureTransform,
};
pub use scene::{MaterialList, NiAVObject, NiNode, NiObjectNET, NiTriShape, NodeKind, ShaderInfo};
pub use skin::{BoneData, BoneVertData, NiSkinData, NiSkinInstance, NiSkinPartition, SkinPartition};
pub use textures::{NiSourceTexture, TextureSource};
