//! NIF block graph codec with bind-pose and keyframe transform algebra.
//!
//! [`nif`] reads and writes the binary format and holds the block types,
//! the registry, link resolution, skeleton classification and transform
//! math. [`nif_animation`] merges keyframe channels and builds controller
//! chains. [`scene`] is the host-facing view used for import and export.

pub mod nif;
pub mod nif_animation;
pub mod scene;

pub use nif::codec::{NifFile, decode, encode, read_path, write_path};
pub use nif::config::{Game, NifSettings};
pub use nif::error::{BlockContext, NifError, NifWarning, Result};
pub use scene::{ImportedScene, SceneDescription, export, import};
