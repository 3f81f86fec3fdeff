// src/nif/mod.rs

pub mod codec;
pub mod config;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod sidecar;
pub mod skeleton;
pub mod skin;
pub mod transform;
pub mod types;
pub mod version;
