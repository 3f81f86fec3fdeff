use std::fmt;

use thiserror::Error;

use super::version::NifVersion;

/// Where in the block graph an error or warning happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockContext {
    pub type_name: String,
    pub index: Option<usize>,
    pub name: Option<String>,
}

impl BlockContext {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            index: None,
            name: None,
        }
    }

    pub fn header() -> Self {
        Self::new("header")
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = Some(name);
        }
        self
    }
}

impl fmt::Display for BlockContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)?;
        if let Some(index) = self.index {
            write!(f, " #{index}")?;
        }
        if let Some(name) = &self.name {
            write!(f, " '{name}'")?;
        }
        Ok(())
    }
}

/// Fatal conditions. Any of these aborts the conversion.
#[derive(Debug, Error)]
pub enum NifError {
    /// The header names a version this codec has no schema for.
    #[error("unsupported NIF version {version} (user version {user_version})")]
    UnsupportedVersion {
        version: NifVersion,
        user_version: u32,
    },

    /// The stream ended in the middle of a record.
    #[error("stream truncated while reading {at}")]
    TruncatedStream { at: BlockContext },

    /// A block type string that has no known layout.
    #[error("unknown block type '{type_name}'{}", .index.map(|i| format!(" at block #{i}")).unwrap_or_default())]
    UnknownBlockType {
        type_name: String,
        index: Option<usize>,
    },

    /// A transform whose scale differs per axis.
    #[error("non-uniform scale {scales:?} on {at}")]
    NonUniformScale { at: BlockContext, scales: [f32; 3] },

    /// Euler and quaternion samples cover the same time span.
    #[error("rotation given as both euler and quaternion keys on {at}")]
    ConflictingRotationRepresentation { at: BlockContext },

    /// A skinned vertex without any bone influence.
    #[error("vertex {vertex} of {at} has no bone weights")]
    UnweightedVertex { at: BlockContext, vertex: usize },

    /// A link index past the end of the block list.
    #[error("{at} field '{field}' links to missing block {index}")]
    DanglingLink {
        at: BlockContext,
        field: &'static str,
        index: i64,
    },

    /// A link to a block of a type the field does not accept.
    #[error("{at} field '{field}' cannot link to {target}")]
    LinkTypeMismatch {
        at: BlockContext,
        field: &'static str,
        target: BlockContext,
    },

    /// Counts, sizes or enum values that make no sense.
    #[error("invalid data in {at}: {reason}")]
    InvalidData { at: BlockContext, reason: String },

    /// A sidecar text line that does not parse.
    #[error("Syntax error in {table} line {line}: {reason}")]
    SidecarSyntax {
        table: &'static str,
        line: usize,
        reason: String,
    },

    #[error("settings: {0}")]
    Config(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NifError {
    pub fn invalid(at: BlockContext, reason: impl Into<String>) -> Self {
        NifError::InvalidData {
            at,
            reason: reason.into(),
        }
    }
}

/// Recoverable conditions. They are logged and collected; processing goes on.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NifWarning {
    #[error("{block} is a child of both {first_parent} and {other_parent}; keeping the first")]
    MultipleParents {
        block: BlockContext,
        first_parent: BlockContext,
        other_parent: BlockContext,
    },

    #[error("{at} has unsupported cycle flags {flags:#06x}; using clamp")]
    InconsistentCurveExtrapolation { at: BlockContext, flags: u16 },

    #[error("{at} uses UV set {uv_set} but geometry has {available}; using UV set 0")]
    BadUVLayerReference {
        at: BlockContext,
        uv_set: u32,
        available: usize,
    },

    #[error("skeleton root {root} is not an ancestor of bone {bone}")]
    DetachedSkinRoot {
        root: BlockContext,
        bone: BlockContext,
    },

    #[error("matrix for '{bone}' was not orthonormal and has been fixed")]
    OrthonormalizedMatrix { bone: String },
}

pub type Result<T> = std::result::Result<T, NifError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_display_includes_type_index_and_name() {
        let ctx = BlockContext::new("NiNode").at(3).named("Bip01");
        assert_eq!(ctx.to_string(), "NiNode #3 'Bip01'");
        let ctx = BlockContext::new("NiSkinData").named("");
        assert_eq!(ctx.to_string(), "NiSkinData");
    }

    #[test]
    fn unknown_block_type_reports_position() {
        let err = NifError::UnknownBlockType {
            type_name: "NiFoo".into(),
            index: Some(7),
        };
        assert_eq!(err.to_string(), "unknown block type 'NiFoo' at block #7");
    }
}
