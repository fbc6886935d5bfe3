//! Error taxonomy for the formatter.
//!
//! Node and scope errors are never caught internally: they travel up through
//! the visit, the pass driver logs the failing node and the run aborts.

use std::path::{Path, PathBuf};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_INVALID_AST: &str = "LF-ERR-AST-001";
pub const ERR_INVALID_NODE: &str = "LF-ERR-NODE-001";
pub const ERR_INVALID_OPERATOR: &str = "LF-ERR-OP-001";
pub const ERR_SYNTAX: &str = "LF-ERR-SYNTAX-001";
pub const ERR_UNSUPPORTED_FORMAT: &str = "LF-ERR-FORMAT-001";
pub const ERR_DECOMPILER: &str = "LF-ERR-FORMAT-002";
pub const ERR_INVALID_MODE: &str = "LF-ERR-USAGE-001";
pub const ERR_IO: &str = "LF-ERR-IO-001";
pub const ERR_JSON: &str = "LF-ERR-IO-002";

#[derive(Debug, Error)]
pub enum FormatError {
    /// A serialized node has an unknown `type` or a missing/malformed child.
    #[error("invalid AST: {message}")]
    InvalidAst { message: String },

    /// An in-memory node is missing a required child slot.
    #[error("invalid {kind} node: {message}")]
    InvalidNode { kind: &'static str, message: String },

    #[error("invalid operator '{0}'")]
    InvalidOperator(String),

    #[error("syntax error at {line}:{column}: {message}")]
    Syntax {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("unsupported bytecode (version 0x{version:02x}, format 0x{format:02x})")]
    UnsupportedFormat { version: u8, format: u8 },

    #[error("decompiler failed: {0}")]
    Decompiler(String),

    #[error("invalid mode '{0}', expected 'deobfuscate' or 'obfuscate'")]
    InvalidMode(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FormatError {
    pub fn invalid_ast(message: impl Into<String>) -> Self {
        FormatError::InvalidAst {
            message: message.into(),
        }
    }

    pub fn invalid_node(kind: &'static str, message: impl Into<String>) -> Self {
        FormatError::InvalidNode {
            kind,
            message: message.into(),
        }
    }

    pub fn syntax(line: u32, column: u32, message: impl Into<String>) -> Self {
        FormatError::Syntax {
            line,
            column,
            message: message.into(),
        }
    }

    pub fn io(path: &Path, source: std::io::Error) -> Self {
        FormatError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable code printed next to the message by the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            FormatError::InvalidAst { .. } => ERR_INVALID_AST,
            FormatError::InvalidNode { .. } => ERR_INVALID_NODE,
            FormatError::InvalidOperator(_) => ERR_INVALID_OPERATOR,
            FormatError::Syntax { .. } => ERR_SYNTAX,
            FormatError::UnsupportedFormat { .. } => ERR_UNSUPPORTED_FORMAT,
            FormatError::Decompiler(_) => ERR_DECOMPILER,
            FormatError::InvalidMode(_) => ERR_INVALID_MODE,
            FormatError::Io { .. } => ERR_IO,
            FormatError::Json(_) => ERR_JSON,
        }
    }
}

pub type Result<T> = std::result::Result<T, FormatError>;
