//! Error types for rootcodec operations.

use thiserror::Error;

/// Result type for rootcodec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for rootcodec operations.
///
/// Errors are `Clone` so a cursor can hand out its latched error any number
/// of times without giving it up.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Read past the end of the buffer.
    #[error("unexpected end of buffer")]
    UnexpectedEof,

    /// Bytes consumed by an object disagree with its recorded byte count.
    #[error("byte count mismatch for {class}: expected {expected} bytes, read {actual}")]
    ByteCountMismatch {
        class: String,
        expected: u64,
        actual: u64,
    },

    /// Record too large for the compact byte count field.
    #[error("byte count {count} too large for {class}")]
    ByteCountTooLarge { class: String, count: u64 },

    /// No constructor registered for a class name.
    #[error("class not registered: {0}")]
    ClassNotFound(String),

    /// No streamer metadata registered for a class (and version).
    #[error("no streamer info for {class} (version {version:?})")]
    StreamerInfoNotFound { class: String, version: Option<i32> },

    /// Caller contract violation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Streamer element type tag with no generic decoding.
    #[error("unsupported streamer type {type_code} for element {element:?}")]
    UnsupportedStreamerType { element: String, type_code: i32 },

    /// Object back-reference or self reference in the stream.
    #[error("unsupported object reference tag {0:#x}")]
    UnsupportedReference(u32),

    /// Class reference to a tag never seen in this buffer.
    #[error("unknown class tag {0:#x}")]
    UnknownClassTag(u32),

    /// Nested records deeper than the reader allows.
    #[error("object nesting deeper than {0} levels")]
    NestingTooDeep(usize),

    /// Polymorphic decode attempted without a factory context.
    #[error("no decode context attached to reader")]
    NoContext,

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Creates a byte count mismatch error.
    pub fn byte_count_mismatch(class: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::ByteCountMismatch {
            class: class.into(),
            expected,
            actual,
        }
    }

    /// Creates a streamer-info lookup error.
    pub fn streamer_not_found(class: impl Into<String>, version: Option<i32>) -> Self {
        Self::StreamerInfoNotFound {
            class: class.into(),
            version,
        }
    }

    /// Creates a custom error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}
