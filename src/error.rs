//! Error taxonomy.
//!
//! Every variant carries a stable machine code via [`CoreError::code`] so that an outer
//! UI layer can map it to a user-facing message and remediation hint without matching on
//! the `Display` text.

use thiserror::Error;

/// The stable, machine-readable error code for a [`CoreError`].
///
/// These strings are part of the public contract: an external collaborator (the UI
/// layer) keys its own message/remediation table off them, so they must never change
/// once shipped.
pub type ErrorCode = &'static str;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("buffer is not a recognized DICOM Part-10 stream")]
    NotDicom,

    #[error("element at offset {offset} with length {length} exceeds buffer of {buffer_len} bytes")]
    ParseTruncated {
        offset: usize,
        length: usize,
        buffer_len: usize,
    },

    #[error("transfer syntax `{uid}` is not supported for decode")]
    UnsupportedTransferSyntax { uid: String },

    #[error("dataset has no (7FE0,0010) pixel data element")]
    PixelDataMissing,

    #[error("frame {requested} is out of range 1..={frame_count}")]
    FrameOutOfRange { requested: i64, frame_count: usize },

    #[error("frame decode failed: {reason}")]
    DecodeFailed { reason: String },

    #[error("texture of {bytes} bytes exceeds the {budget_bytes}-byte VRAM budget even in an empty cache")]
    TextureTooLarge { bytes: u64, budget_bytes: u64 },

    #[error("network request failed: {reason}")]
    NetworkFailed { reason: String },

    /// Transient network condition. Never surfaced outside the retry loop.
    #[error("retryable network condition: {reason}")]
    NetworkRetryable { reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("annotation cap exceeded for {scope}")]
    CapExceeded { scope: String },

    #[error("permission denied: annotation {annotation_id} is not {action}")]
    PermissionDenied {
        annotation_id: String,
        action: &'static str,
    },
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::NotDicom => "not-dicom",
            CoreError::ParseTruncated { .. } => "parse-truncated",
            CoreError::UnsupportedTransferSyntax { .. } => "unsupported-transfer-syntax",
            CoreError::PixelDataMissing => "pixel-data-missing",
            CoreError::FrameOutOfRange { .. } => "frame-out-of-range",
            CoreError::DecodeFailed { .. } => "decode-failed",
            CoreError::TextureTooLarge { .. } => "texture-too-large",
            CoreError::NetworkFailed { .. } => "network-failed",
            CoreError::NetworkRetryable { .. } => "network-retryable",
            CoreError::Cancelled => "cancelled",
            CoreError::CapExceeded { .. } => "cap-exceeded",
            CoreError::PermissionDenied { .. } => "permission-denied",
        }
    }

    /// Whether the network retry loop should retry this condition (HTTP 408/429/5xx or a
    /// transport error maps here before ever reaching a caller).
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::NetworkRetryable { .. })
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
