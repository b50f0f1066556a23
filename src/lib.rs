//! Runtime engine for a high-throughput DICOM multi-frame cine viewer.
//!
//! This crate owns the decode-and-present pipeline only: byte-level Part-10 parsing,
//! pixel-data extraction, frame decode, the GPU texture cache, viewport/sync/scheduler
//! state, data-source access (local and WADO-RS), and the annotation coordinate core.
//! Window/DOM layout, interactive gestures, theming, and the JSON annotation
//! import/export schema live outside the core and are not modeled here.

pub mod annotation;
pub mod config;
pub mod datasource;
pub mod decode;
pub mod error;
pub mod image_info;
pub mod parser;
pub mod pixeldata;
pub mod scheduler;
pub mod sync;
pub mod tag;
pub mod texture_cache;
pub mod viewport;
pub mod wgpu_backend;

pub use error::{CoreError, CoreResult, ErrorCode};
