//! Configuration records. Plain `Default`-implementing structs — there is no
//! persisted state or config-file format at the core.

use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq)]
pub struct WadoConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub headers: HashMap<String, String>,
    pub auth_token: Option<String>,
    pub frame_cache_size: usize,
    pub metadata_cache_size: usize,
}

impl WadoConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        WadoConfig {
            base_url: base_url.into(),
            timeout_ms: 30_000,
            max_retries: 3,
            headers: HashMap::new(),
            auth_token: None,
            frame_cache_size: 100,
            metadata_cache_size: 50,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LocalConfig {
    pub frame_cache_size: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        LocalConfig {
            frame_cache_size: 100,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerfOptions {
    /// `None` means unbounded.
    pub max_vram_mb: Option<u64>,
    pub dpr_override: Option<f32>,
    pub debug_mode: bool,
}

impl Default for PerfOptions {
    fn default() -> Self {
        PerfOptions {
            max_vram_mb: None,
            dpr_override: None,
            debug_mode: false,
        }
    }
}

impl PerfOptions {
    pub fn max_vram_bytes(&self) -> Option<u64> {
        self.max_vram_mb.map(|mb| mb * 1024 * 1024)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LayoutConfig {
    pub rows: u32,
    pub cols: u32,
    pub gap: i32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            rows: 1,
            cols: 1,
            gap: 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncModeConfig {
    FrameRatio,
    Time,
    Manual,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyncOptions {
    pub master_id: u64,
    pub slave_ids: Vec<u64>,
    pub mode: SyncModeConfig,
}
