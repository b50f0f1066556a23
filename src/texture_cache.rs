//! Layered (array) texture cache with a VRAM-budgeted LRU policy.
//!
//! One immutable layered texture is allocated per `Series`, sized `(width, height,
//! frameCount)`; individual layers are populated later via sub-image uploads. Eviction
//! follows a single global LRU keyed on a monotonic last-access counter, the same
//! `SlotMap<DefaultKey, (_, _, wgpu::Texture)>` bookkeeping shape as the rest of this
//! crate's GPU resource pools, generalized here with an explicit byte-cost ledger and
//! touch-driven eviction.

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::error::{CoreError, CoreResult};

new_key_type! {
    /// Handle identifying one series' array texture in the cache.
    pub struct TextureCacheKey;
}

/// GPU-side operations the cache needs: allocate one immutable layered texture,
/// sub-image-upload one layer, and release the whole texture. Kept as a trait so the
/// cache's eviction/admission bookkeeping is testable without a real GPU device,
/// isolated from the concrete `wgpu::Device` it eventually binds to.
pub trait TextureBackend {
    type Handle;

    fn allocate_layered(&mut self, width: u32, height: u32, layer_count: u32) -> Self::Handle;
    fn upload_layer(&mut self, handle: &Self::Handle, layer: u32, rgba: &[u8]);
    fn release(&mut self, handle: Self::Handle);
}

/// Fixed filtering policy applied to every cached texture: linear min/mag,
/// clamp-to-edge wrap. Exposed so a real `wgpu` backend can build its `SamplerDescriptor`
/// from it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterPolicy;

impl FilterPolicy {
    pub const MIN_MAG_FILTER_LINEAR: bool = true;
    pub const WRAP_CLAMP_TO_EDGE: bool = true;
}

struct Entry<H> {
    handle: H,
    width: u32,
    height: u32,
    layer_count: u32,
    bytes_per_pixel: u64,
    cost_bytes: u64,
    last_access: u64,
}

impl<H> Entry<H> {
    fn bytes(width: u32, height: u32, layer_count: u32, bytes_per_pixel: u64) -> u64 {
        width as u64 * height as u64 * layer_count as u64 * bytes_per_pixel
    }
}

/// VRAM-budgeted LRU cache of array textures, one per series.
pub struct TextureCache<B: TextureBackend> {
    backend: B,
    entries: SlotMap<TextureCacheKey, Entry<B::Handle>>,
    live_bytes: u64,
    max_bytes: Option<u64>,
    clock: u64,
}

impl<B: TextureBackend> TextureCache<B> {
    /// `max_bytes = None` means unbounded.
    pub fn new(backend: B, max_bytes: Option<u64>) -> Self {
        TextureCache {
            backend,
            entries: SlotMap::with_key(),
            live_bytes: 0,
            max_bytes,
            clock: 0,
        }
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    pub fn contains(&self, key: TextureCacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Admits a new series texture, evicting LRU entries until the budget fits.
    /// Allocation happens exactly once; fails with `texture-too-large` (without evicting
    /// anything) if the candidate alone cannot fit even in an empty cache.
    pub fn admit(
        &mut self,
        width: u32,
        height: u32,
        layer_count: u32,
        bytes_per_pixel: u64,
    ) -> CoreResult<TextureCacheKey> {
        let candidate_bytes = Entry::<B::Handle>::bytes(width, height, layer_count, bytes_per_pixel);

        if let Some(budget) = self.max_bytes {
            if candidate_bytes > budget {
                return Err(CoreError::TextureTooLarge {
                    bytes: candidate_bytes,
                    budget_bytes: budget,
                });
            }
            while self.live_bytes + candidate_bytes > budget {
                if !self.evict_one() {
                    // Cache is empty but candidate still doesn't fit: unreachable given
                    // the check above, but defensive against a budget of 0.
                    return Err(CoreError::TextureTooLarge {
                        bytes: candidate_bytes,
                        budget_bytes: budget,
                    });
                }
            }
        }

        let handle = self.backend.allocate_layered(width, height, layer_count);
        let last_access = self.tick();
        let key = self.entries.insert(Entry {
            handle,
            width,
            height,
            layer_count,
            bytes_per_pixel,
            cost_bytes: candidate_bytes,
            last_access,
        });
        self.live_bytes += candidate_bytes;
        Ok(key)
    }

    /// Evicts the single least-recently-used entry. Returns `false` if the cache was
    /// empty.
    fn evict_one(&mut self) -> bool {
        let Some((lru_key, _)) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, e)| (k, e.last_access))
        else {
            return false;
        };
        if let Some(entry) = self.entries.remove(lru_key) {
            self.live_bytes -= entry.cost_bytes;
            self.backend.release(entry.handle);
        }
        true
    }

    /// Uploads a decoded raster to a specific layer, without rebinding the texture.
    pub fn upload_layer(&mut self, key: TextureCacheKey, layer: u32, rgba: &[u8]) -> CoreResult<()> {
        let entry = self.entries.get(key).ok_or(CoreError::DecodeFailed {
            reason: "upload to a texture not present in the cache".into(),
        })?;
        if layer >= entry.layer_count {
            return Err(CoreError::FrameOutOfRange {
                requested: layer as i64 + 1,
                frame_count: entry.layer_count as usize,
            });
        }
        self.backend.upload_layer(&entry.handle, layer, rgba);
        Ok(())
    }

    /// Touches an entry's LRU position; called on every sample-bind.
    pub fn touch(&mut self, key: TextureCacheKey) {
        let tick = self.tick();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_access = tick;
        }
    }

    pub fn dimensions(&self, key: TextureCacheKey) -> Option<(u32, u32, u32)> {
        self.entries
            .get(key)
            .map(|e| (e.width, e.height, e.layer_count))
    }
}

/// A `HashMap`-backed test/headless `TextureBackend` that never touches real GPU memory,
/// used for unit tests of the cache's bookkeeping and by higher layers (scheduler,
/// viewport manager) that do not themselves need a live GPU context.
#[derive(Default)]
pub struct NullBackend {
    next_id: u64,
    allocations: HashMap<u64, (u32, u32, u32)>,
}

impl TextureBackend for NullBackend {
    type Handle = u64;

    fn allocate_layered(&mut self, width: u32, height: u32, layer_count: u32) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.allocations.insert(id, (width, height, layer_count));
        id
    }

    fn upload_layer(&mut self, handle: &u64, layer: u32, _rgba: &[u8]) {
        debug_assert!(self.allocations.contains_key(handle));
        let _ = layer;
    }

    fn release(&mut self, handle: u64) {
        self.allocations.remove(&handle);
    }
}
