//! The real [`TextureBackend`] behind the texture cache: one immutable `wgpu::Texture`
//! per series, sized `(width, height, layerCount)`, populated one layer at a time via
//! `Queue::write_texture`.
//!
//! Grounded in the teacher's `pool.rs::insert_cacheable_texture`, which also wraps a bare
//! `wgpu::Texture` behind a small handle type rather than exposing the device directly to
//! callers that only need to allocate/upload/release.

use std::sync::Arc;

use crate::texture_cache::{FilterPolicy, TextureBackend};

/// Handle to one series' array texture: the texture itself plus the view callers bind
/// when sampling (layer selection happens in the shader via the view's array index, not
/// by rebinding).
pub struct WgpuTextureHandle {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

/// The array-texture format and usage every series texture is created with: 8-bit RGBA,
/// sampled in a fragment shader, never rendered to or copied from.
const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct WgpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    sampler: wgpu::Sampler,
}

impl WgpuBackend {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        let sampler = device.create_sampler(&sampler_descriptor());
        WgpuBackend {
            device,
            queue,
            sampler,
        }
    }

    /// The one fixed sampler shared by every cached texture, built from
    /// [`FilterPolicy`]'s documented linear/clamp-to-edge policy.
    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }
}

fn sampler_descriptor() -> wgpu::SamplerDescriptor<'static> {
    let address_mode = if FilterPolicy::WRAP_CLAMP_TO_EDGE {
        wgpu::AddressMode::ClampToEdge
    } else {
        wgpu::AddressMode::Repeat
    };
    let filter = if FilterPolicy::MIN_MAG_FILTER_LINEAR {
        wgpu::FilterMode::Linear
    } else {
        wgpu::FilterMode::Nearest
    };
    wgpu::SamplerDescriptor {
        label: Some("array-texture-cache-sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    }
}

impl TextureBackend for WgpuBackend {
    type Handle = WgpuTextureHandle;

    /// Allocates the series' array texture exactly once; individual layers are written
    /// later by [`Self::upload_layer`], never by reallocating.
    fn allocate_layered(&mut self, width: u32, height: u32, layer_count: u32) -> WgpuTextureHandle {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("series-array-texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: layer_count.max(1),
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("series-array-texture-view"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });
        WgpuTextureHandle { texture, view }
    }

    /// `rgba` is a tightly packed `width * height * 4` byte buffer; `bytemuck::cast_slice`
    /// reinterprets it as `u32` texels only to assert the buffer's length is a multiple
    /// of the pixel stride before handing the original bytes to `write_texture`, the same
    /// "cast, then copy the byte view" discipline the teacher's `program.rs` uses when
    /// moving pixel content between host buffers and GPU-facing ones.
    fn upload_layer(&mut self, handle: &WgpuTextureHandle, layer: u32, rgba: &[u8]) {
        let texels: &[u32] = bytemuck::cast_slice(rgba);
        let width = handle.texture.width();
        let height = handle.texture.height();
        debug_assert_eq!(texels.len(), width as usize * height as usize);

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &handle.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    /// `wgpu::Texture` releases its GPU allocation on drop; nothing further to do once
    /// the handle is no longer referenced by the cache.
    fn release(&mut self, handle: WgpuTextureHandle) {
        handle.texture.destroy();
    }
}
