//! Frame decoder: dispatches encoded frame bytes to a raster, preferring a
//! hardware-accelerated path with a software fallback, and expanding native samples
//! directly.

use std::io::Cursor;

use crate::error::{CoreError, CoreResult};
use crate::image_info::{ImageInfo, PhotometricInterpretation};

/// A decoded RGBA raster. `needs_close` mirrors the close-when-needed contract of spec
/// §4.3/§5: a raster produced by a platform decode primitive that still owns external
/// (GPU-adjacent) resources must be released exactly once by the caller via
/// [`Raster::close`].
pub struct Raster {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 data, row-major, `width * height * 4` bytes.
    pub rgba: Vec<u8>,
    needs_close: bool,
    closed: bool,
}

impl Raster {
    fn new(width: u32, height: u32, rgba: Vec<u8>, needs_close: bool) -> Self {
        Raster {
            width,
            height,
            rgba,
            needs_close,
            closed: false,
        }
    }

    pub fn needs_close(&self) -> bool {
        self.needs_close
    }

    /// Releases the raster's resources. Must be called exactly once when
    /// [`Raster::needs_close`] is true; calling it more than once is a logic error
    /// caught in debug builds.
    pub fn close(&mut self) {
        debug_assert!(!self.closed, "Raster closed more than once");
        self.closed = true;
    }
}

impl Drop for Raster {
    fn drop(&mut self) {
        if self.needs_close && !self.closed {
            log::warn!("Raster dropped without being closed; GPU-adjacent memory may leak");
        }
    }
}

/// Capability a caller injects to attempt hardware-accelerated decode of a fragment
/// before falling back to the software path. Modeled as a trait rather than a concrete
/// platform binding so the core stays portable.
pub trait HardwareDecoder {
    /// Attempts to decode `frame_bytes` (a single encapsulated JPEG/JPEG-LS/JPEG2000
    /// fragment) using a hardware-accelerated primitive. Returns `None` when the
    /// primitive is unavailable or fails, triggering the software fallback.
    ///
    /// Implementations are responsible for converting a planar luma/chroma output
    /// (I420, I422, NV-family) to RGBA via their own platform blit before returning —
    /// that conversion is inherently platform-specific and has no portable Rust
    /// counterpart in this core.
    fn try_decode(&self, frame_bytes: &[u8]) -> Option<Raster>;
}

/// No hardware decode primitive available; every call falls through to software decode.
pub struct NoHardwareDecoder;

impl HardwareDecoder for NoHardwareDecoder {
    fn try_decode(&self, _frame_bytes: &[u8]) -> Option<Raster> {
        None
    }
}

/// Decode context: the dataset's image geometry plus an optional hardware decoder.
pub struct DecodeContext<'a> {
    pub image_info: &'a ImageInfo,
    pub hardware: &'a dyn HardwareDecoder,
}

/// Decodes one frame's bytes into a raster.
///
/// - Encapsulated (`is_encapsulated = true`): tries the hardware decoder first, then
///   falls back to the `image` crate's generic bitmap-creation primitive.
/// - Native (`is_encapsulated = false`): expands samples directly, including signed
///   sample rebiasing and planar RGB de-interleaving.
pub fn decode_frame(frame_bytes: &[u8], is_encapsulated: bool, ctx: &DecodeContext) -> CoreResult<Raster> {
    if is_encapsulated {
        decode_encapsulated(frame_bytes, ctx)
    } else {
        decode_native(frame_bytes, ctx.image_info)
    }
}

fn decode_encapsulated(frame_bytes: &[u8], ctx: &DecodeContext) -> CoreResult<Raster> {
    if let Some(raster) = ctx.hardware.try_decode(frame_bytes) {
        return Ok(raster);
    }

    // Software fallback: construct a blob of the encoded bytes and invoke a generic
    // bitmap-creation primitive (the `image` crate's format-sniffing decoder).
    let dynamic = image::load_from_memory(frame_bytes).map_err(|e| CoreError::DecodeFailed {
        reason: format!("software fallback decode failed: {e}"),
    })?;
    let rgba = dynamic.to_rgba8();
    let (width, height) = (rgba.width(), rgba.height());
    Ok(Raster::new(width, height, rgba.into_raw(), true))
}

fn decode_native(frame_bytes: &[u8], info: &ImageInfo) -> CoreResult<Raster> {
    let width = info.columns;
    let height = info.rows;
    let pixel_count = width as usize * height as usize;
    let mut rgba = vec![0u8; pixel_count * 4];

    match (info.bits_allocated, info.samples_per_pixel) {
        (8, 1) => decode_native_mono8(frame_bytes, info, &mut rgba)?,
        (16, 1) => decode_native_mono16(frame_bytes, info, &mut rgba)?,
        (8, 3) => decode_native_rgb8(frame_bytes, info, &mut rgba)?,
        other => {
            return Err(CoreError::DecodeFailed {
                reason: format!(
                    "unsupported native sample layout: {} bits x {} samples",
                    other.0, other.1
                ),
            })
        }
    }

    Ok(Raster::new(width, height, rgba, false))
}

fn decode_native_mono8(frame_bytes: &[u8], info: &ImageInfo, rgba: &mut [u8]) -> CoreResult<()> {
    let pixel_count = info.rows as usize * info.columns as usize;
    if frame_bytes.len() < pixel_count {
        return Err(CoreError::DecodeFailed {
            reason: "frame shorter than rows*columns for 8-bit mono".into(),
        });
    }
    let invert = info.photometric_interpretation == PhotometricInterpretation::Monochrome1;
    for i in 0..pixel_count {
        let raw = frame_bytes[i];
        let v = if invert { 255 - raw } else { raw };
        let o = i * 4;
        rgba[o] = v;
        rgba[o + 1] = v;
        rgba[o + 2] = v;
        rgba[o + 3] = 255;
    }
    Ok(())
}

fn decode_native_mono16(frame_bytes: &[u8], info: &ImageInfo, rgba: &mut [u8]) -> CoreResult<()> {
    let pixel_count = info.rows as usize * info.columns as usize;
    if frame_bytes.len() < pixel_count * 2 {
        return Err(CoreError::DecodeFailed {
            reason: "frame shorter than rows*columns*2 for 16-bit mono".into(),
        });
    }
    let max_value = (1u32 << info.bits_stored) - 1;
    let invert = info.photometric_interpretation == PhotometricInterpretation::Monochrome1;
    let signed = info.is_signed();
    let bias = if signed { 1i64 << (info.bits_stored - 1) } else { 0 };

    for i in 0..pixel_count {
        let lo = frame_bytes[i * 2];
        let hi = frame_bytes[i * 2 + 1];
        let raw = u16::from_le_bytes([lo, hi]) as i64;
        let sample = if signed {
            // Sign-extend from bits_stored, then bias into an unsigned range before the
            // same linear rescale native 16-bit monochrome uses.
            let signed_val = sign_extend(raw, info.bits_stored);
            signed_val + bias
        } else {
            raw
        };
        let clamped = sample.clamp(0, max_value as i64) as u32;
        let scaled = ((clamped as u64 * 255) / (max_value as u64).max(1)) as u8;
        let v = if invert { 255 - scaled } else { scaled };
        let o = i * 4;
        rgba[o] = v;
        rgba[o + 1] = v;
        rgba[o + 2] = v;
        rgba[o + 3] = 255;
    }
    Ok(())
}

fn sign_extend(value: i64, bits: u16) -> i64 {
    let shift = 64 - bits as u32;
    (value << shift) >> shift
}

fn decode_native_rgb8(frame_bytes: &[u8], info: &ImageInfo, rgba: &mut [u8]) -> CoreResult<()> {
    let pixel_count = info.rows as usize * info.columns as usize;
    if frame_bytes.len() < pixel_count * 3 {
        return Err(CoreError::DecodeFailed {
            reason: "frame shorter than rows*columns*3 for RGB/YBR".into(),
        });
    }
    let planar = info.planar_configuration == 1;
    for i in 0..pixel_count {
        let (r, g, b) = if planar {
            (
                frame_bytes[i],
                frame_bytes[pixel_count + i],
                frame_bytes[2 * pixel_count + i],
            )
        } else {
            (
                frame_bytes[i * 3],
                frame_bytes[i * 3 + 1],
                frame_bytes[i * 3 + 2],
            )
        };
        let o = i * 4;
        rgba[o] = r;
        rgba[o + 1] = g;
        rgba[o + 2] = b;
        rgba[o + 3] = 255;
    }
    Ok(())
}

/// Encodes a raster as a PNG blob, used only by the software fallback's test harness
/// and by integration tests that need a real encapsulated fragment to round-trip.
pub fn encode_png_for_tests(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image::write_buffer_with_format(
        &mut out,
        rgba,
        width,
        height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .expect("encoding a freshly built RGBA buffer never fails");
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_info::{ImageInfo, PhotometricInterpretation};

    fn mono_info(bits_allocated: u16, bits_stored: u16, photometric: PhotometricInterpretation) -> ImageInfo {
        ImageInfo {
            rows: 1,
            columns: 2,
            bits_allocated,
            bits_stored,
            high_bit: bits_stored - 1,
            pixel_representation: 0,
            photometric_interpretation: photometric,
            samples_per_pixel: 1,
            planar_configuration: 0,
            pixel_spacing: None,
            ultrasound_region: None,
        }
    }

    #[test]
    fn mono8_replicates_into_rgb_and_sets_alpha() {
        let info = mono_info(8, 8, PhotometricInterpretation::Monochrome2);
        let mut rgba = vec![0u8; 2 * 4];
        decode_native_mono8(&[0, 63], &info, &mut rgba).unwrap();
        assert_eq!(&rgba[0..4], &[0, 0, 0, 255]);
        assert_eq!(&rgba[4..8], &[63, 63, 63, 255]);
    }

    #[test]
    fn monochrome1_inverts() {
        let info = mono_info(8, 8, PhotometricInterpretation::Monochrome1);
        let mut rgba = vec![0u8; 2 * 4];
        decode_native_mono8(&[0, 255], &info, &mut rgba).unwrap();
        assert_eq!(rgba[0], 255);
        assert_eq!(rgba[4], 0);
    }

    #[test]
    fn mono16_rescales_linearly_to_full_range() {
        let info = mono_info(16, 12, PhotometricInterpretation::Monochrome2);
        let max = (1u16 << 12) - 1;
        let mut rgba = vec![0u8; 2 * 4];
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&max.to_le_bytes());
        decode_native_mono16(&bytes, &info, &mut rgba).unwrap();
        assert_eq!(rgba[0], 0);
        assert_eq!(rgba[4], 255);
    }

    #[test]
    fn rgb_interleaved_copies_channels() {
        let mut info = mono_info(8, 8, PhotometricInterpretation::Rgb);
        info.samples_per_pixel = 3;
        let mut rgba = vec![0u8; 2 * 4];
        let pixels = [10u8, 20, 30, 40, 50, 60];
        decode_native_rgb8(&pixels, &info, &mut rgba).unwrap();
        assert_eq!(&rgba[0..4], &[10, 20, 30, 255]);
        assert_eq!(&rgba[4..8], &[40, 50, 60, 255]);
    }

    #[test]
    fn hardware_decoder_is_tried_before_software_fallback() {
        struct AlwaysHits;
        impl HardwareDecoder for AlwaysHits {
            fn try_decode(&self, _frame_bytes: &[u8]) -> Option<Raster> {
                Some(Raster::new(1, 1, vec![1, 2, 3, 4], true))
            }
        }
        let info = mono_info(8, 8, PhotometricInterpretation::Monochrome2);
        let hw = AlwaysHits;
        let ctx = DecodeContext {
            image_info: &info,
            hardware: &hw,
        };
        let mut raster = decode_frame(&[0xFF], true, &ctx).unwrap();
        assert_eq!(raster.rgba, vec![1, 2, 3, 4]);
        assert!(raster.needs_close());
        raster.close();
    }

    #[test]
    fn software_fallback_decodes_real_png() {
        let info = mono_info(8, 8, PhotometricInterpretation::Monochrome2);
        let hw = NoHardwareDecoder;
        let ctx = DecodeContext {
            image_info: &info,
            hardware: &hw,
        };
        let png = encode_png_for_tests(2, 2, &[255u8; 2 * 2 * 4]);
        let mut raster = decode_frame(&png, true, &ctx).unwrap();
        assert_eq!(raster.width, 2);
        assert_eq!(raster.height, 2);
        raster.close();
    }
}
