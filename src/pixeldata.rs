//! Pixel-data extractor: splits native multi-frame payloads and parses
//! encapsulated fragment items. Every produced frame is a zero-copy view over the
//! source buffer.

use crate::error::{CoreError, CoreResult};
use crate::image_info::{tags, ImageInfo};
use crate::parser::Dataset;
use crate::tag::{ByteReader, Tag};

/// One frame's byte range within the source buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSlice {
    pub offset: usize,
    pub length: usize,
}

/// Ordered sequence of frame byte slices plus the `isEncapsulated` flag.
///
/// Invariant: `frame_count == frames.len()`; for native data every slice's length equals
/// `rows * columns * samples_per_pixel * (bits_allocated / 8)`.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelDataInfo {
    pub is_encapsulated: bool,
    pub frames: Vec<FrameSlice>,
}

impl PixelDataInfo {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame_bytes<'a>(&self, buf: &'a [u8], index: usize) -> Option<&'a [u8]> {
        let slice = self.frames.get(index)?;
        buf.get(slice.offset..slice.offset + slice.length)
    }
}

/// Extracts pixel data from a parsed dataset and its source buffer, dispatching to the
/// native or encapsulated path based on `dataset.is_encapsulated()`.
pub fn extract_pixel_data(buf: &[u8], dataset: &Dataset, info: &ImageInfo) -> CoreResult<PixelDataInfo> {
    let pixel_data_offset = dataset
        .pixel_data_offset
        .ok_or(CoreError::PixelDataMissing)?;
    let element = dataset.get(Tag::PIXEL_DATA).ok_or(CoreError::PixelDataMissing)?;

    if dataset.is_encapsulated() {
        extract_encapsulated(buf, pixel_data_offset)
    } else {
        extract_native(buf, dataset, info, element.length, pixel_data_offset)
    }
}

fn extract_native(
    buf: &[u8],
    dataset: &Dataset,
    info: &ImageInfo,
    declared_length: usize,
    value_offset: usize,
) -> CoreResult<PixelDataInfo> {
    let total_len = if declared_length == 0xFFFF_FFFF as usize {
        buf.len().saturating_sub(value_offset)
    } else {
        declared_length
    };

    if value_offset + total_len > buf.len() {
        return Err(CoreError::ParseTruncated {
            offset: value_offset,
            length: total_len,
            buffer_len: buf.len(),
        });
    }

    let frame_stride = info.bytes_per_frame();
    if frame_stride == 0 {
        return Err(CoreError::DecodeFailed {
            reason: "zero-length frame stride".into(),
        });
    }

    let frame_count = dataset
        .get_integer_string(buf, extra_tags::NUMBER_OF_FRAMES)
        .filter(|n| *n > 1)
        .map(|n| n as usize)
        .unwrap_or(1);

    let mut frames = Vec::with_capacity(frame_count);
    for k in 0..frame_count {
        let offset = value_offset + k * frame_stride;
        if offset + frame_stride > buf.len() {
            return Err(CoreError::ParseTruncated {
                offset,
                length: frame_stride,
                buffer_len: buf.len(),
            });
        }
        frames.push(FrameSlice {
            offset,
            length: frame_stride,
        });
    }

    Ok(PixelDataInfo {
        is_encapsulated: false,
        frames,
    })
}

/// Fragment items, each introduced by tag (FFFE,E000) and a 32-bit length. The first
/// item is always the Basic Offset Table and is skipped unconditionally: its declared
/// length and content are never validated against fragment sizes. An inconsistent BOT
/// surfaces later as a decode failure, not here.
fn extract_encapsulated(buf: &[u8], pixel_data_value_offset: usize) -> CoreResult<PixelDataInfo> {
    let mut reader = ByteReader::new(buf);
    reader.seek(pixel_data_value_offset);

    let mut frames = Vec::new();
    let mut first = true;

    loop {
        let item_start = reader.position();
        let Some(item_tag) = reader.read_tag() else {
            break;
        };
        let Some(item_len) = reader.read_u32() else {
            return Err(CoreError::ParseTruncated {
                offset: item_start,
                length: 4,
                buffer_len: buf.len(),
            });
        };

        if item_tag == Tag::SEQUENCE_DELIMITATION {
            break;
        }
        if item_tag != Tag::ITEM {
            return Err(CoreError::DecodeFailed {
                reason: format!("unexpected fragment item tag {:?}", item_tag),
            });
        }

        let value_offset = reader.position();
        let item_len = item_len as usize;
        if value_offset + item_len > buf.len() {
            return Err(CoreError::ParseTruncated {
                offset: value_offset,
                length: item_len,
                buffer_len: buf.len(),
            });
        }

        if first {
            // Basic Offset Table: skipped unconditionally.
            first = false;
        } else {
            frames.push(FrameSlice {
                offset: value_offset,
                length: item_len,
            });
        }

        reader.seek(value_offset + item_len);
    }

    Ok(PixelDataInfo {
        is_encapsulated: true,
        frames,
    })
}

/// (0028,0008) Number of Frames.
pub(crate) mod extra_tags {
    use crate::tag::Tag;
    pub const NUMBER_OF_FRAMES: Tag = Tag::new(0x0028, 0x0008);
}
