//! DICOM Part-10 parser: builds a tag-indexed element table, locates pixel
//! data, and classifies the transfer syntax. Values are never eagerly materialized —
//! [`Element`] only records a byte offset and length into the caller-owned source
//! buffer; getters slice on demand.

use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::tag::{is_long_form_vr, ByteReader, Tag};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const HEADER_LEN: usize = PREAMBLE_LEN + 4;

/// One dataset element: its tag, VR, and the location of its value within the source
/// buffer. The value bytes are not copied; `Dataset::element_bytes` slices on demand.
#[derive(Clone, Copy, Debug)]
pub struct Element {
    pub tag: Tag,
    pub vr: [u8; 2],
    pub offset: usize,
    pub length: usize,
}

/// A parsed dataset: a tag-keyed element table plus the bits of header state the rest of
/// the pipeline needs (transfer syntax, pixel data location).
///
/// Holds only offsets into the source buffer, never copies of it — `Dataset`'s lifetime
/// is bound to the caller's buffer lifetime by the `'a` markers on the methods that
/// slice it, even though the struct itself stores no borrow (offsets are plain `usize`).
#[derive(Clone, Debug, Default)]
pub struct Dataset {
    elements: HashMap<String, Element>,
    pub transfer_syntax_uid: Option<String>,
    pub pixel_data_offset: Option<usize>,
}

impl Dataset {
    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag.to_key())
    }

    pub fn element_bytes<'a>(&self, buf: &'a [u8], tag: Tag) -> Option<&'a [u8]> {
        let el = self.get(tag)?;
        buf.get(el.offset..el.offset + el.length)
    }

    /// Reads a trimmed ASCII string value for `tag`, if present.
    pub fn get_string<'a>(&self, buf: &'a [u8], tag: Tag) -> Option<String> {
        let bytes = self.element_bytes(buf, tag)?;
        Some(
            String::from_utf8_lossy(bytes)
                .trim_matches(|c: char| c == '\0' || c.is_whitespace())
                .to_string(),
        )
    }

    /// Reads a decimal-ASCII integer value (e.g. Number of Frames), if present.
    pub fn get_integer_string(&self, buf: &[u8], tag: Tag) -> Option<i64> {
        self.get_string(buf, tag)?.parse().ok()
    }

    pub fn is_encapsulated(&self) -> bool {
        match &self.transfer_syntax_uid {
            Some(uid) => is_encapsulated_transfer_syntax(uid),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Any UID beginning with `1.2.840.10008.1.2.4` or equal to `1.2.840.10008.1.2.5` is
/// encapsulated; everything else is native little-endian.
pub fn is_encapsulated_transfer_syntax(uid: &str) -> bool {
    uid.starts_with("1.2.840.10008.1.2.4") || uid == "1.2.840.10008.1.2.5"
}

/// Recognizes the source as DICOM and locates where element parsing should begin:
/// offset 132 (preamble + magic) if bytes 128..132 are `DICM`, or offset 0 if the first
/// group-number halfword equals `0x0002` or `0x0008` (legacy, preamble-less streams).
/// Returns `None` when neither holds.
fn header_start(buf: &[u8]) -> Option<usize> {
    if buf.len() >= HEADER_LEN && &buf[PREAMBLE_LEN..HEADER_LEN] == MAGIC {
        return Some(HEADER_LEN);
    }
    if buf.len() >= 2 {
        let group = u16::from_le_bytes([buf[0], buf[1]]);
        if group == 0x0002 || group == 0x0008 {
            return Some(0);
        }
    }
    None
}

/// Parses a DICOM Part-10 buffer into a [`Dataset`]. Parsing begins at offset 132
/// (preamble + magic) when the preamble is present, or at offset 0 for a legacy
/// preamble-less stream recognized by its leading group number.
pub fn parse(buf: &[u8]) -> CoreResult<Dataset> {
    let Some(start) = header_start(buf) else {
        return Err(CoreError::NotDicom);
    };

    let mut dataset = Dataset::default();
    let mut reader = ByteReader::new(buf);
    reader.seek(start);

    loop {
        let start = reader.position();
        let Some(tag) = reader.read_tag() else {
            break;
        };
        let Some(vr) = reader.read_vr() else {
            return Err(CoreError::ParseTruncated {
                offset: start,
                length: 2,
                buffer_len: buf.len(),
            });
        };

        let length = if is_long_form_vr(&vr) {
            if reader.read_u16().is_none() {
                return Err(CoreError::ParseTruncated {
                    offset: reader.position(),
                    length: 2,
                    buffer_len: buf.len(),
                });
            }
            match reader.read_u32() {
                Some(l) => l,
                None => {
                    return Err(CoreError::ParseTruncated {
                        offset: reader.position(),
                        length: 4,
                        buffer_len: buf.len(),
                    })
                }
            }
        } else {
            match reader.read_u16() {
                Some(l) => l as u32,
                None => {
                    return Err(CoreError::ParseTruncated {
                        offset: reader.position(),
                        length: 2,
                        buffer_len: buf.len(),
                    })
                }
            }
        };

        if tag == Tag::PIXEL_DATA {
            dataset.pixel_data_offset = Some(reader.position());
            let el = Element {
                tag,
                vr,
                offset: reader.position(),
                length: length as usize,
            };
            dataset.elements.insert(tag.to_key(), el);
            break;
        }

        // Sequence content (undefined length) is not required by the core; stop here.
        if length == 0xFFFF_FFFF {
            break;
        }

        let value_offset = reader.position();
        if value_offset + length as usize > buf.len() {
            return Err(CoreError::ParseTruncated {
                offset: value_offset,
                length: length as usize,
                buffer_len: buf.len(),
            });
        }

        let el = Element {
            tag,
            vr,
            offset: value_offset,
            length: length as usize,
        };
        dataset.elements.insert(tag.to_key(), el);

        if tag == Tag::TRANSFER_SYNTAX_UID {
            dataset.transfer_syntax_uid = dataset.get_string(buf, tag);
        }

        reader.seek(value_offset + length as usize);
    }

    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_preamble(buf: &mut Vec<u8>) {
        buf.extend(std::iter::repeat(0u8).take(PREAMBLE_LEN));
        buf.extend_from_slice(MAGIC);
    }

    fn push_short_element(buf: &mut Vec<u8>, tag: Tag, vr: &[u8; 2], value: &[u8]) {
        buf.extend_from_slice(&tag.group.to_le_bytes());
        buf.extend_from_slice(&tag.element.to_le_bytes());
        buf.extend_from_slice(vr);
        buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
        buf.extend_from_slice(value);
    }

    fn push_long_element(buf: &mut Vec<u8>, tag: Tag, vr: &[u8; 2], value: &[u8]) {
        buf.extend_from_slice(&tag.group.to_le_bytes());
        buf.extend_from_slice(&tag.element.to_le_bytes());
        buf.extend_from_slice(vr);
        buf.extend_from_slice(&[0u8, 0u8]); // reserved
        buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
        buf.extend_from_slice(value);
    }

    #[test]
    fn rejects_short_buffer() {
        let buf = vec![0u8; 10];
        assert!(matches!(parse(&buf), Err(CoreError::NotDicom)));
    }

    #[test]
    fn recognizes_magic_and_finds_transfer_syntax() {
        let mut buf = Vec::new();
        write_preamble(&mut buf);
        push_short_element(&mut buf, Tag::TRANSFER_SYNTAX_UID, b"UI", b"1.2.840.10008.1.2.1\0");
        push_short_element(&mut buf, Tag::new(0x0028, 0x0010), b"US", &16u16.to_le_bytes());

        let ds = parse(&buf).unwrap();
        assert_eq!(
            ds.transfer_syntax_uid.as_deref(),
            Some("1.2.840.10008.1.2.1")
        );
        assert!(!ds.is_encapsulated());
    }

    #[test]
    fn stops_at_pixel_data_and_records_offset() {
        let mut buf = Vec::new();
        write_preamble(&mut buf);
        push_short_element(&mut buf, Tag::new(0x0028, 0x0010), b"US", &8u16.to_le_bytes());
        let pixel_offset_marker = buf.len() + 8; // tag(4)+vr(2)+reserved(2)
        push_long_element(&mut buf, Tag::PIXEL_DATA, b"OW", &[1, 2, 3, 4]);

        let ds = parse(&buf).unwrap();
        assert_eq!(ds.pixel_data_offset, Some(pixel_offset_marker));
        assert!(ds.get(Tag::PIXEL_DATA).is_some());
    }

    #[test]
    fn missing_pixel_data_still_yields_dataset() {
        let mut buf = Vec::new();
        write_preamble(&mut buf);
        push_short_element(&mut buf, Tag::new(0x0028, 0x0010), b"US", &8u16.to_le_bytes());

        let ds = parse(&buf).unwrap();
        assert!(ds.pixel_data_offset.is_none());
        assert!(!ds.is_empty());
    }

    #[test]
    fn truncated_element_is_an_error() {
        let mut buf = Vec::new();
        write_preamble(&mut buf);
        buf.extend_from_slice(&0x0028u16.to_le_bytes());
        buf.extend_from_slice(&0x0010u16.to_le_bytes());
        buf.extend_from_slice(b"US");
        buf.extend_from_slice(&100u16.to_le_bytes()); // declares far more than available
        buf.extend_from_slice(&[1, 2, 3]);

        assert!(matches!(parse(&buf), Err(CoreError::ParseTruncated { .. })));
    }

    #[test]
    fn legacy_preamble_less_stream_parses_from_offset_zero() {
        let mut buf = Vec::new();
        push_short_element(&mut buf, Tag::TRANSFER_SYNTAX_UID, b"UI", b"1.2.840.10008.1.2.1\0");
        push_short_element(&mut buf, Tag::new(0x0028, 0x0010), b"US", &16u16.to_le_bytes());

        let ds = parse(&buf).unwrap();
        assert_eq!(
            ds.transfer_syntax_uid.as_deref(),
            Some("1.2.840.10008.1.2.1")
        );
    }

    #[test]
    fn transfer_syntax_uids_are_classified_encapsulated_or_native() {
        assert!(is_encapsulated_transfer_syntax("1.2.840.10008.1.2.4.50"));
        assert!(is_encapsulated_transfer_syntax("1.2.840.10008.1.2.4.201"));
        assert!(is_encapsulated_transfer_syntax("1.2.840.10008.1.2.5"));
        assert!(!is_encapsulated_transfer_syntax("1.2.840.10008.1.2.1"));
        assert!(!is_encapsulated_transfer_syntax("1.2.840.10008.1.2"));
    }
}
