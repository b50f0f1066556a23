//! Local buffer data source: holds a map `sopInstanceUid -> source buffer`,
//! parses lazily and caches per UID, and caches frames under `uid:frameNumber`.

use std::collections::HashMap;

use crate::datasource::{DataSource, LoadOptions, LruCache, Metadata};
use crate::error::{CoreError, CoreResult};
use crate::image_info::{extract_image_info, CalibrationData};
use crate::parser::{parse, Dataset};
use crate::pixeldata::{extract_pixel_data, PixelDataInfo};

struct Parsed {
    dataset: Dataset,
    metadata: Metadata,
    pixel_data: PixelDataInfo,
}

pub struct LocalDataSource {
    buffers: HashMap<String, Vec<u8>>,
    parsed: LruCache<String, Parsed>,
    frame_cache: LruCache<String, Vec<u8>>,
}

impl LocalDataSource {
    pub fn new(frame_cache_size: usize) -> Self {
        LocalDataSource {
            buffers: HashMap::new(),
            parsed: LruCache::new(50),
            frame_cache: LruCache::new(frame_cache_size),
        }
    }

    pub fn insert_buffer(&mut self, sop_instance_uid: impl Into<String>, buffer: Vec<u8>) {
        self.buffers.insert(sop_instance_uid.into(), buffer);
    }

    fn ensure_parsed(&mut self, instance_id: &str) -> CoreResult<()> {
        if self.parsed.contains(&instance_id.to_string()) {
            self.parsed.get(&instance_id.to_string());
            return Ok(());
        }
        let buf = self
            .buffers
            .get(instance_id)
            .ok_or(CoreError::NotDicom)?
            .clone();
        let dataset = parse(&buf)?;
        let image_info = extract_image_info(&buf, &dataset)?;
        let pixel_data = extract_pixel_data(&buf, &dataset, &image_info)?;
        let calibration = CalibrationData::from_image_info(&image_info);
        let metadata = Metadata {
            frame_count: pixel_data.frame_count(),
            is_encapsulated: dataset.is_encapsulated(),
            transfer_syntax: dataset.transfer_syntax_uid.clone(),
            image_info,
            calibration,
        };

        self.parsed.put(
            instance_id.to_string(),
            Parsed {
                dataset,
                metadata,
                pixel_data,
            },
        );
        Ok(())
    }
}

impl DataSource for LocalDataSource {
    fn load_metadata(&mut self, instance_id: &str, _opts: &LoadOptions) -> CoreResult<Metadata> {
        self.ensure_parsed(instance_id)?;
        Ok(self.parsed.get(&instance_id.to_string()).unwrap().metadata.clone())
    }

    fn load_frame(&mut self, instance_id: &str, frame_number: u32, opts: &LoadOptions) -> CoreResult<Vec<u8>> {
        self.ensure_parsed(instance_id)?;
        let frame_count = self.parsed.get(&instance_id.to_string()).unwrap().pixel_data.frame_count();
        if frame_number < 1 || frame_number as usize > frame_count {
            return Err(CoreError::FrameOutOfRange {
                requested: frame_number as i64,
                frame_count,
            });
        }

        let cache_key = format!("{instance_id}:{frame_number}");
        if !opts.bypass_cache {
            if let Some(cached) = self.frame_cache.get(&cache_key) {
                return Ok(cached.clone());
            }
        }

        let buf = self.buffers.get(instance_id).ok_or(CoreError::NotDicom)?;
        let bytes = self
            .parsed
            .get(&instance_id.to_string())
            .unwrap()
            .pixel_data
            .frame_bytes(buf, frame_number as usize - 1)
            .ok_or(CoreError::FrameOutOfRange {
                requested: frame_number as i64,
                frame_count,
            })?
            .to_vec();

        self.frame_cache.put(cache_key, bytes.clone());
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_buffer() -> Vec<u8> {
        let mut buf = vec![0u8; 128];
        buf.extend_from_slice(b"DICM");
        let push_short = |buf: &mut Vec<u8>, tag: crate::tag::Tag, vr: &[u8; 2], value: &[u8]| {
            buf.extend_from_slice(&tag.group.to_le_bytes());
            buf.extend_from_slice(&tag.element.to_le_bytes());
            buf.extend_from_slice(vr);
            buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
            buf.extend_from_slice(value);
        };
        use crate::image_info::tags;
        push_short(&mut buf, tags::ROWS, b"US", &8u16.to_le_bytes());
        push_short(&mut buf, tags::COLUMNS, b"US", &8u16.to_le_bytes());
        push_short(&mut buf, tags::BITS_ALLOCATED, b"US", &8u16.to_le_bytes());
        push_short(&mut buf, tags::BITS_STORED, b"US", &8u16.to_le_bytes());
        push_short(&mut buf, tags::HIGH_BIT, b"US", &7u16.to_le_bytes());
        push_short(&mut buf, tags::SAMPLES_PER_PIXEL, b"US", &1u16.to_le_bytes());

        buf.extend_from_slice(&crate::tag::Tag::PIXEL_DATA.group.to_le_bytes());
        buf.extend_from_slice(&crate::tag::Tag::PIXEL_DATA.element.to_le_bytes());
        buf.extend_from_slice(b"OW");
        buf.extend_from_slice(&[0u8, 0u8]);
        let pixels: Vec<u8> = (0u8..64u8).collect();
        buf.extend_from_slice(&(pixels.len() as u32).to_le_bytes());
        buf.extend_from_slice(&pixels);
        buf
    }

    #[test]
    fn scenario_1_native_monochrome_single_frame() {
        let mut source = LocalDataSource::new(100);
        source.insert_buffer("uid1", sample_buffer());
        let opts = LoadOptions::default();
        let metadata = source.load_metadata("uid1", &opts).unwrap();
        assert_eq!(metadata.frame_count, 1);
        let frame = source.load_frame("uid1", 1, &opts).unwrap();
        assert_eq!(frame.len(), 64);
        assert_eq!(frame[0], 0);
        assert_eq!(frame[63], 63);
    }

    #[test]
    fn out_of_range_frame_number_fails() {
        let mut source = LocalDataSource::new(100);
        source.insert_buffer("uid1", sample_buffer());
        let opts = LoadOptions::default();
        assert!(matches!(
            source.load_frame("uid1", 0, &opts),
            Err(CoreError::FrameOutOfRange { .. })
        ));
        assert!(matches!(
            source.load_frame("uid1", 2, &opts),
            Err(CoreError::FrameOutOfRange { .. })
        ));
    }

    #[test]
    fn frames_are_cached_under_uid_colon_frame_number() {
        let mut source = LocalDataSource::new(100);
        source.insert_buffer("uid1", sample_buffer());
        let opts = LoadOptions::default();
        let first = source.load_frame("uid1", 1, &opts).unwrap();
        assert!(source.frame_cache.contains(&"uid1:1".to_string()));
        let second = source.load_frame("uid1", 1, &opts).unwrap();
        assert_eq!(first, second);
    }
}
