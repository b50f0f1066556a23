//! End-to-end coverage of the decode-and-present pipeline: parse a Part-10 buffer,
//! extract pixel data, decode frames, and admit/upload them into the texture cache.

use zosimos::decode::{decode_frame, encode_png_for_tests, DecodeContext, NoHardwareDecoder};
use zosimos::error::CoreError;
use zosimos::image_info::{extract_image_info, tags};
use zosimos::parser::parse;
use zosimos::pixeldata::extract_pixel_data;
use zosimos::tag::Tag;
use zosimos::texture_cache::{NullBackend, TextureCache};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

fn push_short(buf: &mut Vec<u8>, tag: Tag, vr: &[u8; 2], value: &[u8]) {
    buf.extend_from_slice(&tag.group.to_le_bytes());
    buf.extend_from_slice(&tag.element.to_le_bytes());
    buf.extend_from_slice(vr);
    buf.extend_from_slice(&(value.len() as u16).to_le_bytes());
    buf.extend_from_slice(value);
}

fn native_header(rows: u16, cols: u16, bits: u16, spp: u16) -> Vec<u8> {
    let mut buf = vec![0u8; 128];
    buf.extend_from_slice(b"DICM");
    push_short(&mut buf, tags::ROWS, b"US", &rows.to_le_bytes());
    push_short(&mut buf, tags::COLUMNS, b"US", &cols.to_le_bytes());
    push_short(&mut buf, tags::BITS_ALLOCATED, b"US", &bits.to_le_bytes());
    push_short(&mut buf, tags::BITS_STORED, b"US", &bits.to_le_bytes());
    push_short(&mut buf, tags::HIGH_BIT, b"US", &(bits - 1).to_le_bytes());
    push_short(&mut buf, tags::SAMPLES_PER_PIXEL, b"US", &spp.to_le_bytes());
    buf
}

#[test]
fn scenario_1_native_monochrome_single_frame_reaches_the_texture_cache() {
    let mut buf = native_header(4, 4, 8, 1);
    buf.extend_from_slice(&Tag::PIXEL_DATA.group.to_le_bytes());
    buf.extend_from_slice(&Tag::PIXEL_DATA.element.to_le_bytes());
    buf.extend_from_slice(b"OW");
    buf.extend_from_slice(&[0u8, 0u8]);
    let pixels: Vec<u8> = (0u8..16u8).collect();
    buf.extend_from_slice(&(pixels.len() as u32).to_le_bytes());
    buf.extend_from_slice(&pixels);

    let dataset = parse(&buf).unwrap();
    let info = extract_image_info(&buf, &dataset).unwrap();
    let pixel_data = extract_pixel_data(&buf, &dataset, &info).unwrap();
    assert_eq!(pixel_data.frame_count(), 1);

    let hardware = NoHardwareDecoder;
    let ctx = DecodeContext {
        image_info: &info,
        hardware: &hardware,
    };
    let mut raster = decode_frame(pixel_data.frame_bytes(&buf, 0).unwrap(), false, &ctx).unwrap();
    assert_eq!(raster.width, 4);
    assert_eq!(raster.height, 4);

    let mut cache = TextureCache::new(NullBackend::default(), Some(64 * 1024 * 1024));
    let key = cache.admit(4, 4, 1, 4).unwrap();
    cache.upload_layer(key, 0, &raster.rgba).unwrap();
    assert_eq!(cache.dimensions(key), Some((4, 4, 1)));
    raster.close();
}

#[test]
fn scenario_2_native_multi_frame_uploads_each_frame_to_its_own_layer() {
    let n_frames = 3usize;
    let mut pixels = vec![0u8; 16 * n_frames];
    for k in 0..n_frames {
        pixels[k * 16] = (16 * k) as u8;
    }

    let mut buf = native_header(4, 4, 8, 1);
    push_short(&mut buf, Tag::NUMBER_OF_FRAMES, b"IS", b"3 ");
    buf.extend_from_slice(&Tag::PIXEL_DATA.group.to_le_bytes());
    buf.extend_from_slice(&Tag::PIXEL_DATA.element.to_le_bytes());
    buf.extend_from_slice(b"OW");
    buf.extend_from_slice(&[0u8, 0u8]);
    buf.extend_from_slice(&(pixels.len() as u32).to_le_bytes());
    buf.extend_from_slice(&pixels);

    let dataset = parse(&buf).unwrap();
    let info = extract_image_info(&buf, &dataset).unwrap();
    let pixel_data = extract_pixel_data(&buf, &dataset, &info).unwrap();
    assert_eq!(pixel_data.frame_count(), n_frames);

    let hardware = NoHardwareDecoder;
    let ctx = DecodeContext {
        image_info: &info,
        hardware: &hardware,
    };

    let mut cache = TextureCache::new(NullBackend::default(), None);
    let key = cache.admit(4, 4, n_frames as u32, 4).unwrap();
    for k in 0..n_frames {
        let mut raster = decode_frame(pixel_data.frame_bytes(&buf, k).unwrap(), false, &ctx).unwrap();
        cache.upload_layer(key, k as u32, &raster.rgba).unwrap();
        raster.close();
    }
    assert_eq!(cache.dimensions(key), Some((4, 4, 3)));
}

#[test]
fn encapsulated_frames_decode_through_the_software_fallback_and_upload() {
    let frame_count = 4usize;
    let mut pngs = Vec::with_capacity(frame_count);
    for k in 0..frame_count {
        let shade = (k * 50) as u8;
        pngs.push(encode_png_for_tests(2, 2, &[shade; 2 * 2 * 4]));
    }

    let mut buf = vec![0u8; 128];
    buf.extend_from_slice(b"DICM");
    push_short(
        &mut buf,
        Tag::TRANSFER_SYNTAX_UID,
        b"UI",
        b"1.2.840.10008.1.2.4.50\0",
    );
    push_short(&mut buf, tags::ROWS, b"US", &2u16.to_le_bytes());
    push_short(&mut buf, tags::COLUMNS, b"US", &2u16.to_le_bytes());
    push_short(&mut buf, tags::BITS_ALLOCATED, b"US", &8u16.to_le_bytes());
    push_short(&mut buf, tags::BITS_STORED, b"US", &8u16.to_le_bytes());
    push_short(&mut buf, tags::HIGH_BIT, b"US", &7u16.to_le_bytes());
    push_short(&mut buf, tags::SAMPLES_PER_PIXEL, b"US", &1u16.to_le_bytes());

    buf.extend_from_slice(&Tag::PIXEL_DATA.group.to_le_bytes());
    buf.extend_from_slice(&Tag::PIXEL_DATA.element.to_le_bytes());
    buf.extend_from_slice(b"OB");
    buf.extend_from_slice(&[0u8, 0u8]);
    buf.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

    // Basic Offset Table, skipped regardless of content.
    buf.extend_from_slice(&Tag::ITEM.group.to_le_bytes());
    buf.extend_from_slice(&Tag::ITEM.element.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());

    for png in &pngs {
        buf.extend_from_slice(&Tag::ITEM.group.to_le_bytes());
        buf.extend_from_slice(&Tag::ITEM.element.to_le_bytes());
        buf.extend_from_slice(&(png.len() as u32).to_le_bytes());
        buf.extend_from_slice(png);
    }
    buf.extend_from_slice(&Tag::SEQUENCE_DELIMITATION.group.to_le_bytes());
    buf.extend_from_slice(&Tag::SEQUENCE_DELIMITATION.element.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());

    let dataset = parse(&buf).unwrap();
    assert!(dataset.is_encapsulated());
    let info = extract_image_info(&buf, &dataset).unwrap();
    let pixel_data = extract_pixel_data(&buf, &dataset, &info).unwrap();
    assert_eq!(pixel_data.frame_count(), frame_count);

    let hardware = NoHardwareDecoder;
    let ctx = DecodeContext {
        image_info: &info,
        hardware: &hardware,
    };
    let mut cache = TextureCache::new(NullBackend::default(), None);
    let key = cache.admit(2, 2, frame_count as u32, 4).unwrap();
    for k in 0..frame_count {
        let mut raster = decode_frame(pixel_data.frame_bytes(&buf, k).unwrap(), true, &ctx).unwrap();
        assert_eq!(raster.width, 2);
        assert_eq!(raster.height, 2);
        cache.upload_layer(key, k as u32, &raster.rgba).unwrap();
        raster.close();
    }
}

#[test]
fn missing_pixel_data_is_reported_through_the_whole_pipeline() {
    let mut buf = vec![0u8; 128];
    buf.extend_from_slice(b"DICM");
    push_short(&mut buf, tags::ROWS, b"US", &4u16.to_le_bytes());
    push_short(&mut buf, tags::COLUMNS, b"US", &4u16.to_le_bytes());
    push_short(&mut buf, tags::BITS_ALLOCATED, b"US", &8u16.to_le_bytes());
    push_short(&mut buf, tags::BITS_STORED, b"US", &8u16.to_le_bytes());
    push_short(&mut buf, tags::HIGH_BIT, b"US", &7u16.to_le_bytes());
    push_short(&mut buf, tags::SAMPLES_PER_PIXEL, b"US", &1u16.to_le_bytes());

    let dataset = parse(&buf).unwrap();
    let info = extract_image_info(&buf, &dataset).unwrap();
    assert!(matches!(
        extract_pixel_data(&buf, &dataset, &info),
        Err(CoreError::PixelDataMissing)
    ));
}

#[test]
fn local_data_source_round_trips_the_same_pipeline() {
    use zosimos::datasource::local::LocalDataSource;
    use zosimos::datasource::{DataSource, LoadOptions};

    let mut buf = native_header(4, 4, 8, 1);
    buf.extend_from_slice(&Tag::PIXEL_DATA.group.to_le_bytes());
    buf.extend_from_slice(&Tag::PIXEL_DATA.element.to_le_bytes());
    buf.extend_from_slice(b"OW");
    buf.extend_from_slice(&[0u8, 0u8]);
    let pixels: Vec<u8> = (0u8..16u8).collect();
    buf.extend_from_slice(&(pixels.len() as u32).to_le_bytes());
    buf.extend_from_slice(&pixels);

    let mut source = LocalDataSource::new(10);
    source.insert_buffer("uid1", buf);
    let opts = LoadOptions::default();
    let metadata = source.load_metadata("uid1", &opts).unwrap();
    assert_eq!(metadata.frame_count, 1);
    assert!(!metadata.is_encapsulated);

    let frame = source.load_frame("uid1", 1, &opts).unwrap();
    assert_eq!(frame, pixels);
}

#[test]
fn decoded_raster_content_is_deterministic_across_repeated_decodes() {
    init_logging();

    let mut buf = native_header(4, 4, 8, 1);
    buf.extend_from_slice(&Tag::PIXEL_DATA.group.to_le_bytes());
    buf.extend_from_slice(&Tag::PIXEL_DATA.element.to_le_bytes());
    buf.extend_from_slice(b"OW");
    buf.extend_from_slice(&[0u8, 0u8]);
    let pixels: Vec<u8> = (0u8..16u8).collect();
    buf.extend_from_slice(&(pixels.len() as u32).to_le_bytes());
    buf.extend_from_slice(&pixels);

    let dataset = parse(&buf).unwrap();
    let info = extract_image_info(&buf, &dataset).unwrap();
    let pixel_data = extract_pixel_data(&buf, &dataset, &info).unwrap();
    let hardware = NoHardwareDecoder;
    let ctx = DecodeContext {
        image_info: &info,
        hardware: &hardware,
    };

    let frame_bytes = pixel_data.frame_bytes(&buf, 0).unwrap();
    let mut first = decode_frame(frame_bytes, false, &ctx).unwrap();
    let mut second = decode_frame(frame_bytes, false, &ctx).unwrap();

    assert_eq!(crc32(&first.rgba), crc32(&second.rgba));
    first.close();
    second.close();
}
