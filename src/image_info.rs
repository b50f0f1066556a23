//! Image geometry and calibration metadata.

use crate::error::{CoreError, CoreResult};
use crate::parser::Dataset;
use crate::tag::Tag;

pub mod tags {
    use crate::tag::Tag;

    pub const ROWS: Tag = Tag::new(0x0028, 0x0010);
    pub const COLUMNS: Tag = Tag::new(0x0028, 0x0011);
    pub const BITS_ALLOCATED: Tag = Tag::new(0x0028, 0x0100);
    pub const BITS_STORED: Tag = Tag::new(0x0028, 0x0101);
    pub const HIGH_BIT: Tag = Tag::new(0x0028, 0x0102);
    pub const PIXEL_REPRESENTATION: Tag = Tag::new(0x0028, 0x0103);
    pub const PHOTOMETRIC_INTERPRETATION: Tag = Tag::new(0x0028, 0x0004);
    pub const SAMPLES_PER_PIXEL: Tag = Tag::new(0x0028, 0x0002);
    pub const PLANAR_CONFIGURATION: Tag = Tag::new(0x0028, 0x0006);
    pub const PIXEL_SPACING: Tag = Tag::new(0x0028, 0x0030);
    /// Sequence of Ultrasound Regions, (0018,6011); we only read the first item's
    /// physical-delta and unit-code sub-elements, located at fixed relative tags within
    /// the first region item by convention of the producing modality.
    pub const SEQUENCE_OF_ULTRASOUND_REGIONS: Tag = Tag::new(0x0018, 0x6011);
    pub const PHYSICAL_DELTA_X: Tag = Tag::new(0x0018, 0x602C);
    pub const PHYSICAL_DELTA_Y: Tag = Tag::new(0x0018, 0x602E);
    pub const PHYSICAL_UNITS_X_DIRECTION: Tag = Tag::new(0x0018, 0x6024);
    pub const PHYSICAL_UNITS_Y_DIRECTION: Tag = Tag::new(0x0018, 0x6026);
    pub const REFERENCE_PIXEL_PHYSICAL_VALUE_X: Tag = Tag::new(0x0018, 0x6028);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PhotometricInterpretation {
    Monochrome1,
    Monochrome2,
    Rgb,
    YbrFull,
    YbrFull422,
    Other,
}

impl PhotometricInterpretation {
    fn from_str(s: &str) -> Self {
        match s {
            "MONOCHROME1" => PhotometricInterpretation::Monochrome1,
            "MONOCHROME2" => PhotometricInterpretation::Monochrome2,
            "RGB" => PhotometricInterpretation::Rgb,
            "YBR_FULL" => PhotometricInterpretation::YbrFull,
            "YBR_FULL_422" => PhotometricInterpretation::YbrFull422,
            _ => PhotometricInterpretation::Other,
        }
    }
}

/// Physical pixel spacing, row/column, in millimetres as stored on the wire.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelSpacingMm {
    pub row: f64,
    pub column: f64,
}

/// Ultrasound region calibration: physical delta per pixel and axis unit codes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UltrasoundRegionCalibration {
    pub delta_x: f64,
    pub delta_y: f64,
    pub unit_x: UsUnit,
    pub unit_y: UsUnit,
    pub baseline: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UsUnit {
    Cm,
    Seconds,
    CmPerSecond,
    None,
}

impl UsUnit {
    /// Ultrasound-region unit codes, per the DICOM US Region Calibration macro:
    /// 3 = cm, 4 = seconds, 7 = cm/s. Anything else maps to `None`.
    fn from_code(code: i64) -> Self {
        match code {
            3 => UsUnit::Cm,
            4 => UsUnit::Seconds,
            7 => UsUnit::CmPerSecond,
            _ => UsUnit::None,
        }
    }
}

/// rows, columns, bit depth, and photometric metadata.
///
/// Invariant: `rows > 0 && columns > 0 && bits_stored <= bits_allocated && high_bit <
/// bits_allocated`.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageInfo {
    pub rows: u32,
    pub columns: u32,
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub high_bit: u16,
    pub pixel_representation: u16,
    pub photometric_interpretation: PhotometricInterpretation,
    pub samples_per_pixel: u16,
    pub planar_configuration: u16,
    pub pixel_spacing: Option<PixelSpacingMm>,
    pub ultrasound_region: Option<UltrasoundRegionCalibration>,
}

impl ImageInfo {
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_allocated as usize) / 8
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.rows as usize
            * self.columns as usize
            * self.samples_per_pixel as usize
            * self.bytes_per_sample()
    }

    pub fn is_signed(&self) -> bool {
        self.pixel_representation == 1
    }
}

fn parse_decimal_string_list(s: &str) -> Vec<f64> {
    s.split('\\')
        .filter_map(|part| part.trim().parse::<f64>().ok())
        .collect()
}

/// Extracts [`ImageInfo`] from a parsed dataset and its source buffer.
pub fn extract_image_info(buf: &[u8], dataset: &Dataset) -> CoreResult<ImageInfo> {
    let rows = dataset
        .get(tags::ROWS)
        .and_then(|_| dataset.element_bytes(buf, tags::ROWS))
        .and_then(read_u16_le)
        .unwrap_or(0) as u32;
    let columns = dataset
        .get(tags::COLUMNS)
        .and_then(|_| dataset.element_bytes(buf, tags::COLUMNS))
        .and_then(read_u16_le)
        .unwrap_or(0) as u32;

    if rows == 0 || columns == 0 {
        return Err(CoreError::DecodeFailed {
            reason: "dataset is missing Rows/Columns".into(),
        });
    }

    let bits_allocated = dataset
        .element_bytes(buf, tags::BITS_ALLOCATED)
        .and_then(read_u16_le)
        .unwrap_or(8);
    let bits_stored = dataset
        .element_bytes(buf, tags::BITS_STORED)
        .and_then(read_u16_le)
        .unwrap_or(bits_allocated);
    let high_bit = dataset
        .element_bytes(buf, tags::HIGH_BIT)
        .and_then(read_u16_le)
        .unwrap_or(bits_stored.saturating_sub(1));
    let pixel_representation = dataset
        .element_bytes(buf, tags::PIXEL_REPRESENTATION)
        .and_then(read_u16_le)
        .unwrap_or(0);
    let samples_per_pixel = dataset
        .element_bytes(buf, tags::SAMPLES_PER_PIXEL)
        .and_then(read_u16_le)
        .unwrap_or(1);
    let planar_configuration = dataset
        .element_bytes(buf, tags::PLANAR_CONFIGURATION)
        .and_then(read_u16_le)
        .unwrap_or(0);
    let photometric_interpretation = dataset
        .get_string(buf, tags::PHOTOMETRIC_INTERPRETATION)
        .map(|s| PhotometricInterpretation::from_str(&s))
        .unwrap_or(PhotometricInterpretation::Monochrome2);

    let pixel_spacing = dataset
        .get_string(buf, tags::PIXEL_SPACING)
        .map(|s| parse_decimal_string_list(&s))
        .filter(|v| v.len() >= 2)
        .map(|v| PixelSpacingMm {
            row: v[0],
            column: v[1],
        });

    let ultrasound_region = if pixel_spacing.is_none() {
        extract_ultrasound_region(buf, dataset)
    } else {
        None
    };

    if bits_stored > bits_allocated || high_bit >= bits_allocated {
        return Err(CoreError::DecodeFailed {
            reason: "inconsistent bit depth metadata".into(),
        });
    }

    Ok(ImageInfo {
        rows,
        columns,
        bits_allocated,
        bits_stored,
        high_bit,
        pixel_representation,
        photometric_interpretation,
        samples_per_pixel,
        planar_configuration,
        pixel_spacing,
        ultrasound_region,
    })
}

fn extract_ultrasound_region(buf: &[u8], dataset: &Dataset) -> Option<UltrasoundRegionCalibration> {
    dataset.get(tags::SEQUENCE_OF_ULTRASOUND_REGIONS)?;
    let delta_x = dataset.get_string(buf, tags::PHYSICAL_DELTA_X)?.parse().ok()?;
    let delta_y = dataset.get_string(buf, tags::PHYSICAL_DELTA_Y)?.parse().ok()?;
    let unit_x = dataset
        .get_integer_string(buf, tags::PHYSICAL_UNITS_X_DIRECTION)
        .map(UsUnit::from_code)
        .unwrap_or(UsUnit::None);
    let unit_y = dataset
        .get_integer_string(buf, tags::PHYSICAL_UNITS_Y_DIRECTION)
        .map(UsUnit::from_code)
        .unwrap_or(UsUnit::None);
    let baseline = dataset
        .get_string(buf, tags::REFERENCE_PIXEL_PHYSICAL_VALUE_X)
        .and_then(|s| s.parse().ok());

    Some(UltrasoundRegionCalibration {
        delta_x,
        delta_y,
        unit_x,
        unit_y,
        baseline,
    })
}

fn read_u16_le(bytes: &[u8]) -> Option<u16> {
    if bytes.len() < 2 {
        return None;
    }
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Physical delta per pixel along x and y, derived from [`ImageInfo`]: from
/// `PixelSpacing` (mm) divided by 10 to get cm, else from ultrasound-region calibration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationData {
    pub delta_x_cm: f64,
    pub delta_y_cm: f64,
    pub unit_x: UsUnit,
    pub unit_y: UsUnit,
    pub baseline: Option<f64>,
}

impl CalibrationData {
    pub fn from_image_info(info: &ImageInfo) -> Option<CalibrationData> {
        if let Some(ps) = info.pixel_spacing {
            return Some(CalibrationData {
                delta_x_cm: ps.column / 10.0,
                delta_y_cm: ps.row / 10.0,
                unit_x: UsUnit::Cm,
                unit_y: UsUnit::Cm,
                baseline: None,
            });
        }
        let region = info.ultrasound_region?;
        Some(CalibrationData {
            delta_x_cm: region.delta_x,
            delta_y_cm: region.delta_y,
            unit_x: region.unit_x,
            unit_y: region.unit_y,
            baseline: region.baseline,
        })
    }
}
