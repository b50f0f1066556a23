//! Calibrated distance/angle/area measurement. Points are always DICOM pixel
//! coordinates (integers); calibration comes from [`crate::image_info::CalibrationData`].

use crate::image_info::{CalibrationData, UsUnit};

/// The DICOM acquisition mode a measurement was taken against; each has its own
/// distance semantics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DicomMode {
    /// Brightness mode: ordinary 2D spatial measurement.
    B,
    /// Motion mode: only the vertical (time-axis-orthogonal) component matters.
    M,
    /// Doppler mode: velocity differences relative to a calibrated baseline.
    D,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementResult {
    pub value: f64,
    pub unit: &'static str,
    pub display: String,
}

fn cm_or_mm(cm: f64) -> MeasurementResult {
    if cm.abs() < 1.0 {
        let mm = cm * 10.0;
        MeasurementResult {
            value: mm,
            unit: "mm",
            display: format!("{mm:.1} mm"),
        }
    } else {
        MeasurementResult {
            value: cm,
            unit: "cm",
            display: format!("{cm:.1} cm"),
        }
    }
}

fn pixel_distance(dx: f64, dy: f64) -> MeasurementResult {
    let px = (dx * dx + dy * dy).sqrt();
    MeasurementResult {
        value: px,
        unit: "px",
        display: format!("{px:.1} px"),
    }
}

/// Euclidean distance between two pixel points, calibrated when possible: cm preferred,
/// sub-1-cm values reported in mm.
pub fn distance_b_mode(p1: (i64, i64), p2: (i64, i64), calibration: Option<&CalibrationData>) -> MeasurementResult {
    let dx = (p2.0 - p1.0) as f64;
    let dy = (p2.1 - p1.1) as f64;
    match calibration {
        Some(cal) => {
            let x_cm = dx * cal.delta_x_cm;
            let y_cm = dy * cal.delta_y_cm;
            cm_or_mm((x_cm * x_cm + y_cm * y_cm).sqrt())
        }
        None => pixel_distance(dx, dy),
    }
}

/// M-mode distance uses only the vertical component.
pub fn distance_m_mode(p1: (i64, i64), p2: (i64, i64), calibration: Option<&CalibrationData>) -> MeasurementResult {
    let dy = (p2.1 - p1.1) as f64;
    match calibration {
        Some(cal) => cm_or_mm((dy * cal.delta_y_cm).abs()),
        None => pixel_distance(0.0, dy),
    }
}

/// D-mode distance is a velocity difference relative to the calibrated baseline, when the
/// vertical axis is calibrated in cm/s.
pub fn velocity_d_mode(p1: (i64, i64), p2: (i64, i64), calibration: Option<&CalibrationData>) -> MeasurementResult {
    match calibration {
        Some(cal) if cal.unit_y == UsUnit::CmPerSecond => {
            let baseline = cal.baseline.unwrap_or(0.0);
            let v1 = p1.1 as f64 * cal.delta_y_cm + baseline;
            let v2 = p2.1 as f64 * cal.delta_y_cm + baseline;
            let diff = (v2 - v1).abs();
            MeasurementResult {
                value: diff,
                unit: "cm/s",
                display: format!("{diff:.1} cm/s"),
            }
        }
        _ => {
            let dy = (p2.1 - p1.1).abs() as f64;
            MeasurementResult {
                value: dy,
                unit: "px",
                display: format!("{dy:.1} px"),
            }
        }
    }
}

/// Angle at `vertex` between rays to `p1` and `p2`, in degrees to one decimal place.
/// Degenerate (zero-length) vectors yield 0.
pub fn angle_degrees(vertex: (i64, i64), p1: (i64, i64), p2: (i64, i64)) -> f64 {
    let v1 = ((p1.0 - vertex.0) as f64, (p1.1 - vertex.1) as f64);
    let v2 = ((p2.0 - vertex.0) as f64, (p2.1 - vertex.1) as f64);
    let mag1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let mag2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();
    if mag1 == 0.0 || mag2 == 0.0 {
        return 0.0;
    }
    let dot = v1.0 * v2.0 + v1.1 * v2.1;
    let cos_theta = (dot / (mag1 * mag2)).clamp(-1.0, 1.0);
    let degrees = cos_theta.acos().to_degrees();
    (degrees * 10.0).round() / 10.0
}

/// Shoelace-formula polygon area, calibrated to cm² when possible.
pub fn polygon_area(points: &[(i64, i64)], calibration: Option<&CalibrationData>) -> MeasurementResult {
    let n = points.len();
    if n < 3 {
        return MeasurementResult {
            value: 0.0,
            unit: "px2",
            display: "0.0 px\u{b2}".into(),
        };
    }
    let mut twice_area = 0.0;
    for i in 0..n {
        let (x1, y1) = points[i];
        let (x2, y2) = points[(i + 1) % n];
        twice_area += x1 as f64 * y2 as f64 - x2 as f64 * y1 as f64;
    }
    let pixel_area = (twice_area / 2.0).abs();
    match calibration {
        Some(cal) => {
            let cm2 = pixel_area * cal.delta_x_cm * cal.delta_y_cm;
            MeasurementResult {
                value: cm2,
                unit: "cm2",
                display: format!("{cm2:.2} cm\u{b2}"),
            }
        }
        None => MeasurementResult {
            value: pixel_area,
            unit: "px2",
            display: format!("{pixel_area:.1} px\u{b2}"),
        },
    }
}
