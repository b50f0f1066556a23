//! Data-driven measurement tools: tagged variants carrying
//! `requiredPoints`/`calculateMeasurement`/`labelPlacement` rather than a trait
//! hierarchy, the same "tagged variant, no inheritance" shape `decode::HardwareDecoder`
//! and `datasource::DataSource` use for their own capability surfaces.

use crate::image_info::CalibrationData;

use super::measurement::{self, DicomMode, MeasurementResult};
use super::store::{Annotation, AnnotationSource};

/// A measurement tool kind. Each variant knows how many points it needs before it can
/// produce a measurement, how to compute that measurement (mode-aware), and where its
/// label should be anchored in pixel space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToolKind {
    /// Two-point distance; semantics depend on `DicomMode` (B: Euclidean, M: vertical
    /// only, D: velocity difference relative to baseline).
    Distance,
    /// Angle at the middle (vertex) point between rays to the first and third points.
    Angle,
    /// Shoelace-formula polygon area over three or more points.
    Polygon,
}

impl ToolKind {
    /// Minimum points needed before `calculate_measurement` returns a result. `Polygon`
    /// has no fixed upper bound — callers keep collecting points until the user closes
    /// the shape.
    pub fn required_points(self) -> usize {
        match self {
            ToolKind::Distance => 2,
            ToolKind::Angle => 3,
            ToolKind::Polygon => 3,
        }
    }

    pub fn tool_type_name(self) -> &'static str {
        match self {
            ToolKind::Distance => "distance",
            ToolKind::Angle => "angle",
            ToolKind::Polygon => "polygon-area",
        }
    }

    /// Computes the measurement for `points`, or `None` if fewer than
    /// `required_points()` were supplied.
    pub fn calculate_measurement(
        self,
        mode: DicomMode,
        points: &[(i64, i64)],
        calibration: Option<&CalibrationData>,
    ) -> Option<MeasurementResult> {
        if points.len() < self.required_points() {
            return None;
        }
        Some(match self {
            ToolKind::Distance => match mode {
                DicomMode::B => measurement::distance_b_mode(points[0], points[1], calibration),
                DicomMode::M => measurement::distance_m_mode(points[0], points[1], calibration),
                DicomMode::D => measurement::velocity_d_mode(points[0], points[1], calibration),
            },
            ToolKind::Angle => {
                let degrees = measurement::angle_degrees(points[1], points[0], points[2]);
                MeasurementResult {
                    value: degrees,
                    unit: "deg",
                    display: format!("{degrees:.1}\u{b0}"),
                }
            }
            ToolKind::Polygon => measurement::polygon_area(points, calibration),
        })
    }

    /// Where the measurement's label should be anchored, in pixel space.
    pub fn label_placement(self, points: &[(i64, i64)]) -> (i64, i64) {
        match self {
            ToolKind::Distance => midpoint(points[0], points[1]),
            ToolKind::Angle => points[1],
            ToolKind::Polygon => centroid(points),
        }
    }
}

fn midpoint(a: (i64, i64), b: (i64, i64)) -> (i64, i64) {
    ((a.0 + b.0) / 2, (a.1 + b.1) / 2)
}

fn centroid(points: &[(i64, i64)]) -> (i64, i64) {
    let n = points.len().max(1) as i64;
    let (sx, sy) = points
        .iter()
        .fold((0i64, 0i64), |(sx, sy), &(x, y)| (sx + x, sy + y));
    (sx / n, sy / n)
}

/// Builds a fully-populated [`Annotation`] from a tool kind, mode, and pixel points.
/// Returns `None` if `points` hasn't reached `kind.required_points()` yet (the caller is still
/// collecting clicks); the caller decides whether to insert the result via
/// `AnnotationStore::create`, which separately enforces permissions and caps.
pub fn build_annotation(
    id: impl Into<String>,
    image_id: impl Into<String>,
    frame_index: usize,
    kind: ToolKind,
    mode: DicomMode,
    points: Vec<(i64, i64)>,
    calibration: Option<&CalibrationData>,
    source: AnnotationSource,
    now_ms: f64,
) -> Option<Annotation> {
    let measurement = kind.calculate_measurement(mode, &points, calibration)?;
    let label_point = kind.label_placement(&points);
    let mut annotation = Annotation::new(
        id,
        image_id,
        frame_index,
        kind.tool_type_name(),
        mode,
        points,
        source,
        now_ms,
    );
    annotation.measured_value = Some(measurement.value);
    annotation.unit = Some(measurement.unit.to_string());
    annotation.display = Some(measurement.display);
    annotation.label_point = Some(label_point);
    Some(annotation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_tool_needs_two_points() {
        assert_eq!(ToolKind::Distance.required_points(), 2);
        assert!(ToolKind::Distance
            .calculate_measurement(DicomMode::B, &[(0, 0)], None)
            .is_none());
        let result = ToolKind::Distance
            .calculate_measurement(DicomMode::B, &[(0, 0), (3, 4)], None)
            .unwrap();
        assert!((result.value - 5.0).abs() < 1e-9);
    }

    #[test]
    fn angle_tool_reports_vertex_at_middle_point() {
        let points = [(10, 0), (0, 0), (0, 10)];
        let label = ToolKind::Angle.label_placement(&points);
        assert_eq!(label, (0, 0));
        let result = ToolKind::Angle
            .calculate_measurement(DicomMode::B, &points, None)
            .unwrap();
        assert!((result.value - 90.0).abs() < 1e-6);
        assert_eq!(result.unit, "deg");
    }

    #[test]
    fn polygon_tool_labels_at_centroid() {
        let points = [(0, 0), (10, 0), (10, 10), (0, 10)];
        let label = ToolKind::Polygon.label_placement(&points);
        assert_eq!(label, (5, 5));
    }

    #[test]
    fn build_annotation_stamps_measurement_and_label() {
        let annotation = build_annotation(
            "a1",
            "img1",
            0,
            ToolKind::Distance,
            DicomMode::B,
            vec![(0, 0), (6, 8)],
            None,
            AnnotationSource::User,
            0.0,
        )
        .unwrap();
        assert_eq!(annotation.measured_value, Some(10.0));
        assert_eq!(annotation.unit.as_deref(), Some("px"));
        assert_eq!(annotation.label_point, Some((3, 4)));
        assert!(annotation.deletable);
        assert!(annotation.editable);
    }

    #[test]
    fn build_annotation_returns_none_before_enough_points() {
        assert!(build_annotation(
            "a1",
            "img1",
            0,
            ToolKind::Angle,
            DicomMode::B,
            vec![(0, 0), (1, 1)],
            None,
            AnnotationSource::User,
            0.0,
        )
        .is_none());
    }
}
