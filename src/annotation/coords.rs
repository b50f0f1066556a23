//! Canvas <-> DICOM pixel coordinate transform: pan/zoom/rotate/flip applied
//! uniformly so a viewport's visual state and its stored annotations agree on where a
//! point lives.

/// Pan, zoom, rotation and flip state of one viewport, plus the image/canvas
/// dimensions needed to compute the base (fit-to-canvas) scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewportTransform {
    pub image_w: f64,
    pub image_h: f64,
    pub canvas_w: f64,
    pub canvas_h: f64,
    pub zoom: f64,
    pub pan_x: f64,
    pub pan_y: f64,
    /// Degrees, clockwise on screen.
    pub rotation_deg: f64,
    pub flip_h: bool,
    pub flip_v: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasPoint {
    pub x: f64,
    pub y: f64,
}

impl ViewportTransform {
    fn base_scale(&self) -> f64 {
        (self.canvas_w / self.image_w).min(self.canvas_h / self.image_h)
    }

    fn final_scale(&self) -> f64 {
        self.base_scale() * self.zoom
    }

    /// Pixel -> canvas, per the forward transform contract.
    pub fn pixel_to_canvas(&self, p: PixelPoint) -> CanvasPoint {
        let mut x = p.x - self.image_w / 2.0;
        let mut y = p.y - self.image_h / 2.0;
        if self.flip_h {
            x = -x;
        }
        if self.flip_v {
            y = -y;
        }
        let scale = self.final_scale();
        x *= scale;
        y *= scale;

        let theta = self.rotation_deg.to_radians();
        let (sin, cos) = theta.sin_cos();
        let rx = x * cos - y * sin;
        let ry = x * sin + y * cos;

        CanvasPoint {
            x: rx + self.canvas_w / 2.0 + self.pan_x,
            y: ry + self.canvas_h / 2.0 + self.pan_y,
        }
    }

    /// Canvas -> pixel, the exact inverse of [`Self::pixel_to_canvas`]. The result is left
    /// as floating point; callers that need a stored point round to nearest.
    pub fn canvas_to_pixel(&self, p: CanvasPoint) -> PixelPoint {
        let x = p.x - self.canvas_w / 2.0 - self.pan_x;
        let y = p.y - self.canvas_h / 2.0 - self.pan_y;

        let theta = (-self.rotation_deg).to_radians();
        let (sin, cos) = theta.sin_cos();
        let rx = x * cos - y * sin;
        let ry = x * sin + y * cos;

        let scale = self.final_scale();
        let mut x = rx / scale;
        let mut y = ry / scale;
        if self.flip_v {
            y = -y;
        }
        if self.flip_h {
            x = -x;
        }

        PixelPoint {
            x: x + self.image_w / 2.0,
            y: y + self.image_h / 2.0,
        }
    }

    /// Canvas -> pixel, rounded to the nearest integer pixel coordinate (the form stored
    /// on an [`crate::annotation::store::Annotation`]).
    pub fn canvas_to_pixel_rounded(&self, p: CanvasPoint) -> (i64, i64) {
        let pixel = self.canvas_to_pixel(p);
        (pixel.x.round() as i64, pixel.y.round() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transform() -> ViewportTransform {
        ViewportTransform {
            image_w: 512.0,
            image_h: 512.0,
            canvas_w: 800.0,
            canvas_h: 600.0,
            zoom: 1.5,
            pan_x: 12.0,
            pan_y: -7.0,
            rotation_deg: 37.0,
            flip_h: true,
            flip_v: false,
        }
    }

    #[test]
    fn round_trips_through_canvas_and_back() {
        let transform = sample_transform();
        let original = PixelPoint { x: 123.0, y: 456.0 };
        let canvas = transform.pixel_to_canvas(original);
        let back = transform.canvas_to_pixel(canvas);
        assert!((back.x - original.x).abs() < 1e-6);
        assert!((back.y - original.y).abs() < 1e-6);
    }

    #[test]
    fn round_trips_across_pan_zoom_rotation_and_flip_combinations() {
        let pans = [(-50.0, 0.0), (0.0, 0.0), (30.0, 40.0)];
        let zooms = [0.1, 1.0, 10.0];
        let rotations = [0.0, 45.0, 180.0, 359.0];
        for &(pan_x, pan_y) in &pans {
            for &zoom in &zooms {
                for &rotation_deg in &rotations {
                    for flip_h in [false, true] {
                        for flip_v in [false, true] {
                            let transform = ViewportTransform {
                                image_w: 256.0,
                                image_h: 256.0,
                                canvas_w: 1024.0,
                                canvas_h: 768.0,
                                zoom,
                                pan_x,
                                pan_y,
                                rotation_deg,
                                flip_h,
                                flip_v,
                            };
                            let original = PixelPoint { x: 200.0, y: 10.0 };
                            let canvas = transform.pixel_to_canvas(original);
                            let (rx, ry) = transform.canvas_to_pixel_rounded(canvas);
                            assert!((rx as f64 - original.x).abs() <= 1.0);
                            assert!((ry as f64 - original.y).abs() <= 1.0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn no_zoom_no_pan_no_rotation_centers_the_image() {
        let transform = ViewportTransform {
            image_w: 100.0,
            image_h: 100.0,
            canvas_w: 200.0,
            canvas_h: 200.0,
            zoom: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
            rotation_deg: 0.0,
            flip_h: false,
            flip_v: false,
        };
        let center = transform.pixel_to_canvas(PixelPoint { x: 50.0, y: 50.0 });
        assert!((center.x - 100.0).abs() < 1e-9);
        assert!((center.y - 100.0).abs() < 1e-9);
    }
}
