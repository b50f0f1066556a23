//! Viewport manager: grid layout, per-viewport bounds, series binding,
//! playback state, window/level, and transform.

use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    pub struct ViewportId;
}

/// Integer pixel rectangle within the drawing surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Bounds {
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }
}

/// Identifies a bound series; immutable geometry needed by playback/sync.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeriesRef {
    pub series_id: String,
    pub frame_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowLevel {
    /// Normalized to [0, 1].
    pub center: f32,
    pub width: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub pan_x: f32,
    pub pan_y: f32,
    pub zoom: f32,
    pub rotation_deg: f32,
    pub flip_h: bool,
    pub flip_v: bool,
}

impl Default for Transform {
    fn default() -> Self {
        Transform {
            pan_x: 0.0,
            pan_y: 0.0,
            zoom: 1.0,
            rotation_deg: 0.0,
            flip_h: false,
            flip_v: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackState {
    pub current_frame: usize,
    pub playing: bool,
    pub fps: u32,
    pub last_frame_time_ms: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        PlaybackState {
            current_frame: 0,
            playing: false,
            fps: 30,
            last_frame_time_ms: 0.0,
        }
    }
}

pub struct Viewport {
    pub bounds: Bounds,
    pub series: Option<SeriesRef>,
    pub playback: PlaybackState,
    pub window_level: Option<WindowLevel>,
    pub transform: Transform,
    pub texture_unit: u32,
    pub active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    Grid { rows: u32, cols: u32 },
    Custom { rows: u32, cols: u32 },
}

impl Layout {
    fn dims(self) -> (u32, u32) {
        match self {
            Layout::Grid { rows, cols } => (rows, cols),
            Layout::Custom { rows, cols } => (rows, cols),
        }
    }
}

const MAX_TEXTURE_UNITS: u32 = 32;
const MIN_FPS: u32 = 1;
const MAX_FPS: u32 = 60;

/// Owns the set of viewports for one drawing surface and the grid layout that
/// partitions it.
pub struct ViewportManager {
    viewports: SlotMap<ViewportId, Viewport>,
    /// Row-major order of ids as created by `set_layout`, preserved across
    /// `update_canvas_size`, which reapplies the current layout in place without
    /// losing viewport identity.
    order: Vec<ViewportId>,
    layout: Layout,
    gap: i32,
    surface_width: i32,
    surface_height: i32,
    next_texture_unit: u32,
}

impl ViewportManager {
    pub fn new(surface_width: i32, surface_height: i32) -> Self {
        let mut manager = ViewportManager {
            viewports: SlotMap::with_key(),
            order: Vec::new(),
            layout: Layout::Grid { rows: 1, cols: 1 },
            gap: 2,
            surface_width,
            surface_height,
            next_texture_unit: 0,
        };
        manager.set_layout(Layout::Grid { rows: 1, cols: 1 }, 2);
        manager
    }

    pub fn viewport(&self, id: ViewportId) -> Option<&Viewport> {
        self.viewports.get(id)
    }

    pub fn viewport_mut(&mut self, id: ViewportId) -> Option<&mut Viewport> {
        self.viewports.get_mut(id)
    }

    /// Ids in manager (row-major) order, the order the render scheduler iterates.
    pub fn order(&self) -> &[ViewportId] {
        &self.order
    }

    /// Clears all existing viewports and recreates them in row-major order.
    pub fn set_layout(&mut self, layout: Layout, gap: i32) {
        self.viewports.clear();
        self.order.clear();
        self.next_texture_unit = 0;
        self.layout = layout;
        self.gap = gap;
        self.recreate();
    }

    /// Reapplies the current layout in place after a surface resize, preserving
    /// viewport identity by reindexing existing ids onto the new bounds rather than
    /// recreating them, so bound series/playback state survives a resize.
    pub fn update_canvas_size(&mut self, width: i32, height: i32) {
        self.surface_width = width;
        self.surface_height = height;
        let bounds = self.compute_bounds();
        for (id, bounds) in self.order.clone().into_iter().zip(bounds.into_iter()) {
            if let Some(vp) = self.viewports.get_mut(id) {
                vp.bounds = bounds;
            }
        }
    }

    fn recreate(&mut self) {
        let bounds = self.compute_bounds();
        for b in bounds {
            let unit = self.next_texture_unit;
            self.next_texture_unit = (self.next_texture_unit + 1).min(MAX_TEXTURE_UNITS);
            let id = self.viewports.insert(Viewport {
                bounds: b,
                series: None,
                playback: PlaybackState::default(),
                window_level: None,
                transform: Transform::default(),
                texture_unit: unit.min(MAX_TEXTURE_UNITS - 1),
                active: true,
            });
            self.order.push(id);
        }
    }

    /// `cellW = floor((surfaceW - gap*(cols-1)) / cols)`, `cellH` likewise; row 0 is the
    /// top row on screen but the drawing surface uses bottom-left origin, hence the Y
    /// inversion.
    fn compute_bounds(&self) -> Vec<Bounds> {
        let (rows, cols) = self.layout.dims();
        if rows == 0 || cols == 0 {
            return Vec::new();
        }
        let gap = self.gap;
        let cell_w = (self.surface_width - gap * (cols as i32 - 1)) / cols as i32;
        let cell_h = (self.surface_height - gap * (rows as i32 - 1)) / rows as i32;

        let mut out = Vec::with_capacity((rows * cols) as usize);
        for r in 0..rows as i32 {
            for c in 0..cols as i32 {
                let x = c * (cell_w + gap);
                let y = (rows as i32 - 1 - r) * (cell_h + gap);
                out.push(Bounds {
                    x,
                    y,
                    width: cell_w,
                    height: cell_h,
                });
            }
        }
        out
    }

    /// Returns the first viewport whose bounds contain `(x, y)`, or `None`.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<ViewportId> {
        self.order
            .iter()
            .copied()
            .find(|id| self.viewports[*id].bounds.contains(x, y))
    }

    /// Binds a series to a viewport, resetting its current frame to 0.
    pub fn set_viewport_series(&mut self, id: ViewportId, series: Option<SeriesRef>) {
        if let Some(vp) = self.viewports.get_mut(id) {
            vp.series = series;
            vp.playback.current_frame = 0;
        }
    }

    pub fn set_viewport_window_level(&mut self, id: ViewportId, wl: WindowLevel) {
        if let Some(vp) = self.viewports.get_mut(id) {
            vp.window_level = Some(wl);
        }
    }

    /// Clamps to `[0, frameCount)`.
    pub fn set_viewport_frame(&mut self, id: ViewportId, frame: i64) {
        if let Some(vp) = self.viewports.get_mut(id) {
            let count = vp.series.as_ref().map(|s| s.frame_count).unwrap_or(1);
            let max = count.saturating_sub(1) as i64;
            vp.playback.current_frame = frame.clamp(0, max.max(0)) as usize;
        }
    }

    /// Transitioning from paused to playing un-seeds `last_frame_time_ms` so the
    /// scheduler's next tick seeds it to `now` instead of computing an elapsed time
    /// against a stale clock.
    pub fn set_viewport_playing(&mut self, id: ViewportId, playing: bool) {
        if let Some(vp) = self.viewports.get_mut(id) {
            if playing && !vp.playback.playing {
                vp.playback.last_frame_time_ms = 0.0;
            }
            vp.playback.playing = playing;
        }
    }

    /// Clamps to `[1, 60]`.
    pub fn set_viewport_fps(&mut self, id: ViewportId, fps: i64) {
        if let Some(vp) = self.viewports.get_mut(id) {
            vp.playback.fps = fps.clamp(MIN_FPS as i64, MAX_FPS as i64) as u32;
        }
    }

    pub fn set_viewport_active(&mut self, id: ViewportId, active: bool) {
        if let Some(vp) = self.viewports.get_mut(id) {
            vp.active = active;
        }
    }

    pub fn viewports_and_ids(&self) -> impl Iterator<Item = (ViewportId, &Viewport)> {
        self.order.iter().map(move |id| (*id, &self.viewports[*id]))
    }
}
