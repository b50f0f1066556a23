//! Render scheduler: a single refresh-driven loop that advances per-viewport
//! playback clocks, clips to viewport bounds, and invokes a caller-supplied draw
//! callback once per active viewport per tick.

use std::collections::HashMap;
use std::time::Instant;

use crate::sync::SyncEngine;
use crate::viewport::{Bounds, ViewportId, ViewportManager};

/// Telemetry surface sampled at >= 2 Hz.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Telemetry {
    pub fps: f64,
    pub frame_time_ms: f64,
    pub rendered_viewports: u32,
    pub total_frames: u64,
    pub dropped_frames: u64,
    pub vram_bytes: u64,
}

/// What the scheduler asks the caller to do for one viewport this tick.
pub enum DrawInstruction {
    /// No series bound: clip to bounds and clear to a dim background.
    ClearBackground { bounds: Bounds },
    /// Sample `frame_index` of the bound series' array texture inside `bounds`.
    Render {
        viewport_id: ViewportId,
        frame_index: usize,
        bounds: Bounds,
    },
}

/// Invoked once per active viewport per tick with `(viewport_id, frame_index, bounds)`
/// whenever a series is bound; render callbacks must not suspend.
pub trait RenderCallback {
    fn draw(&mut self, instruction: DrawInstruction);
    /// Fired for the master and every slave whose frame actually changed this tick, in
    /// the same order as the draws that produced them.
    fn frame_updated(&mut self, viewport_id: ViewportId, new_frame: usize) {
        let _ = (viewport_id, new_frame);
    }
}

pub struct Scheduler {
    running: bool,
    telemetry: Telemetry,
    frame_times_ms: Vec<f64>,
    rolling_window_ms: f64,
    frame_budget_ms: f64,
}

impl Scheduler {
    pub fn new(target_refresh_hz: f64) -> Self {
        Scheduler {
            running: false,
            telemetry: Telemetry::default(),
            frame_times_ms: Vec::new(),
            rolling_window_ms: 1000.0,
            frame_budget_ms: 1000.0 / target_refresh_hz,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Idempotent: starting an already-running loop is a no-op.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Immediate and idempotent. Zeroes every viewport's `last_frame_time_ms` so a
    /// subsequent play resumes cleanly without a jump.
    pub fn stop(&mut self, viewports: &mut ViewportManager) {
        self.running = false;
        let ids: Vec<ViewportId> = viewports.order().to_vec();
        for id in ids {
            if let Some(vp) = viewports.viewport_mut(id) {
                vp.playback.last_frame_time_ms = 0.0;
            }
        }
    }

    pub fn telemetry(&self) -> Telemetry {
        self.telemetry
    }

    /// Runs exactly one tick regardless of `running` (used for `renderSingleFrame` and
    /// internally by the driven loop).
    ///
    /// `now_ms` only drives each viewport's playback clock (how many frame periods have
    /// elapsed since it was last advanced); the telemetry frame time is measured
    /// separately from the wall-clock duration of this call's own render work, so it
    /// stays meaningful regardless of what `now_ms` the caller passes in.
    pub fn tick(
        &mut self,
        now_ms: f64,
        viewports: &mut ViewportManager,
        sync: &SyncEngine,
        vram_bytes: u64,
        callback: &mut dyn RenderCallback,
    ) {
        let work_start = Instant::now();
        let mut rendered = 0u32;

        let ids: Vec<ViewportId> = viewports.order().to_vec();
        let mut frame_counts: HashMap<ViewportId, usize> = HashMap::new();
        for id in &ids {
            if let Some(vp) = viewports.viewport(*id) {
                if let Some(series) = &vp.series {
                    frame_counts.insert(*id, series.frame_count);
                }
            }
        }

        for id in &ids {
            let Some(vp) = viewports.viewport(*id) else {
                continue;
            };
            if !vp.active {
                continue;
            }

            let Some(series) = vp.series.clone() else {
                let bounds = vp.bounds;
                callback.draw(DrawInstruction::ClearBackground { bounds });
                continue;
            };

            let mut advanced = false;
            if vp.playback.playing {
                if vp.playback.last_frame_time_ms == 0.0 {
                    // Un-seeded: play just started (or stop() reset the clock). Seed to
                    // `now` without advancing so the next tick measures a real elapsed
                    // period instead of jumping by however long it's been since 0.
                    let vp_mut = viewports.viewport_mut(*id).unwrap();
                    vp_mut.playback.last_frame_time_ms = now_ms;
                } else {
                    let frame_period_ms = 1000.0 / vp.playback.fps as f64;
                    let elapsed = now_ms - vp.playback.last_frame_time_ms;
                    if elapsed >= frame_period_ms {
                        let vp_mut = viewports.viewport_mut(*id).unwrap();
                        let steps = (elapsed / frame_period_ms).floor().max(1.0) as usize;
                        vp_mut.playback.current_frame =
                            (vp_mut.playback.current_frame + steps) % series.frame_count.max(1);
                        // Resist drift: subtract the consumed whole periods rather than
                        // resetting to `now`.
                        let consumed = frame_period_ms * steps as f64;
                        vp_mut.playback.last_frame_time_ms += consumed;
                        advanced = true;
                    }
                }
            }

            let (current_frame, fps_snapshot) = {
                let vp = viewports.viewport(*id).unwrap();
                (vp.playback.current_frame, vp.playback.fps)
            };
            let _ = fps_snapshot;

            if advanced {
                callback.frame_updated(*id, current_frame);
                if let Some(updates) = sync.sync_from_master(*id, current_frame, series.frame_count, &frame_counts) {
                    for (slave_id, new_index) in updates {
                        if let Some(slave_vp) = viewports.viewport_mut(slave_id) {
                            if slave_vp.playback.current_frame != new_index {
                                slave_vp.playback.current_frame = new_index;
                                callback.frame_updated(slave_id, new_index);
                            }
                        }
                    }
                }
            }

            let vp = viewports.viewport(*id).unwrap();
            let bounds = vp.bounds;
            let frame_index = vp.playback.current_frame;
            callback.draw(DrawInstruction::Render {
                viewport_id: *id,
                frame_index,
                bounds,
            });
            rendered += 1;
        }

        let frame_time_ms = work_start.elapsed().as_secs_f64() * 1000.0;
        self.frame_times_ms.push(frame_time_ms);
        // Keep only samples within the rolling window for the fps estimate.
        while self.frame_times_ms.len() > 1
            && self.frame_times_ms.iter().sum::<f64>() > self.rolling_window_ms
        {
            self.frame_times_ms.remove(0);
        }
        let fps = if frame_time_ms > 0.0 {
            1000.0 / frame_time_ms
        } else {
            self.telemetry.fps
        };

        self.telemetry.fps = fps;
        self.telemetry.frame_time_ms = frame_time_ms;
        self.telemetry.rendered_viewports = rendered;
        self.telemetry.total_frames += 1;
        if frame_time_ms > self.frame_budget_ms {
            self.telemetry.dropped_frames += 1;
            log::debug!(
                "tick took {frame_time_ms:.2}ms against a {:.2}ms budget, total dropped {}",
                self.frame_budget_ms,
                self.telemetry.dropped_frames
            );
        }
        self.telemetry.vram_bytes = vram_bytes;
    }

    /// Draws the current state without advancing playback clocks (paused draws).
    pub fn render_single_frame(&mut self, viewports: &ViewportManager, callback: &mut dyn RenderCallback) {
        for (id, vp) in viewports.viewports_and_ids() {
            if !vp.active {
                continue;
            }
            if vp.series.is_none() {
                callback.draw(DrawInstruction::ClearBackground { bounds: vp.bounds });
                continue;
            }
            callback.draw(DrawInstruction::Render {
                viewport_id: id,
                frame_index: vp.playback.current_frame,
                bounds: vp.bounds,
            });
        }
    }
}
