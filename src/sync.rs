//! Frame synchronization engine: groups of viewports that align their
//! playback either by frame-ratio, wall-clock time, or not at all (manual).

use std::collections::{HashMap, HashSet};

use crate::error::{CoreError, CoreResult};
use crate::viewport::ViewportId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncMode {
    FrameRatio,
    Time,
    Manual,
}

pub struct SyncGroup {
    pub master: ViewportId,
    pub slaves: Vec<ViewportId>,
    pub mode: SyncMode,
    pub active: bool,
}

/// Computes a slave's frame index from a master's, proportional to their frame counts
/// `master_index` is clamped into `[0, master_count)` by the caller
/// (scheduler); here we only guard the degenerate `master_count == 0` case.
pub fn frame_ratio_index(master_index: usize, master_count: usize, slave_count: usize) -> usize {
    if master_count == 0 {
        return 0;
    }
    if slave_count == master_count {
        return master_index.min(slave_count.saturating_sub(1));
    }
    let mapped = (master_index as u64 * slave_count as u64) / master_count as u64;
    (mapped as usize).min(slave_count.saturating_sub(1))
}

/// Time-mode frame index: `(elapsed_ms / 1000 * fps) mod frame_count`.
pub fn time_mode_index(elapsed_ms: f64, fps: f64, frame_count: usize) -> usize {
    if frame_count == 0 {
        return 0;
    }
    let t_seconds = elapsed_ms / 1000.0;
    let raw = (t_seconds * fps).floor();
    let n = frame_count as f64;
    let wrapped = ((raw % n) + n) % n;
    wrapped as usize
}

/// Manages sync groups; a viewport may belong to at most one group.
#[derive(Default)]
pub struct SyncEngine {
    groups: Vec<SyncGroup>,
    membership: HashMap<ViewportId, usize>,
}

impl SyncEngine {
    pub fn new() -> Self {
        SyncEngine::default()
    }

    /// Fails if the master or any slave already participates in another group.
    pub fn create_sync_group(
        &mut self,
        master: ViewportId,
        slaves: Vec<ViewportId>,
        mode: SyncMode,
    ) -> CoreResult<usize> {
        if self.membership.contains_key(&master) {
            return Err(CoreError::DecodeFailed {
                reason: "viewport already participates in a sync group".into(),
            });
        }
        let slave_set: HashSet<ViewportId> = slaves.iter().copied().collect();
        if slave_set.contains(&master) {
            return Err(CoreError::DecodeFailed {
                reason: "master cannot also be a slave".into(),
            });
        }
        for s in &slaves {
            if self.membership.contains_key(s) {
                return Err(CoreError::DecodeFailed {
                    reason: "viewport already participates in a sync group".into(),
                });
            }
        }

        let index = self.groups.len();
        self.membership.insert(master, index);
        for s in &slaves {
            self.membership.insert(*s, index);
        }
        self.groups.push(SyncGroup {
            master,
            slaves,
            mode,
            active: true,
        });
        Ok(index)
    }

    pub fn clear_all_groups(&mut self) {
        self.groups.clear();
        self.membership.clear();
    }

    pub fn group_for_master(&self, master: ViewportId) -> Option<&SyncGroup> {
        self.membership
            .get(&master)
            .map(|&i| &self.groups[i])
            .filter(|g| g.master == master)
    }

    /// Computation only; the scheduler applies the returned slave->index map. Returns
    /// `None` if `master` is not a group master or the group is in manual/inactive mode.
    pub fn sync_from_master(
        &self,
        master: ViewportId,
        master_index: usize,
        master_frame_count: usize,
        slave_frame_counts: &HashMap<ViewportId, usize>,
    ) -> Option<HashMap<ViewportId, usize>> {
        let group = self.group_for_master(master)?;
        if !group.active || group.mode == SyncMode::Manual {
            return None;
        }
        let mut out = HashMap::new();
        for slave in &group.slaves {
            let Some(&slave_count) = slave_frame_counts.get(slave) else {
                continue;
            };
            let idx = match group.mode {
                SyncMode::FrameRatio => frame_ratio_index(master_index, master_frame_count, slave_count),
                SyncMode::Time => continue, // time mode is driven by elapsed wall clock, not master index
                SyncMode::Manual => unreachable!(),
            };
            out.insert(*slave, idx);
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn ids(n: usize) -> Vec<ViewportId> {
        let mut map: SlotMap<ViewportId, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn frame_ratio_index_scales_by_frame_count_proportion() {
        assert_eq!(frame_ratio_index(10, 47, 94), 20);
        assert_eq!(frame_ratio_index(46, 47, 94), 92);
        assert_eq!(frame_ratio_index(0, 47, 94), 0);
    }

    #[test]
    fn identity_when_equal_counts() {
        assert_eq!(frame_ratio_index(12, 50, 50), 12);
    }

    #[test]
    fn master_zero_frames_pins_slave_to_zero() {
        assert_eq!(frame_ratio_index(3, 0, 10), 0);
    }

    #[test]
    fn master_cannot_already_be_in_a_group() {
        let vids = ids(3);
        let mut engine = SyncEngine::new();
        engine
            .create_sync_group(vids[0], vec![vids[1]], SyncMode::FrameRatio)
            .unwrap();
        assert!(engine
            .create_sync_group(vids[0], vec![vids[2]], SyncMode::FrameRatio)
            .is_err());
    }

    #[test]
    fn sync_from_master_computes_slave_indices() {
        let vids = ids(3);
        let mut engine = SyncEngine::new();
        engine
            .create_sync_group(vids[0], vec![vids[1], vids[2]], SyncMode::FrameRatio)
            .unwrap();
        let mut counts = HashMap::new();
        counts.insert(vids[1], 94);
        counts.insert(vids[2], 47);
        let result = engine.sync_from_master(vids[0], 10, 47, &counts).unwrap();
        assert_eq!(result[&vids[1]], 20);
        assert_eq!(result[&vids[2]], 10);
    }

    #[test]
    fn manual_mode_produces_no_mutation() {
        let vids = ids(2);
        let mut engine = SyncEngine::new();
        engine
            .create_sync_group(vids[0], vec![vids[1]], SyncMode::Manual)
            .unwrap();
        let mut counts = HashMap::new();
        counts.insert(vids[1], 10);
        assert!(engine.sync_from_master(vids[0], 3, 10, &counts).is_none());
    }

    #[test]
    fn time_mode_wraps_modulo_frame_count() {
        assert_eq!(time_mode_index(0.0, 30.0, 47), 0);
        assert_eq!(time_mode_index(1566.0, 30.0, 47), (1.566 * 30.0) as usize % 47);
    }
}
