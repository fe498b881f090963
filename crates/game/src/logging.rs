//! Episode statistics and the host-facing log buffer.

use bytemuck::{Pod, Zeroable};

use crate::weapons::NUM_WEAPONS;
use crate::MAX_DRONES;

pub const LOG_BUFFER_CAPACITY: usize = 1024;

/// `LogEntry::winner` value when the round ended with no sole survivor.
pub const NO_WINNER: u32 = MAX_DRONES as u32;

/// Accumulated per-drone statistics for one episode. Plain floats
/// throughout so hosts can view the buffer as raw bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DroneStats {
    pub reward: f32,
    pub wins: f32,
    pub distance_traveled: f32,
    /// Straight-line distance between spawn and final position.
    pub abs_distance_traveled: f32,
    pub brake_time: f32,
    pub energy_emptied: f32,
    pub total_bursts: f32,
    pub bursts_hit: f32,
    pub shots_fired: [f32; NUM_WEAPONS],
    pub shots_hit: [f32; NUM_WEAPONS],
    pub shots_taken: [f32; NUM_WEAPONS],
    pub own_shots_taken: [f32; NUM_WEAPONS],
    pub weapons_picked_up: [f32; NUM_WEAPONS],
    pub shot_distances: [f32; NUM_WEAPONS],
}

impl Default for DroneStats {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// One finished episode.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct LogEntry {
    pub length: f32,
    pub winner: u32,
    pub stats: [DroneStats; MAX_DRONES],
}

impl Default for LogEntry {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Fixed-capacity episode log; entries past capacity are dropped.
#[derive(Debug)]
pub struct LogBuffer {
    entries: Vec<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            return;
        }
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Average every field across the buffered episodes, then clear the
    /// buffer. The winner field is meaningless in the aggregate and stays
    /// zero.
    pub fn aggregate_and_clear(&mut self, num_drones: usize) -> LogEntry {
        let mut out = LogEntry::default();
        if self.entries.is_empty() {
            return out;
        }
        log::debug!("aggregating {} log entries", self.entries.len());

        let count = self.entries.len() as f32;
        for entry in self.entries.drain(..) {
            out.length += entry.length / count;
            for drone in 0..num_drones {
                let src = &entry.stats[drone];
                let dst = &mut out.stats[drone];
                dst.reward += src.reward / count;
                dst.wins += src.wins / count;
                dst.distance_traveled += src.distance_traveled / count;
                dst.abs_distance_traveled += src.abs_distance_traveled / count;
                dst.brake_time += src.brake_time / count;
                dst.energy_emptied += src.energy_emptied / count;
                dst.total_bursts += src.total_bursts / count;
                dst.bursts_hit += src.bursts_hit / count;
                for weapon in 0..NUM_WEAPONS {
                    dst.shots_fired[weapon] += src.shots_fired[weapon] / count;
                    dst.shots_hit[weapon] += src.shots_hit[weapon] / count;
                    dst.shots_taken[weapon] += src.shots_taken[weapon] / count;
                    dst.own_shots_taken[weapon] += src.own_shots_taken[weapon] / count;
                    dst.weapons_picked_up[weapon] += src.weapons_picked_up[weapon] / count;
                    dst.shot_distances[weapon] += src.shot_distances[weapon] / count;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_averages_each_field_once() {
        let mut logs = LogBuffer::new(8);
        for length in [100.0, 300.0] {
            let mut entry = LogEntry {
                length,
                ..Default::default()
            };
            entry.stats[0].reward = length / 100.0;
            entry.stats[0].distance_traveled = length;
            entry.stats[0].shots_fired[2] = 4.0;
            logs.push(entry);
        }

        let aggregated = logs.aggregate_and_clear(1);
        assert!(logs.is_empty());
        assert_eq!(aggregated.length, 200.0);
        assert_eq!(aggregated.stats[0].reward, 2.0);
        assert_eq!(aggregated.stats[0].distance_traveled, 200.0);
        assert_eq!(aggregated.stats[0].shots_fired[2], 4.0);
    }

    #[test]
    fn aggregate_of_empty_buffer_is_zeroed() {
        let mut logs = LogBuffer::new(4);
        let aggregated = logs.aggregate_and_clear(2);
        assert_eq!(aggregated.length, 0.0);
        assert_eq!(aggregated.stats[0].reward, 0.0);
    }

    #[test]
    fn push_past_capacity_drops_entries() {
        let mut logs = LogBuffer::new(2);
        for _ in 0..5 {
            logs.push(LogEntry::default());
        }
        assert_eq!(logs.len(), 2);
    }
}
