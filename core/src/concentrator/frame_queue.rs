//! # Time-Aligned Frame Queue
//!
//! Measurements arrive individually and out of order. The queue buckets them into
//! publication slots of `1 / FramesPerSecond` seconds and releases a slot once it is
//! older than the lag time, so late values still make it into their frame.
//!
//! ## Key Components
//!
//! - `FrameQueue`: Slot map plus the sorting rules (lag time, lead time, bad timestamps).
//! - `SortOutcome`: Where a single measurement went.
//! - `SortingStatistics`: Running counters.
//! - `ReadySlot`: A slot released for publication.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::measurement::{apply_measurement, Measurement};
use super::settings::ConcentratorSettings;
use crate::ieee_c37_118::data_frame::DataFrame;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SortingStatistics {
    pub received_measurements: u64,
    pub processed_measurements: u64,
    pub discarded_measurements: u64,
    pub measurements_sorted_by_arrival: u64,
    pub missed_sorts_by_timeout: u64,
    pub published_frames: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOutcome {
    Sorted,
    SortedByArrival,
    /// Older than the lag time.
    DiscardedLate,
    /// Further ahead than the lead time.
    DiscardedFuture,
    /// Bad timestamp while sorting by arrival is off.
    DiscardedBadTimestamp,
    /// The target signal is not part of the configuration.
    DiscardedUnknownSignal,
    /// The slot had already been published.
    MissedSortByTimeout,
}

/// A slot released for publication. `frame` is `None` when no measurement arrived.
#[derive(Debug)]
pub struct ReadySlot {
    pub timestamp: DateTime<Utc>,
    pub frame: Option<DataFrame>,
}

#[derive(Debug)]
pub struct FrameQueue {
    frames_per_second: i128,
    lag_nanos: i128,
    lead_nanos: i128,
    allow_sorts_by_arrival: bool,
    reasonability_check: bool,
    frames: BTreeMap<i64, DataFrame>,
    last_published: Option<i64>,
    statistics: SortingStatistics,
}

fn to_nanos(timestamp: DateTime<Utc>) -> i128 {
    timestamp.timestamp() as i128 * NANOS_PER_SECOND + timestamp.timestamp_subsec_nanos() as i128
}

fn seconds_to_nanos(seconds: f64) -> i128 {
    (seconds * 1e9).round() as i128
}

impl FrameQueue {
    pub fn new(settings: &ConcentratorSettings) -> Self {
        FrameQueue {
            frames_per_second: settings.frames_per_second.max(1) as i128,
            lag_nanos: seconds_to_nanos(settings.lag_time),
            lead_nanos: seconds_to_nanos(settings.lead_time),
            allow_sorts_by_arrival: settings.allow_sorts_by_arrival,
            reasonability_check: settings.perform_timestamp_reasonability_check,
            frames: BTreeMap::new(),
            last_published: None,
            statistics: SortingStatistics::default(),
        }
    }

    /// Slot nearest to `timestamp`.
    pub fn slot_of(&self, timestamp: DateTime<Utc>) -> i64 {
        let scaled = to_nanos(timestamp) * self.frames_per_second;
        (scaled + NANOS_PER_SECOND / 2).div_euclid(NANOS_PER_SECOND) as i64
    }

    /// Start instant of `slot`, truncated to whole nanoseconds.
    pub fn slot_timestamp(&self, slot: i64) -> DateTime<Utc> {
        let nanos = (slot as i128 * NANOS_PER_SECOND).div_euclid(self.frames_per_second);
        let seconds = nanos.div_euclid(NANOS_PER_SECOND) as i64;
        let subsec = nanos.rem_euclid(NANOS_PER_SECOND) as u32;
        DateTime::from_timestamp(seconds, subsec).unwrap_or_default()
    }

    /// Sorts one measurement into its slot.
    ///
    /// # Parameters
    ///
    /// * `measurement`: The value to place.
    /// * `now`: Current wall-clock time.
    /// * `create`: Builds an empty frame for a slot timestamp the first time a slot is
    ///   used. Returning `None` discards the measurement.
    pub fn sort<F>(
        &mut self,
        measurement: &Measurement,
        now: DateTime<Utc>,
        create: F,
    ) -> SortOutcome
    where
        F: FnOnce(DateTime<Utc>) -> Option<DataFrame>,
    {
        self.statistics.received_measurements += 1;

        let by_arrival = measurement.bad_timestamp;
        if by_arrival && !self.allow_sorts_by_arrival {
            return self.discard(SortOutcome::DiscardedBadTimestamp);
        }
        let timestamp = if by_arrival { now } else { measurement.timestamp };

        let distance = to_nanos(now) - to_nanos(timestamp);
        if self.reasonability_check && distance < -self.lead_nanos {
            return self.discard(SortOutcome::DiscardedFuture);
        }

        let slot = self.slot_of(timestamp);
        if self.last_published.is_some_and(|published| slot <= published) {
            self.statistics.missed_sorts_by_timeout += 1;
            self.statistics.discarded_measurements += 1;
            return SortOutcome::MissedSortByTimeout;
        }
        if distance > self.lag_nanos {
            return self.discard(SortOutcome::DiscardedLate);
        }

        if !self.frames.contains_key(&slot) {
            match create(self.slot_timestamp(slot)) {
                Some(frame) => {
                    self.frames.insert(slot, frame);
                }
                None => return self.discard(SortOutcome::DiscardedUnknownSignal),
            }
        }
        let allow = self.allow_sorts_by_arrival;
        let assigned = self
            .frames
            .get_mut(&slot)
            .is_some_and(|frame| apply_measurement(frame, measurement, allow, by_arrival));
        if !assigned {
            return self.discard(SortOutcome::DiscardedUnknownSignal);
        }

        self.statistics.processed_measurements += 1;
        if by_arrival {
            self.statistics.measurements_sorted_by_arrival += 1;
            SortOutcome::SortedByArrival
        } else {
            SortOutcome::Sorted
        }
    }

    fn discard(&mut self, outcome: SortOutcome) -> SortOutcome {
        self.statistics.discarded_measurements += 1;
        outcome
    }

    /// Releases every slot whose start is at least the lag time before `now`, oldest
    /// first.
    ///
    /// The first call releases only the newest ready slot, and no call releases more
    /// than one second of slots. Skipped slots are dropped along with their frames.
    pub fn take_ready(&mut self, now: DateTime<Utc>) -> Vec<ReadySlot> {
        let boundary = (to_nanos(now) - self.lag_nanos) * self.frames_per_second;
        let newest = boundary.div_euclid(NANOS_PER_SECOND) as i64;
        let mut first = match self.last_published {
            Some(published) => published + 1,
            None => newest,
        };
        if first > newest {
            return Vec::new();
        }
        let backlog_limit = self.frames_per_second as i64;
        if newest - first + 1 > backlog_limit {
            first = newest - backlog_limit + 1;
        }

        let pending = self.frames.split_off(&(newest + 1));
        let expired = std::mem::replace(&mut self.frames, pending);
        let mut ready_frames: BTreeMap<i64, DataFrame> =
            expired.into_iter().filter(|(slot, _)| *slot >= first).collect();

        self.last_published = Some(newest);
        (first..=newest)
            .map(|slot| ReadySlot {
                timestamp: self.slot_timestamp(slot),
                frame: ready_frames.remove(&slot),
            })
            .collect()
    }

    pub fn record_publication(&mut self) {
        self.statistics.published_frames += 1;
    }

    pub fn statistics(&self) -> SortingStatistics {
        self.statistics
    }

    pub fn queued_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn frames_per_second(&self) -> u16 {
        self.frames_per_second as u16
    }
}
