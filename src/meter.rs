use crate::snapshot::MeterSnapshot;
use tokio::time::Instant;
use tracing::{info, warn};

const VALUE_DECIMALS: i32 = 5;
const RATE_DECIMALS: i32 = 2;

/// Dial geometry and rollover thresholds, all expressed in sub-units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DialProfile {
    pub sub_units_per_major_unit: f64,
    /// Readings below this count a rollover (once per guard cycle).
    pub rollover_low: f64,
    /// Inclusive lower bound of the window that clears the rollover guard.
    pub clear_low: f64,
    /// Exclusive upper bound of the window that clears the rollover guard.
    pub clear_high: f64,
}

impl Default for DialProfile {
    fn default() -> Self {
        Self {
            sub_units_per_major_unit: 1000.0,
            rollover_low: 100.0,
            clear_low: 400.0,
            clear_high: 700.0,
        }
    }
}

/// One observed cumulative value. `time == None` means nothing has been observed yet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimestampedSample {
    pub value: f64,
    pub time: Option<Instant>,
}

/// Running state of a single dial meter.
///
/// Turns successive raw sub-unit readings into a cumulative major-unit value,
/// counting dial rollovers once each, and derives a per-minute flow rate from
/// the last two samples.
#[derive(Debug, Clone)]
pub struct MeterState {
    profile: DialProfile,
    cumulative_value: f64,
    major_unit_count: u64,
    rollover_guard: bool,
    instant_consumption_per_minute: f64,
    current_sample: TimestampedSample,
    previous_sample: TimestampedSample,
}

impl MeterState {
    /// Creates a fresh meter starting at a whole number of major units.
    pub fn new(profile: DialProfile, initial_major_units: u64) -> Self {
        Self::from_snapshot(
            profile,
            &MeterSnapshot {
                major_unit_count: initial_major_units,
                rollover_guard: false,
                cumulative_value: initial_major_units as f64,
            },
        )
    }

    /// Restores a meter from persisted state. No sample time is known yet, so the
    /// first update after a restore always reports a zero rate.
    pub fn from_snapshot(profile: DialProfile, snapshot: &MeterSnapshot) -> Self {
        Self {
            profile,
            cumulative_value: snapshot.cumulative_value,
            major_unit_count: snapshot.major_unit_count,
            rollover_guard: snapshot.rollover_guard,
            instant_consumption_per_minute: 0.0,
            current_sample: TimestampedSample {
                value: snapshot.cumulative_value,
                time: None,
            },
            previous_sample: TimestampedSample::default(),
        }
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        MeterSnapshot {
            major_unit_count: self.major_unit_count,
            rollover_guard: self.rollover_guard,
            cumulative_value: self.cumulative_value,
        }
    }

    pub fn cumulative_value(&self) -> f64 {
        self.cumulative_value
    }

    pub fn major_unit_count(&self) -> u64 {
        self.major_unit_count
    }

    pub fn rollover_guard(&self) -> bool {
        self.rollover_guard
    }

    pub fn instant_consumption_per_minute(&self) -> f64 {
        self.instant_consumption_per_minute
    }

    pub fn previous_sample(&self) -> TimestampedSample {
        self.previous_sample
    }

    /// Feeds a new raw reading observed now.
    pub fn update_sub_unit_reading(&mut self, sub_units: f64) {
        self.update_sub_unit_reading_at(sub_units, Instant::now());
    }

    /// Feeds a new raw reading observed at `now`.
    pub fn update_sub_unit_reading_at(&mut self, sub_units: f64, now: Instant) {
        self.apply_rollover_rules(sub_units);

        self.previous_sample = self.current_sample;
        self.current_sample = TimestampedSample {
            value: self.major_unit_count as f64
                + sub_units / self.profile.sub_units_per_major_unit,
            time: Some(now),
        };
        self.cumulative_value = self.current_sample.value;

        self.update_instant_consumption();
        self.round();
    }

    fn apply_rollover_rules(&mut self, sub_units: f64) {
        let profile = &self.profile;
        if sub_units < profile.rollover_low && !self.rollover_guard {
            info!(
                "Increase {} m3 by one to {}",
                self.major_unit_count,
                self.major_unit_count + 1
            );
            self.major_unit_count += 1;
            self.rollover_guard = true;
        } else if (profile.clear_low..profile.clear_high).contains(&sub_units)
            && self.rollover_guard
        {
            info!("Cleared rollover guard at {sub_units} sub-units");
            self.rollover_guard = false;
        }
    }

    fn update_instant_consumption(&mut self) {
        let (Some(previous_time), Some(current_time)) =
            (self.previous_sample.time, self.current_sample.time)
        else {
            self.instant_consumption_per_minute = 0.0;
            return;
        };

        let elapsed = current_time.saturating_duration_since(previous_time);
        if elapsed.is_zero() {
            // Clock did not advance; keep the last rate rather than divide by zero.
            warn!(
                "No time elapsed between samples ({:.5} -> {:.5}), rate not updated",
                self.previous_sample.value, self.current_sample.value
            );
            return;
        }

        let delta_sub_units = (self.current_sample.value - self.previous_sample.value)
            * self.profile.sub_units_per_major_unit;
        self.instant_consumption_per_minute = delta_sub_units / elapsed.as_secs_f64() * 60.0;
    }

    fn round(&mut self) {
        self.cumulative_value = round_to(self.cumulative_value, VALUE_DECIMALS);
        self.current_sample.value = round_to(self.current_sample.value, VALUE_DECIMALS);
        self.previous_sample.value = round_to(self.previous_sample.value, VALUE_DECIMALS);
        // Adding positive zero turns -0.0 into 0.0.
        self.instant_consumption_per_minute =
            round_to(self.instant_consumption_per_minute, RATE_DECIMALS) + 0.0;
    }
}

/// Rounds half-to-even at a fixed number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}
