use crate::config::Config;
use crate::dial_eye::DialReader;
use crate::error::AcquisitionError;
use crate::meter::{round_to, DialProfile, MeterState};
use crate::publisher::{ConsumptionPublisher, Publisher};
use crate::snapshot::{MeterSnapshot, SnapshotStore};
use crate::update_coordinator::TriggerSource;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorSettings {
    /// The reader prints readings multiplied by this factor.
    pub device_scale: f64,
    pub acquisition_timeout: Duration,
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            device_scale: config.device_scale,
            acquisition_timeout: config.timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateStats {
    pub successful_fetches: u64,
    pub fetch_errors: u64,
}

/// Drives one read → convert → publish → persist cycle per trigger.
///
/// Updates are serialized; the meter is only mutated after a successful
/// acquisition and its snapshot is written after every such mutation.
pub struct UpdateOrchestrator<R, P> {
    reader: R,
    publisher: ConsumptionPublisher<P>,
    store: SnapshotStore,
    settings: OrchestratorSettings,
    meter: Mutex<MeterState>,
    update_lock: Mutex<()>,
    successful_fetches: AtomicU64,
    fetch_errors: AtomicU64,
    exiting: AtomicBool,
}

impl<R: DialReader, P: Publisher> UpdateOrchestrator<R, P> {
    pub fn new(
        reader: R,
        publisher: P,
        store: SnapshotStore,
        meter: MeterState,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            reader,
            publisher: ConsumptionPublisher::new(publisher),
            store,
            settings,
            meter: Mutex::new(meter),
            update_lock: Mutex::new(()),
            successful_fetches: AtomicU64::new(0),
            fetch_errors: AtomicU64::new(0),
            exiting: AtomicBool::new(false),
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn publisher(&self) -> &P {
        self.publisher.inner()
    }

    pub fn stats(&self) -> UpdateStats {
        UpdateStats {
            successful_fetches: self.successful_fetches.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
        }
    }

    /// How long shutdown waits for an in-flight update.
    pub fn stop_timeout(&self) -> Duration {
        self.settings.acquisition_timeout + Duration::from_secs(1)
    }

    pub async fn current_value(&self) -> f64 {
        self.meter.lock().await.cumulative_value()
    }

    pub async fn meter_snapshot(&self) -> MeterSnapshot {
        self.meter.lock().await.snapshot()
    }

    /// Runs one update cycle. Never fails; problems end up in logs and counters.
    pub async fn perform_update(&self, trigger: TriggerSource) {
        debug!("update called, trigger_source={trigger}");

        let _serialized = self.update_lock.lock().await;
        if self.exiting.load(Ordering::SeqCst) {
            debug!("Stopping, update from {trigger} ignored");
            return;
        }

        self.update().await;
    }

    async fn update(&self) {
        let sub_units = match self.acquire_sub_units().await {
            Ok(sub_units) => sub_units,
            Err(e) => {
                self.fetch_errors.fetch_add(1, Ordering::Relaxed);
                error!("DialEye reading failed: {e}");
                self.publisher.publish_zero_consumption().await;
                return;
            }
        };
        self.successful_fetches.fetch_add(1, Ordering::Relaxed);

        let (snapshot, current_value, previous_value, consumption) = {
            let mut meter = self.meter.lock().await;
            meter.update_sub_unit_reading(sub_units);
            let snapshot = meter.snapshot();
            debug!(
                "m3={}, sub_units={:.2}, rollover_guard={}, previous_value={:.5}, current_value={:.5}, consumption={:.2}/min",
                snapshot.major_unit_count,
                sub_units,
                snapshot.rollover_guard,
                meter.previous_sample().value,
                snapshot.cumulative_value,
                meter.instant_consumption_per_minute(),
            );
            (
                snapshot,
                snapshot.cumulative_value,
                meter.previous_sample().value,
                meter.instant_consumption_per_minute(),
            )
        };

        if consumption >= 0.0 {
            info!("Current value = {current_value:.5}, consumption = {consumption:.2}/min");
            self.publisher
                .publish_values(current_value, consumption)
                .await;
        } else {
            error!(
                "Consumption {consumption:.2}/min is less than 0, ignore update (current_value={current_value:.5}, previous_value={previous_value:.5})"
            );
            self.publisher.publish_zero_consumption().await;
        }

        // Persisted even for a negative rate so the same anomaly is not replayed.
        if let Err(e) = self.store.store(&snapshot).await {
            error!(
                "Failed to write {} ({snapshot}): {e}",
                self.store.path().display()
            );
        }
    }

    async fn acquire_sub_units(&self) -> Result<f64, AcquisitionError> {
        let output = self.reader.sample().await?;
        if output.status != 0 {
            return Err(AcquisitionError::Status(output.status));
        }
        parse_sub_units(&output.stdout, self.settings.device_scale)
    }

    /// Best-effort refresh of the dial image; failures are only logged.
    pub async fn refresh_image(&self) {
        match self.reader.render_image().await {
            Ok(output) => info!(
                "Image update result (status={}): {}",
                output.status,
                output.stdout.trim()
            ),
            Err(e) => warn!("Image update failed: {e}"),
        }
    }

    /// Stops accepting updates, waits for an in-flight one, then reports zero flow.
    ///
    /// Holding the update lock while publishing keeps the zero signal last.
    pub async fn stop(&self) {
        debug!("Stopping...");
        self.exiting.store(true, Ordering::SeqCst);

        let max_wait = self.stop_timeout();
        debug!("Wait max {max_wait:?} for dial reading to end...");
        let _serialized = match timeout(max_wait, self.update_lock.lock()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!("Dial reading still running after {max_wait:?}, stopping anyway");
                None
            }
        };

        self.publisher.publish_zero_consumption().await;
        debug!("Exit");
    }
}

/// Converts the reader's stdout into sub-units.
pub fn parse_sub_units(stdout: &str, device_scale: f64) -> Result<f64, AcquisitionError> {
    let raw: f64 = stdout
        .trim()
        .parse()
        .map_err(|_| AcquisitionError::InvalidPayload(stdout.to_string()))?;
    if !raw.is_finite() || raw < 0.0 {
        return Err(AcquisitionError::InvalidPayload(stdout.to_string()));
    }
    Ok(round_to(raw / device_scale, 2))
}

/// Loads the persisted meter, falling back to a fresh one at `initial_major_units`.
pub async fn restore_meter(
    store: &SnapshotStore,
    profile: DialProfile,
    initial_major_units: u64,
) -> MeterState {
    let path = store.path().display();
    let meter = match store.load().await {
        Ok(Some(snapshot)) => {
            info!("Initialize data from {path} file");
            MeterState::from_snapshot(profile, &snapshot)
        }
        Ok(None) => {
            info!("{path} file does not exist, initialize variables");
            MeterState::new(profile, initial_major_units)
        }
        Err(e) => {
            info!("Ignoring {path}: {e}, initialize variables");
            MeterState::new(profile, initial_major_units)
        }
    };

    info!(
        "Initial values: m3={}, rollover_guard={}, value={:.6}",
        meter.major_unit_count(),
        meter.rollover_guard(),
        meter.cumulative_value()
    );
    meter
}
