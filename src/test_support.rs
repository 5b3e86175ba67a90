use crate::dial_eye::{CommandOutput, DialReader};
use crate::error::AcquisitionError;
use crate::publisher::Publisher;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::subscriber::DefaultGuard;

/// Reader replaying canned results; exits with status 1 once they run out.
pub struct ScriptedReader {
    results: Mutex<VecDeque<Result<CommandOutput, AcquisitionError>>>,
    pub calls: AtomicU64,
    pub image_refreshes: AtomicU64,
    pub delay: Duration,
}

impl ScriptedReader {
    pub fn new(results: Vec<Result<CommandOutput, AcquisitionError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: AtomicU64::new(0),
            image_refreshes: AtomicU64::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn printing(payloads: &[&str]) -> Self {
        Self::new(
            payloads
                .iter()
                .map(|stdout| {
                    Ok(CommandOutput {
                        status: 0,
                        stdout: format!("{stdout}\n"),
                    })
                })
                .collect(),
        )
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_result(&self) -> Result<CommandOutput, AcquisitionError> {
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AcquisitionError::Status(1)))
    }
}

impl DialReader for ScriptedReader {
    async fn sample(&self) -> Result<CommandOutput, AcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.next_result()
    }

    async fn render_image(&self) -> Result<CommandOutput, AcquisitionError> {
        self.image_refreshes.fetch_add(1, Ordering::SeqCst);
        Err(AcquisitionError::Status(2))
    }
}

/// Publisher keeping every retained message in memory.
#[derive(Default)]
pub struct Recorder {
    messages: Mutex<Vec<(String, String)>>,
}

impl Recorder {
    pub fn take(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.messages.lock().unwrap())
    }
}

impl Publisher for Recorder {
    async fn publish(&self, topic_suffix: &str, payload: String, retain: bool) -> anyhow::Result<()> {
        assert!(retain, "{topic_suffix} published without retain");
        self.messages
            .lock()
            .unwrap()
            .push((topic_suffix.to_string(), payload));
        Ok(())
    }
}

/// Formatted log output of the current thread, for asserting on diagnostics.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedLogs {
    /// Routes this thread's events here until the guard is dropped.
    pub fn install(&self) -> DefaultGuard {
        let logs = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || logs.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
