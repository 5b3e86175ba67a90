use crate::dial_eye::DialReader;
use crate::publisher::Publisher;
use crate::update_orchestrator::UpdateOrchestrator;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

const TRIGGER_QUEUE_DEPTH: usize = 4;

/// What asked for an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Interval,
    OnDemand,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Interval => f.write_str("interval"),
            TriggerSource::OnDemand => f.write_str("on-demand"),
        }
    }
}

/// Cloneable handle for requesting updates outside the interval schedule.
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    sender: Sender<TriggerSource>,
}

impl TriggerHandle {
    /// Queues an on-demand update. Returns false if the queue is full or closed.
    pub fn request_update(&self) -> bool {
        match self.sender.try_send(TriggerSource::OnDemand) {
            Ok(()) => true,
            Err(e) => {
                warn!("On-demand update not queued: {e}");
                false
            }
        }
    }
}

/// Owns the interval ticker and the single worker that runs updates one at a time.
pub struct UpdateCoordinator<R, P> {
    orchestrator: Arc<UpdateOrchestrator<R, P>>,
    trigger_sender: Sender<TriggerSource>,
    shutdown_sender: watch::Sender<bool>,
    worker: JoinHandle<()>,
    ticker: JoinHandle<()>,
}

impl<R: DialReader, P: Publisher> UpdateCoordinator<R, P> {
    /// Starts the worker and the ticker. The first interval update runs immediately.
    pub fn start(orchestrator: Arc<UpdateOrchestrator<R, P>>, update_interval: Duration) -> Self {
        info!("Starting update coordinator, interval {update_interval:?}");

        let (trigger_sender, trigger_receiver) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
        let (shutdown_sender, shutdown_receiver) = watch::channel(false);

        let worker = Self::spawn_worker(
            orchestrator.clone(),
            trigger_receiver,
            shutdown_receiver.clone(),
        );
        let ticker = Self::spawn_ticker(trigger_sender.clone(), update_interval, shutdown_receiver);

        Self {
            orchestrator,
            trigger_sender,
            shutdown_sender,
            worker,
            ticker,
        }
    }

    pub fn trigger_handle(&self) -> TriggerHandle {
        TriggerHandle {
            sender: self.trigger_sender.clone(),
        }
    }

    pub fn orchestrator(&self) -> &Arc<UpdateOrchestrator<R, P>> {
        &self.orchestrator
    }

    fn spawn_worker(
        orchestrator: Arc<UpdateOrchestrator<R, P>>,
        mut triggers: Receiver<TriggerSource>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            debug!("Update worker started");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    trigger = triggers.recv() => match trigger {
                        Some(trigger) => orchestrator.perform_update(trigger).await,
                        None => break,
                    },
                }
            }
            debug!("Update worker exiting");
        })
    }

    fn spawn_ticker(
        triggers: Sender<TriggerSource>,
        update_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticks = interval(update_interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticks.tick() => match triggers.try_send(TriggerSource::Interval) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => debug!("Update still pending, interval tick skipped"),
                        Err(TrySendError::Closed(_)) => break,
                    },
                }
            }
            debug!("Update ticker exiting");
        })
    }

    /// Stops scheduling, lets a running update finish and publishes the final zero signal.
    ///
    /// An update still running after the orchestrator's stop timeout is aborted, which
    /// kills a pending dialEye child and drops a pending publish.
    pub async fn shutdown(mut self) {
        info!("Shutting down update coordinator");
        let _ = self.shutdown_sender.send(true);

        let max_wait = self.orchestrator.stop_timeout();
        match timeout(max_wait, &mut self.worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Update worker ended abnormally: {e}"),
            Err(_) => {
                warn!("Update still running after {max_wait:?}, aborting it");
                self.worker.abort();
                let _ = (&mut self.worker).await;
            }
        }
        if let Err(e) = self.ticker.await {
            warn!("Update ticker ended abnormally: {e}");
        }

        self.orchestrator.stop().await;
    }
}
