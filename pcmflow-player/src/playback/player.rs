//! Streaming PCM player
//!
//! Wraps a [`SegmentScheduler`] in a mutex and drives its flush from a
//! periodic tokio task.
//!
//! # Ordering
//!
//! `feed` and the timer's flush take the same lock. A feed that completes
//! before a flush starts is in that flush; a feed that arrives while a flush
//! holds the lock waits and lands in the next one. Normalization runs before
//! the lock is taken so the critical section is only the append.
//!
//! # Shutdown
//!
//! `destroy` aborts the timer task first, then closes the scheduler (which
//! closes the sink). A flush already inside the lock finishes before the
//! close can proceed; any later flush sees the closed scheduler and does
//! nothing.

use crate::audio::{normalize, normalize_samples, OutputSink, PcmSample};
use crate::error::{Error, Result};
use crate::playback::scheduler::{FlushOutcome, SchedulerStats, SegmentScheduler};
use parking_lot::Mutex;
use pcmflow_common::PlayerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Streaming PCM player with a periodic flush timer
pub struct PcmPlayer<S: OutputSink> {
    scheduler: Arc<Mutex<SegmentScheduler<S>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
    config: PlayerConfig,
}

impl<S: OutputSink> PcmPlayer<S> {
    /// Create a player and start its flush timer
    ///
    /// Must be called from within a tokio runtime. The first flush fires one
    /// `flush_interval_ms` after start.
    ///
    /// # Errors
    /// - Configuration errors from [`PlayerConfig::validate`]
    /// - [`Error::Runtime`] when no tokio runtime is available
    pub fn start(config: PlayerConfig, sink: S) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Runtime(format!("Flush timer needs a tokio runtime: {}", e)))?;

        let scheduler = Arc::new(Mutex::new(SegmentScheduler::new(config.clone(), sink)?));
        let timer = runtime.spawn(flush_loop(Arc::clone(&scheduler), config.flush_interval()));

        info!(
            "PCM player started (flush every {}ms)",
            config.flush_interval_ms
        );

        Ok(Self {
            scheduler,
            timer: Mutex::new(Some(timer)),
            config,
        })
    }

    /// Normalize a raw chunk and queue it for the next flush
    ///
    /// Returns the number of samples queued.
    ///
    /// # Errors
    /// - Malformed chunk (length not a multiple of the sample width)
    /// - [`Error::Closed`] after [`destroy`](Self::destroy)
    pub fn feed(&self, raw: &[u8]) -> Result<usize> {
        let normalized = normalize(raw, self.config.encoding);
        self.scheduler.lock().accept(normalized)
    }

    /// Queue typed samples; `T` must match the configured encoding
    pub fn feed_samples<T: PcmSample>(&self, samples: &[T]) -> Result<usize> {
        let normalized = normalize_samples(samples, self.config.encoding);
        self.scheduler.lock().accept(normalized)
    }

    /// Flush immediately instead of waiting for the next timer tick
    pub fn flush_now(&self) -> Result<Option<FlushOutcome>> {
        self.scheduler.lock().flush()
    }

    /// Set the output gain for subsequently scheduled segments
    ///
    /// The level is passed to the sink as is; no range check.
    pub fn set_volume(&self, level: f32) -> Result<()> {
        self.scheduler.lock().set_volume(level)
    }

    /// Stop the timer, discard buffered samples and close the sink
    ///
    /// Blocks until the sink's `close` returns; for [`crate::CpalSink`]
    /// that includes joining its output thread. Calling it again is a no-op.
    pub fn destroy(&self) -> Result<()> {
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
            debug!("Flush timer cancelled");
        }

        if self.scheduler.lock().close()? {
            info!("PCM player destroyed");
        }
        Ok(())
    }

    /// True once the player has been destroyed
    pub fn is_destroyed(&self) -> bool {
        self.scheduler.lock().is_closed()
    }

    /// End of the last scheduled segment on the sink clock (seconds)
    pub fn scheduled_until(&self) -> f64 {
        self.scheduler.lock().scheduled_until()
    }

    /// Current time on the sink clock (seconds)
    pub fn sink_time(&self) -> f64 {
        self.scheduler.lock().sink_time()
    }

    /// Samples waiting for the next flush
    pub fn pending_samples(&self) -> usize {
        self.scheduler.lock().pending_samples()
    }

    /// Snapshot of the scheduler counters
    pub fn stats(&self) -> SchedulerStats {
        self.scheduler.lock().stats()
    }

    /// Run `f` against the output sink
    pub fn with_sink<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(self.scheduler.lock().sink())
    }

    /// Player configuration
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }
}

/// Dropping without [`PcmPlayer::destroy`] stops the timer right away and
/// closes the sink on tokio's blocking pool when a runtime is available, so
/// a runtime worker never waits on the output thread.
impl<S: OutputSink> Drop for PcmPlayer<S> {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
        if self.scheduler.lock().is_closed() {
            return;
        }

        let scheduler = Arc::clone(&self.scheduler);
        let close = move || match scheduler.lock().close() {
            Ok(true) => info!("PCM player dropped, output closed"),
            Ok(false) => {}
            Err(e) => error!("Failed to close output sink on drop: {}", e),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(close);
            }
            Err(_) => close(),
        }
    }
}

/// Periodic flush task
///
/// Ticks are delayed rather than bursted when the runtime falls behind;
/// the cumulative cursor keeps scheduling gapless either way.
async fn flush_loop<S: OutputSink>(scheduler: Arc<Mutex<SegmentScheduler<S>>>, period: Duration) {
    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tick.tick().await;

        let closed = {
            let mut guard = scheduler.lock();
            if !guard.is_closed() {
                if let Err(e) = guard.flush() {
                    error!("Flush failed: {}", e);
                }
            }
            guard.is_closed()
        };

        if closed {
            debug!("Flush loop stopping");
            break;
        }
    }
}
