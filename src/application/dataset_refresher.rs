//! Dataset Refresher
//!
//! Periodically downloads the geolocation datasets, builds a fresh
//! [`GeoIndex`] off the async workers and swaps it into the shared slot.

use crate::domain::errors::RefreshError;
use crate::domain::ports::DatasetSource;
use crate::domain::services::GeoIndex;
use crate::infrastructure::GeoIndexSlot;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default refresh period: 6 hours.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Refresh cycle state.
///
/// `Idle → Fetching → Building → Swapping → Idle`, or
/// `Fetching | Building → Failed → Idle` on error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Fetching,
    Building,
    Swapping,
    Failed,
}

/// Rebuilds the served index from a [`DatasetSource`].
///
/// A failed cycle never touches the slot: the previous index keeps serving
/// and the error is only logged and kept in [`DatasetRefresher::last_error`].
pub struct DatasetRefresher {
    source: Arc<dyn DatasetSource>,
    slot: Arc<GeoIndexSlot>,
    interval: Duration,
    state: Mutex<RefreshState>,
    last_error: Mutex<Option<RefreshError>>,
    // Serializes cycles so a manual refresh never races the timer.
    cycle: tokio::sync::Mutex<()>,
}

impl DatasetRefresher {
    pub fn new(source: Arc<dyn DatasetSource>, slot: Arc<GeoIndexSlot>) -> Self {
        Self {
            source,
            slot,
            interval: DEFAULT_REFRESH_INTERVAL,
            state: Mutex::new(RefreshState::Idle),
            last_error: Mutex::new(None),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn state(&self) -> RefreshState {
        *self.state.lock()
    }

    /// Version of the index currently served.
    pub fn version(&self) -> u64 {
        self.slot.version()
    }

    /// Error of the most recent cycle, cleared by the next success.
    pub fn last_error(&self) -> Option<RefreshError> {
        self.last_error.lock().clone()
    }

    /// Download and parse both datasets into a new index.
    ///
    /// The served index is untouched whatever the outcome. Waits for any
    /// running cycle to finish first.
    pub async fn refresh(&self) -> Result<GeoIndex, RefreshError> {
        let _cycle = self.cycle.lock().await;
        let result = self.fetch_and_build().await;
        self.set_state(RefreshState::Idle);
        result
    }

    /// Run one cycle and swap the result in. Returns whether a swap happened.
    pub async fn refresh_and_swap(&self) -> bool {
        let _cycle = self.cycle.lock().await;

        match self.fetch_and_build().await {
            Ok(index) => {
                self.set_state(RefreshState::Swapping);
                let (ranges, sites) = index.size();
                let version = self.slot.swap(index);
                *self.last_error.lock() = None;
                self.set_state(RefreshState::Idle);
                tracing::info!(version, ranges, sites, "geo index swapped in");
                true
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    version = self.slot.version(),
                    "dataset refresh failed, keeping previous index"
                );
                self.set_state(RefreshState::Idle);
                false
            }
        }
    }

    /// Spawn the periodic refresh loop.
    ///
    /// The first tick is consumed immediately; the caller runs the startup
    /// refresh itself. The loop exits once `shutdown` reads `true`.
    pub fn start(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tracing::info!(interval_secs = self.interval.as_secs(), "starting dataset refresher");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        tracing::info!("refreshing geo datasets");
                        self.refresh_and_swap().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("dataset refresher stopped");
        })
    }

    async fn fetch_and_build(&self) -> Result<GeoIndex, RefreshError> {
        self.set_state(RefreshState::Fetching);
        let fetched = tokio::try_join!(
            self.source.fetch_ip_ranges(),
            self.source.fetch_geosite_cn_list()
        );
        let (ip_data, geosite_data) = match fetched {
            Ok(data) => data,
            Err(e) => return Err(self.fail(e)),
        };
        tracing::debug!(
            ip_bytes = ip_data.len(),
            geosite_bytes = geosite_data.len(),
            "datasets downloaded"
        );

        self.set_state(RefreshState::Building);
        let built = tokio::task::spawn_blocking(move || GeoIndex::build(&ip_data, &geosite_data))
            .await
            .unwrap_or_else(|e| Err(RefreshError::ParseFailed(format!("index build aborted: {}", e))));

        built.map_err(|e| self.fail(e))
    }

    fn fail(&self, error: RefreshError) -> RefreshError {
        self.set_state(RefreshState::Failed);
        *self.last_error.lock() = Some(error.clone());
        error
    }

    fn set_state(&self, state: RefreshState) {
        *self.state.lock() = state;
    }
}
