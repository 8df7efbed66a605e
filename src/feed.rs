use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use crate::article::Article;
use crate::config::SearchConfig;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::source::{FeedError, HeadlineRequest, HeadlineSource};

pub const CANCELLED_MESSAGE: &str = "Request was cancelled.";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedState {
    pub articles: Vec<Article>,
    pub phase: FeedPhase,
    /// Last submitted query, empty in headline mode
    pub query: String,
    pub connected: bool,
}

impl FeedState {
    pub fn loading(&self) -> bool {
        self.phase == FeedPhase::Loading
    }

    pub fn error(&self) -> Option<&str> {
        match &self.phase {
            FeedPhase::Failed(message) => Some(message),
            _ => None,
        }
    }
}

impl Serialize for FeedState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FeedState", 5)?;
        state.serialize_field("articles", &self.articles)?;
        state.serialize_field("loading", &self.loading())?;
        state.serialize_field("error", &self.error())?;
        state.serialize_field("query", &self.query)?;
        state.serialize_field("connected", &self.connected)?;
        state.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response replaced the article list
    Applied(usize),
    /// A newer fetch was issued before this one finished
    Superseded,
}

struct FeedInner {
    source: Arc<dyn HeadlineSource>,
    monitor: ConnectivityMonitor,
    state: watch::Sender<FeedState>,
    latest: AtomicU64,
    trim_queries: bool,
}

/// Owns the headline list and its fetch lifecycle.
///
/// Every fetch takes a ticket; a response is only applied while its ticket is
/// the latest one issued.
pub struct ArticleFeedController {
    inner: Arc<FeedInner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl ArticleFeedController {
    pub fn new(
        source: Arc<dyn HeadlineSource>,
        monitor: ConnectivityMonitor,
        search: &SearchConfig,
    ) -> Self {
        let initial = FeedState {
            connected: monitor.is_connected(),
            ..Default::default()
        };
        let (state, _) = watch::channel(initial);

        Self {
            inner: Arc::new(FeedInner {
                source,
                monitor,
                state,
                latest: AtomicU64::new(0),
                trim_queries: search.trim_queries,
            }),
            listener: Mutex::new(None),
        }
    }

    /// Subscribe to connectivity changes and load the initial headlines.
    ///
    /// The subscription lives until the controller is dropped or
    /// `initialize` is called again.
    pub async fn initialize(&self) -> Result<FetchOutcome, FeedError> {
        let mut subscription = self.inner.monitor.subscribe();
        let inner = self.inner.clone();

        let handle = tokio::spawn(async move {
            let mut fetches = JoinSet::new();
            let mut last_connected = subscription.initially_connected();
            loop {
                tokio::select! {
                    event = subscription.recv() => match event {
                        Some(event) => {
                            if inner.apply_connectivity(event, &mut last_connected) {
                                let inner = inner.clone();
                                fetches.spawn(async move {
                                    let _ = inner.fetch(None).await;
                                });
                            }
                        }
                        None => break,
                    },
                    Some(_) = fetches.join_next(), if !fetches.is_empty() => {}
                }
            }
        });

        if let Some(previous) = self.listener.lock().replace(handle) {
            previous.abort();
        }

        self.inner.fetch(None).await
    }

    pub async fn fetch(&self, query: Option<&str>) -> Result<FetchOutcome, FeedError> {
        self.inner.fetch(query).await
    }

    pub fn state(&self) -> FeedState {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every state change
    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.inner.state.subscribe()
    }
}

impl Drop for ArticleFeedController {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }
    }
}

impl FeedInner {
    /// Returns true when the event is a transition to connected.
    ///
    /// Transitions are tracked per listener in `last_connected`, since
    /// `fetch` may already have synced `FeedState::connected` from the monitor.
    fn apply_connectivity(&self, event: ConnectivityEvent, last_connected: &mut bool) -> bool {
        let was_connected = std::mem::replace(last_connected, event.is_connected);
        self.state.send_modify(|s| s.connected = event.is_connected);
        debug!(
            "Connectivity event: connected={} (was {})",
            event.is_connected, was_connected
        );
        event.is_connected && !was_connected
    }

    async fn fetch(&self, query: Option<&str>) -> Result<FetchOutcome, FeedError> {
        let request = HeadlineRequest::from_query(query, self.trim_queries);

        // Connectivity, ticket and phase are settled under the same lock as
        // `apply`, so an older request can never mark the feed as loading
        // after a newer one has finished.
        let mut ticket = 0;
        let mut connected = false;
        self.state.send_modify(|s| {
            connected = self.monitor.is_connected();
            ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
            s.connected = connected;
            if connected {
                s.phase = FeedPhase::Loading;
                s.query = request.query().unwrap_or_default().to_string();
            } else {
                s.phase = FeedPhase::Failed(FeedError::NoConnectivity.to_string());
            }
        });

        if !connected {
            warn!("Fetch skipped: no connectivity");
            return Err(FeedError::NoConnectivity);
        }

        let mut guard = LoadingGuard {
            inner: self,
            ticket,
            armed: true,
        };
        let result = self.source.fetch(&request).await;
        guard.armed = false;

        self.apply(ticket, result)
    }

    fn apply(
        &self,
        ticket: u64,
        result: Result<Vec<Article>, FeedError>,
    ) -> Result<FetchOutcome, FeedError> {
        let mut outcome = None;
        self.state.send_if_modified(|s| {
            if self.latest.load(Ordering::SeqCst) != ticket {
                return false;
            }
            outcome = Some(match result {
                Ok(articles) => {
                    let count = articles.len();
                    s.articles = articles;
                    s.phase = FeedPhase::Ready;
                    Ok(FetchOutcome::Applied(count))
                }
                Err(e) => {
                    s.phase = FeedPhase::Failed(e.to_string());
                    Err(e)
                }
            });
            true
        });

        match outcome {
            Some(Ok(outcome)) => {
                info!("Feed updated ({:?})", outcome);
                Ok(outcome)
            }
            Some(Err(e)) => {
                warn!("Feed fetch failed: {}", e);
                Err(e)
            }
            None => {
                debug!("Discarding response for superseded request {}", ticket);
                Ok(FetchOutcome::Superseded)
            }
        }
    }
}

/// Clears `Loading` if a fetch future is dropped before its response arrives.
struct LoadingGuard<'a> {
    inner: &'a FeedInner,
    ticket: u64,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let latest = &self.inner.latest;
        let ticket = self.ticket;
        self.inner.state.send_if_modified(|s| {
            if latest.load(Ordering::SeqCst) == ticket && s.phase == FeedPhase::Loading {
                s.phase = FeedPhase::Failed(CANCELLED_MESSAGE.to_string());
                true
            } else {
                false
            }
        });
    }
}
