use super::reconciler::{Reconciler, Reconciliation};
use crate::config::ReconcilerConfig;
use crate::domain::callback::SourceChannel;
use crate::error::{ReconcileError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

/// A raw redirect as received from one of the delivery channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub raw: String,
    pub channel: SourceChannel,
}

/// Answer for the web view's "should this navigation load?" hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    Block,
}

/// Fans the three delivery channels into a single queue.
///
/// Handles are cheap to clone so each channel can own one. Every event is
/// forwarded exactly once; suppressing repeats of the same logical redirect is
/// left to the reconciler's guard.
#[derive(Clone)]
pub struct DeliveryMultiplexer {
    sender: mpsc::UnboundedSender<Delivery>,
    initial_url_checked: Arc<AtomicBool>,
    provider_host: String,
    callback_scheme: String,
}

impl DeliveryMultiplexer {
    pub fn new(config: &ReconcilerConfig) -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let multiplexer = Self {
            sender,
            initial_url_checked: Arc::new(AtomicBool::new(false)),
            provider_host: config.provider_host.to_ascii_lowercase(),
            callback_scheme: config.callback_scheme.to_ascii_lowercase(),
        };
        (multiplexer, receiver)
    }

    /// OS deep-link event while the app is running. Links on any other scheme
    /// than the callback scheme are dropped.
    pub fn deep_link(&self, url: &str) -> Result<()> {
        self.forward_callback(url, SourceChannel::OsDeepLink)
    }

    /// URL the OS launched the app with. Only the first call is honoured; a
    /// warm start passes `None`.
    pub fn initial_url(&self, url: Option<&str>) -> Result<()> {
        if self.initial_url_checked.swap(true, Ordering::SeqCst) {
            debug!("Initial URL already inspected");
            return Ok(());
        }
        match url {
            Some(url) => self.forward_callback(url, SourceChannel::ColdStartInitialUrl),
            None => Ok(()),
        }
    }

    /// Decides whether the web view may load `url`, forwarding callback
    /// redirects instead of loading them.
    pub fn web_view_navigation(&self, url: &str) -> NavigationDecision {
        let Ok(parsed) = Url::parse(url) else {
            warn!(url, "Blocking unparsable web view navigation");
            return NavigationDecision::Block;
        };

        if self.is_callback(&parsed) {
            if let Err(e) = self.forward(url, SourceChannel::WebViewIntercept) {
                error!(error = %e, "Could not forward intercepted callback");
            }
            return NavigationDecision::Block;
        }

        if self.is_provider_page(&parsed) {
            return NavigationDecision::Allow;
        }

        debug!(url, "Blocking navigation outside the payment provider");
        NavigationDecision::Block
    }

    fn is_callback(&self, url: &Url) -> bool {
        url.scheme() == self.callback_scheme
    }

    fn forward_callback(&self, raw: &str, channel: SourceChannel) -> Result<()> {
        if Url::parse(raw).is_ok_and(|parsed| self.is_callback(&parsed)) {
            return self.forward(raw, channel);
        }
        debug!(url = raw, %channel, "Ignoring link outside the callback scheme");
        Ok(())
    }

    fn is_provider_page(&self, url: &Url) -> bool {
        if !matches!(url.scheme(), "https" | "http") {
            return false;
        }
        url.host_str().is_some_and(|host| {
            let host = host.to_ascii_lowercase();
            host == self.provider_host
                || host
                    .strip_suffix(&self.provider_host)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    fn forward(&self, raw: &str, channel: SourceChannel) -> Result<()> {
        debug!(%channel, "Forwarding callback delivery");
        self.sender
            .send(Delivery {
                raw: raw.to_string(),
                channel,
            })
            .map_err(|_| ReconcileError::ChannelClosed)
    }
}

/// Per-run tally of what the worker did with each delivery.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub presented: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub errors: usize,
}

/// Drains the delivery queue into the reconciler until every multiplexer
/// handle has been dropped.
pub async fn run_worker(
    reconciler: Arc<Reconciler>,
    mut receiver: mpsc::UnboundedReceiver<Delivery>,
) -> ReconcileStats {
    let mut stats = ReconcileStats::default();
    while let Some(delivery) = receiver.recv().await {
        match reconciler.handle_raw(&delivery.raw, delivery.channel).await {
            Ok(Reconciliation::Presented(_)) => stats.presented += 1,
            Ok(Reconciliation::Duplicate) => stats.duplicates += 1,
            Ok(Reconciliation::Malformed) => stats.malformed += 1,
            // Already logged by the reconciler.
            Err(_) => stats.errors += 1,
        }
    }
    stats
}

pub fn spawn_worker(
    reconciler: Arc<Reconciler>,
    receiver: mpsc::UnboundedReceiver<Delivery>,
) -> JoinHandle<ReconcileStats> {
    tokio::spawn(run_worker(reconciler, receiver))
}
