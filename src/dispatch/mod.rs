//! Notification dispatch.
//!
//! The monitor hands a `Decision`, the newest local reading and some
//! read-only context to a `Dispatcher`, and only learns whether delivery
//! succeeded. How artifacts are rendered and posted is the business of the
//! channels (and the external tools that consume the outbox).

pub mod outbox;
pub mod webhook;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::archive::HistoricalLevel;
use crate::model::{Decision, Reading, Severity};
use crate::risk::StreetRisk;

pub use outbox::OutboxChannel;
pub use webhook::WebhookChannel;

/// Read-only facts gathered alongside the decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchContext {
    /// Last-step label of the local station, e.g. `rising (+12cm)`.
    pub trend_label: String,
    pub receding: bool,
    pub stale: bool,
    /// The active notification cap was reached; the poster should clear the
    /// oldest artifacts before publishing.
    pub cleanup_requested: bool,
    pub upstream_short_delta_cm: Option<f64>,
    pub upstream_long_velocity_cm_h: Option<f64>,
    pub streets: Vec<StreetRisk>,
    pub history: Vec<HistoricalLevel>,
}

pub trait Dispatcher {
    /// True when the notification reached every channel that had to get it.
    fn dispatch(&self, decision: &Decision, reading: &Reading, context: &DispatchContext) -> bool;
}

// ---------------------------------------------------------------------------
// Channels
// ---------------------------------------------------------------------------

/// What a channel receives; serialised as-is by the outbox and webhook.
#[derive(Debug, Serialize)]
pub struct Notification<'a> {
    pub created_at: DateTime<Utc>,
    pub decision: &'a Decision,
    pub reading: &'a Reading,
    pub context: &'a DispatchContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    Sent,
    /// The channel does not take this severity.
    Skipped,
    Failed(String),
}

pub trait NotificationChannel {
    fn name(&self) -> &str;

    fn min_severity(&self) -> Severity {
        Severity::Routine
    }

    /// A failing required channel fails the whole dispatch.
    fn required(&self) -> bool;

    fn send(&self, notification: &Notification<'_>) -> SendResult;
}

/// Runs every channel in order. Optional channels are best effort.
#[derive(Default)]
pub struct ChannelDispatcher {
    channels: Vec<Box<dyn NotificationChannel>>,
}

impl ChannelDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Box<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    /// Send to each channel and collect the per-channel outcome.
    pub fn send_all(&self, notification: &Notification<'_>) -> Vec<(String, bool, SendResult)> {
        self.channels
            .iter()
            .map(|channel| {
                let result = if notification.decision.severity < channel.min_severity() {
                    SendResult::Skipped
                } else {
                    channel.send(notification)
                };
                (channel.name().to_string(), channel.required(), result)
            })
            .collect()
    }
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, decision: &Decision, reading: &Reading, context: &DispatchContext) -> bool {
        let notification = Notification {
            created_at: Utc::now(),
            decision,
            reading,
            context,
        };

        let mut delivered = true;
        for (name, required, result) in self.send_all(&notification) {
            match result {
                SendResult::Sent => {
                    info!(channel = %name, severity = %decision.severity, "notification sent")
                }
                SendResult::Skipped => {
                    debug!(channel = %name, severity = %decision.severity, "channel skipped")
                }
                SendResult::Failed(reason) if required => {
                    error!(channel = %name, %reason, "required channel failed");
                    delivered = false;
                }
                SendResult::Failed(reason) => {
                    warn!(channel = %name, %reason, "optional channel failed")
                }
            }
        }
        delivered
    }
}
