// rule-engine-broker/src/channel.rs
// ============================================================================
// Module: Delivery Channels
// Description: The channel trait boundary, a log reference implementation,
//              and the fan-out registry (spec §4.10).
// Purpose: Each channel is a pure send over a common envelope; the registry
//          isolates one channel's failure from the rest, grounded on
//          `decision-gate-broker`'s `Sink` trait and its composite
//          dispatcher.
// Dependencies: rule-engine-core (via crate::notification), parking_lot, std
// ============================================================================

//! ## Overview
//! [`DeliveryChannel`] mirrors the shape of `decision_gate_broker::Sink`:
//! one synchronous `send` call per notification, no shared mutable state
//! beyond what the implementation keeps privately. Actually opening a
//! socket, MQTT, or CoAP connection is out of scope (spec.md Non-goals);
//! [`LogChannel`] is the one concrete channel this crate ships, mirroring
//! `decision_gate_broker::LogSink`'s behavior of writing one JSON record per
//! delivery.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use parking_lot::Mutex;

use crate::error::ChannelError;
use crate::notification::Notification;

/// Delivers one notification to a concrete channel (spec §4.10: "a pure
/// send function over a common envelope").
pub trait DeliveryChannel: Send + Sync {
    /// The channel's registered name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Sends the notification.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError`] when the send fails. The caller
    /// ([`ChannelRegistry`]) never lets this fail the bridge.
    fn send(&self, notification: &Notification) -> Result<(), ChannelError>;
}

/// Writes one JSON line per notification to a shared writer (spec §4.10;
/// same shape as `decision_gate_broker::LogSink`).
pub struct LogChannel<W> {
    name: String,
    writer: Mutex<W>,
    sent: AtomicU64,
}

impl<W: std::io::Write + Send> LogChannel<W> {
    /// Builds a log channel named `"log"`.
    pub fn new(writer: W) -> Self {
        Self::with_name(writer, "log")
    }

    /// Builds a log channel with a custom name.
    pub fn with_name(writer: W, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            writer: Mutex::new(writer),
            sent: AtomicU64::new(0),
        }
    }
}

impl<W: std::io::Write + Send> DeliveryChannel for LogChannel<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, notification: &Notification) -> Result<(), ChannelError> {
        let record = serde_json::to_string(notification).map_err(|err| ChannelError::SendFailed {
            channel: self.name.clone(),
            reason: err.to_string(),
        })?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{record}").map_err(|err| ChannelError::SendFailed {
            channel: self.name.clone(),
            reason: err.to_string(),
        })?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Fans a notification out to every registered channel, isolating each
/// channel's failure (spec §4.10: "failures in one channel MUST NOT fail
/// the bridge").
#[derive(Default)]
pub struct ChannelRegistry {
    channels: Vec<Box<dyn DeliveryChannel>>,
}

impl ChannelRegistry {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a channel, consuming the builder.
    #[must_use]
    pub fn with_channel(mut self, channel: impl DeliveryChannel + 'static) -> Self {
        self.channels.push(Box::new(channel));
        self
    }

    /// Sends the notification to every registered channel, logging and
    /// continuing past any individual failure.
    pub fn fan_out(&self, notification: &Notification) {
        for channel in &self.channels {
            if let Err(err) = channel.send(notification) {
                tracing::warn!(channel = channel.name(), error = %err, "delivery channel failed, continuing");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rule_engine_core::OriginatorId;
    use rule_engine_core::RuleChainId;
    use rule_engine_core::VariableName;
    use time::OffsetDateTime;

    use super::*;
    use crate::notification::Severity;

    struct FailingChannel;

    impl DeliveryChannel for FailingChannel {
        fn name(&self) -> &str {
            "failing"
        }

        fn send(&self, _notification: &Notification) -> Result<(), ChannelError> {
            Err(ChannelError::SendFailed {
                channel: "failing".to_string(),
                reason: "always fails".to_string(),
            })
        }
    }

    fn sample_notification() -> Notification {
        Notification::for_device_state_change(
            &RuleChainId::new("chain-1"),
            &OriginatorId::new("device-1"),
            &VariableName::new("power"),
            &serde_json::json!(true),
            Severity::Normal,
            OffsetDateTime::now_utc(),
        )
    }

    #[test]
    fn log_channel_writes_one_line_per_notification() {
        let buffer: Vec<u8> = Vec::new();
        let channel = LogChannel::new(buffer);
        channel.send(&sample_notification()).expect("send");
        channel.send(&sample_notification()).expect("send");
        let lines = channel.writer.lock();
        let text = String::from_utf8_lossy(&lines);
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn registry_isolates_one_channel_failure_from_others() {
        let buffer: Vec<u8> = Vec::new();
        let registry = ChannelRegistry::new().with_channel(FailingChannel).with_channel(LogChannel::new(buffer));
        // Must not panic even though the first channel always fails.
        registry.fan_out(&sample_notification());
    }
}
