// rule-engine-broker/src/lib.rs
// ============================================================================
// Module: Action / Notification Bridge (C10)
// Description: Persists device-state instances, publishes on the shared
//              pub/sub channel, and fans out to delivery channels (spec
//              §4.10).
// Purpose: The one crate downstream of C7's `ActionCommand`s; C6 depends on
//          it only through the `DeliveryBridge` trait seam (spec §9).
// Dependencies: rule-engine-core, rule-engine-cache, rule-engine-store-sqlite,
//               redis, rand
// ============================================================================

//! ## Overview
//! [`NotificationBridge`] is the concrete [`rule_engine_core::DeliveryBridge`]
//! C6 invokes after a chain executes successfully. For each
//! [`rule_engine_core::ActionCommand`] it: persists a
//! [`rule_engine_core::DeviceStateInstance`], publishes a [`Notification`]
//! on [`NOTIFICATION_TOPIC`], and fans it out through a [`ChannelRegistry`].
//! Only the persistence step can fail this call (spec §4.10); publish and
//! channel delivery failures are logged and swallowed.
//!
//! **[AMBIENT]** Actually opening a socket, MQTT, or CoAP connection is out
//! of scope (spec.md Non-goals name the channel implementations, not the
//! trait boundary); [`LogChannel`] is the one concrete channel shipped here,
//! grounded on `decision-gate-broker`'s `LogSink`.

mod bridge;
mod channel;
mod error;
mod notification;

pub use crate::bridge::NOTIFICATION_TOPIC;
pub use crate::bridge::NotificationBridge;
pub use crate::channel::ChannelRegistry;
pub use crate::channel::DeliveryChannel;
pub use crate::channel::LogChannel;
pub use crate::error::ChannelError;
pub use crate::notification::Notification;
pub use crate::notification::Protocol;
pub use crate::notification::Severity;
pub use crate::notification::is_alarm_state_name;
pub use crate::notification::is_critical_device;
pub use crate::notification::is_significant_change;
