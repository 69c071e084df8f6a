// rule-engine-broker/src/error.rs
// ============================================================================
// Module: Broker Errors
// Description: Failures a delivery channel may surface (spec §4.10).
// Purpose: Kept distinct from `rule_engine_core::BridgeError`, which only
//          covers the persistence step; a channel error never reaches the
//          caller of `apply_actions`, only this crate's own log lines.
// Dependencies: thiserror
// ============================================================================

use thiserror::Error;

/// Errors one [`crate::channel::DeliveryChannel`] may surface. Always
/// swallowed by [`crate::channel::ChannelRegistry`] (spec §4.10: "failures
/// in one channel MUST NOT fail the bridge").
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel failed to send the notification.
    #[error("channel {channel} failed to send: {reason}")]
    SendFailed {
        /// The channel's registered name.
        channel: String,
        /// The underlying failure reason.
        reason: String,
    },
}
