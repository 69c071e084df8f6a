// rule-engine-broker/src/notification.rs
// ============================================================================
// Module: Notification Payload & Significance
// Description: The notification envelope C10 publishes, and the rule that
//              decides whether a state change is significant (spec §4.10).
// Purpose: Keep the severity decision a pure function, testable without a
//          store or cache.
// Dependencies: serde, serde_json, time
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use rule_engine_core::OriginatorId;
use rule_engine_core::RuleChainId;
use rule_engine_core::VariableName;

/// State names treated as alarm conditions regardless of their value
/// (spec §4.10).
const ALARM_STATE_NAMES: [&str; 5] = ["error", "fault", "alarm", "emergency", "critical"];

/// A numeric change of more than this fraction of the previous value counts
/// as significant (spec §4.10: "a numeric delta > 50%").
const SIGNIFICANT_DELTA_FRACTION: f64 = 0.5;

/// The delivery channels a notification may be fanned out to (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// A process-local or LAN websocket push.
    Socket,
    /// MQTT publish.
    Mqtt,
    /// CoAP publish.
    Coap,
}

/// How urgently a notification should be treated (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A critical device, an alarm-named state, or a significant value change.
    High,
    /// Everything else.
    Normal,
}

/// The notification envelope published on the pub/sub channel and fanned
/// out to delivery channels (spec §4.10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// A short machine-readable kind, e.g. `"device-state-change"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable title.
    pub title: String,
    /// Human-readable body.
    pub message: String,
    /// Urgency.
    pub severity: Severity,
    /// The set of protocols this notification should be delivered over.
    pub protocols: Vec<Protocol>,
    /// When the notification was published.
    #[serde(with = "time::serde::rfc3339")]
    pub published_at: OffsetDateTime,
    /// Free-form structured metadata: rule chain, device, and state identity.
    pub metadata: serde_json::Value,
}

impl Notification {
    /// Builds the notification for one applied action (spec §4.10).
    #[must_use]
    pub fn for_device_state_change(
        rule_chain_id: &RuleChainId,
        device_id: &OriginatorId,
        state_name: &VariableName,
        value: &serde_json::Value,
        severity: Severity,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            kind: "device-state-change".to_string(),
            title: format!("{state_name} changed"),
            message: format!("device {device_id} set {state_name} = {value}"),
            severity,
            protocols: vec![Protocol::Socket, Protocol::Mqtt, Protocol::Coap],
            published_at: now,
            metadata: serde_json::json!({
                "ruleChainId": rule_chain_id.as_str(),
                "deviceId": device_id.as_str(),
                "stateName": state_name.as_str(),
            }),
        }
    }
}

/// Decides whether a device-state change is significant enough to raise
/// severity (spec §4.10): a numeric delta over 50%, or any change crossing
/// a `null`/boolean boundary. Treats a type change between two readings as
/// significant too, since that is a stronger boundary crossing than either
/// named case alone.
#[must_use]
pub fn is_significant_change(previous: Option<&serde_json::Value>, current: &serde_json::Value) -> bool {
    let Some(previous) = previous else {
        return true;
    };
    match (previous, current) {
        (serde_json::Value::Null, other) | (other, serde_json::Value::Null) => !other.is_null(),
        (serde_json::Value::Bool(a), serde_json::Value::Bool(b)) => a != b,
        (serde_json::Value::Number(a), serde_json::Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            if a == 0.0 {
                b != 0.0
            } else {
                ((b - a) / a).abs() > SIGNIFICANT_DELTA_FRACTION
            }
        }
        _ => previous != current,
    }
}

/// True when `state_name` names an alarm condition regardless of value
/// (spec §4.10).
#[must_use]
pub fn is_alarm_state_name(state_name: &str) -> bool {
    ALARM_STATE_NAMES.contains(&state_name)
}

/// True when device metadata flags the device as critical (spec §4.10),
/// inherited from the device's prior recorded instance.
#[must_use]
pub fn is_critical_device(metadata: &serde_json::Value) -> bool {
    metadata.get("critical").and_then(serde_json::Value::as_bool).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crossing_null_is_significant() {
        assert!(is_significant_change(None, &serde_json::json!(42)));
        assert!(is_significant_change(Some(&serde_json::Value::Null), &serde_json::json!(42)));
    }

    #[test]
    fn boolean_flip_is_significant() {
        assert!(is_significant_change(Some(&serde_json::json!(true)), &serde_json::json!(false)));
        assert!(!is_significant_change(Some(&serde_json::json!(true)), &serde_json::json!(true)));
    }

    #[test]
    fn numeric_delta_over_half_is_significant() {
        assert!(is_significant_change(Some(&serde_json::json!(100.0)), &serde_json::json!(40.0)));
        assert!(!is_significant_change(Some(&serde_json::json!(100.0)), &serde_json::json!(80.0)));
    }

    #[test]
    fn alarm_state_names_match_fixed_set() {
        assert!(is_alarm_state_name("alarm"));
        assert!(is_alarm_state_name("fault"));
        assert!(!is_alarm_state_name("power"));
    }

    #[test]
    fn critical_device_reads_metadata_flag() {
        assert!(is_critical_device(&serde_json::json!({"critical": true})));
        assert!(!is_critical_device(&serde_json::json!({"critical": false})));
        assert!(!is_critical_device(&serde_json::Value::Null));
    }
}
