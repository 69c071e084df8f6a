// rule-engine-broker/src/bridge.rs
// ============================================================================
// Module: Notification Bridge (C10)
// Description: Persists device-state instances, publishes on the shared
//              pub/sub channel, and fans out to delivery channels for each
//              action C7 emits (spec §4.10).
// Purpose: The sole `DeliveryBridge` implementation C6 depends on through
//          the trait seam (spec §9).
// Dependencies: rule-engine-core, rule-engine-cache, rule-engine-store-sqlite
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use rule_engine_cache::CacheHandle;
use rule_engine_core::ActionCommand;
use rule_engine_core::BridgeError;
use rule_engine_core::DeliveryBridge;
use rule_engine_core::DeviceStateInstance;
use rule_engine_core::DeviceStateInstanceId;
use rule_engine_core::InitiatedBy;
use rule_engine_core::RuleChainId;
use rule_engine_store_sqlite::SqliteStore;
use time::OffsetDateTime;

use crate::channel::ChannelRegistry;
use crate::notification::Notification;
use crate::notification::Severity;
use crate::notification::is_alarm_state_name;
use crate::notification::is_critical_device;
use crate::notification::is_significant_change;

/// The well-known pub/sub topic C10 publishes notifications on (spec §4.10).
pub const NOTIFICATION_TOPIC: &str = "rule-engine:notifications";

fn generate_instance_id() -> DeviceStateInstanceId {
    let now = OffsetDateTime::now_utc();
    let suffix: u64 = rand::thread_rng().r#gen();
    DeviceStateInstanceId::new(format!("dsi-{}-{suffix:016x}", now.unix_timestamp_nanos()))
}

/// Implements [`DeliveryBridge`]: persists, publishes, and fans out every
/// action C7 emits for one rule-chain execution (spec §4.10).
pub struct NotificationBridge {
    store: Arc<SqliteStore>,
    cache: CacheHandle,
    channels: Arc<ChannelRegistry>,
}

impl NotificationBridge {
    /// Builds a bridge over a store, the shared cache handle (used as a
    /// publisher, never a subscriber — spec §4.10), and a channel registry.
    #[must_use]
    pub fn new(store: Arc<SqliteStore>, cache: CacheHandle, channels: Arc<ChannelRegistry>) -> Self {
        Self {
            store,
            cache,
            channels,
        }
    }

    async fn apply_one(&self, rule_chain_id: &RuleChainId, action: &ActionCommand) -> Result<Notification, BridgeError> {
        let store = Arc::clone(&self.store);
        let device_id = action.device_uuid.clone();
        let state_name = action.state_name.clone();
        let previous = tokio::task::spawn_blocking(move || store.latest_device_state(&device_id, state_name.as_str()))
            .await
            .map_err(|err| BridgeError::Persistence(err.to_string()))?
            .map_err(|err| BridgeError::Persistence(err.to_string()))?;

        let metadata = previous.as_ref().map_or(serde_json::Value::Null, |instance| instance.metadata.clone());
        let significant = is_significant_change(previous.as_ref().map(|instance| &instance.value), &action.value);
        let severity = if is_critical_device(&metadata) || is_alarm_state_name(action.state_name.as_str()) || significant {
            Severity::High
        } else {
            Severity::Normal
        };

        let now = OffsetDateTime::now_utc();
        let instance = DeviceStateInstance {
            id: generate_instance_id(),
            device_id: action.device_uuid.clone(),
            state_name: action.state_name.clone(),
            value: action.value.clone(),
            initiated_by: InitiatedBy::RuleChain,
            metadata,
            recorded_at: now,
        };

        let store = Arc::clone(&self.store);
        let persisted = instance.clone();
        tokio::task::spawn_blocking(move || store.insert_device_state_instance(&persisted))
            .await
            .map_err(|err| BridgeError::Persistence(err.to_string()))?
            .map_err(|err| BridgeError::Persistence(err.to_string()))?;

        Ok(Notification::for_device_state_change(rule_chain_id, &action.device_uuid, &action.state_name, &action.value, severity, now))
    }

    async fn publish(&self, notification: &Notification) {
        let payload = match serde_json::to_string(notification) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize notification for publish");
                return;
            }
        };
        let mut conn = self.cache.manager();
        let result: Result<(), redis::RedisError> = redis::cmd("PUBLISH").arg(NOTIFICATION_TOPIC).arg(payload).query_async(&mut conn).await;
        if let Err(err) = result {
            tracing::warn!(error = %err, "notification publish failed");
        }
    }
}

#[async_trait]
impl DeliveryBridge for NotificationBridge {
    async fn apply_actions(&self, rule_chain_id: &RuleChainId, actions: &[ActionCommand]) -> Result<(), BridgeError> {
        for action in actions {
            let notification = self.apply_one(rule_chain_id, action).await?;
            self.publish(&notification).await;
            self.channels.fan_out(&notification);
        }
        Ok(())
    }
}
