//! The publication orchestrator: classifies decoded readings, announces
//! newly seen device/topic pairs to Home Assistant, and publishes the state
//! payload.

use crate::config::GatewayConfig;
use crate::discovery::build_descriptors;
use bluez_async::MacAddress;
use btadvert::bthome::Reading;
use eyre::Report;
use rumqttc::{AsyncClient, QoS};
use serde_json::{json, Map, Value};
use std::collections::HashSet;

/// Remembers which device/topic pairs have already had their discovery
/// messages published in the current scan session.
///
/// A descriptor is announced at most once per key per session; the set only
/// grows until [`reset`](DiscoveryCache::reset) starts a new session.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    announced: HashSet<String>,
}

impl DiscoveryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_announce(&self, key: &str) -> bool {
        !self.announced.contains(key)
    }

    pub fn mark_announced(&mut self, key: String) {
        self.announced.insert(key);
    }

    pub fn reset(&mut self) {
        self.announced.clear();
    }
}

#[derive(Debug)]
pub struct Bridge {
    client: AsyncClient,
    state_prefix: String,
    discovery_prefix: String,
    src: Option<String>,
    cache: DiscoveryCache,
}

impl Bridge {
    pub fn new(client: AsyncClient, config: &GatewayConfig) -> Self {
        Self {
            client,
            state_prefix: config.state_prefix.clone(),
            discovery_prefix: config.discovery_prefix.clone(),
            src: config.src.clone(),
            cache: DiscoveryCache::new(),
        }
    }

    /// Forgets all announced devices. Must be called whenever the scan
    /// session restarts, so a fresh session re-announces them.
    pub fn reset(&mut self) {
        self.cache.reset();
    }

    /// Publishes one decoded advertisement.
    ///
    /// Discovery messages go out first (retained, at-least-once) if this
    /// device/topic pair has not been announced in the current session; the
    /// state payload is always published afterwards, non-retained and
    /// fire-and-forget.
    pub async fn report(
        &mut self,
        mac_address: &MacAddress,
        rssi: i16,
        reading: Reading,
    ) -> Result<(), Report> {
        let Some(suffix) = reading.topic_suffix() else {
            return Ok(());
        };
        let address = mac_address.to_string().replace(':', "");
        let state_topic = format!("{}{}/{}", self.state_prefix, address, suffix);
        let key = format!("{address}{suffix}");

        if self.cache.should_announce(&key) {
            for descriptor in build_descriptors(
                &self.discovery_prefix,
                &address,
                suffix,
                &state_topic,
                &reading,
            ) {
                let body = serde_json::to_string(&descriptor.payload)?;
                self.client
                    .publish(descriptor.topic, QoS::AtLeastOnce, true, body)
                    .await?;
            }
            self.cache.mark_announced(key);
        }

        println!("{mac_address} {reading} -> {state_topic}");
        let body = serde_json::to_string(&self.state_payload(&reading, rssi))?;
        self.client
            .publish(state_topic, QoS::AtMostOnce, false, body)
            .await?;
        Ok(())
    }

    fn state_payload(&self, reading: &Reading, rssi: i16) -> Value {
        let mut payload = Map::new();
        for (field, value) in reading.iter() {
            payload.insert(field.name().to_owned(), json!(value));
        }
        payload.insert("rssi".to_owned(), json!(rssi));
        if let Some(src) = &self.src {
            payload.insert("src".to_owned(), json!(src));
        }
        Value::Object(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_once_per_key() {
        let mut cache = DiscoveryCache::new();
        assert!(cache.should_announce("C73430352819sensor"));
        cache.mark_announced("C73430352819sensor".to_owned());
        assert!(!cache.should_announce("C73430352819sensor"));
    }

    #[test]
    fn different_topic_same_device_announces_again() {
        let mut cache = DiscoveryCache::new();
        cache.mark_announced("C73430352819sensor".to_owned());
        assert!(cache.should_announce("C73430352819battery"));
    }

    #[test]
    fn reset_forgets_announcements() {
        let mut cache = DiscoveryCache::new();
        cache.mark_announced("C73430352819sensor".to_owned());
        cache.reset();
        assert!(cache.should_announce("C73430352819sensor"));
    }
}
