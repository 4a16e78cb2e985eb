//! Connection supervisor
//!
//! [`DeviceLink`] drives the transport through the reconnect loop, owns
//! the announce protocol (last-will registration, online and adoption
//! announcements, config/command subscriptions) and fans inbound messages
//! out to the registered handlers. The whole thing is advanced by a
//! single periodic [`DeviceLink::tick`] from the device main loop; there
//! is no internal concurrency.

use std::time::Instant;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ConfigSnapshot, DeviceConfig};
use crate::connection::ConnectionState;
use crate::dispatch::{self, MessageClass};
use crate::display::ActivityIndicator;
use crate::topics::TopicCategory;
use crate::transport::{ConnectRequest, Transport, Will};

/// QoS used when registering the last-will with the broker.
const LWT_QOS: u8 = 0;

type PayloadHandler = Box<dyn FnMut(&Value)>;
type EventHandler = Box<dyn FnMut()>;

/// Connection supervisor over a [`Transport`].
///
/// Handler slots hold at most one handler per event kind; registering
/// again replaces the previous one.
pub struct DeviceLink<T: Transport> {
    config: DeviceConfig,
    transport: T,
    state: ConnectionState,
    on_config: Option<PayloadHandler>,
    on_command: Option<PayloadHandler>,
    on_connected: Option<EventHandler>,
    on_disconnected: Option<EventHandler>,
    indicator: Option<Box<dyn ActivityIndicator>>,
}

impl<T: Transport> DeviceLink<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DeviceConfig::new())
    }

    pub fn with_config(transport: T, config: DeviceConfig) -> Self {
        Self {
            config,
            transport,
            state: ConnectionState::startup(),
            on_config: None,
            on_command: None,
            on_connected: None,
            on_disconnected: None,
            indicator: None,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Register the handler for inbound configuration documents.
    pub fn on_config(&mut self, handler: impl FnMut(&Value) + 'static) {
        self.on_config = Some(Box::new(handler));
    }

    /// Register the handler for inbound commands.
    pub fn on_command(&mut self, handler: impl FnMut(&Value) + 'static) {
        self.on_command = Some(Box::new(handler));
    }

    /// Register the handler fired after a successful connect sequence.
    pub fn on_connected(&mut self, handler: impl FnMut() + 'static) {
        self.on_connected = Some(Box::new(handler));
    }

    /// Register the handler fired on each failed or lost connection.
    pub fn on_disconnected(&mut self, handler: impl FnMut() + 'static) {
        self.on_disconnected = Some(Box::new(handler));
    }

    /// Attach the status indicator.
    pub fn set_indicator(&mut self, indicator: impl ActivityIndicator + 'static) {
        self.indicator = Some(Box::new(indicator));
        self.show_topic();
    }

    pub fn set_broker(&mut self, host: &str, port: u16) {
        self.config.set_broker(host, port);
    }

    pub fn set_client_id(&mut self, id: &str) -> Result<(), ConfigError> {
        self.config.set_client_id(id)?;
        self.show_topic();
        Ok(())
    }

    pub fn set_client_id_from_mac(
        &mut self,
        device_type: &str,
        mac: [u8; 6],
    ) -> Result<(), ConfigError> {
        self.config.set_client_id_from_mac(device_type, mac)?;
        self.show_topic();
        Ok(())
    }

    pub fn set_auth(&mut self, username: Option<&str>, password: Option<&str>) {
        self.config.set_auth(username, password);
    }

    pub fn set_topic_prefix(&mut self, prefix: Option<&str>) {
        self.config.set_topic_prefix(prefix);
        self.show_topic();
    }

    pub fn set_topic_suffix(&mut self, suffix: Option<&str>) {
        self.config.set_topic_suffix(suffix);
        self.show_topic();
    }

    /// Apply a bulk configuration document (see [`DeviceConfig::apply`]).
    pub fn apply_config(&mut self, doc: &Value) {
        self.config.apply(doc);
        self.show_topic();
    }

    /// Diagnostic snapshot of the configuration and derived topics.
    pub fn snapshot(&self) -> ConfigSnapshot {
        self.config.snapshot()
    }

    /// Drive the connection lifecycle. Call periodically from the device
    /// main loop.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// Tick with an explicit clock, the testable entry point.
    pub fn tick_at(&mut self, now: Instant) {
        match self.state {
            ConnectionState::Disconnected => {}
            ConnectionState::Connected { .. } => self.service(now),
            ConnectionState::Connecting { .. } => self.try_connect(now),
        }
    }

    /// Abandon the current session and retry on the next tick without
    /// any backoff delay.
    pub fn reconnect(&mut self) {
        self.transport.disconnect();
        self.state = ConnectionState::startup();
    }

    /// Leave the reconnect loop entirely until [`DeviceLink::reconnect`]
    /// is called.
    pub fn disconnect(&mut self) {
        self.transport.disconnect();
        self.state = ConnectionState::Disconnected;
    }

    /// Hand an inbound message to the dispatcher. `tick` drains the
    /// transport queue through here; transports that deliver messages via
    /// an external callback can call it directly.
    pub fn receive(&mut self, topic: &str, payload: &[u8]) {
        if let Some(indicator) = self.indicator.as_mut() {
            indicator.message_received();
        }

        if payload.is_empty() {
            debug!(topic, "empty payload, ignored");
            return;
        }

        let value = match dispatch::decode(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(topic, error = %err, "undecodable payload, dropped");
                return;
            }
        };

        let class = dispatch::classify(topic, self.config.topic_prefix());
        let slot = match class {
            MessageClass::Config => &mut self.on_config,
            MessageClass::Command => &mut self.on_command,
            MessageClass::Unknown => {
                warn!(topic, "unroutable topic, dropped");
                return;
            }
        };
        let Some(handler) = slot.as_mut() else {
            debug!(topic, ?class, "no handler registered, dropped");
            return;
        };
        for item in dispatch::batch_items(value) {
            handler(&item);
        }
    }

    /// Publish a JSON document to an arbitrary topic. Returns false
    /// without touching the transport while the link is down; there is no
    /// queueing, the caller's periodic republish is the recovery path.
    pub fn publish(&mut self, topic: &str, payload: &Value, retained: bool) -> bool {
        if !self.state.is_connected() {
            debug!(topic, "publish skipped while disconnected");
            return false;
        }
        let bytes = payload.to_string().into_bytes();
        let sent = self.transport.publish(topic, &bytes, retained);
        if sent {
            if let Some(indicator) = self.indicator.as_mut() {
                indicator.message_sent();
            }
        }
        sent
    }

    /// Publish a status report (not retained).
    pub fn publish_status(&mut self, payload: &Value) -> bool {
        self.publish_category(TopicCategory::Status, payload, false)
    }

    /// Publish telemetry (not retained).
    pub fn publish_telemetry(&mut self, payload: &Value) -> bool {
        self.publish_category(TopicCategory::Telemetry, payload, false)
    }

    /// Publish the adoption announcement (retained) for discovery tooling.
    pub fn publish_adopt(&mut self, payload: &Value) -> bool {
        let Some(topic) = self.config.topics().map(|ns| ns.adopt()) else {
            debug!("publish skipped: no client id configured");
            return false;
        };
        self.publish(&topic, payload, true)
    }

    fn publish_category(&mut self, category: TopicCategory, payload: &Value, retained: bool) -> bool {
        let Some(topic) = self.config.topics().map(|ns| ns.topic(category)) else {
            debug!("publish skipped: no client id configured");
            return false;
        };
        self.publish(&topic, payload, retained)
    }

    /// Connected-state tick: service the transport, drain inbound traffic
    /// and watch for a dropped session.
    fn service(&mut self, now: Instant) {
        if self.transport.poll() {
            self.state.refresh(now);
            self.drain_inbound();
        } else {
            warn!("connection lost, scheduling reconnect");
            self.state.record_drop(now);
            self.fire_disconnected();
        }
    }

    /// Connecting-state tick: wait out the backoff, then attempt the full
    /// connect sequence.
    fn try_connect(&mut self, now: Instant) {
        if self.transport.connected() {
            // The transport came back on its own; nothing to renegotiate.
            self.state.record_success(now);
            return;
        }
        if !self.state.attempt_due(now) {
            return;
        }

        let Some(ns) = self.config.topics() else {
            debug!("connect skipped: no client id configured");
            self.state.record_failure(now);
            return;
        };
        let config_topic = ns.config();
        let command_topic = ns.command();
        let status_topic = ns.status();
        let lwt_topic = ns.lwt();

        let Some(broker) = self.config.broker().map(str::to_string) else {
            debug!("connect skipped: no broker configured");
            self.state.record_failure(now);
            return;
        };
        let port = self.config.port();

        info!(broker = %broker, port, "connecting to broker");
        self.transport.set_server(&broker, port);

        let offline = lwt_payload(false);
        let request = ConnectRequest {
            client_id: self.config.client_id(),
            credentials: self.config.credentials(),
            will: Will {
                topic: &lwt_topic,
                payload: &offline,
                qos: LWT_QOS,
                retain: true,
            },
        };

        if self.transport.connect(&request) {
            self.transport.subscribe(&config_topic);
            self.transport.subscribe(&command_topic);
            self.transport.publish(&lwt_topic, &lwt_payload(true), true);
            info!(
                config = %config_topic,
                command = %command_topic,
                status = %status_topic,
                "connected, namespace active"
            );
            self.state.record_success(now);
            self.fire_connected();
        } else {
            self.state.record_failure(now);
            let delay = ConnectionState::retry_delay(self.state.backoff_level());
            warn!(
                status = self.transport.status_code(),
                retry_in_secs = delay.as_secs(),
                "connect failed"
            );
            self.fire_disconnected();
        }
    }

    fn drain_inbound(&mut self) {
        while let Some(message) = self.transport.next_message() {
            self.receive(&message.topic, &message.payload);
        }
    }

    fn fire_connected(&mut self) {
        if let Some(handler) = self.on_connected.as_mut() {
            handler();
        }
    }

    fn fire_disconnected(&mut self) {
        if let Some(handler) = self.on_disconnected.as_mut() {
            handler();
        }
    }

    fn show_topic(&mut self) {
        if let (Some(indicator), Some(ns)) = (self.indicator.as_mut(), self.config.topics()) {
            indicator.topic_changed(&ns.wildcard());
        }
    }
}

/// Last-will / liveness payload: `{"online": <bool>}`.
fn lwt_payload(online: bool) -> Vec<u8> {
    json!({ "online": online }).to_string().into_bytes()
}
