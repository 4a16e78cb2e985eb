//! rumqttc-backed transport adapter
//!
//! Maps the [`Transport`] trait onto rumqttc's synchronous client. The
//! event loop is serviced in bounded slices from `poll`, so the adapter
//! never blocks a tick for longer than the drain timeout. Socket and TLS
//! details stay rumqttc's concern.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use rumqttc::{Client, ConnectReturnCode, Connection, Event, LastWill, MqttOptions, Packet, QoS};
use tracing::{debug, warn};

use super::{ConnectRequest, InboundMessage, Transport};

/// Status codes reported through [`Transport::status_code`].
pub const STATUS_CONNECTED: i32 = 0;
pub const STATUS_DISCONNECTED: i32 = -1;
pub const STATUS_CONNECTION_LOST: i32 = -3;
pub const STATUS_TIMEOUT: i32 = -4;
/// Broker refused the connection (bad credentials, identifier, ...).
pub const STATUS_REFUSED: i32 = 1;

/// How long a connect attempt waits for the broker's acknowledgement.
const CONNACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on the time one `poll` spends waiting for an event.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Upper bound on events handled per `poll` call.
const DRAIN_BUDGET: usize = 64;

/// Keep-alive advertised to the broker.
const KEEP_ALIVE: Duration = Duration::from_secs(30);

struct Session {
    client: Client,
    connection: Connection,
}

/// Synchronous rumqttc adapter. One instance owns at most one session;
/// a new connect attempt tears down whatever came before it.
pub struct RumqttTransport {
    server: Option<(String, u16)>,
    session: Option<Session>,
    inbound: VecDeque<InboundMessage>,
    connected: bool,
    status: i32,
}

impl RumqttTransport {
    pub fn new() -> Self {
        Self {
            server: None,
            session: None,
            inbound: VecDeque::new(),
            connected: false,
            status: STATUS_DISCONNECTED,
        }
    }
}

impl Default for RumqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn will_qos(qos: u8) -> QoS {
    match qos {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

impl Transport for RumqttTransport {
    fn set_server(&mut self, host: &str, port: u16) {
        self.server = Some((host.to_string(), port));
    }

    fn connect(&mut self, request: &ConnectRequest<'_>) -> bool {
        let Some((host, port)) = self.server.clone() else {
            warn!("connect attempted without a broker address");
            return false;
        };

        // Drop any previous session before negotiating a new one.
        self.session = None;
        self.connected = false;

        let mut options = MqttOptions::new(request.client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some((username, password)) = request.credentials {
            options.set_credentials(username, password);
        }
        options.set_last_will(LastWill::new(
            request.will.topic,
            request.will.payload.to_vec(),
            will_qos(request.will.qos),
            request.will.retain,
        ));

        let (client, mut connection) = Client::new(options, 16);

        // Only a ConnAck from the broker counts as success.
        let deadline = Instant::now() + CONNACK_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.status = STATUS_TIMEOUT;
                return false;
            }
            match connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    if ack.code == ConnectReturnCode::Success {
                        self.session = Some(Session { client, connection });
                        self.connected = true;
                        self.status = STATUS_CONNECTED;
                        return true;
                    }
                    warn!(code = ?ack.code, "broker refused connection");
                    self.status = STATUS_REFUSED;
                    return false;
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    debug!(error = %err, "connect attempt failed");
                    self.status = STATUS_CONNECTION_LOST;
                    return false;
                }
                Err(_) => {
                    self.status = STATUS_TIMEOUT;
                    return false;
                }
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.client.disconnect();
        }
        self.connected = false;
        self.status = STATUS_DISCONNECTED;
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn poll(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        for _ in 0..DRAIN_BUDGET {
            match session.connection.recv_timeout(DRAIN_TIMEOUT) {
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) => {
                    self.inbound.push_back(InboundMessage {
                        topic: publish.topic.clone(),
                        payload: publish.payload.to_vec(),
                    });
                }
                Ok(Ok(Event::Incoming(Packet::Disconnect))) => {
                    debug!("broker requested disconnect");
                    self.connected = false;
                    self.status = STATUS_DISCONNECTED;
                    break;
                }
                Ok(Ok(_)) => {}
                Ok(Err(err)) => {
                    debug!(error = %err, "session lost");
                    self.connected = false;
                    self.status = STATUS_CONNECTION_LOST;
                    break;
                }
                // Nothing pending this tick.
                Err(_) => break,
            }
        }

        if !self.connected {
            self.session = None;
        }
        self.connected
    }

    fn next_message(&mut self) -> Option<InboundMessage> {
        self.inbound.pop_front()
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        // Retained announcements ride QoS 1 so the broker holds them
        // across its own restarts; everything else is fire-and-forget.
        let qos = if retained {
            QoS::AtLeastOnce
        } else {
            QoS::AtMostOnce
        };
        match session.client.publish(topic, qos, retained, payload.to_vec()) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, topic, "publish failed");
                false
            }
        }
    }

    fn subscribe(&mut self, topic: &str) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        match session.client.subscribe(topic, QoS::AtMostOnce) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, topic, "subscribe failed");
                false
            }
        }
    }

    fn status_code(&self) -> i32 {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Will;

    fn request<'a>(will_topic: &'a str, payload: &'a [u8]) -> ConnectRequest<'a> {
        ConnectRequest {
            client_id: "dev1",
            credentials: None,
            will: Will {
                topic: will_topic,
                payload,
                qos: 0,
                retain: true,
            },
        }
    }

    #[test]
    fn starts_disconnected() {
        let transport = RumqttTransport::new();
        assert!(!transport.connected());
        assert_eq!(transport.status_code(), STATUS_DISCONNECTED);
    }

    #[test]
    fn connect_without_server_fails_fast() {
        let mut transport = RumqttTransport::new();
        let payload = br#"{"online":false}"#;
        assert!(!transport.connect(&request("stat/dev1/lwt", payload)));
        assert!(!transport.connected());
    }

    #[test]
    fn session_calls_fail_without_connection() {
        let mut transport = RumqttTransport::new();
        assert!(!transport.publish("stat/dev1", b"{}", false));
        assert!(!transport.subscribe("conf/dev1"));
        assert!(!transport.poll());
        assert!(transport.next_message().is_none());
    }

    #[test]
    fn will_qos_mapping() {
        assert_eq!(will_qos(0), QoS::AtMostOnce);
        assert_eq!(will_qos(1), QoS::AtLeastOnce);
        assert_eq!(will_qos(2), QoS::ExactlyOnce);
        assert_eq!(will_qos(9), QoS::AtMostOnce);
    }
}
