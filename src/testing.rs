//! Test doubles for exercising the supervisor without a broker
//!
//! [`MockTransport`] records every interaction and exposes scripting
//! knobs (`connect_result`, `poll_result`, ...) so lifecycle scenarios
//! can be replayed deterministically.

use std::collections::VecDeque;

use crate::transport::{ConnectRequest, InboundMessage, Transport};

/// One recorded connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRecord {
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub will_topic: String,
    pub will_payload: Vec<u8>,
    pub will_qos: u8,
    pub will_retain: bool,
}

/// One recorded publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRecord {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retained: bool,
}

/// Scripted transport double.
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Outcome of the next connect attempts.
    pub connect_result: bool,
    /// Connectivity reported by subsequent polls.
    pub poll_result: bool,
    /// Outcome of publish calls.
    pub publish_result: bool,
    /// Outcome of subscribe calls.
    pub subscribe_result: bool,
    pub server: Option<(String, u16)>,
    pub connect_log: Vec<ConnectRecord>,
    pub subscriptions: Vec<String>,
    pub published: Vec<PublishRecord>,
    pub disconnect_calls: u32,
    pub poll_calls: u32,
    connected: bool,
    inbound: VecDeque<InboundMessage>,
}

impl MockTransport {
    /// A cooperative transport: everything succeeds.
    pub fn new() -> Self {
        Self {
            connect_result: true,
            poll_result: true,
            publish_result: true,
            subscribe_result: true,
            ..Default::default()
        }
    }

    /// A transport whose connect attempts all fail.
    pub fn refusing() -> Self {
        Self {
            connect_result: false,
            ..Self::new()
        }
    }

    /// Queue an inbound message for the next connected tick.
    pub fn push_inbound(&mut self, topic: &str, payload: &[u8]) {
        self.inbound.push_back(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Make the next poll report the session as lost.
    pub fn drop_connection(&mut self) {
        self.poll_result = false;
    }

    /// Let connects and polls succeed again.
    pub fn restore(&mut self) {
        self.connect_result = true;
        self.poll_result = true;
    }
}

impl Transport for MockTransport {
    fn set_server(&mut self, host: &str, port: u16) {
        self.server = Some((host.to_string(), port));
    }

    fn connect(&mut self, request: &ConnectRequest<'_>) -> bool {
        self.connect_log.push(ConnectRecord {
            client_id: request.client_id.to_string(),
            username: request.credentials.map(|(user, _)| user.to_string()),
            password: request.credentials.map(|(_, pass)| pass.to_string()),
            will_topic: request.will.topic.to_string(),
            will_payload: request.will.payload.to_vec(),
            will_qos: request.will.qos,
            will_retain: request.will.retain,
        });
        self.connected = self.connect_result;
        self.connect_result
    }

    fn disconnect(&mut self) {
        self.disconnect_calls += 1;
        self.connected = false;
    }

    fn connected(&self) -> bool {
        self.connected
    }

    fn poll(&mut self) -> bool {
        self.poll_calls += 1;
        if !self.poll_result {
            self.connected = false;
        }
        self.connected
    }

    fn next_message(&mut self) -> Option<InboundMessage> {
        self.inbound.pop_front()
    }

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> bool {
        self.published.push(PublishRecord {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            retained,
        });
        self.publish_result
    }

    fn subscribe(&mut self, topic: &str) -> bool {
        self.subscriptions.push(topic.to_string());
        self.subscribe_result
    }

    fn status_code(&self) -> i32 {
        if self.connected {
            0
        } else {
            -1
        }
    }
}
