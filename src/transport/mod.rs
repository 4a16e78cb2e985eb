//! Transport collaborator interface
//!
//! The supervisor drives the broker session through this narrow trait so
//! the connection core never touches sockets. A production adapter backed
//! by rumqttc lives in [`rumqtt`]; tests use the scripted double in
//! [`crate::testing`].

pub mod rumqtt;

pub use rumqtt::RumqttTransport;

/// Last-will registration handed to the broker at connect time.
#[derive(Debug, Clone)]
pub struct Will<'a> {
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: u8,
    pub retain: bool,
}

/// Parameters for a single connect attempt.
#[derive(Debug, Clone)]
pub struct ConnectRequest<'a> {
    pub client_id: &'a str,
    /// Username/password pair; always both or neither.
    pub credentials: Option<(&'a str, &'a str)>,
    pub will: Will<'a>,
}

/// A message delivered by the broker on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Narrow interface over the underlying pub/sub client.
///
/// All calls are non-blocking or bounded-blocking per the implementation's
/// own contract; the supervisor adds no blocking of its own. Inbound
/// messages are queued by [`Transport::poll`] and drained through
/// [`Transport::next_message`], which replaces the callback registration a
/// C client would use.
pub trait Transport {
    /// Point the transport at a broker. Takes effect on the next connect.
    fn set_server(&mut self, host: &str, port: u16);

    /// Attempt to establish a session, registering the last-will. Returns
    /// true when the broker accepted the connection.
    fn connect(&mut self, request: &ConnectRequest<'_>) -> bool;

    /// Tear down the current session, if any.
    fn disconnect(&mut self);

    /// Current connectivity without servicing the session.
    fn connected(&self) -> bool;

    /// Service the session: keep-alives, socket reads, inbound queueing.
    /// Returns the connectivity after servicing.
    fn poll(&mut self) -> bool;

    /// Drain the next queued inbound message, if any.
    fn next_message(&mut self) -> Option<InboundMessage>;

    /// Publish a raw payload. Returns false when the transport could not
    /// accept the message.
    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> bool;

    /// Subscribe to a topic. Returns false when the request could not be
    /// issued.
    fn subscribe(&mut self, topic: &str) -> bool;

    /// Transport-specific status code for diagnostics.
    fn status_code(&self) -> i32;
}
