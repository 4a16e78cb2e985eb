//! Connection supervision and topic routing for MQTT-attached devices
//!
//! This crate owns the pieces of a device firmware that make an
//! unreliable broker connection livable:
//!
//! - a deterministic topic namespace derived from the device
//!   configuration (`[prefix/]{conf|cmnd|stat|tele}/{client_id}[/{suffix}]`),
//! - a tick-driven reconnect state machine with capped linear backoff,
//! - the last-will / adoption announcement protocol
//!   (`{"online": false}` as the registered will, `{"online": true}`
//!   retained after every successful connect),
//! - dispatch of inbound config/command messages, single or batched, to
//!   the registered handlers.
//!
//! The supervisor is single-threaded and cooperative: the device main
//! loop calls [`DeviceLink::tick`] periodically and everything else
//! happens inside that call. A production transport backed by rumqttc is
//! provided; anything implementing [`Transport`] works.
//!
//! # Quick start
//!
//! ```
//! use edgelink::testing::MockTransport;
//! use edgelink::DeviceLink;
//!
//! let mut link = DeviceLink::new(MockTransport::new());
//! link.set_broker("10.0.0.5", 1883);
//! link.set_client_id("dev-ab12cd").unwrap();
//! link.on_command(|payload| println!("command: {payload}"));
//!
//! // Drive the lifecycle from the device main loop.
//! link.tick();
//! assert!(link.is_connected());
//! ```

pub mod config;
pub mod connection;
pub mod dispatch;
pub mod display;
pub mod link;
pub mod testing;
pub mod topics;
pub mod transport;

pub use config::{ConfigError, ConfigSnapshot, DeviceConfig};
pub use connection::ConnectionState;
pub use dispatch::MessageClass;
pub use display::ActivityIndicator;
pub use link::DeviceLink;
pub use topics::{TopicCategory, TopicNamespace};
pub use transport::{ConnectRequest, InboundMessage, RumqttTransport, Transport, Will};
