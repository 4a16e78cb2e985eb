//! Status indicator collaborator
//!
//! Purely observational: the supervisor notifies the indicator of
//! namespace changes and message activity so a front panel can render
//! them. Nothing here feeds back into the connection core.

/// Receiver for display side effects. Every method defaults to a no-op so
/// implementors only pick up what their hardware can show.
pub trait ActivityIndicator {
    /// The wildcard form of the namespace changed (client id, prefix or
    /// suffix was updated).
    fn topic_changed(&mut self, wildcard_topic: &str) {
        let _ = wildcard_topic;
    }

    /// A message arrived from the broker.
    fn message_received(&mut self) {}

    /// A message was handed to the broker.
    fn message_sent(&mut self) {}
}
