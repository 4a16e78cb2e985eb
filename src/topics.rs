//! Topic namespace derivation for the device
//!
//! Every topic the device speaks on is derived on demand from the current
//! configuration as `[prefix/]{category}/{client_id}[/{suffix}]`, with the
//! last-will and adoption announcement topics hanging off the status topic.
//! Nothing is cached: a configuration change is reflected by the very next
//! derivation.

/// Fixed category tokens occupying the first post-prefix topic segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicCategory {
    /// Inbound configuration documents (`conf`)
    Config,
    /// Inbound commands (`cmnd`)
    Command,
    /// Outbound status reports (`stat`)
    Status,
    /// Outbound telemetry (`tele`)
    Telemetry,
}

impl TopicCategory {
    pub const ALL: [TopicCategory; 4] = [
        TopicCategory::Config,
        TopicCategory::Command,
        TopicCategory::Status,
        TopicCategory::Telemetry,
    ];

    /// Wire token for this category.
    pub fn token(self) -> &'static str {
        match self {
            TopicCategory::Config => "conf",
            TopicCategory::Command => "cmnd",
            TopicCategory::Status => "stat",
            TopicCategory::Telemetry => "tele",
        }
    }
}

/// Trailing segment appended to the status topic for the last-will.
pub const LWT_SUFFIX: &str = "lwt";

/// Trailing segment appended to the status topic for the adoption
/// announcement consumed by external discovery tooling.
pub const ADOPT_SUFFIX: &str = "adopt";

/// Single-level wildcard substituted for the category position in the
/// introspection form. Display only, never used for subscription.
pub const CATEGORY_WILDCARD: &str = "+";

/// Borrowed view over the identity fields of the configuration.
///
/// Obtained from [`crate::config::DeviceConfig::topics`], which refuses to
/// produce one until a client id has been set.
#[derive(Debug, Clone, Copy)]
pub struct TopicNamespace<'a> {
    prefix: Option<&'a str>,
    client_id: &'a str,
    suffix: Option<&'a str>,
}

impl<'a> TopicNamespace<'a> {
    pub fn new(prefix: Option<&'a str>, client_id: &'a str, suffix: Option<&'a str>) -> Self {
        Self {
            prefix,
            client_id,
            suffix,
        }
    }

    /// Assemble `[prefix/]{middle}/{client_id}[/{suffix}]`.
    fn assemble(&self, middle: &str) -> String {
        let mut topic = String::with_capacity(
            self.prefix.map_or(0, |p| p.len() + 1)
                + middle.len()
                + 1
                + self.client_id.len()
                + self.suffix.map_or(0, |s| s.len() + 1),
        );
        if let Some(prefix) = self.prefix {
            topic.push_str(prefix);
            topic.push('/');
        }
        topic.push_str(middle);
        topic.push('/');
        topic.push_str(self.client_id);
        if let Some(suffix) = self.suffix {
            topic.push('/');
            topic.push_str(suffix);
        }
        topic
    }

    /// Topic for an arbitrary category.
    pub fn topic(&self, category: TopicCategory) -> String {
        self.assemble(category.token())
    }

    pub fn config(&self) -> String {
        self.topic(TopicCategory::Config)
    }

    pub fn command(&self) -> String {
        self.topic(TopicCategory::Command)
    }

    pub fn status(&self) -> String {
        self.topic(TopicCategory::Status)
    }

    pub fn telemetry(&self) -> String {
        self.topic(TopicCategory::Telemetry)
    }

    /// Last-will topic: status topic plus a fixed trailing segment.
    pub fn lwt(&self) -> String {
        let mut topic = self.status();
        topic.push('/');
        topic.push_str(LWT_SUFFIX);
        topic
    }

    /// Adoption announcement topic: status topic plus a fixed trailing segment.
    pub fn adopt(&self) -> String {
        let mut topic = self.status();
        topic.push('/');
        topic.push_str(ADOPT_SUFFIX);
        topic
    }

    /// Introspection form with `+` in the category position.
    pub fn wildcard(&self) -> String {
        self.assemble(CATEGORY_WILDCARD)
    }

    pub fn prefix(&self) -> Option<&'a str> {
        self.prefix
    }
}
