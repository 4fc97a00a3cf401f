//! 128-bit random identifiers for senders, correlations, and sessions.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Layer 3: Internal module imports
// (none)

/// Stable identifier for a running client instance.
///
/// Generated once at construction and held for the entire process-level
/// lifetime of the client. Determines the client's private response topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SenderId(Uuid);

impl SenderId {
    /// Generate a new random sender id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a sender id out of its wire string form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for SenderId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fresh 128-bit identifier placed on an outbound request and echoed on
/// its response so the two can be matched (I1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new random correlation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a correlation id out of its wire string form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a streaming session.
///
/// Doubles as the correlation id for the session's final aggregated
/// response and as the routing key fed to the broker's queue selector
/// (§9 open question: the two are the literal same value by construction,
/// not a side mapping table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session id out of its wire string form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// View this session id as the correlation id of its final response.
    pub fn as_correlation_id(&self) -> CorrelationId {
        CorrelationId(self.0)
    }

    /// The routing key fed to the broker's queue selector. Stable for the
    /// session's lifetime; callers pass `&str` via this method rather than
    /// formatting the id themselves.
    pub fn routing_key(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
