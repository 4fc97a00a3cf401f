//! Properties carried alongside every message as broker user-properties
//! (§5): the only channel the broker exposes for correlation, since it
//! otherwise only understands opaque bytes and FIFO-per-queue delivery.

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
use crate::ids::{CorrelationId, SenderId, SessionId};

/// `messageType` property: distinguishes an outbound request from an
/// inbound response on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// An outbound request, published to the shared request topic.
    Request,
    /// An inbound response, published to a sender's private response topic.
    Response,
}

impl Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Request => write!(f, "REQUEST"),
            MessageKind::Response => write!(f, "RESPONSE"),
        }
    }
}

impl MessageKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "REQUEST" => Some(MessageKind::Request),
            "RESPONSE" => Some(MessageKind::Response),
            _ => None,
        }
    }
}

const KEY_CORRELATION_ID: &str = "correlationId";
const KEY_SENDER_ID: &str = "senderId";
const KEY_SESSION_ID: &str = "sessionId";
const KEY_MESSAGE_TYPE: &str = "messageType";
const KEY_TIMESTAMP: &str = "timestamp";
const KEY_STREAM_END: &str = "streamEnd";
const KEY_STREAM_FINAL: &str = "streamFinal";
const KEY_SUCCESS: &str = "success";
const KEY_ERROR_MESSAGE: &str = "errorMessage";

/// Typed view over the user-properties attached to every message this
/// client sends or parses out of every message it receives (§5).
///
/// The broker itself only ever sees the flattened `HashMap<String,
/// String>` form ([`Metadata::to_properties`]); this type exists so the
/// rest of the crate never hand-parses that map more than once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    /// Matches a request to its response; equals the session id for
    /// streaming `streamEnd`/`bidiSend` final responses.
    pub correlation_id: CorrelationId,
    /// Present on requests; tells the responder which topic to reply to.
    pub sender_id: Option<SenderId>,
    /// Present iff this message belongs to a streaming exchange; also the
    /// routing key and the responder's grouping id.
    pub session_id: Option<SessionId>,
    /// `REQUEST` or `RESPONSE`.
    pub kind: MessageKind,
    /// Creation time of this message.
    pub timestamp: DateTime<Utc>,
    /// Present (`true`) on the end-of-stream marker request.
    pub stream_end: bool,
    /// Present (`true`) on the final aggregated response.
    pub stream_final: bool,
    /// Response-side outcome. Absent (`None`) on requests.
    pub success: Option<bool>,
    /// Human-readable error string; set iff `success == Some(false)`.
    pub error_message: Option<String>,
}

impl Metadata {
    /// Build the metadata for an outbound request.
    pub fn request(correlation_id: CorrelationId, sender_id: SenderId) -> Self {
        Self {
            correlation_id,
            sender_id: Some(sender_id),
            session_id: None,
            kind: MessageKind::Request,
            timestamp: Utc::now(),
            stream_end: false,
            stream_final: false,
            success: None,
            error_message: None,
        }
    }

    /// Attach a streaming session id, turning a plain request into a
    /// streaming mid-message or end-of-stream marker.
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Mark this request as the end-of-stream marker (`streamEnd`).
    pub fn with_stream_end(mut self) -> Self {
        self.stream_end = true;
        self
    }

    /// Build the metadata for an outbound response.
    pub fn response(correlation_id: CorrelationId, success: bool) -> Self {
        Self {
            correlation_id,
            sender_id: None,
            session_id: None,
            kind: MessageKind::Response,
            timestamp: Utc::now(),
            stream_end: false,
            stream_final: false,
            success: Some(success),
            error_message: None,
        }
    }

    /// Mark this response as the final aggregated response of a streaming
    /// exchange.
    pub fn with_stream_final(mut self) -> Self {
        self.stream_final = true;
        self
    }

    /// Attach a business-failure message, implying `success = false`.
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.success = Some(false);
        self.error_message = Some(message.into());
        self
    }

    /// `true` once this response carries a business-level failure
    /// (`success == Some(false)`); distinct from a transport fault, per §7.
    pub fn is_business_failure(&self) -> bool {
        self.success == Some(false)
    }

    /// Flatten into the string key/value user-properties the broker
    /// actually carries.
    pub fn to_properties(&self) -> HashMap<String, String> {
        let mut props = HashMap::new();
        props.insert(KEY_CORRELATION_ID.to_string(), self.correlation_id.to_string());
        if let Some(sender_id) = self.sender_id {
            props.insert(KEY_SENDER_ID.to_string(), sender_id.to_string());
        }
        if let Some(session_id) = self.session_id {
            props.insert(KEY_SESSION_ID.to_string(), session_id.to_string());
        }
        props.insert(KEY_MESSAGE_TYPE.to_string(), self.kind.to_string());
        props.insert(KEY_TIMESTAMP.to_string(), self.timestamp.to_rfc3339());
        if self.stream_end {
            props.insert(KEY_STREAM_END.to_string(), "true".to_string());
        }
        if self.stream_final {
            props.insert(KEY_STREAM_FINAL.to_string(), "true".to_string());
        }
        if let Some(success) = self.success {
            props.insert(KEY_SUCCESS.to_string(), success.to_string());
        }
        if let Some(error_message) = &self.error_message {
            props.insert(KEY_ERROR_MESSAGE.to_string(), error_message.clone());
        }
        props
    }

    /// Reconstruct a [`Metadata`] from the broker's raw string properties.
    ///
    /// Returns `Err` naming the missing or malformed field; callers treat
    /// this as a drop-with-warning per §6 rather than a protocol error.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, String> {
        let correlation_id = props
            .get(KEY_CORRELATION_ID)
            .ok_or_else(|| "missing correlationId".to_string())
            .and_then(|s| CorrelationId::parse(s).ok_or_else(|| "malformed correlationId".to_string()))?;

        let sender_id = props
            .get(KEY_SENDER_ID)
            .map(|s| SenderId::parse(s).ok_or_else(|| "malformed senderId".to_string()))
            .transpose()?;

        let session_id = props
            .get(KEY_SESSION_ID)
            .map(|s| SessionId::parse(s).ok_or_else(|| "malformed sessionId".to_string()))
            .transpose()?;

        let kind = props
            .get(KEY_MESSAGE_TYPE)
            .ok_or_else(|| "missing messageType".to_string())
            .and_then(|s| MessageKind::parse(s).ok_or_else(|| format!("unknown messageType {s}")))?;

        let timestamp = props
            .get(KEY_TIMESTAMP)
            .map(|s| {
                DateTime::parse_from_rfc3339(s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|_| "malformed timestamp".to_string())
            })
            .transpose()?
            .unwrap_or_else(Utc::now);

        let stream_end = props.get(KEY_STREAM_END).map(|s| s == "true").unwrap_or(false);
        let stream_final = props.get(KEY_STREAM_FINAL).map(|s| s == "true").unwrap_or(false);
        let success = props.get(KEY_SUCCESS).map(|s| s == "true");
        let error_message = props.get(KEY_ERROR_MESSAGE).cloned();

        Ok(Self {
            correlation_id,
            sender_id,
            session_id,
            kind,
            timestamp,
            stream_end,
            stream_final,
            success,
            error_message,
        })
    }
}
