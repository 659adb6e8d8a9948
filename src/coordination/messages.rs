//! Message envelopes exchanged between execution contexts
//!
//! Three isolated contexts cooperate: the page-embedded agent, the
//! long-lived background coordinator, and a transient export worker. They
//! share no memory; everything crosses as `{type, data}` envelopes with
//! namespaced type strings. Every request-style message resolves to
//! exactly one response envelope `{success, payload | error}`, delivered
//! even when the handler fails internally.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The isolated execution contexts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextId {
    /// Page-embedded scraping agent (runs the pagination engine)
    Page,
    /// Long-lived coordinator owning shared state
    Background,
    /// Transient export worker
    Worker,
}

/// Namespaced message type strings
pub mod kinds {
    pub const START_PAGINATION: &str = "core/start-pagination";
    pub const PAUSE_PAGINATION: &str = "core/pause-pagination";
    pub const RESUME_PAGINATION: &str = "core/resume-pagination";
    pub const CANCEL_PAGINATION: &str = "core/cancel-pagination";
    pub const PAGINATION_STATUS: &str = "core/pagination-status";
    pub const GALLERY_DETECTED: &str = "core/gallery-detected";
    pub const IMAGES_FOUND: &str = "core/images-found";

    pub const EXPORT_DATA: &str = "export/data";

    pub const DOWNLOAD_ENQUEUE: &str = "download/enqueue";
    pub const DOWNLOAD_PROGRESS: &str = "download/progress";
    pub const DOWNLOAD_COMPLETE: &str = "download/complete";

    pub const SETTINGS_GET: &str = "settings/get";
    pub const SETTINGS_UPDATE: &str = "settings/update";

    pub const CHECKPOINT_CLEAR: &str = "checkpoint/clear";

    pub const MEMORY_WARNING: &str = "memory/warning";
    pub const TOAST_SHOW: &str = "toast/show";

    pub const API_ENDPOINT_OBSERVED: &str = "api/endpoint-observed";
}

/// A message on the wire: namespaced type plus optional JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            data: None,
        }
    }

    #[must_use]
    pub fn with_data(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data: Some(data),
        }
    }

    /// Namespace prefix of the type string ("core/pagination-status" →
    /// "core")
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.kind.split('/').next().unwrap_or(&self.kind)
    }

    /// Status-only kinds are fire-and-forget broadcasts with no required
    /// response
    #[must_use]
    pub fn is_status_only(&self) -> bool {
        matches!(
            self.kind.as_str(),
            kinds::PAGINATION_STATUS
                | kinds::TOAST_SHOW
                | kinds::MEMORY_WARNING
                | kinds::DOWNLOAD_PROGRESS
        )
    }
}

/// Response to a request-style envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    #[must_use]
    pub fn ok(payload: Option<Value>) -> Self {
        Self {
            success: true,
            payload,
            error: None,
        }
    }

    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(message.into()),
        }
    }
}
