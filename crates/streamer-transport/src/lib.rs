//! Session transport for the remote detection service.
//!
//! The session controller depends only on the [`SessionTransport`] trait;
//! [`HttpTransport`] implements it against the backend's `/streams` API.
//! Nothing in this crate retries: outcomes are surfaced to the caller, which
//! decides whether a failure invalidates the session.

mod error;
mod http;
mod wire;

pub use error::TransportError;
pub use http::HttpTransport;

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use streamer_ipc::{CaptureTarget, FrameAcknowledgment, SessionInfo, SessionSummary};

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Default service base URL.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Default API prefix.
pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Multipart field carrying the frame image.
pub const FRAME_FIELD: &str = "frame_file";

/// One frame to upload.
#[derive(Debug, Clone)]
pub struct FrameUpload {
    /// Compressed image bytes.
    pub data: Bytes,

    /// MIME type of `data`.
    pub content_type: &'static str,

    /// Sequence number within the session.
    pub frame_number: u64,

    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
}

/// Remote operations the session controller depends on.
pub trait SessionTransport: Send + Sync + 'static {
    /// Create a session for `target`.
    fn create_session(
        &self,
        target: &CaptureTarget,
        frame_interval_secs: u32,
    ) -> impl Future<Output = TransportResult<SessionInfo>> + Send;

    /// Upload one frame. Fails with `NotFound`/`Conflict` when the session is gone.
    fn submit_frame(
        &self,
        session_id: &str,
        frame: FrameUpload,
    ) -> impl Future<Output = TransportResult<FrameAcknowledgment>> + Send;

    /// Stop the session. Fails with `NotFound` when it is already gone.
    fn stop_session(
        &self,
        session_id: &str,
    ) -> impl Future<Output = TransportResult<SessionSummary>> + Send;

    /// Read the session's current counts.
    fn fetch_status(
        &self,
        session_id: &str,
    ) -> impl Future<Output = TransportResult<SessionSummary>> + Send;
}

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Service base URL (e.g., "http://localhost:8000").
    pub base_url: String,

    /// Path prefix of the versioned API.
    pub api_prefix: String,

    /// Bearer token sent with every request.
    pub auth_token: Option<String>,

    /// Whole-request timeout.
    #[serde(with = "secs")]
    pub request_timeout: Duration,

    /// TCP connect timeout.
    #[serde(with = "secs")]
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
