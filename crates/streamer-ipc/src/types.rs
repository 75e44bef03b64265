//! Common types used across session commands and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::ConnectionState;

/// Smallest accepted frame interval in seconds.
pub const MIN_FRAME_INTERVAL_SECS: u32 = 1;

/// Largest accepted frame interval in seconds.
pub const MAX_FRAME_INTERVAL_SECS: u32 = 60;

/// Where a session's detections are attributed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTarget {
    /// A camera registered with the backend.
    Camera { camera_id: u64 },

    /// An explicit coordinate pair.
    Location { latitude: f64, longitude: f64 },
}

/// A capture target that cannot be used to start a session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidTarget {
    /// Neither a camera nor a full coordinate pair was given.
    #[error("Either a camera id or both latitude and longitude must be provided")]
    Missing,

    /// Both a camera and coordinates were given.
    #[error("Provide a camera id or coordinates, not both")]
    Ambiguous,

    /// Camera ids start at 1.
    #[error("Camera id must be positive")]
    ZeroCameraId,

    /// Latitude outside [-90, 90].
    #[error("Latitude {0} is out of range")]
    Latitude(f64),

    /// Longitude outside [-180, 180].
    #[error("Longitude {0} is out of range")]
    Longitude(f64),
}

impl CaptureTarget {
    /// Build a target from optional parts, requiring exactly one kind.
    pub fn from_parts(
        camera_id: Option<u64>,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Self, InvalidTarget> {
        let target = match (camera_id, latitude, longitude) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => return Err(InvalidTarget::Ambiguous),
            (Some(camera_id), None, None) => Self::Camera { camera_id },
            (None, Some(latitude), Some(longitude)) => Self::Location {
                latitude,
                longitude,
            },
            _ => return Err(InvalidTarget::Missing),
        };
        target.validate()?;
        Ok(target)
    }

    /// Check ranges the backend would otherwise reject.
    pub fn validate(&self) -> Result<(), InvalidTarget> {
        match *self {
            Self::Camera { camera_id: 0 } => Err(InvalidTarget::ZeroCameraId),
            Self::Camera { .. } => Ok(()),
            Self::Location { latitude, .. } if !(-90.0..=90.0).contains(&latitude) => {
                Err(InvalidTarget::Latitude(latitude))
            }
            Self::Location { longitude, .. } if !(-180.0..=180.0).contains(&longitude) => {
                Err(InvalidTarget::Longitude(longitude))
            }
            Self::Location { .. } => Ok(()),
        }
    }

    /// The camera id, if this target names one.
    pub fn camera_id(&self) -> Option<u64> {
        match *self {
            Self::Camera { camera_id } => Some(camera_id),
            Self::Location { .. } => None,
        }
    }

    /// The coordinate pair, if this target names one.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match *self {
            Self::Camera { .. } => None,
            Self::Location {
                latitude,
                longitude,
            } => Some((latitude, longitude)),
        }
    }
}

/// Configuration for a streaming controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Seconds between captured frames (1 - 60).
    pub frame_interval_secs: u32,

    /// Fixed delay between a device failure and the next re-acquisition.
    pub reconnect_delay_secs: u64,

    /// Give up after this many failed re-acquisitions (None retries forever).
    pub max_reconnect_attempts: Option<u32>,

    /// Use the server-advised reconnect interval instead of `reconnect_delay_secs`.
    pub use_server_reconnect_interval: bool,

    /// JPEG quality (1 - 100).
    pub jpeg_quality: u8,

    /// Raster width used when the device does not report its size.
    pub fallback_width: u32,

    /// Raster height used when the device does not report its size.
    pub fallback_height: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            frame_interval_secs: 5,
            reconnect_delay_secs: 5,
            max_reconnect_attempts: None,
            use_server_reconnect_interval: false,
            jpeg_quality: 80,
            fallback_width: 1280,
            fallback_height: 720,
        }
    }
}

impl StreamConfig {
    /// Returns true if `secs` is an accepted frame interval.
    pub fn is_valid_frame_interval(secs: u32) -> bool {
        (MIN_FRAME_INTERVAL_SECS..=MAX_FRAME_INTERVAL_SECS).contains(&secs)
    }
}

/// Remote session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Reconnecting,
    Stopped,
}

/// A session created by the remote detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Opaque identifier assigned by the service.
    pub session_id: String,

    /// Upload record the session's detections are stored under.
    pub upload_id: u64,

    /// Status at creation.
    pub status: SessionStatus,

    /// Frame interval the service recorded, in seconds.
    pub frame_interval_secs: u32,

    /// When the service created the session.
    pub started_at: DateTime<Utc>,

    /// Reconnect interval advised by the service, in seconds.
    pub reconnect_interval_secs: u64,
}

/// Alert severity the service attaches to a frame's detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Critical,
    Warning,
    Caution,
    Low,
}

/// Result of one successful frame submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAcknowledgment {
    pub session_id: String,
    pub upload_id: u64,
    pub frame_number: u64,
    pub detections_count: u32,
    pub alert_level: Option<AlertLevel>,
    pub processed_at: DateTime<Utc>,
}

/// Final counts reported when a session stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub upload_id: u64,
    pub status: SessionStatus,
    pub frame_interval_secs: u32,
    pub started_at: DateTime<Utc>,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub frames_received: u64,
    pub frames_processed: u64,
    pub detections_count: u64,
    pub reconnect_attempts: u32,
}

/// Everything a surface can observe about the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current controller state.
    pub state: ConnectionState,

    /// Active session, if any.
    pub session: Option<SessionInfo>,

    /// Most recent acknowledgment in this session.
    pub last_ack: Option<FrameAcknowledgment>,

    /// Frames acknowledged in this session.
    pub frames_sent: u64,

    /// Capture ticks dropped by the in-flight guard.
    pub frames_skipped: u64,

    /// Successful device re-acquisitions in this session.
    pub reconnect_attempts: u32,

    /// Detections summed over this session's acknowledgments.
    pub detections_total: u64,

    /// Latest human-readable error, if any.
    pub error: Option<String>,
}
