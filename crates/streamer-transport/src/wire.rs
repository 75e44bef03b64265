//! JSON bodies exchanged with the `/streams` API.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use streamer_ipc::{
    AlertLevel, CaptureTarget, FrameAcknowledgment, SessionInfo, SessionStatus, SessionSummary,
};

#[derive(Debug, Serialize)]
pub(crate) struct CreateSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    camera_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    longitude: Option<f64>,
    frame_interval: u32,
}

impl CreateSessionRequest {
    pub(crate) fn new(target: &CaptureTarget, frame_interval: u32) -> Self {
        let (latitude, longitude) = target.coordinates().unzip();
        Self {
            camera_id: target.camera_id(),
            latitude,
            longitude,
            frame_interval,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionResponse {
    session_id: String,
    upload_id: u64,
    status: SessionStatus,
    frame_interval: u32,
    #[serde(deserialize_with = "timestamp")]
    started_at: DateTime<Utc>,
    reconnect_interval_seconds: u64,
}

impl From<SessionResponse> for SessionInfo {
    fn from(r: SessionResponse) -> Self {
        Self {
            session_id: r.session_id,
            upload_id: r.upload_id,
            status: r.status,
            frame_interval_secs: r.frame_interval,
            started_at: r.started_at,
            reconnect_interval_secs: r.reconnect_interval_seconds,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct FrameAckResponse {
    session_id: String,
    upload_id: u64,
    frame_number: u64,
    detections_count: u32,
    #[serde(default)]
    alert_level: Option<AlertLevel>,
    #[serde(deserialize_with = "timestamp")]
    processed_at: DateTime<Utc>,
}

impl From<FrameAckResponse> for FrameAcknowledgment {
    fn from(r: FrameAckResponse) -> Self {
        Self {
            session_id: r.session_id,
            upload_id: r.upload_id,
            frame_number: r.frame_number,
            detections_count: r.detections_count,
            alert_level: r.alert_level,
            processed_at: r.processed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionStatusResponse {
    session_id: String,
    upload_id: u64,
    status: SessionStatus,
    frame_interval: u32,
    #[serde(deserialize_with = "timestamp")]
    started_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    last_frame_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    stopped_at: Option<DateTime<Utc>>,
    #[serde(default)]
    frames_received: u64,
    #[serde(default)]
    frames_processed: u64,
    #[serde(default)]
    detections_count: u64,
    #[serde(default)]
    reconnect_attempts: u32,
}

impl From<SessionStatusResponse> for SessionSummary {
    fn from(r: SessionStatusResponse) -> Self {
        Self {
            session_id: r.session_id,
            upload_id: r.upload_id,
            status: r.status,
            frame_interval_secs: r.frame_interval,
            started_at: r.started_at,
            last_frame_at: r.last_frame_at,
            stopped_at: r.stopped_at,
            frames_received: r.frames_received,
            frames_processed: r.frames_processed,
            detections_count: r.detections_count,
            reconnect_attempts: r.reconnect_attempts,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StopSessionResponse {
    pub(crate) session: SessionStatusResponse,
    #[serde(default)]
    pub(crate) message: Option<String>,
}

/// FastAPI-style error body: `{"detail": "..."}` or a validation list.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Best-effort human-readable message from an error response body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(detail),
        }) => detail,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) if body.trim().is_empty() => "no response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

/// Accept RFC 3339 timestamps and the service's offset-less ISO timestamps (read as UTC).
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

fn optional_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_create_request_for_location() {
        let target = CaptureTarget::Location {
            latitude: 35.0,
            longitude: 139.0,
        };
        let body = serde_json::to_value(CreateSessionRequest::new(&target, 5)).unwrap();
        assert_eq!(
            body,
            json!({"latitude": 35.0, "longitude": 139.0, "frame_interval": 5})
        );
    }

    #[test]
    fn test_create_request_for_camera() {
        let target = CaptureTarget::Camera { camera_id: 12 };
        let body = serde_json::to_value(CreateSessionRequest::new(&target, 10)).unwrap();
        assert_eq!(body, json!({"camera_id": 12, "frame_interval": 10}));
    }

    #[test]
    fn test_naive_timestamp_is_read_as_utc() {
        let parsed = parse_timestamp("2025-01-02T03:04:05.678901").unwrap();
        assert_eq!((parsed.year(), parsed.month(), parsed.day()), (2025, 1, 2));
        assert_eq!((parsed.hour(), parsed.minute(), parsed.second()), (3, 4, 5));

        let offset = parse_timestamp("2025-01-02T12:04:05+09:00").unwrap();
        assert_eq!(offset.hour(), 3);

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_frame_ack_without_alert_level() {
        let ack: FrameAckResponse = serde_json::from_value(json!({
            "session_id": "abc",
            "upload_id": 3,
            "frame_number": 4,
            "detections_count": 0,
            "processed_at": "2025-01-02T03:04:05"
        }))
        .unwrap();
        let ack = FrameAcknowledgment::from(ack);
        assert_eq!(ack.frame_number, 4);
        assert_eq!(ack.alert_level, None);
    }

    #[test]
    fn test_stop_response_parses_summary() {
        let stop: StopSessionResponse = serde_json::from_value(json!({
            "session": {
                "session_id": "abc",
                "upload_id": 3,
                "status": "stopped",
                "frame_interval": 5,
                "started_at": "2025-01-02T03:04:05",
                "last_frame_at": null,
                "stopped_at": "2025-01-02T03:09:05",
                "frames_received": 60,
                "frames_processed": 59,
                "detections_count": 4,
                "reconnect_attempts": 1
            },
            "message": "stopped"
        }))
        .unwrap();
        let summary = SessionSummary::from(stop.session);
        assert_eq!(summary.status, SessionStatus::Stopped);
        assert_eq!(summary.frames_processed, 59);
        assert!(summary.last_frame_at.is_none());
        assert!(summary.stopped_at.is_some());
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"detail": "Stream session abc not found"}"#),
            "Stream session abc not found"
        );
        assert_eq!(error_message("  upstream timeout \n"), "upstream timeout");
        assert_eq!(error_message(""), "no response body");
        assert!(error_message(r#"{"detail": [{"msg": "field required"}]}"#).contains("field required"));
    }
}
