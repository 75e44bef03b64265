//! HTTP implementation of the session transport.

use reqwest::multipart::{Form, Part};
use reqwest::{Body, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use streamer_ipc::{CaptureTarget, FrameAcknowledgment, SessionInfo, SessionSummary};

use crate::error::TransportError;
use crate::wire::{
    error_message, CreateSessionRequest, FrameAckResponse, SessionResponse, SessionStatusResponse,
    StopSessionResponse,
};
use crate::{FrameUpload, SessionTransport, TransportConfig, TransportResult, FRAME_FIELD};

/// Talks to the detection service's `/streams` endpoints.
pub struct HttpTransport {
    streams_url: Url,
    auth_token: Option<String>,
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new transport.
    pub fn new(config: TransportConfig) -> TransportResult<Self> {
        let streams_url = streams_url(&config.base_url, &config.api_prefix)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        debug!(url = %streams_url, "HTTP transport configured");

        Ok(Self {
            streams_url,
            auth_token: config.auth_token.filter(|t| !t.is_empty()),
            http_client,
        })
    }

    /// Root of the streams API.
    pub fn streams_url(&self) -> &Url {
        &self.streams_url
    }

    fn endpoint(&self, segments: &[&str]) -> TransportResult<Url> {
        let mut url = self.streams_url.clone();
        url.path_segments_mut()
            .map_err(|_| TransportError::InvalidUrl(self.streams_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn post(&self, url: Url) -> RequestBuilder {
        self.authorize(self.http_client.post(url))
    }

    fn get(&self, url: Url) -> RequestBuilder {
        self.authorize(self.http_client.get(url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

impl SessionTransport for HttpTransport {
    #[instrument(name = "http_create_session", skip(self))]
    async fn create_session(
        &self,
        target: &CaptureTarget,
        frame_interval_secs: u32,
    ) -> TransportResult<SessionInfo> {
        target.validate()?;

        let url = self.endpoint(&["sessions"])?;
        let response = self
            .post(url)
            .json(&CreateSessionRequest::new(target, frame_interval_secs))
            .send()
            .await?;

        let session: SessionInfo = decode::<SessionResponse>(check_status(response).await?)
            .await?
            .into();
        info!(session_id = %session.session_id, upload_id = session.upload_id, "Session created");
        Ok(session)
    }

    #[instrument(
        name = "http_submit_frame",
        skip(self, frame),
        fields(frame_number = frame.frame_number, bytes = frame.data.len())
    )]
    async fn submit_frame(
        &self,
        session_id: &str,
        frame: FrameUpload,
    ) -> TransportResult<FrameAcknowledgment> {
        let url = self.endpoint(&["sessions", session_id, "frames"])?;

        let length = frame.data.len() as u64;
        let part = Part::stream_with_length(Body::from(frame.data), length)
            .file_name("frame.jpg")
            .mime_str(frame.content_type)?;
        let form = Form::new()
            .part(FRAME_FIELD, part)
            .text("frame_number", frame.frame_number.to_string())
            .text("captured_at", frame.captured_at.to_rfc3339());

        let response = self.post(url).multipart(form).send().await?;
        let ack = decode::<FrameAckResponse>(check_status(response).await?).await?;
        Ok(ack.into())
    }

    #[instrument(name = "http_stop_session", skip(self))]
    async fn stop_session(&self, session_id: &str) -> TransportResult<SessionSummary> {
        let url = self.endpoint(&["sessions", session_id, "stop"])?;
        let response = self.post(url).send().await?;

        let stopped = decode::<StopSessionResponse>(check_status(response).await?).await?;
        if let Some(message) = &stopped.message {
            debug!(%message, "Session stop acknowledged");
        }
        Ok(stopped.session.into())
    }

    #[instrument(name = "http_fetch_status", skip(self))]
    async fn fetch_status(&self, session_id: &str) -> TransportResult<SessionSummary> {
        let url = self.endpoint(&["sessions", session_id])?;
        let response = self.get(url).send().await?;
        let status = decode::<SessionStatusResponse>(check_status(response).await?).await?;
        Ok(status.into())
    }
}

fn streams_url(base_url: &str, api_prefix: &str) -> TransportResult<Url> {
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(TransportError::InvalidUrl(
            "URL must start with http:// or https://".to_string(),
        ));
    }

    let base = base_url.trim_end_matches('/');
    let prefix = api_prefix.trim_matches('/');
    let joined = if prefix.is_empty() {
        format!("{base}/streams")
    } else {
        format!("{base}/{prefix}/streams")
    };

    Url::parse(&joined).map_err(|e| TransportError::InvalidUrl(format!("{joined}: {e}")))
}

/// Map non-success responses onto the error taxonomy.
async fn check_status(response: Response) -> TransportResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);

    match status {
        StatusCode::NOT_FOUND => Err(TransportError::NotFound(message)),
        StatusCode::CONFLICT => Err(TransportError::Conflict(message)),
        _ => {
            warn!(status = status.as_u16(), %message, "Request rejected");
            Err(TransportError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> TransportResult<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streams_url_joins_prefix() {
        let url = streams_url("http://localhost:8000", "/api/v1").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/api/v1/streams");

        let url = streams_url("https://api.example.com/", "api/v1/").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/v1/streams");
    }

    #[test]
    fn test_streams_url_without_prefix() {
        let url = streams_url("http://localhost:8000", "").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/streams");
    }

    #[test]
    fn test_rejects_non_http_urls() {
        assert!(matches!(
            streams_url("ftp://localhost", "/api/v1"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_endpoint_escapes_session_id() {
        let transport = HttpTransport::new(TransportConfig::default()).unwrap();
        let url = transport.endpoint(&["sessions", "a/b", "frames"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8000/api/v1/streams/sessions/a%2Fb/frames"
        );
    }

    #[test]
    fn test_empty_token_is_ignored() {
        let transport = HttpTransport::new(TransportConfig {
            auth_token: Some(String::new()),
            ..Default::default()
        })
        .unwrap();
        assert!(transport.auth_token.is_none());
    }
}
