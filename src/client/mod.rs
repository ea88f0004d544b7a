//! Detection service client
//!
//! [`DetectionService`] is the seam the controller talks to. The production
//! implementation, [`HttpDetectionClient`], posts JPEG frames as multipart
//! uploads and decodes the JSON answers into the types of [`types`].

#[cfg(test)]
pub(crate) mod mock;
pub mod types;

pub use types::{
    CaptureFiles, CaptureReceipt, Detection, DetectionResult, Feedback, FeedbackSummary,
    FilteringStats, HealthStatus, ModelInfo, QualityMetrics,
};

use crate::frame::FrameSample;
use reqwest::multipart::{Form, Part};
use std::future::Future;
use tracing::{debug, warn};
use types::ErrorBody;

/// Fallback error text when `/detect` fails without a usable `detail`
pub const DETECTION_FAILED: &str = "Detection failed";
/// Error text for any failed `/capture` answer
pub const CAPTURE_FAILED: &str = "Capture failed";

/// Errors raised while talking to the detection service
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx answer; `message` is what should be shown to the user
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ServiceError {
    /// HTTP status code, when the service answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) => None,
        }
    }
}

/// Remote detection and capture-persistence service.
pub trait DetectionService: Send + Sync + 'static {
    /// Run detection on one frame.
    fn detect(&self, frame: FrameSample) -> impl Future<Output = Result<DetectionResult, ServiceError>> + Send;

    /// Persist one frame server-side.
    fn capture(&self, frame: FrameSample) -> impl Future<Output = Result<CaptureReceipt, ServiceError>> + Send;

    /// Service liveness and model state.
    fn health(&self) -> impl Future<Output = Result<HealthStatus, ServiceError>> + Send;

    /// Classes the loaded model can detect.
    fn model_info(&self) -> impl Future<Output = Result<ModelInfo, ServiceError>> + Send;
}

/// HTTP implementation of [`DetectionService`]
#[derive(Debug, Clone)]
pub struct HttpDetectionClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDetectionClient {
    /// No request timeout is configured: a cycle waits as long as the
    /// service needs.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn frame_form(frame: &FrameSample, file_name: &'static str) -> Result<Form, ServiceError> {
        let part = Part::bytes(frame.jpeg().to_vec())
            .file_name(file_name)
            .mime_str(frame.mime_type())?;
        Ok(Form::new().part("file", part))
    }
}

impl DetectionService for HttpDetectionClient {
    async fn detect(&self, frame: FrameSample) -> Result<DetectionResult, ServiceError> {
        let form = Self::frame_form(&frame, "frame.jpg")?;
        debug!("POST /detect ({} bytes, {}x{})", frame.len(), frame.width(), frame.height());

        let resp = self.client.post(self.url("/detect")).multipart(form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|body| body.message())
                .unwrap_or_else(|| DETECTION_FAILED.to_string());
            warn!("/detect answered {}: {}", status, message);
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn capture(&self, frame: FrameSample) -> Result<CaptureReceipt, ServiceError> {
        let form = Self::frame_form(&frame, "capture.jpg")?;
        debug!("POST /capture ({} bytes)", frame.len());

        let resp = self.client.post(self.url("/capture")).multipart(form).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!("/capture answered {}", status);
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message: CAPTURE_FAILED.to_string(),
            });
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn health(&self) -> Result<HealthStatus, ServiceError> {
        let resp = self.client.get(self.url("/health")).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message: format!("Health check failed: {}", status),
            });
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn model_info(&self) -> Result<ModelInfo, ServiceError> {
        let resp = self.client.get(self.url("/model-info")).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                message: format!("Model info request failed: {}", status),
            });
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = HttpDetectionClient::new("http://localhost:8000/");
        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(client.url("/detect"), "http://localhost:8000/detect");
    }

    #[test]
    fn test_status_error_displays_message() {
        let err = ServiceError::Status {
            status: 500,
            message: "model error".to_string(),
        };
        assert_eq!(err.to_string(), "model error");
        assert_eq!(err.status(), Some(500));
    }
}
