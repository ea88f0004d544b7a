//! Wire types of the detection service

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One detected disease
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    pub class_name: String,
    /// 0.0 ..= 1.0
    pub confidence: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<i64>,

    /// `[x1, y1, x2, y2]` in source image pixels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox_xyxy: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackSummary {
    /// Usually a qualitative label ("good", "fair", ...), sometimes a number
    #[serde(default)]
    pub quality_score: Option<serde_json::Value>,

    #[serde(default)]
    pub detections_count: Option<u32>,

    #[serde(default)]
    pub unique_diseases: Option<u32>,

    #[serde(default)]
    pub max_confidence: Option<f64>,
}

/// Qualitative feedback about the frame and its detections
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Feedback {
    #[serde(default)]
    pub critique: Vec<String>,

    #[serde(default)]
    pub suggestions: Vec<String>,

    #[serde(default)]
    pub disclaimer: Option<String>,

    #[serde(default)]
    pub summary: Option<FeedbackSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QualityMetrics {
    /// Mean luminance, 0 ..= 255
    pub brightness: f64,
    /// Variance of the Laplacian; higher is sharper
    pub blur_metric: f64,
    pub width: u32,
    pub height: u32,
}

/// How many raw detections the server-side filter dropped
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FilteringStats {
    pub raw_count: u32,
    pub filtered_count: u32,
    pub removed_count: u32,
}

/// Answer of `POST /detect`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetectionResult {
    pub annotated_jpeg_base64: String,

    #[serde(default)]
    pub detections: Vec<Detection>,

    #[serde(default)]
    pub feedback: Option<Feedback>,

    #[serde(default)]
    pub quality_metrics: Option<QualityMetrics>,

    #[serde(default)]
    pub inference_time_ms: f64,

    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub filtering_stats: Option<FilteringStats>,

    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CaptureFiles {
    #[serde(default)]
    pub original: Option<String>,
    #[serde(default)]
    pub annotated: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Answer of `POST /capture`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureReceipt {
    pub capture_id: String,

    #[serde(default)]
    pub files: Option<CaptureFiles>,

    #[serde(default)]
    pub message: Option<String>,
}

/// Answer of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,

    #[serde(default)]
    pub model_loaded: bool,

    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Answer of `GET /model-info`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub loaded: bool,

    /// Class id (as a string key) to class name
    #[serde(default)]
    pub classes: BTreeMap<String, String>,

    #[serde(default)]
    pub num_classes: Option<u32>,

    #[serde(default)]
    pub message: Option<String>,
}

impl ModelInfo {
    /// Class names ordered by numeric class id
    pub fn class_names(&self) -> Vec<String> {
        let mut entries: Vec<(i64, &String)> = self
            .classes
            .iter()
            .map(|(id, name)| (id.parse().unwrap_or(i64::MAX), name))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries.into_iter().map(|(_, name)| name.clone()).collect()
    }
}

/// Error body of a non-2xx answer
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Human readable detail, if the server sent a usable one
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(text) if !text.is_empty() => Some(text.clone()),
            serde_json::Value::Null => None,
            serde_json::Value::String(_) => None,
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_detection_result() {
        let body = json!({
            "success": true,
            "detections": [
                {"class_id": 3, "class_name": "tomato_leaf_late_blight", "confidence": 0.91, "bbox_xyxy": [1.0, 2.0, 30.5, 40.0]}
            ],
            "feedback": {
                "critique": ["✓ Image is sharp"],
                "suggestions": ["Remove infected leaves"],
                "disclaimer": "Not a substitute for an agronomist.",
                "summary": {"detections_count": 1, "unique_diseases": 1, "max_confidence": 0.91, "quality_score": "good"}
            },
            "annotated_jpeg_base64": "AAAA",
            "inference_time_ms": 42.5,
            "quality_metrics": {"brightness": 120.4, "blur_metric": 310.2, "height": 1280, "width": 720},
            "filtering_stats": {"raw_count": 2, "filtered_count": 1, "removed_count": 1},
            "timestamp": "2025-01-01T10:00:00"
        });

        let result: DetectionResult = serde_json::from_value(body).unwrap();
        assert_eq!(result.detections.len(), 1);
        assert_eq!(result.detections[0].class_id, Some(3));
        assert_eq!(result.detections[0].bbox_xyxy.as_deref(), Some(&[1.0, 2.0, 30.5, 40.0][..]));
        let summary = result.feedback.unwrap().summary.unwrap();
        assert_eq!(summary.quality_score, Some(json!("good")));
        assert_eq!(result.quality_metrics.unwrap().width, 720);
        assert_eq!(result.filtering_stats.unwrap().removed_count, 1);
    }

    #[test]
    fn test_minimal_detection_result() {
        let result: DetectionResult = serde_json::from_value(json!({
            "annotated_jpeg_base64": "",
            "detections": [],
            "inference_time_ms": 3.0
        }))
        .unwrap();
        assert!(result.feedback.is_none());
        assert!(result.quality_metrics.is_none());
        assert!(result.detections.is_empty());
    }

    #[test]
    fn test_empty_filtering_stats() {
        let result: DetectionResult = serde_json::from_value(json!({
            "annotated_jpeg_base64": "",
            "detections": [],
            "inference_time_ms": 3.0,
            "filtering_stats": {}
        }))
        .unwrap();
        assert_eq!(result.filtering_stats, Some(FilteringStats::default()));

        let stats: FilteringStats = serde_json::from_value(json!({"raw_count": 4})).unwrap();
        assert_eq!(stats.raw_count, 4);
        assert_eq!(stats.removed_count, 0);
    }

    #[test]
    fn test_error_body_detail() {
        let body: ErrorBody = serde_json::from_str(r#"{"detail":"model error"}"#).unwrap();
        assert_eq!(body.message().as_deref(), Some("model error"));

        let body: ErrorBody = serde_json::from_str(r#"{"detail":""}"#).unwrap();
        assert_eq!(body.message(), None);

        let body: ErrorBody = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(body.message(), None);

        let body: ErrorBody = serde_json::from_str(r#"{"detail":[{"msg":"field required"}]}"#).unwrap();
        assert_eq!(body.message().as_deref(), Some(r#"[{"msg":"field required"}]"#));
    }

    #[test]
    fn test_model_info_class_order() {
        let info: ModelInfo = serde_json::from_value(json!({
            "loaded": true,
            "classes": {"10": "tomato_leaf", "2": "apple_rust_leaf", "0": "apple_scab_leaf"},
            "num_classes": 3
        }))
        .unwrap();
        assert_eq!(info.class_names(), vec!["apple_scab_leaf", "apple_rust_leaf", "tomato_leaf"]);
    }
}
