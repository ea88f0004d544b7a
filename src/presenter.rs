//! Turns a [`DetectionResult`] into what the window shows.
//!
//! Pure and synchronous: the same result always yields the same view, and a
//! new view fully replaces the previous one.

use crate::client::{DetectionResult, QualityMetrics};
use base64::engine::general_purpose;
use base64::Engine;
use tracing::debug;

/// Placeholder row shown when nothing was detected
pub const NO_DETECTION: &str = "No disease detected";

/// Confidence bucket used to color a detection row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.7 {
            Self::High
        } else if confidence >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Styling of a critique line, taken from its leading marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackTone {
    Warning,
    Success,
    Info,
    Neutral,
}

impl FeedbackTone {
    pub fn from_line(line: &str) -> Self {
        if line.starts_with("⚠️") {
            Self::Warning
        } else if line.starts_with('✓') {
            Self::Success
        } else if line.starts_with("ℹ️") {
            Self::Info
        } else {
            Self::Neutral
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionRow {
    Detected {
        class_name: String,
        /// Already formatted, e.g. `"91.0%"`
        confidence: String,
        tier: ConfidenceTier,
    },
    /// The single placeholder row for an empty detection list
    Nothing,
}

impl DetectionRow {
    pub fn label(&self) -> &str {
        match self {
            Self::Detected { class_name, .. } => class_name,
            Self::Nothing => NO_DETECTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackLine {
    pub text: String,
    pub tone: FeedbackTone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub label: &'static str,
    pub value: String,
}

/// Everything the result area renders for one detection result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultView {
    /// Decoded annotated JPEG, `None` when the payload was not valid base64
    pub annotated_jpeg: Option<Vec<u8>>,
    pub detections: Vec<DetectionRow>,
    pub critique: Vec<FeedbackLine>,
    pub suggestions: Vec<String>,
    pub disclaimer: Option<String>,
    pub metrics: Vec<Metric>,
}

/// Build the view for `result`.
pub fn present(result: &DetectionResult) -> ResultView {
    let annotated_jpeg = match general_purpose::STANDARD.decode(result.annotated_jpeg_base64.trim()) {
        Ok(bytes) if !bytes.is_empty() => Some(bytes),
        Ok(_) => None,
        Err(e) => {
            debug!("Annotated image is not valid base64: {}", e);
            None
        }
    };

    let detections = if result.detections.is_empty() {
        vec![DetectionRow::Nothing]
    } else {
        result
            .detections
            .iter()
            .map(|det| DetectionRow::Detected {
                class_name: det.class_name.clone(),
                confidence: format!("{:.1}%", det.confidence * 100.0),
                tier: ConfidenceTier::from_confidence(det.confidence),
            })
            .collect()
    };

    let feedback = result.feedback.as_ref();
    let critique = feedback
        .map(|f| {
            f.critique
                .iter()
                .map(|line| FeedbackLine {
                    text: line.clone(),
                    tone: FeedbackTone::from_line(line),
                })
                .collect()
        })
        .unwrap_or_default();
    let suggestions = feedback.map(|f| f.suggestions.clone()).unwrap_or_default();
    let disclaimer = feedback.and_then(|f| f.disclaimer.clone()).filter(|d| !d.is_empty());

    let metrics = match &result.quality_metrics {
        Some(quality) => metrics_for(result, quality),
        None => Vec::new(),
    };

    ResultView {
        annotated_jpeg,
        detections,
        critique,
        suggestions,
        disclaimer,
        metrics,
    }
}

fn metrics_for(result: &DetectionResult, quality: &QualityMetrics) -> Vec<Metric> {
    let mut metrics = vec![
        Metric {
            label: "Brightness",
            value: format!("{:.0}/255", quality.brightness),
        },
        Metric {
            label: "Sharpness",
            value: format!("{:.1}", quality.blur_metric),
        },
        Metric {
            label: "Resolution",
            value: format!("{}x{}", quality.width, quality.height),
        },
        Metric {
            label: "Inference time",
            value: format!("{:.1}ms", result.inference_time_ms),
        },
    ];

    if let Some(summary) = result.feedback.as_ref().and_then(|f| f.summary.as_ref()) {
        let value = match &summary.quality_score {
            Some(serde_json::Value::String(score)) => score.clone(),
            Some(serde_json::Value::Null) | None => "N/A".to_string(),
            Some(other) => other.to_string(),
        };
        metrics.push(Metric {
            label: "Quality score",
            value,
        });
    }

    if let Some(stats) = &result.filtering_stats {
        metrics.push(Metric {
            label: "Filtered",
            value: format!("{}/{} kept", stats.filtered_count, stats.raw_count),
        });
    }

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Detection, Feedback, FeedbackSummary, FilteringStats};

    fn detection(name: &str, confidence: f64) -> Detection {
        Detection {
            class_name: name.to_string(),
            confidence,
            class_id: None,
            bbox_xyxy: None,
        }
    }

    fn result() -> DetectionResult {
        DetectionResult {
            annotated_jpeg_base64: general_purpose::STANDARD.encode([0xFF, 0xD8, 0xFF, 0xD9]),
            detections: vec![detection("tomato_leaf_late_blight", 0.913)],
            feedback: None,
            quality_metrics: None,
            inference_time_ms: 41.26,
            success: Some(true),
            filtering_stats: None,
            timestamp: None,
        }
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(ConfidenceTier::from_confidence(0.70), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_confidence(0.6999), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_confidence(0.50), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_confidence(0.4999), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::from_confidence(1.0), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_confidence(0.0), ConfidenceTier::Low);
    }

    #[test]
    fn test_feedback_tone_markers() {
        assert_eq!(FeedbackTone::from_line("⚠️ Image is too dark"), FeedbackTone::Warning);
        assert_eq!(FeedbackTone::from_line("✓ Good focus"), FeedbackTone::Success);
        assert_eq!(FeedbackTone::from_line("ℹ️ Multiple leaves"), FeedbackTone::Info);
        assert_eq!(FeedbackTone::from_line("Plain remark"), FeedbackTone::Neutral);
    }

    #[test]
    fn test_detection_rows() {
        let view = present(&result());
        assert_eq!(
            view.detections,
            vec![DetectionRow::Detected {
                class_name: "tomato_leaf_late_blight".to_string(),
                confidence: "91.3%".to_string(),
                tier: ConfidenceTier::High,
            }]
        );
        assert_eq!(view.annotated_jpeg.as_deref(), Some(&[0xFF, 0xD8, 0xFF, 0xD9][..]));
    }

    #[test]
    fn test_empty_detections_show_placeholder() {
        let mut empty = result();
        empty.detections.clear();
        let view = present(&empty);
        assert_eq!(view.detections, vec![DetectionRow::Nothing]);
        assert_eq!(view.detections[0].label(), NO_DETECTION);
    }

    #[test]
    fn test_metrics_only_with_quality() {
        let view = present(&result());
        assert!(view.metrics.is_empty());

        let mut full = result();
        full.quality_metrics = Some(QualityMetrics {
            brightness: 127.6,
            blur_metric: 310.26,
            width: 720,
            height: 1280,
        });
        full.feedback = Some(Feedback {
            critique: vec!["⚠️ Slightly blurry".to_string()],
            suggestions: vec!["Hold steady".to_string()],
            disclaimer: Some("Consult an expert".to_string()),
            summary: Some(FeedbackSummary {
                quality_score: Some(serde_json::json!("good")),
                ..Default::default()
            }),
        });
        full.filtering_stats = Some(FilteringStats {
            raw_count: 3,
            filtered_count: 1,
            removed_count: 2,
        });

        let view = present(&full);
        let values: Vec<(&str, &str)> = view.metrics.iter().map(|m| (m.label, m.value.as_str())).collect();
        assert_eq!(
            values,
            vec![
                ("Brightness", "128/255"),
                ("Sharpness", "310.3"),
                ("Resolution", "720x1280"),
                ("Inference time", "41.3ms"),
                ("Quality score", "good"),
                ("Filtered", "1/3 kept"),
            ]
        );
        assert_eq!(view.critique[0].tone, FeedbackTone::Warning);
        assert_eq!(view.suggestions, vec!["Hold steady".to_string()]);
        assert_eq!(view.disclaimer.as_deref(), Some("Consult an expert"));
    }

    #[test]
    fn test_bad_base64_drops_image_only() {
        let mut broken = result();
        broken.annotated_jpeg_base64 = "***".to_string();
        let view = present(&broken);
        assert!(view.annotated_jpeg.is_none());
        assert_eq!(view.detections.len(), 1);
    }
}
