//! In-memory [`DetectionService`] for unit tests.

use super::{
    CaptureReceipt, Detection, DetectionResult, DetectionService, HealthStatus, ModelInfo,
    ServiceError,
};
use crate::frame::FrameSample;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Semaphore;

struct MockInner {
    detect_calls: AtomicUsize,
    capture_calls: AtomicUsize,
    detect_error: Mutex<Option<String>>,
    capture_fails: AtomicBool,
    gated: AtomicBool,
    gate: Semaphore,
}

impl Default for MockInner {
    fn default() -> Self {
        Self {
            detect_calls: AtomicUsize::new(0),
            capture_calls: AtomicUsize::new(0),
            detect_error: Mutex::new(None),
            capture_fails: AtomicBool::new(false),
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
        }
    }
}

#[derive(Clone, Default)]
pub struct MockService {
    inner: Arc<MockInner>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn detect_calls(&self) -> usize {
        self.inner.detect_calls.load(Ordering::SeqCst)
    }

    pub fn capture_calls(&self) -> usize {
        self.inner.capture_calls.load(Ordering::SeqCst)
    }

    /// Answer `/detect` with HTTP 500 and `detail` until cleared.
    pub fn fail_detect(&self, detail: Option<&str>) {
        *self.inner.detect_error.lock().unwrap_or_else(PoisonError::into_inner) = detail.map(str::to_string);
    }

    pub fn fail_capture(&self, fail: bool) {
        self.inner.capture_fails.store(fail, Ordering::SeqCst);
    }

    /// While gated, every `/detect` call waits for one [`MockService::release`].
    pub fn set_gated(&self, gated: bool) {
        self.inner.gated.store(gated, Ordering::SeqCst);
    }

    pub fn release(&self, calls: usize) {
        self.inner.gate.add_permits(calls);
    }
}

pub fn sample_result() -> DetectionResult {
    DetectionResult {
        annotated_jpeg_base64: "/9j/2Q==".to_string(),
        detections: vec![Detection {
            class_name: "apple_scab_leaf".to_string(),
            confidence: 0.82,
            class_id: Some(0),
            bbox_xyxy: Some(vec![4.0, 4.0, 20.0, 18.0]),
        }],
        feedback: None,
        quality_metrics: None,
        inference_time_ms: 12.5,
        success: Some(true),
        filtering_stats: None,
        timestamp: None,
    }
}

impl DetectionService for MockService {
    async fn detect(&self, _frame: FrameSample) -> Result<DetectionResult, ServiceError> {
        self.inner.detect_calls.fetch_add(1, Ordering::SeqCst);
        if self.inner.gated.load(Ordering::SeqCst) {
            if let Ok(permit) = self.inner.gate.acquire().await {
                permit.forget();
            }
        }

        let error = self.inner.detect_error.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match error {
            Some(message) => Err(ServiceError::Status { status: 500, message }),
            None => Ok(sample_result()),
        }
    }

    async fn capture(&self, _frame: FrameSample) -> Result<CaptureReceipt, ServiceError> {
        let n = self.inner.capture_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.inner.capture_fails.load(Ordering::SeqCst) {
            return Err(ServiceError::Status {
                status: 500,
                message: super::CAPTURE_FAILED.to_string(),
            });
        }
        Ok(CaptureReceipt {
            capture_id: format!("cap-{}", n),
            files: None,
            message: None,
        })
    }

    async fn health(&self) -> Result<HealthStatus, ServiceError> {
        Ok(HealthStatus {
            status: "healthy".to_string(),
            model_loaded: true,
            timestamp: None,
        })
    }

    async fn model_info(&self) -> Result<ModelInfo, ServiceError> {
        let classes = BTreeMap::from([
            ("0".to_string(), "apple_scab_leaf".to_string()),
            ("1".to_string(), "apple_rust_leaf".to_string()),
        ]);
        Ok(ModelInfo {
            loaded: true,
            classes,
            num_classes: Some(2),
            message: None,
        })
    }
}
