//! Inference worker pool
//!
//! Classification is CPU-bound, so it runs on dedicated OS threads instead of
//! the async runtime. Each worker owns a clone of the service; clones share the
//! same immutable weight storage, so no lock guards the model.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use burn::tensor::backend::Backend;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::inference::predictor::InferenceService;
use crate::utils::error::{panic_message, DigitError, Result};

/// Pending requests each worker will queue before senders wait
const QUEUE_DEPTH: usize = 64;

struct Job {
    payload: String,
    reply: oneshot::Sender<Result<usize>>,
}

/// Fixed set of inference threads fed round-robin
pub struct InferencePool {
    senders: Vec<mpsc::Sender<Job>>,
    next: AtomicUsize,
}

impl InferencePool {
    /// Spawn `workers` threads, each with its own clone of `service`.
    ///
    /// Workers exit once the pool is dropped.
    pub fn new<B: Backend>(service: InferenceService<B>, workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(DigitError::Config(
                "inference pool needs at least one worker".to_string(),
            ));
        }

        let mut senders = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = mpsc::channel::<Job>(QUEUE_DEPTH);
            let worker = service.clone();
            std::thread::Builder::new()
                .name(format!("inference-{}", id))
                .spawn(move || run_worker(id, worker, rx))?;
            senders.push(tx);
        }

        info!("Started {} inference workers", workers);
        Ok(Self {
            senders,
            next: AtomicUsize::new(0),
        })
    }

    pub fn workers(&self) -> usize {
        self.senders.len()
    }

    /// Classify a base64 payload on the next worker in turn
    pub async fn classify(&self, payload: String) -> Result<usize> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.senders.len();
        let (reply, response) = oneshot::channel();

        self.senders[index]
            .send(Job { payload, reply })
            .await
            .map_err(|_| DigitError::Internal(format!("inference worker {} is gone", index)))?;

        response
            .await
            .map_err(|_| DigitError::Internal(format!("inference worker {} dropped the request", index)))?
    }
}

fn run_worker<B: Backend>(id: usize, service: InferenceService<B>, mut rx: mpsc::Receiver<Job>) {
    debug!("Inference worker {} ready", id);

    while let Some(job) = rx.blocking_recv() {
        let result = catch_unwind(AssertUnwindSafe(|| service.classify(&job.payload)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload);
                error!("Inference worker {} caught a panic: {}", id, message);
                Err(DigitError::Internal(message))
            });

        // The caller may have gone away; nothing to do then
        let _ = job.reply.send(result);
    }

    debug!("Inference worker {} shutting down", id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::cnn::{DigitClassifier, DigitClassifierConfig};
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use burn_ndarray::NdArray;
    use image::{DynamicImage, GrayImage, ImageFormat, Luma};
    use std::io::Cursor;
    use std::sync::Arc;

    type TestBackend = NdArray<f32>;

    fn service() -> InferenceService<TestBackend> {
        let device = Default::default();
        let model = DigitClassifier::new(&DigitClassifierConfig::new(), &device);
        InferenceService::new(model, device)
    }

    fn payload() -> String {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(GrayImage::from_pixel(28, 28, Luma([255])))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        STANDARD.encode(buf.into_inner())
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(InferencePool::new(service(), 0).is_err());
    }

    #[tokio::test]
    async fn test_workers_agree() {
        let service = service();
        let expected = service.classify(&payload()).unwrap();
        let pool = Arc::new(InferencePool::new(service, 3).unwrap());
        assert_eq!(pool.workers(), 3);

        let handles: Vec<_> = (0..9)
            .map(|_| {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move { pool.classify(payload()).await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_input_error_passes_through() {
        let pool = InferencePool::new(service(), 1).unwrap();
        let result = pool.classify("not-base64!!".to_string()).await;
        assert!(matches!(result, Err(DigitError::Input(_))));

        // The worker is still alive afterwards
        assert!(pool.classify(payload()).await.is_ok());
    }
}
