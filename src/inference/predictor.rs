//! Inference Service Module
//!
//! Composes decoding, preprocessing and the forward pass into a single
//! `classify` call. The service holds one immutable network for its lifetime.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use burn::tensor::backend::Backend;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::decoder::decode_image;
use super::preprocess::Preprocessor;
use crate::model::checkpoint::load_classifier;
use crate::model::cnn::DigitClassifier;
use crate::utils::error::{panic_message, DigitError, Result};

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted digit
    pub label: usize,

    /// Softmax probability of the predicted digit
    pub confidence: f32,

    /// Raw network output, index i is digit i
    pub logits: Vec<f32>,
}

impl Prediction {
    /// Build a prediction from raw logits
    pub fn from_logits(logits: Vec<f32>) -> Result<Self> {
        let label = argmax(&logits)?;
        let confidence = softmax(&logits)[label];
        Ok(Self {
            label,
            confidence,
            logits,
        })
    }

    /// Class probabilities
    pub fn probabilities(&self) -> Vec<f32> {
        softmax(&self.logits)
    }
}

/// Index of the largest logit; the lowest index wins ties
pub fn argmax(logits: &[f32]) -> Result<usize> {
    if logits.is_empty() {
        return Err(DigitError::Internal("Empty logit vector".to_string()));
    }
    if let Some(bad) = logits.iter().find(|v| !v.is_finite()) {
        return Err(DigitError::Internal(format!(
            "Network produced a non-finite logit ({})",
            bad
        )));
    }

    let mut best = 0;
    for (i, &value) in logits.iter().enumerate().skip(1) {
        if value > logits[best] {
            best = i;
        }
    }
    Ok(best)
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Digit classification over encoded images
#[derive(Debug, Clone)]
pub struct InferenceService<B: Backend> {
    model: DigitClassifier<B>,
    preprocessor: Preprocessor,
    device: B::Device,
}

impl<B: Backend> InferenceService<B> {
    /// Wrap an already loaded network
    pub fn new(model: DigitClassifier<B>, device: B::Device) -> Self {
        Self {
            model,
            preprocessor: Preprocessor::new(),
            device,
        }
    }

    /// Load the network from a checkpoint and wrap it
    pub fn from_checkpoint(path: &Path, device: B::Device) -> Result<Self> {
        let model = load_classifier::<B>(path, &device)?;
        Ok(Self::new(model, device))
    }

    pub fn model(&self) -> &DigitClassifier<B> {
        &self.model
    }

    /// Classify a base64 payload, returning the predicted digit
    pub fn classify(&self, raw: &str) -> Result<usize> {
        self.predict(raw).map(|p| p.label)
    }

    /// Classify a base64 payload with confidence and logits
    pub fn predict(&self, raw: &str) -> Result<Prediction> {
        let image = decode_image(raw)?;
        self.predict_image(&image)
    }

    /// Preprocess and run the network on a decoded raster.
    ///
    /// Every failure past decoding, including a panic inside the tensor library,
    /// is reported as [`DigitError::Internal`].
    pub fn predict_image(&self, image: &GrayImage) -> Result<Prediction> {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let input = self.preprocessor.transform::<B>(image, &self.device);
            let logits = self.model.logits(input)?;
            Prediction::from_logits(logits)
        }));

        let result = match outcome {
            Ok(result) => result.map_err(DigitError::into_request_error),
            Err(payload) => Err(DigitError::Internal(format!(
                "panic during inference: {}",
                panic_message(payload)
            ))),
        };

        if let Err(ref e) = result {
            error!("Inference failed: {}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::checkpoint::save_classifier;
    use crate::model::cnn::DigitClassifierConfig;
    use crate::utils::error::InputError;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use burn_ndarray::NdArray;
    use image::{DynamicImage, ImageFormat, Luma, Rgb, RgbImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    type TestBackend = NdArray<f32>;

    fn service() -> InferenceService<TestBackend> {
        let device = Default::default();
        let model = DigitClassifier::new(&DigitClassifierConfig::new(), &device);
        InferenceService::new(model, device)
    }

    fn to_base64(img: DynamicImage) -> String {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        STANDARD.encode(buf.into_inner())
    }

    #[test]
    fn test_argmax_prefers_lowest_index_on_ties() {
        assert_eq!(argmax(&[0.0, 3.0, 1.0, 3.0]).unwrap(), 1);
        assert_eq!(argmax(&[2.0; 10]).unwrap(), 0);
        assert_eq!(argmax(&[-5.0, -1.0, -1.0]).unwrap(), 1);
    }

    #[test]
    fn test_argmax_rejects_non_finite() {
        assert!(matches!(argmax(&[0.0, f32::NAN]), Err(DigitError::Internal(_))));
        assert!(matches!(argmax(&[f32::INFINITY]), Err(DigitError::Internal(_))));
        assert!(matches!(argmax(&[]), Err(DigitError::Internal(_))));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0, 1000.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[3] > 0.99);
    }

    #[test]
    fn test_classify_any_image_returns_digit() {
        let service = service();
        let payloads = [
            to_base64(DynamicImage::ImageLuma8(GrayImage::from_pixel(28, 28, Luma([0])))),
            to_base64(DynamicImage::ImageLuma8(GrayImage::from_pixel(1, 1, Luma([255])))),
            to_base64(DynamicImage::ImageRgb8(RgbImage::from_pixel(
                64,
                17,
                Rgb([200, 30, 90]),
            ))),
        ];

        for payload in &payloads {
            let label = service.classify(payload).unwrap();
            assert!(label <= 9);
        }
    }

    #[test]
    fn test_prediction_is_consistent() {
        let service = service();
        let payload = to_base64(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            40,
            40,
            Luma([180]),
        )));

        let prediction = service.predict(&payload).unwrap();
        assert_eq!(prediction.logits.len(), 10);
        assert_eq!(prediction.label, argmax(&prediction.logits).unwrap());
        assert!(prediction.confidence > 0.0 && prediction.confidence <= 1.0);
        assert_eq!(service.classify(&payload).unwrap(), prediction.label);
    }

    #[test]
    fn test_invalid_payloads_are_input_errors() {
        let service = service();

        assert!(matches!(
            service.classify("not-base64!!"),
            Err(DigitError::Input(InputError::Decode(_)))
        ));

        let text = STANDARD.encode("just some words");
        assert!(matches!(
            service.classify(&text),
            Err(DigitError::Input(InputError::UnrecognizedFormat))
        ));
    }

    #[test]
    fn test_data_uri_prefix_does_not_change_label() {
        let service = service();
        let mut img = GrayImage::new(28, 28);
        for y in 4..24 {
            img.put_pixel(14, y, Luma([255]));
        }
        let payload = to_base64(DynamicImage::ImageLuma8(img));

        let plain = service.predict(&payload).unwrap();
        let prefixed = service
            .predict(&format!("data:image/png;base64,{}", payload))
            .unwrap();
        assert_eq!(plain, prefixed);
    }

    #[test]
    fn test_label_survives_checkpoint_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let original = service();
        let written = save_classifier(original.model(), &temp_dir.path().join("mnist")).unwrap();

        let restored =
            InferenceService::<TestBackend>::from_checkpoint(&written, Default::default()).unwrap();

        let white = to_base64(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            28,
            28,
            Luma([255]),
        )));
        assert_eq!(
            original.classify(&white).unwrap(),
            restored.classify(&white).unwrap()
        );
    }

    #[test]
    fn test_missing_checkpoint_is_not_found() {
        let result = InferenceService::<TestBackend>::from_checkpoint(
            Path::new("/nonexistent/mnist_cnn.pt"),
            Default::default(),
        );
        assert!(matches!(result, Err(DigitError::CheckpointNotFound(_))));
    }
}
