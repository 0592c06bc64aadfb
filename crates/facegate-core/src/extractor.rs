//! Face embedding extraction via ONNX Runtime.
//!
//! Maps a preprocessed (binarized) face image to a fixed-length embedding
//! using a FaceNet-style model with a 160×160 input.

use crate::types::Embedding;
use image::{imageops, GrayImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

// --- Named constants ---
const MODEL_INPUT_SIZE: u32 = 160;
/// Fixed output dimensionality of the embedding model.
pub const EMBEDDING_DIM: usize = 128;

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("model file not found: {0} — place the embedding model in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("model produced a {actual}-dim embedding, expected {expected} — wrong model artifact?")]
    EmbeddingDimMismatch { expected: usize, actual: usize },
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Maps a preprocessed image to a fixed-length embedding.
///
/// Implementations must be pure with respect to call history: identical
/// pixel content yields identical embeddings.
pub trait EmbeddingExtractor {
    fn extract(&mut self, image: &GrayImage) -> Result<Embedding, ExtractorError>;
}

/// ONNX-backed extractor. Loading is a startup-time dependency: a missing
/// or incompatible model is fatal for the process, not a per-request error.
#[derive(Debug)]
pub struct OnnxExtractor {
    session: Session,
}

impl OnnxExtractor {
    /// Load the embedding model from the given path. Fails fast so the
    /// serving layer can refuse to start rather than fail on first use.
    pub fn load(model_path: &str) -> Result<Self, ExtractorError> {
        if !Path::new(model_path).exists() {
            return Err(ExtractorError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded embedding model"
        );

        Ok(Self { session })
    }

    /// Resize to the model's square input and normalize samples to [0, 1],
    /// replicating the single channel into a (1, 3, H, W) NCHW tensor.
    fn image_to_tensor(image: &GrayImage) -> Array4<f32> {
        let resized = imageops::resize(
            image,
            MODEL_INPUT_SIZE,
            MODEL_INPUT_SIZE,
            imageops::FilterType::Triangle,
        );

        let size = MODEL_INPUT_SIZE as usize;
        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for y in 0..size {
            for x in 0..size {
                let normalized = resized.get_pixel(x as u32, y as u32).0[0] as f32 / 255.0;
                tensor[[0, 0, y, x]] = normalized;
                tensor[[0, 1, y, x]] = normalized;
                tensor[[0, 2, y, x]] = normalized;
            }
        }
        tensor
    }
}

impl EmbeddingExtractor for OnnxExtractor {
    /// Single forward pass; no batching state retained between calls.
    fn extract(&mut self, image: &GrayImage) -> Result<Embedding, ExtractorError> {
        let input = Self::image_to_tensor(image);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractorError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let values: Vec<f32> = raw_data.to_vec();
        if values.len() != EMBEDDING_DIM {
            return Err(ExtractorError::EmbeddingDimMismatch {
                expected: EMBEDDING_DIM,
                actual: values.len(),
            });
        }

        Ok(Embedding::new(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_test_image(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            image::Luma([if (x + y) % 2 == 0 { 255 } else { 0 }])
        })
    }

    #[test]
    fn tensor_shape_is_nchw() {
        let tensor = OnnxExtractor::image_to_tensor(&binary_test_image(64, 48));
        assert_eq!(tensor.shape(), &[1, 3, 160, 160]);
    }

    #[test]
    fn tensor_values_normalized_to_unit_range() {
        let tensor = OnnxExtractor::image_to_tensor(&binary_test_image(160, 160));
        for &v in tensor.iter() {
            assert!((0.0..=1.0).contains(&v), "sample {v} outside [0, 1]");
        }
    }

    #[test]
    fn tensor_full_white_maps_to_one() {
        let img = GrayImage::from_pixel(160, 160, image::Luma([255]));
        let tensor = OnnxExtractor::image_to_tensor(&img);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 159, 159]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn tensor_channels_identical() {
        let tensor = OnnxExtractor::image_to_tensor(&binary_test_image(80, 120));
        for y in 0..160 {
            for x in 0..160 {
                let r = tensor[[0, 0, y, x]];
                assert_eq!(r, tensor[[0, 1, y, x]]);
                assert_eq!(r, tensor[[0, 2, y, x]]);
            }
        }
    }

    #[test]
    fn tensor_building_is_deterministic() {
        let img = binary_test_image(97, 61);
        assert_eq!(
            OnnxExtractor::image_to_tensor(&img),
            OnnxExtractor::image_to_tensor(&img)
        );
    }

    #[test]
    fn load_missing_model_fails_fast() {
        let err = OnnxExtractor::load("/nonexistent/facenet.onnx").unwrap_err();
        assert!(matches!(err, ExtractorError::ModelNotFound(_)));
    }
}
