//! ONNX predictor
//!
//! Runs an exported separation network with tract (pure Rust, CPU). The graph
//! must take `[1, channels, samples]` and return `[1, sources, channels, samples']`
//! as its first output; the input length rule is supplied separately since it
//! cannot be recovered from the graph.

use std::path::Path;

use ndarray::{Array4, ArrayView3};

use crate::error::{DemixError, DemixResult};
use crate::predictor::{Predictor, ValidLength};

/// Tract model wrapper
struct TractModel {
    model: tract_onnx::prelude::SimplePlan<
        tract_onnx::prelude::TypedFact,
        Box<dyn tract_onnx::prelude::TypedOp>,
        tract_onnx::prelude::Graph<
            tract_onnx::prelude::TypedFact,
            Box<dyn tract_onnx::prelude::TypedOp>,
        >,
    >,
}

/// Separation network loaded from an ONNX file
pub struct OnnxPredictor {
    tract_model: TractModel,
    geometry: ValidLength,
    name: String,
}

impl OnnxPredictor {
    /// Load and optimize the model at `model_path`
    pub fn new<P: AsRef<Path>>(model_path: P, geometry: ValidLength) -> DemixResult<Self> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(DemixError::ModelNotFound {
                path: path.display().to_string(),
            });
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();

        log::info!("Loading model {} ({:?})", path.display(), geometry);
        let tract_model = Self::load_tract_model(path)?;

        Ok(Self {
            tract_model,
            geometry,
            name,
        })
    }

    /// Load tract model
    fn load_tract_model(path: &Path) -> DemixResult<TractModel> {
        use tract_onnx::prelude::*;

        let model = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| DemixError::Tract(e.to_string()))?
            .into_optimized()
            .map_err(|e| DemixError::Tract(e.to_string()))?
            .into_runnable()
            .map_err(|e| DemixError::Tract(e.to_string()))?;

        Ok(TractModel { model })
    }

    /// Model name (file stem)
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> ValidLength {
        self.geometry
    }

    /// Run the plan on one `[batch, channels, samples]` tensor
    fn run_tract(&self, input: ArrayView3<'_, f32>) -> DemixResult<Array4<f32>> {
        use tract_onnx::prelude::*;

        let samples: Vec<f32> = input.iter().copied().collect();
        let tensor = Tensor::from_shape(input.shape(), &samples)
            .map_err(|e| DemixError::Tract(e.to_string()))?;

        let outputs = self
            .tract_model
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| DemixError::Predictor {
                reason: e.to_string(),
            })?;

        let Some(output) = outputs.first() else {
            return Err(DemixError::Predictor {
                reason: "No output from model".into(),
            });
        };

        let shape = output.shape().to_vec();
        if shape.len() != 4 {
            return Err(DemixError::InvalidOutputShape {
                expected: "4D tensor [batch, sources, channels, samples]".into(),
                got: format!("{}D tensor {:?}", shape.len(), shape),
            });
        }

        let data = output
            .as_slice::<f32>()
            .map_err(|e| DemixError::Tract(e.to_string()))?
            .to_vec();

        Array4::from_shape_vec((shape[0], shape[1], shape[2], shape[3]), data).map_err(|e| {
            DemixError::InvalidOutputShape {
                expected: format!("{:?}", shape),
                got: e.to_string(),
            }
        })
    }
}

impl Predictor for OnnxPredictor {
    fn predict(&self, input: ArrayView3<'_, f32>) -> DemixResult<Array4<f32>> {
        log::debug!("{}: inference on {:?}", self.name, input.shape());
        self.run_tract(input)
    }

    fn valid_length(&self, length: usize) -> usize {
        self.geometry.apply(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_file() {
        let err = OnnxPredictor::new("/nonexistent/demucs.onnx", ValidLength::demucs())
            .err()
            .unwrap();
        match err {
            DemixError::ModelNotFound { path } => assert!(path.ends_with("demucs.onnx")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_model_file() {
        let file = tempfile::Builder::new().suffix(".onnx").tempfile().unwrap();
        std::fs::write(file.path(), b"not an onnx graph").unwrap();

        let result = OnnxPredictor::new(file.path(), ValidLength::Exact);
        assert!(matches!(result, Err(DemixError::Tract(_))));
    }
}
