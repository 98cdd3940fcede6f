//! Predictor abstraction
//!
//! A predictor is the trained separation network seen as a black box: it maps
//! a batched waveform `[1, channels, samples]` to `[1, sources, channels, samples]`
//! and tells the engine which input length it accepts for a desired output
//! length. The engine never looks inside.

use std::sync::Arc;

use ndarray::{Array4, ArrayView3};
use serde::{Deserialize, Serialize};

use crate::error::DemixResult;

/// Trained source separation network
pub trait Predictor: Send + Sync {
    /// Run inference on a batched waveform `[1, channels, samples]`.
    ///
    /// Returns `[1, sources, channels, samples']` with `samples' >= samples`.
    /// Inference only: implementations keep no training state.
    fn predict(&self, input: ArrayView3<'_, f32>) -> DemixResult<Array4<f32>>;

    /// Minimum input length the network accepts to produce `length` samples.
    ///
    /// Must return a value `>= length`.
    fn valid_length(&self, length: usize) -> usize;
}

impl<P: Predictor + ?Sized> Predictor for &P {
    fn predict(&self, input: ArrayView3<'_, f32>) -> DemixResult<Array4<f32>> {
        (**self).predict(input)
    }

    fn valid_length(&self, length: usize) -> usize {
        (**self).valid_length(length)
    }
}

impl<P: Predictor + ?Sized> Predictor for Box<P> {
    fn predict(&self, input: ArrayView3<'_, f32>) -> DemixResult<Array4<f32>> {
        (**self).predict(input)
    }

    fn valid_length(&self, length: usize) -> usize {
        (**self).valid_length(length)
    }
}

impl<P: Predictor + ?Sized> Predictor for Arc<P> {
    fn predict(&self, input: ArrayView3<'_, f32>) -> DemixResult<Array4<f32>> {
        (**self).predict(input)
    }

    fn valid_length(&self, length: usize) -> usize {
        (**self).valid_length(length)
    }
}

/// Input length rule of a network architecture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidLength {
    /// Any length is accepted as-is (Conv-TasNet style)
    Exact,
    /// Length rounded up to a multiple of `of`
    Multiple { of: usize },
    /// Demucs U-Net: strided convolutions with a context convolution per
    /// encoder layer, mirrored transposed convolutions in the decoder
    Demucs {
        depth: usize,
        kernel_size: usize,
        stride: usize,
        context: usize,
        /// Input is upsampled 2x before the encoder
        resample: bool,
    },
}

impl Default for ValidLength {
    fn default() -> Self {
        Self::demucs()
    }
}

impl ValidLength {
    /// Stock Demucs geometry (depth 6, kernel 8, stride 4, context 3, 2x resampling)
    pub fn demucs() -> Self {
        Self::Demucs {
            depth: 6,
            kernel_size: 8,
            stride: 4,
            context: 3,
            resample: true,
        }
    }

    /// Minimum accepted input length for `length` output samples
    pub fn apply(&self, length: usize) -> usize {
        match *self {
            ValidLength::Exact => length,
            ValidLength::Multiple { of } => {
                let of = of.max(1);
                length.div_ceil(of) * of
            }
            ValidLength::Demucs {
                depth,
                kernel_size,
                stride,
                context,
                resample,
            } => {
                let stride = stride.max(1);
                let mut length = if resample { length * 2 } else { length };

                for _ in 0..depth {
                    length = length.saturating_sub(kernel_size).div_ceil(stride) + 1;
                    length = length.max(1);
                    length += context.saturating_sub(1);
                }
                for _ in 0..depth {
                    length = (length - 1) * stride + kernel_size;
                }

                if resample { length.div_ceil(2) } else { length }
            }
        }
    }
}

/// Closure-backed predictor
///
/// Handy for embedding a network that is driven by other code, and for
/// substituting a stub during tests.
pub struct FnPredictor<F> {
    func: F,
    geometry: ValidLength,
}

impl<F> FnPredictor<F>
where
    F: Fn(ArrayView3<'_, f32>) -> DemixResult<Array4<f32>> + Send + Sync,
{
    pub fn new(geometry: ValidLength, func: F) -> Self {
        Self { func, geometry }
    }
}

impl<F> Predictor for FnPredictor<F>
where
    F: Fn(ArrayView3<'_, f32>) -> DemixResult<Array4<f32>> + Send + Sync,
{
    fn predict(&self, input: ArrayView3<'_, f32>) -> DemixResult<Array4<f32>> {
        (self.func)(input)
    }

    fn valid_length(&self, length: usize) -> usize {
        self.geometry.apply(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array3, Axis};

    #[test]
    fn test_exact_geometry() {
        assert_eq!(ValidLength::Exact.apply(0), 0);
        assert_eq!(ValidLength::Exact.apply(12345), 12345);
    }

    #[test]
    fn test_multiple_geometry() {
        let geometry = ValidLength::Multiple { of: 64 };
        assert_eq!(geometry.apply(0), 0);
        assert_eq!(geometry.apply(1), 64);
        assert_eq!(geometry.apply(64), 64);
        assert_eq!(geometry.apply(65), 128);
    }

    #[test]
    fn test_demucs_geometry_covers_length() {
        let geometry = ValidLength::demucs();
        let mut previous = 0;
        for length in [1usize, 100, 4096, 44100, 44101, 640_000, 1_000_000] {
            let valid = geometry.apply(length);
            assert!(valid >= length, "{valid} < {length}");
            assert!(valid >= previous);
            previous = valid;
        }
    }

    #[test]
    fn test_demucs_geometry_without_resample() {
        // depth 1: ceil((100 - 8) / 4) + 1 = 24, + 2 context = 26, back = 25 * 4 + 8
        let geometry = ValidLength::Demucs {
            depth: 1,
            kernel_size: 8,
            stride: 4,
            context: 3,
            resample: false,
        };
        assert_eq!(geometry.apply(100), 108);
    }

    #[test]
    fn test_geometry_serde() {
        let json = serde_json::to_string(&ValidLength::Multiple { of: 8 }).unwrap();
        assert_eq!(json, r#"{"kind":"multiple","of":8}"#);
        let back: ValidLength = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ValidLength::Multiple { of: 8 });
    }

    #[test]
    fn test_fn_predictor_through_references() {
        let predictor = FnPredictor::new(ValidLength::Multiple { of: 4 }, |input| {
            let source = input.index_axis(Axis(0), 0).to_owned();
            Ok(ndarray::stack(Axis(0), &[source.view(); 4])
                .unwrap()
                .insert_axis(Axis(0)))
        });
        let boxed: Box<dyn Predictor> = Box::new(predictor);
        let shared: Arc<dyn Predictor> = Arc::from(boxed);

        assert_eq!((&shared).valid_length(5), 8);
        let out = shared.predict(Array3::<f32>::ones((1, 2, 8)).view()).unwrap();
        assert_eq!(out.shape(), &[1, 4, 2, 8]);
    }
}
