//! # rf-demix: Music Source Separation Engine
//!
//! Applies a pretrained separation network to a mix of any length and
//! returns 4 stems (drums, bass, other, vocals) with exactly the mix length.
//!
//! ## Architecture
//!
//! ```text
//! mix [C, L] ──► apply_model ──┬─ split ──► windows of CHUNK_SAMPLES ─┐
//!                              ├─ shifts ─► random offsets < MAX_SHIFT ┤
//!                              └─ single ◄─────────────────────────────┘
//!                                   pad to valid_length
//!                                   Predictor::predict
//!                                   center_trim back to L
//! ```
//!
//! The network itself is opaque behind [`Predictor`]; [`OnnxPredictor`]
//! runs exported models with tract (pure Rust, CPU). [`separation::Separator`]
//! adds the normalization and stem naming done around the engine.

pub mod apply;
pub mod audio;
pub mod format;
pub mod models;
pub mod normalize;
pub mod separation;

mod error;
mod inference;
mod predictor;
mod trim;

pub use apply::{ApplyOptions, Strategy, apply_model, apply_single, draw_offsets};
pub use error::{DemixError, DemixResult};
pub use inference::OnnxPredictor;
pub use predictor::{FnPredictor, Predictor, ValidLength};
pub use trim::{TrimReference, center_trim};

/// Number of separated sources (drums, bass, other, vocals)
pub const SOURCES: usize = 4;

/// Sample rate the models are trained at
pub const SAMPLE_RATE: u32 = 44100;

/// Upper bound (exclusive) of random shift offsets, 0.5s at 44.1kHz
pub const MAX_SHIFT: usize = 22050;

/// Window length in split mode
pub const CHUNK_SAMPLES: usize = 80_000 * 8;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
