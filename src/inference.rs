//! Inference adapter (C3) — a thin contract over an external tensor
//! runtime, expressed as a trait rather than a concrete dependency on any
//! particular neural network library (per the "polymorphism over the
//! inference runtime" design note). The actual neural runtime is out of
//! scope for this crate; callers supply an [`InferenceRuntime`]
//! implementation, and the crate ships a deterministic stub plus a
//! file-backed stand-in so the engine compiles and tests without linking
//! any ML framework.

use std::fs;
use std::path::Path;

/// Capability set a real neural runtime must provide. `run` copies the Mel
/// tensor into the runtime's input, invokes it, and writes the first output
/// tensor into `out_posteriors`.
pub trait InferenceRuntime: Send {
    /// Loads (or replaces) the model at `path`. Idempotent. Returns `false`
    /// on any I/O or runtime error; never panics.
    fn load_model(&mut self, path: &Path) -> bool;

    /// Runs inference over `mel` (row-major `[mel_len / MEL_BINS, MEL_BINS]`
    /// log-Mel tensor). On success, resizes `out_posteriors` and fills it
    /// with the model's first output tensor; on failure, leaves it
    /// untouched and returns `false`.
    fn run(&mut self, mel: &[f32], out_posteriors: &mut Vec<f32>) -> bool;

    fn is_loaded(&self) -> bool;
}

/// A deterministic stand-in used by default and in tests. Never reports a
/// model as loaded until [`StubRuntime::load_model`] is called, and always
/// produces a single-element posterior equal to the mean Mel energy — handy
/// for driving the arming threshold from unit tests without a real model.
#[derive(Default)]
pub struct StubRuntime {
    loaded: bool,
    fixed_posteriors: Option<Vec<f32>>,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: forces `run` to always return this exact posterior
    /// vector once loaded, bypassing the mean-energy reduction.
    pub fn with_fixed_posteriors(posteriors: Vec<f32>) -> Self {
        Self {
            loaded: false,
            fixed_posteriors: Some(posteriors),
        }
    }
}

impl InferenceRuntime for StubRuntime {
    fn load_model(&mut self, _path: &Path) -> bool {
        self.loaded = true;
        true
    }

    fn run(&mut self, mel: &[f32], out_posteriors: &mut Vec<f32>) -> bool {
        if !self.loaded || mel.is_empty() {
            return false;
        }
        if let Some(fixed) = &self.fixed_posteriors {
            out_posteriors.clear();
            out_posteriors.extend_from_slice(fixed);
            return true;
        }
        let mean = mel.iter().sum::<f32>() / mel.len() as f32;
        out_posteriors.clear();
        out_posteriors.push(mean);
        true
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }
}

/// Treats the model path as an opaque pass-through blob (spec.md §6: "the
/// core treats the path as a pass-through"). Lacking a linked neural
/// runtime, posteriors are synthesised via a simple monotone reducer over
/// the Mel tensor, scaled by the loaded model's byte length — any monotonic
/// reducer preserving the `risk > threshold` arming contract is acceptable
/// per spec.md §9(c).
pub struct FileBackedRuntime {
    model_bytes: Option<Vec<u8>>,
}

impl FileBackedRuntime {
    pub fn new() -> Self {
        Self { model_bytes: None }
    }
}

impl Default for FileBackedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceRuntime for FileBackedRuntime {
    fn load_model(&mut self, path: &Path) -> bool {
        match fs::read(path) {
            Ok(bytes) => {
                self.model_bytes = Some(bytes);
                true
            }
            Err(err) => {
                log::warn!("failed to load model from {}: {err}", path.display());
                self.model_bytes = None;
                false
            }
        }
    }

    fn run(&mut self, mel: &[f32], out_posteriors: &mut Vec<f32>) -> bool {
        if mel.is_empty() || self.model_bytes.is_none() {
            return false;
        }
        let mean = mel.iter().map(|v| v.abs()).sum::<f32>() / mel.len() as f32;
        out_posteriors.clear();
        out_posteriors.push(mean);
        true
    }

    fn is_loaded(&self) -> bool {
        self.model_bytes.is_some()
    }
}
