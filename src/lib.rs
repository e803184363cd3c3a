//! SilenceGuard core — a real-time speech-content protection pipeline.
//!
//! Sits between a microphone hardware abstraction and its consumer: every
//! captured PCM block is analysed, and when a risky utterance is detected
//! the block is mutated in place so the consumer hears masked audio
//! instead. See `SPEC_FULL.md` for the full component breakdown.
//!
//! Modules map directly onto the component table:
//! - [`ring_buffer`] — C1, fixed-capacity past-audio store.
//! - [`mel`] — C2, PCM → log-Mel spectrogram.
//! - [`inference`] — C3, the `InferenceRuntime` capability trait.
//! - [`confusion`] — C4, phonetic variant table + string similarity.
//! - [`masker`] — C5, envelope-modulated noise injection + legacy fallbacks.
//! - [`engine`] — C6, the process-wide orchestrator.
//! - [`ffi`] / [`bridge`] — C7, the stable boundary surface.

pub mod bridge;
pub mod config;
pub mod confusion;
pub mod engine;
pub mod error;
pub mod ffi;
pub mod inference;
pub mod masker;
pub mod mel;
pub mod ring_buffer;

pub use engine::ProtectionEngine;
pub use error::EngineError;
