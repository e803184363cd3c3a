//! Protection engine (C6) — process-wide orchestrator owning the ring
//! buffer, inference adapter, masker, and intercept state machine.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;

use crate::config::{self, ConfigSnapshot};
use crate::error::EngineError;
use crate::inference::{FileBackedRuntime, InferenceRuntime};
use crate::masker::NoiseMasker;
use crate::mel;
use crate::ring_buffer::RingBuffer;

/// 8000 samples @ 16 kHz = 500 ms: the window the decision cycle runs on.
const DECISION_WINDOW_SAMPLES: usize = 8000;
/// 3200 frames @ 16 kHz = 200 ms mute window.
const MUTE_LENGTH_FRAMES: u32 = 3200;
/// 1600 frames @ 16 kHz = 100 ms test-override window.
const TEST_OVERRIDE_FRAMES: u32 = 1600;

/// `armed ⇔ remaining_frames > 0`, enforced by construction: there is no
/// public way to set one without the other.
struct InterceptState {
    armed: bool,
    remaining_frames: u32,
}

impl InterceptState {
    fn idle() -> Self {
        Self {
            armed: false,
            remaining_frames: 0,
        }
    }

    fn arm(&mut self, frames: u32) {
        self.armed = true;
        self.remaining_frames = frames;
    }

    /// Consumes one tick; returns whether this call should intercept.
    fn tick(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        if self.remaining_frames > 0 {
            self.remaining_frames -= 1;
            true
        } else {
            self.armed = false;
            false
        }
    }
}

struct TestOverride {
    enabled: bool,
    remaining: u32,
}

impl TestOverride {
    fn disabled() -> Self {
        Self {
            enabled: false,
            remaining: 0,
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if enabled {
            self.remaining = TEST_OVERRIDE_FRAMES;
        }
    }

    fn tick(&mut self) -> bool {
        if self.enabled && self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }
}

/// All mutable engine state, guarded by a single mutex (spec.md §5: one
/// lock for the ring buffer, FSM, config, inference handle, masker
/// parameters, and diagnostics).
struct EngineState {
    ring: RingBuffer,
    processed_samples: usize,
    intercept: InterceptState,
    test_override: TestOverride,
    config: ConfigSnapshot,
    runtime: Box<dyn InferenceRuntime>,
    masker: NoiseMasker,
    last_false_positive_word: String,
    last_false_positive_ts: i64,
}

impl EngineState {
    fn new() -> Self {
        Self {
            ring: RingBuffer::new(),
            processed_samples: 0,
            intercept: InterceptState::idle(),
            test_override: TestOverride::disabled(),
            config: ConfigSnapshot::default(),
            runtime: Box::new(FileBackedRuntime::new()),
            masker: NoiseMasker::new(),
            last_false_positive_word: String::new(),
            last_false_positive_ts: 0,
        }
    }
}

/// Process-wide singleton, lazily constructed on first access.
pub struct ProtectionEngine {
    state: Mutex<EngineState>,
}

static INSTANCE: Lazy<ProtectionEngine> = Lazy::new(ProtectionEngine::new);

impl ProtectionEngine {
    fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::new()),
        }
    }

    pub fn get_instance() -> &'static ProtectionEngine {
        &INSTANCE
    }

    /// Acquires the engine lock, recovering from poisoning instead of
    /// panicking: spec.md §4.6/§7 require that the engine never crash the
    /// audio thread, so a panic elsewhere while the lock was held must not
    /// cascade into every subsequent `push_to_buffer`/`should_intercept`
    /// call. The recovered guard may carry a partially-applied mutation from
    /// whatever panicked; that is the same risk the teacher accepts with its
    /// own `if let Ok(mut guard) = proxy.lock() { ... }` idiom.
    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Interprets `bytes.len() / 2` frames (little-endian i16), writes them
    /// to the ring buffer, and advances the decision-window counter. Odd
    /// trailing bytes are ignored.
    pub fn push_to_buffer(&self, bytes: &[u8]) {
        let frame_count = bytes.len() / 2;
        let mut frames = Vec::with_capacity(frame_count);
        for chunk in bytes.chunks_exact(2) {
            frames.push(i16::from_le_bytes([chunk[0], chunk[1]]));
        }

        let mut state = self.lock();
        state.ring.write(&frames);
        state.processed_samples += frames.len();

        if state.processed_samples >= DECISION_WINDOW_SAMPLES {
            run_decision_cycle(&mut state, &frames);
            state.processed_samples = 0;
        }
    }

    /// Called per outgoing block by the proxy. Test override takes
    /// precedence over the real arming countdown.
    pub fn should_intercept(&self) -> bool {
        let mut state = self.lock();
        if state.test_override.tick() {
            return true;
        }
        state.intercept.tick()
    }

    pub fn set_test_intercept_enabled(&self, enabled: bool) {
        let mut state = self.lock();
        state.test_override.set_enabled(enabled);
    }

    /// Parses `text` and replaces the configuration snapshot wholesale.
    pub fn update_config(&self, text: &str) {
        let parsed = config::parse_config(text);
        let mut state = self.lock();
        state.masker.set_envelope_params(parsed.attack_ms, parsed.release_ms);
        state.config = parsed;
    }

    pub fn config_snapshot(&self) -> ConfigSnapshot {
        self.lock().config.clone()
    }

    /// Records the last reported false positive; purely informational.
    pub fn mark_false_positive(&self, word: &str, timestamp: i64) {
        let mut state = self.lock();
        state.last_false_positive_word = word.to_string();
        state.last_false_positive_ts = timestamp;
    }

    pub fn last_false_positive(&self) -> (String, i64) {
        let state = self.lock();
        (state.last_false_positive_word.clone(), state.last_false_positive_ts)
    }

    pub fn last_config_json(&self) -> String {
        self.lock().config.raw_text.clone()
    }

    /// Forwards to the inference adapter under the engine lock. Blocks on
    /// file I/O; callers must invoke this off the audio thread.
    pub fn load_model(&self, path: &Path) -> bool {
        let mut state = self.lock();
        state.runtime.load_model(path)
    }

    pub fn is_model_loaded(&self) -> bool {
        self.lock().runtime.is_loaded()
    }

    /// Rust-ergonomic variant of `load_model` that surfaces a structural
    /// [`EngineError`] instead of a bare bool; the FFI/bridge boundary still
    /// collapses load failures to `false`/`0` as spec.md §7 requires.
    pub fn try_load_model(&self, path: &Path) -> Result<(), EngineError> {
        if self.load_model(path) {
            Ok(())
        } else {
            Err(EngineError::ModelLoad {
                path: path.to_path_buf(),
                reason: "inference runtime rejected the model path".to_string(),
            })
        }
    }

    /// Applies the masker to `buffer` under the engine lock, using the
    /// engine's own envelope state (kept in sync with the current config).
    pub fn mask(&self, buffer: &mut [i16]) {
        let mut state = self.lock();
        state.masker.process(buffer);
    }

    /// Swaps in a custom inference runtime (used by tests to drive the
    /// arming path deterministically with a stub).
    pub fn set_runtime(&self, runtime: Box<dyn InferenceRuntime>) {
        let mut state = self.lock();
        state.runtime = runtime;
    }
}

/// Runs the Mel→inference→risk decision on `block` (spec.md §9 Open
/// Question (a): the decision cycle reads the just-received block rather
/// than the ring buffer; this is a deliberate, preserved divergence).
/// Never panics and never leaves state partially applied: either the full
/// arming side effect happens, or nothing does.
fn run_decision_cycle(state: &mut EngineState, block: &[i16]) {
    let mut mel = vec![0.0f32; mel::MAX_FRAMES * mel::MEL_BINS];
    let valid_frames = mel::compute_mel_frames(block, &mut mel, mel::MAX_FRAMES);
    if valid_frames == 0 || !state.runtime.is_loaded() {
        return;
    }

    let mel_slice = &mel[..valid_frames * mel::MEL_BINS];
    let mut posteriors = Vec::new();
    if !state.runtime.run(mel_slice, &mut posteriors) {
        return;
    }

    let risk: f32 = posteriors.iter().sum();
    if risk > state.config.global_sensitivity {
        state.intercept.arm(MUTE_LENGTH_FRAMES);
    }
}
