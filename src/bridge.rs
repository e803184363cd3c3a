//! Host-bridge method table shape (spec.md §6): the five methods a managed
//! host-runtime layer registers against, here modeled as plain Rust
//! dispatch over the engine singleton. Actual JNI registration lives in the
//! excluded host-runtime bridge; this module gives that bridge a single,
//! stable place to call into.

use std::path::Path;

use crate::engine::ProtectionEngine;

pub fn update_config(text: &str) {
    ProtectionEngine::get_instance().update_config(text);
}

pub fn mark_false_positive(word: &str, timestamp: i64) {
    ProtectionEngine::get_instance().mark_false_positive(word, timestamp);
}

pub fn set_test_intercept_enabled(enabled: bool) {
    ProtectionEngine::get_instance().set_test_intercept_enabled(enabled);
}

/// Liveness probe: ensures the engine singleton is constructed. Has no
/// other effect.
pub fn init_interceptor() {
    let _ = ProtectionEngine::get_instance();
}

pub fn load_model(path: &str) {
    ProtectionEngine::get_instance().load_model(Path::new(path));
}
