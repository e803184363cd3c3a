//! Boundary adapter (C7) — stable `extern "C"` entry points consumed by the
//! hardware proxy and host bridge. 1:1 with the safe API in [`crate::engine`]
//! and [`crate::masker`]; adds no semantics, only the memory-safety
//! conventions spec.md §4.7 requires: NUL-terminated C strings, byte
//! buffers as base+length.

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::path::Path;
use std::slice;

use crate::confusion::ConfusionMatrix;
use crate::engine::ProtectionEngine;
use crate::masker;

use once_cell::sync::Lazy;
use std::sync::Mutex;

/// Pairs the safe [`ConfusionMatrix`] with a cache of NUL-terminated copies
/// of its variant strings, built lazily per target and cleared on every
/// `load`. This gives FFI callers pointers that stay valid for the table's
/// lifetime (per spec.md §4.4: "callers must not use them past the next
/// `load`") without heap-allocating and leaking a fresh `CString` on every
/// call — the cache, not the call, owns the allocation.
struct FfiConfusionMatrix {
    matrix: ConfusionMatrix,
    cstr_cache: HashMap<String, Vec<CString>>,
}

impl FfiConfusionMatrix {
    fn new() -> Self {
        Self {
            matrix: ConfusionMatrix::new(),
            cstr_cache: HashMap::new(),
        }
    }

    fn load(&mut self, path: &Path) -> bool {
        let loaded = self.matrix.load(path);
        self.cstr_cache.clear();
        loaded
    }

    /// Returns up to `max_out` pointers into this cache's own `CString`
    /// storage, populating the cache entry for `target` on first use.
    fn phoneme_variant_ptrs(&mut self, target: &str, max_out: usize) -> Vec<*const c_char> {
        if !self.cstr_cache.contains_key(target) {
            let built: Vec<CString> = self
                .matrix
                .variants(target)
                .map(|variants| {
                    variants
                        .iter()
                        .map(|v| CString::new(v.as_str()).unwrap_or_default())
                        .collect()
                })
                .unwrap_or_default();
            self.cstr_cache.insert(target.to_string(), built);
        }
        self.cstr_cache[target].iter().take(max_out).map(|c| c.as_ptr()).collect()
    }
}

static CONFUSION_MATRIX: Lazy<Mutex<FfiConfusionMatrix>> = Lazy::new(|| Mutex::new(FfiConfusionMatrix::new()));

unsafe fn cstr_to_str<'a>(ptr: *const c_char) -> Option<&'a str> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok()
}

/// Returns an opaque handle to the process-wide engine singleton.
#[no_mangle]
pub extern "C" fn ProtectionEngine_getInstance() -> *mut c_void {
    ProtectionEngine::get_instance() as *const ProtectionEngine as *mut c_void
}

/// # Safety
/// `engine` must be a handle obtained from `ProtectionEngine_getInstance`.
/// `buffer` must point to at least `byte_count` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn ProtectionEngine_pushToBuffer(
    engine: *mut c_void,
    buffer: *const u8,
    byte_count: usize,
) {
    if engine.is_null() || buffer.is_null() {
        return;
    }
    let engine = &*(engine as *const ProtectionEngine);
    let bytes = slice::from_raw_parts(buffer, byte_count);
    engine.push_to_buffer(bytes);
}

/// # Safety
/// `engine` must be a handle obtained from `ProtectionEngine_getInstance`.
#[no_mangle]
pub unsafe extern "C" fn ProtectionEngine_shouldIntercept(engine: *mut c_void) -> i32 {
    if engine.is_null() {
        return 0;
    }
    let engine = &*(engine as *const ProtectionEngine);
    i32::from(engine.should_intercept())
}

/// # Safety
/// `engine` must be a handle obtained from `ProtectionEngine_getInstance`.
#[no_mangle]
pub unsafe extern "C" fn ProtectionEngine_setTestInterceptEnabled(engine: *mut c_void, enabled: i32) {
    if engine.is_null() {
        return;
    }
    let engine = &*(engine as *const ProtectionEngine);
    engine.set_test_intercept_enabled(enabled != 0);
}

/// # Safety
/// `engine` must be a handle obtained from `ProtectionEngine_getInstance`.
/// `text` must be NUL-terminated or null.
#[no_mangle]
pub unsafe extern "C" fn ProtectionEngine_updateConfig(engine: *mut c_void, text: *const c_char) {
    if engine.is_null() {
        return;
    }
    let Some(text) = cstr_to_str(text) else {
        return;
    };
    let engine = &*(engine as *const ProtectionEngine);
    engine.update_config(text);
}

/// # Safety
/// `engine` must be a handle obtained from `ProtectionEngine_getInstance`.
/// `word` must be NUL-terminated or null.
#[no_mangle]
pub unsafe extern "C" fn ProtectionEngine_markFalsePositive(
    engine: *mut c_void,
    word: *const c_char,
    timestamp: i64,
) {
    if engine.is_null() {
        return;
    }
    let Some(word) = cstr_to_str(word) else {
        return;
    };
    let engine = &*(engine as *const ProtectionEngine);
    engine.mark_false_positive(word, timestamp);
}

/// # Safety
/// `engine` must be a handle obtained from `ProtectionEngine_getInstance`.
/// `path` must be NUL-terminated or null. May block on file I/O; callers
/// must invoke this off the audio thread.
#[no_mangle]
pub unsafe extern "C" fn ProtectionEngine_loadModel(engine: *mut c_void, path: *const c_char) -> i32 {
    if engine.is_null() {
        return 0;
    }
    let Some(path) = cstr_to_str(path) else {
        return 0;
    };
    let engine = &*(engine as *const ProtectionEngine);
    i32::from(engine.load_model(Path::new(path)))
}

// ---------------------------------------------------------------------------
// Masker / injector helpers
// ---------------------------------------------------------------------------

/// # Safety
/// `buffer` must point to at least `frames` readable+writable `i16` samples.
#[no_mangle]
pub unsafe extern "C" fn AudioInjector_applyBeep(buffer: *mut i16, frames: usize) {
    if buffer.is_null() {
        return;
    }
    let buf = slice::from_raw_parts_mut(buffer, frames);
    masker::apply_beep(buf);
}

/// # Safety
/// `buffer` must point to at least `frames` readable+writable `i16` samples.
#[no_mangle]
pub unsafe extern "C" fn AudioInjector_applyCrossFade(
    buffer: *mut i16,
    frames: usize,
    cross_fade_frames: usize,
) {
    if buffer.is_null() {
        return;
    }
    let buf = slice::from_raw_parts_mut(buffer, frames);
    masker::apply_cross_fade(buf, cross_fade_frames);
}

/// # Safety
/// `buffer` must point to at least `frames` readable+writable `i16` samples.
#[no_mangle]
pub unsafe extern "C" fn AudioInjector_processWithRingBuffer(
    buffer: *mut i16,
    frames: usize,
    cross_fade_frames: usize,
) {
    if buffer.is_null() {
        return;
    }
    let buf = slice::from_raw_parts_mut(buffer, frames);
    masker::process_with_ring_buffer(buf, cross_fade_frames);
}

// ---------------------------------------------------------------------------
// Confusion-matrix helpers
// ---------------------------------------------------------------------------

/// # Safety
/// `path` must be NUL-terminated or null.
#[no_mangle]
pub unsafe extern "C" fn ConfMatrix_load(path: *const c_char) -> i32 {
    let Some(path) = cstr_to_str(path) else {
        return 0;
    };
    let mut matrix = CONFUSION_MATRIX.lock().unwrap_or_else(|e| e.into_inner());
    i32::from(matrix.load(Path::new(path)))
}

/// # Safety
/// `target` must be NUL-terminated or null. `out` must point to space for
/// at least `max_out` `*const c_char` pointers; each written pointer is
/// valid only until the next `ConfMatrix_load` call.
#[no_mangle]
pub unsafe extern "C" fn ConfMatrix_getPhonemeVariants(
    target: *const c_char,
    out: *mut *const c_char,
    max_out: i32,
) -> i32 {
    if out.is_null() || max_out <= 0 {
        return 0;
    }
    let Some(target) = cstr_to_str(target) else {
        return 0;
    };
    let mut matrix = CONFUSION_MATRIX.lock().unwrap_or_else(|e| e.into_inner());
    let ptrs = matrix.phoneme_variant_ptrs(target, max_out as usize);
    for (i, ptr) in ptrs.iter().enumerate() {
        *out.add(i) = *ptr;
    }
    ptrs.len() as i32
}

/// Placeholder contract (spec.md §4.4): always returns 0.0.
#[no_mangle]
pub extern "C" fn ConfMatrix_calculatePhonemeSimilarity(
    _a: *const f32,
    _len_a: i32,
    _b: *const f32,
    _len_b: i32,
) -> f32 {
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_instance_is_non_null_and_stable() {
        let h1 = ProtectionEngine_getInstance();
        let h2 = ProtectionEngine_getInstance();
        assert!(!h1.is_null());
        assert_eq!(h1, h2);
    }

    #[test]
    fn push_and_intercept_round_trip_through_ffi() {
        let handle = ProtectionEngine_getInstance();
        unsafe {
            ProtectionEngine_setTestInterceptEnabled(handle, 1);
            assert_eq!(ProtectionEngine_shouldIntercept(handle), 1);
        }
    }

    #[test]
    fn update_config_via_ffi_applies_sensitivity() {
        let handle = ProtectionEngine_getInstance();
        let text = CString::new(r#"{"global_sensitivity": 0.2}"#).unwrap();
        unsafe {
            ProtectionEngine_updateConfig(handle, text.as_ptr());
        }
        let engine = unsafe { &*(handle as *const ProtectionEngine) };
        assert_eq!(engine.config_snapshot().global_sensitivity, 0.2);
    }

    #[test]
    fn null_engine_handle_is_a_safe_no_op() {
        unsafe {
            assert_eq!(ProtectionEngine_shouldIntercept(std::ptr::null_mut()), 0);
            ProtectionEngine_pushToBuffer(std::ptr::null_mut(), std::ptr::null(), 0);
        }
    }

    #[test]
    fn apply_beep_through_ffi_is_bounded() {
        let mut buffer = vec![1000i16; 160];
        unsafe {
            AudioInjector_applyBeep(buffer.as_mut_ptr(), buffer.len());
        }
        for &s in &buffer {
            assert!((s as i32).unsigned_abs() <= 32767);
        }
    }

    #[test]
    fn confmatrix_load_and_lookup_round_trip() {
        let path = std::env::temp_dir().join(format!("ffi_confusion_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"s": ["s", "sh"]}"#).unwrap();
        let c_path = CString::new(path.to_str().unwrap()).unwrap();
        let target = CString::new("s").unwrap();
        let mut out: [*const c_char; 4] = [std::ptr::null(); 4];
        unsafe {
            assert_eq!(ConfMatrix_load(c_path.as_ptr()), 1);
            let n = ConfMatrix_getPhonemeVariants(target.as_ptr(), out.as_mut_ptr(), 4);
            assert_eq!(n, 2);
            assert!(!out[0].is_null());
        }
    }

    #[test]
    fn repeated_lookups_reuse_the_same_cached_pointer() {
        let path = std::env::temp_dir().join(format!("ffi_confusion_stable_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"s": ["s", "sh"]}"#).unwrap();
        let c_path = CString::new(path.to_str().unwrap()).unwrap();
        let target = CString::new("s").unwrap();
        let mut first: [*const c_char; 4] = [std::ptr::null(); 4];
        let mut second: [*const c_char; 4] = [std::ptr::null(); 4];
        unsafe {
            assert_eq!(ConfMatrix_load(c_path.as_ptr()), 1);
            ConfMatrix_getPhonemeVariants(target.as_ptr(), first.as_mut_ptr(), 4);
            ConfMatrix_getPhonemeVariants(target.as_ptr(), second.as_mut_ptr(), 4);
            // Same underlying cache entry: no fresh allocation on the second call.
            assert_eq!(first[0], second[0]);
            assert_eq!(first[1], second[1]);

            let reload_path = std::env::temp_dir().join(format!("ffi_confusion_stable2_{}.json", std::process::id()));
            std::fs::write(&reload_path, r#"{"s": ["sh"]}"#).unwrap();
            let c_reload_path = CString::new(reload_path.to_str().unwrap()).unwrap();
            assert_eq!(ConfMatrix_load(c_reload_path.as_ptr()), 1);
            let mut after_reload: [*const c_char; 4] = [std::ptr::null(); 4];
            let n = ConfMatrix_getPhonemeVariants(target.as_ptr(), after_reload.as_mut_ptr(), 4);
            assert_eq!(n, 1);
        }
    }
}
