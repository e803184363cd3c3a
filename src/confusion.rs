//! Phonetic variant confusion matrix (C4) — a process-wide table loaded
//! from a text resource mapping a key to a list of variant strings (e.g.
//! `"s" -> ["s", "sh", "x"]`), plus Levenshtein-based string similarity.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::Context;

use crate::error::EngineError;

/// Internal plumbing: `fs::read_to_string` wrapped with `anyhow` context so
/// the warning logged on failure names the path, not just the raw `io::Error`.
/// The public `load`/`try_load` API still collapses this to `bool`/
/// [`EngineError`] as the boundary contract requires.
fn read_to_string_with_context(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading confusion matrix at {}", path.display()))
}

/// Loaded variant table plus similarity helpers. Owns a process-wide table
/// with explicit load/unload boundaries; re-loading empties the prior
/// contents.
#[derive(Default)]
pub struct ConfusionMatrix {
    table: HashMap<String, Vec<String>>,
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a key-to-variant-list text resource. Accepted formats: strict
    /// JSON object of string arrays (`{"s": ["s", "sh"]}`), or the original
    /// prototype's tolerant scan (quoted keys followed by a bracketed,
    /// quoted list, whitespace-insensitive). Empties the table first, so a
    /// failed re-load leaves an empty — not stale — table. Returns `false`
    /// if the file cannot be read or no entries were parsed.
    pub fn load(&mut self, path: &Path) -> bool {
        self.table.clear();
        let text = match read_to_string_with_context(path) {
            Ok(t) => t,
            Err(err) => {
                log::warn!("failed to read confusion matrix: {err:#}");
                return false;
            }
        };

        if let Ok(parsed) = serde_json::from_str::<HashMap<String, Vec<String>>>(&text) {
            self.table = parsed;
        } else {
            self.table = parse_lenient(&text);
        }

        !self.table.is_empty()
    }

    /// Returns up to `max_out` variant strings for `target`, or an empty
    /// vector if absent.
    pub fn get_phoneme_variants(&self, target: &str, max_out: usize) -> Vec<&str> {
        match self.table.get(target) {
            Some(variants) => variants.iter().take(max_out).map(String::as_str).collect(),
            None => Vec::new(),
        }
    }

    /// Returns the full, unsliced variant list for `target`, borrowed
    /// directly from the table's own storage, or `None` if absent. Used by
    /// the FFI boundary to build NUL-terminated pointers tied to the table's
    /// lifetime instead of allocating a fresh copy per call.
    pub fn variants(&self, target: &str) -> Option<&[String]> {
        self.table.get(target).map(Vec::as_slice)
    }

    pub fn is_loaded(&self) -> bool {
        !self.table.is_empty()
    }

    /// Rust-ergonomic variant of `load` that surfaces a structural
    /// [`EngineError`] instead of a bare bool.
    pub fn try_load(&mut self, path: &Path) -> Result<(), EngineError> {
        if self.load(path) {
            Ok(())
        } else {
            Err(EngineError::ConfusionMatrixLoad {
                path: path.to_path_buf(),
                reason: "file missing, unreadable, or contained no entries".to_string(),
            })
        }
    }
}

/// `1 - edit_distance(a, b) / max(|a|, |b|)`, clamped into `[0, 1]`. Returns
/// `1.0` when both strings are empty.
pub fn string_similarity(a: &str, b: &str) -> f32 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    let dist = edit_distance(a, b);
    (1.0 - dist as f32 / max_len as f32).clamp(0.0, 1.0)
}

/// Placeholder contract for a real posterior-based phonetic similarity
/// (spec.md §4.4: "declared as a placeholder contract, returns 0.0"). The
/// core never depends on this; decoding posteriors into phoneme sequences
/// is a separate collaborator's responsibility.
pub fn calculate_phoneme_similarity(_a: &[f32], _b: &[f32]) -> f32 {
    0.0
}

/// Standard Levenshtein distance (unit insertion/deletion/substitution).
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (m, n) = (a.len(), b.len());
    if m == 0 {
        return n;
    }
    if n == 0 {
        return m;
    }

    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for (i, row) in dp.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=n {
        dp[0][j] = j;
    }
    for i in 1..=m {
        for j in 1..=n {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            dp[i][j] = (dp[i - 1][j] + 1)
                .min(dp[i][j - 1] + 1)
                .min(dp[i - 1][j - 1] + cost);
        }
    }
    dp[m][n]
}

/// Tolerant scan mirroring the original prototype's manual parser: treats
/// quoted substrings as keys/values regardless of surrounding JSON-ish
/// punctuation.
fn parse_lenient(text: &str) -> HashMap<String, Vec<String>> {
    let mut table = HashMap::new();
    let bytes: Vec<char> = text.chars().collect();
    let mut pos = 0usize;

    while pos < bytes.len() {
        let Some(key_start) = find_char(&bytes, pos, '"') else {
            break;
        };
        let Some(key_end) = find_char(&bytes, key_start + 1, '"') else {
            break;
        };
        let key: String = bytes[key_start + 1..key_end].iter().collect();

        let Some(array_start) = find_char(&bytes, key_end, '[') else {
            break;
        };
        let Some(array_end) = find_char(&bytes, array_start, ']') else {
            break;
        };

        let mut values = Vec::new();
        let mut val_pos = array_start + 1;
        while val_pos < array_end {
            let Some(v_start) = find_char(&bytes, val_pos, '"') else {
                break;
            };
            if v_start > array_end {
                break;
            }
            let Some(v_end) = find_char(&bytes, v_start + 1, '"') else {
                break;
            };
            values.push(bytes[v_start + 1..v_end].iter().collect());
            val_pos = v_end + 1;
        }

        table.insert(key, values);
        pos = array_end + 1;
    }

    table
}

fn find_char(haystack: &[char], from: usize, needle: char) -> Option<usize> {
    haystack[from..].iter().position(|&c| c == needle).map(|i| i + from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn string_similarity_is_one_for_identical_strings() {
        assert_eq!(string_similarity("hello", "hello"), 1.0);
        assert_eq!(string_similarity("", ""), 1.0);
    }

    #[test]
    fn string_similarity_reflects_edit_distance() {
        // "s" -> "sh": one insertion, max_len 2 => 1 - 1/2 = 0.5
        assert_eq!(string_similarity("s", "sh"), 0.5);
    }

    #[test]
    fn get_phoneme_variants_empty_when_not_loaded() {
        let matrix = ConfusionMatrix::new();
        assert!(matrix.get_phoneme_variants("s", 8).is_empty());
    }

    #[test]
    fn load_parses_strict_json() {
        let path = write_temp_file("confusion_strict", r#"{"s": ["s", "sh", "x"]}"#);
        let mut matrix = ConfusionMatrix::new();
        assert!(matrix.load(&path));
        assert_eq!(matrix.get_phoneme_variants("s", 8), vec!["s", "sh", "x"]);
    }

    #[test]
    fn load_falls_back_to_lenient_scan() {
        let path = write_temp_file(
            "confusion_lenient",
            "  \"s\" : [ \"s\" , \"sh\" ]  , \"yi\": [\"yi\",\"wei\"] ",
        );
        let mut matrix = ConfusionMatrix::new();
        assert!(matrix.load(&path));
        assert_eq!(matrix.get_phoneme_variants("yi", 8), vec!["yi", "wei"]);
    }

    #[test]
    fn load_clears_prior_table_on_failure() {
        let path = write_temp_file("confusion_clears", r#"{"s": ["s"]}"#);
        let mut matrix = ConfusionMatrix::new();
        assert!(matrix.load(&path));
        assert!(!matrix.load(Path::new("/nonexistent/confusion.json")));
        assert!(matrix.get_phoneme_variants("s", 8).is_empty());
    }

    #[test]
    fn phoneme_similarity_placeholder_returns_zero() {
        assert_eq!(calculate_phoneme_similarity(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn try_load_surfaces_a_typed_error_on_failure() {
        let mut matrix = ConfusionMatrix::new();
        let err = matrix.try_load(Path::new("/nonexistent/confusion.json"));
        assert!(err.is_err());
    }

    fn write_temp_file(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("{name}_{}.json", std::process::id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path
    }
}
