//! Configuration snapshot and lenient text parsing (part of C6).
//!
//! `update_config` is handed free-form text that conventionally resembles a
//! JSON document but is not required to be well-formed. The primary parser
//! tries strict JSON first (via `serde_json`, already a teacher dependency)
//! and falls back to a tolerant substring scan ported from the original
//! prototype's `parseGlobalSensitivity` / `parseKeywordCount`. Either way,
//! unknown fields are ignored and malformed values fall back to the
//! documented defaults — that fallback behaviour, not the parsing
//! algorithm, is the testable contract (spec.md §9).

pub const DEFAULT_GLOBAL_SENSITIVITY: f32 = 0.85;
pub const DEFAULT_ATTACK_MS: f32 = 10.0;
pub const DEFAULT_RELEASE_MS: f32 = 50.0;

/// Immutable once built; `update_config` replaces the whole snapshot rather
/// than mutating fields in place.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    pub global_sensitivity: f32,
    pub keyword_count: u32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub raw_text: String,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            global_sensitivity: DEFAULT_GLOBAL_SENSITIVITY,
            keyword_count: 0,
            attack_ms: DEFAULT_ATTACK_MS,
            release_ms: DEFAULT_RELEASE_MS,
            raw_text: String::new(),
        }
    }
}

#[derive(serde::Deserialize, Default)]
struct MaskingFields {
    attack: Option<f32>,
    release: Option<f32>,
}

#[derive(serde::Deserialize, Default)]
struct StrictConfig {
    global_sensitivity: Option<f32>,
    keywords: Option<Vec<serde_json::Value>>,
    masking: Option<MaskingFields>,
}

/// Parses `text` into a [`ConfigSnapshot`], retaining `text` verbatim for
/// diagnostic echo. Never fails: absent or malformed fields fall back to
/// defaults.
pub fn parse_config(text: &str) -> ConfigSnapshot {
    if let Ok(strict) = serde_json::from_str::<StrictConfig>(text) {
        let masking = strict.masking.unwrap_or_default();
        return ConfigSnapshot {
            global_sensitivity: strict
                .global_sensitivity
                .filter(|v| (0.0..=1.0).contains(v))
                .unwrap_or(DEFAULT_GLOBAL_SENSITIVITY),
            keyword_count: strict.keywords.map(|k| k.len() as u32).unwrap_or(0),
            attack_ms: masking.attack.unwrap_or(DEFAULT_ATTACK_MS),
            release_ms: masking.release.unwrap_or(DEFAULT_RELEASE_MS),
            raw_text: text.to_string(),
        };
    }

    ConfigSnapshot {
        global_sensitivity: parse_lenient_sensitivity(text),
        keyword_count: parse_lenient_keyword_count(text),
        attack_ms: parse_lenient_float(text, "\"attack\"").unwrap_or(DEFAULT_ATTACK_MS),
        release_ms: parse_lenient_float(text, "\"release\"").unwrap_or(DEFAULT_RELEASE_MS),
        raw_text: text.to_string(),
    }
}

fn parse_lenient_sensitivity(text: &str) -> f32 {
    parse_lenient_float(text, "\"global_sensitivity\"")
        .filter(|v| (0.0..=1.0).contains(v))
        .unwrap_or(DEFAULT_GLOBAL_SENSITIVITY)
}

fn parse_lenient_keyword_count(text: &str) -> u32 {
    let Some(key_pos) = text.find("\"keywords\"") else {
        return 0;
    };
    let Some(array_start) = text[key_pos..].find('[') else {
        return 0;
    };
    let array_start = key_pos + array_start;
    let mut count = 0u32;
    let mut depth = 0u32;
    for ch in text[array_start + 1..].chars() {
        match ch {
            ']' if depth == 0 => break,
            '{' => {
                if depth == 0 {
                    count += 1;
                }
                depth += 1;
            }
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    count
}

/// Skips spaces, colons, and quotes after `key`, then parses a leading
/// float. Returns `None` if `key` is absent or no number follows.
fn parse_lenient_float(text: &str, key: &str) -> Option<f32> {
    let key_pos = text.find(key)?;
    let mut rest = &text[key_pos + key.len()..];
    rest = rest.trim_start_matches([' ', ':', '"']);
    let end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+' || c == 'e' || c == 'E'))
        .unwrap_or(rest.len());
    rest[..end].parse::<f32>().ok()
}
