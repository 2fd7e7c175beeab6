use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-plan rules for picking the translation target and the TTS voice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguagePolicy {
    /// Target for sources not listed in `alternate_sources`.
    pub default_target: String,
    pub alternate_target: String,
    /// Primary subtags translated into `alternate_target` instead.
    pub alternate_sources: Vec<String>,
    /// Target language → voice.
    pub voices: HashMap<String, String>,
    pub default_voice: String,
}

impl Default for LanguagePolicy {
    fn default() -> Self {
        let voices = [("en", "alloy"), ("zh", "nova"), ("es", "echo"), ("fr", "shimmer")]
            .into_iter()
            .map(|(lang, voice)| (lang.to_string(), voice.to_string()))
            .collect();
        Self {
            default_target: "zh".to_string(),
            alternate_target: "en".to_string(),
            alternate_sources: vec!["zh".to_string()],
            voices,
            default_voice: "alloy".to_string(),
        }
    }
}

impl LanguagePolicy {
    /// Translation target for a detected source language.
    pub fn target_for(&self, source: &str) -> String {
        let primary = primary_subtag(source);
        if self
            .alternate_sources
            .iter()
            .any(|s| s.eq_ignore_ascii_case(primary))
        {
            self.alternate_target.clone()
        } else {
            self.default_target.clone()
        }
    }

    /// Voice for synthesizing `target`: exact tag, then primary subtag, then default.
    pub fn voice_for(&self, target: &str) -> String {
        self.voices
            .get(target)
            .or_else(|| self.voices.get(primary_subtag(target)))
            .cloned()
            .unwrap_or_else(|| self.default_voice.clone())
    }
}

/// "zh-TW" → "zh", "en_US" → "en".
pub fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag)
}

/// Canonicalizes a language tag or English language name.
///
/// Recognizers report either ISO codes ("en", "zh_tw") or names ("english").
/// Returns `None` for blank input.
pub fn normalize_language(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase().replace('_', "-");

    let named = match lower.as_str() {
        "english" => Some("en"),
        "chinese" | "mandarin" => Some("zh"),
        "cantonese" => Some("zh-HK"),
        "japanese" => Some("ja"),
        "korean" => Some("ko"),
        "spanish" => Some("es"),
        "french" => Some("fr"),
        "german" => Some("de"),
        "russian" => Some("ru"),
        "arabic" => Some("ar"),
        "vietnamese" => Some("vi"),
        "thai" => Some("th"),
        "portuguese" => Some("pt"),
        "italian" => Some("it"),
        _ => None,
    };
    if let Some(code) = named {
        return Some(code.to_string());
    }

    let mut parts = lower.splitn(2, '-');
    let primary = parts.next().unwrap_or_default();
    Some(match parts.next() {
        Some(region) if !region.is_empty() => format!("{primary}-{}", region.to_ascii_uppercase()),
        _ => primary.to_string(),
    })
}

/// Guesses a language from the writing system of `text`.
///
/// Only distinguishes scripts, so every Latin-script language comes back as "en".
pub fn detect_script_language(text: &str) -> &'static str {
    let (mut latin, mut han, mut kana, mut hangul, mut thai, mut cyrillic, mut arabic) =
        (0usize, 0usize, 0usize, 0usize, 0usize, 0usize, 0usize);

    for c in text.chars() {
        match c as u32 {
            0x3040..=0x30FF | 0x31F0..=0x31FF => kana += 1,
            0xAC00..=0xD7AF | 0x1100..=0x11FF | 0x3130..=0x318F => hangul += 1,
            0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF => han += 1,
            0x0E00..=0x0E7F => thai += 1,
            0x0400..=0x04FF => cyrillic += 1,
            0x0600..=0x06FF | 0x0750..=0x077F => arabic += 1,
            _ if c.is_ascii_alphabetic() => latin += 1,
            _ => {}
        }
    }

    // Japanese mixes kana with Han characters.
    if kana > 0 && kana + han >= latin {
        return "ja";
    }
    let scripts = [
        (hangul, "ko"),
        (han, "zh"),
        (thai, "th"),
        (cyrillic, "ru"),
        (arabic, "ar"),
    ];
    scripts
        .into_iter()
        .filter(|(count, _)| *count > 0 && *count >= latin)
        .max_by_key(|(count, _)| *count)
        .map(|(_, lang)| lang)
        .unwrap_or("en")
}

/// English name of a language, used in translation prompts.
pub fn language_name(code: &str) -> &str {
    match code {
        "zh-TW" | "zh-HK" => "Traditional Chinese",
        _ => match primary_subtag(code) {
            "en" => "English",
            "zh" => "Chinese",
            "ja" => "Japanese",
            "ko" => "Korean",
            "es" => "Spanish",
            "fr" => "French",
            "de" => "German",
            "ru" => "Russian",
            "ar" => "Arabic",
            "vi" => "Vietnamese",
            "th" => "Thai",
            "pt" => "Portuguese",
            "it" => "Italian",
            _ => code,
        },
    }
}
