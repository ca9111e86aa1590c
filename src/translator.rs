//! Best-effort machine translation with credential rotation.
//!
//! Translation is an enhancement, never a hard dependency: whatever goes
//! wrong, the chapter still publishes, in the original language if it
//! must. Only quota exhaustion triggers rotation; any other failure aborts
//! straight to the untranslated fallback since rotating would not help.

use crate::config::TranslationConfig;
use log::{info, warn};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-series translation glossaries, looked up by case-insensitive
/// substring match against the series title.
const GLOSSARIES: &[(&str, &str)] = &[
    (
        "shadow slave",
        "\
1. Keep character names untranslated: Sunny, Nephis, Cassie.\n\
2. \"Nightmare Spell\", \"First Trial\", \"Aspect\", \"Flaw\" are fixed setting terms; translate each the same way every time and keep the English in parentheses on first use.\n\
3. \"Awakened\", \"Sleeper\", \"Aspirant\" are ranks; translate consistently as rank titles.\n\
4. Tone: dark, literary, measured.",
    ),
    (
        "ghost story",
        "\
1. \"Entity\" and \"Evil Spirit\" are recurring horror terms; keep one consistent translation for each.\n\
2. \"Talisman\", \"Cursed\", \"Haunted\" translate with their folk-horror register.\n\
3. Keep the series' dry, ironic tone; the protagonist treats the supernatural as office work.\n\
4. Never translate proper names.",
    ),
];

const DEFAULT_GLOSSARY: &str = "\
1. Never translate proper nouns (character names, place names).\n\
2. Translate named skills and spells, keeping the original in parentheses on first use.\n\
3. Tone: literary and fluent, matched to the genre of the novel.";

/// Boilerplate the model sometimes prepends despite instructions.
const BOILERPLATE_PREFIXES: &[&str] = &[
    "Here is the translation:",
    "Here's the translation:",
    "Here is the translated text:",
    "Translation:",
    "İşte çeviriniz:",
    "İşte çeviri:",
    "Çeviri:",
];

pub fn glossary_for(series_title: &str) -> &'static str {
    let lower = series_title.to_lowercase();
    for (needle, glossary) in GLOSSARIES {
        if lower.contains(needle) {
            return glossary;
        }
    }
    DEFAULT_GLOSSARY
}

/// Owns the ordered credential pool and the index of the active one.
/// Rotation is an instance method, not module-global state.
pub struct CredentialRotator {
    keys: Vec<String>,
    index: AtomicUsize,
}

impl CredentialRotator {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys,
            index: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn current(&self) -> &str {
        &self.keys[self.index.load(Ordering::SeqCst) % self.keys.len()]
    }

    /// Advance to the next credential, wrapping at the end of the pool.
    pub fn advance(&self) {
        let next = (self.index.load(Ordering::SeqCst) + 1) % self.keys.len();
        self.index.store(next, Ordering::SeqCst);
        info!("credential rotation: key #{} active", next + 1);
    }
}

#[derive(Debug, PartialEq)]
pub enum TranslateOutcome {
    Translated { title: String, body: String },
    /// Fallback: publish the source text untouched.
    Original,
}

pub struct TranslationClient {
    http: reqwest::Client,
    rotator: CredentialRotator,
    endpoint: String,
    model: String,
    target_language: String,
}

impl TranslationClient {
    pub fn new(config: &TranslationConfig, keys: Vec<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            rotator: CredentialRotator::new(keys),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            target_language: config.target_language.clone(),
        }
    }

    /// One completion request per attempt, at most one attempt per
    /// credential. Quota errors rotate and retry; anything else falls back
    /// to the original text immediately.
    pub async fn translate(&self, title: &str, body: &str, series_title: &str) -> TranslateOutcome {
        let glossary = glossary_for(series_title);
        let prompt = build_prompt(&self.target_language, glossary, title, body);

        for attempt in 0..self.rotator.len() {
            let key = self.rotator.current().to_string();
            match self.complete(&prompt, &key).await {
                Ok(text) => {
                    let cleaned = strip_boilerplate(&text);
                    return split_title_body(&cleaned, title);
                }
                Err(CompletionError::Quota) => {
                    warn!(
                        "translation quota exhausted on key #{} (attempt {}/{})",
                        attempt + 1,
                        attempt + 1,
                        self.rotator.len()
                    );
                    self.rotator.advance();
                }
                Err(CompletionError::Other(e)) => {
                    warn!("translation failed, keeping original text: {}", e);
                    return TranslateOutcome::Original;
                }
            }
        }
        warn!("all translation credentials exhausted, keeping original text");
        TranslateOutcome::Original
    }

    async fn complete(&self, prompt: &str, key: &str) -> Result<String, CompletionError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.endpoint, self.model, key
        );
        let request = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Other(e.to_string()))?;

        let status = response.status();
        let value: Value = response.json().await.unwrap_or(Value::Null);

        if status.as_u16() == 429 || body_says_quota(&value) {
            return Err(CompletionError::Quota);
        }
        if !status.is_success() {
            return Err(CompletionError::Other(format!("status {}", status)));
        }

        value
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .ok_or_else(|| CompletionError::Other("empty completion".to_string()))
    }
}

enum CompletionError {
    Quota,
    Other(String),
}

fn body_says_quota(value: &Value) -> bool {
    value
        .pointer("/error/status")
        .and_then(|v| v.as_str())
        .map(|s| s == "RESOURCE_EXHAUSTED")
        .unwrap_or(false)
}

/// One prompt: fixed instruction block, glossary, then the chapter with
/// its title on the first line so the response can be split back apart.
pub fn build_prompt(target_language: &str, glossary: &str, title: &str, body: &str) -> String {
    format!(
        "You are a professional fiction translator.\n\n\
TASK:\n\
Translate the chapter below into {lang}, fluent and literary, for native {lang} readers.\n\n\
RULES:\n\
1. Match the tone of the source (dark, epic, comedic as appropriate).\n\
2. Preserve the paragraph breaks of the source text.\n\
3. The first line is the chapter title; translate it and keep it as the first line of your output, followed by a blank line.\n\
4. Output only the translation, no commentary.\n\
5. TERMS:\n{glossary}\n\n\
CHAPTER:\n{title}\n\n{body}",
        lang = target_language,
        glossary = glossary,
        title = title,
        body = body,
    )
}

fn strip_boilerplate(text: &str) -> String {
    let mut out = text.trim();
    for prefix in BOILERPLATE_PREFIXES {
        if let Some(rest) = out.strip_prefix(prefix) {
            out = rest.trim_start();
        }
    }
    out.to_string()
}

fn split_title_body(text: &str, fallback_title: &str) -> TranslateOutcome {
    match text.split_once('\n') {
        Some((first, rest)) if !first.trim().is_empty() && !rest.trim().is_empty() => {
            TranslateOutcome::Translated {
                title: first.trim().to_string(),
                body: rest.trim().to_string(),
            }
        }
        _ => TranslateOutcome::Translated {
            title: fallback_title.to_string(),
            body: text.to_string(),
        },
    }
}
