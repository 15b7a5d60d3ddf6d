//! Post-processing: deterministic cleanup of model replies.
//!
//! Even when told to "return only the JSON object", chat models wrap replies
//! in ```` ```json ```` fences, prepend `<think>…</think>` reasoning blocks,
//! or sprinkle zero-width characters. These cheap rules undo that before the
//! reply is parsed or handed to the client. Each rule is a pure `&str → String`
//! function and independently testable.
//!
//! ## Rule Order
//!
//! Think blocks go first: they can contain fenced snippets of their own,
//! which would otherwise confuse fence detection.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::StageError;
use crate::output::ExtractionResult;

/// Apply all cleanup rules to a raw chat reply.
///
/// Rules (applied in order):
/// 1. Strip `<think>…</think>` reasoning blocks
/// 2. Strip an outer code fence (```` ```json ````, ```` ```markdown ````, bare ```` ``` ````)
/// 3. Normalise line endings (CRLF → LF)
/// 4. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 5. Trim surrounding whitespace
pub fn clean_reply(input: &str) -> String {
    let s = strip_think_blocks(input);
    let s = strip_code_fences(&s);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    s.trim().to_string()
}

// ── Rule 1: Strip reasoning blocks ───────────────────────────────────────────

static RE_THINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

fn strip_think_blocks(input: &str) -> String {
    RE_THINK.replace_all(input, "").to_string()
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\r?\n(.*?)\r?\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 3: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 4: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Extraction reshaping ─────────────────────────────────────────────────────

/// Parse the vision model's reply into an [`ExtractionResult`].
///
/// The reply must be a JSON object with a `problemInfo` key. Models
/// occasionally nest the problem as an object despite the prompt; any
/// non-string value is re-serialised so no content is dropped. A missing or
/// blank `language` falls back to `requested_language`.
///
/// # Errors
/// [`StageError::ParseFailure`] carrying the raw reply when it is not valid
/// JSON, not an object, or lacks `problemInfo`.
pub fn parse_extraction(
    stage: &'static str,
    reply: &str,
    requested_language: &str,
) -> Result<ExtractionResult, StageError> {
    let cleaned = clean_reply(reply);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| StageError::parse(stage, e.to_string(), reply))?;

    let Value::Object(map) = value else {
        return Err(StageError::parse(stage, "reply is not a JSON object", reply));
    };

    let problem_info = match map.get("problemInfo") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => {
            return Err(StageError::parse(stage, "reply has no 'problemInfo' key", reply));
        }
        Some(other) => other.to_string(),
    };

    let language = map
        .get("language")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(requested_language)
        .to_string();

    Ok(ExtractionResult {
        problem_info,
        language,
    })
}

/// The first `max_chars` characters of `s`, never splitting a code point.
pub fn excerpt(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
