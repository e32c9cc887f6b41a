//! Oracle decisions: the action taxonomy and its wire format.
//!
//! The oracle answers in free text holding a fenced JSON block:
//!
//! ```text
//! ```json
//! { "briefExplanation": "...", "nextAction": { "action": "click", "element": 5 } }
//! ```
//! ```

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

const FENCE: &str = "```";

/// One next step chosen by the oracle, tagged by `action` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Action {
    /// Click the element labelled `element` in the screenshot.
    Click {
        #[serde(deserialize_with = "lenient_index")]
        element: i64,
    },
    /// Type into the focused field, optionally pressing a key afterwards.
    #[serde(rename = "typing")]
    Type {
        #[serde(default)]
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        press: Option<String>,
    },
    /// Scroll by fractions of the viewport width (`x`) and height (`y`).
    Scroll {
        #[serde(default)]
        x: f64,
        #[serde(default = "default_scroll_y")]
        y: f64,
    },
    /// Record a note in the information log. No browser effect.
    #[serde(rename = "information")]
    InformationLog {
        #[serde(default)]
        text: String,
    },
    Done,
}

fn default_scroll_y() -> f64 {
    0.6
}

/// Accept `5`, `5.0` or `"5"` for an element index.
fn lenient_index<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    use serde::de::Error as _;
    let value = serde_json::Value::deserialize(deserializer)?;
    match &value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| D::Error::custom(format!("bad element index {}", n))),
        serde_json::Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("bad element index {:?}", s))),
        other => Err(D::Error::custom(format!("bad element index {}", other))),
    }
}

impl Action {
    /// Wire discriminator.
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click { .. } => "click",
            Action::Type { .. } => "typing",
            Action::Scroll { .. } => "scroll",
            Action::InformationLog { .. } => "information",
            Action::Done => "done",
        }
    }

    /// Whether the action goes to the browser (and so into history).
    pub fn touches_browser(&self) -> bool {
        matches!(
            self,
            Action::Click { .. } | Action::Type { .. } | Action::Scroll { .. }
        )
    }
}

/// A parsed oracle response.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub explanation: Option<String>,
    pub action: Action,
    /// Text of the JSON block the action was read from.
    pub raw: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    brief_explanation: Option<String>,
    next_action: Action,
}

/// Parse an oracle response, reading the last fenced block.
///
/// Without any fence the whole text is tried as JSON. Trailing commas are
/// tolerated; anything else that isn't a `{briefExplanation, nextAction}`
/// object with a known `action` is an [`Error::OracleParse`].
pub fn parse_response(text: &str) -> Result<Decision> {
    let raw = last_fenced_block(text).unwrap_or(text).trim();
    if raw.is_empty() {
        return Err(Error::OracleParse("response has no JSON block".into()));
    }

    let envelope: Envelope = match serde_json::from_str(raw) {
        Ok(env) => env,
        Err(strict) => strip_trailing_commas(raw)
            .and_then(|relaxed| serde_json::from_str(&relaxed).ok())
            .ok_or_else(|| Error::OracleParse(format!("{} in {:?}", strict, truncate(raw, 120))))?,
    };

    Ok(Decision {
        explanation: envelope.brief_explanation,
        action: envelope.next_action,
        raw: raw.to_string(),
    })
}

/// Contents of the last ```` ```json ```` block, or failing that the last
/// untagged fenced block. Blocks tagged with another language are used only
/// when nothing else is fenced. An unterminated final fence runs to the end
/// of the text.
pub fn last_fenced_block(text: &str) -> Option<&str> {
    let (mut json, mut untagged, mut other) = (None, None, None);
    // Odd segments are inside fences.
    for segment in text.split(FENCE).skip(1).step_by(2) {
        match language_tag(segment) {
            (Some(tag), body) if tag.eq_ignore_ascii_case("json") => json = Some(body),
            (Some(_), body) => other = Some(body),
            (None, body) => untagged = Some(body),
        }
    }
    json.or(untagged).or(other).map(str::trim)
}

/// Split the info string off a fenced block's first line.
fn language_tag(block: &str) -> (Option<&str>, &str) {
    let end = block
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+')))
        .unwrap_or(block.len());
    if end == 0 {
        (None, block)
    } else {
        (Some(&block[..end]), &block[end..])
    }
}

fn strip_trailing_commas(json: &str) -> Option<String> {
    let re = Regex::new(r",(\s*[}\]])").ok()?;
    Some(re.replace_all(json, "$1").into_owned())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}
