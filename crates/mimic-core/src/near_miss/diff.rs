//! Side-by-side diff of a request pattern against a request.
//!
//! Rendering is a pure function of an ordered list of
//! `(label, expected, actual, exact)` lines, so it can be tested without the
//! engine and swapped for the structured (JSON) form.

use crate::pattern::{Attribute, AttributeMatch, RequestMatch};
use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

/// Column width used when none is configured.
pub const DEFAULT_LINE_WIDTH: usize = 60;

const COLUMN_SEPARATOR: &str = " | ";

/// One attribute row of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffLine {
    pub label: String,
    pub expected: String,
    pub actual: String,
    pub exact: bool,
}

impl From<&AttributeMatch> for DiffLine {
    fn from(attribute: &AttributeMatch) -> Self {
        // Named attributes show their name on both sides
        let prefix = match &attribute.attribute {
            Attribute::Header(name) | Attribute::QueryParameter(name) | Attribute::Cookie(name) => {
                format!("{name}: ")
            }
            _ => String::new(),
        };
        Self {
            label: attribute.attribute.label(),
            expected: format!("{prefix}{}", attribute.expected),
            actual: format!("{prefix}{}", attribute.actual),
            exact: attribute.result.is_exact(),
        }
    }
}

/// A full diff between the closest stub and a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diff {
    /// Name or id of the stub the request was compared with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stub: Option<String>,
    pub lines: Vec<DiffLine>,
}

impl Diff {
    pub fn from_match(stub: Option<String>, result: &RequestMatch) -> Self {
        Self {
            stub,
            lines: result.attributes.iter().map(DiffLine::from).collect(),
        }
    }

    pub fn has_differences(&self) -> bool {
        self.lines.iter().any(|line| !line.exact)
    }
}

/// Split a value into chunks of at most `width` characters.
fn wrap(text: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![String::new()];
    }
    chars
        .chunks(width.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Pair up the logical lines of both sides, aligning multi-line values.
fn align(expected: &str, actual: &str) -> Vec<(String, String)> {
    if !expected.contains('\n') && !actual.contains('\n') {
        return vec![(expected.to_string(), actual.to_string())];
    }

    let diff = TextDiff::from_lines(expected, actual);
    let mut rows = Vec::new();
    let mut pending_left: Vec<String> = Vec::new();
    let mut pending_right: Vec<String> = Vec::new();

    let flush = |left: &mut Vec<String>,
                 right: &mut Vec<String>,
                 rows: &mut Vec<(String, String)>| {
        let count = left.len().max(right.len());
        for i in 0..count {
            rows.push((
                left.get(i).cloned().unwrap_or_default(),
                right.get(i).cloned().unwrap_or_default(),
            ));
        }
        left.clear();
        right.clear();
    };

    for change in diff.iter_all_changes() {
        let text = change.value().trim_end_matches(['\n', '\r']).to_string();
        match change.tag() {
            ChangeTag::Equal => {
                flush(&mut pending_left, &mut pending_right, &mut rows);
                rows.push((text.clone(), text));
            }
            ChangeTag::Delete => pending_left.push(text),
            ChangeTag::Insert => pending_right.push(text),
        }
    }
    flush(&mut pending_left, &mut pending_right, &mut rows);
    rows
}

fn pad(text: &str, width: usize) -> String {
    let len = text.chars().count();
    format!("{text}{}", " ".repeat(width.saturating_sub(len)))
}

/// Render a diff as two columns: closest stub on the left, request on the right.
///
/// Differing attributes carry a `<<<<< {label} does not match` marker on
/// their first row.
pub fn render_plain(diff: &Diff, width: usize) -> String {
    let width = width.max(1);
    let rule = "-".repeat(width * 2 + COLUMN_SEPARATOR.len());
    let title = "Request was not matched";

    let mut out = String::new();
    out.push('\n');
    out.push_str(&format!("{}{title}\n", " ".repeat(width.saturating_sub(title.len() / 2))));
    out.push_str(&format!(
        "{}{}\n\n",
        " ".repeat(width.saturating_sub(title.len() / 2)),
        "=".repeat(title.len())
    ));
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&format!(
        "{}{COLUMN_SEPARATOR}{}\n",
        pad("Closest stub", width),
        pad("Request", width)
    ));
    out.push_str(&rule);
    out.push('\n');
    if let Some(stub) = &diff.stub {
        out.push_str(&format!("{}{}\n", pad(stub, width), COLUMN_SEPARATOR.trim_end()));
    }
    out.push_str(&format!("{}{}\n", pad("", width), COLUMN_SEPARATOR.trim_end()));

    for line in &diff.lines {
        let mut first_row = true;
        for (expected, actual) in align(&line.expected, &line.actual) {
            let left = wrap(&expected, width);
            let right = wrap(&actual, width);
            for i in 0..left.len().max(right.len()) {
                let l = left.get(i).map(String::as_str).unwrap_or("");
                let r = right.get(i).map(String::as_str).unwrap_or("");
                let mut row = format!("{}{COLUMN_SEPARATOR}", pad(l, width));
                if first_row && !line.exact {
                    row.push_str(&pad(r, width));
                    row.push_str(&format!(" <<<<< {} does not match", line.label));
                } else {
                    row.push_str(r);
                }
                out.push_str(row.trim_end());
                out.push('\n');
                first_row = false;
            }
        }
    }

    out.push_str(&rule);
    out.push('\n');
    out
}
