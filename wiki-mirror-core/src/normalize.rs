//! Content retrieval and cleanup of the remote markdown export.
//!
//! The exporter over-escapes punctuation, leaks list HTML into table cells and
//! leaves entity-encoded text behind. [`clean`] repairs those defects outside
//! fenced blocks and inline code spans, and [`extract_slug`] pulls the `slug:`
//! directive out of the body.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;
use tracing::{debug, warn};

use crate::contract::{NormalizedDocument, WikiApi};
use crate::transport::TransportError;

const FENCE: &str = "```";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("document has no content")]
    Empty,

    #[error("failed to fetch document {obj_token}: {source}")]
    Fetch {
        obj_token: String,
        #[source]
        source: TransportError,
    },
}

static SLUG_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:text)?\s*slug:\s*(\S+)\s*```\s*").unwrap());
static SLUG_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").unwrap());

static ESCAPED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(\\|[.\-+()\[\]_#!>|])").unwrap());
// `\|` stays escaped inside tables, where it is a literal pipe.
static ESCAPED_IN_TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\(\\|[.\-+()\[\]_#!>])").unwrap());
static ESCAPED_LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)\\\*(\s)").unwrap());

static BREAK_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?\s*>").unwrap());
static CELL_ITEM_JOIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</li>\s*<li>").unwrap());
static CELL_ITEM_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<li>\s*").unwrap());
static LIST_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?(?:ul|ol|li)\s*>").unwrap());

static ENTITY_LT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"&lt;([A-Za-z/!])?").unwrap());
static ENTITY_AMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&amp;(#[0-9]+;|#[xX][0-9a-fA-F]+;|[A-Za-z][A-Za-z0-9]*;)?").unwrap()
});
static EMPTY_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<!--\s*-->").unwrap());

/// Splits the slug directive off `text`.
///
/// Returns the first valid slug and the body with every valid directive block
/// removed, trimmed. Directives with unsafe tokens are left in place.
pub fn extract_slug(text: &str) -> (Option<String>, String) {
    let mut slug: Option<String> = None;
    let mut directives = 0usize;
    let mut body = String::with_capacity(text.len());
    let mut last = 0;

    for captures in SLUG_DIRECTIVE.captures_iter(text) {
        let (Some(block), Some(token)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if !is_valid_slug(token.as_str()) {
            warn!(token = token.as_str(), "Ignoring slug directive with an unsafe token");
            continue;
        }
        directives += 1;
        if slug.is_none() {
            slug = Some(token.as_str().to_string());
        }
        body.push_str(&text[last..block.start()]);
        last = block.end();
    }
    body.push_str(&text[last..]);

    if directives > 1 {
        warn!(
            directives,
            slug = slug.as_deref().unwrap_or_default(),
            "Several slug directives found, keeping the first"
        );
    }
    (slug, body.trim().to_string())
}

/// Path-safe: a single segment of letters, digits, `.`, `_` or `-`.
pub fn is_valid_slug(token: &str) -> bool {
    token != "." && token != ".." && SLUG_TOKEN.is_match(token)
}

/// Repairs exporter defects. Running it on its own output changes nothing.
///
/// Passes repeat until the text is stable. Every change a pass makes removes
/// markup or puts it in canonical form, so the loop ends.
pub fn clean(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_pass(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_code = false;
    let mut fence_lines = 0usize;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix(FENCE) {
            // A fence that also closes on the same line is inline code, not a block boundary.
            if !rest.contains(FENCE) {
                fence_lines += 1;
                in_code = !in_code;
            }
            out.push_str(line);
            continue;
        }
        if in_code {
            out.push_str(line);
        } else {
            out.push_str(&clean_line(line));
        }
    }

    if fence_lines % 2 == 1 {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(FENCE);
    }
    out
}

fn clean_line(line: &str) -> String {
    let in_table = line.trim_start().starts_with('|');
    let mut out = String::with_capacity(line.len());
    let mut prose_start = 0;
    for (start, end) in code_spans(line) {
        out.push_str(&clean_prose(&line[prose_start..start], in_table, prose_start == 0));
        out.push_str(&line[start..end]);
        prose_start = end;
    }
    out.push_str(&clean_prose(&line[prose_start..], in_table, prose_start == 0));
    out
}

/// Byte ranges of inline code spans: a backtick run closed by a run of the
/// same length. Backslash-escaped backticks open nothing.
fn code_spans(line: &str) -> Vec<(usize, usize)> {
    let bytes = line.as_bytes();
    let run_at = |at: usize| bytes[at..].iter().take_while(|&&b| b == b'`').count();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => {
                let open = run_at(i);
                let mut j = i + open;
                let mut close = None;
                while j < bytes.len() {
                    if bytes[j] == b'`' {
                        let run = run_at(j);
                        if run == open {
                            close = Some(j + run);
                            break;
                        }
                        j += run;
                    } else {
                        j += 1;
                    }
                }
                match close {
                    Some(end) => {
                        spans.push((i, end));
                        i = end;
                    }
                    None => i += open,
                }
            }
            _ => i += 1,
        }
    }
    spans
}

fn clean_prose(text: &str, in_table: bool, at_line_start: bool) -> String {
    let escaped = if in_table { &ESCAPED_IN_TABLE } else { &ESCAPED };
    let text = escaped.replace_all(text, |caps: &Captures| {
        if &caps[1] == "\\" {
            caps[0].to_string()
        } else {
            caps[1].to_string()
        }
    });
    let text = if at_line_start {
        ESCAPED_LIST_MARKER.replace(&text, "$1*$2").into_owned()
    } else {
        text.into_owned()
    };

    let text = BREAK_TAG.replace_all(&text, "<br />");
    let text = if in_table {
        let joined = CELL_ITEM_JOIN.replace_all(&text, "<br />• ");
        CELL_ITEM_OPEN.replace_all(&joined, "• ").into_owned()
    } else {
        text.into_owned()
    };
    let text = LIST_TAG.replace_all(&text, "");

    let text = decode_entities(&text);
    EMPTY_COMMENT.replace_all(&text, "").into_owned()
}

fn decode_entities(line: &str) -> String {
    let line = line
        .replace("&nbsp;", " ")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'");
    let line = ENTITY_LT.replace_all(&line, |caps: &Captures| match caps.get(1) {
        Some(_) => caps[0].to_string(),
        None => "<".to_string(),
    });
    ENTITY_AMP
        .replace_all(&line, |caps: &Captures| match caps.get(1) {
            Some(_) => caps[0].to_string(),
            None => "&".to_string(),
        })
        .into_owned()
}

/// Extracts the slug, then cleans the remaining body.
pub fn normalize(raw: &str) -> Result<NormalizedDocument, ContentError> {
    if raw.trim().is_empty() {
        return Err(ContentError::Empty);
    }
    let (slug, body) = extract_slug(raw);
    let cleaned_content = clean(&body).trim().to_string();
    Ok(NormalizedDocument {
        raw_content: raw.to_string(),
        slug,
        cleaned_content,
    })
}

/// Retrieves the markdown export of `obj_token` and normalizes it.
pub async fn fetch_document<A>(api: &A, obj_token: &str) -> Result<NormalizedDocument, ContentError>
where
    A: WikiApi + ?Sized,
{
    let raw = api
        .fetch_content(obj_token)
        .await
        .map_err(|source| ContentError::Fetch {
            obj_token: obj_token.to_string(),
            source,
        })?;
    let document = normalize(&raw)?;
    debug!(
        obj_token,
        slug = document.slug.as_deref().unwrap_or_default(),
        raw_bytes = document.raw_content.len(),
        cleaned_bytes = document.cleaned_content.len(),
        "Normalized document"
    );
    Ok(document)
}
