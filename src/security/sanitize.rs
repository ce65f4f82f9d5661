//! Input sanitization.
//!
//! Pure transforms applied to untrusted text before it reaches validation or
//! storage, plus output escaping helpers for contexts where the concern is
//! the rendered form rather than the stored value.
//!
//! # Design Decisions
//! - The HTML sanitizer is compiled in, so it is available in every
//!   execution context; there is no pass-through fallback
//! - Length caps are denial-of-service guards, not correctness rules

use serde_json::Value;

use crate::security::limits::{MAX_FILE_NAME_CHARS, MAX_STRING_CHARS};

/// Inline formatting tags that survive [`sanitize_html`].
pub const ALLOWED_HTML_TAGS: &[&str] = &["b", "strong", "i", "em", "p", "br"];

/// Elements whose content is dropped together with the tags.
const OPAQUE_HTML_TAGS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "noscript", "template", "textarea", "title",
];

/// Strip control characters, cap the length and trim surrounding whitespace.
///
/// Idempotent: the cap is applied before trimming so a second pass never
/// finds anything left to remove.
pub fn sanitize_string(input: &str) -> String {
    let capped: String = input
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_STRING_CHARS)
        .collect();
    capped.trim().to_string()
}

/// Apply [`sanitize_string`] to every string leaf of a JSON document.
///
/// Arrays and objects are walked recursively; numbers, booleans and nulls
/// pass through unchanged. Object keys are left as they are.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_string(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_value(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Reduce an HTML fragment to the inline formatting allow-list.
///
/// Allowed tags are re-emitted without attributes, every other tag is
/// removed, and the content of script-like elements is removed with them.
/// Stray angle brackets in text are escaped.
pub fn sanitize_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    let mut opaque: Option<String> = None;

    while let Some(lt) = rest.find('<') {
        let (text, tail) = rest.split_at(lt);
        if opaque.is_none() {
            push_text(&mut out, text);
        }

        let Some((token, consumed)) = next_markup(tail) else {
            if opaque.is_none() {
                out.push_str("&lt;");
            }
            rest = &tail[1..];
            continue;
        };
        rest = &tail[consumed..];

        let Markup::Tag(tag) = token else {
            continue;
        };

        if let Some(name) = &opaque {
            if tag.closing && &tag.name == name {
                opaque = None;
            }
            continue;
        }

        if OPAQUE_HTML_TAGS.contains(&tag.name.as_str()) {
            if !tag.closing && !tag.self_closing {
                opaque = Some(tag.name);
            }
        } else if ALLOWED_HTML_TAGS.contains(&tag.name.as_str()) {
            if tag.name == "br" {
                if !tag.closing {
                    out.push_str("<br>");
                }
            } else if tag.closing {
                out.push_str("</");
                out.push_str(&tag.name);
                out.push('>');
            } else {
                out.push('<');
                out.push_str(&tag.name);
                out.push('>');
            }
        }
    }

    if opaque.is_none() {
        push_text(&mut out, rest);
    }
    out
}

/// Replace characters outside `[A-Za-z0-9._-]` with `_`, collapse runs of
/// underscores and cap the length.
pub fn sanitize_file_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out.chars().take(MAX_FILE_NAME_CHARS).collect()
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            _ => out.push(c),
        }
    }
    out
}

/// Escape text for inclusion inside a single-quoted SQL string literal.
///
/// Parameterised queries are the real defence; this is for the rare places
/// that have to build literal text.
pub fn escape_sql_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            '\0' => {}
            _ => out.push(c),
        }
    }
    out
}

fn push_text(out: &mut String, text: &str) {
    for c in text.chars() {
        if c == '>' {
            out.push_str("&gt;");
        } else {
            out.push(c);
        }
    }
}

enum Markup {
    Tag(Tag),
    Other,
}

struct Tag {
    name: String,
    closing: bool,
    self_closing: bool,
}

/// Parse the markup at the start of `s` (which begins with `<`).
///
/// Returns the token and the number of bytes it spans, or `None` when the
/// `<` does not start markup and should be treated as text. Unterminated
/// markup swallows the rest of the input.
fn next_markup(s: &str) -> Option<(Markup, usize)> {
    let body = &s[1..];

    if let Some(comment) = body.strip_prefix("!--") {
        let consumed = comment
            .find("-->")
            .map(|end| 1 + 3 + end + 3)
            .unwrap_or(s.len());
        return Some((Markup::Other, consumed));
    }
    if body.starts_with('!') || body.starts_with('?') {
        let consumed = body.find('>').map(|end| end + 2).unwrap_or(s.len());
        return Some((Markup::Other, consumed));
    }

    let (closing, after_slash) = match body.strip_prefix('/') {
        Some(rest) => (true, rest),
        None => (false, body),
    };
    let name_len = after_slash
        .char_indices()
        .take_while(|(i, c)| {
            if *i == 0 {
                c.is_ascii_alphabetic()
            } else {
                c.is_ascii_alphanumeric()
            }
        })
        .count();
    if name_len == 0 {
        return None;
    }
    let name = after_slash[..name_len].to_ascii_lowercase();

    let attrs_start = s.len() - after_slash.len() + name_len;
    let mut quote: Option<char> = None;
    let mut end = None;
    for (i, c) in s[attrs_start..].char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => {
                end = Some(attrs_start + i);
                break;
            }
            None => {}
        }
    }

    let consumed = end.map(|e| e + 1).unwrap_or(s.len());
    let self_closing = end.is_some_and(|e| s[..e].trim_end().ends_with('/'));

    Some((
        Markup::Tag(Tag {
            name,
            closing,
            self_closing,
        }),
        consumed,
    ))
}
