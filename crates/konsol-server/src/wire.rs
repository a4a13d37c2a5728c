//! Key-case translation at the protocol boundary.
//!
//! The wire speaks lowerCamelCase; everything behind the boundary speaks
//! snake_case. The two transforms below are applied exactly once per
//! direction ([`from_wire`] on every ingress payload, [`to_wire`] on every
//! egress payload) so handlers and the session store never see a camelCase
//! key. Only object keys are rewritten; string *values* (method names,
//! session ids, code snippets) pass through untouched.

use serde_json::Value;

/// Recursively rewrites object keys camelCase -> snake_case.
#[must_use]
pub fn from_wire(value: Value) -> Value {
    transform_keys(value, &camel_to_snake)
}

/// Recursively rewrites object keys snake_case -> camelCase.
#[must_use]
pub fn to_wire(value: Value) -> Value {
    transform_keys(value, &snake_to_camel)
}

fn transform_keys(value: Value, rewrite: &impl Fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, inner)| (rewrite(&key), transform_keys(inner, rewrite)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|item| transform_keys(item, rewrite)).collect()),
        scalar => scalar,
    }
}

/// `session_id` -> `sessionId`.
///
/// Only an underscore followed by a lowercase letter marks a segment
/// boundary; leading, trailing, and doubled underscores pass through, and
/// so do all-uppercase segments (`api_URL`), so the inverse transform
/// restores all of them byte for byte.
pub(crate) fn snake_to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut chars = key.chars().peekable();
    let mut first = true;
    while let Some(ch) = chars.next() {
        if ch == '_' && !first && chars.peek().is_some_and(char::is_ascii_lowercase) {
            let next = chars.next().expect("peeked character must exist");
            out.push(next.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
        first = false;
    }
    out
}

/// `sessionId` -> `session_id`.
///
/// An isolated uppercase letter is a camel hump and becomes `_x`. A run of
/// two or more uppercase letters is an acronym segment and keeps its
/// letters verbatim, except that a run followed by a lowercase letter
/// donates its last letter to the next word (`HTTPStatus` ->
/// `HTTP_status`). An uppercase first letter is kept as-is, because
/// [`snake_to_camel`] never uppercases at the start of a key. Together the
/// two functions invert each other on every key shape the outgoing
/// transform can emit, all-uppercase segments included.
pub(crate) fn camel_to_snake(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 2);
    let mut pos = 0;
    while pos < chars.len() {
        let ch = chars[pos];
        if !ch.is_ascii_uppercase() || pos == 0 {
            out.push(ch);
            pos += 1;
            continue;
        }
        let mut run_end = pos + 1;
        while run_end < chars.len() && chars[run_end].is_ascii_uppercase() {
            run_end += 1;
        }
        let word_follows = chars.get(run_end).is_some_and(|c| c.is_ascii_lowercase());
        if word_follows {
            for &upper in &chars[pos..run_end - 1] {
                out.push(upper);
            }
            out.push('_');
            out.push(chars[run_end - 1].to_ascii_lowercase());
        } else if run_end - pos == 1 {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            for &upper in &chars[pos..run_end] {
                out.push(upper);
            }
        }
        pos = run_end;
    }
    out
}
