//! Extraction of a JSON document embedded in noisy tool output.
//!
//! Inference CLIs print model-loading logs, timing summaries, and prompt
//! echoes around the answer. [`extract_json`] finds the first balanced
//! `{...}` or `[...]` span that parses as JSON.

use serde_json::Value;

/// Return the first balanced object or array in `text` that parses as JSON.
///
/// Candidate spans start at each `{` or `[` in order. A span that balances
/// but fails to parse (e.g. a `[INFO]` log prefix) is skipped and scanning
/// resumes one byte after its opening bracket.
pub fn extract_json(text: &str) -> Option<Value> {
    let mut from = 0;

    while let Some(offset) = text[from..].find(['{', '[']) {
        let open = from + offset;
        if let Some(len) = balanced_len(&text.as_bytes()[open..]) {
            if let Ok(value) = serde_json::from_str(&text[open..open + len]) {
                return Some(value);
            }
        }
        from = open + 1;
    }

    None
}

/// Length of the minimal balanced bracket span at the start of `bytes`.
///
/// Brackets inside JSON strings are ignored. Returns `None` when the span
/// never closes or closes with the wrong bracket kind.
fn balanced_len(bytes: &[u8]) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => stack.push(b),
            b'}' | b']' => {
                let open = stack.pop()?;
                if (open == b'{') != (b == b'}') {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }

    None
}
