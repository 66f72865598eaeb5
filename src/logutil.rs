//! Helpers for putting client-supplied strings into single-line logs.

const MAX_PREVIEW: usize = 200;

/// Escape control characters and cap the length so a hostile value cannot forge log
/// lines or flood the log.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{{{:04x}}}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Launch data with the `hash` value masked, ready for [`escape_log`].
pub fn redact_init_data(raw: &str) -> String {
    let redacted: Vec<String> = raw
        .split('&')
        .map(|segment| match segment.split_once('=') {
            Some(("hash", _)) => "hash=<redacted>".to_string(),
            _ => segment.to_string(),
        })
        .collect();
    escape_log(&redacted.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_control_characters() {
        assert_eq!(escape_log("a\nb\tc\\"), "a\\nb\\tc\\\\");
        assert_eq!(escape_log("\u{1b}[31m"), "\\u{001b}[31m");
    }

    #[test]
    fn truncates_long_values() {
        let long = "x".repeat(MAX_PREVIEW + 50);
        let out = escape_log(&long);
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().count(), MAX_PREVIEW + 1);
    }

    #[test]
    fn masks_hash_only() {
        let out = redact_init_data("auth_date=1&hash=deadbeef&user=%7B%7D");
        assert_eq!(out, "auth_date=1&hash=<redacted>&user=%7B%7D");
    }
}
