//! Sanitization for pipeline log text.
//!
//! External tools emit ANSI color escapes and carriage-return progress
//! redraws. Before a chunk is stored in a job log, escapes are stripped
//! and, for lines containing carriage returns, only the text after the
//! final carriage return is kept. Lines that reduce to nothing are
//! dropped entirely.

use std::sync::OnceLock;

use regex::Regex;

fn ansi_color_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("static regex"))
}

/// Sanitize one chunk of log text, line by line.
pub fn sanitize(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut kept: Vec<String> = Vec::with_capacity(lines.len());
    for line in lines {
        if let Some(clean) = sanitize_line(line) {
            kept.push(clean);
        }
    }
    kept.join("\n")
}

/// Sanitize a single line. Returns `None` for progress-redraw lines that
/// reduce to nothing.
fn sanitize_line(line: &str) -> Option<String> {
    let stripped = ansi_color_re().replace_all(line, "");
    if !stripped.contains('\r') {
        return Some(stripped.into_owned());
    }
    stripped
        .split('\r')
        .filter(|segment| !segment.is_empty())
        .next_back()
        .map(str::to_string)
}
