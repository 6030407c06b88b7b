//! Small helpers for logging and command input.

use tokio::fs;
use tokio::io::{self, AsyncReadExt};
use tracing::{debug, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to a character
/// boundary) with an ellipsis and the dropped byte count appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Read text from `path`, or from stdin when no path (or `-`) is given.
///
/// # Errors
///
/// Any I/O error from opening the file or reading the stream.
#[instrument(level = "debug")]
pub async fn read_text_input(path: Option<&str>) -> io::Result<String> {
    let text = match path {
        Some(path) if path != "-" => fs::read_to_string(path).await?,
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    debug!(bytes = text.len(), "Read input text");
    Ok(text)
}
