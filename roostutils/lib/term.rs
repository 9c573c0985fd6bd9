//! Module containing terminal utilities.

use std::sync::LazyLock;

use regex::bytes::Regex;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Matches ANSI escape sequences (colors, cursor movement, OSC titles) in raw
/// terminal output.
static STRIP_ANSI_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\x1b\u{9b}][\[\]()#;?]*(?:(?:(?:[a-zA-Z\d]*(?:;[a-zA-Z\d]*)*)?\x07)|(?:(?:\d{1,4}(?:;\d{0,4})*)?[\dA-PRZcf-ntqry=><~]))",
    )
    .unwrap()
});

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Strips ANSI escape sequences from a chunk of terminal output.
///
/// Operates on raw bytes since process output is not guaranteed to be valid
/// UTF-8; bytes outside escape sequences pass through untouched.
pub fn strip_ansi(data: &[u8]) -> Vec<u8> {
    STRIP_ANSI_REGEX.replace_all(data, &b""[..]).into_owned()
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_ansi_leaves_plain_text_untouched() {
        assert_eq!(strip_ansi(b"Server started in 3.2s"), b"Server started in 3.2s");
    }

    #[test]
    fn test_strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi(b"\x1b[33;1mDone\x1b[0m"), b"Done");
    }

    #[test]
    fn test_strip_ansi_removes_cursor_sequences() {
        assert_eq!(strip_ansi(b"\x1b[2J\x1b[1;1Hboot"), b"boot");
    }

    #[test]
    fn test_strip_ansi_removes_osc_title_sequences() {
        assert_eq!(strip_ansi(b"\x1b]0;console\x07ready"), b"ready");
    }

    #[test]
    fn test_strip_ansi_preserves_invalid_utf8() {
        assert_eq!(strip_ansi(b"\xff\xfe\x1b[31mx"), b"\xff\xfex");
    }
}
