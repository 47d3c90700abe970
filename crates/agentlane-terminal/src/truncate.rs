//! Shell output trimming.
//!
//! A run's step budget bounds how much transcript text a tool result can
//! cost; shell output has no such bound on its own (`cat big_log.txt`,
//! `find /`). Middle-omission keeps the invocation's own echo at the front
//! and the final line(s) of output at the back — both ends matter more to a
//! model reading the result than the middle does.

/// Output longer than this is trimmed (character count, not bytes).
pub const MAX_OUTPUT_CHARS: usize = 30_000;

/// Trim `text` to `limit` characters, keeping the first and last halves and
/// dropping the middle.
///
/// Returns `text` unchanged (no allocation) when it already fits. Splits on
/// `char` boundaries so a multi-byte sequence is never cut in half.
pub fn middle_trim(text: &str, limit: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= limit {
        return text.to_owned();
    }

    let chars: Vec<char> = text.chars().collect();
    let half = limit / 2;
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[char_count - half..].iter().collect();
    let dropped = char_count - limit;

    format!("{head}\n\n... [{dropped} characters omitted] ...\n\n{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_within_limit_unchanged() {
        let s = "hello world";
        assert_eq!(middle_trim(s, MAX_OUTPUT_CHARS), s);
    }

    #[test]
    fn exactly_at_limit_unchanged() {
        let s = "x".repeat(MAX_OUTPUT_CHARS);
        let out = middle_trim(&s, MAX_OUTPUT_CHARS);
        assert_eq!(out.len(), MAX_OUTPUT_CHARS);
        assert!(!out.contains("omitted"));
    }

    #[test]
    fn one_over_limit_trims() {
        let s = "a".repeat(MAX_OUTPUT_CHARS + 1);
        let out = middle_trim(&s, MAX_OUTPUT_CHARS);
        assert!(out.contains("1 characters omitted"));
    }

    #[test]
    fn keeps_head_and_tail() {
        let head = "A".repeat(10_000);
        let body = "B".repeat(20_000);
        let tail = "C".repeat(10_000);
        let out = middle_trim(&format!("{head}{body}{tail}"), MAX_OUTPUT_CHARS);
        assert!(out.starts_with('A'));
        assert!(out.ends_with('C'));
    }

    #[test]
    fn custom_limit_respected() {
        let s = "z".repeat(200);
        let out = middle_trim(&s, 100);
        assert!(out.contains("100 characters omitted"));
    }

    #[test]
    fn multibyte_chars_not_split() {
        let s = "€".repeat(40_000);
        let out = middle_trim(&s, MAX_OUTPUT_CHARS);
        assert!(out.contains("omitted"));
    }

    #[test]
    fn empty_input_unchanged() {
        assert_eq!(middle_trim("", MAX_OUTPUT_CHARS), "");
    }
}
