//! Transcript text reconciliation
//!
//! Two pure operations used to turn overlapping whole-window transcripts into
//! monotone deltas: a rune-level diff for transcribers that expose only text,
//! and a token-level common-prefix search for those that expose tokens.

/// Decoder token identifier.
pub type TokenId = i32;

/// Placeholder whisper emits for windows it considers empty.
const BLANK_AUDIO_MARKER: &str = "[blank_audio]";

/// Compute the new suffix of `current` relative to `previous`.
///
/// Both inputs are trimmed. When `previous` is empty the whole of `current`
/// is new; when the texts diverge or `current` shrank, `current` replaces the
/// previous window wholesale.
pub fn diff_transcript(previous: &str, current: &str) -> String {
    let previous = previous.trim();
    let current = current.trim();

    if previous.is_empty() {
        return current.to_string();
    }
    if previous == current {
        return String::new();
    }

    let prev_runes: Vec<char> = previous.chars().collect();
    let curr_runes: Vec<char> = current.chars().collect();

    if prev_runes.len() > curr_runes.len() {
        return current.to_string();
    }
    if prev_runes.iter().zip(curr_runes.iter()).any(|(p, c)| p != c) {
        return current.to_string();
    }

    curr_runes[prev_runes.len()..]
        .iter()
        .collect::<String>()
        .trim_start()
        .to_string()
}

/// Find where new content starts in `current`.
///
/// Returns the largest `k <= current.len()` such that a suffix of `previous`
/// of length `k` equals `current[..k]`. When windows overlap but boundaries
/// shift, the previous window's tail reappears as the new window's head; the
/// new content starts at `k`. Returns 0 when nothing matches.
pub fn find_common_prefix(previous: &[TokenId], current: &[TokenId]) -> usize {
    for start in 0..previous.len() {
        let k = previous.len() - start;
        if k > current.len() {
            continue;
        }
        if previous[start..] == current[..k] {
            return k;
        }
    }
    0
}

/// Whether the text is whisper's blank-audio placeholder.
pub fn is_blank_audio(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(BLANK_AUDIO_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_empty_previous_returns_current() {
        assert_eq!(diff_transcript("", "hello world"), "hello world");
    }

    #[test]
    fn diff_equal_returns_empty() {
        assert_eq!(diff_transcript("hello world", "hello world"), "");
    }

    #[test]
    fn diff_extension_returns_suffix() {
        assert_eq!(diff_transcript("hello", "hello   world"), "world");
    }

    #[test]
    fn diff_divergent_returns_replacement() {
        assert_eq!(diff_transcript("hello world", "hola mundo"), "hola mundo");
    }

    #[test]
    fn diff_shrunk_returns_replacement() {
        assert_eq!(diff_transcript("hello world", "hello"), "hello");
    }

    #[test]
    fn diff_is_multibyte_safe() {
        assert_eq!(diff_transcript("cześć", "cześć świecie"), "świecie");
    }

    #[test]
    fn diff_trims_inputs() {
        assert_eq!(diff_transcript("  hello ", " hello world\n"), "world");
    }

    #[test]
    fn prefix_empty_previous_is_zero() {
        assert_eq!(find_common_prefix(&[], &[1, 2, 3]), 0);
    }

    #[test]
    fn prefix_full_overlap() {
        assert_eq!(find_common_prefix(&[1, 2, 3], &[1, 2, 3, 4]), 3);
    }

    #[test]
    fn prefix_shifted_window() {
        // Tail of the previous window reappears as the head of the current.
        assert_eq!(find_common_prefix(&[9, 8, 1, 2], &[1, 2, 5, 6]), 2);
    }

    #[test]
    fn prefix_no_match_is_zero() {
        assert_eq!(find_common_prefix(&[1, 2, 3], &[4, 5, 6]), 0);
    }

    #[test]
    fn prefix_prefers_longest_suffix() {
        // Both the length-1 and length-3 suffixes match; longest wins.
        assert_eq!(find_common_prefix(&[2, 1, 2, 1, 2], &[1, 2, 1, 2, 7]), 4);
    }

    #[test]
    fn prefix_interior_match_does_not_count() {
        // [1, 2] matches the head of current but is not a suffix of previous.
        assert_eq!(find_common_prefix(&[1, 2, 9], &[1, 2, 3]), 0);
    }

    #[test]
    fn blank_audio_marker_detection() {
        assert!(is_blank_audio("[BLANK_AUDIO]"));
        assert!(is_blank_audio("  [blank_audio] "));
        assert!(!is_blank_audio("[blank audio]"));
        assert!(!is_blank_audio("hello"));
    }
}
