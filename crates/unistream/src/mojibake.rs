//! Repair for UTF-8 content that an upstream decoded as Latin-1.
//!
//! Some endpoints return UTF-8 bytes reinterpreted as Latin-1 characters,
//! e.g. the em dash — (UTF-8 `E2 80 94`) arrives as the three characters
//! U+00E2 U+0080 U+0094. Re-encoding those characters as Latin-1 bytes and
//! decoding the bytes as UTF-8 recovers the original text. Mixed content
//! (mojibake next to correctly-decoded emoji) is handled by repairing only
//! the broken runs.

/// Fix mojibake in `text`. Idempotent: already-correct text is returned
/// unchanged, including pure-ASCII and pure-emoji input.
pub fn repair(text: &str) -> String {
    if text.is_empty() {
        return text.to_string();
    }

    // Whole-string pass. Works whenever the string contains no characters
    // above U+00FF (i.e. no emoji or other high Unicode mixed in).
    if let Some(fixed) = latin1_roundtrip(text) {
        return fixed;
    }

    // Segmented pass: transform maximal runs of characters in the Latin-1
    // extension range (U+0080..=U+00FF) independently, leave the rest.
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();
    for ch in text.chars() {
        if ('\u{0080}'..='\u{00ff}').contains(&ch) {
            run.push(ch);
        } else {
            flush_run(&mut out, &mut run);
            out.push(ch);
        }
    }
    flush_run(&mut out, &mut run);
    out
}

fn flush_run(out: &mut String, run: &mut String) {
    if run.is_empty() {
        return;
    }
    match latin1_roundtrip(run) {
        Some(fixed) => out.push_str(&fixed),
        // A run that does not round-trip is left as it came in.
        None => out.push_str(run),
    }
    run.clear();
}

/// Re-encode every character as one Latin-1 byte, then decode the byte
/// sequence as UTF-8. `None` if any character is outside Latin-1 or the
/// bytes are not valid UTF-8.
fn latin1_roundtrip(segment: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(segment.len());
    for ch in segment.chars() {
        let code = ch as u32;
        if code > 0xFF {
            return None;
        }
        bytes.push(code as u8);
    }
    String::from_utf8(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // The em dash — as it arrives after a wrong Latin-1 decode.
    const BROKEN_EM_DASH: &str = "\u{e2}\u{80}\u{94}";

    #[test]
    fn repairs_em_dash() {
        assert_eq!(repair(BROKEN_EM_DASH), "—");
    }

    #[test]
    fn repairs_accented_text() {
        // "café" mangled: é (UTF-8 C3 A9) decoded as Latin-1 is "Ã©".
        assert_eq!(repair("caf\u{c3}\u{a9}"), "café");
    }

    #[test]
    fn ascii_unchanged() {
        assert_eq!(repair("plain ascii text"), "plain ascii text");
        assert_eq!(repair(""), "");
    }

    #[test]
    fn emoji_unchanged() {
        assert_eq!(repair("Hi 👋"), "Hi 👋");
    }

    #[test]
    fn mixed_mojibake_and_emoji() {
        // Emoji forces the segmented pass; only the broken run changes.
        let input = format!("a{}b 👋", BROKEN_EM_DASH);
        assert_eq!(repair(&input), "a—b 👋");
    }

    #[test]
    fn unrepairable_run_left_alone() {
        // A lone é is valid Latin-1 but not a valid UTF-8 byte sequence,
        // so the round-trip fails and the text is preserved.
        assert_eq!(repair("r\u{e9}sum\u{e9} 👋"), "r\u{e9}sum\u{e9} 👋");
    }

    #[test]
    fn repair_is_idempotent() {
        for input in ["plain", "Hi 👋", BROKEN_EM_DASH, "caf\u{c3}\u{a9}"] {
            let once = repair(input);
            let twice = repair(&once);
            assert_eq!(once, twice, "repair not idempotent for {:?}", input);
        }
    }
}
