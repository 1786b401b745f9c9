//! Text normalization and the best-effort fallback for unparseable input.

use once_cell::sync::Lazy;
use regex::Regex;

static HYPHEN_WRAP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{L})-[ \t]*\n[ \t]*(\p{Ll})").expect("valid regex"));
static HORIZONTAL_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{00A0}]+").expect("valid regex"));
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Shortest printable run kept by [`fallback_text`].
const MIN_RUN_CHARS: usize = 4;

/// Normalize extracted text.
///
/// Line endings become `\n`, form feeds become paragraph breaks, words split
/// across a line wrap are rejoined, horizontal whitespace collapses to one
/// space, lines are trimmed and blank-line runs squeezed to one.
pub fn normalize(text: &str) -> String {
    let text = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{000C}', "\n\n");
    let text = HYPHEN_WRAP.replace_all(&text, "$1$2");

    let lines: Vec<String> = text
        .lines()
        .map(|line| HORIZONTAL_SPACE.replace_all(line, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");
    BLANK_RUN.replace_all(&joined, "\n\n").trim().to_string()
}

fn is_printable(c: char) -> bool {
    c != char::REPLACEMENT_CHARACTER && (!c.is_control() || c == '\t')
}

/// Windows-1252 code points for 0x80..=0x9F; undefined slots map to U+FFFD.
const CP1252_C1: [char; 32] = [
    '\u{20AC}', '\u{FFFD}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{FFFD}', '\u{017D}', '\u{FFFD}',
    '\u{FFFD}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{FFFD}', '\u{017E}', '\u{0178}',
];

fn cp1252(byte: u8) -> char {
    match byte {
        0x80..=0x9F => CP1252_C1[usize::from(byte - 0x80)],
        _ => char::from(byte),
    }
}

/// UTF-8 where valid; every byte of an invalid sequence is read as
/// Windows-1252, so legacy single-byte text keeps its accented letters.
fn decode_mixed(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    while !rest.is_empty() {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // Prefix up to valid_up_to is UTF-8 by contract.
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let bad = e.error_len().unwrap_or(after.len());
                out.extend(after[..bad].iter().copied().map(cp1252));
                rest = &after[bad..];
            }
        }
    }
    out
}

/// Binary noise decoded as Windows-1252 is mostly non-ASCII; prose is not.
fn looks_like_text(run: &str) -> bool {
    let total = run.chars().count();
    let ascii = run.chars().filter(char::is_ascii).count();
    total >= MIN_RUN_CHARS && run.chars().any(char::is_alphabetic) && ascii * 2 >= total
}

/// Recover readable text from bytes no parser accepted.
///
/// Valid UTF-8 is kept as is and stray high bytes are read as Windows-1252.
/// Only printable runs that contain a letter and are mostly ASCII survive.
pub fn fallback_text(bytes: &[u8]) -> String {
    let decoded = decode_mixed(bytes);
    let kept: Vec<&str> = decoded
        .split(|c: char| !is_printable(c))
        .map(str::trim)
        .filter(|run| looks_like_text(run))
        .collect();
    normalize(&kept.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dehyphenation() {
        assert_eq!(normalize("inter-\nnational trade"), "international trade");
        // Capitalized continuation is a real hyphenated compound or a new line.
        assert_eq!(normalize("Pre-\nColumbian"), "Pre-\nColumbian");
    }

    #[test]
    fn test_whitespace_and_blank_lines() {
        let input = "Unit 1\r\n\r\n\r\n\r\nCells\t and   membranes   \r\n";
        assert_eq!(normalize(input), "Unit 1\n\nCells and membranes");
    }

    #[test]
    fn test_form_feed_is_page_break() {
        assert_eq!(normalize("page one\u{000C}page two"), "page one\n\npage two");
    }

    #[test]
    fn test_fallback_keeps_printable_runs() {
        let mut bytes = b"%PDF-1.4\n\x00\x01\x02Unit 1: Cells\x00\xff\xfe".to_vec();
        bytes.extend_from_slice(&[0x8b, 0x00, 0x13]);
        bytes.extend_from_slice(b"Topics: membranes, organelles\x00ab");
        let text = fallback_text(&bytes);
        assert!(text.contains("Unit 1: Cells"));
        assert!(text.contains("Topics: membranes, organelles"));
        assert!(!text.contains('\u{0}'));
        assert!(text.ends_with("organelles"));
    }

    #[test]
    fn test_fallback_keeps_latin1_words() {
        let bytes = b"\x00\x01Sesi\xF3n 1: C\xE9lulas y m\xE1s\x00\x93quoted\x94 text\x00\xC3\xA9t\xC3\xA9 fran\xC3\xA7ais";
        let text = fallback_text(bytes);
        assert!(text.contains("Sesi\u{f3}n 1: C\u{e9}lulas y m\u{e1}s"), "{text}");
        assert!(text.contains("\u{201C}quoted\u{201D} text"), "{text}");
        assert!(text.contains("\u{e9}t\u{e9} fran\u{e7}ais"), "{text}");
    }

    #[test]
    fn test_fallback_drops_high_byte_noise() {
        let mut bytes = b"Unit 1\x00".to_vec();
        bytes.extend_from_slice(&[0xC6, 0xE6, 0xD0, 0xF0, 0xDE, 0xFE, 0xE5, 0x41, 0xF8]);
        let text = fallback_text(&bytes);
        assert_eq!(text, "Unit 1");
    }
}
