//! Heading detection and section segmentation of normalized syllabus text.

use std::collections::HashSet;

use lectern_core::types::{SyllabusMetadata, SyllabusSection};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::HeadingHint;

const MAX_HEADING_CHARS: usize = 100;
const MAX_CAPS_HEADING_CHARS: usize = 60;
const MAX_CAPS_HEADING_WORDS: usize = 8;
const METADATA_SCAN_LINES: usize = 60;
const MAX_TITLE_BLOCK_LINES: usize = 3;

static MARKDOWN_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s+(.+)$").expect("valid regex"));
static KEYWORD_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(unit|week|session|module|chapter|topic|lesson|unidad|semana|sesi[oó]n|tema|cap[ií]tulo|m[oó]dulo|lecci[oó]n)\s+(\d{1,3}|[ivxlc]{1,6})\b",
    )
    .expect("valid regex")
});
static ROMAN_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[IVXLC]{1,6}[.)]\s+\p{Lu}").expect("valid regex"));
static OUTLINE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,2}(?:\.\d{1,2})+\.?\s+\p{Lu}").expect("valid regex"));
static NUMBERED_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}[.)]\s+(.+)$").expect("valid regex"));
static BULLET_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-*•·▪◦‣+]\s+(.+)$").expect("valid regex"));
static TOPICS_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:key topics|topics|temas|contents|contenidos)\s*:\s*(.*)$").expect("valid regex")
});
static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+(?:[.,]\d+)?)\s*(hours?|hrs?|h|horas?|minutes?|mins?|minutos?)\b").expect("valid regex")
});
static COURSE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{2,4}[- ]?\d{3,4}[A-Z]?\b").expect("valid regex"));
static SUBJECT_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:subject|course name|course|asignatura|materia|curso)\s*:\s*(.+)$").expect("valid regex")
});
static LEVEL_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:educational level|level|grade|nivel educativo|nivel)\s*:\s*(.+)$").expect("valid regex")
});

/// How a heading line was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadingKind {
    /// Marked by the source format (DOCX style, Markdown `#`).
    Style,
    /// `Unit 3`, `Semana 2`, ...
    Keyword,
    /// `IV. Title`
    Roman,
    /// `2.3 Title`
    Outline,
    /// `1. Title`; dropped when a stronger kind is present.
    Numbered,
    /// Short all-caps line.
    Caps,
}

#[derive(Debug)]
struct Heading {
    line: usize,
    kind: HeadingKind,
    title: String,
}

/// Sections and metadata detected in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segmented {
    pub sections: Vec<SyllabusSection>,
    pub metadata: SyllabusMetadata,
}

fn is_caps_heading(line: &str) -> bool {
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 4
        && letters.iter().all(|c| !c.is_lowercase())
        && line.chars().count() <= MAX_CAPS_HEADING_CHARS
        && line.split_whitespace().count() <= MAX_CAPS_HEADING_WORDS
        && !line.ends_with(':')
        && !COURSE_CODE.find(line).is_some_and(|m| m.as_str() == line)
}

fn classify(line: &str, hints: &HashSet<&str>) -> Option<HeadingKind> {
    if line.is_empty() || line.chars().count() > MAX_HEADING_CHARS || BULLET_LINE.is_match(line) {
        return None;
    }
    if hints.contains(line) || MARKDOWN_HEADING.is_match(line) {
        return Some(HeadingKind::Style);
    }
    if KEYWORD_HEADING.is_match(line) {
        return Some(HeadingKind::Keyword);
    }
    if ROMAN_HEADING.is_match(line) {
        return Some(HeadingKind::Roman);
    }
    if OUTLINE_HEADING.is_match(line) {
        return Some(HeadingKind::Outline);
    }
    let sentence_like = line.ends_with(['.', ',', ';', ':']);
    if NUMBERED_LINE.is_match(line) && !sentence_like && line.chars().count() <= 80 {
        let rest = NUMBERED_LINE
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if rest.chars().next().is_some_and(char::is_uppercase) {
            return Some(HeadingKind::Numbered);
        }
    }
    if is_caps_heading(line) {
        return Some(HeadingKind::Caps);
    }
    None
}

fn clean_title(line: &str) -> String {
    let line = MARKDOWN_HEADING
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(line);
    line.trim().trim_end_matches(':').trim().to_string()
}

fn clean_item(item: &str) -> String {
    item.trim().trim_end_matches(['.', ';', ',']).trim().to_string()
}

/// Topics listed in a section: bullet or numbered items, or a comma/semicolon
/// list after a `Topics:` label.
fn extract_topics(body: &str) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();
    let mut push = |topic: String| {
        if !topic.is_empty() && !topics.contains(&topic) {
            topics.push(topic);
        }
    };

    for line in body.lines().map(str::trim) {
        if let Some(rest) = TOPICS_LABEL.captures(line).and_then(|c| c.get(1)) {
            for item in rest.as_str().split([',', ';']) {
                push(clean_item(item));
            }
        } else if let Some(item) = BULLET_LINE.captures(line).and_then(|c| c.get(1)) {
            push(clean_item(item.as_str()));
        } else if let Some(item) = NUMBERED_LINE.captures(line).and_then(|c| c.get(1)) {
            push(clean_item(item.as_str()));
        }
    }
    topics
}

/// First stated duration, converted to minutes.
fn extract_minutes(text: &str) -> Option<u32> {
    let caps = DURATION.captures(text)?;
    let amount: f64 = caps.get(1)?.as_str().replace(',', ".").parse().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();
    let minutes = if unit.starts_with('h') { amount * 60.0 } else { amount };
    let minutes = minutes.round();
    (minutes >= 1.0 && minutes <= f64::from(u32::MAX)).then_some(minutes as u32)
}

fn label_value(re: &Regex, lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .take(METADATA_SCAN_LINES)
        .find_map(|line| re.captures(line).and_then(|c| c.get(1)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|v| !v.is_empty())
}

fn detect_headings(lines: &[&str], hints: &[HeadingHint]) -> Vec<Heading> {
    let hint_set: HashSet<&str> = hints.iter().map(|h| h.text.as_str()).collect();
    let mut headings: Vec<Heading> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            classify(line, &hint_set).map(|kind| Heading {
                line: i,
                kind,
                title: clean_title(line),
            })
        })
        .filter(|h| !h.title.is_empty())
        .collect();

    let has_strong = headings.iter().any(|h| {
        matches!(
            h.kind,
            HeadingKind::Style | HeadingKind::Keyword | HeadingKind::Roman | HeadingKind::Outline
        )
    });
    if has_strong {
        headings.retain(|h| h.kind != HeadingKind::Numbered);
    }
    headings
}

/// A styled or all-caps first heading over a short block with no topics
/// (course code, instructor) names the document rather than a section.
fn is_title_heading(heading: &Heading, body: &[&str]) -> bool {
    if !matches!(heading.kind, HeadingKind::Style | HeadingKind::Caps) {
        return false;
    }
    let content: Vec<&str> = body.iter().copied().filter(|l| !l.is_empty()).collect();
    content.len() <= MAX_TITLE_BLOCK_LINES && extract_topics(&content.join("\n")).is_empty()
}

fn build_section(index: usize, title: String, body_lines: &[&str]) -> SyllabusSection {
    let body = body_lines.join("\n").trim().to_string();
    let topics = extract_topics(&body);
    let minutes = extract_minutes(&title).or_else(|| extract_minutes(&body));
    let mut section = SyllabusSection::new(index, title, body).with_topics(topics);
    if let Some(minutes) = minutes {
        section = section.with_minutes(minutes);
    }
    section
}

/// Split normalized text into sections and detect document metadata.
///
/// Always yields at least one section. Text before the first heading (or a
/// document without headings) becomes an "Untitled" section. A leading
/// title-like heading is taken as the document title.
pub fn segment(text: &str, hints: &[HeadingHint]) -> Segmented {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut headings = detect_headings(&lines, hints);

    let first_content = lines.iter().position(|l| !l.is_empty());
    let mut title: Option<String> = None;
    let mut preamble_start = 0;
    if let (Some(first), Some(next)) = (headings.first(), headings.get(1)) {
        if Some(first.line) == first_content && is_title_heading(first, &lines[first.line + 1..next.line]) {
            title = Some(first.title.clone());
            preamble_start = first.line + 1;
            headings.remove(0);
        }
    }

    let mut sections = Vec::new();
    let preamble_end = headings.first().map(|h| h.line).unwrap_or(lines.len());
    let preamble = &lines[preamble_start..preamble_end];
    if title.is_none() {
        title = preamble
            .iter()
            .find(|l| !l.is_empty())
            .map(|l| l.to_string())
            .filter(|l| l.chars().count() <= 120);
    }
    if preamble.iter().any(|l| !l.is_empty()) || headings.is_empty() {
        sections.push(build_section(0, SyllabusSection::UNTITLED.to_string(), preamble));
    }

    for (i, heading) in headings.iter().enumerate() {
        let end = headings.get(i + 1).map(|h| h.line).unwrap_or(lines.len());
        let index = sections.len();
        sections.push(build_section(index, heading.title.clone(), &lines[heading.line + 1..end]));
    }

    let metadata = SyllabusMetadata {
        title,
        course_code: lines
            .iter()
            .take(METADATA_SCAN_LINES)
            .find_map(|l| COURSE_CODE.find(l))
            .map(|m| m.as_str().to_string()),
        subject: label_value(&SUBJECT_LABEL, &lines),
        educational_level: label_value(&LEVEL_LABEL, &lines),
        page_count: None,
    };

    tracing::debug!(
        sections = sections.len(),
        headings = headings.len(),
        "Segmented syllabus text"
    );
    Segmented { sections, metadata }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYLLABUS: &str = "Introduction to Biology\nCourse code: BIO-101\nLevel: Undergraduate\n\nUnit 1: Cells\nTopics: membranes, organelles; transport\nDuration: 3 hours\n\nUnit 2: Genetics\n- DNA replication\n- Mendelian inheritance\n90 minutes of lab work\n";

    #[test]
    fn test_keyword_sections_with_topics_and_duration() {
        let result = segment(SYLLABUS, &[]);
        let titles: Vec<&str> = result.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Untitled", "Unit 1: Cells", "Unit 2: Genetics"]);

        let unit1 = &result.sections[1];
        assert_eq!(unit1.index, 1);
        assert_eq!(unit1.topics, vec!["membranes", "organelles", "transport"]);
        assert_eq!(unit1.estimated_minutes, Some(180));

        let unit2 = &result.sections[2];
        assert_eq!(unit2.topics, vec!["DNA replication", "Mendelian inheritance"]);
        assert_eq!(unit2.estimated_minutes, Some(90));
    }

    #[test]
    fn test_metadata_detection() {
        let result = segment(SYLLABUS, &[]);
        assert_eq!(result.metadata.title.as_deref(), Some("Introduction to Biology"));
        assert_eq!(result.metadata.course_code.as_deref(), Some("BIO-101"));
        assert_eq!(result.metadata.educational_level.as_deref(), Some("Undergraduate"));
    }

    #[test]
    fn test_spanish_headings() {
        let text = "Unidad 1: La célula\nTemas: membrana, núcleo\nDuración: 2 horas\n\nSemana 2 - Genética\nSesión de laboratorio de 45 minutos";
        let result = segment(text, &[]);
        let titles: Vec<&str> = result.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Unidad 1: La célula", "Semana 2 - Genética"]);
        assert_eq!(result.sections[0].topics, vec!["membrana", "núcleo"]);
        assert_eq!(result.sections[0].estimated_minutes, Some(120));
        assert_eq!(result.sections[1].estimated_minutes, Some(45));
    }

    #[test]
    fn test_no_headings_is_one_untitled_section() {
        let result = segment("Just a paragraph about the course.\nAnother line.", &[]);
        assert_eq!(result.sections.len(), 1);
        assert!(result.sections[0].is_untitled());
        assert!(result.sections[0].body.contains("Another line."));

        let empty = segment("", &[]);
        assert_eq!(empty.sections.len(), 1);
    }

    #[test]
    fn test_numbered_items_are_topics_under_keyword_headings() {
        let text = "Week 1\n1. Cell theory\n2. Microscopy\n\nWeek 2\n1. Mitosis";
        let result = segment(text, &[]);
        assert_eq!(result.sections.len(), 2);
        assert_eq!(result.sections[0].topics, vec!["Cell theory", "Microscopy"]);
    }

    #[test]
    fn test_numbered_and_roman_headings() {
        let numbered = segment("1. Introduction\nWhy biology matters\n2. Methods\nLab safety", &[]);
        let titles: Vec<&str> = numbered.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["1. Introduction", "2. Methods"]);

        let roman = segment("I. Foundations\ntext\nII. Applications\n2.1 Enzymes\nmore", &[]);
        let titles: Vec<&str> = roman.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["I. Foundations", "II. Applications", "2.1 Enzymes"]);
    }

    #[test]
    fn test_leading_empty_heading_becomes_title() {
        let text = "BIOLOGY SYLLABUS\n\nUNIT ONE OVERVIEW\nCells and tissues";
        let result = segment(text, &[]);
        assert_eq!(result.metadata.title.as_deref(), Some("BIOLOGY SYLLABUS"));
        assert_eq!(result.sections.len(), 1);
        assert_eq!(result.sections[0].title, "UNIT ONE OVERVIEW");
    }

    #[test]
    fn test_style_hints_mark_headings() {
        let hints = vec![HeadingHint {
            text: "Cellular respiration".into(),
            level: 2,
        }];
        let result = segment("Overview text\nCellular respiration\nGlycolysis and ATP", &hints);
        assert_eq!(result.sections.len(), 2);
        assert_eq!(result.sections[1].title, "Cellular respiration");
        assert_eq!(result.sections[1].body, "Glycolysis and ATP");
    }

    #[test]
    fn test_markdown_headings() {
        let result = segment("# Chemistry\n\n## Atoms\nProtons\n## Bonds\nCovalent", &[]);
        assert_eq!(result.metadata.title.as_deref(), Some("Chemistry"));
        let titles: Vec<&str> = result.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Atoms", "Bonds"]);
    }

    #[test]
    fn test_extract_minutes_units() {
        assert_eq!(extract_minutes("1.5 hours"), Some(90));
        assert_eq!(extract_minutes("2 hrs"), Some(120));
        assert_eq!(extract_minutes("3h lab"), Some(180));
        assert_eq!(extract_minutes("50 min"), Some(50));
        assert_eq!(extract_minutes("10 handouts"), None);
    }
}
