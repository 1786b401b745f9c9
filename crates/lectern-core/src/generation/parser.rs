//! Markdown provider output to content blocks.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::ContentBlock;

static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("valid regex"));
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*+]|\d{1,3}[.)])\s+(.*)$").expect("valid regex"));
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^!\[([^\]]*)\]\(([^)\s]+)[^)]*\)$").expect("valid regex"));
static TABLE_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\|?\s*:?-{2,}:?\s*(\|\s*:?-{2,}:?\s*)*\|?$").expect("valid regex"));
static RULE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:-{3,}|\*{3,}|_{3,})$").expect("valid regex"));
static EMPHASIS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*|__(.+?)__|`([^`]+)`").expect("valid regex"));

fn clean_inline(text: &str) -> String {
    EMPHASIS
        .replace_all(text.trim(), |caps: &regex::Captures<'_>| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.trim().trim_start_matches('|').trim_end_matches('|');
    inner.split('|').map(clean_inline).collect()
}

#[derive(Default)]
struct Builder {
    blocks: Vec<ContentBlock>,
    paragraph: Vec<String>,
    items: Vec<String>,
}

impl Builder {
    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            let text = self.paragraph.join(" ");
            self.paragraph.clear();
            self.blocks.push(ContentBlock::paragraph(text));
        }
    }

    fn flush_list(&mut self) {
        if !self.items.is_empty() {
            let items = std::mem::take(&mut self.items);
            self.blocks.push(ContentBlock::BulletList { items });
        }
    }

    fn flush(&mut self) {
        self.flush_paragraph();
        self.flush_list();
    }
}

/// Parse markdown into blocks.
///
/// Headings, bullet and numbered lists (both become `BulletList`), pipe tables
/// with a separator row, standalone images and paragraphs are recognized.
/// Lines within a paragraph are joined with spaces. Fenced code keeps its
/// line breaks as one paragraph.
pub fn parse_markdown(input: &str) -> Vec<ContentBlock> {
    let lines: Vec<&str> = input.lines().collect();
    let mut b = Builder::default();
    let mut i = 0;

    while i < lines.len() {
        let raw = lines[i];
        let line = raw.trim();

        if line.starts_with("```") {
            b.flush();
            let mut code = Vec::new();
            i += 1;
            while i < lines.len() && !lines[i].trim().starts_with("```") {
                code.push(lines[i].trim_end());
                i += 1;
            }
            if !code.is_empty() {
                b.blocks.push(ContentBlock::paragraph(code.join("\n")));
            }
            i += 1;
            continue;
        }

        if line.is_empty() {
            b.flush();
            i += 1;
            continue;
        }

        if RULE.is_match(line) {
            b.flush();
            i += 1;
            continue;
        }

        if let Some(caps) = HEADING.captures(line) {
            b.flush();
            let level = caps[1].len() as u8;
            b.blocks.push(ContentBlock::heading(level, clean_inline(&caps[2])));
            i += 1;
            continue;
        }

        if let Some(caps) = IMAGE.captures(line) {
            b.flush();
            b.blocks.push(ContentBlock::ImageRef {
                alt: caps[1].trim().to_string(),
                uri: caps[2].to_string(),
            });
            i += 1;
            continue;
        }

        if line.starts_with('|') && i + 1 < lines.len() && TABLE_SEPARATOR.is_match(lines[i + 1].trim()) {
            b.flush();
            let header = split_row(line);
            let mut rows = Vec::new();
            i += 2;
            while i < lines.len() && lines[i].trim().starts_with('|') {
                rows.push(split_row(lines[i]));
                i += 1;
            }
            b.blocks.push(ContentBlock::Table { header, rows });
            continue;
        }

        if let Some(caps) = LIST_ITEM.captures(raw) {
            b.flush_paragraph();
            b.items.push(clean_inline(&caps[1]));
            i += 1;
            continue;
        }

        if !b.items.is_empty() && raw.starts_with([' ', '\t']) {
            if let Some(last) = b.items.last_mut() {
                last.push(' ');
                last.push_str(&clean_inline(line));
            }
            i += 1;
            continue;
        }

        b.flush_list();
        b.paragraph.push(clean_inline(line));
        i += 1;
    }

    b.flush();
    b.blocks
}

/// Text of the first level-1 heading, if any.
pub fn first_title(blocks: &[ContentBlock]) -> Option<&str> {
    blocks.iter().find_map(|block| match block {
        ContentBlock::Heading { level: 1, text } => Some(text.as_str()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_document() {
        let md = "# Cell Biology\n\nCells are the\nbasic unit of **life**.\n\n## Objectives\n- Describe cells\n- Name `organelles`\n\n1. First\n2. Second\n\n| Term | Meaning |\n|------|---------|\n| ATP | energy |\n\n![Diagram](img/cell.png)\n";
        let blocks = parse_markdown(md);

        assert_eq!(blocks[0], ContentBlock::heading(1, "Cell Biology"));
        assert_eq!(blocks[1], ContentBlock::paragraph("Cells are the basic unit of life."));
        assert_eq!(blocks[2], ContentBlock::heading(2, "Objectives"));
        assert_eq!(blocks[3], ContentBlock::bullets(["Describe cells", "Name organelles"]));
        assert_eq!(blocks[4], ContentBlock::bullets(["First", "Second"]));
        assert_eq!(
            blocks[5],
            ContentBlock::Table {
                header: vec!["Term".into(), "Meaning".into()],
                rows: vec![vec!["ATP".into(), "energy".into()]],
            }
        );
        assert_eq!(
            blocks[6],
            ContentBlock::ImageRef {
                alt: "Diagram".into(),
                uri: "img/cell.png".into()
            }
        );
        assert_eq!(blocks.len(), 7);
        assert_eq!(first_title(&blocks), Some("Cell Biology"));
    }

    #[test]
    fn test_list_continuation_and_rules() {
        let md = "- one\n  continued\n---\nafter";
        let blocks = parse_markdown(md);
        assert_eq!(blocks[0], ContentBlock::bullets(["one continued"]));
        assert_eq!(blocks[1], ContentBlock::paragraph("after"));
    }

    #[test]
    fn test_pipe_line_without_separator_is_paragraph() {
        let blocks = parse_markdown("| not a table\nnext");
        assert_eq!(blocks, vec![ContentBlock::paragraph("| not a table next")]);
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_markdown("").is_empty());
        assert_eq!(first_title(&[]), None);
    }
}
