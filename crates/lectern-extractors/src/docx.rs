//! DOCX content extraction using docx-rs.
//!
//! Extracts text from DOCX files, one line per paragraph, with tables
//! flattened to `cell | cell` rows. Paragraphs carrying a heading or title
//! style are reported as heading hints for segmentation.

use crate::error::{ExtractError, ExtractResult};
use crate::types::{DocumentStructure, ExtractedContent, HeadingHint};
use crate::Extractor;
use async_trait::async_trait;
use docx_rs::{DocumentChild, ParagraphChild, RunChild, TableChild, TableRowChild};
use lectern_core::types::DocumentFormat;

/// DOCX content extractor using docx-rs library.
#[derive(Debug, Clone)]
pub struct DocxExtractor {
    /// Whether to preserve table structure in output.
    preserve_tables: bool,
    /// Whether to report styled headings.
    extract_headings: bool,
}

impl Default for DocxExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Outline level for a paragraph style id, if it is a heading style.
fn heading_level(style_id: &str) -> Option<u8> {
    let lower = style_id.to_lowercase().replace([' ', '-', '_'], "");
    if lower == "title" {
        return Some(1);
    }
    let rest = lower.strip_prefix("heading")?;
    if rest.is_empty() {
        return Some(1);
    }
    rest.parse::<u8>().ok().map(|level| level.clamp(1, 6))
}

impl DocxExtractor {
    /// Create new DOCX extractor with default settings.
    pub fn new() -> Self {
        Self {
            preserve_tables: true,
            extract_headings: true,
        }
    }

    /// Configure whether to preserve table structure.
    pub fn with_tables(mut self, preserve: bool) -> Self {
        self.preserve_tables = preserve;
        self
    }

    /// Configure whether to report styled headings.
    pub fn with_headings(mut self, extract: bool) -> Self {
        self.extract_headings = extract;
        self
    }

    /// Extract text synchronously (called within spawn_blocking).
    fn extract_sync(
        content: Vec<u8>,
        preserve_tables: bool,
        extract_headings: bool,
    ) -> Result<(String, Vec<HeadingHint>), ExtractError> {
        let docx = docx_rs::read_docx(&content)
            .map_err(|e| ExtractError::Docx(format!("Failed to parse DOCX: {}", e)))?;

        let mut text_parts: Vec<String> = Vec::new();
        let mut headings: Vec<HeadingHint> = Vec::new();

        for child in docx.document.children {
            match child {
                DocumentChild::Paragraph(p) => {
                    let para_text = Self::extract_paragraph_text(&p);
                    let trimmed = para_text.trim();
                    if trimmed.is_empty() {
                        // Keep paragraph breaks visible to the sectioner.
                        text_parts.push(String::new());
                        continue;
                    }

                    if extract_headings {
                        if let Some(level) = p.property.style.as_ref().and_then(|s| heading_level(&s.val)) {
                            headings.push(HeadingHint {
                                text: trimmed.to_string(),
                                level,
                            });
                        }
                    }
                    text_parts.push(para_text);
                }
                DocumentChild::Table(t) => {
                    if preserve_tables {
                        let table_text = Self::extract_table_text(&t);
                        if !table_text.trim().is_empty() {
                            text_parts.push(table_text);
                        }
                    } else {
                        for row in &t.rows {
                            let TableChild::TableRow(r) = row;
                            for cell in &r.cells {
                                let TableRowChild::TableCell(c) = cell;
                                for child in &c.children {
                                    if let docx_rs::TableCellContent::Paragraph(p) = child {
                                        let cell_text = Self::extract_paragraph_text(p);
                                        if !cell_text.trim().is_empty() {
                                            text_parts.push(cell_text);
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        Ok((text_parts.join("\n"), headings))
    }

    /// Extract text from a paragraph.
    fn extract_paragraph_text(p: &docx_rs::Paragraph) -> String {
        let mut text = String::new();

        for child in &p.children {
            match child {
                ParagraphChild::Run(r) => {
                    for run_child in &r.children {
                        match run_child {
                            RunChild::Text(t) => text.push_str(&t.text),
                            RunChild::Tab(_) => text.push('\t'),
                            RunChild::Break(_) => text.push('\n'),
                            _ => {}
                        }
                    }
                }
                ParagraphChild::Hyperlink(h) => {
                    for child in &h.children {
                        if let ParagraphChild::Run(r) = child {
                            for run_child in &r.children {
                                if let RunChild::Text(t) = run_child {
                                    text.push_str(&t.text);
                                }
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        text
    }

    /// Extract text from a table with structure.
    fn extract_table_text(t: &docx_rs::Table) -> String {
        let mut rows: Vec<Vec<String>> = Vec::new();

        for row in &t.rows {
            let TableChild::TableRow(r) = row;
            let mut cells: Vec<String> = Vec::new();
            for cell in &r.cells {
                let TableRowChild::TableCell(c) = cell;
                let mut cell_text = String::new();
                for child in &c.children {
                    if let docx_rs::TableCellContent::Paragraph(p) = child {
                        let para = Self::extract_paragraph_text(p);
                        if !cell_text.is_empty() && !para.is_empty() {
                            cell_text.push(' ');
                        }
                        cell_text.push_str(&para);
                    }
                }
                cells.push(cell_text.trim().to_string());
            }
            rows.push(cells);
        }

        rows.iter()
            .map(|row| row.join(" | "))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Extractor for DocxExtractor {
    async fn extract(&self, content: &[u8]) -> ExtractResult<ExtractedContent> {
        let content = content.to_vec();
        let preserve_tables = self.preserve_tables;
        let extract_headings = self.extract_headings;

        let (text, headings) = tokio::task::spawn_blocking(move || {
            Self::extract_sync(content, preserve_tables, extract_headings)
        })
        .await??;

        if text.trim().is_empty() {
            return Err(ExtractError::Docx("document has no text".to_string()));
        }

        let structure = DocumentStructure {
            page_count: None,
            headings,
        };
        Ok(ExtractedContent::new(text, DocumentFormat::Docx).with_structure(structure))
    }

    fn supported_types(&self) -> &[&str] {
        &[
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/docx",
        ]
    }

    fn name(&self) -> &str {
        "docx-rs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Paragraph, Run};

    fn build_docx(paragraphs: &[(&str, Option<&str>)]) -> Vec<u8> {
        let mut docx = Docx::new();
        for (text, style) in paragraphs {
            let mut p = Paragraph::new().add_run(Run::new().add_text(*text));
            if let Some(style) = style {
                p = p.style(style);
            }
            docx = docx.add_paragraph(p);
        }
        let mut cursor = std::io::Cursor::new(Vec::new());
        docx.build().pack(&mut cursor).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn test_heading_level() {
        assert_eq!(heading_level("Heading1"), Some(1));
        assert_eq!(heading_level("heading 2"), Some(2));
        assert_eq!(heading_level("Title"), Some(1));
        assert_eq!(heading_level("Normal"), None);
        assert_eq!(heading_level("ListParagraph"), None);
    }

    #[tokio::test]
    async fn test_styled_headings_are_reported() {
        let bytes = build_docx(&[
            ("Intro to Biology", Some("Title")),
            ("Cells and membranes", Some("Heading1")),
            ("We study the cell.", None),
        ]);
        let content = DocxExtractor::new().extract(&bytes).await.unwrap();
        assert!(content.text.contains("We study the cell."));
        let texts: Vec<&str> = content.structure.headings.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["Intro to Biology", "Cells and membranes"]);
    }

    #[tokio::test]
    async fn test_docx_extractor_empty_content() {
        let extractor = DocxExtractor::new();
        let result = extractor.extract(&[]).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_docx_extractor_configuration() {
        let extractor = DocxExtractor::new().with_tables(false).with_headings(true);
        assert!(!extractor.preserve_tables);
        assert!(extractor.extract_headings);
        assert!(extractor.supports("application/docx"));
    }
}
