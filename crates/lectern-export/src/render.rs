//! Slot-rule rendering of a [`ContentArtifact`] into intermediate LaTeX.
//!
//! A template maps slot names to fragments containing `{{variable}}`
//! placeholders. Each block is rendered through its slot, or through the
//! template's fallback fragment when no slot matches, so every block appears
//! in the output.

use lectern_core::types::{ArtifactSection, ContentArtifact, ContentBlock, ExportSettings, Template};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::error::{ExportError, ExportResult};

static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.]+)\s*\}\}").expect("valid regex"));
static PAPER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+paper$").expect("valid regex"));
static FONT_SIZE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{1,2}pt$").expect("valid regex"));
static LENGTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)?(cm|mm|in|pt)$").expect("valid regex"));

const SECTION_VARS: &[&str] = &["title", "index", "body"];
const HEADING_VARS: &[&str] = &["text", "level"];
const TEXT_VARS: &[&str] = &["text"];
const BULLET_LIST_VARS: &[&str] = &["items", "count"];
const LIST_ITEM_VARS: &[&str] = &["text", "index"];
const TABLE_VARS: &[&str] = &["header", "rows", "columns", "colspec"];
const TABLE_ROW_VARS: &[&str] = &["cells", "index"];
const IMAGE_VARS: &[&str] = &["alt", "uri", "path"];
const PLACEHOLDER_VARS: &[&str] = &["reason", "section", "chunk", "detail"];
const FALLBACK_VARS: &[&str] = &["text", "kind"];
const SKELETON_VARS: &[&str] = &["title", "body", "content_type"];
const SETTINGS_VARS: &[&str] = &[
    "paper_size",
    "font_size",
    "geometry",
    "pagestyle",
    "toc",
    "toc_frame",
    "date",
    "metadata",
];

const META_PREFIX: &str = "meta.";
const SETTINGS_PREFIX: &str = "settings.";

/// `heading.3` → `Some(3)`.
fn heading_slot_level(slot: &str) -> Option<u8> {
    slot.strip_prefix("heading.")?
        .parse::<u8>()
        .ok()
        .filter(|level| (1..=6).contains(level))
}

/// Variables a slot provides to its fragment, or `None` for an unknown slot.
pub fn slot_variables(slot: &str) -> Option<&'static [&'static str]> {
    let vars = match slot {
        "section" => SECTION_VARS,
        "heading" => HEADING_VARS,
        "paragraph" => TEXT_VARS,
        "bullet_list" => BULLET_LIST_VARS,
        "list_item" => LIST_ITEM_VARS,
        "table" => TABLE_VARS,
        "table_row" => TABLE_ROW_VARS,
        "image" => IMAGE_VARS,
        "placeholder" => PLACEHOLDER_VARS,
        s if heading_slot_level(s).is_some() => HEADING_VARS,
        _ => return None,
    };
    Some(vars)
}

fn variables(fragment: &str) -> impl Iterator<Item = &str> {
    VARIABLE
        .captures_iter(fragment)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
}

fn check_fragment(template: &Template, slot: &str, fragment: &str, allowed: &[&str]) -> ExportResult<()> {
    match variables(fragment).find(|v| !allowed.contains(v)) {
        Some(unknown) => Err(ExportError::slot_mismatch(
            &template.id,
            format!(
                "slot '{}' uses {{{{{}}}}} but only provides {}",
                slot,
                unknown,
                allowed.join(", ")
            ),
        )),
        None => Ok(()),
    }
}

/// Check that every slot is known, every fragment only uses its slot's
/// variables, and the skeleton has a `{{body}}` placeholder.
pub fn validate(template: &Template) -> ExportResult<()> {
    for (slot, fragment) in &template.slots {
        let allowed = slot_variables(slot)
            .ok_or_else(|| ExportError::slot_mismatch(&template.id, format!("unknown slot '{}'", slot)))?;
        check_fragment(template, slot, fragment, allowed)?;
    }
    check_fragment(template, "fallback", &template.fallback, FALLBACK_VARS)?;

    let mut has_body = false;
    for var in variables(&template.skeleton) {
        has_body |= var == "body";
        let meta_key = var.strip_prefix(META_PREFIX);
        let setting = var.strip_prefix(SETTINGS_PREFIX);
        if !SKELETON_VARS.contains(&var)
            && !meta_key.is_some_and(|k| !k.is_empty())
            && !setting.is_some_and(|k| SETTINGS_VARS.contains(&k))
        {
            return Err(ExportError::slot_mismatch(
                &template.id,
                format!("skeleton uses unknown placeholder {{{{{}}}}}", var),
            ));
        }
    }
    if !has_body {
        return Err(ExportError::slot_mismatch(
            &template.id,
            "skeleton has no {{body}} placeholder",
        ));
    }
    Ok(())
}

/// Check that settings values are safe to place in LaTeX options.
pub fn validate_settings(settings: &ExportSettings) -> ExportResult<()> {
    let paper = settings.paper_option();
    if !PAPER.is_match(&paper) {
        return Err(ExportError::InvalidSettings(format!("paper size '{}'", settings.paper_size)));
    }
    if !FONT_SIZE.is_match(&settings.font_size) {
        return Err(ExportError::InvalidSettings(format!("font size '{}'", settings.font_size)));
    }
    if let Some(margins) = &settings.margins {
        if !LENGTH.is_match(margins) {
            return Err(ExportError::InvalidSettings(format!("margins '{}'", margins)));
        }
    }
    Ok(())
}

/// Local image path usable in `\includegraphics`, or `None` for URLs and
/// paths that would break out of the argument.
fn graphics_path(uri: &str) -> Option<&str> {
    let uri = uri.trim();
    let unsafe_char = |c: char| c.is_whitespace() || matches!(c, '{' | '}' | '\\' | '%' | '#' | '$' | '^' | '~' | '&');
    if uri.is_empty() || uri.contains("://") || uri.starts_with("data:") || uri.chars().any(unsafe_char) {
        None
    } else {
        Some(uri)
    }
}

/// Escape text for inclusion in LaTeX.
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str(r"\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str(r"\textasciitilde{}"),
            '^' => out.push_str(r"\textasciicircum{}"),
            '<' => out.push_str(r"\textless{}"),
            '>' => out.push_str(r"\textgreater{}"),
            _ => out.push(c),
        }
    }
    out
}

/// Substitute `{{name}}` placeholders. Inserted values are not re-scanned.
fn fill<F>(fragment: &str, lookup: F) -> String
where
    F: Fn(&str) -> String,
{
    VARIABLE
        .replace_all(fragment, |caps: &Captures| lookup(&caps[1]))
        .into_owned()
}

fn fill_vars(fragment: &str, vars: &[(&str, String)]) -> String {
    fill(fragment, |name| {
        vars.iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    })
}

/// Renders artifacts through one validated template.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    template: &'a Template,
    settings: &'a ExportSettings,
}

impl<'a> Renderer<'a> {
    /// Renderer using the template's default settings.
    pub fn new(template: &'a Template) -> ExportResult<Self> {
        Self::with_settings(template, &template.default_settings)
    }

    pub fn with_settings(template: &'a Template, settings: &'a ExportSettings) -> ExportResult<Self> {
        validate(template)?;
        validate_settings(settings)?;
        Ok(Self { template, settings })
    }

    /// Render the full document.
    pub fn render(&self, artifact: &ContentArtifact) -> String {
        let body: String = artifact
            .sections
            .iter()
            .enumerate()
            .map(|(i, section)| self.render_section(i, section))
            .collect();

        fill(&self.template.skeleton, |name| match name {
            "title" => escape_latex(&artifact.title),
            "body" => body.clone(),
            "content_type" => escape_latex(artifact.content_type.label()),
            other => match other.strip_prefix(SETTINGS_PREFIX) {
                Some(setting) => self.setting(setting, artifact),
                None => other
                    .strip_prefix(META_PREFIX)
                    .and_then(|key| artifact.metadata.extra.get(key))
                    .map(|v| escape_latex(v))
                    .unwrap_or_default(),
            },
        })
    }

    fn setting(&self, name: &str, artifact: &ContentArtifact) -> String {
        let settings = self.settings;
        match name {
            "paper_size" => settings.paper_option(),
            "font_size" => settings.font_size.clone(),
            "geometry" => match &settings.margins {
                Some(margins) => format!("{},margin={}", settings.paper_option(), margins),
                None => settings.paper_option(),
            },
            "pagestyle" if settings.page_numbers => "plain".to_string(),
            "pagestyle" => "empty".to_string(),
            "toc" if settings.table_of_contents => "\\tableofcontents\n\\newpage\n".to_string(),
            "toc_frame" if settings.table_of_contents => {
                "\\begin{frame}{Contents}\n\\tableofcontents\n\\end{frame}\n".to_string()
            }
            "date" if settings.include_metadata => artifact.created_at.format("%Y-%m-%d").to_string(),
            "metadata" if settings.include_metadata && !artifact.metadata.extra.is_empty() => {
                let items: String = artifact
                    .metadata
                    .extra
                    .iter()
                    .map(|(k, v)| format!("  \\item[{}] {}\n", escape_latex(k), escape_latex(v)))
                    .collect();
                format!("\\begin{{description}}\n{}\\end{{description}}\n", items)
            }
            _ => String::new(),
        }
    }

    fn slot(&self, name: &str) -> Option<&str> {
        self.template.slots.get(name).map(String::as_str)
    }

    fn fallback(&self, text: &str, kind: &str) -> String {
        fill_vars(
            &self.template.fallback,
            &[("text", escape_latex(text)), ("kind", kind.to_string())],
        )
    }

    fn render_section(&self, index: usize, section: &ArtifactSection) -> String {
        let body: String = section.blocks.iter().map(|b| self.render_block(b)).collect();
        match self.slot("section") {
            Some(fragment) => fill_vars(
                fragment,
                &[
                    ("title", escape_latex(&section.title)),
                    ("index", (index + 1).to_string()),
                    ("body", body),
                ],
            ),
            None => self.fallback(&section.title, "section") + &body,
        }
    }

    fn render_block(&self, block: &ContentBlock) -> String {
        match block {
            ContentBlock::Heading { level, text } => {
                let slot = format!("heading.{}", level);
                match self.slot(&slot).or_else(|| self.slot("heading")) {
                    Some(fragment) => fill_vars(
                        fragment,
                        &[("text", escape_latex(text)), ("level", level.to_string())],
                    ),
                    None => self.fallback(text, block.kind()),
                }
            }
            ContentBlock::Paragraph { text } => match self.slot("paragraph") {
                Some(fragment) => fill_vars(fragment, &[("text", escape_latex(text))]),
                None => self.fallback(text, block.kind()),
            },
            ContentBlock::BulletList { items } => match self.slot("bullet_list") {
                Some(fragment) => {
                    let rendered: String = items
                        .iter()
                        .enumerate()
                        .map(|(i, item)| match self.slot("list_item") {
                            Some(item_fragment) => fill_vars(
                                item_fragment,
                                &[("text", escape_latex(item)), ("index", (i + 1).to_string())],
                            ),
                            None => self.fallback(item, "list_item"),
                        })
                        .collect();
                    fill_vars(
                        fragment,
                        &[("items", rendered), ("count", items.len().to_string())],
                    )
                }
                None => self.fallback(&block.plain_text(), block.kind()),
            },
            ContentBlock::Table { header, rows } => match self.slot("table") {
                Some(fragment) => {
                    let columns = std::iter::once(header)
                        .chain(rows.iter())
                        .map(Vec::len)
                        .max()
                        .unwrap_or(0)
                        .max(1);
                    let body: String = rows
                        .iter()
                        .enumerate()
                        .map(|(i, row)| self.render_row(row, i + 1))
                        .collect();
                    fill_vars(
                        fragment,
                        &[
                            ("header", self.render_row(header, 0)),
                            ("rows", body),
                            ("columns", columns.to_string()),
                            ("colspec", "l".repeat(columns)),
                        ],
                    )
                }
                None => self.fallback(&block.plain_text(), block.kind()),
            },
            ContentBlock::ImageRef { alt, uri } => {
                let embeddable = self.settings.include_images.then(|| graphics_path(uri)).flatten();
                match (self.slot("image"), embeddable) {
                    (Some(fragment), Some(path)) => fill_vars(
                        fragment,
                        &[
                            ("alt", escape_latex(alt)),
                            ("uri", escape_latex(uri)),
                            ("path", path.to_string()),
                        ],
                    ),
                    _ => self.fallback(&block.plain_text(), block.kind()),
                }
            }
            ContentBlock::Placeholder {
                reason,
                section,
                chunk,
                detail,
            } => match self.slot("placeholder") {
                Some(fragment) => fill_vars(
                    fragment,
                    &[
                        ("reason", escape_latex(reason)),
                        ("section", section.to_string()),
                        ("chunk", chunk.to_string()),
                        ("detail", escape_latex(detail)),
                    ],
                ),
                None => self.fallback(&block.plain_text(), block.kind()),
            },
        }
    }

    fn render_row(&self, cells: &[String], index: usize) -> String {
        let joined = cells.iter().map(|c| escape_latex(c)).collect::<Vec<_>>().join(" & ");
        match self.slot("table_row") {
            Some(fragment) => fill_vars(fragment, &[("cells", joined), ("index", index.to_string())]),
            None => fill_vars(
                &self.template.fallback,
                &[("text", joined), ("kind", "table_row".to_string())],
            ),
        }
    }
}

/// Validate `template` and `settings`, then render `artifact` into
/// intermediate markup.
pub fn render_markup(
    artifact: &ContentArtifact,
    template: &Template,
    settings: &ExportSettings,
) -> ExportResult<String> {
    Ok(Renderer::with_settings(template, settings)?.render(artifact))
}
