//! Built-in templates.

use lectern_core::types::Template;

pub const ARTICLE_ID: &str = "article";
pub const BEAMER_ID: &str = "beamer";

const ARTICLE_SKELETON: &str = r"\documentclass[{{settings.font_size}},{{settings.paper_size}}]{article}
\usepackage[utf8]{inputenc}
\usepackage[T1]{fontenc}
\usepackage[{{settings.geometry}}]{geometry}
\usepackage{booktabs}
\usepackage{graphicx}
\pagestyle{{{settings.pagestyle}}}

\title{{{title}}}
\date{{{settings.date}}}

\begin{document}
\maketitle
\thispagestyle{{{settings.pagestyle}}}
{{settings.metadata}}
{{settings.toc}}
{{body}}
\end{document}
";

const BEAMER_SKELETON: &str = r"\documentclass[{{settings.font_size}}]{beamer}
\usepackage[utf8]{inputenc}
\usepackage[T1]{fontenc}
\usepackage{booktabs}
\usepackage{graphicx}

\title{{{title}}}
\subtitle{{{content_type}}}
\date{{{settings.date}}}

\begin{document}
\begin{frame}
\titlepage
\end{frame}
{{settings.toc_frame}}
{{body}}
\end{document}
";

const ITEMIZE: &str = "\\begin{itemize}\n{{items}}\\end{itemize}\n\n";
const ITEM: &str = "  \\item {{text}}\n";
const TABLE_ROW: &str = "{{cells}} \\\\\n";
const TABULAR: &str =
    "\\begin{tabular}{{{colspec}}}\n\\toprule\n{{header}}\\midrule\n{{rows}}\\bottomrule\n\\end{tabular}\n\n";
const FIGURE: &str =
    "\\begin{figure}[h]\n\\centering\n\\includegraphics[width=0.8\\linewidth]{{{path}}}\n\\caption{{{alt}}}\n\\end{figure}\n\n";
const PLACEHOLDER: &str =
    "\\fbox{\\textbf{Content unavailable} ({{reason}}, section {{section}}, chunk {{chunk}})}\n\n";

/// Printable handout: one `\section` per syllabus section.
///
/// Local images are embedded with `\includegraphics`; remote ones render as
/// their alt text and address.
pub fn article() -> Template {
    Template::new(ARTICLE_ID, "Article", ARTICLE_SKELETON)
        .with_slot("section", "\\section{{{title}}}\n{{body}}")
        .with_slot("heading.1", "\\subsection{{{text}}}\n")
        .with_slot("heading.2", "\\subsubsection{{{text}}}\n")
        .with_slot("heading", "\\paragraph{{{text}}}\n")
        .with_slot("paragraph", "{{text}}\n\n")
        .with_slot("bullet_list", ITEMIZE)
        .with_slot("list_item", ITEM)
        .with_slot("table", TABULAR)
        .with_slot("table_row", TABLE_ROW)
        .with_slot("image", FIGURE)
        .with_slot("placeholder", PLACEHOLDER)
        .with_fallback("{{text}}\n\n")
        .with_tags(vec!["document".into(), "handout".into()])
}

/// Slide deck: one frame per syllabus section.
pub fn beamer() -> Template {
    Template::new(BEAMER_ID, "Beamer slides", BEAMER_SKELETON)
        .with_slot("section", "\\begin{frame}{{{title}}}\n{{body}}\\end{frame}\n\n")
        .with_slot("heading", "\\textbf{{{text}}}\n\n")
        .with_slot("paragraph", "{{text}}\n\n")
        .with_slot("bullet_list", ITEMIZE)
        .with_slot("list_item", ITEM)
        .with_slot("table", TABULAR)
        .with_slot("table_row", TABLE_ROW)
        .with_slot(
            "image",
            "\\begin{center}\n\\includegraphics[width=0.7\\linewidth,height=0.6\\textheight,keepaspectratio]{{{path}}}\n\\end{center}\n\n",
        )
        .with_slot("placeholder", PLACEHOLDER)
        .with_fallback("{{text}}\n\n")
        .with_tags(vec!["slides".into()])
}

/// Look up a built-in template by id.
pub fn builtin(id: &str) -> Option<Template> {
    match id {
        ARTICLE_ID => Some(article()),
        BEAMER_ID => Some(beamer()),
        _ => None,
    }
}

/// All built-in templates.
pub fn builtin_templates() -> Vec<Template> {
    vec![article(), beamer()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::validate;

    #[test]
    fn test_builtins_validate() {
        for template in builtin_templates() {
            validate(&template).unwrap();
            assert_eq!(builtin(&template.id).unwrap(), template);
        }
        assert!(builtin("memo").is_none());
    }

    #[test]
    fn test_article_applies_settings() {
        use chrono::Utc;
        use lectern_core::types::{
            ArtifactMetadata, ArtifactSection, ContentArtifact, ContentBlock, ContentType, ExportSettings,
        };
        use uuid::Uuid;

        let artifact = ContentArtifact {
            id: Uuid::nil(),
            document_id: Uuid::nil(),
            request_id: Uuid::nil(),
            content_type: ContentType::StudyGuide,
            title: "Cells".into(),
            sections: vec![ArtifactSection {
                source_index: 0,
                title: "Unit 1".into(),
                blocks: vec![ContentBlock::ImageRef {
                    alt: "Cell".into(),
                    uri: "cell.png".into(),
                }],
            }],
            metadata: ArtifactMetadata::default(),
            created_at: Utc::now(),
        };
        let settings = ExportSettings {
            font_size: "10pt".into(),
            margins: Some("2cm".into()),
            table_of_contents: true,
            ..ExportSettings::default()
        };
        let out = crate::render::render_markup(&artifact, &article(), &settings).unwrap();
        assert!(out.starts_with("\\documentclass[10pt,a4paper]{article}"));
        assert!(out.contains("\\usepackage[a4paper,margin=2cm]{geometry}"));
        assert!(out.contains("\\pagestyle{plain}"));
        assert!(out.contains("\\tableofcontents"));
        assert!(out.contains("\\includegraphics[width=0.8\\linewidth]{cell.png}"));

        let slides = crate::render::render_markup(&artifact, &beamer(), &settings).unwrap();
        assert!(slides.contains("\\begin{frame}{Contents}"));
    }
}
