//! Prompt construction per content type.

use std::fmt::Write as _;

use crate::traits::EnrichmentSnippet;
use crate::types::{ContentType, GenerationConfig, Prompt, SyllabusDocument, SyllabusSection};

/// Sampling temperature used for content generation.
pub const GENERATION_TEMPERATURE: f32 = 0.7;

/// Section titles listed in the course outline part of the prompt.
const MAX_OUTLINE_SECTIONS: usize = 40;

/// System instructions for a content type.
pub fn system_prompt(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::ClassSession => {
            "You are an expert instructional designer. Produce a complete class session that includes:\n\
             1. Introduction and clear learning objectives\n\
             2. Development of the topic with activities\n\
             3. Conclusions and assessment\n\
             4. Required resources and materials\n\
             Answer in Markdown with a sound pedagogical structure."
        }
        ContentType::StudyGuide => {
            "You are a specialist in educational materials. Create a study guide that includes:\n\
             1. Summary of key concepts\n\
             2. Practice exercises\n\
             3. Self-assessment questions\n\
             4. Further references\n\
             Answer in Markdown with a didactic focus."
        }
        ContentType::Presentation => {
            "You are a designer of educational presentations. Write slide content that includes:\n\
             1. Title and agenda slides\n\
             2. Main content with key points\n\
             3. Interactive activity slides\n\
             4. A conclusions slide\n\
             Answer in Markdown where each slide starts with a level-2 heading."
        }
        ContentType::Worksheet => {
            "You are an experienced teacher preparing practice material. Create a worksheet that includes:\n\
             1. Short instructions for the student\n\
             2. Graduated exercises from basic to advanced\n\
             3. Space-saving answer formats such as tables and lists\n\
             4. An answer key at the end\n\
             Answer in Markdown."
        }
        ContentType::Assessment => {
            "You are an assessment designer. Create an evaluation that includes:\n\
             1. Multiple-choice questions\n\
             2. Short-answer questions\n\
             3. One applied problem\n\
             4. A grading rubric as a table\n\
             Answer in Markdown."
        }
    }
}

/// Everything the user prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub content_type: ContentType,
    pub config: &'a GenerationConfig,
    pub document: &'a SyllabusDocument,
    pub section: &'a SyllabusSection,
    pub chunk_index: usize,
    pub chunk_total: usize,
    pub snippets: &'a [EnrichmentSnippet],
}

/// Build the prompt for one chunk.
pub fn build_prompt(ctx: &PromptContext<'_>, chunk_text: &str) -> Prompt {
    let mut user = String::new();
    let doc = ctx.document;

    let _ = writeln!(
        user,
        "Based on the following syllabus, generate a {} for the {} level.",
        ctx.content_type.label().to_lowercase(),
        ctx.config.educational_level
    );
    let _ = writeln!(user);
    let _ = writeln!(user, "Course: {}", doc.display_title());
    if let Some(code) = &doc.metadata.course_code {
        let _ = writeln!(user, "Course code: {}", code);
    }
    if let Some(subject) = &doc.metadata.subject {
        let _ = writeln!(user, "Subject: {}", subject);
    }

    if doc.sections.len() > 1 {
        let _ = writeln!(user, "Course outline:");
        for section in doc.sections.iter().take(MAX_OUTLINE_SECTIONS) {
            let _ = writeln!(user, "- {}", section.title);
        }
    }
    let _ = writeln!(user);

    let _ = writeln!(user, "Section: {}", ctx.section.title);
    if !ctx.section.topics.is_empty() {
        let _ = writeln!(user, "Topics: {}", ctx.section.topics.join("; "));
    }
    if let Some(minutes) = ctx.section.estimated_minutes {
        let _ = writeln!(user, "Estimated duration: {} minutes", minutes);
    }

    let _ = writeln!(user);
    if ctx.chunk_total > 1 {
        let _ = writeln!(
            user,
            "Section content (part {} of {}; continue seamlessly from the previous part):",
            ctx.chunk_index + 1,
            ctx.chunk_total
        );
    } else {
        let _ = writeln!(user, "Section content:");
    }
    let _ = writeln!(user, "{}", chunk_text);
    let _ = writeln!(user);

    let _ = writeln!(user, "Configuration:");
    let _ = writeln!(user, "- Pedagogical approach: {}", ctx.config.pedagogical_approach);
    let _ = writeln!(user, "- Content length: {} sections", ctx.config.content_length);
    let _ = writeln!(user, "- Language: {}", ctx.config.language);
    let _ = writeln!(user, "- Tone: {}", ctx.config.tone);
    let _ = writeln!(user);

    if !ctx.snippets.is_empty() {
        let _ = writeln!(user, "Reference material:");
        for snippet in ctx.snippets {
            let _ = writeln!(user, "- [{}] {} ({})", snippet.topic, snippet.text, snippet.source);
        }
        let _ = writeln!(user);
    }

    let _ = writeln!(user, "Additional instructions:");
    let _ = writeln!(
        user,
        "{}",
        ctx.config.additional_instructions.as_deref().unwrap_or("None")
    );
    let _ = writeln!(user);
    let _ = write!(
        user,
        "Generate structured, practical and applicable educational content. Start with a level-1 heading holding the title."
    );

    Prompt::new(user).with_system(system_prompt(ctx.content_type))
}

/// Estimated tokens of the prompt with an empty chunk.
pub fn prompt_overhead_tokens(ctx: &PromptContext<'_>) -> u32 {
    build_prompt(ctx, "").estimated_tokens()
}
