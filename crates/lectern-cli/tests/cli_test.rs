//! Command parsing and the offline commands.

use std::path::Path;

use clap::Parser;
use lectern_cli::cli::{mime_for_path, ModeArg};
use lectern_cli::{run, Cli, Commands};
use lectern_core::{
    ArtifactStore, ContentType, ExportFormat, ExportSettings, FsStore, GenerationMode, LecternConfig, SectionTarget,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[test]
fn test_parse_export_formats() {
    let id = Uuid::new_v4().to_string();
    let cli = Cli::try_parse_from(["lectern", "export", "--artifact", &id, "--format", "pdf,docx,latex"]).unwrap();
    match cli.command {
        Commands::Export { artifact, export } => {
            assert_eq!(artifact.to_string(), id);
            assert_eq!(export.template, "article");
            assert_eq!(
                export.formats,
                vec![ExportFormat::Pdf, ExportFormat::Docx, ExportFormat::Latex]
            );
        }
        other => panic!("unexpected command: {other:?}"),
    }

    assert!(Cli::try_parse_from(["lectern", "export", "--artifact", &id, "--format", "odt"]).is_err());
}

#[test]
fn test_export_settings_flags() {
    let id = Uuid::new_v4().to_string();
    let defaults = ExportSettings::default();

    let cli = Cli::try_parse_from(["lectern", "export", "--artifact", &id]).unwrap();
    let Commands::Export { export, .. } = cli.command else {
        panic!("expected export");
    };
    assert_eq!(export.settings(&defaults), None);

    let cli = Cli::try_parse_from([
        "lectern", "export", "--artifact", &id, "--paper", "letter", "--margins", "1in", "--toc", "--no-images",
    ])
    .unwrap();
    let Commands::Export { export, .. } = cli.command else {
        panic!("expected export");
    };
    let settings = export.settings(&defaults).unwrap();
    assert_eq!(settings.paper_size, "letter");
    assert_eq!(settings.margins.as_deref(), Some("1in"));
    assert!(settings.table_of_contents);
    assert!(!settings.include_images);
    assert!(settings.page_numbers);
    assert_eq!(settings.font_size, defaults.font_size);

    let cli = Cli::try_parse_from([
        "lectern", "combine", "--artifacts", &id, "--title", "Pack", "--toc", "false", "--no-page-numbers",
    ])
    .unwrap();
    let Commands::Combine { export, .. } = cli.command else {
        panic!("expected combine");
    };
    let settings = export.settings(&defaults.clone().with_table_of_contents(true)).unwrap();
    assert!(!settings.table_of_contents);
    assert!(!settings.page_numbers);
}

#[test]
fn test_generation_args_build_request() {
    let id = Uuid::new_v4();
    let cli = Cli::try_parse_from([
        "lectern",
        "generate",
        "--document",
        &id.to_string(),
        "--type",
        "presentation",
        "--provider",
        "anthropic",
        "--fallback",
        "groq,gemini",
        "--section",
        "2",
        "--length",
        "8",
        "--mode",
        "best-effort",
    ])
    .unwrap();
    let Commands::Generate { document, generation } = cli.command else {
        panic!("expected generate");
    };
    assert_eq!(document, id);
    assert_eq!(generation.mode, Some(ModeArg::BestEffort));

    let request = generation.request(document, &LecternConfig::default());
    assert_eq!(request.content_type, ContentType::Presentation);
    assert_eq!(request.target, SectionTarget::Index(2));
    assert_eq!(request.config.content_length, 8);
    assert_eq!(request.mode, Some(GenerationMode::BestEffort));
    assert_eq!(
        request.providers.chain(&[]),
        vec!["anthropic", "groq", "gemini"]
    );
}

#[test]
fn test_default_provider_comes_from_config() {
    let id = Uuid::new_v4();
    let cli = Cli::try_parse_from(["lectern", "generate", "--document", &id.to_string()]).unwrap();
    let Commands::Generate { generation, .. } = cli.command else {
        panic!("expected generate");
    };
    let config = LecternConfig::default();
    let request = generation.request(id, &config);
    assert_eq!(request.providers.primary, config.default_provider);
    assert_eq!(request.content_type, ContentType::StudyGuide);
    assert!(request.providers.fallbacks.is_none());
}

#[test]
fn test_mime_inference() {
    assert_eq!(mime_for_path(Path::new("unit.PDF")).unwrap(), "application/pdf");
    assert_eq!(mime_for_path(Path::new("notes.md")).unwrap(), "text/markdown");
    assert!(mime_for_path(Path::new("scan.tiff")).is_err());
    assert!(mime_for_path(Path::new("README")).is_err());
}

#[tokio::test]
async fn test_extract_command_stores_document() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("syllabus.txt");
    std::fs::write(
        &file,
        "Marine Biology\nCourse code: MAR-120\n\nWeek 1: Oceans\nTopics: tides, currents\n\nWeek 2: Reefs\n- Coral\n- Symbiosis\n",
    )
    .unwrap();
    let storage = dir.path().join("store");

    let cli = Cli::try_parse_from([
        "lectern",
        "--storage",
        storage.to_str().unwrap(),
        "extract",
        file.to_str().unwrap(),
    ])
    .unwrap();
    let output = run(cli, &CancellationToken::new()).await.unwrap();

    assert_eq!(output["format"], "text");
    assert_eq!(output["metadata"]["course_code"], "MAR-120");
    let titles: Vec<&str> = output["sections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Untitled", "Week 1: Oceans", "Week 2: Reefs"]);

    let id: Uuid = output["document_id"].as_str().unwrap().parse().unwrap();
    let store = FsStore::open(&storage).await.unwrap();
    let document = store.load_document(id).await.unwrap();
    assert_eq!(document.sections.len(), 3);
    assert!(document.raw.starts_with(b"Marine Biology"));
}

#[tokio::test]
async fn test_templates_and_providers_commands() {
    let cli = Cli::try_parse_from(["lectern", "templates"]).unwrap();
    let output = run(cli, &CancellationToken::new()).await.unwrap();
    let ids: Vec<&str> = output["templates"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["article", "beamer"]);

    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("lectern.json");
    std::fs::write(&config, r#"{"default_provider": "groq", "fallback_providers": ["gemini"]}"#).unwrap();
    let cli = Cli::try_parse_from(["lectern", "--config", config.to_str().unwrap(), "providers"]).unwrap();
    let output = run(cli, &CancellationToken::new()).await.unwrap();
    assert!(output["providers"].as_array().unwrap().len() >= 4);
    assert!(output.get("health").is_none());
}

#[tokio::test]
async fn test_unknown_config_extension_fails() {
    let cli = Cli::try_parse_from(["lectern", "--config", "lectern.ini", "templates"]).unwrap();
    assert!(run(cli, &CancellationToken::new()).await.is_err());
}
