//! lectern-export - Templated multi-format export for lectern.
//!
//! A [`ContentArtifact`](lectern_core::ContentArtifact) is rendered once into
//! intermediate LaTeX through a [`Template`](lectern_core::Template)'s slot
//! rules, then converted per target format by a
//! [`DocumentCompiler`](lectern_core::DocumentCompiler). Outputs are stored
//! under a content hash so a repeated export is served from the store.
//!
//! # Example
//!
//! ```ignore
//! use lectern_export::{builtin, CommandCompiler, ExportEngine};
//!
//! let engine = ExportEngine::new(store, Arc::new(CommandCompiler::default()));
//! let report = engine
//!     .export(&artifact, &builtin::article(), &[ExportFormat::Pdf, ExportFormat::Docx], &cancel)
//!     .await?;
//! ```

pub mod builtin;
mod compiler;
mod engine;
mod error;
mod render;

pub use compiler::CommandCompiler;
pub use engine::{combine_artifacts, content_hash, ExportEngine};
pub use error::{ExportError, ExportResult};
pub use render::{escape_latex, render_markup, slot_variables, validate, validate_settings, Renderer};
