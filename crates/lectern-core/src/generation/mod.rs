//! Content generation: chunk planning, prompts, failover and stitching.

pub mod chunker;
pub mod failover;
pub mod orchestrator;
pub mod parser;
pub mod prompts;
pub mod stitcher;

pub use chunker::{Chunk, Chunker};
pub use failover::{ChainOutcome, ChainStep, FailoverChain};
pub use orchestrator::{GenerationOutcome, GenerationSettings, GenerationStats, Orchestrator};
pub use parser::parse_markdown;
pub use stitcher::stitch;
