//! Core traits for lectern collaborators.

mod compiler;
mod enricher;
mod provider;
mod store;

pub use compiler::*;
pub use enricher::*;
pub use provider::*;
pub use store::*;
