//! Core types for lectern.

mod artifact;
mod export;
mod message;
mod request;
mod syllabus;
mod template;

pub use artifact::*;
pub use export::*;
pub use message::*;
pub use request::*;
pub use syllabus::*;
pub use template::*;
