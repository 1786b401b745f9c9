//! Persistence implementations.

mod fs;

pub use fs::{write_atomic, FsStore};
