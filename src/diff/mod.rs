//! C4 DiffEngine, C5 DiffParser, and C6 PatchApplier.

pub mod engine;
pub mod parser;
pub mod patch;

pub use parser::{parse, patch_for_hunk, patch_for_lines};
