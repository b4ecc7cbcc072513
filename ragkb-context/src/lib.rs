pub mod text;

// Re-export the splitter types for external use
pub use text::{ChunkPiece, DEFAULT_TEXT_DELIMITERS, TextSplitter};
