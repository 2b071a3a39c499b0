//! Output written by the binary.
//!
//! # Submodules
//!
//! - [`filter`]: language and topic filtering before articles are written
//! - [`json`]: appends article records as JSON Lines
//! - [`state`]: persists the latest checkpoint cursor
//!
//! # Output Structure
//!
//! ```text
//! articles.jsonl   # one ArticleRecord per line, appended across runs
//! state.json       # {"batch": 3, "index": "CC-MAIN-2024-33", "pattern": "example.com"}
//! ```

pub mod filter;
pub mod json;
pub mod state;
