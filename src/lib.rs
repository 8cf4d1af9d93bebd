//! `beads_rust`: an agent-first issue tracker backed by `SQLite` and a
//! git-friendly JSONL journal.
//!
//! The binary (`br`) is a thin CLI shell over this library; the library
//! itself is organized around a single mutable store (`storage`) that
//! other crates in this workspace could embed directly.

pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod model;
pub mod output;
pub mod storage;
pub mod sync;
pub mod util;
pub mod validation;

pub use error::{BeadsError, ErrorCode, Result, StructuredError};
