//! One module per CLI verb. `main.rs` dispatches `Commands` variants into
//! these; each module owns its own argument-to-output translation and talks
//! to `storage`/`sync` directly.

pub mod blocked;
pub mod close;
pub mod comments;
pub mod completions;
pub mod config;
pub mod create;
pub mod daemons;
pub mod delete;
pub mod dep;
pub mod doctor;
pub mod history;
pub mod hooks;
pub mod init;
pub mod label;
pub mod list;
pub mod q;
pub mod ready;
pub mod reopen;
pub mod search;
pub mod show;
pub mod sync;
pub mod update;
pub mod version;
