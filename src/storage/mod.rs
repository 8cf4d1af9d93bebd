//! `SQLite`-backed storage for issues, their relations, and change events.

pub mod change_bus;
pub mod events;
pub mod schema;
pub mod sqlite;

pub use change_bus::{ChangeEvent, ChangeListener, ChangeSubscription};
pub use sqlite::{
    IssueUpdate, ListFilters, MutationContext, ReadyFilters, ReadySortPolicy, SqliteStorage,
};
