//! Extension traits for attaching context to `Option`/`Result` values.
//!
//! Mirrors the ergonomics of `anyhow::Context` but produces a
//! `BeadsError::WithContext` so the structured-error layer keeps seeing
//! a typed error rather than an opaque `anyhow::Error`.

use crate::error::{BeadsError, Result};

/// Attach context to an `Option`, turning `None` into a `BeadsError`.
pub trait OptionExt<T> {
    /// Convert `None` into `BeadsError::WithContext` carrying `context`.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`OptionExt::context`], but the message is built lazily.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> OptionExt<T> for Option<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| BeadsError::WithContext {
            context: context.into(),
            source: Box::new(MissingValue),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.ok_or_else(|| BeadsError::WithContext {
            context: f(),
            source: Box::new(MissingValue),
        })
    }
}

/// Attach context to a `Result`'s error variant.
pub trait ResultExt<T> {
    /// Wrap the error in `BeadsError::WithContext` carrying `context`.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Like [`ResultExt::context`], but the message is built lazily.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| BeadsError::WithContext {
            context: context.into(),
            source: Box::new(e),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| BeadsError::WithContext {
            context: f(),
            source: Box::new(e),
        })
    }
}

#[derive(Debug)]
struct MissingValue;

impl std::fmt::Display for MissingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected a value but found none")
    }
}

impl std::error::Error for MissingValue {}
