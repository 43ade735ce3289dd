// src/error.rs
//! Error type shared by every layer of the crate.
//!
//! Errors are `Clone` because a single failed high-resolution job has to be
//! delivered to every caller that was coalesced onto it.

use std::sync::Arc;
use thiserror::Error;

/// Main error type.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// I/O errors (config files, PNG export).
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// A generator was asked for a texture it cannot represent.
    #[error("invalid texture dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    /// No GPU-capable execution context is available.
    #[error("no GPU-capable execution context")]
    Headless,

    /// A low- or high-resolution producer returned no usable result.
    #[error("producer for `{key}` failed: {reason}")]
    ProducerFailed { key: String, reason: String },

    /// The job was cancelled by a context teardown.
    #[error("job for `{0}` was cancelled")]
    Cancelled(String),

    /// The loader went away before the job resolved.
    #[error("loader dropped before `{0}` resolved")]
    Abandoned(String),

    /// A single GPU resource failed to dispose. Only ever logged.
    #[error("disposal of {resource} failed: {reason}")]
    Disposal { resource: String, reason: String },

    /// Pixel upload into a GPU texture failed.
    #[error("texture upload failed: {0}")]
    Upload(String),

    /// Invalid or unreadable configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Simple custom message.
    #[error("{0}")]
    Custom(String),

    /// Context chaining.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    #[inline]
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::Custom(msg.into())
    }

    #[inline]
    pub fn format(args: std::fmt::Arguments) -> Self {
        Self::Custom(std::fmt::format(args))
    }

    #[inline]
    pub fn msg(msg: &'static str) -> Self {
        Self::Custom(msg.into())
    }

    #[inline]
    pub fn context<C: Into<String>>(self, context: C) -> Self {
        Self::WithContext {
            message: context.into(),
            source: Box::new(self),
        }
    }

    pub fn producer<K: ToString, R: ToString>(key: K, reason: R) -> Self {
        Self::ProducerFailed {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Walks through context wrappers to the root cause.
    pub fn root(&self) -> &Error {
        match self {
            Error::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled(_))
    }

    #[inline]
    pub fn is_headless(&self) -> bool {
        matches!(self.root(), Error::Headless)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Custom(format!("image error: {err}"))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Upload(format!("{err:#}"))
    }
}

/// Convenient `Result` alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_chain_keeps_root() {
        let err = Error::Cancelled("metal".into()).context("pumping loader");
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "pumping loader: job for `metal` was cancelled");
    }

    #[test]
    fn io_errors_are_cloneable() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
