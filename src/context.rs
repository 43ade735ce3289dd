// src/context.rs
//! Error-context extension traits and early-return macros.
//!
//! Mirrors the `anyhow` surface (`context`, `with_context`, `bail!`,
//! `ensure!`) on top of [`crate::error::Error`], so library code can keep a
//! concrete error type.

use crate::error::{Error, Result};

/// `.context()` / `.with_context()` on any `Result` whose error converts into [`Error`].
pub trait Context<T, E> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>;

    /// Lazy variant; the closure only runs on the error path.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    #[inline]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>,
    {
        self.map_err(|err| err.into().context(context))
    }

    #[inline]
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|err| err.into().context(f()))
    }
}

/// `Option<T>` → `Result<T>` with a message.
pub trait OptionContext<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>;

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> OptionContext<T> for Option<T> {
    #[inline]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Into<String>,
    {
        self.ok_or_else(|| Error::custom(context))
    }

    #[inline]
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.ok_or_else(|| Error::custom(f()))
    }
}

/// Early return with an error: `bail!("msg")`, `bail!(err)` or formatted.
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::error::Error::msg($msg))
    };
    ($err:expr $(,)?) => {
        return Err(Into::<$crate::error::Error>::into($err))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::error::Error::format(format_args!($fmt, $($arg)*)))
    };
}

/// Ensure a condition holds, else `bail!`.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:literal $(,)?) => {
        if !($cond) {
            $crate::bail!($msg);
        }
    };
    ($cond:expr, $err:expr $(,)?) => {
        if !($cond) {
            $crate::bail!($err);
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($fmt, $($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checked(rows: u32) -> Result<u32> {
        crate::ensure!(rows > 0, "rows must be positive, got {}", rows);
        Ok(rows)
    }

    #[test]
    fn ensure_formats_message() {
        let err = checked(0).unwrap_err();
        assert_eq!(err.to_string(), "rows must be positive, got 0");
        assert_eq!(checked(4).unwrap(), 4);
    }

    #[test]
    fn option_context_builds_custom_error() {
        let missing: Option<u8> = None;
        let err = missing.context("no adapter").unwrap_err();
        assert_eq!(err.to_string(), "no adapter");
    }

    #[test]
    fn result_context_wraps() {
        let raw: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        let err = raw.with_context(|| "reading yard.json").unwrap_err();
        assert!(err.to_string().starts_with("reading yard.json: I/O error"));
    }
}
