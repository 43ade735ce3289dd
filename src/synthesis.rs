// src/synthesis.rs
//! Resumable units of work driven by the progressive loader.
//!
//! A [`Synthesis`] performs a bounded slice of work per [`Synthesis::step`]
//! and returns [`Step::Yield`] until it has a result. The loader calls `step`
//! from its per-frame pump, so each call must stay short.

use crate::cancel::CancellationToken;
use crate::error::Result;

/// Outcome of one slice of work.
#[derive(Debug)]
pub enum Step<T> {
    /// More work remains; call `step` again.
    Yield,
    /// Finished.
    Done(T),
}

impl<T> Step<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, Step::Done(_))
    }
}

pub trait Synthesis<T> {
    /// Runs one slice. Implementations check `cancel` at least once per call.
    fn step(&mut self, cancel: &CancellationToken) -> Result<Step<T>>;

    /// Completed fraction in `[0, 1]`, for diagnostics.
    fn progress(&self) -> f32 {
        0.0
    }

    /// Maps the final output once the inner work is done.
    fn map_output<U, F>(self, f: F) -> MapOutput<Self, F, T>
    where
        Self: Sized,
        F: FnOnce(T) -> Result<U>,
    {
        MapOutput {
            inner: self,
            f: Some(f),
            _marker: std::marker::PhantomData,
        }
    }

    /// Steps until done, ignoring any frame budget.
    fn run_to_end(mut self, cancel: &CancellationToken) -> Result<T>
    where
        Self: Sized,
    {
        loop {
            if let Step::Done(out) = self.step(cancel)? {
                return Ok(out);
            }
        }
    }
}

impl<T, S: Synthesis<T> + ?Sized> Synthesis<T> for Box<S> {
    fn step(&mut self, cancel: &CancellationToken) -> Result<Step<T>> {
        (**self).step(cancel)
    }

    fn progress(&self) -> f32 {
        (**self).progress()
    }
}

/// A single-shot closure as a synthesis that completes on its first step.
pub struct Once<F> {
    f: Option<F>,
    label: &'static str,
}

/// Wraps a closure that does all of its work in one step.
pub fn once<T, F>(f: F) -> Once<F>
where
    F: FnOnce() -> Result<T>,
{
    Once {
        f: Some(f),
        label: "synthesis",
    }
}

impl<T, F> Synthesis<T> for Once<F>
where
    F: FnOnce() -> Result<T>,
{
    fn step(&mut self, cancel: &CancellationToken) -> Result<Step<T>> {
        cancel.check(self.label)?;
        match self.f.take() {
            Some(f) => f().map(Step::Done),
            None => Err(crate::error::Error::msg("synthesis stepped after completion")),
        }
    }

    fn progress(&self) -> f32 {
        if self.f.is_some() {
            0.0
        } else {
            1.0
        }
    }
}

/// See [`Synthesis::map_output`].
pub struct MapOutput<S, F, T> {
    inner: S,
    f: Option<F>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<S, F, T, U> Synthesis<U> for MapOutput<S, F, T>
where
    S: Synthesis<T>,
    F: FnOnce(T) -> Result<U>,
{
    fn step(&mut self, cancel: &CancellationToken) -> Result<Step<U>> {
        match self.inner.step(cancel)? {
            Step::Yield => Ok(Step::Yield),
            Step::Done(out) => {
                cancel.check("output mapping")?;
                let f = self
                    .f
                    .take()
                    .ok_or_else(|| crate::error::Error::msg("output mapped twice"))?;
                f(out).map(Step::Done)
            }
        }
    }

    fn progress(&self) -> f32 {
        self.inner.progress()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    struct Countdown(u32);

    impl Synthesis<&'static str> for Countdown {
        fn step(&mut self, cancel: &CancellationToken) -> Result<Step<&'static str>> {
            cancel.check("countdown")?;
            if self.0 == 0 {
                return Ok(Step::Done("liftoff"));
            }
            self.0 -= 1;
            Ok(Step::Yield)
        }
    }

    #[test]
    fn run_to_end_steps_until_done() {
        let out = Countdown(3).run_to_end(&CancellationToken::new()).unwrap();
        assert_eq!(out, "liftoff");
    }

    #[test]
    fn map_output_applies_after_completion() {
        let mut job = Countdown(1).map_output(|s: &str| Ok(s.len()));
        let cancel = CancellationToken::new();
        assert!(!job.step(&cancel).unwrap().is_done());
        match job.step(&cancel).unwrap() {
            Step::Done(n) => assert_eq!(n, 7),
            Step::Yield => panic!("expected completion"),
        }
    }

    #[test]
    fn once_honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = once(|| Ok::<_, Error>(1)).run_to_end(&cancel).unwrap_err();
        assert!(err.is_cancelled());
    }
}
