use std::{iter::Take, time::Duration};

/// An infinite stream of delays for retrying a failed operation, where each
/// delay is the previous one times a constant factor, up to some maximum.
/// Upon reaching the maximum delay, that value is returned from then on.
/// Use `take` to bound the number of attempts.
///
/// Delays are meant for [std::thread::sleep]; do not use this from
/// asynchronous code.
pub struct ExponentialBackoff {
    curr: Duration,
    max: Duration,
    factor: u32,
}

impl ExponentialBackoff {
    pub fn new(start: Duration, max: Duration, factor: u32) -> ExponentialBackoff {
        ExponentialBackoff {
            curr: start,
            max,
            factor,
        }
    }
}

impl Iterator for ExponentialBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        let delay = self.curr;
        self.curr = (self.curr * self.factor).min(self.max);
        Some(delay)
    }
}

/// Retry a fallible function over an iterator of delays, until it succeeds or
/// the delays run out.
pub trait Retry: Iterator<Item = Duration> + Sized {
    /// Call `f` until it returns [Ok]. After each failed attempt but the
    /// last, `sleep` receives the error and the delay before the next
    /// attempt; it is expected to log and then sleep. If every attempt
    /// fails, the last [Err] is returned. An empty iterator makes no
    /// attempt and returns `None`.
    fn retry<F, S, T, E>(self, mut f: F, sleep: S) -> Option<Result<T, E>>
    where
        F: FnMut() -> Result<T, E>,
        S: Fn(&E, Duration),
    {
        let mut last_err = None;
        let mut iter = self.peekable();

        while let Some(delay) = iter.next() {
            match f() {
                Ok(v) => return Some(Ok(v)),
                Err(e) => {
                    if iter.peek().is_some() {
                        sleep(&e, delay);
                    }
                    last_err = Some(Err(e));
                }
            }
        }
        last_err
    }
}

impl Retry for ExponentialBackoff {}

impl Retry for Take<ExponentialBackoff> {}
