use embedded_time::duration::Milliseconds;
use embedded_time::Instant;

use crate::time::{Clock, Millis};

/// A number of (re)transmission attempts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Attempts(pub u16);

/// Result of [`RetryTimer::what_should_i_do`].
///
/// This tells you if a retry should be attempted or not.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Attempts have been exhausted and the work that is
  /// being retried should be considered poisoned.
  Cry,
  /// A retry should be performed
  Retry,
}

/// A non-blocking exponential-backoff retry timer that lives alongside
/// some operation to retry.
///
/// It does not _contain_ the work to be done; it only answers "should I
/// do it again right now?". The first deadline lands `init` after
/// `start`; each performed retry doubles the wait, so with
/// `init = 2000 ms` the deadlines land at 2 s, 6 s, 14 s, 30 s, … after
/// the initial transmission.
///
/// ```
/// use embedded_time::clock::Clock;
/// use skink::retry::{Attempts, RetryTimer, YouShould};
/// use embedded_time::duration::Milliseconds;
///
/// let clock = skink::std::Clock::new();
/// let now = || clock.try_now().unwrap();
///
/// let mut retry = RetryTimer::new(now(), Milliseconds(1), Attempts(2));
///
/// let mut failing_op_attempts = 1;
/// loop {
///   match nb::block!(retry.what_should_i_do(now())) {
///     | Ok(YouShould::Retry) => failing_op_attempts += 1,
///     | Ok(YouShould::Cry) => break,
///     | Err(_) => unreachable!(),
///   }
/// }
///
/// assert_eq!(failing_op_attempts, 3);
/// ```
#[derive(Debug)]
pub struct RetryTimer<C: Clock> {
  next_retry: Instant<C>,
  init: Millis,
  attempts: Attempts,
  max_attempts: Attempts,
}

// manual impls so that a non-Copy clock doesn't poison the timer
impl<C: Clock> Copy for RetryTimer<C> {}
impl<C: Clock> Clone for RetryTimer<C> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<C: Clock> RetryTimer<C> {
  /// Create a new retrier whose first deadline is `init` after `start`
  pub fn new(start: Instant<C>, init: Millis, max_attempts: Attempts) -> Self {
    Self { next_retry: start + init,
           init,
           attempts: Attempts(0),
           max_attempts }
  }

  /// When the thing we keep trying has not succeeded yet, invoke this
  /// to ask the timer what to do about it.
  ///
  /// Returns `nb::Error::WouldBlock` when the current deadline has not
  /// passed, [`YouShould::Retry`] when it has and attempts remain, and
  /// [`YouShould::Cry`] when the attempts are spent.
  pub fn what_should_i_do(&mut self,
                          now: Instant<C>)
                          -> nb::Result<YouShould, core::convert::Infallible> {
    if now < self.next_retry {
      return Err(nb::Error::WouldBlock);
    }

    if self.attempts >= self.max_attempts {
      return Ok(YouShould::Cry);
    }

    self.attempts.0 += 1;
    self.next_retry = now + Milliseconds(self.init.0 << self.attempts.0);
    Ok(YouShould::Retry)
  }

  /// Number of retries performed so far
  pub fn attempts(&self) -> Attempts {
    self.attempts
  }
}

/// The total time from first transmission to giving up, if every
/// attempt fails: `Σ init × 2^k` for `k` in `0..=max_attempts`.
pub fn max_time(init: Millis, max_attempts: Attempts) -> Millis {
  Milliseconds((0..=max_attempts.0 as u32).map(|k| init.0 << k).sum())
}
