use embedded_time::duration::Milliseconds;
use embedded_time::Instant;

/// A duration, in milliseconds
pub type Millis = Milliseconds<u64>;

/// Supertrait of [`embedded_time::Clock`] pinning the
/// type of "ticks" to u64
pub trait Clock: embedded_time::Clock<T = u64> {}
impl<C: embedded_time::Clock<T = u64>> Clock for C {}

/// Milliseconds elapsed between two instants of the same clock.
///
/// Saturates to zero when `to` is earlier than `from`.
pub fn elapsed<C: Clock>(from: Instant<C>, to: Instant<C>) -> Millis {
  if to < from {
    return Milliseconds(0);
  }

  (to - from).try_into().unwrap_or(Milliseconds(u64::MAX))
}
