use embedded_time::Instant;
use no_std_net::SocketAddr;
use skink_msg::Id;

use crate::net::Addrd;
use crate::retry::{Attempts, RetryTimer, YouShould};
use crate::time::{Clock, Millis};

/// Maximum number of CON messages awaiting acknowledgement at once.
pub const MAX_PENDING_MESSAGES: usize = 10;

/// Invoked when a CON message was retransmitted to exhaustion without
/// an ACK. The peer is gone by definition; implementations clean up
/// whatever state was riding on the exchange (abort a file transfer,
/// charge the subscriber a strike).
pub trait RetransmitFailureHandler {
  /// `id` was abandoned after the final retransmission to `peer`.
  fn on_retransmit_failure(&mut self, id: Id, peer: SocketAddr);
}

impl<F: FnMut(Id, SocketAddr)> RetransmitFailureHandler for F {
  fn on_retransmit_failure(&mut self, id: Id, peer: SocketAddr) {
    self(id, peer)
  }
}

#[derive(Debug)]
struct PendingMessage<C: Clock> {
  id: Id,
  dest: SocketAddr,
  bytes: Vec<u8>,
  timer: RetryTimer<C>,
}

/// The confirmable-message retransmission table (RFC 7252 §4.2).
///
/// Owns a full copy of the wire bytes for every in-flight CON so a
/// retransmission needs no access to the message that produced them.
/// Slots are a fixed-size array; [`ReliabilityEngine::register`]
/// fails when all [`MAX_PENDING_MESSAGES`] are taken and callers must
/// treat that as a failed send.
#[derive(Debug)]
pub struct ReliabilityEngine<C: Clock> {
  slots: [Option<PendingMessage<C>>; MAX_PENDING_MESSAGES],
  ack_timeout: Millis,
  max_retransmits: Attempts,
}

impl<C: Clock> ReliabilityEngine<C> {
  /// Create an engine retransmitting after `ack_timeout` (doubling per
  /// attempt) at most `max_retransmits` times.
  pub fn new(ack_timeout: Millis, max_retransmits: Attempts) -> Self {
    Self { slots: core::array::from_fn(|_| None),
           ack_timeout,
           max_retransmits }
  }

  /// Number of active entries.
  pub fn pending(&self) -> usize {
    self.slots.iter().flatten().count()
  }

  /// Store `bytes` for retransmission to `dest` until an ACK matching
  /// `id` arrives.
  ///
  /// Returns false (and stores nothing) when no slot is free.
  #[must_use]
  pub fn register(&mut self, id: Id, dest: SocketAddr, bytes: Vec<u8>, now: Instant<C>) -> bool {
    let free = match self.slots.iter_mut().find(|s| s.is_none()) {
      | Some(slot) => slot,
      | None => {
        log::warn!("no free pending slots, dropping CON {:?}", id);
        return false;
      },
    };

    log::trace!("stored {:?} for retransmission to {}", id, dest);
    *free = Some(PendingMessage { id,
                                  dest,
                                  bytes,
                                  timer: RetryTimer::new(now,
                                                         self.ack_timeout,
                                                         self.max_retransmits) });
    true
  }

  /// An ACK matching `id` arrived; drop the pending entry. No-op when
  /// absent.
  pub fn clear(&mut self, id: Id) {
    for slot in self.slots.iter_mut() {
      if slot.as_ref().map(|p| p.id) == Some(id) {
        log::trace!("cleared pending message {:?}", id);
        *slot = None;
        return;
      }
    }
  }

  /// Retransmit every entry whose deadline has passed, abandoning (and
  /// reporting to `failures`) entries that have exhausted their
  /// retransmissions.
  pub fn tick(&mut self,
              now: Instant<C>,
              send: &mut impl FnMut(Addrd<&[u8]>),
              failures: &mut impl RetransmitFailureHandler) {
    for slot in self.slots.iter_mut() {
      let pending = match slot {
        | Some(p) => p,
        | None => continue,
      };

      match pending.timer.what_should_i_do(now) {
        | Err(nb::Error::WouldBlock) => (),
        | Ok(YouShould::Retry) => {
          log::debug!("retransmit #{} for {:?}",
                      pending.timer.attempts().0,
                      pending.id);
          send(Addrd(&pending.bytes, pending.dest));
        },
        | Ok(YouShould::Cry) => {
          log::warn!("max retransmits reached for {:?}", pending.id);
          failures.on_retransmit_failure(pending.id, pending.dest);
          *slot = None;
        },
        | Err(nb::Error::Other(never)) => match never {},
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use embedded_time::Clock as _;

  use super::*;
  use crate::test::{dummy_addr, ClockMock};

  fn engine() -> ReliabilityEngine<ClockMock> {
    ReliabilityEngine::new(Millis(2000), Attempts(4))
  }

  fn tick_collecting(engine: &mut ReliabilityEngine<ClockMock>,
                     clock: &ClockMock)
                     -> (Vec<Vec<u8>>, Vec<Id>) {
    let mut sent = Vec::new();
    let mut failed = Vec::new();
    engine.tick(clock.try_now().unwrap(),
                &mut |msg: Addrd<&[u8]>| sent.push(msg.data().to_vec()),
                &mut |id: Id, _| failed.push(id));
    (sent, failed)
  }

  #[test]
  fn retransmits_then_fails_once() {
    let clock = ClockMock::new();
    let mut engine = engine();

    assert!(engine.register(Id(7),
                            dummy_addr(),
                            vec![1, 2, 3],
                            clock.try_now().unwrap()));

    let mut retransmissions = 0;
    let mut failures = Vec::new();

    for ms in (0..70_000).step_by(100) {
      clock.set(ms);
      let (sent, failed) = tick_collecting(&mut engine, &clock);
      retransmissions += sent.len();
      failures.extend(failed);
    }

    assert_eq!(retransmissions, 4);
    assert_eq!(failures, [Id(7)]);

    // the slot was freed; ticking further reports nothing
    clock.set(200_000);
    let (sent, failed) = tick_collecting(&mut engine, &clock);
    assert!(sent.is_empty() && failed.is_empty());
  }

  #[test]
  fn ack_clears_before_retry() {
    let clock = ClockMock::new();
    let mut engine = engine();

    assert!(engine.register(Id(7), dummy_addr(), vec![1], clock.try_now().unwrap()));
    engine.clear(Id(7));

    clock.set(60_000);
    let (sent, failed) = tick_collecting(&mut engine, &clock);
    assert!(sent.is_empty() && failed.is_empty());
    assert_eq!(engine.pending(), 0);
  }

  #[test]
  fn clear_of_unknown_id_is_noop() {
    let mut engine = engine();
    engine.clear(Id(9));
  }

  #[test]
  fn table_capacity_is_hard() {
    let clock = ClockMock::new();
    let now = clock.try_now().unwrap();
    let mut engine = engine();

    for n in 0..MAX_PENDING_MESSAGES as u16 {
      assert!(engine.register(Id(n), dummy_addr(), vec![], now));
    }

    assert!(!engine.register(Id(99), dummy_addr(), vec![], now));
    assert_eq!(engine.pending(), MAX_PENDING_MESSAGES);

    // clearing one makes room again
    engine.clear(Id(0));
    assert!(engine.register(Id(99), dummy_addr(), vec![], now));
  }
}
