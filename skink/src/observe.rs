use embedded_time::duration::Milliseconds;
use embedded_time::Instant;
use no_std_net::SocketAddr;
use skink_msg::Token;

use crate::time::{elapsed, Clock, Millis};

/// Maximum number of concurrent Observe registrations.
pub const MAX_SUBSCRIBERS: usize = 5;

/// Observe sequence numbers are 24 bits on the wire and wrap.
const SEQ_MASK: u32 = 0x00FF_FFFF;

/// One Observe registration (RFC 7641): the peer that asked, the token
/// it asked with, where its notification sequence is, and how alive it
/// has looked lately.
#[derive(Debug, PartialEq)]
pub struct Subscriber<C: Clock> {
  peer: SocketAddr,
  token: Token,
  seq: u32,
  last_ack: Instant<C>,
  timeout_sessions: u32,
}

// manual impls so that a non-Copy clock doesn't poison the record
impl<C: Clock> Copy for Subscriber<C> {}
impl<C: Clock> Clone for Subscriber<C> {
  fn clone(&self) -> Self {
    *self
  }
}

impl<C: Clock> Subscriber<C> {
  /// The peer this subscriber lives at
  pub fn peer(&self) -> SocketAddr {
    self.peer
  }

  /// The token notifications for this subscriber must carry
  pub fn token(&self) -> Token {
    self.token
  }

  /// The sequence number the next notification will carry
  pub fn seq(&self) -> u32 {
    self.seq
  }

  /// Strikes accumulated from silence and failed retransmissions
  pub fn timeout_sessions(&self) -> u32 {
    self.timeout_sessions
  }

  /// Yield the current sequence number and advance it (24-bit wrap).
  pub fn next_seq(&mut self) -> u32 {
    let seq = self.seq;
    self.seq = (self.seq + 1) & SEQ_MASK;
    seq
  }
}

/// Fixed-capacity table of Observe subscribers keyed by (peer, token).
#[derive(Debug)]
pub struct ObserveRegistry<C: Clock> {
  subs: [Option<Subscriber<C>>; MAX_SUBSCRIBERS],
}

/// All [`MAX_SUBSCRIBERS`] slots are taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryFull;

impl<C: Clock> Default for ObserveRegistry<C> {
  fn default() -> Self {
    Self { subs: core::array::from_fn(|_| None) }
  }
}

impl<C: Clock> ObserveRegistry<C> {
  /// Add (or refresh) a registration for (`peer`, `token`).
  ///
  /// Re-registering an existing (peer, token) pair reuses its slot and
  /// resets its liveness rather than burning a second slot.
  pub fn register(&mut self,
                  peer: SocketAddr,
                  token: Token,
                  now: Instant<C>)
                  -> Result<&mut Subscriber<C>, RegistryFull> {
    let existing = self.subs
                       .iter()
                       .position(|s| matches!(s, Some(s) if s.peer == peer && s.token == token));

    let ix = match existing.or_else(|| self.subs.iter().position(Option::is_none)) {
      | Some(ix) => ix,
      | None => {
        log::warn!("no free subscriber slots for {}", peer);
        return Err(RegistryFull);
      },
    };

    let seq = match self.subs[ix] {
      // keep the sequence monotonic across a re-registration
      | Some(prior) => prior.seq,
      | None => 0,
    };

    log::debug!("subscriber {} registered in slot {}", peer, ix);
    self.subs[ix] = Some(Subscriber { peer,
                                      token,
                                      seq,
                                      last_ack: now,
                                      timeout_sessions: 0 });
    Ok(self.subs[ix].as_mut().expect("just filled this slot"))
  }

  /// Remove the registration for (`peer`, `token`), if present.
  pub fn deregister(&mut self, peer: SocketAddr, token: Token) {
    for slot in self.subs.iter_mut() {
      if matches!(slot, Some(s) if s.peer == peer && s.token == token) {
        log::debug!("subscriber {} deregistered", peer);
        *slot = None;
      }
    }
  }

  /// Remove every registration held by `peer` (e.g. after it RSTs a
  /// notification).
  pub fn deregister_peer(&mut self, peer: SocketAddr) {
    for slot in self.subs.iter_mut() {
      if matches!(slot, Some(s) if s.peer == peer) {
        *slot = None;
      }
    }
  }

  /// The subscriber at `peer`, if any.
  pub fn find_mut(&mut self, peer: SocketAddr) -> Option<&mut Subscriber<C>> {
    self.subs
        .iter_mut()
        .flatten()
        .find(|s| s.peer == peer)
  }

  /// Every active subscriber.
  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Subscriber<C>> {
    self.subs.iter_mut().flatten()
  }

  /// Number of active subscribers.
  pub fn len(&self) -> usize {
    self.subs.iter().flatten().count()
  }

  /// Whether no subscriber is registered.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// `peer` acknowledged a notification: reset its strikes and
  /// liveness window.
  pub fn on_ack(&mut self, peer: SocketAddr, now: Instant<C>) {
    if let Some(sub) = self.find_mut(peer) {
      sub.last_ack = now;
      sub.timeout_sessions = 0;
    }
  }

  /// Charge `peer` one strike (retransmission to it was abandoned).
  pub fn strike(&mut self, peer: SocketAddr) {
    if let Some(sub) = self.find_mut(peer) {
      sub.timeout_sessions += 1;
      log::warn!("subscriber {} timeout session count: {}",
                 peer,
                 sub.timeout_sessions);
    }
  }

  /// Liveness pass: remove subscribers with `threshold` strikes, and
  /// charge one strike per elapsed `timeout` of silence (resetting the
  /// window so each silent period costs exactly one strike).
  pub fn prune(&mut self, now: Instant<C>, timeout: Millis, threshold: u32) {
    for slot in self.subs.iter_mut() {
      let sub = match slot {
        | Some(s) => s,
        | None => continue,
      };

      if sub.timeout_sessions >= threshold {
        log::warn!("removing subscriber {} after {} timeout sessions",
                   sub.peer,
                   sub.timeout_sessions);
        *slot = None;
        continue;
      }

      if elapsed(sub.last_ack, now) > timeout {
        sub.timeout_sessions += 1;
        sub.last_ack = now;
        log::warn!("subscriber {} silent too long (strike {})",
                   sub.peer,
                   sub.timeout_sessions);
      }
    }
  }
}
