use skink_msg::Id;

use crate::net::Addrd;

/// Number of recent message IDs remembered per direction.
///
/// Message IDs are random 16-bit values, so a collision inside a
/// 16-entry window is possible but vanishingly rare; a spurious
/// "duplicate" answer is acceptable because every handler on this
/// endpoint is idempotent.
pub const RECENT_MSG_HISTORY: usize = 16;

/// Fixed-size ring of recently seen message IDs.
///
/// One window tracks inbound requests (server role), another inbound
/// notifications (client role), so request IDs and notification IDs
/// never collide with each other.
#[derive(Debug, Clone, Default)]
pub struct DuplicateWindow {
  ids: [Option<Id>; RECENT_MSG_HISTORY],
  next: usize,
}

impl DuplicateWindow {
  /// Remember `id`, evicting the oldest entry once the window is full.
  pub fn record(&mut self, id: Id) {
    self.ids[self.next] = Some(id);
    self.next = (self.next + 1) % RECENT_MSG_HISTORY;
  }

  /// Has `id` been recorded within the last [`RECENT_MSG_HISTORY`]
  /// distinct IDs?
  pub fn is_duplicate(&self, id: Id) -> bool {
    self.ids.iter().any(|slot| *slot == Some(id))
  }
}

/// Ring of recently sent piggy-backed responses, keyed by
/// (peer, message ID).
///
/// A duplicate CON request is answered by replaying the stored wire
/// bytes instead of re-running its handler (RFC 7252 §4.2 exchange
/// lifetime, scaled down to this endpoint's traffic).
#[derive(Debug, Clone)]
pub struct ReplayCache {
  entries: [Option<(Addrd<Id>, Vec<u8>)>; RECENT_MSG_HISTORY],
  next: usize,
}

impl Default for ReplayCache {
  fn default() -> Self {
    Self { entries: core::array::from_fn(|_| None),
           next: 0 }
  }
}

impl ReplayCache {
  /// Remember the response sent to `key`.
  pub fn store(&mut self, key: Addrd<Id>, response: Vec<u8>) {
    self.entries[self.next] = Some((key, response));
    self.next = (self.next + 1) % RECENT_MSG_HISTORY;
  }

  /// The wire bytes previously sent to `key`, if still cached.
  pub fn get(&self, key: Addrd<Id>) -> Option<&[u8]> {
    self.entries
        .iter()
        .flatten()
        .find(|(k, _)| *k == key)
        .map(|(_, bytes)| bytes.as_slice())
  }
}
