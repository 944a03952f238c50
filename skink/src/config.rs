use embedded_time::duration::Milliseconds;

use crate::retry::Attempts;
use crate::time::Millis;

/// File names the endpoint reads and writes.
///
/// The server role serves `text` / `image` and appends to `text`; the
/// client role writes received block transfers to `recv_text` /
/// `recv_image` and FETCH responses to `fetch_out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Files {
  /// Target of iPATCH/FETCH and of GET without a query
  pub text: &'static str,
  /// Target of GET with `?type=image`
  pub image: &'static str,
  /// Destination of a received text block transfer
  pub recv_text: &'static str,
  /// Destination of a received image block transfer
  pub recv_image: &'static str,
  /// Destination of a received FETCH response body
  pub fetch_out: &'static str,
}

impl Default for Files {
  fn default() -> Self {
    Files { text: "server.txt",
            image: "server.jpg",
            recv_text: "from_server.txt",
            recv_image: "from_server.jpg",
            fetch_out: "from_server_fetch.txt" }
  }
}

/// Runtime config
///
/// ```
/// use skink::config::Config;
/// use skink::retry::Attempts;
/// use embedded_time::duration::Milliseconds;
///
/// let config = Config::default();
/// assert_eq!(config.ack_timeout, Milliseconds::<u64>(2000));
/// assert_eq!(config.max_retransmits, Attempts(4));
/// assert_eq!(config.subscriber_timeout, Milliseconds::<u64>(3 * 60 * 60 * 1000));
/// assert_eq!(config.timeout_threshold, 3);
/// assert_eq!(config.prune_interval, Milliseconds::<u64>(5000));
/// assert_eq!(config.block_size, 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Config {
  /// Deadline for the first retransmission of an unacked CON message.
  /// Subsequent deadlines double per attempt (RFC 7252 §4.2 without
  /// the ACK_RANDOM_FACTOR jitter).
  pub ack_timeout: Millis,

  /// Number of times an unacked CON message is retransmitted before
  /// the failure handler is invoked; up to `max_retransmits + 1`
  /// transmissions total.
  pub max_retransmits: Attempts,

  /// A subscriber silent for this long is charged one timeout strike.
  pub subscriber_timeout: Millis,

  /// Number of strikes after which a subscriber is pruned.
  pub timeout_threshold: u32,

  /// Cadence of the subscriber prune pass.
  pub prune_interval: Millis,

  /// Block2 block size; capped at 1024 (SZX 6).
  pub block_size: u16,

  /// Seed for Message ID and token generation, customizable so that
  /// a fleet of endpoints does not share one ID sequence.
  pub token_seed: u64,

  /// See [`Files`]
  pub files: Files,
}

impl Default for Config {
  fn default() -> Self {
    Config { ack_timeout: Milliseconds(2000),
             max_retransmits: Attempts(4),
             subscriber_timeout: Milliseconds(3 * 60 * 60 * 1000),
             timeout_threshold: 3,
             prune_interval: Milliseconds(5000),
             block_size: 1024,
             token_seed: 0,
             files: Files::default() }
  }
}

impl Config {
  /// The time after which an unacked CON is abandoned:
  /// `Σ ack_timeout × 2^k` for `k` in `0..=max_retransmits` (≈ 62 s
  /// with the defaults).
  pub fn max_transmit_wait(&self) -> Millis {
    crate::retry::max_time(self.ack_timeout, self.max_retransmits)
  }
}
