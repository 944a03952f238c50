use tinyvec::ArrayVec;

/// # Token
///
/// 0–8 opaque bytes chosen by a client to correlate responses with
/// requests across message IDs; required for Observe, where every
/// notification for a subscription carries the registering token.
/// (RFC 7252 §5.3.1)
///
/// Whereas [`super::Id`] matches one ACK to one confirmable message,
/// the token survives across many exchanges.
#[derive(Copy, Clone, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Token(pub ArrayVec<[u8; 8]>);

impl Token {
  /// Copy up to 8 bytes into a token; `None` when `bytes` is longer.
  pub fn from_slice(bytes: &[u8]) -> Option<Self> {
    if bytes.len() > 8 {
      return None;
    }

    let mut buf = ArrayVec::new();
    buf.extend_from_slice(bytes);
    Some(Token(buf))
  }

  /// The token bytes.
  pub fn as_bytes(&self) -> &[u8] {
    &self.0
  }
}
