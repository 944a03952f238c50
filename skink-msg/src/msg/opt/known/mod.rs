/// Observe
pub mod observe;
pub use observe::*;

/// Block
pub mod block;
pub use block::*;

/// Content-Format registry values this endpoint speaks (RFC 7252
/// §12.3 plus the IANA registry). Content-Format values are plain
/// uints on the wire; pair these with `OptValue::of_uint` /
/// `OptionSet::uint`.
pub mod content_format {
  /// `text/plain; charset=utf-8`
  pub const TEXT: u16 = 0;

  /// `image/jpeg`
  pub const IMAGE_JPEG: u16 = 22;
}

/// Non-repeatable options
pub mod no_repeat {
  use crate::OptNumber;

  /// Observe: turns a GET into a subscription
  /// (<https://www.rfc-editor.org/rfc/rfc7641#section-2>)
  pub const OBSERVE: OptNumber = OptNumber(6);

  /// Content-Format (RFC 7252 §5.10.3)
  pub const CONTENT_FORMAT: OptNumber = OptNumber(12);

  /// Accept (RFC 7252 §5.10.4)
  pub const ACCEPT: OptNumber = OptNumber(17);

  /// Block2: server-to-client block-wise transfer control
  /// (<https://www.rfc-editor.org/rfc/rfc7959#section-2.2>)
  pub const BLOCK2: OptNumber = OptNumber(23);
}

/// Repeatable options
pub mod repeat {
  use crate::OptNumber;

  /// Uri-Path: one option per path segment (RFC 7252 §5.10.1)
  pub const PATH: OptNumber = OptNumber(11);

  /// Uri-Query: one option per query argument (RFC 7252 §5.10.1)
  pub const QUERY: OptNumber = OptNumber(15);
}
