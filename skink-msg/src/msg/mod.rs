use std_alloc::vec::Vec;

/// Message Code
pub mod code;

/// Message parsing errors
pub mod parse_error;

/// Message ID
pub mod id;

/// Message Options
pub mod opt;

/// Message Type
pub mod ty;

/// Message Token
pub mod token;

/// Message Version
pub mod ver;

pub use code::*;
pub use id::*;
pub use opt::*;
pub use parse_error::*;
pub use token::*;
pub use ty::*;
pub use ver::*;

use crate::cursor::Cursor;
use crate::from_bytes::TryConsumeBytes;
use crate::TryFromBytes;

/// Message payload (RFC 7252 §5.5)
#[derive(Clone, Debug, Default, PartialEq, PartialOrd)]
pub struct Payload(pub Vec<u8>);

/// Struct representing the first byte of a message.
///
/// ```text
/// CoAP version
/// |
/// |  Message type (confirmable, ack, ..)
/// |  |
/// |  |  Length of token, in bytes. (4-bit integer)
/// |  |  |
/// vv vv vvvv
/// 01 00 0000
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub(crate) struct Byte1 {
  pub(crate) ver: Version,
  pub(crate) ty: Type,
  pub(crate) tkl: u8,
}

impl TryFrom<u8> for Byte1 {
  type Error = MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    let ver = b >> 6; // bits 0 & 1
    let ty = b >> 4 & 0b11; // bits 2 & 3
    let tkl = b & 0b1111u8; // last 4 bits

    Ok(Byte1 { ver: Version(ver),
               ty: Type::try_from(ty)?,
               tkl })
  }
}

impl From<Byte1> for u8 {
  fn from(b: Byte1) -> u8 {
    let ver = b.ver.0 << 6;
    let ty = u8::from(b.ty) << 4;
    let tkl = b.tkl;

    ver | ty | tkl
  }
}

/// # `Message` struct
/// Low-level representation of a CoAP message (RFC 7252 §3).
///
/// Supports serializing to and from bytes via [`crate::TryIntoBytes`]
/// and [`TryFromBytes`]; parsing rejects version ≠ 1, token lengths
/// over 8, reserved option nibbles and a payload marker with nothing
/// after it.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
  /// see [`Id`] for details
  pub id: Id,
  /// see [`Type`] for details
  pub ty: Type,
  /// see [`Version`] for details
  pub ver: Version,
  /// see [`Token`] for details
  pub token: Token,
  /// see [`Code`] for details
  pub code: Code,
  /// see [`OptionSet`] for details
  pub opts: OptionSet,
  /// see [`Payload`]
  pub payload: Payload,
}

impl Message {
  /// Create a new message with no token, no options and an empty payload.
  pub fn new(ty: Type, code: Code, id: Id) -> Self {
    Self { id,
           ty,
           code,
           ver: Version::default(),
           token: Token::default(),
           opts: OptionSet::default(),
           payload: Payload(Vec::new()) }
  }

  /// Create a new empty message that ACKs this one.
  ///
  /// The ACK reuses this message's [`Id`] and echoes its [`Token`],
  /// per the piggy-backed acknowledgement rules.
  pub fn ack(&self) -> Self {
    Self { id: self.id,
           token: self.token,
           ver: Version::default(),
           ty: Type::Ack,
           code: Code::new(0, 0),
           payload: Payload(Vec::new()),
           opts: OptionSet::default() }
  }

  /// Total size of this message on the wire, in bytes.
  pub fn wire_size(&self) -> usize {
    let header_size = 4;
    let payload_size = match self.payload.0.len() {
      | 0 => 0,
      | n => 1 + n, // 0xFF marker
    };

    header_size + self.token.0.len() + self.opts.wire_size() + payload_size
  }

  /// Borrow the payload bytes.
  pub fn payload(&self) -> &[u8] {
    &self.payload.0
  }
}

/// Option accessors for the options this endpoint speaks.
impl Message {
  /// Uri-Path segments, in order.
  pub fn path_segments(&self) -> impl Iterator<Item = &[u8]> {
    self.opts.all(known::repeat::PATH).map(|v| v.0.as_slice())
  }

  /// Append the segments of `path` (`'/'`-separated) as Uri-Path options.
  pub fn set_path(&mut self, path: &str) {
    path.split('/')
        .filter(|seg| !seg.is_empty())
        .for_each(|seg| {
          self.opts
              .push(known::repeat::PATH, OptValue(seg.as_bytes().to_vec()))
        });
  }

  /// Uri-Query values, in order.
  pub fn queries(&self) -> impl Iterator<Item = &[u8]> {
    self.opts.all(known::repeat::QUERY).map(|v| v.0.as_slice())
  }

  /// Append a Uri-Query option (e.g. `"type=image"`).
  pub fn add_query(&mut self, query: &str) {
    self.opts
        .push(known::repeat::QUERY, OptValue(query.as_bytes().to_vec()));
  }

  /// The Observe sequence number / action, when present.
  pub fn observe(&self) -> Option<u32> {
    self.opts.uint(known::no_repeat::OBSERVE)
  }

  /// The registration intent of this request's Observe option, when
  /// present and meaningful.
  pub fn observe_action(&self) -> Option<Action> {
    self.observe().and_then(Action::of_value)
  }

  /// Set the Observe option.
  pub fn set_observe(&mut self, value: u32) {
    self.opts.set_uint(known::no_repeat::OBSERVE, value);
  }

  /// The Block2 option, when present.
  pub fn block2(&self) -> Option<Block> {
    self.opts.uint(known::no_repeat::BLOCK2).map(Block::from)
  }

  /// Set the Block2 option.
  pub fn set_block2(&mut self, block: Block) {
    self.opts.set_uint(known::no_repeat::BLOCK2, block.into());
  }

  /// The Content-Format option, when present; values are registry
  /// uints (see [`opt::known::content_format`]).
  pub fn content_format(&self) -> Option<u16> {
    self.opts
        .uint(known::no_repeat::CONTENT_FORMAT)
        .map(|n| n as u16)
  }

  /// Set the Content-Format option.
  pub fn set_content_format(&mut self, format: u16) {
    self.opts
        .set_uint(known::no_repeat::CONTENT_FORMAT, format as u32);
  }

  /// The Accept option, when present; values are registry uints.
  pub fn accept(&self) -> Option<u16> {
    self.opts.uint(known::no_repeat::ACCEPT).map(|n| n as u16)
  }

  /// Set the Accept option.
  pub fn set_accept(&mut self, format: u16) {
    self.opts.set_uint(known::no_repeat::ACCEPT, format as u32);
  }
}

impl<Bytes: AsRef<[u8]>> TryFromBytes<Bytes> for Message {
  type Error = MessageParseError;

  fn try_from_bytes(bytes: Bytes) -> Result<Self, Self::Error> {
    let mut bytes = Cursor::new(bytes);

    let Byte1 { tkl, ty, ver } = bytes.next()
                                      .ok_or_else(MessageParseError::eof)?
                                      .try_into()?;

    if ver.0 != 1 {
      return Err(Self::Error::InvalidVersion(ver.0));
    }

    if tkl > 8 {
      return Err(Self::Error::InvalidTokenLength(tkl));
    }

    let code: Code = bytes.next().ok_or_else(MessageParseError::eof)?.into();
    let id: Id = Id::try_consume_bytes(&mut bytes)?;

    let token = bytes.take_exact(tkl as usize)
                     .ok_or_else(MessageParseError::eof)?;
    let token = Token::from_slice(token).expect("tkl was checked to be <= 8");

    let (opts, payload_follows) =
      OptionSet::try_consume_bytes(&mut bytes).map_err(Self::Error::OptParseError)?;

    let payload = match (payload_follows, bytes.remaining()) {
      | (false, _) => Payload(Vec::new()),
      | (true, 0) => return Err(Self::Error::PayloadMarkerWithoutPayload),
      | (true, _) => Payload(bytes.take_until_end().to_vec()),
    };

    Ok(Message { id,
                 ty,
                 ver,
                 code,
                 token,
                 opts,
                 payload })
  }
}
