use std_alloc::vec::Vec;
use tinyvec::ArrayVec;

use crate::*;

/// Trait allowing fallible conversion into bytes
pub trait TryIntoBytes {
  /// Error type yielded if conversion fails
  type Error;

  /// Try to convert into a heap-allocated collection of bytes
  ///
  /// ```
  /// use skink_msg::{Code, Id, Message, Type, TryIntoBytes};
  ///
  /// let msg = Message::new(Type::Con, Code::GET, Id(1));
  /// let bytes: Vec<u8> = msg.try_into_bytes().unwrap();
  /// ```
  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error>;
}

/// Errors encounterable serializing to bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageToBytesError {
  /// The destination buffer cannot hold the serialized message
  BufferTooSmall {
    /// Capacity of the destination
    capacity: usize,
    /// Size the message needs
    size: usize,
  },
  /// An option's number does not fit the wire delta encoding
  OptionNumberTooLarge(u32),
  /// An option's value does not fit the wire length encoding
  OptionValueTooLong(usize),
}

impl TryIntoBytes for Message {
  type Error = MessageToBytesError;

  fn try_into_bytes(self) -> Result<Vec<u8>, Self::Error> {
    let mut bytes = Vec::with_capacity(self.wire_size());

    let byte1: u8 = Byte1 { tkl: self.token.0.len() as u8,
                            ver: self.ver,
                            ty: self.ty }.into();

    bytes.push(byte1);
    bytes.push(self.code.into());
    bytes.extend(<[u8; 2]>::from(self.id));
    bytes.extend(self.token.0);

    self.opts.extend_bytes(&mut bytes)?;

    if !self.payload.0.is_empty() {
      bytes.push(0b11111111);
      bytes.extend(self.payload.0);
    }

    Ok(bytes)
  }
}

impl Message {
  /// Serialize into a caller-provided buffer, yielding the number of
  /// bytes written.
  ///
  /// Fails with [`MessageToBytesError::BufferTooSmall`] when `buf`
  /// cannot hold the result.
  pub fn write_to(&self, buf: &mut [u8]) -> Result<usize, MessageToBytesError> {
    let size = self.wire_size();
    if buf.len() < size {
      return Err(MessageToBytesError::BufferTooSmall { capacity: buf.len(),
                                                       size });
    }

    let bytes = self.clone().try_into_bytes()?;
    buf[..bytes.len()].copy_from_slice(&bytes);
    Ok(bytes.len())
  }
}

/// Encode an option delta or value length as its 4-bit header nibble
/// plus the extended field bytes (if the value is 13 or greater).
pub(crate) fn opt_len_or_delta(val: u16) -> (u8, Option<ArrayVec<[u8; 2]>>) {
  match val {
    | n if n >= 269 => {
      let mut bytes = ArrayVec::new();
      bytes.extend((n - 269).to_be_bytes());
      (14, Some(bytes))
    },
    | n if n >= 13 => {
      let mut bytes = ArrayVec::new();
      bytes.push((n as u8) - 13);
      (13, Some(bytes))
    },
    | n => (n as u8, None),
  }
}
