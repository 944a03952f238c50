use std_alloc::collections::BTreeMap;
use std_alloc::vec::Vec;

use crate::cursor::Cursor;
use crate::to_bytes::{opt_len_or_delta, MessageToBytesError};

/// Errors produced while parsing CoAP options
pub mod parse_error;
pub use parse_error::*;

/// Numbers & typed values for the options this endpoint understands
pub mod known;
pub use known::*;

/// # Option Number
///
/// Identifies which option is being set (e.g. Content-Format is 12).
/// On the wire only deltas between consecutive numbers appear; the
/// absolute number is recovered while parsing.
///
/// See [RFC7252#section-5.4.6](https://datatracker.ietf.org/doc/html/rfc7252#section-5.4.6)
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptNumber(pub u32);

/// # Option Value
///
/// The raw bytes of one occurrence of an option.
///
/// See [RFC7252#section-3.2](https://datatracker.ietf.org/doc/html/rfc7252#section-3.2)
#[derive(Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptValue(pub Vec<u8>);

impl OptValue {
  /// Encode an unsigned integer in the minimum number of big-endian
  /// bytes (0–4; zero encodes as the empty value).
  pub fn of_uint(val: u32) -> Self {
    let bytes = val.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    Self(bytes[skip..].to_vec())
  }

  /// Decode an unsigned integer; `None` when the value is longer
  /// than 4 bytes.
  pub fn uint(&self) -> Option<u32> {
    if self.0.len() > 4 {
      return None;
    }

    Some(self.0.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32))
  }
}

/// # OptionSet
///
/// An ordered, repeatable collection of options keyed by absolute
/// [`OptNumber`]. Iteration and serialization always run in ascending
/// number order; repeats of one number keep their insertion order
/// (Uri-Path segments rely on this).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptionSet(pub BTreeMap<OptNumber, Vec<OptValue>>);

impl OptionSet {
  /// Replace all occurrences of `number` with a single `value`.
  pub fn set(&mut self, number: OptNumber, value: OptValue) {
    self.0.insert(number, [value].into());
  }

  /// Append a (possibly repeated) occurrence of `number`.
  pub fn push(&mut self, number: OptNumber, value: OptValue) {
    self.0.entry(number).or_default().push(value);
  }

  /// Shorthand for [`OptionSet::set`] with a uint value.
  pub fn set_uint(&mut self, number: OptNumber, value: u32) {
    self.set(number, OptValue::of_uint(value));
  }

  /// The first occurrence of `number`, if any.
  pub fn first(&self, number: OptNumber) -> Option<&OptValue> {
    self.0.get(&number).and_then(|vs| vs.first())
  }

  /// All occurrences of `number`, in insertion order.
  pub fn all(&self, number: OptNumber) -> impl Iterator<Item = &OptValue> {
    self.0.get(&number).into_iter().flatten()
  }

  /// The first occurrence of `number` decoded as a uint.
  pub fn uint(&self, number: OptNumber) -> Option<u32> {
    self.first(number).and_then(OptValue::uint)
  }

  /// Whether any occurrence of `number` is present.
  pub fn contains(&self, number: OptNumber) -> bool {
    self.0.contains_key(&number)
  }

  /// Remove all occurrences of `number`.
  pub fn remove(&mut self, number: OptNumber) -> Option<Vec<OptValue>> {
    self.0.remove(&number)
  }

  /// Every (number, value) pair in ascending number order.
  pub fn iter(&self) -> impl Iterator<Item = (OptNumber, &OptValue)> {
    self.0
        .iter()
        .flat_map(|(n, vs)| vs.iter().map(move |v| (*n, v)))
  }

  /// Size of the delta-encoded options on the wire, in bytes.
  pub fn wire_size(&self) -> usize {
    let ext_size = |val: usize| match val {
      | n if n >= 269 => 2,
      | n if n >= 13 => 1,
      | _ => 0,
    };

    let mut prev = 0u32;
    self.iter()
        .map(|(OptNumber(n), v)| {
          let delta = (n - prev) as usize;
          prev = n;
          1 + ext_size(delta) + ext_size(v.0.len()) + v.0.len()
        })
        .sum()
  }

  /// Serialize in delta encoding onto the end of `bytes`.
  pub(crate) fn extend_bytes(&self, bytes: &mut Vec<u8>) -> Result<(), MessageToBytesError> {
    let mut prev = 0u32;

    for (OptNumber(n), value) in self.iter() {
      let delta = u16::try_from(n - prev).map_err(|_| MessageToBytesError::OptionNumberTooLarge(n))?;
      let len = u16::try_from(value.0.len()).map_err(|_| {
                                              MessageToBytesError::OptionValueTooLong(value.0
                                                                                           .len())
                                            })?;
      prev = n;

      let (delta_nibble, delta_ext) = opt_len_or_delta(delta);
      let (len_nibble, len_ext) = opt_len_or_delta(len);

      bytes.push((delta_nibble << 4) | len_nibble);

      if let Some(ext) = delta_ext {
        bytes.extend(ext);
      }

      if let Some(ext) = len_ext {
        bytes.extend(ext);
      }

      bytes.extend_from_slice(&value.0);
    }

    Ok(())
  }

  /// Parse delta-encoded options off the cursor, stopping at the
  /// payload marker or the end of the buffer.
  ///
  /// The second tuple member is true when the payload marker was
  /// consumed, i.e. payload bytes follow.
  pub(crate) fn try_consume_bytes<B: AsRef<[u8]>>(
    bytes: &mut Cursor<B>)
    -> Result<(Self, bool), OptParseError> {
    let mut opts = OptionSet::default();
    let mut number = 0u32;

    loop {
      let head = match bytes.next() {
        | None => return Ok((opts, false)),
        | Some(0b11111111) => return Ok((opts, true)),
        | Some(b) => b,
      };

      // NOTE: the delta must be consumed before the value length;
      // both may extend past the first byte.
      let delta = parse_opt_len_or_delta(head >> 4,
                                         bytes,
                                         OptParseError::OptionDeltaReservedValue(15))?;
      number += delta as u32;

      let len = parse_opt_len_or_delta(head & 0b00001111,
                                       bytes,
                                       OptParseError::ValueLengthReservedValue(15))?
                as usize;

      let value = bytes.take_exact(len).ok_or_else(OptParseError::eof)?;

      opts.push(OptNumber(number), OptValue(value.to_vec()));
    }
  }
}

pub(crate) fn parse_opt_len_or_delta<A: AsRef<[u8]>>(head: u8,
                                                     bytes: &mut Cursor<A>,
                                                     reserved_err: OptParseError)
                                                     -> Result<u16, OptParseError> {
  match head {
    | 13 => {
      let n = bytes.next().ok_or_else(OptParseError::eof)?;
      Ok((n as u16) + 13)
    },
    | 14 => match bytes.take_exact(2) {
      | Some(&[a, b]) => Ok(u16::from_be_bytes([a, b]) + 269),
      | _ => Err(OptParseError::eof()),
    },
    | 15 => Err(reserved_err),
    | _ => Ok(head as u16),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(bytes: &[u8]) -> Result<(OptionSet, bool), OptParseError> {
    OptionSet::try_consume_bytes(&mut Cursor::new(bytes))
  }

  #[test]
  fn parse_opt() {
    let (opts, marker) = parse(&[0b00010001, 0b00000001]).unwrap();
    assert_eq!(opts.first(OptNumber(1)), Some(&OptValue([1].into())));
    assert!(!marker);

    // delta 13 + 1
    let (opts, _) = parse(&[0b11010001, 0b00000001, 0b00000001]).unwrap();
    assert!(opts.contains(OptNumber(14)));

    // delta 269 + 1
    let (opts, _) = parse(&[0b11100001, 0b00000000, 0b00000001, 0b00000001]).unwrap();
    assert!(opts.contains(OptNumber(270)));
  }

  #[test]
  fn parse_accumulates_deltas() {
    let (opts, marker) =
      parse(&[0b00000001, 0b00000001, 0b00010001, 0b00000011, 0b11111111]).unwrap();

    assert_eq!(opts.first(OptNumber(0)), Some(&OptValue([1].into())));
    assert_eq!(opts.first(OptNumber(1)), Some(&OptValue([3].into())));
    assert!(marker);
  }

  #[test]
  fn parse_repeats_preserve_order() {
    // two Uri-Path segments: 11 "ab", delta 0 "c"
    let (opts, _) = parse(&[0b10110010, b'a', b'b', 0b00000001, b'c']).unwrap();

    let segs = opts.all(OptNumber(11)).map(|v| v.0.clone()).collect::<Vec<_>>();
    assert_eq!(segs, [b"ab".to_vec(), b"c".to_vec()]);
  }

  #[test]
  fn parse_rejects_reserved_nibbles() {
    assert_eq!(parse(&[0b11110001, 1]),
               Err(OptParseError::OptionDeltaReservedValue(15)));
    assert_eq!(parse(&[0b00011111, 1]),
               Err(OptParseError::ValueLengthReservedValue(15)));
  }

  #[test]
  fn parse_rejects_truncated_value() {
    assert_eq!(parse(&[0b00010011, 1]),
               Err(OptParseError::UnexpectedEndOfStream));
  }

  #[test]
  fn serialize_is_canonical() {
    let mut opts = OptionSet::default();
    opts.set_uint(OptNumber(23), 0x16); // inserted out of order
    opts.push(OptNumber(11), OptValue(b"file".to_vec()));
    opts.set_uint(OptNumber(12), 0);

    let mut bytes = Vec::new();
    opts.extend_bytes(&mut bytes).unwrap();

    let (parsed, _) = parse(&bytes).unwrap();
    assert_eq!(parsed, opts);

    // ascending on the wire: 11, then delta 1, then delta 11
    assert_eq!(bytes[0] >> 4, 11);
    assert_eq!(bytes[5] >> 4, 1);
  }

  #[test]
  fn serialize_extended_delta() {
    let mut opts = OptionSet::default();
    opts.set_uint(OptNumber(300), 1);

    let mut bytes = Vec::new();
    opts.extend_bytes(&mut bytes).unwrap();
    assert_eq!(bytes, [0b11100001, 0, 31, 1]);

    let (parsed, _) = parse(&bytes).unwrap();
    assert_eq!(parsed.uint(OptNumber(300)), Some(1));
  }

  #[test]
  fn uint_encoding_is_minimal() {
    assert_eq!(OptValue::of_uint(0).0, Vec::<u8>::new());
    assert_eq!(OptValue::of_uint(5).0, [5]);
    assert_eq!(OptValue::of_uint(256).0, [1, 0]);
    assert_eq!(OptValue::of_uint(0x0116).0, [0x01, 0x16]);
    assert_eq!(OptValue::of_uint(u32::MAX).0, [0xFF; 4]);

    assert_eq!(OptValue::of_uint(0).uint(), Some(0));
    assert_eq!(OptValue::of_uint(77).uint(), Some(77));
    assert_eq!(OptValue::of_uint(u32::MAX).uint(), Some(u32::MAX));
    assert_eq!(OptValue([1, 2, 3, 4, 5].into()).uint(), None);
  }

  #[test]
  fn wire_size_matches() {
    let mut opts = OptionSet::default();
    opts.push(OptNumber(11), OptValue(b"buttons".to_vec()));
    opts.set_uint(OptNumber(12), 0);
    opts.set_uint(OptNumber(300), 2);

    let mut bytes = Vec::new();
    opts.extend_bytes(&mut bytes).unwrap();
    assert_eq!(opts.wire_size(), bytes.len());
  }
}
