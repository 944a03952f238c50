//! Low-level representation of CoAP messages.
//!
//! The most notable item in `skink_msg` is [`Message`]: a CoAP message kept
//! very close to the actual byte layout described in RFC 7252 §3.
//!
//! ## Options
//! On the wire, options are delta-encoded: each option header carries the
//! difference between its number and the previous option's number. In memory
//! that encoding is a nuisance, so [`Message`] stores its options in an
//! [`OptionSet`]: an ordered, repeatable collection keyed by absolute
//! [`OptNumber`]. Deltas are recomputed on serialization, which also makes
//! the output canonical (options ascending, minimal extended fields).
//!
//! ## Allocation
//! Payloads and option values are dynamically sized, so this crate requires
//! `alloc`; it does not require `std` (disable the default `std` feature for
//! `no_std` targets). Tokens are at most 8 bytes and live inline in a
//! [`tinyvec::ArrayVec`].
//!
//! ```rust
//! use skink_msg::{Code, Id, Message, Type, TryFromBytes, TryIntoBytes};
//!
//! let mut msg = Message::new(Type::Con, Code::GET, Id(0x1234));
//! msg.set_path("buttons");
//!
//! let bytes: Vec<u8> = msg.clone().try_into_bytes().unwrap();
//! assert_eq!(Message::try_from_bytes(&bytes).unwrap(), msg);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(not(test), deny(unsafe_code, missing_copy_implementations))]
#![deny(missing_docs)]

extern crate alloc as std_alloc;

pub(crate) mod cursor;

#[doc(hidden)]
pub mod from_bytes;

/// Message structs
pub mod msg;

#[doc(hidden)]
pub mod to_bytes;

#[doc(inline)]
pub use from_bytes::TryFromBytes;
#[doc(inline)]
pub use msg::*;
#[doc(inline)]
pub use to_bytes::TryIntoBytes;

#[cfg(test)]
pub(crate) fn test_msg() -> (Message, std_alloc::vec::Vec<u8>) {
  use std_alloc::vec::Vec;

  let header: [u8; 4] = 0b0100_0001_0100_0101_0000_0000_0000_0001_u32.to_be_bytes();
  let token: [u8; 1] = [254u8];
  let content_format: &[u8] = b"application/json";
  let options: [&[u8]; 2] = [&[0b_1100_1101u8, 0b00000011u8], content_format];
  let payload: [&[u8]; 2] = [&[0b1111_1111_u8], b"hello, world!"];
  let bytes: Vec<u8> = [header.as_ref(),
                        token.as_ref(),
                        options.concat().as_ref(),
                        payload.concat().as_ref()].concat();

  let mut opts = OptionSet::default();
  opts.push(OptNumber(12), OptValue(content_format.to_vec()));

  let msg = Message { id: Id(1),
                      ty: Type::Con,
                      ver: Version(1),
                      token: Token(tinyvec::array_vec!([u8; 8] => 254)),
                      code: Code { class: 2,
                                   detail: 5 },
                      opts,
                      payload: Payload(b"hello, world!".to_vec()) };
  (msg, bytes)
}
