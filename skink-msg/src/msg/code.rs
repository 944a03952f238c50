use core::fmt;

/// # Message Code
///
/// An 8-bit value split into a 3-bit class and 5-bit detail,
/// conventionally written `class.detail` (e.g. `2.05`, `4.04`).
/// Class 0 codes are request methods; classes 2, 4 and 5 are
/// response codes. (RFC 7252 §5.9, RFC 8132 §2)
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Code {
  /// The class of this code (the `2` in `2.05`)
  pub class: u8,
  /// The detail of this code (the `05` in `2.05`)
  pub detail: u8,
}

/// Whether a code represents a request, a response, or an empty message
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum CodeKind {
  /// A request method (class 0, nonzero detail)
  Request,
  /// A response (class 2, 4 or 5)
  Response,
  /// An empty message (`0.00`)
  Empty,
}

impl Code {
  /// Create a new Code from a class and detail
  pub const fn new(class: u8, detail: u8) -> Self {
    Self { class, detail }
  }

  /// Whether this code is a request method, response code, or empty
  pub fn kind(&self) -> CodeKind {
    match (self.class, self.detail) {
      | (0, 0) => CodeKind::Empty,
      | (0, _) => CodeKind::Request,
      | _ => CodeKind::Response,
    }
  }
}

/// Request methods
impl Code {
  /// The empty code `0.00`
  pub const EMPTY: Code = Code::new(0, 0);
  /// GET (RFC 7252 §5.8.1)
  pub const GET: Code = Code::new(0, 1);
  /// POST (RFC 7252 §5.8.2)
  pub const POST: Code = Code::new(0, 2);
  /// PUT (RFC 7252 §5.8.3)
  pub const PUT: Code = Code::new(0, 3);
  /// DELETE (RFC 7252 §5.8.4)
  pub const DELETE: Code = Code::new(0, 4);
  /// FETCH (RFC 8132 §2.1): retrieve part of a resource, driven by
  /// a request payload
  pub const FETCH: Code = Code::new(0, 5);
  /// iPATCH (RFC 8132 §2.3): idempotent partial modification
  pub const IPATCH: Code = Code::new(0, 7);
}

impl From<u8> for Code {
  fn from(b: u8) -> Self {
    Self { class: b >> 5,
           detail: b & 0b0001_1111 }
  }
}

impl From<Code> for u8 {
  fn from(c: Code) -> u8 {
    (c.class << 5) | c.detail
  }
}

impl fmt::Display for Code {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{:02}", self.class, self.detail)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn code_to_byte() {
    let code = Code { class: 2,
                      detail: 5 };
    assert_eq!(u8::from(code), 0b0100_0101u8);
    assert_eq!(Code::from(0b0100_0101u8), code);
  }

  #[test]
  fn kind() {
    assert_eq!(Code::EMPTY.kind(), CodeKind::Empty);
    assert_eq!(Code::GET.kind(), CodeKind::Request);
    assert_eq!(Code::IPATCH.kind(), CodeKind::Request);
    assert_eq!(Code::new(2, 5).kind(), CodeKind::Response);
    assert_eq!(Code::new(4, 4).kind(), CodeKind::Response);
  }

  #[test]
  fn display() {
    use std_alloc::string::ToString;

    assert_eq!(Code::new(2, 5).to_string(), "2.05");
    assert_eq!(Code::new(4, 15).to_string(), "4.15");
  }
}
