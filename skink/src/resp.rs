//! Response codes used by this endpoint.
//!
//! CoAP response codes are written `class.detail` and packed into one
//! byte as `(class << 5) | detail` (RFC 7252 §5.9, §12.1.2).

use skink_msg::Code;

/// 2.04 Changed: the PUT/iPATCH was applied (RFC 7252 §5.9.1.4)
pub const CHANGED: Code = Code::new(2, 4);

/// 2.05 Content: the response carries a representation
/// (RFC 7252 §5.9.1.5)
pub const CONTENT: Code = Code::new(2, 5);

/// 4.00 Bad Request (RFC 7252 §5.9.2.1)
pub const BAD_REQUEST: Code = Code::new(4, 0);

/// 4.04 Not Found (RFC 7252 §5.9.2.5)
pub const NOT_FOUND: Code = Code::new(4, 4);

/// 4.15 Unsupported Content-Format (RFC 7252 §5.9.2.10)
pub const UNSUPPORTED_CONTENT_FORMAT: Code = Code::new(4, 15);

/// 5.03 Service Unavailable (RFC 7252 §5.9.3.4)
pub const SERVICE_UNAVAILABLE: Code = Code::new(5, 3);
