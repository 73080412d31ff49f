//! Control protocol between the `agendawall` CLI and the kiosk daemon.
//!
//! Messages travel over a Unix socket as length-prefixed JSON:
//!
//! ```text
//! +----------------+------------------+
//! | length (4 BE)  |  JSON payload    |
//! +----------------+------------------+
//! ```
//!
//! Every payload is wrapped in an [`Envelope`] carrying the protocol version
//! and a request id echoed back in the response.
//!
//! ```rust
//! use agendawall_protocol::{Envelope, Request, decode_message, encode_message};
//!
//! let request = Envelope::new("req-1", Request::RefreshTimetable);
//! let bytes = encode_message(&request).unwrap();
//! let decoded: Envelope<Request> = decode_message(&bytes).unwrap();
//! assert_eq!(decoded.payload, Request::RefreshTimetable);
//! ```

mod error;
mod framing;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{decode_message, encode_message, read_frame, write_frame};
pub use types::{ClockModeInfo, Envelope, ErrorCode, ErrorResponse, Request, Response, StatusInfo};

/// Protocol version constant.
pub const PROTOCOL_VERSION: &str = "1";

/// Maximum message size (1 MB).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;
