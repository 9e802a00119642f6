//! Protocol Module
//!
//! RESP2, the request/response protocol spoken by the key-value store.
//!
//! ## Request Format
//! Every command is an array of bulk strings:
//! ```text
//! *<argc>\r\n
//! $<len>\r\n<arg bytes>\r\n   (repeated argc times)
//! ```
//!
//! ## Reply Frames
//! ```text
//! +<simple string>\r\n
//! -<error message>\r\n
//! :<integer>\r\n
//! $<len>\r\n<bytes>\r\n      ($-1 = null bulk)
//! *<count>\r\n<frames...>     (*-1 = null array)
//! ```

mod command;
mod frame;
mod codec;

pub use command::{Command, CommandType};
pub use frame::Frame;
pub use codec::{
    decode_frame, encode_command, encode_frame, read_frame, write_command, MAX_BULK_SIZE,
    MAX_NESTING_DEPTH,
};
