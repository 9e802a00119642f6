//! Reply frames
//!
//! Represents replies from the store.

use bytes::Bytes;

use crate::error::{OmError, Result};

/// A RESP2 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+OK`
    Simple(String),

    /// `-ERR ...`
    Error(String),

    /// `:42`
    Integer(i64),

    /// `$3 foo`, `None` for the null bulk string
    Bulk(Option<Bytes>),

    /// `*2 ...`, `None` for the null array
    Array(Option<Vec<Frame>>),
}

impl Frame {
    /// Surface an error reply as `Err`
    pub fn into_result(self) -> Result<Frame> {
        match self {
            Frame::Error(message) if message.starts_with("WRONGTYPE") => {
                Err(OmError::WrongType { key: message })
            }
            Frame::Error(message) => Err(OmError::Protocol(message)),
            frame => Ok(frame),
        }
    }

    pub fn into_integer(self) -> Result<i64> {
        match self.into_result()? {
            Frame::Integer(n) => Ok(n),
            other => Err(unexpected("integer", &other)),
        }
    }

    /// Bulk string payload; a null bulk yields `None`
    pub fn into_bulk(self) -> Result<Option<Bytes>> {
        match self.into_result()? {
            Frame::Bulk(payload) => Ok(payload),
            Frame::Simple(s) => Ok(Some(Bytes::from(s))),
            other => Err(unexpected("bulk string", &other)),
        }
    }

    /// Array elements; a null array yields an empty vec
    pub fn into_array(self) -> Result<Vec<Frame>> {
        match self.into_result()? {
            Frame::Array(items) => Ok(items.unwrap_or_default()),
            other => Err(unexpected("array", &other)),
        }
    }

    /// Array of non-null UTF-8 bulk strings
    pub fn into_strings(self) -> Result<Vec<String>> {
        self.into_array()?
            .into_iter()
            .map(|item| {
                let bytes = item
                    .into_bulk()?
                    .ok_or_else(|| OmError::Protocol("null element in array reply".to_string()))?;
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| OmError::Protocol(format!("non UTF-8 string reply: {}", e)))
            })
            .collect()
    }

    /// Expect a `+OK`-style status reply
    pub fn expect_ok(self) -> Result<()> {
        match self.into_result()? {
            Frame::Simple(_) => Ok(()),
            other => Err(unexpected("status", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &Frame) -> OmError {
    OmError::Protocol(format!("expected {} reply, got {:?}", expected, got))
}
