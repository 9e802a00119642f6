//! Command definitions
//!
//! The subset of store commands the mapper issues.

use bytes::Bytes;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Get,
    Set,
    Exists,
    Del,
    HSet,
    HGetAll,
    HDel,
    Expire,
    Ttl,
    SAdd,
    SRem,
    SMembers,
    Scan,
    FlushAll,
    Ping,
    Select,
}

impl CommandType {
    /// Command name as sent on the wire
    pub fn name(&self) -> &'static str {
        match self {
            CommandType::Get => "GET",
            CommandType::Set => "SET",
            CommandType::Exists => "EXISTS",
            CommandType::Del => "DEL",
            CommandType::HSet => "HSET",
            CommandType::HGetAll => "HGETALL",
            CommandType::HDel => "HDEL",
            CommandType::Expire => "EXPIRE",
            CommandType::Ttl => "TTL",
            CommandType::SAdd => "SADD",
            CommandType::SRem => "SREM",
            CommandType::SMembers => "SMEMBERS",
            CommandType::Scan => "SCAN",
            CommandType::FlushAll => "FLUSHALL",
            CommandType::Ping => "PING",
            CommandType::Select => "SELECT",
        }
    }
}

/// A store command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Get a string value
    Get { key: String },

    /// Set a string value
    Set { key: String, value: Vec<u8> },

    /// Test key existence
    Exists { key: String },

    /// Delete a key
    Del { key: String },

    /// Set one or more hash fields in a single atomic call
    HSet {
        key: String,
        fields: Vec<(String, Vec<u8>)>,
    },

    /// Read every field of a hash
    HGetAll { key: String },

    /// Delete hash fields
    HDel { key: String, fields: Vec<String> },

    /// Set a key's time-to-live
    Expire { key: String, seconds: u64 },

    /// Remaining time-to-live
    Ttl { key: String },

    /// Add a set member
    SAdd { key: String, member: String },

    /// Remove a set member
    SRem { key: String, member: String },

    /// List set members
    SMembers { key: String },

    /// One step of a cursor scan
    Scan {
        cursor: u64,
        pattern: String,
        count: usize,
    },

    /// Remove every key (test/utility use only)
    FlushAll,

    /// Health check
    Ping,

    /// Select a logical database
    Select { database: u32 },
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::Set { .. } => CommandType::Set,
            Command::Exists { .. } => CommandType::Exists,
            Command::Del { .. } => CommandType::Del,
            Command::HSet { .. } => CommandType::HSet,
            Command::HGetAll { .. } => CommandType::HGetAll,
            Command::HDel { .. } => CommandType::HDel,
            Command::Expire { .. } => CommandType::Expire,
            Command::Ttl { .. } => CommandType::Ttl,
            Command::SAdd { .. } => CommandType::SAdd,
            Command::SRem { .. } => CommandType::SRem,
            Command::SMembers { .. } => CommandType::SMembers,
            Command::Scan { .. } => CommandType::Scan,
            Command::FlushAll => CommandType::FlushAll,
            Command::Ping => CommandType::Ping,
            Command::Select { .. } => CommandType::Select,
        }
    }

    /// Full argument vector, command name first
    pub fn args(&self) -> Vec<Bytes> {
        let mut args = vec![Bytes::from_static(self.command_type().name().as_bytes())];
        match self {
            Command::Get { key }
            | Command::Exists { key }
            | Command::Del { key }
            | Command::HGetAll { key }
            | Command::Ttl { key }
            | Command::SMembers { key } => args.push(text(key)),
            Command::Set { key, value } => {
                args.push(text(key));
                args.push(Bytes::copy_from_slice(value));
            }
            Command::HSet { key, fields } => {
                args.push(text(key));
                for (field, value) in fields {
                    args.push(text(field));
                    args.push(Bytes::copy_from_slice(value));
                }
            }
            Command::HDel { key, fields } => {
                args.push(text(key));
                args.extend(fields.iter().map(|f| text(f)));
            }
            Command::Expire { key, seconds } => {
                args.push(text(key));
                args.push(text(&seconds.to_string()));
            }
            Command::SAdd { key, member } | Command::SRem { key, member } => {
                args.push(text(key));
                args.push(text(member));
            }
            Command::Scan {
                cursor,
                pattern,
                count,
            } => {
                args.push(text(&cursor.to_string()));
                args.push(Bytes::from_static(b"MATCH"));
                args.push(text(pattern));
                args.push(Bytes::from_static(b"COUNT"));
                args.push(text(&count.to_string()));
            }
            Command::Select { database } => args.push(text(&database.to_string())),
            Command::FlushAll | Command::Ping => {}
        }
        args
    }
}

fn text(s: &str) -> Bytes {
    Bytes::copy_from_slice(s.as_bytes())
}
