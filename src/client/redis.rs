//! TCP client
//!
//! Synchronous RESP2 client. One connection, serialized by a mutex,
//! reconnected lazily after any I/O failure.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};

use parking_lot::Mutex;

use super::{KeyTtl, KvClient};
use crate::config::Config;
use crate::error::{OmError, Result};
use crate::protocol::{read_frame, write_command, Command, Frame};

/// Keys fetched per SCAN round trip
const SCAN_BATCH: usize = 500;

/// A single buffered connection
struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,
}

impl Connection {
    fn open(config: &Config) -> Result<Self> {
        let addr = config
            .server_addr
            .to_socket_addrs()
            .map_err(|e| unavailable(&config.server_addr, e))?
            .next()
            .ok_or_else(|| OmError::Config(format!("cannot resolve {}", config.server_addr)))?;

        let stream = match config.connect_timeout() {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|e| unavailable(&config.server_addr, e))?;

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;

        let read_stream = stream.try_clone()?;
        let mut connection = Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
        };

        if config.database != 0 {
            connection
                .round_trip(&Command::Select {
                    database: config.database,
                })?
                .expect_ok()?;
        }

        Ok(connection)
    }

    /// Open, reporting socket-level failures as `StoreUnavailable`
    fn establish(config: &Config) -> Result<Self> {
        Self::open(config).map_err(|e| match e {
            OmError::Io(io) => unavailable(&config.server_addr, io),
            e => e,
        })
    }

    fn round_trip(&mut self, command: &Command) -> Result<Frame> {
        write_command(&mut self.writer, command)?;
        read_frame(&mut self.reader)
    }
}

fn unavailable(addr: &str, err: impl std::fmt::Display) -> OmError {
    OmError::StoreUnavailable(format!("{}: {}", addr, err))
}

/// `KvClient` backed by a remote store
pub struct RedisClient {
    config: Config,
    connection: Mutex<Option<Connection>>,
}

impl RedisClient {
    /// Connect eagerly so configuration problems surface immediately
    pub fn connect(config: Config) -> Result<Self> {
        let connection = Connection::establish(&config)?;
        tracing::debug!("Connected to {}", config.server_addr);
        Ok(Self {
            config,
            connection: Mutex::new(Some(connection)),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Health check
    pub fn ping(&self) -> Result<()> {
        self.execute(&Command::Ping)?.expect_ok()
    }

    /// Send one command and read its reply
    ///
    /// Any I/O failure (including a timeout) drops the connection and
    /// surfaces as `StoreUnavailable`; the next call reconnects.
    pub fn execute(&self, command: &Command) -> Result<Frame> {
        tracing::trace!("-> {:?}", command.command_type());

        let mut guard = self.connection.lock();
        if guard.is_none() {
            *guard = Some(Connection::establish(&self.config)?);
        }
        let Some(connection) = guard.as_mut() else {
            return Err(unavailable(&self.config.server_addr, "no connection"));
        };

        match connection.round_trip(command) {
            Ok(frame) => Ok(frame),
            Err(OmError::Io(e)) => {
                *guard = None;
                tracing::warn!("Connection to {} lost: {}", self.config.server_addr, e);
                Err(unavailable(&self.config.server_addr, e))
            }
            Err(e @ OmError::Protocol(_)) => {
                // Stream position is unknown after a framing error
                *guard = None;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

impl KvClient for RedisClient {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let reply = self.execute(&Command::Get {
            key: key.to_string(),
        })?;
        Ok(reply.into_bulk()?.map(|b| b.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.execute(&Command::Set {
            key: key.to_string(),
            value: value.to_vec(),
        })?
        .expect_ok()
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let reply = self.execute(&Command::Exists {
            key: key.to_string(),
        })?;
        Ok(reply.into_integer()? > 0)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let reply = self.execute(&Command::Del {
            key: key.to_string(),
        })?;
        Ok(reply.into_integer()? > 0)
    }

    fn hash_set_all(&self, key: &str, fields: &BTreeMap<String, Vec<u8>>) -> Result<()> {
        if fields.is_empty() {
            return Ok(());
        }
        self.execute(&Command::HSet {
            key: key.to_string(),
            fields: fields.iter().map(|(f, v)| (f.clone(), v.clone())).collect(),
        })?
        .into_integer()?;
        Ok(())
    }

    fn hash_get_all(&self, key: &str) -> Result<BTreeMap<String, Vec<u8>>> {
        let items = self
            .execute(&Command::HGetAll {
                key: key.to_string(),
            })?
            .into_array()?;
        if items.len() % 2 != 0 {
            return Err(OmError::Protocol(format!(
                "HGETALL returned an odd number of elements ({})",
                items.len()
            )));
        }

        let mut hash = BTreeMap::new();
        let mut items = items.into_iter();
        while let (Some(field), Some(value)) = (items.next(), items.next()) {
            let field = field
                .into_bulk()?
                .ok_or_else(|| OmError::Protocol("null hash field name".to_string()))?;
            let field = String::from_utf8(field.to_vec())
                .map_err(|e| OmError::Protocol(format!("non UTF-8 hash field: {}", e)))?;
            let value = value.into_bulk()?.map(|b| b.to_vec()).unwrap_or_default();
            hash.insert(field, value);
        }
        Ok(hash)
    }

    fn hash_delete(&self, key: &str, fields: &[String]) -> Result<usize> {
        if fields.is_empty() {
            return Ok(0);
        }
        let reply = self.execute(&Command::HDel {
            key: key.to_string(),
            fields: fields.to_vec(),
        })?;
        Ok(reply.into_integer()?.max(0) as usize)
    }

    fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        let reply = self.execute(&Command::Expire {
            key: key.to_string(),
            seconds,
        })?;
        Ok(reply.into_integer()? > 0)
    }

    fn ttl(&self, key: &str) -> Result<KeyTtl> {
        let reply = self.execute(&Command::Ttl {
            key: key.to_string(),
        })?;
        Ok(KeyTtl::from_reply(reply.into_integer()?))
    }

    fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let reply = self.execute(&Command::SAdd {
            key: key.to_string(),
            member: member.to_string(),
        })?;
        Ok(reply.into_integer()? > 0)
    }

    fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let reply = self.execute(&Command::SRem {
            key: key.to_string(),
            member: member.to_string(),
        })?;
        Ok(reply.into_integer()? > 0)
    }

    fn set_members(&self, key: &str) -> Result<BTreeSet<String>> {
        let members = self
            .execute(&Command::SMembers {
                key: key.to_string(),
            })?
            .into_strings()?;
        Ok(members.into_iter().collect())
    }

    fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys = BTreeSet::new();
        let mut cursor = 0u64;
        loop {
            let mut reply = self
                .execute(&Command::Scan {
                    cursor,
                    pattern: pattern.to_string(),
                    count: SCAN_BATCH,
                })?
                .into_array()?
                .into_iter();

            let (Some(next), Some(batch)) = (reply.next(), reply.next()) else {
                return Err(OmError::Protocol("malformed SCAN reply".to_string()));
            };
            let next = next
                .into_bulk()?
                .ok_or_else(|| OmError::Protocol("null SCAN cursor".to_string()))?;
            cursor = std::str::from_utf8(&next)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| OmError::Protocol("invalid SCAN cursor".to_string()))?;

            // SCAN may return a key more than once
            keys.extend(batch.into_strings()?);
            if cursor == 0 {
                break;
            }
        }
        Ok(keys.into_iter().collect())
    }

    fn flush_all(&self) -> Result<()> {
        self.execute(&Command::FlushAll)?.expect_ok()
    }
}
