//! Member file contents.
//!
//! A member file holds one line of space-separated text,
//! `machineID executionID lamportNumber lockType [payload]`, NUL padded to
//! exactly `member_file_size` bytes. Every participant must use the same size;
//! a file of any other size is treated as corrupt.

use crate::error::{BakeryError, Result};
use crate::fs::{FileHandle, FileSystem, is_not_found};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Requested access mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Compatible with other shared holders.
    Shared,
    /// Excludes every other holder.
    Exclusive,
}

impl LockKind {
    /// Token written into member files.
    pub fn as_str(&self) -> &'static str {
        match self {
            LockKind::Shared => "SHARED",
            LockKind::Exclusive => "EXCLUSIVE",
        }
    }

    /// Parse the member file token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "SHARED" => Some(LockKind::Shared),
            "EXCLUSIVE" => Some(LockKind::Exclusive),
            _ => None,
        }
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, LockKind::Exclusive)
    }
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a member file was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("size is {actual} bytes, expected {expected}")]
    WrongSize { actual: u64, expected: usize },

    #[error("content is not UTF-8")]
    NotUtf8,

    #[error("missing {0} field")]
    MissingField(&'static str),

    #[error("unparsable lamport number '{0}'")]
    BadNumber(String),

    #[error("unknown lock type '{0}'")]
    BadLockType(String),
}

/// The values one locker publishes in its member file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub machine_id: String,
    pub execution_id: String,
    pub lamport_number: u64,
    pub kind: LockKind,
    /// Free-form owner data; may contain spaces.
    pub payload: String,
}

impl MemberRecord {
    /// The text line, without padding.
    pub fn to_line(&self) -> String {
        let mut line = format!(
            "{} {} {} {}",
            self.machine_id, self.execution_id, self.lamport_number, self.kind
        );
        if !self.payload.is_empty() {
            line.push(' ');
            line.push_str(&self.payload);
        }
        line
    }

    /// Fixed-size file image: the line followed by NUL padding.
    pub fn encode(&self, size: usize) -> Result<Vec<u8>> {
        let mut bytes = self.to_line().into_bytes();
        if bytes.len() > size {
            return Err(BakeryError::RecordTooLarge {
                size: bytes.len(),
                limit: size,
            });
        }
        bytes.resize(size, 0);
        Ok(bytes)
    }

    /// Parse a file image. Padding after the first NUL is ignored.
    pub fn decode(bytes: &[u8]) -> std::result::Result<Self, RecordError> {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let text = std::str::from_utf8(&bytes[..end]).map_err(|_| RecordError::NotUtf8)?;

        let mut fields = text.splitn(5, ' ');
        let mut next = |name: &'static str| {
            fields
                .next()
                .filter(|f| !f.is_empty())
                .ok_or(RecordError::MissingField(name))
        };

        let machine_id = next("machine id")?;
        let execution_id = next("execution id")?;
        let number = next("lamport number")?;
        let kind = next("lock type")?;
        let payload = fields.next().unwrap_or("");

        let lamport_number = number
            .parse()
            .map_err(|_| RecordError::BadNumber(number.to_string()))?;
        let kind =
            LockKind::from_token(kind).ok_or_else(|| RecordError::BadLockType(kind.to_string()))?;

        Ok(Self {
            machine_id: machine_id.to_string(),
            execution_id: execution_id.to_string(),
            lamport_number,
            kind,
            payload: payload.to_string(),
        })
    }
}

/// Result of reading another locker's member file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberRead {
    /// The file is gone; its owner already left.
    Missing,
    /// The file exists but cannot be trusted.
    Corrupt(RecordError),
    Valid(MemberRecord),
}

/// Read and parse the member file at `path`, which must be exactly `expected_size` bytes.
pub fn read_member_file(
    fs: &dyn FileSystem,
    path: &Path,
    expected_size: usize,
) -> Result<MemberRead> {
    let mut handle: Box<dyn FileHandle> = match fs.open_read_only(path) {
        Ok(handle) => handle,
        Err(e) if is_not_found(&e) => return Ok(MemberRead::Missing),
        Err(e) => return Err(BakeryError::io("open", path, e)),
    };

    let actual = handle
        .size()
        .map_err(|e| BakeryError::io("stat", path, e))?;
    if actual != expected_size as u64 {
        return Ok(MemberRead::Corrupt(RecordError::WrongSize {
            actual,
            expected: expected_size,
        }));
    }

    let mut bytes = vec![0u8; expected_size];
    match handle.read_exact(&mut bytes) {
        Ok(()) => {}
        // Truncated between stat and read; same as a wrong size.
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Ok(MemberRead::Corrupt(RecordError::WrongSize {
                actual,
                expected: expected_size,
            }));
        }
        Err(e) => return Err(BakeryError::io("read", path, e)),
    }

    Ok(match MemberRecord::decode(&bytes) {
        Ok(record) => MemberRead::Valid(record),
        Err(reason) => MemberRead::Corrupt(reason),
    })
}
