// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Common error type and clock helpers shared by every stage of the
//! scan pipeline.

use std::fmt;

/// Common error type for scan pipeline operations
///
/// Per-packet problems (malformed packets, data not ready) are reported
/// through this type but handled at the boundary where they occur. Only
/// construction-time configuration errors are expected to reach the caller
/// of [`crate::driver::Driver::new`].
#[derive(Debug)]
pub enum Error {
    /// I/O error (file operations, packet source exhausted)
    Io(std::io::Error),
    /// Sensor metadata could not be parsed
    Json(serde_json::Error),
    /// System time error
    SystemTime(std::time::SystemTimeError),
    /// Preprocessor data was requested before a frame was ready
    NotReady,
    /// Invalid packet data
    InvalidPacket(String),
    /// Unexpected end of data at given byte position
    UnexpectedEnd(usize),
    /// Unknown packet type
    UnknownPacketType(u16),
    /// Unsupported data format
    UnsupportedFormat(String),
    /// Configuration error
    Config(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Json(err) => write!(f, "metadata error: {}", err),
            Error::SystemTime(err) => write!(f, "system time error: {}", err),
            Error::NotReady => write!(f, "preprocessor data not ready"),
            Error::InvalidPacket(msg) => write!(f, "invalid packet: {}", msg),
            Error::UnexpectedEnd(len) => write!(f, "unexpected end of data at {} bytes", len),
            Error::UnknownPacketType(typ) => write!(f, "unknown packet type: {}", typ),
            Error::UnsupportedFormat(format) => write!(f, "unsupported format: {}", format),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<std::time::SystemTimeError> for Error {
    fn from(err: std::time::SystemTimeError) -> Self {
        Error::SystemTime(err)
    }
}

/// Get current timestamp in nanoseconds.
///
/// On Linux, uses `CLOCK_MONOTONIC_RAW` for best accuracy.
/// On other platforms, falls back to `SystemTime`.
#[cfg(target_os = "linux")]
pub fn timestamp() -> Result<u64, Error> {
    let mut tp = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let err = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut tp) };
    if err != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(tp.tv_sec as u64 * 1_000_000_000 + tp.tv_nsec as u64)
}

#[cfg(not(target_os = "linux"))]
pub fn timestamp() -> Result<u64, Error> {
    let now = std::time::SystemTime::now();
    let duration = now.duration_since(std::time::UNIX_EPOCH)?;
    Ok(duration.as_nanos() as u64)
}

/// Pick the outbound timestamp for an artifact.
///
/// A non-zero `override_ts` wins; zero means "use the timestamp derived from
/// the packet contents".
#[inline]
pub fn stamp(derived: u64, override_ts: u64) -> u64 {
    if override_ts != 0 {
        override_ts
    } else {
        derived
    }
}
