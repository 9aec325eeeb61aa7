//! Host-side transfer and remote-control protocol for MIPS targets running a
//! resident kernel monitor, spoken over a single serial link.
//!
//! This crate uploads executables, raw binaries and flash images to the target,
//! reads and writes arbitrary target memory, triggers remote execution, and
//! provides a minimal debugging bridge - register inspection, halt/continue and
//! exception decoding - built on the same link.
//!
//! ## Protocol
//!
//! Every command starts with a 4-byte ASCII challenge written by the host (for
//! example `SBIN` or `DUMP`).  Most commands expect a 4-byte ASCII response
//! from the target (usually `OKAY`).  Addresses, sizes and checksums are 32-bit
//! little endian words, the target's native byte order.
//!
//! Uploads are split into 2048-byte blocks.  After each block the target asks
//! for the block's checksum (`CHEK`), and either accepts it (`MORE`) or asks for
//! the block again (`ERR!`).  Resending a block is safe - it only overwrites the
//! same destination bytes - so a single corrupted block never forces the whole
//! payload to be retransmitted.
//!
//! The link is timing sensitive.  Reads use inactivity timeouts (500ms by
//! default, longer for flash programming), and any exchange that doesn't
//! complete cleanly is reported to the caller rather than retried.
//!
//! ## Modules
//!
//! - [`command`] - Static table of command descriptors
//! - [`io`] - [`io::Link`] and [`io::Connector`] traits, implemented by the
//!   serial backend
//! - [`link`] - Link settings, and opening a [`session::Session`] including the
//!   fast mode baud switch
//! - [`session`] - The session object owning the link, and challenge/response
//! - [`transfer`] - Chunked, checksum-verified upload and exact-length download
//! - [`memory`] - Dump, watch and poke helpers
//! - [`exec`] - Jump, call, halt, continue, reset
//! - [`debug`] - Register file, halt monitor and the debug bridge socket
//! - [`passthrough`] - Raw passthrough of inbound bytes
//!
//! ## Getting Started
//!
//! 1. Implement [`io::Connector`] and [`io::Link`] for your serial backend, or
//!    enable the `serialport` feature and use `serial::SerialPortConnector`.
//! 2. Open a session with [`link::open()`], optionally in fast mode.
//! 3. Call operations on the [`session::Session`], e.g.
//!    [`session::Session::upload()`] or [`session::Session::dump_bytes()`].
//! 4. For debugging, wrap the session with [`session::Session::into_shared()`]
//!    and create a [`debug::Debugger`].
//!
//! ```rust,ignore
//! use kmon_link::command::Command;
//! use kmon_link::link::{self, SessionConfig};
//! use kmon_link::transfer::checksum;
//!
//! let mut session = link::open(&mut connector, &SessionConfig::default())?;
//! let payload = std::fs::read("demo.bin")?;
//! session.upload(Command::SendBin.descriptor(), 0x8001_0000, &payload, checksum(&payload))?;
//! session.jump_to(0x8001_0000)?;
//! ```
//!
//! ## Features
//!
//! - `serialport` - Adds a [`io::Connector`] backed by the `serialport` crate.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

pub mod command;
pub mod debug;
pub mod exec;
mod handshake;
pub mod io;
pub mod link;
pub mod memory;
pub mod passthrough;
#[cfg(feature = "serialport")]
pub mod serial;
pub mod session;
#[cfg(test)]
mod test_support;
pub mod transfer;

use command::Received;

/// Protocol errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Serial port could not be opened or reopened.  Fatal to the session.
    #[error("failed to open serial port")]
    Port,
    /// No response arrived within the response window
    #[error("timed out waiting for the target")]
    Timeout,
    /// Bytes arrived, but not the expected token
    #[error("unexpected response \"{0}\"")]
    UnexpectedResponse(Received),
    /// Target monitor can't service the command in its current mode
    #[error("command not supported by the target in its current mode")]
    Unsupported,
    /// Target kept rejecting a block's checksum
    #[error("block at offset {offset:#x} rejected after {attempts} attempts")]
    ChecksumRejected { offset: u32, attempts: u32 },
    /// Payload stopped arriving part way through
    #[error("short read: expected {expected} bytes, received {received}")]
    ShortRead { expected: usize, received: usize },
    /// Link read or write failed
    #[error("link I/O error")]
    Io,
    /// Command descriptor lacks the token this operation needs
    #[error("invalid operation for this command")]
    InvalidOperation,
    /// Address, size or register argument couldn't be parsed
    #[error("invalid argument")]
    InvalidArgument,
    /// Executable image is too small to contain a header
    #[error("invalid executable image")]
    InvalidImage,
    /// Debug bridge socket couldn't be set up
    #[error("debug bridge socket error: {0}")]
    Bridge(std::io::ErrorKind),
}

impl Error {
    /// Whether this error means the target went quiet, either before
    /// responding at all, or part way through a payload.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout | Error::ShortRead { .. })
    }
}

/// Type to represent the result of a protocol operation
pub type Result<T> = core::result::Result<T, Error>;
