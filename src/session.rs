//! The session with the target monitor.
//!
//! A [`Session`] exclusively owns the open [`Link`], along with the settings
//! it was opened with and the timeouts used for every exchange.  All protocol
//! operations are methods on the session:
//!
//! - challenge/response - [`Session::perform()`]
//! - transfers - [`Session::upload()`], [`Session::download()`] and friends in
//!   [`crate::transfer`]
//! - memory helpers - [`crate::memory`]
//! - execution control - [`crate::exec`]
//!
//! The protocol is strictly request-then-response, and nothing in it
//! identifies which request a response belongs to.  Where more than one part
//! of an application needs the link at once - for example the
//! [`crate::debug::HaltMonitor`] polling for the halt sentinel while the user
//! issues commands - share the session as a [`SharedSession`] and hold its lock
//! for the whole of each exchange.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;

pub use crate::handshake::Ack;

use crate::command::{ResponseWindow, Token, escape_token};
use crate::io::Link;
use crate::link::LinkSettings;
use crate::transfer::TransferConfig;
use crate::{Error, Result};

/// Default response timeout
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default response timeout for flash erase/program commands
pub const FLASH_TIMEOUT: Duration = Duration::from_secs(5);

/// A session shared between threads
pub type SharedSession<L> = Arc<Mutex<Session<L>>>;

/// Inactivity timeouts for reads from the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub response: Duration,
    pub flash: Duration,
}

impl Timeouts {
    pub fn for_window(&self, window: ResponseWindow) -> Duration {
        match window {
            ResponseWindow::Standard => self.response,
            ResponseWindow::Flash => self.flash,
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            response: RESPONSE_TIMEOUT,
            flash: FLASH_TIMEOUT,
        }
    }
}

/// Signal used to stop long-running loops, such as [`Session::watch()`] or
/// [`crate::debug::HaltMonitor::run()`].
///
/// The protocol has no way to cancel an operation, so loops check this
/// between iterations.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every loop watching this flag to stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// An open session with the target monitor.  Created by
/// [`crate::link::open()`].
pub struct Session<L: Link> {
    link: L,
    settings: LinkSettings,
    timeouts: Timeouts,
    pub(crate) transfer: TransferConfig,
}

impl<L: Link> Session<L> {
    /// Wrap an already open link.  Normally [`crate::link::open()`] is used
    /// instead, which also handles fast mode.
    pub fn new(
        link: L,
        settings: LinkSettings,
        timeouts: Timeouts,
        transfer: TransferConfig,
    ) -> Self {
        Self {
            link,
            settings,
            timeouts,
            transfer,
        }
    }

    /// Settings the link was opened with
    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn transfer_config(&self) -> &TransferConfig {
        &self.transfer
    }

    /// Share this session between threads.
    pub fn into_shared(self) -> SharedSession<L> {
        Arc::new(Mutex::new(self))
    }

    /// Close the session, returning the link.
    pub fn into_link(self) -> L {
        self.link
    }

    /// Write raw bytes to the target.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        trace!("Write {} bytes", data.len());
        self.link.write(data).map_err(|e| {
            warn!("Link write failed: {e:?}");
            Error::Io
        })
    }

    /// Write a token.
    pub fn write_token(&mut self, token: Token) -> Result<()> {
        trace!("Write token {token}");
        self.write(token.as_bytes())
    }

    /// Write a 32-bit word in the target's byte order.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write(&value.to_le_bytes())
    }

    /// Number of bytes waiting to be read.
    pub fn bytes_to_read(&mut self) -> Result<usize> {
        self.link.bytes_to_read().map_err(|e| {
            warn!("Link status failed: {e:?}");
            Error::Io
        })
    }

    /// Fill `buf` from the target, waiting up to `timeout` for each read to
    /// make progress.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()` only
    /// if the target went quiet for longer than `timeout`.
    pub fn read_within(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let count = self
                .link
                .read(&mut buf[filled..], timeout)
                .map_err(|e| {
                    warn!("Link read failed: {e:?}");
                    Error::Io
                })?;
            if count == 0 {
                break;
            }
            filled += count;
        }
        trace!("Read {filled}/{} bytes", buf.len());
        Ok(filled)
    }

    /// Fill `buf` from the target.
    ///
    /// Fails with [`Error::Timeout`] if nothing arrived, or
    /// [`Error::ShortRead`] if the target went quiet part way through.  `buf`
    /// must not be used on failure.
    pub fn read_exact(&mut self, buf: &mut [u8], timeout: Duration) -> Result<()> {
        let received = self.read_within(buf, timeout)?;
        if received == buf.len() {
            Ok(())
        } else if received == 0 {
            Err(Error::Timeout)
        } else {
            Err(Error::ShortRead {
                expected: buf.len(),
                received,
            })
        }
    }

    /// Read a 32-bit word in the target's byte order.
    pub fn read_u32(&mut self, timeout: Duration) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf, timeout)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read a single byte if one is already waiting, without blocking.
    pub fn try_read_byte(&mut self) -> Result<Option<u8>> {
        if self.bytes_to_read()? == 0 {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        match self.read_within(&mut byte, Duration::ZERO)? {
            1 => Ok(Some(byte[0])),
            _ => Ok(None),
        }
    }

    /// Discard anything the target has already sent, returning it.
    ///
    /// Called after opening the link, as whatever was running on the target
    /// may have been printing to the serial port.
    pub fn drain_input(&mut self) -> Result<Vec<u8>> {
        let mut drained = Vec::new();
        loop {
            let waiting = self.bytes_to_read()?;
            if waiting == 0 {
                break;
            }
            let start = drained.len();
            drained.resize(start + waiting, 0);
            let read = self.read_within(&mut drained[start..], Duration::ZERO)?;
            drained.truncate(start + read);
            if read == 0 {
                break;
            }
        }

        if !drained.is_empty() {
            warn!(
                "Discarded {} stale bytes: {}",
                drained.len(),
                escape_token(&drained)
            );
        }
        Ok(drained)
    }
}
