//! Downloads - see [`crate::transfer`] for the wire format.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::command::Command;
use crate::io::Link;
use crate::session::Session;
use crate::{Error, Result};

impl<L: Link> Session<L> {
    /// Read `size` bytes of target memory starting at `addr`.
    ///
    /// Returns exactly `size` bytes.  A zero size returns an empty buffer
    /// without reading anything after the request.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] - the target sent nothing
    /// - [`Error::ShortRead`] - the target stopped sending part way through.
    ///   The partial data is discarded.
    pub fn download(&mut self, addr: u32, size: u32) -> Result<Vec<u8>> {
        let descriptor = Command::Dump.descriptor();
        let challenge = descriptor.challenge.ok_or(Error::InvalidOperation)?;

        debug!("Downloading {size} bytes from {addr:#010X}");

        self.write_token(challenge)?;
        self.write_u32(addr)?;
        self.write_u32(size)?;

        let mut buf = vec![0u8; size as usize];
        if !buf.is_empty() {
            let timeout = self.timeouts().for_window(descriptor.window);
            self.read_exact(&mut buf, timeout).inspect_err(|e| {
                warn!("Download of {size} bytes from {addr:#010X} failed: {e}");
            })?;
        }

        Ok(buf)
    }
}
