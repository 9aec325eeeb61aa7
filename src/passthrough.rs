//! Raw passthrough of whatever the target prints.
//!
//! After an upload or jump, programs on the target commonly log over the same
//! serial link.  [`Session::passthrough()`] copies those bytes unmodified to a
//! sink - usually stdout - until stopped.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::time::Duration;
use std::io::Write;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::io::Link;
use crate::session::{Session, StopFlag};
use crate::{Error, Result};

/// How long each read waits for the target before checking for a stop
pub const PASSTHROUGH_POLL: Duration = Duration::from_millis(50);

impl<L: Link> Session<L> {
    /// Copy inbound bytes to `sink` until `stop` is raised.  Returns the
    /// number of bytes copied.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the link or the sink fails.
    pub fn passthrough<W: Write>(&mut self, sink: &mut W, stop: &StopFlag) -> Result<u64> {
        info!("Passing through target output");
        let mut buf = [0u8; 256];
        let mut total = 0u64;

        while !stop.is_stopped() {
            let count = self.read_within(&mut buf[..1], PASSTHROUGH_POLL)?;
            if count == 0 {
                continue;
            }
            // Take whatever else has already arrived along with it
            let waiting = self.bytes_to_read()?.min(buf.len() - 1);
            let count = count + self.read_within(&mut buf[1..=waiting], Duration::ZERO)?;

            sink.write_all(&buf[..count])
                .and_then(|()| sink.flush())
                .map_err(|e| {
                    warn!("Passthrough sink failed: {e}");
                    Error::Io
                })?;
            total += count as u64;
        }

        debug!("Passthrough stopped after {total} bytes");
        Ok(total)
    }
}
