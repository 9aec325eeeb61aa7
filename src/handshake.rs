//! Challenge/response exchange.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::time::Duration;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::command::{CommandDescriptor, Received, Token, UNSUPPORTED};
use crate::io::Link;
use crate::session::Session;
use crate::{Error, Result};

/// Maximum bytes discarded while waiting for an expected token
pub(crate) const RESYNC_LIMIT: usize = 256;

/// Outcome of a successful [`Session::perform()`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Target answered with the expected token
    Response(Token),
    /// Command has no response, the challenge was sent
    Sent,
}

impl<L: Link> Session<L> {
    /// Send a command's challenge, if it has one, then wait for its
    /// response, if it has one.
    ///
    /// Commands without a response - e.g. reset - return [`Ack::Sent`] as
    /// soon as the challenge is written.  The link may well drop afterwards.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] - nothing arrived within the command's response
    ///   window
    /// - [`Error::Unsupported`] - the target answered `UNSP`
    /// - [`Error::UnexpectedResponse`] - anything else arrived
    ///
    /// Bytes ahead of the response are skipped - see
    /// [`Self::expect_token()`].  Mismatches are never retried.
    pub fn perform(&mut self, descriptor: &CommandDescriptor) -> Result<Ack> {
        debug!("Performing {:?}", descriptor.command);

        if let Some(challenge) = descriptor.challenge {
            self.write_token(challenge)?;
        }

        match descriptor.response {
            Some(expected) => {
                let timeout = self.timeouts().for_window(descriptor.window);
                self.expect_token(expected, timeout)?;
                Ok(Ack::Response(expected))
            }
            None => Ok(Ack::Sent),
        }
    }

    /// Wait for the descriptor's response, without sending anything.  Used
    /// at the end of multi-stage commands such as uploads.
    pub(crate) fn await_response(&mut self, descriptor: &CommandDescriptor) -> Result<()> {
        match descriptor.response {
            Some(expected) => {
                let timeout = self.timeouts().for_window(descriptor.window);
                self.expect_token(expected, timeout)
            }
            None => Ok(()),
        }
    }

    /// Wait for `expected`, discarding anything the target sent ahead of it.
    ///
    /// Inbound bytes pass through a 4 byte sliding window until it holds
    /// `expected`.  Stray output from code running on the target is skipped
    /// this way, and a garbled reply is consumed entirely rather than left
    /// to be misread by the next command.
    pub fn expect_token(&mut self, expected: Token, timeout: Duration) -> Result<()> {
        self.expect_any(&[expected], timeout).map(|_| ())
    }

    /// As [`Self::expect_token()`], accepting any of `expected` and
    /// returning the one that arrived.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] - nothing arrived within `timeout`
    /// - [`Error::Unsupported`] - the window held `UNSP`
    /// - [`Error::UnexpectedResponse`] - the target went quiet, or skipped
    ///   past 256 bytes, without a match.  Holds the last bytes received.
    pub fn expect_any(&mut self, expected: &[Token], timeout: Duration) -> Result<Token> {
        let mut window = [0u8; 4];
        let mut len = 0;
        let mut skipped = 0;

        loop {
            let mut byte = [0u8; 1];
            if self.read_within(&mut byte, timeout)? == 0 {
                if len == 0 {
                    return Err(Error::Timeout);
                }
                let received = Received::new(&window[..len]);
                warn!("Expected one of {expected:?}, received {received}");
                return Err(Error::UnexpectedResponse(received));
            }

            if len == window.len() {
                window.copy_within(1.., 0);
                len -= 1;
                skipped += 1;
            }
            window[len] = byte[0];
            len += 1;
            if len < window.len() {
                continue;
            }

            if let Some(token) = expected.iter().find(|t| t.matches(&window)) {
                if skipped > 0 {
                    warn!("Skipped {skipped} stray bytes before {token}");
                }
                trace!("Received expected {token}");
                return Ok(*token);
            }
            if UNSUPPORTED.matches(&window) {
                warn!("Target doesn't support this command in its current mode");
                return Err(Error::Unsupported);
            }
            if skipped >= RESYNC_LIMIT {
                let received = Received::new(&window);
                warn!("Gave up waiting for {expected:?} after {skipped} bytes");
                return Err(Error::UnexpectedResponse(received));
            }
        }
    }
}
