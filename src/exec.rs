//! Execution control: jump, call, halt, continue, reset.
//!
//! These are all simple challenge/response exchanges, with the address for
//! jump and call written once the target has acknowledged.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::command::Command;
use crate::io::Link;
use crate::session::Session;
use crate::Result;

impl<L: Link> Session<L> {
    /// Jump to `addr`, abandoning whatever the target was running.
    pub fn jump_to(&mut self, addr: u32) -> Result<()> {
        info!("Jumping to {addr:#010X}");
        self.perform(Command::Jump.descriptor())?;
        self.write_u32(addr)
    }

    /// Call `addr`.  The code can return to the monitor when done.
    pub fn call_to(&mut self, addr: u32) -> Result<()> {
        info!("Calling {addr:#010X}");
        self.perform(Command::Call.descriptor())?;
        self.write_u32(addr)
    }

    /// Halt the target at its next safe point.  Requires the debug handler -
    /// see [`Self::enable_debug()`].
    pub fn halt(&mut self) -> Result<()> {
        self.perform(Command::Halt.descriptor()).map(|_| ())
    }

    /// Continue after a halt.
    pub fn resume(&mut self) -> Result<()> {
        self.perform(Command::Continue.descriptor()).map(|_| ())
    }

    /// Reset the target.
    ///
    /// Nothing is read back, and the link will probably drop as the target
    /// restarts.
    pub fn reset(&mut self) -> Result<()> {
        info!("Resetting target");
        self.perform(Command::Reset.descriptor()).map(|_| ())
    }

    /// Check the target monitor is responding.
    pub fn ping(&mut self) -> Result<()> {
        self.perform(Command::Ping.descriptor()).map(|_| ())
    }

    /// Install the kernel-resident debug handler, so the target services
    /// dump, halt and continue while other code runs.
    pub fn enable_debug(&mut self) -> Result<()> {
        info!("Enabling debug handler");
        self.perform(Command::Debug.descriptor()).map(|_| ())
    }
}
