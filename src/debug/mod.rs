//! Minimal debugging support.
//!
//! Once the kernel-resident debug handler is installed (`DEBG`), the target
//! services dumps, halt and continue while other code runs.  On top of that,
//! this module provides:
//!
//! - [`Debugger`] - halt/continue with tracked [`HaltState`], and access to
//!   the halted thread's [`RegisterFile`]
//! - [`HaltMonitor`] - watches the link for the target reporting that it has
//!   halted on its own, e.g. on a breakpoint
//! - [`DebugBridge`] - a listening socket for an external debugger
//! - [`serve()`] - all of the above together
//!
//! The halt monitor and on-demand commands share the link, so the debugger
//! works on a [`SharedSession`].  Every exchange holds the session lock until
//! it completes, so the monitor never sees half of a command's response.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

mod bridge;
mod monitor;
mod regs;

pub use bridge::{BRIDGE_BACKLOG, BRIDGE_PORT, BridgeConfig, DebugBridge, primary_address};
pub use monitor::{HaltMonitor, MonitorConfig, POLL_INTERVAL};
pub use regs::{
    ExceptionCause, REGISTER_COUNT, REGISTER_FILE_LEN, Register, RegisterFile, TCB_POINTER_ADDR,
};

use std::sync::Arc;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;

use crate::Result;
use crate::io::Link;
use crate::session::{SharedSession, StopFlag};

/// Whether the target is running or halted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HaltState {
    #[default]
    Running,
    Halted,
}

/// Reported when the target is seen to halt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltEvent {
    Halted,
}

/// Debug session with the target.
///
/// Holds the last register file read from the target, which is edited
/// locally and written back whole.
pub struct Debugger<L: Link> {
    session: SharedSession<L>,
    state: Arc<Mutex<HaltState>>,
    registers: RegisterFile,
}

impl<L: Link> Debugger<L> {
    /// Install the debug handler on the target.
    pub fn attach(session: SharedSession<L>) -> Result<Self> {
        session.lock().enable_debug()?;
        Ok(Self {
            session,
            state: Arc::new(Mutex::new(HaltState::Running)),
            registers: RegisterFile::default(),
        })
    }

    /// The shared session, for running other commands
    pub fn session(&self) -> &SharedSession<L> {
        &self.session
    }

    pub fn state(&self) -> HaltState {
        *self.state.lock()
    }

    /// A monitor that updates this debugger's halt state.
    pub fn halt_monitor(&self, config: MonitorConfig) -> HaltMonitor {
        HaltMonitor::new(self.state.clone(), config)
    }

    /// Halt the target.
    ///
    /// The target's `HLTD` reply is consumed here rather than by a
    /// [`HaltMonitor`], so is reported by returning [`HaltEvent::Halted`].
    pub fn halt(&mut self) -> Result<HaltEvent> {
        self.session.lock().halt()?;
        *self.state.lock() = HaltState::Halted;
        info!("Target halted");
        Ok(HaltEvent::Halted)
    }

    /// Continue after a halt.
    pub fn resume(&mut self) -> Result<()> {
        self.session.lock().resume()?;
        *self.state.lock() = HaltState::Running;
        info!("Target running");
        Ok(())
    }

    /// Registers as last read or edited
    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    /// Re-read the registers from the target.
    pub fn refresh_registers(&mut self) -> Result<&RegisterFile> {
        self.registers = self.session.lock().read_registers()?;
        debug!("Registers read, cause: {}", self.registers.cause());
        Ok(&self.registers)
    }

    /// Write the local register file back to the target.
    pub fn set_regs(&mut self) -> Result<()> {
        self.session.lock().write_registers(&self.registers)
    }

    /// Change one register.
    ///
    /// The register file is re-read first, so nothing else is overwritten
    /// with stale values, and then written back whole.
    pub fn set_reg(&mut self, reg: Register, value: u32) -> Result<()> {
        info!("Setting {reg} to {value:#010X}");
        let mut session = self.session.lock();
        let mut registers = session.read_registers()?;
        registers.set(reg, value);
        session.write_registers(&registers)?;
        self.registers = registers;
        Ok(())
    }
}

/// Run a debug session: install the debug handler, read and log the
/// registers, open the bridge socket, then monitor for halts until `stop` is
/// raised.
///
/// Returns the debugger, whose state reflects any halts seen.  The bridge is
/// closed on return.
pub fn serve<L, F>(
    session: SharedSession<L>,
    bridge: &BridgeConfig,
    monitor: MonitorConfig,
    stop: &StopFlag,
    on_event: F,
) -> Result<Debugger<L>>
where
    L: Link,
    F: FnMut(HaltEvent),
{
    let mut debugger = Debugger::attach(session)?;
    let registers = debugger.refresh_registers()?;
    info!("Initial registers:\n{registers}");

    let _bridge = DebugBridge::listen(bridge)?;
    let mut halt_monitor = debugger.halt_monitor(monitor);
    halt_monitor.run(debugger.session(), stop, on_event);

    Ok(debugger)
}
