//! Watches the inbound byte stream for the target's halt sentinel.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::time::Duration;
use std::sync::Arc;

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;

use crate::command::HALTED;
use crate::debug::{HaltEvent, HaltState};
use crate::io::Link;
use crate::session::{SharedSession, StopFlag};

/// Default time between polls of the link
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// [`HaltMonitor`] configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Time to sleep, with the session unlocked, between polls
    pub poll_interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Detects `HLTD` in the bytes the target sends unprompted.
///
/// Bytes are fed through a 4 byte sliding window.  When the window holds the
/// sentinel, the shared halt state is set to [`HaltState::Halted`], a
/// [`HaltEvent::Halted`] is reported, and the window is cleared, so each
/// sentinel is reported exactly once.  Anything else just slides out of the
/// window.
#[derive(Debug)]
pub struct HaltMonitor {
    window: [u8; 4],
    len: usize,
    state: Arc<Mutex<HaltState>>,
    config: MonitorConfig,
}

impl HaltMonitor {
    /// Create a monitor updating `state`.  Normally created with
    /// [`crate::debug::Debugger::halt_monitor()`], which shares the
    /// debugger's state.
    pub fn new(state: Arc<Mutex<HaltState>>, config: MonitorConfig) -> Self {
        Self {
            window: [0; 4],
            len: 0,
            state,
            config,
        }
    }

    pub fn state(&self) -> HaltState {
        *self.state.lock()
    }

    /// Process one inbound byte.
    pub fn feed(&mut self, byte: u8) -> Option<HaltEvent> {
        if self.len == self.window.len() {
            self.window.copy_within(1.., 0);
            self.len -= 1;
        }
        self.window[self.len] = byte;
        self.len += 1;

        if self.len == self.window.len() && HALTED.matches(&self.window) {
            self.len = 0;
            let previous = core::mem::replace(&mut *self.state.lock(), HaltState::Halted);
            debug!("Target halted, was {previous:?}");
            return Some(HaltEvent::Halted);
        }
        None
    }

    /// Poll the session for inbound bytes until `stop` is raised, calling
    /// `on_event` for every halt seen.
    ///
    /// The session is locked only while draining bytes that have already
    /// arrived, so other threads can run commands in between polls.  Link
    /// errors are logged and polling carries on.  Returns the number of
    /// halts seen.
    pub fn run<L, F>(&mut self, session: &SharedSession<L>, stop: &StopFlag, mut on_event: F) -> u64
    where
        L: Link,
        F: FnMut(HaltEvent),
    {
        info!("Monitoring for halts");
        let mut halts = 0;

        while !stop.is_stopped() {
            let mut events = Vec::new();
            {
                let mut session = session.lock();
                loop {
                    match session.try_read_byte() {
                        Ok(Some(byte)) => events.extend(self.feed(byte)),
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Halt monitor read failed: {e}");
                            break;
                        }
                    }
                }
            }

            for event in events {
                halts += 1;
                on_event(event);
            }

            std::thread::sleep(self.config.poll_interval);
        }

        debug!("Halt monitor stopped after {halts} halts");
        halts
    }
}
