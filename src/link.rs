//! Serial link settings, and opening a [`Session`] on a device.
//!
//! The target monitor listens at 115200 baud, 8 data bits, no parity and 2
//! stop bits.  It can be switched to a faster rate by sending `FAST`, after
//! which both sides reconfigure their UARTs.  The host and target can't hit
//! the same high-speed rate from their respective clock dividers, so the host
//! uses 510000 baud while the target uses 518400 - close enough to stay
//! within sampling tolerance.  The fast rate also switches to odd parity.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::time::Duration;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::command::FAST;
use crate::io::{Connector, Link};
use crate::session::{Session, Timeouts};
use crate::transfer::TransferConfig;
use crate::{Error, Result};

/// Default baud rate on both sides
pub const STANDARD_BAUD: u32 = 115_200;

/// Host baud rate in fast mode
pub const FAST_HOST_BAUD: u32 = 510_000;

/// Target baud rate in fast mode.  Never configured on the host, for
/// reference only.
pub const FAST_TARGET_BAUD: u32 = 518_400;

/// Time the target needs to reconfigure its UART after `FAST`
pub const FAST_SETTLE: Duration = Duration::from_millis(100);

/// Parity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Stop bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Settings used to open a [`Link`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    pub baud: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Hardware (RTS/CTS) flow control
    pub flow_control: bool,
    /// Assert DTR.  Required by some cables which power themselves from it.
    pub dtr: bool,
    /// Assert RTS.  As for DTR.
    pub rts: bool,
}

impl LinkSettings {
    /// 115200 8N2, no flow control, DTR and RTS asserted.
    pub const fn standard() -> Self {
        Self {
            baud: STANDARD_BAUD,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: StopBits::Two,
            flow_control: false,
            dtr: true,
            rts: true,
        }
    }

    /// 510000 8O2, otherwise as [`Self::standard()`].
    pub const fn fast() -> Self {
        Self {
            baud: FAST_HOST_BAUD,
            parity: Parity::Odd,
            ..Self::standard()
        }
    }
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self::standard()
    }
}

/// Configuration for opening a [`Session`]
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Switch the target to fast mode after opening
    pub fast: bool,
    /// How long to wait after sending `FAST` before reopening
    pub fast_settle: Duration,
    pub timeouts: Timeouts,
    pub transfer: TransferConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fast: false,
            fast_settle: FAST_SETTLE,
            timeouts: Timeouts::default(),
            transfer: TransferConfig::default(),
        }
    }
}

/// Open a session on the device behind `connector`.
///
/// Opens the link with [`LinkSettings::standard()`].  If fast mode is
/// requested, sends `FAST`, waits for the target to reconfigure, closes the
/// link and reopens it with [`LinkSettings::fast()`].  Finally any stale
/// bytes the target sent before we were listening are discarded.
///
/// # Errors
///
/// Returns [`Error::Port`] if the link can't be opened or reopened, or the
/// `FAST` token can't be sent.
pub fn open<C: Connector>(connector: &mut C, config: &SessionConfig) -> Result<Session<C::Link>> {
    let mut settings = LinkSettings::standard();
    let mut link = open_link(connector, &settings)?;

    if config.fast {
        debug!("Requesting fast mode");
        link.write(FAST.as_bytes()).map_err(|e| {
            warn!("Failed to send {FAST}: {e:?}");
            Error::Port
        })?;

        std::thread::sleep(config.fast_settle);

        // Close before reopening at the new rate
        drop(link);

        settings = LinkSettings::fast();
        link = open_link(connector, &settings)?;
    }

    info!(
        "Link open at {} baud, parity {:?}, stop bits {:?}",
        settings.baud, settings.parity, settings.stop_bits
    );

    let mut session = Session::new(link, settings, config.timeouts, config.transfer);
    session.drain_input()?;
    Ok(session)
}

fn open_link<C: Connector>(connector: &mut C, settings: &LinkSettings) -> Result<C::Link> {
    connector.open(settings).map_err(|e| {
        error!("Failed to open link at {} baud: {e:?}", settings.baud);
        Error::Port
    })
}
