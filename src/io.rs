//! I/O traits for the serial link to the target.
//!
//! This module contains the traits the protocol engine uses to talk to the
//! target.  They keep the engine free of any specific host serial port API.
//!
//! # Possible implementations
//!
//! - For PC-based applications: a serial port, via the `serialport` feature's
//!   `serial::SerialPortConnector`, or your own backend
//! - For testing: an in-memory simulation of the target monitor
//! - For bridging: a TCP socket to a remote serial server
//!
//! # Lifecycle
//!
//! A [`Connector`] opens a [`Link`] with given [`LinkSettings`].  Dropping the
//! [`Link`] closes it.  Changing baud rate means dropping the link and opening
//! a new one - see [`crate::link::open()`].

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::time::Duration;

use crate::link::LinkSettings;

/// An open, bidirectional byte link to the target.
pub trait Link {
    /// The error type returned by link operations.
    ///
    /// This allows implementations to use their own error types
    /// (e.g., `std::io::Error` for serial ports).
    type Error: core::fmt::Debug;

    /// Write all of `data` to the target.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying write fails or times out.
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    /// Read whatever bytes are available into `buf`, waiting up to `timeout`
    /// for at least one byte to arrive.
    ///
    /// Returns the number of bytes read.  `Ok(0)` means nothing arrived
    /// within `timeout` - a timeout is not an error at this layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails for any reason other
    /// than timing out.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, Self::Error>;

    /// Number of bytes that can be read without blocking.
    fn bytes_to_read(&mut self) -> Result<usize, Self::Error>;
}

/// Opens [`Link`]s to one particular device.
pub trait Connector {
    /// The link type this connector opens.
    type Link: Link;

    /// The error type returned when opening fails.
    type Error: core::fmt::Debug;

    /// Open the device with the given settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the device doesn't exist, is busy, or doesn't
    /// support the requested settings (e.g. a non-standard baud rate).
    fn open(&mut self, settings: &LinkSettings) -> Result<Self::Link, Self::Error>;
}
