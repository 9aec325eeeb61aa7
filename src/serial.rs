//! [`Connector`] and [`Link`] implementations using the `serialport` crate.
//!
//! ```rust,ignore
//! use kmon_link::link::{self, SessionConfig};
//! use kmon_link::serial::SerialPortConnector;
//!
//! let mut connector = SerialPortConnector::new("/dev/ttyUSB0");
//! let mut session = link::open(&mut connector, &SessionConfig::default())?;
//! session.ping()?;
//! ```

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::time::Duration;
use std::io::{ErrorKind, Read, Write};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use serialport::{DataBits, FlowControl, SerialPort};

use crate::io::{Connector, Link};
use crate::link::{LinkSettings, Parity, StopBits};

/// Opens a named serial device, e.g. `/dev/ttyUSB0` or `COM3`.
#[derive(Debug, Clone)]
pub struct SerialPortConnector {
    path: String,
}

impl SerialPortConnector {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

fn data_bits(bits: u8) -> Result<DataBits, serialport::Error> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        other => Err(serialport::Error::new(
            serialport::ErrorKind::InvalidInput,
            format!("unsupported data bits {other}"),
        )),
    }
}

impl Connector for SerialPortConnector {
    type Link = SerialPortLink;
    type Error = serialport::Error;

    fn open(&mut self, settings: &LinkSettings) -> Result<SerialPortLink, serialport::Error> {
        debug!("Opening {} with {settings:?}", self.path);

        let parity = match settings.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        };
        let stop_bits = match settings.stop_bits {
            StopBits::One => serialport::StopBits::One,
            StopBits::Two => serialport::StopBits::Two,
        };
        let flow_control = if settings.flow_control {
            FlowControl::Hardware
        } else {
            FlowControl::None
        };

        let mut port = serialport::new(&self.path, settings.baud)
            .data_bits(data_bits(settings.data_bits)?)
            .parity(parity)
            .stop_bits(stop_bits)
            .flow_control(flow_control)
            .open()?;
        port.write_data_terminal_ready(settings.dtr)?;
        port.write_request_to_send(settings.rts)?;

        Ok(SerialPortLink { port, timeout: None })
    }
}

/// An open serial port
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    // Last timeout applied to the port, to avoid reconfiguring every read
    timeout: Option<Duration>,
}

impl Link for SerialPortLink {
    type Error = std::io::Error;

    fn write(&mut self, data: &[u8]) -> Result<(), std::io::Error> {
        self.port.write_all(data)?;
        self.port.flush()
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, std::io::Error> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.timeout != Some(timeout) {
            self.port.set_timeout(timeout)?;
            self.timeout = Some(timeout);
        }
        match self.port.read(buf) {
            Ok(count) => Ok(count),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn bytes_to_read(&mut self) -> Result<usize, std::io::Error> {
        Ok(self.port.bytes_to_read()? as usize)
    }
}
