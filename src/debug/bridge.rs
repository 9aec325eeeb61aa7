//! Listening socket an external debugger can attach to.
//!
//! Only the listener is set up here.  Accepting connections and speaking a
//! remote debug protocol over them is left to the application, via
//! [`DebugBridge::into_listener()`].

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};
use socket2::{Domain, Protocol, Socket, Type};

use crate::{Error, Result};

/// Default port, as used by GDB's remote targets
pub const BRIDGE_PORT: u16 = 3333;

/// Default listen backlog
pub const BRIDGE_BACKLOG: i32 = 2;

/// [`DebugBridge`] configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Address to bind to.  `None` binds to [`primary_address()`].
    pub address: Option<IpAddr>,
    pub port: u16,
    pub backlog: i32,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: BRIDGE_PORT,
            backlog: BRIDGE_BACKLOG,
        }
    }
}

/// The host's primary IPv4 address, i.e. the one the default route goes
/// out of.  Falls back to the unspecified address if there's no route.
///
/// Connecting a UDP socket sends nothing, it just selects the source
/// address.
pub fn primary_address() -> IpAddr {
    let source = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip());

    match source {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        Err(e) => {
            debug!("No route to find primary address: {e}");
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        }
    }
}

/// A bound, listening bridge socket.  Closed on drop.
#[derive(Debug)]
pub struct DebugBridge {
    socket: Socket,
    local_addr: SocketAddr,
}

impl DebugBridge {
    /// Bind and listen.
    ///
    /// # Errors
    ///
    /// [`Error::Bridge`] with the underlying error kind, e.g. `AddrInUse`.
    pub fn listen(config: &BridgeConfig) -> Result<Self> {
        let ip = config.address.unwrap_or_else(primary_address);
        let addr = SocketAddr::new(ip, config.port);

        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bridge_error("create socket"))?;
        socket
            .bind(&addr.into())
            .map_err(bridge_error("bind debug bridge"))?;
        socket
            .listen(config.backlog)
            .map_err(bridge_error("listen on debug bridge"))?;

        let local_addr = socket
            .local_addr()
            .map_err(bridge_error("read debug bridge address"))?
            .as_socket()
            .unwrap_or(addr);

        info!("Debug bridge listening on {local_addr}");
        Ok(Self { socket, local_addr })
    }

    /// Address actually bound, including the port if 0 was requested
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Hand the listener over for accepting connections.
    pub fn into_listener(self) -> TcpListener {
        self.socket.into()
    }
}

fn bridge_error(action: &'static str) -> impl Fn(std::io::Error) -> Error {
    move |e| {
        warn!("Failed to {action}: {e}");
        Error::Bridge(e.kind())
    }
}
