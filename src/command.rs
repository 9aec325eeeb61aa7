//! Static catalog of the commands understood by the target monitor.
//!
//! Each [`Command`] has exactly one [`CommandDescriptor`], holding the token
//! the host sends to start the command (the challenge), the token the target
//! answers with (the response), and which parameters the calling layer must
//! supply before the command can run.
//!
//! The table is pure data and performs no I/O.  The protocol engine in
//! [`crate::session`] consumes descriptors; command line handling, which lives
//! outside this crate, resolves user input to a descriptor with
//! [`Command::from_flag()`] and validates parameters with [`parse_u32()`] and
//! [`crate::debug::Register`]'s `FromStr` implementation.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::fmt;

use crate::{Error, Result};

/// A 4-byte ASCII protocol token, such as `SBIN` or `OKAY`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token([u8; 4]);

impl Token {
    /// Create a token from a literal.  Panics (at compile time, when used in
    /// a `const`) if any byte isn't ASCII.
    pub(crate) const fn new(bytes: &[u8; 4]) -> Self {
        let mut i = 0;
        while i < 4 {
            assert!(bytes[i].is_ascii(), "tokens must be ASCII");
            i += 1;
        }
        Self(*bytes)
    }

    /// Create a token from runtime data.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] unless `bytes` is exactly 4 ASCII bytes.
    pub fn try_new(bytes: &[u8]) -> Result<Self> {
        match <[u8; 4]>::try_from(bytes) {
            Ok(token) if token.is_ascii() => Ok(Self(token)),
            _ => Err(Error::InvalidArgument),
        }
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Whether `bytes` is exactly this token.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        bytes == self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&escape_token(&self.0))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token(\"{self}\")")
    }
}

// Tokens used outside the descriptor table

/// Switches the target to its fast baud rate.  No response.
pub const FAST: Token = Token::new(b"FAST");
/// Target asking for the checksum of the block just sent.
pub const CHECK: Token = Token::new(b"CHEK");
/// Target accepted the last block.
pub const MORE: Token = Token::new(b"MORE");
/// Target rejected the last block, send it again.
pub const RESEND: Token = Token::new(b"ERR!");
/// Target cannot service this command in its current mode.
pub const UNSUPPORTED: Token = Token::new(b"UNSP");
/// Target has halted.  Sent in reply to `HALT`, and unsolicited when the
/// target stops on a breakpoint or exception while in debug mode.
pub const HALTED: Token = Token::new(b"HLTD");

/// Up to 4 bytes received in place of an expected token.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Received {
    bytes: [u8; 4],
    len: u8,
}

impl Received {
    /// Capture up to the first 4 bytes of `bytes`.
    pub fn new(bytes: &[u8]) -> Self {
        let len = bytes.len().min(4);
        let mut buf = [0u8; 4];
        buf[..len].copy_from_slice(&bytes[..len]);
        Self {
            bytes: buf,
            len: len as u8,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..usize::from(self.len)]
    }
}

impl fmt::Display for Received {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&escape_token(self.as_bytes()))
    }
}

impl fmt::Debug for Received {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Received(\"{self}\")")
    }
}

/// Render token bytes for logs, escaping anything that isn't printable.
pub fn escape_token(bytes: &[u8]) -> String {
    bytes.iter().flat_map(|b| b.escape_ascii()).map(char::from).collect()
}

/// Identity of every command the catalog knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Upload a raw binary to an address
    SendBin,
    /// Program a flash cartridge ROM
    SendRom,
    /// Upload and run an executable
    SendExe,
    /// Non-linking jump
    Jump,
    /// Linked call, which can return to the monitor
    Call,
    /// Dump memory
    Dump,
    /// Continuously dump a memory window
    Watch,
    /// Reset the target
    Reset,
    /// Liveness check
    Ping,
    /// Install the kernel-resident debug handler
    Debug,
    /// Install the debug handler and serve the debug bridge
    Gdb,
    /// Halt execution
    Halt,
    /// Continue halted execution
    Continue,
    /// Show the halted thread's registers
    Regs,
    /// Edit one of the halted thread's registers
    SetReg,
}

/// How long to wait for a command's response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseWindow {
    /// The normal response timeout
    Standard,
    /// Flash erase/program commands, which need much longer
    Flash,
}

/// Parameters the calling layer must supply for a command
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Requires {
    pub input: bool,
    pub address: bool,
    pub size: bool,
    pub register: bool,
}

/// Static description of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub command: Command,
    /// Command line flag, e.g. `/bin`
    pub flag: &'static str,
    /// Token sent to start the command, if any
    pub challenge: Option<Token>,
    /// Token expected back, if any
    pub response: Option<Token>,
    pub requires: Requires,
    pub window: ResponseWindow,
}

const NONE: Requires = Requires {
    input: false,
    address: false,
    size: false,
    register: false,
};

const fn descriptor(
    command: Command,
    flag: &'static str,
    challenge: Option<&[u8; 4]>,
    response: Option<&[u8; 4]>,
    requires: Requires,
) -> CommandDescriptor {
    CommandDescriptor {
        command,
        flag,
        challenge: match challenge {
            Some(bytes) => Some(Token::new(bytes)),
            None => None,
        },
        response: match response {
            Some(bytes) => Some(Token::new(bytes)),
            None => None,
        },
        requires,
        window: ResponseWindow::Standard,
    }
}

/// The command table.  One entry per [`Command`], in declaration order.
pub static COMMANDS: [CommandDescriptor; 15] = [
    descriptor(
        Command::SendBin,
        "/bin",
        Some(b"SBIN"),
        Some(b"OKAY"),
        Requires {
            input: true,
            address: true,
            ..NONE
        },
    ),
    CommandDescriptor {
        window: ResponseWindow::Flash,
        ..descriptor(
            Command::SendRom,
            "/rom",
            Some(b"SROM"),
            Some(b"OKAY"),
            Requires {
                input: true,
                ..NONE
            },
        )
    },
    descriptor(
        Command::SendExe,
        "/exe",
        Some(b"SEXE"),
        Some(b"OKAY"),
        Requires {
            input: true,
            ..NONE
        },
    ),
    descriptor(
        Command::Jump,
        "/jmp",
        Some(b"JUMP"),
        Some(b"OKAY"),
        Requires {
            address: true,
            ..NONE
        },
    ),
    descriptor(
        Command::Call,
        "/jal",
        Some(b"CALL"),
        Some(b"OKAY"),
        Requires {
            address: true,
            ..NONE
        },
    ),
    descriptor(
        Command::Dump,
        "/dump",
        Some(b"DUMP"),
        Some(b"OKAY"),
        Requires {
            address: true,
            size: true,
            ..NONE
        },
    ),
    descriptor(
        Command::Watch,
        "/watch",
        Some(b"HEXD"),
        Some(b"OKAY"),
        Requires {
            address: true,
            size: true,
            ..NONE
        },
    ),
    // The target restarts, so there's nothing to wait for
    descriptor(Command::Reset, "/reset", Some(b"REST"), None, NONE),
    descriptor(Command::Ping, "/ping", Some(b"PING"), Some(b"PONG"), NONE),
    descriptor(Command::Debug, "/debug", Some(b"DEBG"), Some(b"OKAY"), NONE),
    descriptor(Command::Gdb, "/gdb", Some(b"DEBG"), Some(b"OKAY"), NONE),
    descriptor(Command::Halt, "/halt", Some(b"HALT"), Some(b"HLTD"), NONE),
    descriptor(Command::Continue, "/cont", Some(b"CONT"), Some(b"OKAY"), NONE),
    descriptor(Command::Regs, "/regs", None, None, NONE),
    // Value is passed as the address parameter
    descriptor(
        Command::SetReg,
        "/setreg",
        None,
        None,
        Requires {
            address: true,
            register: true,
            ..NONE
        },
    ),
];

impl Command {
    /// Every command, in table order
    pub const ALL: [Command; 15] = [
        Command::SendBin,
        Command::SendRom,
        Command::SendExe,
        Command::Jump,
        Command::Call,
        Command::Dump,
        Command::Watch,
        Command::Reset,
        Command::Ping,
        Command::Debug,
        Command::Gdb,
        Command::Halt,
        Command::Continue,
        Command::Regs,
        Command::SetReg,
    ];

    /// This command's descriptor
    pub fn descriptor(self) -> &'static CommandDescriptor {
        // Table order matches declaration order, which the tests check
        &COMMANDS[self as usize]
    }

    /// Look up a command by its command line flag, case insensitively.
    pub fn from_flag(flag: &str) -> Option<Command> {
        COMMANDS
            .iter()
            .find(|d| d.flag.eq_ignore_ascii_case(flag))
            .map(|d| d.command)
    }
}

/// Parse a 32-bit address, size or value, written in hex with or without a
/// leading `0x`.
pub fn parse_u32(value: &str) -> Result<u32> {
    let value = value.trim();
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    if digits.is_empty() {
        return Err(Error::InvalidArgument);
    }
    u32::from_str_radix(digits, 16).map_err(|_| Error::InvalidArgument)
}
