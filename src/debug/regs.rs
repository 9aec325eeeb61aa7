//! The halted thread's register file, and decoding of the cause register.
//!
//! When the target halts, the kernel saves the CPU state of the interrupted
//! thread in its thread control block (TCB).  The register file is read and
//! written as a whole - there is no way to update a single register in place.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::fmt;
use core::str::FromStr;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::command::Command;
use crate::io::Link;
use crate::session::Session;
use crate::transfer::checksum;
use crate::{Error, Result};

/// Kernel variable holding the address of TCB 0
pub const TCB_POINTER_ADDR: u32 = 0x8000_0110;

/// Number of 32-bit words in the register file
pub const REGISTER_COUNT: usize = 41;

/// Size of the register file in target memory
pub const REGISTER_FILE_LEN: usize = REGISTER_COUNT * 4;

/// A slot in the register file, in target memory order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Stat,
    /// Bad virtual address.  Repurposed by the monitor.
    Badv,
    R0,
    At,
    V0,
    V1,
    A0,
    A1,
    A2,
    A3,
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    T7,
    S0,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    S7,
    T8,
    T9,
    K0,
    K1,
    Gp,
    Sp,
    Fp,
    Ra,
    /// Return address from the exception, i.e. the halted PC
    Rapc,
    Hi,
    Lo,
    Sr,
    Cause,
    Reserved0,
    Reserved1,
}

impl Register {
    /// Every register, in target memory order
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::Stat,
        Register::Badv,
        Register::R0,
        Register::At,
        Register::V0,
        Register::V1,
        Register::A0,
        Register::A1,
        Register::A2,
        Register::A3,
        Register::T0,
        Register::T1,
        Register::T2,
        Register::T3,
        Register::T4,
        Register::T5,
        Register::T6,
        Register::T7,
        Register::S0,
        Register::S1,
        Register::S2,
        Register::S3,
        Register::S4,
        Register::S5,
        Register::S6,
        Register::S7,
        Register::T8,
        Register::T9,
        Register::K0,
        Register::K1,
        Register::Gp,
        Register::Sp,
        Register::Fp,
        Register::Ra,
        Register::Rapc,
        Register::Hi,
        Register::Lo,
        Register::Sr,
        Register::Cause,
        Register::Reserved0,
        Register::Reserved1,
    ];

    const NAMES: [&'static str; REGISTER_COUNT] = [
        "stat", "badv", "r0", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3",
        "t4", "t5", "t6", "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0",
        "k1", "gp", "sp", "fp", "ra", "rapc", "hi", "lo", "sr", "cause", "reserved0", "reserved1",
    ];

    /// Index of this register's word in the register file
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self.index()]
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Register {
    type Err = Error;

    /// Parse a register name, case insensitively.  Accepts the usual MIPS
    /// aliases `zero`, `s8`, `pc` and `caus` too.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().trim_start_matches('$').to_ascii_lowercase();
        let alias = match name.as_str() {
            "zero" => Some(Register::R0),
            "s8" => Some(Register::Fp),
            "pc" => Some(Register::Rapc),
            "caus" => Some(Register::Cause),
            _ => None,
        };
        alias
            .or_else(|| {
                Self::NAMES
                    .iter()
                    .position(|n| *n == name)
                    .map(|i| Self::ALL[i])
            })
            .ok_or(Error::InvalidArgument)
    }
}

/// Why the CPU last took an exception, from the cause register's exception
/// code field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionCause {
    /// AdEL - address error on data load or instruction fetch
    AddressLoad,
    /// AdES - address error on data store
    AddressStore,
    /// IBE - bus error on instruction fetch
    InstructionBus,
    /// DBE - bus error on data load or store
    DataBus,
    /// Sys - syscall
    Syscall,
    /// Bp - break instruction
    Breakpoint,
    /// RI - reserved instruction
    ReservedInstruction,
    /// CpU - coprocessor unusable
    CoprocessorUnusable,
    /// Ov - arithmetic overflow
    Overflow,
    /// Any other exception code
    Other(u32),
}

impl ExceptionCause {
    /// Decode an exception code.
    pub fn from_code(code: u32) -> Self {
        match code {
            0x04 => Self::AddressLoad,
            0x05 => Self::AddressStore,
            0x06 => Self::InstructionBus,
            0x07 => Self::DataBus,
            0x08 => Self::Syscall,
            0x09 => Self::Breakpoint,
            0x0A => Self::ReservedInstruction,
            0x0B => Self::CoprocessorUnusable,
            0x0C => Self::Overflow,
            other => Self::Other(other),
        }
    }

    /// Decode the raw cause register, whose exception code is in bits 2-6.
    pub fn from_cause_register(raw: u32) -> Self {
        Self::from_code((raw >> 2) & 0x1F)
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::AddressLoad => 0x04,
            Self::AddressStore => 0x05,
            Self::InstructionBus => 0x06,
            Self::DataBus => 0x07,
            Self::Syscall => 0x08,
            Self::Breakpoint => 0x09,
            Self::ReservedInstruction => 0x0A,
            Self::CoprocessorUnusable => 0x0B,
            Self::Overflow => 0x0C,
            Self::Other(code) => *code,
        }
    }

    /// Short description, or `None` for unrecognised codes.
    pub fn description(&self) -> Option<&'static str> {
        Some(match self {
            Self::AddressLoad => "AdEL - address error on load or instruction fetch",
            Self::AddressStore => "AdES - address error on store",
            Self::InstructionBus => "IBE - bus error on instruction fetch",
            Self::DataBus => "DBE - bus error on data load/store",
            Self::Syscall => "Sys - syscall",
            Self::Breakpoint => "Bp - breakpoint",
            Self::ReservedInstruction => "RI - reserved instruction",
            Self::CoprocessorUnusable => "CpU - coprocessor unusable",
            Self::Overflow => "Ov - arithmetic overflow",
            Self::Other(_) => return None,
        })
    }
}

impl fmt::Display for ExceptionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(description) => write!(f, "{description} ({:#04x})", self.code()),
            None => write!(f, "exception code {:#04x}", self.code()),
        }
    }
}

/// The 41 word register file saved in a thread control block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterFile {
    words: [u32; REGISTER_COUNT],
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            words: [0; REGISTER_COUNT],
        }
    }
}

impl RegisterFile {
    /// Parse a register file as laid out in target memory.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] unless `bytes` is exactly
    /// [`REGISTER_FILE_LEN`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != REGISTER_FILE_LEN {
            warn!(
                "Register file must be {REGISTER_FILE_LEN} bytes, got {}",
                bytes.len()
            );
            return Err(Error::InvalidArgument);
        }
        let mut words = [0u32; REGISTER_COUNT];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(Self { words })
    }

    /// Serialize for writing back to target memory.
    pub fn to_bytes(&self) -> [u8; REGISTER_FILE_LEN] {
        let mut bytes = [0u8; REGISTER_FILE_LEN];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.words.iter()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn get(&self, reg: Register) -> u32 {
        self.words[reg.index()]
    }

    pub fn set(&mut self, reg: Register, value: u32) {
        self.words[reg.index()] = value;
    }

    /// Decoded cause register
    pub fn cause(&self) -> ExceptionCause {
        ExceptionCause::from_cause_register(self.get(Register::Cause))
    }
}

impl fmt::Display for RegisterFile {
    /// Four registers per row, with `stat`/`badv` on their own row, and the
    /// reserved slots omitted.  Followed by the decoded cause.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &Register::ALL[..Register::Reserved0.index()];
        let (status, rest) = shown.split_at(2);

        for (i, row) in core::iter::once(status)
            .chain(rest.chunks(4))
            .enumerate()
        {
            if i > 0 {
                writeln!(f)?;
            }
            for reg in row {
                write!(f, " {:>5} = {:08X}", reg.name(), self.get(*reg))?;
            }
        }
        writeln!(f)?;
        write!(f, "Cause: {}", self.cause())
    }
}

impl<L: Link> Session<L> {
    /// Address of TCB 0, read from the kernel.
    pub fn tcb_address(&mut self) -> Result<u32> {
        let bytes = self.download(TCB_POINTER_ADDR, 4)?;
        let addr = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        debug!("TCB at {addr:#010X}");
        Ok(addr)
    }

    /// Read the halted thread's registers.
    pub fn read_registers(&mut self) -> Result<RegisterFile> {
        let tcb = self.tcb_address()?;
        let bytes = self.download(tcb, REGISTER_FILE_LEN as u32)?;
        RegisterFile::from_bytes(&bytes)
    }

    /// Write the whole register file back to the halted thread's TCB.  The
    /// TCB address is looked up again first.
    pub fn write_registers(&mut self, registers: &RegisterFile) -> Result<()> {
        let tcb = self.tcb_address()?;
        let bytes = registers.to_bytes();
        info!("Writing registers to TCB at {tcb:#010X}");
        self.upload(Command::SendBin.descriptor(), tcb, &bytes, checksum(&bytes))
    }
}
