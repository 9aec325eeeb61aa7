//! Test doubles for the link layer.
//!
//! - [`ScriptedLink`] - replays canned bytes and records what was written
//! - [`FakeMonitor`] - simulates the target monitor, including its memory
//! - [`RecordingConnector`] - opens links onto a [`FakeMonitor`], recording the
//!   settings and writes of each open

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::time::Duration;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::io::{Connector, Link};
use crate::link::LinkSettings;
use crate::session::{Session, Timeouts};
use crate::transfer::{BLOCK_SIZE, EXE_HEADER_LEN, TransferConfig, checksum};

/// Where the simulated target puts ROM images
pub const ROM_BASE: u32 = 0x1F00_0000;

/// Error returned by test links once they've been told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkFault;

/// Session over `link` with default settings.
pub fn session_with<L: Link>(link: L) -> Session<L> {
    Session::new(
        link,
        LinkSettings::standard(),
        Timeouts::default(),
        TransferConfig::default(),
    )
}

/// Session talking to `target`.
pub fn session_on(target: &FakeMonitor) -> Session<FakeMonitor> {
    session_with(target.clone())
}

//
// ScriptedLink
//

/// Returns pre-loaded bytes to reads, and records all writes.  Reads return
/// `Ok(0)` once the script runs out, which the session treats as a timeout.
#[derive(Debug, Default)]
pub struct ScriptedLink {
    // Each read returns bytes from at most one segment
    segments: VecDeque<Vec<u8>>,
    written: Vec<u8>,
}

impl ScriptedLink {
    pub fn new(bytes: &[u8]) -> Self {
        let mut link = Self::default();
        link.push(bytes);
        link
    }

    /// Queue more bytes for reading.
    pub fn push(&mut self, bytes: &[u8]) {
        if !bytes.is_empty() {
            self.segments.push_back(bytes.to_vec());
        }
    }

    /// Queue bytes that are read back at most `piece` bytes at a time.
    pub fn push_fragmented(&mut self, bytes: &[u8], piece: usize) {
        for chunk in bytes.chunks(piece.max(1)) {
            self.push(chunk);
        }
    }

    pub fn written(&self) -> &[u8] {
        &self.written
    }
}

impl Link for ScriptedLink {
    type Error = LinkFault;

    fn write(&mut self, data: &[u8]) -> Result<(), LinkFault> {
        self.written.extend_from_slice(data);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, LinkFault> {
        let Some(front) = self.segments.front_mut() else {
            return Ok(0);
        };
        let count = buf.len().min(front.len());
        buf[..count].copy_from_slice(&front[..count]);
        front.drain(..count);
        if front.is_empty() {
            self.segments.pop_front();
        }
        Ok(count)
    }

    fn bytes_to_read(&mut self) -> Result<usize, LinkFault> {
        Ok(self.segments.iter().map(Vec::len).sum())
    }
}

//
// FakeMonitor
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderKind {
    Bin,
    Rom,
    Exe,
    Dump,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    Jump,
    Call,
}

#[derive(Debug, Clone, Copy)]
struct Upload {
    dest: u32,
    size: u32,
    sum: u32,
    offset: u32,
}

impl Upload {
    fn block_len(&self) -> usize {
        ((self.size - self.offset) as usize).min(BLOCK_SIZE)
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Token,
    Header { kind: HeaderKind, words: Vec<u32>, count: usize },
    ExeHeader,
    Block(Upload),
    BlockSum { upload: Upload, sum: u32, len: usize, corrupt: bool },
    Address(Branch),
}

#[derive(Debug)]
struct State {
    phase: Phase,
    pending: Vec<u8>,
    outbox: VecDeque<u8>,
    memory: HashMap<u32, u8>,
    written: Vec<u8>,
    largest_write: usize,
    corrupt_blocks: u32,
    rejected_blocks: u32,
    exe_header: Option<Vec<u8>>,
    unsupported: HashSet<[u8; 4]>,
    jumps: Vec<u32>,
    calls: Vec<u32>,
    resets: u32,
    fast: bool,
    debug: bool,
    halted: bool,
    muted: bool,
    disconnected: bool,
}

impl Default for State {
    fn default() -> Self {
        Self {
            phase: Phase::Token,
            pending: Vec::new(),
            outbox: VecDeque::new(),
            memory: HashMap::new(),
            written: Vec::new(),
            largest_write: 0,
            corrupt_blocks: 0,
            rejected_blocks: 0,
            exe_header: None,
            unsupported: HashSet::new(),
            jumps: Vec::new(),
            calls: Vec::new(),
            resets: 0,
            fast: false,
            debug: false,
            halted: false,
            muted: false,
            disconnected: false,
        }
    }
}

impl State {
    fn needed(&self) -> usize {
        match &self.phase {
            Phase::Token | Phase::Header { .. } | Phase::BlockSum { .. } | Phase::Address(_) => 4,
            Phase::ExeHeader => EXE_HEADER_LEN,
            Phase::Block(upload) => upload.block_len(),
        }
    }

    fn receive(&mut self, data: &[u8]) {
        self.written.extend_from_slice(data);
        self.largest_write = self.largest_write.max(data.len());
        self.pending.extend_from_slice(data);

        loop {
            let needed = self.needed();
            if self.pending.len() < needed {
                break;
            }
            let input: Vec<u8> = self.pending.drain(..needed).collect();
            self.step(&input);
        }
    }

    fn reply(&mut self, bytes: &[u8]) {
        if !self.muted {
            self.outbox.extend(bytes.iter().copied());
        }
    }

    fn step(&mut self, input: &[u8]) {
        let phase = core::mem::replace(&mut self.phase, Phase::Token);
        self.phase = match phase {
            Phase::Token => self.dispatch(input),
            Phase::Header {
                kind,
                mut words,
                count,
            } => {
                words.push(word(input));
                if words.len() < count {
                    Phase::Header { kind, words, count }
                } else {
                    self.header_complete(kind, &words)
                }
            }
            Phase::ExeHeader => {
                self.exe_header = Some(input.to_vec());
                Phase::Header {
                    kind: HeaderKind::Exe,
                    words: Vec::new(),
                    count: 3,
                }
            }
            Phase::Block(upload) => {
                let base = upload.dest.wrapping_add(upload.offset);
                self.write_memory(base, input);
                let corrupt = self.corrupt_blocks > 0;
                if corrupt {
                    self.corrupt_blocks -= 1;
                }
                self.reply(b"CHEK");
                Phase::BlockSum {
                    upload,
                    sum: checksum(input),
                    len: input.len(),
                    corrupt,
                }
            }
            Phase::BlockSum {
                mut upload,
                sum,
                len,
                corrupt,
            } => {
                if corrupt || word(input) != sum {
                    self.rejected_blocks += 1;
                    self.reply(b"ERR!");
                    Phase::Block(upload)
                } else {
                    self.reply(b"MORE");
                    upload.offset += len as u32;
                    self.next_block(upload)
                }
            }
            Phase::Address(branch) => {
                let addr = word(input);
                match branch {
                    Branch::Jump => self.jumps.push(addr),
                    Branch::Call => self.calls.push(addr),
                }
                Phase::Token
            }
        };
    }

    fn dispatch(&mut self, token: &[u8]) -> Phase {
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(token);
        if self.unsupported.contains(&bytes) {
            self.reply(b"UNSP");
            return Phase::Token;
        }

        let header = |kind, count| Phase::Header {
            kind,
            words: Vec::new(),
            count,
        };

        match &bytes {
            b"SBIN" => header(HeaderKind::Bin, 3),
            b"SROM" => header(HeaderKind::Rom, 2),
            b"DUMP" => header(HeaderKind::Dump, 2),
            b"SEXE" => Phase::ExeHeader,
            b"JUMP" => {
                self.reply(b"OKAY");
                Phase::Address(Branch::Jump)
            }
            b"CALL" => {
                self.reply(b"OKAY");
                Phase::Address(Branch::Call)
            }
            b"HALT" => {
                self.halted = true;
                self.reply(b"HLTD");
                Phase::Token
            }
            b"CONT" => {
                self.halted = false;
                self.reply(b"OKAY");
                Phase::Token
            }
            b"DEBG" => {
                self.debug = true;
                self.reply(b"OKAY");
                Phase::Token
            }
            b"PING" => {
                self.reply(b"PONG");
                Phase::Token
            }
            b"REST" => {
                self.resets += 1;
                Phase::Token
            }
            b"FAST" => {
                self.fast = true;
                Phase::Token
            }
            _ => Phase::Token,
        }
    }

    fn header_complete(&mut self, kind: HeaderKind, words: &[u32]) -> Phase {
        match kind {
            HeaderKind::Bin | HeaderKind::Exe => self.next_block(Upload {
                dest: words[0],
                size: words[1],
                sum: words[2],
                offset: 0,
            }),
            HeaderKind::Rom => self.next_block(Upload {
                dest: ROM_BASE,
                size: words[0],
                sum: words[1],
                offset: 0,
            }),
            HeaderKind::Dump => {
                let bytes = self.read_memory(words[0], words[1] as usize);
                self.reply(&bytes);
                Phase::Token
            }
        }
    }

    fn next_block(&mut self, upload: Upload) -> Phase {
        if upload.offset < upload.size {
            return Phase::Block(upload);
        }
        let stored = self.read_memory(upload.dest, upload.size as usize);
        if checksum(&stored) == upload.sum {
            self.reply(b"OKAY");
        } else {
            self.reply(b"BAD!");
        }
        Phase::Token
    }

    fn write_memory(&mut self, addr: u32, bytes: &[u8]) {
        for (i, &byte) in bytes.iter().enumerate() {
            self.memory.insert(addr.wrapping_add(i as u32), byte);
        }
    }

    fn read_memory(&self, addr: u32, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let at = addr.wrapping_add(i as u32);
                self.memory.get(&at).copied().unwrap_or(0)
            })
            .collect()
    }
}

fn word(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Simulated target monitor.
///
/// Interprets everything written to it as the host side of the protocol and
/// queues the replies a real target would send.  Replies are generated as
/// soon as the triggering bytes are written, so reads never need to wait;
/// an empty reply queue reads as a timeout.  Clones share the same target.
#[derive(Debug, Clone, Default)]
pub struct FakeMonitor {
    state: Arc<Mutex<State>>,
}

impl FakeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set target memory directly.
    pub fn poke(&self, addr: u32, bytes: &[u8]) {
        self.state.lock().write_memory(addr, bytes);
    }

    /// Read target memory directly.  Unset bytes read as 0.
    pub fn peek(&self, addr: u32, len: usize) -> Vec<u8> {
        self.state.lock().read_memory(addr, len)
    }

    /// Queue unsolicited bytes from the target, e.g. `HLTD` or console
    /// output.
    pub fn inject(&self, bytes: &[u8]) {
        self.state.lock().outbox.extend(bytes.iter().copied());
    }

    /// Everything the host has written
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().written.clone()
    }

    /// Largest single write the host has made
    pub fn largest_write(&self) -> usize {
        self.state.lock().largest_write
    }

    /// Reject the next `count` blocks regardless of their checksum.
    pub fn corrupt_blocks(&self, count: u32) {
        self.state.lock().corrupt_blocks = count;
    }

    pub fn rejected_blocks(&self) -> u32 {
        self.state.lock().rejected_blocks
    }

    /// Header sector of the last executable uploaded
    pub fn exe_header(&self) -> Option<Vec<u8>> {
        self.state.lock().exe_header.clone()
    }

    /// Answer `UNSP` to `token`.
    pub fn set_unsupported(&self, token: &[u8; 4]) {
        self.state.lock().unsupported.insert(*token);
    }

    /// Stop sending replies.  Injected bytes still arrive.
    pub fn mute(&self) {
        self.state.lock().muted = true;
    }

    /// Make every subsequent read and write fail.
    pub fn disconnect(&self) {
        self.state.lock().disconnected = true;
    }

    pub fn fast_mode(&self) -> bool {
        self.state.lock().fast
    }

    pub fn debug_enabled(&self) -> bool {
        self.state.lock().debug
    }

    pub fn halted(&self) -> bool {
        self.state.lock().halted
    }

    pub fn jumps(&self) -> Vec<u32> {
        self.state.lock().jumps.clone()
    }

    pub fn calls(&self) -> Vec<u32> {
        self.state.lock().calls.clone()
    }

    pub fn resets(&self) -> u32 {
        self.state.lock().resets
    }
}

impl Link for FakeMonitor {
    type Error = LinkFault;

    fn write(&mut self, data: &[u8]) -> Result<(), LinkFault> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(LinkFault);
        }
        state.receive(data);
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, LinkFault> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(LinkFault);
        }
        let count = buf.len().min(state.outbox.len());
        for (slot, byte) in buf.iter_mut().zip(state.outbox.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    fn bytes_to_read(&mut self) -> Result<usize, LinkFault> {
        let state = self.state.lock();
        if state.disconnected {
            return Err(LinkFault);
        }
        Ok(state.outbox.len())
    }
}

//
// RecordingConnector
//

/// Opens links onto a [`FakeMonitor`], recording the settings of each open
/// and the bytes written through each link.
#[derive(Debug)]
pub struct RecordingConnector {
    target: FakeMonitor,
    opened: Vec<LinkSettings>,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    fail_after: Option<usize>,
}

impl RecordingConnector {
    pub fn new(target: FakeMonitor) -> Self {
        Self {
            target,
            opened: Vec::new(),
            writes: Arc::new(Mutex::new(Vec::new())),
            fail_after: None,
        }
    }

    /// Let `count` opens succeed, then fail every one after.
    pub fn fail_open_after(&mut self, count: usize) {
        self.fail_after = Some(count);
    }

    /// Settings of each successful open, in order
    pub fn opened(&self) -> Vec<LinkSettings> {
        self.opened.clone()
    }

    /// Bytes written through each link, in open order
    pub fn written_per_open(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }
}

impl Connector for RecordingConnector {
    type Link = RecordingLink;
    type Error = LinkFault;

    fn open(&mut self, settings: &LinkSettings) -> Result<RecordingLink, LinkFault> {
        if self.fail_after.is_some_and(|n| self.opened.len() >= n) {
            return Err(LinkFault);
        }
        self.opened.push(*settings);

        let mut writes = self.writes.lock();
        writes.push(Vec::new());
        Ok(RecordingLink {
            target: self.target.clone(),
            writes: self.writes.clone(),
            index: writes.len() - 1,
        })
    }
}

/// Link opened by [`RecordingConnector`]
#[derive(Debug)]
pub struct RecordingLink {
    target: FakeMonitor,
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    index: usize,
}

impl Link for RecordingLink {
    type Error = LinkFault;

    fn write(&mut self, data: &[u8]) -> Result<(), LinkFault> {
        self.writes.lock()[self.index].extend_from_slice(data);
        self.target.write(data)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, LinkFault> {
        self.target.read(buf, timeout)
    }

    fn bytes_to_read(&mut self) -> Result<usize, LinkFault> {
        self.target.bytes_to_read()
    }
}
