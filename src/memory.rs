//! Memory access helpers built on the transfer engine.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::command::Command;
use crate::io::Link;
use crate::session::{Session, StopFlag};
use crate::transfer::checksum;
use crate::Result;

impl<L: Link> Session<L> {
    /// Dump `size` bytes of target memory from `addr`.
    pub fn dump_bytes(&mut self, addr: u32, size: u32) -> Result<Vec<u8>> {
        info!("Dumping {size} bytes from {addr:#010X}");
        self.download(addr, size)
    }

    /// Repeatedly dump the same window of memory, passing each result to
    /// `render`, until `stop` is raised.
    ///
    /// There is no delay between iterations - each one costs a full round
    /// trip, which is what limits the rate.  Returns the number of dumps
    /// rendered.
    ///
    /// # Errors
    ///
    /// Stops at the first failed dump and returns its error.
    pub fn watch<F>(&mut self, addr: u32, size: u32, stop: &StopFlag, mut render: F) -> Result<u64>
    where
        F: FnMut(&[u8]),
    {
        info!("Watching {size} bytes at {addr:#010X}");
        let mut count = 0;
        while !stop.is_stopped() {
            let bytes = self.download(addr, size)?;
            render(&bytes);
            count += 1;
        }
        debug!("Watch stopped after {count} dumps");
        Ok(count)
    }

    /// Write a single 32-bit word to `addr`, using a 4 byte `SBIN` upload.
    pub fn write_word(&mut self, addr: u32, value: u32) -> Result<()> {
        debug!("Writing {value:#010X} to {addr:#010X}");
        let bytes = value.to_le_bytes();
        self.upload(Command::SendBin.descriptor(), addr, &bytes, checksum(&bytes))
    }
}

/// Render `bytes` as a hex dump, 16 bytes per row, each row starting with
/// its target address.
pub fn hex_dump(addr: u32, bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let row_addr = addr.wrapping_add((row * 16) as u32);
        let hex: String = chunk.iter().map(|byte| format!(" {byte:02X}")).collect();
        out.push_str(&format!("{row_addr:08X}:{hex}\n"));
    }
    out
}

/// File name for a memory dump.
///
/// `DUMP_<addr>_to_<size>.bin`, with both values as 8 hex digits.  If that
/// name is taken, a numbered suffix is added - see [`Self::resolve()`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpName {
    base: String,
}

impl DumpName {
    pub fn new(addr: u32, size: u32) -> Self {
        Self {
            base: format!("DUMP_{addr:08X}_to_{size:08X}"),
        }
    }

    /// The name without any suffix
    pub fn plain(&self) -> String {
        format!("{}.bin", self.base)
    }

    /// The first name that `taken` reports as free: the plain name, then
    /// `_1`, `_2` and so on before the extension.
    pub fn resolve<F>(&self, mut taken: F) -> String
    where
        F: FnMut(&str) -> bool,
    {
        let plain = self.plain();
        if !taken(&plain) {
            return plain;
        }

        let mut suffix = 1u32;
        loop {
            let candidate = format!("{}_{suffix}.bin", self.base);
            if !taken(&candidate) {
                warn!("{plain} already exists, using {candidate}");
                return candidate;
            }
            suffix += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::test_support::{FakeMonitor, session_on};
    use std::collections::HashSet;

    #[test]
    fn dump_reads_target_memory() {
        let target = FakeMonitor::new();
        target.poke(0x1F80_0000, &[1, 2, 3, 4, 5]);
        let mut session = session_on(&target);
        assert_eq!(session.dump_bytes(0x1F80_0000, 5), Ok(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn write_word_pokes_little_endian() {
        let target = FakeMonitor::new();
        let mut session = session_on(&target);
        session.write_word(0x8000_1000, 0xDEAD_BEEF).unwrap();
        assert_eq!(target.peek(0x8000_1000, 4), vec![0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(&target.written()[..4], b"SBIN");
    }

    #[test]
    fn watch_runs_until_stopped() {
        let target = FakeMonitor::new();
        target.poke(0x1F80_1800, &[9, 8, 7, 6]);
        let mut session = session_on(&target);
        let stop = StopFlag::new();

        let mut seen = Vec::new();
        let count = session
            .watch(0x1F80_1800, 4, &stop, |bytes| {
                seen.push(bytes.to_vec());
                if seen.len() == 3 {
                    stop.stop();
                }
            })
            .unwrap();

        assert_eq!(count, 3);
        assert!(seen.iter().all(|b| b == &[9, 8, 7, 6]));
    }

    #[test]
    fn watch_stops_on_error() {
        let target = FakeMonitor::new();
        target.mute();
        let mut session = session_on(&target);
        let result = session.watch(0x1F80_1800, 4, &StopFlag::new(), |_| {});
        assert_eq!(result, Err(Error::Timeout));
    }

    #[test]
    fn hex_dump_rows() {
        let bytes: Vec<u8> = (0..20).collect();
        let dump = hex_dump(0x8000_0000, &bytes);
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("80000000: 00 01 02"));
        assert_eq!(lines[1], "80000010: 10 11 12 13");
    }

    #[test]
    fn hex_dump_text() {
        assert_eq!(hex_dump(0x8000_0000, &[]), "");
        assert_eq!(
            hex_dump(0xFFFF_FFF0, &[0xAB; 17]),
            "FFFFFFF0: AB AB AB AB AB AB AB AB AB AB AB AB AB AB AB AB\n00000000: AB\n"
        );
    }

    #[test]
    fn dump_names() {
        let name = DumpName::new(0x8000_0000, 0x20_0000);
        assert_eq!(name.plain(), "DUMP_80000000_to_00200000.bin");
        assert_eq!(name.resolve(|_| false), "DUMP_80000000_to_00200000.bin");

        let taken: HashSet<_> = [
            "DUMP_80000000_to_00200000.bin",
            "DUMP_80000000_to_00200000_1.bin",
        ]
        .into_iter()
        .collect();
        assert_eq!(
            name.resolve(|n| taken.contains(n)),
            "DUMP_80000000_to_00200000_2.bin"
        );
    }
}
