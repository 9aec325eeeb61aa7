//! Chunked, checksum-verified uploads and exact-length downloads.
//!
//! # Uploads
//!
//! An upload sends the command's challenge, a small header of 32-bit words
//! (typically address, size and checksum of the whole payload), and then the
//! payload as a series of blocks of [`BLOCK_SIZE`] bytes - the last block may
//! be shorter.
//!
//! After each block the target sends `CHEK`, and the host answers with the
//! [`checksum()`] of that block.  The target then either accepts the block with
//! `MORE`, or rejects it with `ERR!`, in which case the host sends the same
//! block again.  A resend overwrites exactly the bytes the rejected block was
//! written to, so it is always safe.  Resends are bounded by
//! [`TransferConfig::max_resends`].
//!
//! Once every block is accepted the target verifies the whole payload against
//! the header checksum and sends the command's response token.
//!
//! Each block is written to the link in pieces of
//! [`TransferConfig::write_chunk`] bytes.  Some USB-serial bridges (CP210x and
//! friends) drop bytes when given a whole block at once, so this can be
//! lowered, optionally with a pause between pieces.
//!
//! # Downloads
//!
//! A download sends `DUMP`, the address and the size, and then reads exactly
//! that many bytes.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

mod download;
mod upload;

use core::time::Duration;

/// Size of the blocks the target verifies individually
pub const BLOCK_SIZE: usize = 2048;

/// Size of the header sector at the start of an executable image.  The target
/// parses the header itself, so it isn't included in the checksum.
pub const EXE_HEADER_LEN: usize = 0x800;

/// Offset of the load address within an executable's header
pub const EXE_LOAD_ADDR_OFFSET: usize = 0x18;

/// Default number of times a rejected block is resent before giving up
pub const MAX_RESENDS: u32 = 3;

/// Transfer tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// Maximum bytes handed to the link in a single write.  Clamped to
    /// `1..=BLOCK_SIZE`.
    pub write_chunk: usize,
    /// Pause after each write of `write_chunk` bytes
    pub chunk_pause: Duration,
    /// Resends allowed per block after the first attempt
    pub max_resends: u32,
    /// Pause before resending a rejected block
    pub resend_backoff: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            write_chunk: BLOCK_SIZE,
            chunk_pause: Duration::ZERO,
            max_resends: MAX_RESENDS,
            resend_backoff: Duration::from_millis(10),
        }
    }
}

impl TransferConfig {
    /// Settings for USB-serial bridges that can't keep up with whole blocks.
    pub fn small_chunks(write_chunk: usize) -> Self {
        Self {
            write_chunk,
            chunk_pause: Duration::from_millis(1),
            ..Self::default()
        }
    }

    fn chunk_len(&self) -> usize {
        self.write_chunk.clamp(1, BLOCK_SIZE)
    }
}

/// Sum of all bytes, wrapping at 2^32.
pub fn checksum(payload: &[u8]) -> u32 {
    payload
        .iter()
        .fold(0u32, |sum, &byte| sum.wrapping_add(u32::from(byte)))
}

/// Checksum of an executable image, excluding its header sector.
pub fn exe_checksum(image: &[u8]) -> u32 {
    checksum(image.get(EXE_HEADER_LEN..).unwrap_or_default())
}
