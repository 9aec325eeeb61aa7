//! Uploads - see [`crate::transfer`] for the wire format.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::time::Duration;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::command::{CHECK, Command, CommandDescriptor, MORE, RESEND, ResponseWindow};
use crate::io::Link;
use crate::session::Session;
use crate::transfer::{BLOCK_SIZE, EXE_HEADER_LEN, EXE_LOAD_ADDR_OFFSET, checksum};
use crate::{Error, Result};

impl<L: Link> Session<L> {
    /// Upload `payload` to `addr` using the descriptor's challenge, e.g.
    /// `SBIN`.
    ///
    /// `checksum` is the checksum of the whole payload, normally
    /// [`checksum()`] of it.  The target checks it once every block has been
    /// accepted, before sending the descriptor's response.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidOperation`] - the descriptor has no challenge
    /// - [`Error::InvalidArgument`] - the payload is larger than 4GB
    /// - [`Error::ChecksumRejected`] - a block was rejected more than
    ///   [`crate::transfer::TransferConfig::max_resends`] times
    /// - any error from [`Session::perform()`], for the per-block exchange and
    ///   the final response
    pub fn upload(
        &mut self,
        descriptor: &CommandDescriptor,
        addr: u32,
        payload: &[u8],
        checksum: u32,
    ) -> Result<()> {
        let challenge = descriptor.challenge.ok_or(Error::InvalidOperation)?;
        let size = payload_size(payload)?;

        info!(
            "Uploading {size} bytes to {addr:#010X} with {challenge}, checksum {checksum:#010X}"
        );

        self.write_token(challenge)?;
        self.write_u32(addr)?;
        self.write_u32(size)?;
        self.write_u32(checksum)?;
        self.send_blocks(payload, descriptor.window)?;
        self.await_response(descriptor)?;

        info!("Upload to {addr:#010X} complete");
        Ok(())
    }

    /// Program a flash cartridge ROM with `payload`.
    ///
    /// The target chooses where the image goes, so only size and checksum
    /// are sent.  Uses the flash response window throughout, as the target
    /// erases and programs as blocks arrive.
    pub fn upload_rom(&mut self, payload: &[u8]) -> Result<()> {
        let descriptor = Command::SendRom.descriptor();
        let challenge = descriptor.challenge.ok_or(Error::InvalidOperation)?;
        let size = payload_size(payload)?;
        let checksum = checksum(payload);

        info!("Flashing {size} byte ROM, checksum {checksum:#010X}");

        self.write_token(challenge)?;
        self.write_u32(size)?;
        self.write_u32(checksum)?;
        self.send_blocks(payload, descriptor.window)?;
        self.await_response(descriptor)?;

        info!("ROM flashed");
        Ok(())
    }

    /// Upload an executable image and have the target run it.
    ///
    /// The image's first [`EXE_HEADER_LEN`] bytes are its header, which is
    /// sent verbatim for the target to parse.  Then follow the load address
    /// (from the header), the size and the checksum of everything after the
    /// header, and finally the body itself in blocks.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidImage`] if the image is shorter than its header,
    /// otherwise as for [`Self::upload()`].
    pub fn upload_exe(&mut self, image: &[u8]) -> Result<()> {
        let descriptor = Command::SendExe.descriptor();
        let challenge = descriptor.challenge.ok_or(Error::InvalidOperation)?;

        if image.len() < EXE_HEADER_LEN {
            warn!("Executable is {} bytes, smaller than its header", image.len());
            return Err(Error::InvalidImage);
        }
        let (header, body) = image.split_at(EXE_HEADER_LEN);
        let load_addr = u32::from_le_bytes([
            header[EXE_LOAD_ADDR_OFFSET],
            header[EXE_LOAD_ADDR_OFFSET + 1],
            header[EXE_LOAD_ADDR_OFFSET + 2],
            header[EXE_LOAD_ADDR_OFFSET + 3],
        ]);
        let size = payload_size(body)?;
        let checksum = checksum(body);

        info!("Uploading {size} byte executable to {load_addr:#010X}, checksum {checksum:#010X}");

        self.write_token(challenge)?;
        self.write_chunked(header)?;
        self.write_u32(load_addr)?;
        self.write_u32(size)?;
        self.write_u32(checksum)?;
        self.send_blocks(body, descriptor.window)?;
        self.await_response(descriptor)?;

        info!("Executable uploaded");
        Ok(())
    }
}

// Internal functions
impl<L: Link> Session<L> {
    fn send_blocks(&mut self, payload: &[u8], window: ResponseWindow) -> Result<()> {
        let timeout = self.timeouts().for_window(window);
        let blocks = payload.len().div_ceil(BLOCK_SIZE);

        for (index, block) in payload.chunks(BLOCK_SIZE).enumerate() {
            let offset = (index * BLOCK_SIZE) as u32;
            self.send_block(block, offset, timeout)?;
            debug!("Block {}/{blocks} accepted", index + 1);
        }
        Ok(())
    }

    fn send_block(&mut self, block: &[u8], offset: u32, timeout: Duration) -> Result<()> {
        let sum = checksum(block);
        let attempts = self.transfer.max_resends.saturating_add(1);
        let backoff = self.transfer.resend_backoff;

        for attempt in 1..=attempts {
            self.write_chunked(block)?;
            self.expect_token(CHECK, timeout)?;
            self.write_u32(sum)?;

            if self.expect_any(&[MORE, RESEND], timeout)? == MORE {
                return Ok(());
            }

            warn!("Block at offset {offset:#x} rejected, attempt {attempt}/{attempts}");
            if attempt < attempts && !backoff.is_zero() {
                std::thread::sleep(backoff);
            }
        }

        error!("Giving up on block at offset {offset:#x}");
        Err(Error::ChecksumRejected { offset, attempts })
    }

    fn write_chunked(&mut self, data: &[u8]) -> Result<()> {
        let chunk = self.transfer.chunk_len();
        let pause = self.transfer.chunk_pause;
        for piece in data.chunks(chunk) {
            self.write(piece)?;
            if !pause.is_zero() {
                std::thread::sleep(pause);
            }
        }
        Ok(())
    }
}

fn payload_size(payload: &[u8]) -> Result<u32> {
    u32::try_from(payload.len()).map_err(|_| Error::InvalidArgument)
}
