//! SD-card-over-SPI command framing and R1 response handling (C1).
//!
//! This is the only layer that talks directly to the SPI peripheral and the
//! chip-select pin; everything above it (`block`, and transitively the FAT
//! layer) goes through [`Transport`]. No FAT32 knowledge lives here.
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use log::trace;

use crate::error::{R1Flags, TransportError};
use crate::policy::Policy;

/// SD SPI-mode command indices this driver issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cmd {
    ReadSingleBlock = 17,
    ReadMultipleBlock = 18,
    WriteBlock = 24,
    WriteMultipleBlock = 25,
    EraseWrBlkStartAddr = 32,
    EraseWrBlkEndAddr = 33,
    Erase = 38,
    StopTransmission = 12,
    AppCmd = 55,
    SendNumWrBlocks = 22,
}

/// SD SPI start/stop-of-data tokens (SD Physical Layer Simplified Spec).
pub const START_BLOCK_TOKEN: u8 = 0xFE;
pub const START_BLOCK_TOKEN_MULTI: u8 = 0xFC;
pub const STOP_TRAN_TOKEN: u8 = 0xFD;

/// Owns the SPI bus and chip-select line exclusively; every SD command
/// frame and R1 poll is implemented exactly once here.
///
/// Replaces the original driver's process-wide chip-select macros and
/// implicit single-card assumption: a [`Transport`] is a value a caller
/// holds and threads through calls, not ambient global state.
pub struct Transport<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS, E> Transport<SPI, CS>
where
    SPI: Transfer<u8, Error = E>,
    CS: OutputPin,
{
    pub fn new(spi: SPI, cs: CS) -> Self {
        Self { spi, cs }
    }

    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }

    fn exchange(&mut self, byte: u8) -> u8 {
        let mut buf = [byte];
        // A full-duplex SPI exchange: the card shifts a response byte back
        // on the same clock edges that shift `byte` out.
        let _ = self.spi.transfer(&mut buf);
        buf[0]
    }

    fn recv(&mut self) -> u8 {
        self.exchange(0xFF)
    }

    fn select(&mut self) {
        let _ = self.cs.set_low();
    }

    fn deselect(&mut self) {
        let _ = self.cs.set_high();
        // One dummy clock with CS high lets the card finish internal bookkeeping.
        self.exchange(0xFF);
    }

    /// Run `body` with chip-select asserted, guaranteeing it is deasserted
    /// on every return path including early errors.
    fn with_cs<T>(&mut self, body: impl FnOnce(&mut Self) -> T) -> T {
        self.select();
        let result = body(self);
        self.deselect();
        result
    }

    fn send_command_frame(&mut self, cmd: Cmd, arg: u32) {
        let frame = [
            0x40 | cmd as u8,
            (arg >> 24) as u8,
            (arg >> 16) as u8,
            (arg >> 8) as u8,
            arg as u8,
            // CRC is disabled by default in SPI mode except for CMD0/CMD8;
            // the driver never issues those through this path.
            0x01,
        ];
        for b in frame {
            self.exchange(b);
        }
    }

    fn poll_r1(&mut self, policy: &Policy) -> Result<u8, TransportError> {
        for _ in 0..policy.r1_timeout {
            let b = self.recv();
            if b & 0x80 == 0 {
                trace!("r1 = {:#04x}", b);
                return Ok(b);
            }
        }
        Err(TransportError::R1Timeout)
    }

    /// Send a command frame and return its R1 byte, or a transport error if
    /// the card reported a nonzero R1 or never responded.
    pub fn command(&mut self, cmd: Cmd, arg: u32, policy: &Policy) -> Result<u8, TransportError> {
        self.with_cs(|this| {
            this.send_command_frame(cmd, arg);
            let r1 = this.poll_r1(policy)?;
            if r1 != 0 {
                return Err(TransportError::R1Error(R1Flags::from_bits_truncate(r1)));
            }
            Ok(r1)
        })
    }

    /// `command`, followed by `data_phase` run under the same chip-select
    /// assertion. A single SD operation — command frame, R1, and whatever
    /// data the card then shifts out or expects — keeps chip-select asserted
    /// from the first byte of the command frame to the last byte of the data
    /// phase; this is how callers with a data phase (block reads/writes,
    /// ACMD22) get that without opening a second, independent CS window.
    pub fn command_and<T, Err>(
        &mut self,
        cmd: Cmd,
        arg: u32,
        policy: &Policy,
        data_phase: impl FnOnce(&mut Self, u8) -> Result<T, Err>,
    ) -> Result<T, Err>
    where
        Err: From<TransportError>,
    {
        self.with_cs(|this| {
            this.send_command_frame(cmd, arg);
            let r1 = this.poll_r1(policy)?;
            if r1 != 0 {
                return Err(TransportError::R1Error(R1Flags::from_bits_truncate(r1)).into());
            }
            data_phase(this, r1)
        })
    }

    /// CMD55 followed by an ACMD, as required before ACMD22/ACMD41/etc.
    pub fn app_command(&mut self, acmd: Cmd, arg: u32, policy: &Policy) -> Result<u8, TransportError> {
        self.command(Cmd::AppCmd, 0, policy)?;
        self.command(acmd, arg, policy)
    }

    /// [`app_command`](Self::app_command), but keeps chip-select asserted
    /// across the ACMD's own data phase, the same way [`command_and`] does
    /// for a plain command.
    pub fn app_command_and<T, Err>(
        &mut self,
        acmd: Cmd,
        arg: u32,
        policy: &Policy,
        data_phase: impl FnOnce(&mut Self, u8) -> Result<T, Err>,
    ) -> Result<T, Err>
    where
        Err: From<TransportError>,
    {
        self.command(Cmd::AppCmd, 0, policy)?;
        self.command_and(acmd, arg, policy, data_phase)
    }

    pub(crate) fn send_byte(&mut self, b: u8) {
        self.exchange(b);
    }

    pub(crate) fn recv_byte(&mut self) -> u8 {
        self.recv()
    }
}
