//! Single/multi-block read, write, and erase against an SD card in SPI mode (C2).
//!
//! Every operation here is built on one [`Transport`] command/R1 exchange
//! plus the data-phase framing (start token, 512 bytes, CRC, data-response
//! token, busy-wait) the SD Physical Layer spec defines. None of it knows
//! about FAT32; it reads and writes raw 512-byte sectors by LBA.
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use log::warn;

use crate::error::{BlockError, R1Flags, TransportError};
use crate::policy::Policy;
use crate::transport::{Cmd, Transport, START_BLOCK_TOKEN, START_BLOCK_TOKEN_MULTI, STOP_TRAN_TOKEN};
use crate::BLOCK_SIZE;

/// Writes one data-phase frame (start token, 512 bytes, 2 dummy CRC bytes,
/// data-response poll, busy-wait) to an already chip-selected transport.
/// Free function rather than a method: it runs from inside a
/// [`Transport::command_and`] closure, which only hands back the transport,
/// not the owning [`BlockDevice`] (and its policy).
fn write_data_phase<SPI, CS, E>(
    t: &mut Transport<SPI, CS>,
    token: u8,
    data: &[u8; BLOCK_SIZE],
    r1: u8,
    data_response_timeout: u32,
    busy_wait_timeout: u32,
) -> Result<(), BlockError>
where
    SPI: Transfer<u8, Error = E>,
    CS: OutputPin,
{
    t.send_byte(token);
    for &b in data.iter() {
        t.send_byte(b);
    }
    t.send_byte(0xFF);
    t.send_byte(0xFF);

    let mut resp = None;
    for _ in 0..data_response_timeout {
        let b = t.recv_byte() & 0x1F;
        if matches!(b, DATA_RESP_ACCEPTED | DATA_RESP_CRC_ERROR | DATA_RESP_WRITE_ERROR) {
            resp = Some(b);
            break;
        }
    }
    let r1_flags = R1Flags::from_bits_truncate(r1);
    let resp = resp.ok_or(BlockError::DataResponseTimeout(r1_flags))?;

    for _ in 0..busy_wait_timeout {
        if t.recv_byte() != 0x00 {
            return match resp {
                DATA_RESP_ACCEPTED => Ok(()),
                DATA_RESP_CRC_ERROR => Err(BlockError::CrcErrorToken(r1_flags)),
                DATA_RESP_WRITE_ERROR => Err(BlockError::WriteErrorToken(r1_flags)),
                _ => Err(BlockError::InvalidDataResponse(r1_flags)),
            };
        }
    }
    Err(BlockError::CardBusyTimeout(r1_flags))
}

/// Accepted / CRC-error / write-error, after masking a data-response token
/// with `0x1F`.
const DATA_RESP_ACCEPTED: u8 = 0x05;
const DATA_RESP_CRC_ERROR: u8 = 0x0B;
const DATA_RESP_WRITE_ERROR: u8 = 0x0D;

/// Block-level access to an SD card over SPI. Wraps a [`Transport`]; this is
/// the type FAT32 mounting and sector I/O is built on (see [`bpb`](crate::bpb),
/// [`fat`](crate::fat), [`dirparser`](crate::dirparser)).
pub struct BlockDevice<SPI, CS> {
    transport: Transport<SPI, CS>,
    policy: Policy,
}

impl<SPI, CS, E> BlockDevice<SPI, CS>
where
    SPI: Transfer<u8, Error = E>,
    CS: OutputPin,
{
    pub fn new(transport: Transport<SPI, CS>, policy: Policy) -> Self {
        Self { transport, policy }
    }

    pub fn with_default_policy(transport: Transport<SPI, CS>) -> Self {
        Self::new(transport, Policy::default())
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Issues CMD17 and reads exactly one 512-byte sector into `buf`. Command
    /// frame, R1, and the start-token/data/CRC phase all run under one
    /// continuous chip-select assertion, per the SD SPI protocol.
    pub fn read_single_block(&mut self, lba: u32, buf: &mut [u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        let start_token_timeout = self.policy.start_token_timeout;
        self.transport.command_and(Cmd::ReadSingleBlock, lba, &self.policy, |t, r1| {
            for _ in 0..start_token_timeout {
                if t.recv_byte() == START_BLOCK_TOKEN {
                    for byte in buf.iter_mut() {
                        *byte = t.recv_byte();
                    }
                    // 2 CRC bytes, discarded: CRC is disabled by default in SPI mode.
                    t.recv_byte();
                    t.recv_byte();
                    return Ok(());
                }
            }
            warn!("timed out waiting for start block token (lba {lba})");
            Err(BlockError::StartTokenTimeout(R1Flags::from_bits_truncate(r1)))
        })
    }

    /// Issues CMD24 and writes exactly one 512-byte sector from `data`,
    /// command frame through final busy-wait under one chip-select window.
    pub fn write_single_block(&mut self, lba: u32, data: &[u8; BLOCK_SIZE]) -> Result<(), BlockError> {
        let data_response_timeout = self.policy.data_response_timeout;
        let busy_wait_timeout = self.policy.busy_wait_timeout;
        self.transport.command_and(Cmd::WriteBlock, lba, &self.policy, |t, r1| {
            write_data_phase(t, START_BLOCK_TOKEN, data, r1, data_response_timeout, busy_wait_timeout)
        })
    }

    /// Issues CMD25 and streams `blocks` consecutive sectors starting at
    /// `lba`. The command frame, every block's data phase, the Stop
    /// Transmission Token, and the trailing busy-wait are all one chip-select
    /// window — CMD25 is a single logical operation per the SD SPI protocol,
    /// not one CS window per block.
    ///
    /// Stops early (but always sends the Stop Transmission Token) on the
    /// first CRC or write error a block reports.
    pub fn write_multiple_block(&mut self, lba: u32, blocks: &[[u8; BLOCK_SIZE]]) -> Result<(), BlockError> {
        let data_response_timeout = self.policy.data_response_timeout;
        let busy_wait_timeout = self.policy.busy_wait_timeout;
        self.transport.command_and(Cmd::WriteMultipleBlock, lba, &self.policy, |t, r1| {
            let mut result = Ok(());
            for block in blocks {
                match write_data_phase(t, START_BLOCK_TOKEN_MULTI, block, r1, data_response_timeout, busy_wait_timeout) {
                    Ok(()) => {}
                    Err(e) => {
                        result = Err(e);
                        break;
                    }
                }
            }

            t.send_byte(STOP_TRAN_TOKEN);
            t.send_byte(0xFF);
            for _ in 0..busy_wait_timeout {
                if t.recv_byte() != 0x00 {
                    return result;
                }
            }
            result.and(Err(BlockError::CardBusyTimeout(R1Flags::from_bits_truncate(r1))))
        })
    }

    /// CMD32/CMD33/CMD38: erase every sector in `start..=end`. CMD38's own
    /// R1 and the busy-wait that follows it are one chip-select window; CMD32
    /// and CMD33 are each a separate SD command and keep their own.
    pub fn erase_blocks(&mut self, start: u32, end: u32) -> Result<(), BlockError> {
        self.transport
            .command(Cmd::EraseWrBlkStartAddr, start, &self.policy)
            .map_err(|e| match e {
                TransportError::R1Error(r1) => BlockError::SetEraseStartAddrError(r1),
                TransportError::R1Timeout => BlockError::Transport(e),
            })?;
        self.transport
            .command(Cmd::EraseWrBlkEndAddr, end, &self.policy)
            .map_err(|e| match e {
                TransportError::R1Error(r1) => BlockError::SetEraseEndAddrError(r1),
                TransportError::R1Timeout => BlockError::Transport(e),
            })?;

        let busy_wait_timeout = self.policy.busy_wait_timeout;
        self.transport
            .command_and(Cmd::Erase, 0, &self.policy, |t, _r1| {
                for _ in 0..busy_wait_timeout {
                    if t.recv_byte() != 0x00 {
                        return Ok(());
                    }
                }
                Err(BlockError::EraseBusyTimeout(R1Flags::empty()))
            })
            .map_err(|e| match e {
                BlockError::Transport(TransportError::R1Error(r1)) => BlockError::EraseError(r1),
                other => other,
            })
    }

    /// ACMD22: number of well-written blocks in the last interrupted
    /// multi-block write. ACMD22's R1 and its 4-byte data phase share one
    /// chip-select window; CMD55 (the ACMD prefix) is a separate command.
    pub fn well_written_block_count(&mut self) -> Result<u32, BlockError> {
        let start_token_timeout = self.policy.start_token_timeout;
        self.transport.app_command_and(Cmd::SendNumWrBlocks, 0, &self.policy, |t, _r1| {
            let mut token = None;
            for _ in 0..start_token_timeout {
                let b = t.recv_byte();
                if b != 0xFF {
                    token = Some(b);
                    break;
                }
            }
            if token != Some(START_BLOCK_TOKEN) {
                return Err(BlockError::StartTokenTimeout(R1Flags::empty()));
            }
            let bytes = [t.recv_byte(), t.recv_byte(), t.recv_byte(), t.recv_byte()];
            t.recv_byte();
            t.recv_byte();
            Ok(u32::from_be_bytes(bytes))
        })
    }
}
