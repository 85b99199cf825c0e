//! Crate-wide error hierarchy and the human-readable string table for it.
//!
//! Every fallible operation returns one of these typed errors rather than
//! the packed 16-bit (operation-flag | R1) codes the SD SPI protocol itself
//! uses on the wire. [`BlockError::to_packed`]/[`from_packed`] keep that
//! legacy encoding available for callers that want to log or compare
//! against it directly.
use core::fmt;

bitflags::bitflags! {
    /// The R1 response byte returned by an SD card after every command in
    /// SPI mode. More than one bit is commonly set at once.
    pub struct R1Flags: u8 {
        const IDLE_STATE        = 0b0000_0001;
        const ERASE_RESET       = 0b0000_0010;
        const ILLEGAL_COMMAND   = 0b0000_0100;
        const COM_CRC_ERROR     = 0b0000_1000;
        const ERASE_SEQ_ERROR   = 0b0001_0000;
        const ADDRESS_ERROR     = 0b0010_0000;
        const PARAMETER_ERROR   = 0b0100_0000;
    }
}

impl fmt::Display for R1Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for (name, flag) in [
            ("idle state", Self::IDLE_STATE),
            ("erase reset", Self::ERASE_RESET),
            ("illegal command", Self::ILLEGAL_COMMAND),
            ("com crc error", Self::COM_CRC_ERROR),
            ("erase sequence error", Self::ERASE_SEQ_ERROR),
            ("address error", Self::ADDRESS_ERROR),
            ("parameter error", Self::PARAMETER_ERROR),
        ] {
            if self.contains(flag) {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Outcomes of a single SD command/response exchange (C1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// No byte with a clear MSB arrived before [`Policy::r1_timeout`](crate::policy::Policy::r1_timeout) polls.
    R1Timeout,
    /// The card answered with a non-zero R1.
    R1Error(R1Flags),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::R1Timeout => write!(f, "timed out waiting for R1 response"),
            Self::R1Error(r1) => write!(f, "card reported error in R1: {r1}"),
        }
    }
}

/// Outcomes of block-level read/write/erase operations (C2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    Transport(TransportError),
    /// Timed out waiting for the Start Block Token.
    StartTokenTimeout(R1Flags),
    /// Write data-response token was never one of the three recognized values.
    InvalidDataResponse(R1Flags),
    /// Timed out waiting for a write data-response token.
    DataResponseTimeout(R1Flags),
    /// The card reported a CRC error on a write.
    CrcErrorToken(R1Flags),
    /// The card reported a write error.
    WriteErrorToken(R1Flags),
    /// Timed out waiting for the card to stop holding DO low.
    CardBusyTimeout(R1Flags),
    SetEraseStartAddrError(R1Flags),
    SetEraseEndAddrError(R1Flags),
    EraseError(R1Flags),
    EraseBusyTimeout(R1Flags),
}

impl fmt::Display for BlockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::StartTokenTimeout(r1) => write!(f, "timed out waiting for start block token (r1: {r1})"),
            Self::InvalidDataResponse(r1) => write!(f, "card returned an unrecognized data-response token (r1: {r1})"),
            Self::DataResponseTimeout(r1) => write!(f, "timed out waiting for data-response token (r1: {r1})"),
            Self::CrcErrorToken(r1) => write!(f, "card reported a CRC error on write (r1: {r1})"),
            Self::WriteErrorToken(r1) => write!(f, "card reported a write error (r1: {r1})"),
            Self::CardBusyTimeout(r1) => write!(f, "timed out waiting for card to leave the busy state (r1: {r1})"),
            Self::SetEraseStartAddrError(r1) => write!(f, "failed to set erase start address (r1: {r1})"),
            Self::SetEraseEndAddrError(r1) => write!(f, "failed to set erase end address (r1: {r1})"),
            Self::EraseError(r1) => write!(f, "erase command failed (r1: {r1})"),
            Self::EraseBusyTimeout(r1) => write!(f, "timed out waiting for erase to complete (r1: {r1})"),
        }
    }
}

// Legacy packed encoding: upper byte is a one-hot operation flag, lower byte
// is the raw R1 response. Kept only for callers that want to assert against
// the historical wire-level representation.
const FLAG_R1_ERROR: u16 = 0x0100;
const FLAG_START_TOKEN_TIMEOUT: u16 = 0x0200;
const FLAG_INVALID_DATA_RESPONSE: u16 = 0x0300;
const FLAG_DATA_RESPONSE_TIMEOUT: u16 = 0x0400;
const FLAG_CRC_ERROR_TOKEN: u16 = 0x0500;
const FLAG_WRITE_ERROR_TOKEN: u16 = 0x0600;
const FLAG_CARD_BUSY_TIMEOUT: u16 = 0x0700;
const FLAG_SET_ERASE_START_ADDR_ERROR: u16 = 0x0800;
const FLAG_SET_ERASE_END_ADDR_ERROR: u16 = 0x0900;
const FLAG_ERASE_ERROR: u16 = 0x0A00;
const FLAG_ERASE_BUSY_TIMEOUT: u16 = 0x0B00;
const FLAG_R1_TIMEOUT: u16 = 0x0C00;

impl BlockError {
    /// Pack this error into the (operation-flag | r1) `u16` the original SD
    /// driver's C API used.
    pub fn to_packed(&self) -> u16 {
        match self {
            Self::Transport(TransportError::R1Timeout) => FLAG_R1_TIMEOUT,
            Self::Transport(TransportError::R1Error(r1)) => FLAG_R1_ERROR | r1.bits() as u16,
            Self::StartTokenTimeout(r1) => FLAG_START_TOKEN_TIMEOUT | r1.bits() as u16,
            Self::InvalidDataResponse(r1) => FLAG_INVALID_DATA_RESPONSE | r1.bits() as u16,
            Self::DataResponseTimeout(r1) => FLAG_DATA_RESPONSE_TIMEOUT | r1.bits() as u16,
            Self::CrcErrorToken(r1) => FLAG_CRC_ERROR_TOKEN | r1.bits() as u16,
            Self::WriteErrorToken(r1) => FLAG_WRITE_ERROR_TOKEN | r1.bits() as u16,
            Self::CardBusyTimeout(r1) => FLAG_CARD_BUSY_TIMEOUT | r1.bits() as u16,
            Self::SetEraseStartAddrError(r1) => FLAG_SET_ERASE_START_ADDR_ERROR | r1.bits() as u16,
            Self::SetEraseEndAddrError(r1) => FLAG_SET_ERASE_END_ADDR_ERROR | r1.bits() as u16,
            Self::EraseError(r1) => FLAG_ERASE_ERROR | r1.bits() as u16,
            Self::EraseBusyTimeout(r1) => FLAG_ERASE_BUSY_TIMEOUT | r1.bits() as u16,
        }
    }

    /// Inverse of [`to_packed`](Self::to_packed); `None` if the flag byte is unrecognized.
    pub fn from_packed(code: u16) -> Option<Self> {
        let flag = code & 0xFF00;
        let r1 = R1Flags::from_bits_truncate((code & 0x00FF) as u8);
        Some(match flag {
            FLAG_R1_TIMEOUT => Self::Transport(TransportError::R1Timeout),
            FLAG_R1_ERROR => Self::Transport(TransportError::R1Error(r1)),
            FLAG_START_TOKEN_TIMEOUT => Self::StartTokenTimeout(r1),
            FLAG_INVALID_DATA_RESPONSE => Self::InvalidDataResponse(r1),
            FLAG_DATA_RESPONSE_TIMEOUT => Self::DataResponseTimeout(r1),
            FLAG_CRC_ERROR_TOKEN => Self::CrcErrorToken(r1),
            FLAG_WRITE_ERROR_TOKEN => Self::WriteErrorToken(r1),
            FLAG_CARD_BUSY_TIMEOUT => Self::CardBusyTimeout(r1),
            FLAG_SET_ERASE_START_ADDR_ERROR => Self::SetEraseStartAddrError(r1),
            FLAG_SET_ERASE_END_ADDR_ERROR => Self::SetEraseEndAddrError(r1),
            FLAG_ERASE_ERROR => Self::EraseError(r1),
            FLAG_ERASE_BUSY_TIMEOUT => Self::EraseBusyTimeout(r1),
            _ => return None,
        })
    }
}

/// Failures mounting the FAT32 volume (C3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountError {
    /// No boot sector signature found anywhere on the card.
    BootSectorNotFound,
    /// A sector was found but lacks the trailing 0x55 0xAA signature, or has
    /// an implausible `num_fats`/`root_cluster`.
    NotBootSector,
    InvalidBytesPerSector,
    InvalidSectorsPerCluster,
    Block(BlockError),
}

impl fmt::Display for MountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BootSectorNotFound => write!(f, "no FAT32 boot sector found"),
            Self::NotBootSector => write!(f, "sector is not a valid FAT32 boot sector"),
            Self::InvalidBytesPerSector => write!(f, "bytes per sector is not 512"),
            Self::InvalidSectorsPerCluster => write!(f, "sectors per cluster is not a power of two in [1, 128]"),
            Self::Block(e) => write!(f, "{e}"),
        }
    }
}

/// Failures walking the File Allocation Table (C4) or interpreting a
/// directory entry group (C5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatError {
    Block(BlockError),
    /// A long-name chain's final slot does not have ordinal 1, or its
    /// checksum does not match the owning short entry.
    CorruptFatEntry,
}

impl fmt::Display for FatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Block(e) => write!(f, "{e}"),
            Self::CorruptFatEntry => write!(f, "corrupt long-name entry chain"),
        }
    }
}

/// Failures in the directory-engine public operations (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirError {
    InvalidDirName,
    InvalidFileName,
    DirNotFound,
    FileNotFound,
    EndOfDirectory,
    EndOfFile,
    Fat(FatError),
}

impl fmt::Display for DirError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDirName => write!(f, "invalid directory name"),
            Self::InvalidFileName => write!(f, "invalid file name"),
            Self::DirNotFound => write!(f, "directory not found"),
            Self::FileNotFound => write!(f, "file not found"),
            Self::EndOfDirectory => write!(f, "end of directory"),
            Self::EndOfFile => write!(f, "end of file"),
            Self::Fat(e) => write!(f, "{e}"),
        }
    }
}

/// Top-level error type uniting every component's errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Transport(TransportError),
    Block(BlockError),
    Mount(MountError),
    Fat(FatError),
    Dir(DirError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::Block(e) => write!(f, "{e}"),
            Self::Mount(e) => write!(f, "{e}"),
            Self::Fat(e) => write!(f, "{e}"),
            Self::Dir(e) => write!(f, "{e}"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}
impl From<BlockError> for Error {
    fn from(e: BlockError) -> Self {
        Self::Block(e)
    }
}
impl From<MountError> for Error {
    fn from(e: MountError) -> Self {
        Self::Mount(e)
    }
}
impl From<FatError> for Error {
    fn from(e: FatError) -> Self {
        Self::Fat(e)
    }
}
impl From<DirError> for Error {
    fn from(e: DirError) -> Self {
        Self::Dir(e)
    }
}
impl From<TransportError> for BlockError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}
impl From<BlockError> for FatError {
    fn from(e: BlockError) -> Self {
        Self::Block(e)
    }
}
impl From<BlockError> for MountError {
    fn from(e: BlockError) -> Self {
        Self::Block(e)
    }
}
impl From<FatError> for DirError {
    fn from(e: FatError) -> Self {
        Self::Fat(e)
    }
}
