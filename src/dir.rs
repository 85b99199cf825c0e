//! The public directory-engine operations: change directory, list, print
//! file contents (C6).
//!
//! Each operation is a thin filter over [`crate::dirparser::DirEntries`];
//! none of them re-implements sector/cluster walking or long-name assembly.
use alloc::format;
use alloc::string::{String, ToString};
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use log::debug;

use crate::block::BlockDevice;
use crate::bpb::BiosParameterBlock;
use crate::dirparser::DirEntries;
use crate::error::{DirError, FatError};
use crate::fat::ClusterChain;
use crate::sink::Sink;
use crate::{is_illegal_name_char, BLOCK_SIZE};

bitflags::bitflags! {
    /// Which columns/entry kinds [`list_current_directory`] includes.
    pub struct EntryFilter: u8 {
        const SHORT_NAME     = 0b0000_0001;
        const LONG_NAME      = 0b0000_0010;
        const HIDDEN         = 0b0000_0100;
        const CREATION       = 0b0000_1000;
        const LAST_ACCESS    = 0b0001_0000;
        const LAST_MODIFIED  = 0b0010_0000;
    }
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self::SHORT_NAME | Self::LONG_NAME
    }
}

/// The "current directory" a sequence of `cd` calls navigates through.
///
/// Owns its name strings rather than pointing at process-wide mutable
/// state: callers hold a `Cursor` value and thread it through operations
/// explicitly, and `..`/named descent return a new, independently valid
/// `Cursor` rather than mutating shared globals in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub first_cluster: u32,
    pub short_name: String,
    pub long_name: String,
    pub short_parent_path: String,
    pub long_parent_path: String,
}

impl Cursor {
    pub fn root(bpb: &BiosParameterBlock) -> Self {
        Self {
            first_cluster: bpb.root_cluster,
            short_name: "/".to_string(),
            long_name: "/".to_string(),
            short_parent_path: String::new(),
            long_parent_path: String::new(),
        }
    }

    fn is_root(&self, bpb: &BiosParameterBlock) -> bool {
        self.first_cluster == bpb.root_cluster
    }

    fn child_parent_path(&self, bpb: &BiosParameterBlock) -> (String, String) {
        if self.is_root(bpb) {
            return ("/".to_string(), "/".to_string());
        }
        let join = |parent: &str, name: &str| -> String {
            if parent == "/" {
                format!("/{name}")
            } else {
                format!("{parent}/{name}")
            }
        };
        (
            join(&self.short_parent_path, &self.short_name),
            join(&self.long_parent_path, &self.long_name),
        )
    }

    /// Pops the last path component off a parent-path string, returning
    /// `(new_name, new_parent_path)`. Used by `cd ..`, which otherwise has
    /// no way to recover the parent's *display name* — FAT32 stores only
    /// the parent's first cluster in the `..` entry, never its name.
    fn pop_path_component(path: &str) -> (String, String) {
        if path.is_empty() || path == "/" {
            return ("/".to_string(), String::new());
        }
        let trimmed = path.trim_start_matches('/');
        match trimmed.rfind('/') {
            Some(i) => (trimmed[i + 1..].to_string(), format!("/{}", &trimmed[..i])),
            None => (trimmed.to_string(), "/".to_string()),
        }
    }
}

fn validate_name(name: &str, invalid: DirError) -> Result<(), DirError> {
    if name.is_empty() || name.starts_with(' ') || name.chars().all(|c| c == ' ') || is_illegal_name_char(name) {
        return Err(invalid);
    }
    Ok(())
}

/// `cd`: moves `cursor` into `name`, which may be `.`, `..`, or a child
/// directory's short or long name.
pub fn set_current_directory<SPI, CS, E>(
    device: &mut BlockDevice<SPI, CS>,
    bpb: &BiosParameterBlock,
    cursor: &Cursor,
    name: &str,
) -> Result<Cursor, DirError>
where
    SPI: Transfer<u8, Error = E>,
    CS: OutputPin,
{
    validate_name(name, DirError::InvalidDirName)?;

    if name == "." {
        return Ok(cursor.clone());
    }

    if name == ".." {
        if cursor.is_root(bpb) {
            return Ok(cursor.clone());
        }
        let sector_lba = bpb.first_sector_of_cluster(cursor.first_cluster);
        let mut sector = [0u8; BLOCK_SIZE];
        device
            .read_single_block(sector_lba, &mut sector)
            .map_err(|e| DirError::Fat(FatError::Block(e)))?;

        // The ".." entry is the second 32-byte slot; its cluster fields sit
        // at the same offsets as any short entry's, just 32 bytes further in.
        let hi = u16::from_le_bytes([sector[52], sector[53]]);
        let lo = u16::from_le_bytes([sector[58], sector[59]]);
        let parent_cluster_raw = ((hi as u32) << 16) | lo as u32;

        if parent_cluster_raw == 0 {
            return Ok(Cursor::root(bpb));
        }

        let (short_name, short_parent_path) = Cursor::pop_path_component(&cursor.short_parent_path);
        let (long_name, long_parent_path) = Cursor::pop_path_component(&cursor.long_parent_path);
        return Ok(Cursor {
            first_cluster: parent_cluster_raw,
            short_name,
            long_name,
            short_parent_path,
            long_parent_path,
        });
    }

    let entries = DirEntries::new(device, bpb, cursor.first_cluster).map_err(DirError::Fat)?;
    for entry in entries {
        let entry = entry.map_err(DirError::Fat)?;
        if !entry.short.is_directory() {
            continue;
        }
        let matches = entry.long_name.as_deref() == Some(name) || entry.short.matches_short_name(name);
        if matches {
            let (short_parent_path, long_parent_path) = cursor.child_parent_path(bpb);
            let short_name = entry.short.short_name();
            let long_name = entry.long_name.clone().unwrap_or_else(|| short_name.clone());
            debug!("cd: entering {long_name} (cluster {})", entry.short.first_cluster());
            return Ok(Cursor {
                first_cluster: entry.short.first_cluster(),
                short_name,
                long_name,
                short_parent_path,
                long_parent_path,
            });
        }
    }
    Err(DirError::EndOfDirectory)
}

fn decode_date(raw: u16) -> (u16, u8, u8) {
    let year = 1980 + (raw >> 9);
    let month = ((raw >> 5) & 0x0F) as u8;
    let day = (raw & 0x1F) as u8;
    (year, month, day)
}

fn decode_time(raw: u16) -> (u8, u8, u8) {
    let hour = (raw >> 11) as u8;
    let minute = ((raw >> 5) & 0x3F) as u8;
    let second = ((raw & 0x1F) * 2) as u8;
    (hour, minute, second)
}

/// `ls`: streams a formatted listing of `cursor`'s contents to `sink`.
pub fn list_current_directory<SPI, CS, E>(
    device: &mut BlockDevice<SPI, CS>,
    bpb: &BiosParameterBlock,
    cursor: &Cursor,
    filter: EntryFilter,
    sink: &mut dyn Sink,
) -> Result<(), DirError>
where
    SPI: Transfer<u8, Error = E>,
    CS: OutputPin,
{
    sink.write_str(" SIZE       TYPE   NAME\r\n");

    let entries = DirEntries::new(device, bpb, cursor.first_cluster).map_err(DirError::Fat)?;
    for entry in entries {
        let entry = entry.map_err(DirError::Fat)?;
        if entry.short.is_hidden() && !filter.contains(EntryFilter::HIDDEN) {
            continue;
        }

        sink.write_dec(entry.short.file_size());
        sink.write_str("  ");
        sink.write_str(if entry.short.is_directory() { "<DIR>  " } else { "<FILE> " });

        if filter.contains(EntryFilter::CREATION) {
            let (date, tenths) = entry.short.creation_date_time();
            let (y, m, d) = decode_date(date);
            sink.write_str(" created ");
            sink.write_dec(y as u32);
            sink.write_byte(b'-');
            sink.write_dec(m as u32);
            sink.write_byte(b'-');
            sink.write_dec(d as u32);
            let _ = tenths;
        }
        if filter.contains(EntryFilter::LAST_ACCESS) {
            let (y, m, d) = decode_date(entry.short.last_access_date());
            sink.write_str(" accessed ");
            sink.write_dec(y as u32);
            sink.write_byte(b'-');
            sink.write_dec(m as u32);
            sink.write_byte(b'-');
            sink.write_dec(d as u32);
        }
        if filter.contains(EntryFilter::LAST_MODIFIED) {
            let (date, time) = entry.short.write_date_time();
            let (y, m, d) = decode_date(date);
            let (h, mi, s) = decode_time(time);
            sink.write_str(" modified ");
            sink.write_dec(y as u32);
            sink.write_byte(b'-');
            sink.write_dec(m as u32);
            sink.write_byte(b'-');
            sink.write_dec(d as u32);
            sink.write_byte(b' ');
            sink.write_dec(h as u32);
            sink.write_byte(b':');
            sink.write_dec(mi as u32);
            sink.write_byte(b':');
            sink.write_dec(s as u32);
        }

        sink.write_byte(b' ');
        match (filter.contains(EntryFilter::LONG_NAME), &entry.long_name) {
            (true, Some(name)) => sink.write_str(name),
            _ if filter.contains(EntryFilter::SHORT_NAME) => sink.write_str(&entry.short.short_name()),
            (_, Some(name)) => sink.write_str(name),
            _ => sink.write_str(&entry.short.short_name()),
        }
        sink.write_str("\r\n");
    }
    Ok(())
}

/// `cat`: streams the named file's contents to `sink`, translating `\n` to
/// `\r\n` and dropping NUL bytes, exactly like the historical driver. Unlike
/// that driver this streams the whole cluster chain rather than stopping
/// after 5 clusters, and stops at `file_size` rather than at cluster
/// boundaries so trailing slack bytes in the last cluster are never emitted.
pub fn print_file<SPI, CS, E>(
    device: &mut BlockDevice<SPI, CS>,
    bpb: &BiosParameterBlock,
    cursor: &Cursor,
    name: &str,
    sink: &mut dyn Sink,
) -> Result<(), DirError>
where
    SPI: Transfer<u8, Error = E>,
    CS: OutputPin,
{
    validate_name(name, DirError::InvalidFileName)?;

    let entries = DirEntries::new(device, bpb, cursor.first_cluster).map_err(DirError::Fat)?;
    let mut target = None;
    for entry in entries {
        let entry = entry.map_err(DirError::Fat)?;
        if entry.short.is_directory() {
            continue;
        }
        if entry.long_name.as_deref() == Some(name) || entry.short.matches_short_name(name) {
            target = Some(entry);
            break;
        }
    }
    let target = target.ok_or(DirError::FileNotFound)?;

    let mut remaining = target.short.file_size() as usize;
    if remaining == 0 {
        return Ok(());
    }

    // Collect the chain before streaming: ClusterChain borrows `device` for
    // as long as it's alive, and the sector reads below need that borrow
    // back.
    let clusters: Result<alloc::vec::Vec<u32>, _> =
        ClusterChain::new(device, bpb, target.short.first_cluster()).collect();
    let clusters = clusters.map_err(|e| DirError::Fat(FatError::Block(e)))?;

    'outer: for cluster in clusters {
        let first_sector = bpb.first_sector_of_cluster(cluster);
        for sector_idx in 0..bpb.sectors_per_cluster() as u32 {
            if remaining == 0 {
                break 'outer;
            }
            let mut sector = [0u8; BLOCK_SIZE];
            let lba = first_sector + sector_idx;
            stream_sector(device, lba, &mut sector, &mut remaining, sink)?;
        }
    }
    Ok(())
}

fn stream_sector<SPI, CS, E>(
    device: &mut BlockDevice<SPI, CS>,
    lba: u32,
    sector: &mut [u8; BLOCK_SIZE],
    remaining: &mut usize,
    sink: &mut dyn Sink,
) -> Result<(), DirError>
where
    SPI: Transfer<u8, Error = E>,
    CS: OutputPin,
{
    device
        .read_single_block(lba, sector)
        .map_err(|e| DirError::Fat(FatError::Block(e)))?;
    for &b in sector.iter() {
        if *remaining == 0 {
            break;
        }
        *remaining -= 1;
        if b == 0x00 {
            continue;
        }
        if b == b'\n' {
            sink.write_byte(b'\r');
        }
        sink.write_byte(b);
    }
    Ok(())
}
