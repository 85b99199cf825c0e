//! File Allocation Table chain walking (C4).
//!
//! Given a cluster index this reads the one FAT sector that holds its
//! 4-byte entry and returns the next cluster, or the end-of-chain sentinel.
//! Exactly one sector buffer is ever alive at a time — no FAT caching, per
//! the bounded-resource design this driver follows throughout.
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;

use crate::block::BlockDevice;
use crate::bpb::BiosParameterBlock;
use crate::error::BlockError;
use crate::{read_le_u32, BLOCK_SIZE, END_OF_CLUSTER};

/// Number of 4-byte FAT entries in one 512-byte sector.
const ENTRIES_PER_SECTOR: u32 = (BLOCK_SIZE / 4) as u32;

/// Looks up the next cluster in a chain by reading directly from the FAT.
///
/// The sector address includes `bpb.boot_sector_lba`: the FAT lives at an
/// absolute LBA, not one relative to the start of the card, so a volume
/// sitting behind a partition table needs the boot sector's own LBA folded
/// into every FAT sector address exactly as it already is into
/// [`BiosParameterBlock::data_region_first_sector`].
pub fn next_cluster<SPI, CS, E>(
    device: &mut BlockDevice<SPI, CS>,
    bpb: &BiosParameterBlock,
    cluster: u32,
) -> Result<u32, BlockError>
where
    SPI: Transfer<u8, Error = E>,
    CS: OutputPin,
{
    let fat_sector_offset = cluster / ENTRIES_PER_SECTOR;
    let byte_in_sector = (4 * (cluster % ENTRIES_PER_SECTOR)) as usize;

    let fat_sector_lba = bpb.boot_sector_lba + bpb.reserved_sector_count as u32 + fat_sector_offset;

    let mut sector = [0u8; BLOCK_SIZE];
    device.read_single_block(fat_sector_lba, &mut sector)?;

    let raw = read_le_u32(&sector[byte_in_sector..byte_in_sector + 4]);
    Ok(raw & 0x0FFF_FFFF)
}

/// Iterates the clusters of a chain starting at `first_cluster`, stopping
/// once [`next_cluster`] returns a value at or above [`END_OF_CLUSTER`].
///
/// Terminates in O(clusters in the chain) steps on a well-formed FAT; it
/// does not itself guard against a cyclic (corrupt) chain, matching the
/// original driver's behavior.
pub struct ClusterChain<'a, SPI, CS> {
    device: &'a mut BlockDevice<SPI, CS>,
    bpb: &'a BiosParameterBlock,
    current: Option<u32>,
}

impl<'a, SPI, CS> ClusterChain<'a, SPI, CS> {
    pub fn new(device: &'a mut BlockDevice<SPI, CS>, bpb: &'a BiosParameterBlock, first_cluster: u32) -> Self {
        Self {
            device,
            bpb,
            current: Some(first_cluster),
        }
    }
}

impl<'a, SPI, CS, E> Iterator for ClusterChain<'a, SPI, CS>
where
    SPI: Transfer<u8, Error = E>,
    CS: OutputPin,
{
    type Item = Result<u32, BlockError>;

    fn next(&mut self) -> Option<Self::Item> {
        let cluster = self.current?;
        match next_cluster(self.device, self.bpb, cluster) {
            Ok(next) if next >= END_OF_CLUSTER => {
                self.current = None;
                Some(Ok(cluster))
            }
            Ok(next) => {
                self.current = Some(next);
                Some(Ok(cluster))
            }
            Err(e) => {
                self.current = None;
                Some(Err(e))
            }
        }
    }
}
