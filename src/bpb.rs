//! FAT32 boot sector / BIOS Parameter Block loading and validation (C3).
//!
//! `BiosParameterBlock` is the geometry record every other FAT32 component
//! is built against: once `BiosParameterBlock::load` succeeds it is treated
//! as immutable for the life of the mount.
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::OutputPin;
use log::debug;

use crate::block::BlockDevice;
use crate::error::MountError;
use crate::{read_le_u16, read_le_u32, BLOCK_SIZE};

const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// Geometry extracted from a FAT32 volume's boot sector (BPB + BPB32
/// extension). Read once at mount and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BiosParameterBlock {
    /// Absolute LBA of the boot sector itself, as located by the partition
    /// scan that found it (0 if the volume starts at LBA 0 with no MBR).
    pub boot_sector_lba: u32,
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sector_count: u16,
    pub number_of_fats: u8,
    pub fat_size_32: u32,
    pub root_cluster: u32,
    pub fs_info_sector: u16,
    pub backup_boot_sector: u16,
}

impl BiosParameterBlock {
    /// Parses a raw 512-byte boot sector already read from `boot_sector_lba`.
    pub fn parse(boot_sector_lba: u32, sector: &[u8; BLOCK_SIZE]) -> Result<Self, MountError> {
        if sector[510..512] != BOOT_SIGNATURE {
            return Err(MountError::NotBootSector);
        }

        let bytes_per_sector = read_le_u16(&sector[11..13]);
        if bytes_per_sector != BLOCK_SIZE as u16 {
            return Err(MountError::InvalidBytesPerSector);
        }

        let sectors_per_cluster = sector[13];
        if !sectors_per_cluster.is_power_of_two() || sectors_per_cluster > 128 {
            return Err(MountError::InvalidSectorsPerCluster);
        }

        let number_of_fats = sector[16];
        let root_cluster = read_le_u32(&sector[44..48]);
        if number_of_fats == 0 || root_cluster < 2 {
            return Err(MountError::NotBootSector);
        }

        let bpb = Self {
            boot_sector_lba,
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sector_count: read_le_u16(&sector[14..16]),
            number_of_fats,
            fat_size_32: read_le_u32(&sector[36..40]),
            root_cluster,
            fs_info_sector: read_le_u16(&sector[48..50]),
            backup_boot_sector: read_le_u16(&sector[50..52]),
        };
        debug!(
            "mounted FAT32 volume: boot_sector_lba={} spc={} root_cluster={}",
            bpb.boot_sector_lba, bpb.sectors_per_cluster, bpb.root_cluster
        );
        Ok(bpb)
    }

    /// Reads sector `boot_sector_lba` through `device` and parses it.
    pub fn load<SPI, CS, E>(device: &mut BlockDevice<SPI, CS>, boot_sector_lba: u32) -> Result<Self, MountError>
    where
        SPI: Transfer<u8, Error = E>,
        CS: OutputPin,
    {
        let mut sector = [0u8; BLOCK_SIZE];
        device
            .read_single_block(boot_sector_lba, &mut sector)
            .map_err(MountError::Block)?;
        Self::parse(boot_sector_lba, &sector)
    }

    /// Locates and loads the FAT32 boot sector without the caller having to
    /// already know its LBA: tries LBA 0 directly (a volume with no
    /// partition table), then falls back to the first MBR partition table
    /// entry's relative-sector field (offset 454 of LBA 0, little-endian).
    ///
    /// Returns [`MountError::BootSectorNotFound`] if neither sector carries a
    /// valid boot signature.
    pub fn mount<SPI, CS, E>(device: &mut BlockDevice<SPI, CS>) -> Result<Self, MountError>
    where
        SPI: Transfer<u8, Error = E>,
        CS: OutputPin,
    {
        let mut sector = [0u8; BLOCK_SIZE];
        device.read_single_block(0, &mut sector).map_err(MountError::Block)?;

        if sector[510..512] == BOOT_SIGNATURE {
            if let Ok(bpb) = Self::parse(0, &sector) {
                return Ok(bpb);
            }
        }

        let partition_lba = read_le_u32(&sector[454..458]);
        if partition_lba == 0 {
            return Err(MountError::BootSectorNotFound);
        }
        device
            .read_single_block(partition_lba, &mut sector)
            .map_err(MountError::Block)?;
        if sector[510..512] != BOOT_SIGNATURE {
            return Err(MountError::BootSectorNotFound);
        }
        Self::parse(partition_lba, &sector)
    }

    /// Absolute LBA of the first FAT's first sector.
    pub fn fat1_sector(&self) -> u32 {
        self.boot_sector_lba + self.reserved_sector_count as u32
    }

    /// Absolute LBA of the first sector of the data region (cluster 2).
    pub fn data_region_first_sector(&self) -> u32 {
        self.fat1_sector() + self.number_of_fats as u32 * self.fat_size_32
    }

    /// Absolute LBA of the first sector belonging to `cluster`.
    ///
    /// Every caller is expected to have already validated `cluster >= 2`
    /// (the two reserved FAT entries never name a data cluster).
    pub fn first_sector_of_cluster(&self, cluster: u32) -> u32 {
        self.data_region_first_sector() + (cluster - 2) * self.sectors_per_cluster as u32
    }

    pub fn bytes_per_sector(&self) -> usize {
        self.bytes_per_sector as usize
    }

    pub fn sectors_per_cluster(&self) -> usize {
        self.sectors_per_cluster as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sector() -> [u8; BLOCK_SIZE] {
        let mut s = [0u8; BLOCK_SIZE];
        s[11..13].copy_from_slice(&512u16.to_le_bytes());
        s[13] = 8;
        s[14..16].copy_from_slice(&32u16.to_le_bytes());
        s[16] = 2;
        s[36..40].copy_from_slice(&1024u32.to_le_bytes());
        s[44..48].copy_from_slice(&2u32.to_le_bytes());
        s[48..50].copy_from_slice(&1u16.to_le_bytes());
        s[50..52].copy_from_slice(&6u16.to_le_bytes());
        s[510..512].copy_from_slice(&BOOT_SIGNATURE);
        s
    }

    #[test]
    fn parses_valid_boot_sector() {
        let bpb = BiosParameterBlock::parse(8192, &sample_sector()).unwrap();
        assert_eq!(bpb.data_region_first_sector(), 8192 + 32 + 2 * 1024);
        assert_eq!(bpb.first_sector_of_cluster(2), bpb.data_region_first_sector());
        assert_eq!(bpb.first_sector_of_cluster(3), bpb.data_region_first_sector() + 8);
    }

    #[test]
    fn rejects_missing_signature() {
        let mut s = sample_sector();
        s[510] = 0;
        assert_eq!(BiosParameterBlock::parse(0, &s), Err(MountError::NotBootSector));
    }

    #[test]
    fn rejects_bad_bytes_per_sector() {
        let mut s = sample_sector();
        s[11..13].copy_from_slice(&1024u16.to_le_bytes());
        assert_eq!(
            BiosParameterBlock::parse(0, &s),
            Err(MountError::InvalidBytesPerSector)
        );
    }

    #[test]
    fn rejects_non_power_of_two_cluster_size() {
        let mut s = sample_sector();
        s[13] = 3;
        assert_eq!(
            BiosParameterBlock::parse(0, &s),
            Err(MountError::InvalidSectorsPerCluster)
        );
    }
}
