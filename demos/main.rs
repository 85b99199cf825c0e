//! Interactive-ish demo: mounts a synthetic FAT32 image over an in-memory
//! mock SD card and drives `ls`/`cat` against it, the way the historical
//! driver's menu program drove the real thing over real hardware.
#[path = "mock_card.rs"]
mod mock_card;

use fat32_spi::block::BlockDevice;
use fat32_spi::bpb::BiosParameterBlock;
use fat32_spi::dir::{self, Cursor, EntryFilter};
use fat32_spi::sink::{Sink, StringSink};

use mock_card::{MockCard, NoopPin};

const GREETING: &[u8] = b"hello from the demo image\n";

fn build_image() -> Vec<[u8; 512]> {
    let mut boot = [0u8; 512];
    boot[11..13].copy_from_slice(&512u16.to_le_bytes());
    boot[13] = 1; // sectors per cluster
    boot[14..16].copy_from_slice(&1u16.to_le_bytes()); // reserved sectors
    boot[16] = 1; // number of FATs
    boot[36..40].copy_from_slice(&1u32.to_le_bytes()); // fat size 32
    boot[44..48].copy_from_slice(&2u32.to_le_bytes()); // root cluster
    boot[48..50].copy_from_slice(&1u16.to_le_bytes());
    boot[50..52].copy_from_slice(&6u16.to_le_bytes());
    boot[510..512].copy_from_slice(&[0x55, 0xAA]);

    let mut fat = [0u8; 512];
    fat[8..12].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes()); // cluster 2: EOC

    let mut root = [0u8; 512];
    root[0..8].copy_from_slice(b"GREET   ");
    root[8..11].copy_from_slice(b"TXT");
    root[11] = 0x20; // archive
    root[20..22].copy_from_slice(&0u16.to_le_bytes());
    root[26..28].copy_from_slice(&3u16.to_le_bytes()); // first cluster = 3
    root[28..32].copy_from_slice(&(GREETING.len() as u32).to_le_bytes());

    let mut contents = [0u8; 512];
    contents[..GREETING.len()].copy_from_slice(GREETING);

    vec![boot, fat, root, contents]
}

fn main() {
    let transport = fat32_spi::transport::Transport::new(MockCard::new(build_image()), NoopPin);
    let mut device = BlockDevice::with_default_policy(transport);
    let bpb = BiosParameterBlock::mount(&mut device).expect("demo image mounts");
    let root = Cursor::root(&bpb);

    let mut listing = StringSink::default();
    dir::list_current_directory(&mut device, &bpb, &root, EntryFilter::default(), &mut listing)
        .expect("ls succeeds");
    print!("{}", listing.0);

    let mut contents = StringSink::default();
    dir::print_file(&mut device, &bpb, &root, "GREET.TXT", &mut contents).expect("cat succeeds");
    print!("{}", contents.0);
}
