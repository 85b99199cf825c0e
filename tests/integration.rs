//! End-to-end `mount` → `cd` → `ls` → `cat` against a synthetic FAT32 image
//! carried entirely in memory — no real hardware or file descriptors.
#[path = "support/mod.rs"]
mod support;

use fat32_spi::block::BlockDevice;
use fat32_spi::bpb::BiosParameterBlock;
use fat32_spi::dir::{self, Cursor, EntryFilter};
use fat32_spi::error::DirError;
use fat32_spi::sink::{Sink, StringSink};
use fat32_spi::transport::Transport;

use support::image;
use support::mock_card::{MockCard, NoopPin};

fn mounted() -> (BlockDevice<MockCard, NoopPin>, BiosParameterBlock) {
    let transport = Transport::new(MockCard::new(image::build()), NoopPin);
    let mut device = BlockDevice::with_default_policy(transport);
    let bpb = BiosParameterBlock::load(&mut device, 0).expect("boot sector parses");
    (device, bpb)
}

#[test]
fn mounts_and_reports_root_geometry() {
    let (_device, bpb) = mounted();
    assert_eq!(bpb.root_cluster, image::ROOT_CLUSTER);
    assert_eq!(bpb.sectors_per_cluster(), 1);
}

#[test]
fn lists_root_directory_with_long_and_short_names() {
    let (mut device, bpb) = mounted();
    let cursor = Cursor::root(&bpb);
    let mut sink = StringSink::default();
    dir::list_current_directory(&mut device, &bpb, &cursor, EntryFilter::default(), &mut sink).unwrap();
    assert!(sink.0.contains("DOCS"));
    assert!(sink.0.contains(image::HELLO_LONG_NAME));
}

#[test]
fn cats_a_file_with_a_long_name_translating_newlines() {
    let (mut device, bpb) = mounted();
    let cursor = Cursor::root(&bpb);
    let mut sink = StringSink::default();
    dir::print_file(&mut device, &bpb, &cursor, image::HELLO_LONG_NAME, &mut sink).unwrap();
    assert_eq!(sink.0, "line one\r\nline two\r\n");
}

#[test]
fn cats_a_file_found_by_its_short_name() {
    let (mut device, bpb) = mounted();
    let cursor = Cursor::root(&bpb);
    let mut sink = StringSink::default();
    dir::print_file(&mut device, &bpb, &cursor, "HELLO~1.TXT", &mut sink).unwrap();
    assert_eq!(sink.0, "line one\r\nline two\r\n");
}

#[test]
fn cd_into_subdirectory_and_back_round_trips_the_cursor() {
    let (mut device, bpb) = mounted();
    let root = Cursor::root(&bpb);

    let docs = dir::set_current_directory(&mut device, &bpb, &root, "DOCS").unwrap();
    assert_eq!(docs.first_cluster, image::DOCS_CLUSTER);
    assert_eq!(docs.long_parent_path, "/");

    let back = dir::set_current_directory(&mut device, &bpb, &docs, "..").unwrap();
    assert_eq!(back, root);
}

#[test]
fn cd_dot_is_a_no_op() {
    let (mut device, bpb) = mounted();
    let root = Cursor::root(&bpb);
    let same = dir::set_current_directory(&mut device, &bpb, &root, ".").unwrap();
    assert_eq!(same, root);
}

#[test]
fn cats_a_file_inside_a_subdirectory() {
    let (mut device, bpb) = mounted();
    let root = Cursor::root(&bpb);
    let docs = dir::set_current_directory(&mut device, &bpb, &root, "DOCS").unwrap();

    let mut sink = StringSink::default();
    dir::print_file(&mut device, &bpb, &docs, "NOTES.TXT", &mut sink).unwrap();
    assert_eq!(sink.0, "note\r\n");
}

#[test]
fn cd_into_missing_directory_reports_end_of_directory() {
    let (mut device, bpb) = mounted();
    let root = Cursor::root(&bpb);
    let err = dir::set_current_directory(&mut device, &bpb, &root, "NOPE").unwrap_err();
    assert_eq!(err, DirError::EndOfDirectory);
}

#[test]
fn cat_of_missing_file_reports_not_found() {
    let (mut device, bpb) = mounted();
    let root = Cursor::root(&bpb);
    let mut sink = StringSink::default();
    let err = dir::print_file(&mut device, &bpb, &root, "NOPE.TXT", &mut sink).unwrap_err();
    assert_eq!(err, DirError::FileNotFound);
}
