use std::io::Read;

use zipflow::archive_common::ArchiveDescriptor;
use zipflow::{ArchiveReader, FileOptions, StreamReader, ZipArchive};

mod common;

const LOCAL_SIG: u32 = 0x04034b50;
const CENTRAL_SIG: u32 = 0x02014b50;
const EOCD_SIG: u32 = 0x06054b50;
const ZIP64_EOCD_SIG: u32 = 0x06064b50;
const ZIP64_LOCATOR_SIG: u32 = 0x07064b50;
const DESCRIPTOR_SIG: u32 = 0x08074b50;

#[test]
fn stream_reads_writer_output_in_order() {
    let mut archive = ZipArchive::new(Vec::new());
    let options = FileOptions::default();
    archive
        .append("one.txt", &options, &mut &b"first entry body"[..])
        .unwrap();
    archive
        .append("two.txt", &options, &mut &b"second entry body"[..])
        .unwrap();
    archive
        .append_stored("three.txt", &options, crc32fast::hash(b"third"), 5, &mut &b"third"[..])
        .unwrap();
    let (_, bytes) = archive.finalize().unwrap();

    let mut reader = StreamReader::new(bytes.as_slice());

    let mut entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.meta().file_name(), "one.txt");
    let mut content = Vec::new();
    entry.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"first entry body");

    let mut entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.meta().file_name(), "two.txt");
    let mut content = Vec::new();
    entry.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"second entry body");

    let mut entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.meta().file_name(), "three.txt");
    let mut content = Vec::new();
    entry.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"third");

    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn stream_drains_unread_entries() {
    let mut archive = ZipArchive::new(Vec::new());
    let options = FileOptions::default();
    for i in 0..5 {
        let body = format!("entry body number {i}").repeat(50);
        archive
            .append(&format!("e{i}"), &options, &mut body.as_bytes())
            .unwrap();
    }
    let (_, bytes) = archive.finalize().unwrap();

    // Never read any entry data; iteration still verifies each CRC and ends.
    let mut reader = StreamReader::new(bytes.as_slice());
    let mut names = Vec::new();
    while let Some(entry) = reader.next_entry().unwrap() {
        names.push(entry.meta().file_name());
    }
    assert_eq!(names, ["e0", "e1", "e2", "e3", "e4"]);
}

#[test]
fn empty_archive_yields_no_entries() {
    let (_, bytes) = ZipArchive::new(Vec::new()).finalize().unwrap();
    let mut reader = StreamReader::new(bytes.as_slice());
    assert!(reader.next_entry().unwrap().is_none());

    let indexed = ArchiveReader::from_bytes(bytes).unwrap();
    assert!(indexed.is_empty());
}

#[test]
fn corrupted_deflated_payload_fails() {
    let body: Vec<u8> = (0..2048u32).flat_map(|v| v.to_le_bytes()).collect();
    let mut archive = ZipArchive::new(Vec::new());
    archive
        .append("victim.bin", &FileOptions::default(), &mut body.as_slice())
        .unwrap();
    let (_, mut bytes) = archive.finalize().unwrap();

    // Flip one byte in the middle of the compressed payload.
    let name_end = 30 + "victim.bin".len();
    bytes[name_end + 40] ^= 0x01;

    let reader = ArchiveReader::from_bytes(bytes).unwrap();
    let entry = reader.by_name("victim.bin").unwrap();
    let mut sink = Vec::new();
    assert!(reader
        .open(entry)
        .unwrap()
        .read_to_end(&mut sink)
        .is_err());
}

/// Classical EOCD entirely sentinel-marked: counts, size and offset all come
/// from the Zip64 record reached through the locator.
#[test]
fn zip64_sentinel_eocd_archive() {
    let data = b"Hello";
    let crc = crc32fast::hash(data);

    let mut archive = ArchiveDescriptor::new(512);

    // local file header for a.txt, stored, sizes known inline
    archive.write_u32(LOCAL_SIG);
    archive.write_u16(20);
    archive.write_u16(0);
    archive.write_u16(0); // stored
    archive.write_u16(0);
    archive.write_u16(0);
    archive.write_u32(crc);
    archive.write_u32(data.len() as u32);
    archive.write_u32(data.len() as u32);
    archive.write_u16(5);
    archive.write_u16(0);
    archive.write_bytes(b"a.txt");
    archive.write_bytes(data);

    let cd_offset = archive.len() as u64;

    // central directory header: sentinel sizes and offset, zip64 extra
    archive.write_u32(CENTRAL_SIG);
    archive.write_u16(45); // version made by
    archive.write_u16(45); // version needed
    archive.write_u16(0);
    archive.write_u16(0); // stored
    archive.write_u16(0);
    archive.write_u16(0);
    archive.write_u32(crc);
    archive.write_u32(0xFFFF_FFFF);
    archive.write_u32(0xFFFF_FFFF);
    archive.write_u16(5); // name len
    archive.write_u16(28); // extra len
    archive.write_u16(0); // comment len
    archive.write_u16(0); // disk start
    archive.write_u16(0); // internal attrs
    archive.write_u32(0); // external attrs
    archive.write_u32(0xFFFF_FFFF); // local header offset
    archive.write_bytes(b"a.txt");
    // zip64 extra: uncompressed, compressed, offset
    archive.write_u16(0x0001);
    archive.write_u16(24);
    archive.write_u64(data.len() as u64);
    archive.write_u64(data.len() as u64);
    archive.write_u64(0);

    let cd_size = archive.len() as u64 - cd_offset;
    let zip64_eocd_offset = archive.len() as u64;

    // zip64 end of central directory record
    archive.write_u32(ZIP64_EOCD_SIG);
    archive.write_u64(44);
    archive.write_u16(45);
    archive.write_u16(45);
    archive.write_u32(0);
    archive.write_u32(0);
    archive.write_u64(1);
    archive.write_u64(1);
    archive.write_u64(cd_size);
    archive.write_u64(cd_offset);

    // zip64 locator
    archive.write_u32(ZIP64_LOCATOR_SIG);
    archive.write_u32(0);
    archive.write_u64(zip64_eocd_offset);
    archive.write_u32(1);

    // classical EOCD, all counts and offsets sentinel
    archive.write_u32(EOCD_SIG);
    archive.write_u16(0);
    archive.write_u16(0);
    archive.write_u16(0xFFFF);
    archive.write_u16(0xFFFF);
    archive.write_u32(0xFFFF_FFFF);
    archive.write_u32(0xFFFF_FFFF);
    archive.write_u16(0);

    let reader = ArchiveReader::from_bytes(archive.finish()).unwrap();
    assert_eq!(reader.len(), 1);

    let entry = reader.by_name("a.txt").unwrap();
    assert_eq!(entry.meta().uncompressed_size, 5);
    assert_eq!(entry.meta().compressed_size, 5);
    assert_eq!(entry.meta().offset, 0);

    let mut content = Vec::new();
    reader
        .open(entry)
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    assert_eq!(content, b"Hello");
}

/// A stored bit-3 entry followed by a descriptor with 64-bit sizes; the
/// look-ahead must spot the terminator signature 16 bytes out.
#[test]
fn stream_descriptor_with_64_bit_sizes() {
    let data = b"Hello";
    let crc = crc32fast::hash(data);

    let mut archive = ArchiveDescriptor::new(128);
    archive.write_u32(LOCAL_SIG);
    archive.write_u16(45);
    archive.write_u16(1 << 3); // descriptor follows
    archive.write_u16(0); // stored
    archive.write_u16(0);
    archive.write_u16(0);
    archive.write_u32(0);
    archive.write_u32(data.len() as u32);
    archive.write_u32(data.len() as u32);
    archive.write_u16(1);
    archive.write_u16(0);
    archive.write_bytes(b"d");
    archive.write_bytes(data);

    // 24-byte descriptor
    archive.write_u32(DESCRIPTOR_SIG);
    archive.write_u32(crc);
    archive.write_u64(data.len() as u64);
    archive.write_u64(data.len() as u64);

    // bare terminator
    archive.write_u32(EOCD_SIG);
    archive.write_bytes(&[0u8; 18]);

    let bytes = archive.finish();
    let mut reader = StreamReader::new(bytes.as_slice());

    let mut entry = reader.next_entry().unwrap().unwrap();
    let mut content = Vec::new();
    entry.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"Hello");

    assert!(reader.next_entry().unwrap().is_none());
}

/// Local header carrying sentinel sizes resolved by a 16-byte Zip64 extra.
#[test]
fn stream_local_header_with_zip64_sizes() {
    let data = b"Hello";
    let crc = crc32fast::hash(data);

    let mut archive = ArchiveDescriptor::new(128);
    archive.write_u32(LOCAL_SIG);
    archive.write_u16(45);
    archive.write_u16(0);
    archive.write_u16(0); // stored
    archive.write_u16(0);
    archive.write_u16(0);
    archive.write_u32(crc);
    archive.write_u32(0xFFFF_FFFF);
    archive.write_u32(0xFFFF_FFFF);
    archive.write_u16(5);
    archive.write_u16(20);
    archive.write_bytes(b"a.txt");
    archive.write_u16(0x0001);
    archive.write_u16(16);
    archive.write_u64(data.len() as u64);
    archive.write_u64(data.len() as u64);
    archive.write_bytes(data);

    archive.write_u32(EOCD_SIG);
    archive.write_bytes(&[0u8; 18]);

    let bytes = archive.finish();
    let mut reader = StreamReader::new(bytes.as_slice());

    let mut entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.meta().uncompressed_size, 5);
    assert_eq!(entry.meta().compressed_size, 5);
    let mut content = Vec::new();
    entry.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"Hello");

    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn non_ascii_names_round_trip() {
    let mut archive = ZipArchive::new(Vec::new());
    archive
        .append("héllo/wörld.txt", &FileOptions::default(), &mut &b"data"[..])
        .unwrap();
    let (_, bytes) = archive.finalize().unwrap();

    {
        let mut reader = StreamReader::new(bytes.as_slice());
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.meta().file_name(), "héllo/wörld.txt");
        // bit 11 marks the name as UTF-8
        assert_ne!(entry.meta().general_purpose_flags & (1 << 11), 0);
    }

    let indexed = ArchiveReader::from_bytes(bytes).unwrap();
    assert!(indexed.by_name("héllo/wörld.txt").is_some());
}
