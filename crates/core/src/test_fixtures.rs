//! Documents built on the fly for tests

use image::{ImageFormat, Rgba, RgbaImage};
use leafview_pdf_engine::test_support::blank_pdf;
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// PNG of a solid colour
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([30, 120, 200, 255]));
    let mut cursor = Cursor::new(Vec::new());
    image.write_to(&mut cursor, ImageFormat::Png).unwrap();
    cursor.into_inner()
}

/// Zip archive with the given entries; names ending in `/` become directories
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();

    for (name, bytes) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options).unwrap();
        } else {
            zip.start_file(*name, options).unwrap();
            zip.write_all(bytes).unwrap();
        }
    }
    zip.finish().unwrap();
}

/// Zip archive in `dir` whose entries are all `width x height` PNGs
pub fn write_zip_pages(dir: &Path, file_name: &str, names: &[&str], width: u32, height: u32) -> PathBuf {
    let path = dir.join(file_name);
    let png = png_bytes(width, height);
    let entries: Vec<(&str, &[u8])> = names.iter().map(|name| (*name, png.as_slice())).collect();
    write_zip(&path, &entries);
    path
}

/// Zip archive holding one stored entry written with zip64 extra fields
pub fn write_zip64_entry(path: &Path, name: &str, bytes: &[u8]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true);

    zip.start_file(name, options).unwrap();
    zip.write_all(bytes).unwrap();
    zip.finish().unwrap();
}

/// Rewrite the uncompressed size in every zip64 extra field that records
/// `actual`, returning how many fields were patched
pub fn declare_zip64_size(path: &Path, actual: u64, declared: u64) -> usize {
    let mut bytes = fs::read(path).unwrap();
    let mut patched = 0;
    let mut offset = 0;

    while offset + 12 <= bytes.len() {
        let is_zip64_field = bytes[offset..offset + 2] == [0x01, 0x00];
        let field_len = u16::from_le_bytes([bytes[offset + 2], bytes[offset + 3]]);
        if is_zip64_field && field_len >= 8 && bytes[offset + 4..offset + 12] == actual.to_le_bytes() {
            bytes[offset + 4..offset + 12].copy_from_slice(&declared.to_le_bytes());
            patched += 1;
            offset += 12;
        } else {
            offset += 1;
        }
    }

    fs::write(path, bytes).unwrap();
    patched
}

/// Stored RAR holding `a.png` (6x3), `B.jpg` (a 3x6 PNG) and `notes.txt`
pub const RAR_PAGES: &[u8] = include_bytes!("../../../tests/fixtures/pages.cbr");

/// Write [`RAR_PAGES`] into `dir`
pub fn write_rar_pages(dir: &Path, file_name: &str) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(&path, RAR_PAGES).unwrap();
    path
}

/// Cut a zip archive just before its central directory
pub fn strip_central_directory(path: &Path) {
    let bytes = fs::read(path).unwrap();
    let start = bytes
        .windows(4)
        .position(|window| window == b"PK\x01\x02")
        .expect("archive should have a central directory");
    fs::write(path, &bytes[..start]).unwrap();
}

/// PDF in `dir` with one blank page per `(width, height)`
pub fn write_pdf(dir: &Path, file_name: &str, page_sizes: &[(i64, i64)]) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(&path, blank_pdf(page_sizes)).unwrap();
    path
}
