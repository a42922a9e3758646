//! Minimal ZIP writer.
//!
//! Produces a standard (non-zip64) archive: one local file header plus
//! deflated data per member, then the Central Directory and the End of
//! Central Directory record. Nothing is readable by an unzip tool until
//! [`ZipWriter::finish`] has written the trailing directory.

use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Datelike, Local, Timelike};
use flate2::CrcReader;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::SystemTime;

use crate::error::{Error, Result};

use super::Member;

/// "version needed to extract": 2.0, the first version with DEFLATE.
const VERSION_NEEDED: u16 = 20;
/// "version made by": Unix host, APPNOTE 2.0.
const VERSION_MADE_BY: u16 = (3 << 8) | VERSION_NEEDED;
/// General purpose flag bit 11: file names are UTF-8.
const FLAG_UTF8: u16 = 1 << 11;
const METHOD_DEFLATE: u16 = 8;
/// Regular file, rw-r--r--, in the high half of the external attributes.
const UNIX_FILE_ATTRS: u32 = 0o100644 << 16;

/// Local File Header (LFH) - 30 bytes
const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
const LFH_SIZE: u64 = 30;

/// Central Directory File Header (CDFH) - 46 bytes
const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
const CDFH_SIZE: u64 = 46;

/// End of Central Directory (EOCD) - 22 bytes
const EOCD_SIGNATURE: &[u8] = b"PK\x05\x06";

/// MS-DOS packed date and time, as stored in zip headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant.
    pub const EPOCH: DosDateTime = DosDateTime {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// Pack calendar fields. Years outside 1980..=2107 clamp to the range
    /// ends; seconds lose their lowest bit.
    pub fn from_parts(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Self {
        if year < 1980 {
            return Self::EPOCH;
        }
        if year > 2107 {
            return Self::from_parts(2107, 12, 31, 23, 59, 58);
        }

        let date = (((year - 1980) as u16) << 9) | ((month as u16) << 5) | day as u16;
        let time = ((hour as u16) << 11) | ((minute as u16) << 5) | (second / 2) as u16;
        Self { time, date }
    }

    pub fn from_system_time(time: SystemTime) -> Self {
        let local: DateTime<Local> = time.into();
        Self::from_parts(
            local.year(),
            local.month(),
            local.day(),
            local.hour(),
            local.minute(),
            local.second(),
        )
    }
}

/// Metadata kept per member until the Central Directory is written.
struct CentralEntry {
    name: String,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    modified: DosDateTime,
    lfh_offset: u32,
}

/// Writes a ZIP archive into any [`Write`] sink.
pub struct ZipWriter<W: Write> {
    inner: W,
    offset: u64,
    entries: Vec<CentralEntry>,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            offset: 0,
            entries: Vec::new(),
        }
    }

    /// Deflate everything `reader` yields and store it as `name`.
    ///
    /// # Arguments
    ///
    /// * `name` - Member path inside the archive, `/`-separated
    /// * `reader` - Source of the member's bytes, read to EOF
    /// * `modified` - Timestamp stored in the headers
    ///
    /// # Errors
    ///
    /// [`Error::ArchiveTooLarge`] when the name, the member or the archive
    /// outgrows a non-zip64 field; [`Error::Io`] when reading or writing fails.
    pub fn add_file<R: Read>(&mut self, name: &str, reader: R, modified: DosDateTime) -> Result<()> {
        let io_err = |e: io::Error| Error::io(name, e);

        if name.len() > u16::MAX as usize {
            return Err(Error::ArchiveTooLarge(format!(
                "member name of {} bytes",
                name.len()
            )));
        }
        if self.entries.len() >= u16::MAX as usize {
            return Err(Error::ArchiveTooLarge(format!(
                "more than {} zip members",
                u16::MAX - 1
            )));
        }

        let mut crc_reader = CrcReader::new(reader);
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        let uncompressed_size = io::copy(&mut crc_reader, &mut encoder).map_err(io_err)?;
        let compressed = encoder.finish().map_err(io_err)?;
        let crc32 = crc_reader.crc().sum();

        let uncompressed_size = fit_u32(uncompressed_size, name)?;
        let compressed_size = fit_u32(compressed.len() as u64, name)?;
        let lfh_offset = fit_u32(self.offset, name)?;

        let entry = CentralEntry {
            name: name.to_string(),
            crc32,
            compressed_size,
            uncompressed_size,
            modified,
            lfh_offset,
        };

        write_local_header(&mut self.inner, &entry).map_err(io_err)?;
        self.inner.write_all(&compressed).map_err(io_err)?;

        self.offset += LFH_SIZE + entry.name.len() as u64 + compressed.len() as u64;
        self.entries.push(entry);
        Ok(())
    }

    /// Write the Central Directory and EOCD, returning the sink.
    ///
    /// Until this runs the output is not a readable archive.
    pub fn finish(mut self) -> Result<W> {
        let io_err = |e: io::Error| Error::io(PathBuf::from("<zip central directory>"), e);

        let cd_offset = fit_u32(self.offset, "central directory")?;
        let mut cd_size: u64 = 0;
        for entry in &self.entries {
            write_central_header(&mut self.inner, entry).map_err(io_err)?;
            cd_size += CDFH_SIZE + entry.name.len() as u64;
        }
        let cd_size = fit_u32(cd_size, "central directory")?;

        let total_entries = self.entries.len() as u16;
        write_end_of_central_directory(&mut self.inner, total_entries, cd_size, cd_offset)
            .map_err(io_err)?;

        Ok(self.inner)
    }
}

fn fit_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::ArchiveTooLarge(format!("{what} exceeds 4 GiB zip limit")))
}

fn write_local_header<W: Write>(w: &mut W, entry: &CentralEntry) -> io::Result<()> {
    w.write_all(LFH_SIGNATURE)?;
    w.write_u16::<LittleEndian>(VERSION_NEEDED)?;
    w.write_u16::<LittleEndian>(FLAG_UTF8)?;
    w.write_u16::<LittleEndian>(METHOD_DEFLATE)?;
    w.write_u16::<LittleEndian>(entry.modified.time)?;
    w.write_u16::<LittleEndian>(entry.modified.date)?;
    w.write_u32::<LittleEndian>(entry.crc32)?;
    w.write_u32::<LittleEndian>(entry.compressed_size)?;
    w.write_u32::<LittleEndian>(entry.uncompressed_size)?;
    w.write_u16::<LittleEndian>(entry.name.len() as u16)?;
    w.write_u16::<LittleEndian>(0)?; // extra field length
    w.write_all(entry.name.as_bytes())
}

fn write_end_of_central_directory<W: Write>(
    w: &mut W,
    total_entries: u16,
    cd_size: u32,
    cd_offset: u32,
) -> io::Result<()> {
    w.write_all(EOCD_SIGNATURE)?;
    w.write_u16::<LittleEndian>(0)?; // disk number
    w.write_u16::<LittleEndian>(0)?; // disk with central directory
    w.write_u16::<LittleEndian>(total_entries)?;
    w.write_u16::<LittleEndian>(total_entries)?;
    w.write_u32::<LittleEndian>(cd_size)?;
    w.write_u32::<LittleEndian>(cd_offset)?;
    w.write_u16::<LittleEndian>(0)?; // comment length
    w.flush()
}

fn write_central_header<W: Write>(w: &mut W, entry: &CentralEntry) -> io::Result<()> {
    w.write_all(CDFH_SIGNATURE)?;
    w.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
    w.write_u16::<LittleEndian>(VERSION_NEEDED)?;
    w.write_u16::<LittleEndian>(FLAG_UTF8)?;
    w.write_u16::<LittleEndian>(METHOD_DEFLATE)?;
    w.write_u16::<LittleEndian>(entry.modified.time)?;
    w.write_u16::<LittleEndian>(entry.modified.date)?;
    w.write_u32::<LittleEndian>(entry.crc32)?;
    w.write_u32::<LittleEndian>(entry.compressed_size)?;
    w.write_u32::<LittleEndian>(entry.uncompressed_size)?;
    w.write_u16::<LittleEndian>(entry.name.len() as u16)?;
    w.write_u16::<LittleEndian>(0)?; // extra field length
    w.write_u16::<LittleEndian>(0)?; // file comment length
    w.write_u16::<LittleEndian>(0)?; // disk number start
    w.write_u16::<LittleEndian>(0)?; // internal attributes
    w.write_u32::<LittleEndian>(UNIX_FILE_ATTRS)?;
    w.write_u32::<LittleEndian>(entry.lfh_offset)?;
    w.write_all(entry.name.as_bytes())
}

pub(crate) fn write_zip(members: &[Member]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Vec::new());
    for member in members {
        let file = File::open(&member.path).map_err(|e| Error::io(&member.path, e))?;
        let modified = member
            .metadata
            .modified()
            .map(DosDateTime::from_system_time)
            .unwrap_or(DosDateTime::EPOCH);
        writer.add_file(&member.name, file, modified)?;
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn packs_dos_date_and_time() {
        let packed = DosDateTime::from_parts(2024, 3, 15, 13, 45, 31);
        assert_eq!(packed.date, ((2024 - 1980) << 9) | (3 << 5) | 15);
        assert_eq!(packed.time, (13 << 11) | (45 << 5) | 15);
    }

    #[test]
    fn clamps_dates_before_1980() {
        assert_eq!(DosDateTime::from_parts(1970, 1, 1, 0, 0, 0), DosDateTime::EPOCH);
        assert_eq!(
            DosDateTime::from_system_time(SystemTime::UNIX_EPOCH).date >> 9,
            0
        );
    }

    #[test]
    fn finished_archive_is_readable() {
        let mut writer = ZipWriter::new(Vec::new());
        let stamp = DosDateTime::from_parts(2023, 6, 1, 12, 0, 0);
        writer.add_file("one.txt", &b"first"[..], stamp).unwrap();
        writer.add_file("nested/two.txt", &b""[..], stamp).unwrap();
        let bytes = writer.finish().unwrap();

        let mut archive = ::zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut first = archive.by_name("one.txt").unwrap();
        let mut data = String::new();
        first.read_to_string(&mut data).unwrap();
        assert_eq!(data, "first");
        assert_eq!(first.compression(), ::zip::CompressionMethod::Deflated);
        drop(first);

        let second = archive.by_name("nested/two.txt").unwrap();
        assert_eq!(second.size(), 0);
    }

    #[test]
    fn unfinished_archive_has_no_directory() {
        let mut writer = ZipWriter::new(Vec::new());
        writer
            .add_file("one.txt", &b"first"[..], DosDateTime::EPOCH)
            .unwrap();
        let partial = writer.inner.clone();
        assert!(::zip::ZipArchive::new(Cursor::new(partial)).is_err());
    }

    #[test]
    fn overlong_name_is_rejected_before_writing() {
        let mut writer = ZipWriter::new(Vec::new());
        let name = "n".repeat(u16::MAX as usize + 1);
        let err = writer
            .add_file(&name, &b"data"[..], DosDateTime::EPOCH)
            .unwrap_err();
        assert!(matches!(err, Error::ArchiveTooLarge(_)));
        assert!(writer.inner.is_empty());

        // The longest name that fits is still accepted.
        let name = "n".repeat(u16::MAX as usize);
        writer.add_file(&name, &b"data"[..], DosDateTime::EPOCH).unwrap();
    }

    #[test]
    fn empty_archive_is_just_the_trailer() {
        let bytes = ZipWriter::new(Vec::new()).finish().unwrap();
        assert_eq!(bytes.len(), 22);
        assert_eq!(&bytes[..4], EOCD_SIGNATURE);
        assert_eq!(::zip::ZipArchive::new(Cursor::new(bytes)).unwrap().len(), 0);
    }
}
