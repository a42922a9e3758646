//! On-demand archive encoding.
//!
//! Archives are assembled entirely in memory: the caller gets back one
//! finished byte buffer. Memory use therefore grows with the archive size,
//! and every request rebuilds from scratch.
//!
//! ## Member layout
//!
//! - A single top-level file is stored under its base name.
//! - A single top-level directory is walked recursively (lexical order) and
//!   each regular file is stored under its path relative to the directory,
//!   with `/` separators. Directories themselves are not stored.
//! - When several top-level paths are archived together, each one is rooted
//!   under its own base name (`a.txt`, `dir1/x.txt`).
//!
//! Anything that is neither a regular file nor a directory aborts the whole
//! build with [`Error::UnsupportedFileType`].

mod tar;
mod zip;

use std::fmt;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub use self::zip::{DosDateTime, ZipWriter};

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    pub const ALL: [ArchiveFormat; 2] = [ArchiveFormat::Zip, ArchiveFormat::TarGz];

    /// Value of the `archive` query parameter and the file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "application/zip",
            ArchiveFormat::TarGz => "application/gzip",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ArchiveFormat::ALL
            .into_iter()
            .find(|format| format.extension() == s)
            .ok_or_else(|| Error::LookupNotFound(format!("archive format {s:?}")))
    }
}

/// One archive build: which paths, in which format.
#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub paths: Vec<PathBuf>,
    pub format: ArchiveFormat,
}

impl ArchiveRequest {
    pub fn new(paths: Vec<PathBuf>, format: ArchiveFormat) -> Self {
        Self { paths, format }
    }

    /// Encode the request into a finished archive.
    pub fn build(&self) -> Result<Vec<u8>> {
        build_archive(&self.paths, self.format)
    }
}

/// A file to be stored, with its name inside the archive.
#[derive(Debug)]
pub(crate) struct Member {
    pub name: String,
    pub path: PathBuf,
    pub metadata: Metadata,
}

/// Build an archive of `paths` in `format`.
///
/// The whole file set is collected before encoding starts, so a bad member
/// fails the build without producing partial output.
///
/// # Arguments
///
/// * `paths` - Files or directories. One path is stored relative to itself;
///   several are each rooted under their base name
/// * `format` - Encoding of the returned bytes
///
/// # Errors
///
/// * [`Error::Io`] - A path or member could not be read
/// * [`Error::UnsupportedFileType`] - A member is neither file nor directory
/// * [`Error::ArchiveTooLarge`] - The zip would need zip64
pub fn build_archive<P: AsRef<Path>>(paths: &[P], format: ArchiveFormat) -> Result<Vec<u8>> {
    let members = collect_members(paths)?;
    let bytes = match format {
        ArchiveFormat::Zip => zip::write_zip(&members)?,
        ArchiveFormat::TarGz => tar::write_tar_gz(&members)?,
    };
    debug!(
        "built {} archive: {} members, {} bytes",
        format,
        members.len(),
        bytes.len()
    );
    Ok(bytes)
}

pub(crate) fn collect_members<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Member>> {
    let rooted = paths.len() > 1;
    let mut members = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let metadata = fs::metadata(path).map_err(|e| Error::io(path, e))?;
        let base = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| Error::PathResolution {
                path: path.to_path_buf(),
                reason: "path has no final segment".to_string(),
            })?;

        if metadata.is_file() {
            members.push(Member {
                name: base,
                path: path.to_path_buf(),
                metadata,
            });
        } else if metadata.is_dir() {
            let prefix = rooted.then_some(base.as_str());
            walk_directory(path, prefix, &mut members)?;
        } else {
            return Err(Error::UnsupportedFileType(path.to_path_buf()));
        }
    }

    Ok(members)
}

fn walk_directory(root: &Path, prefix: Option<&str>, members: &mut Vec<Member>) -> Result<()> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io(path, e.into())
        })?;

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            return Err(Error::UnsupportedFileType(entry.into_path()));
        }

        let metadata = entry.metadata().map_err(|e| {
            let path = entry.path().to_path_buf();
            Error::io(path, e.into())
        })?;
        let relative = slash_path(entry.path().strip_prefix(root).unwrap_or(entry.path()));
        let name = match prefix {
            Some(prefix) => format!("{prefix}/{relative}"),
            None => relative,
        };

        members.push(Member {
            name,
            path: entry.into_path(),
            metadata,
        });
    }

    Ok(())
}

/// Join the components of a relative path with `/`.
fn slash_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let dir1 = dir.path().join("dir1");
        fs::create_dir_all(dir1.join("sub").join("deeper")).unwrap();
        fs::write(dir1.join("x.txt"), b"x content").unwrap();
        fs::write(dir1.join("sub").join("y.txt"), b"y content").unwrap();
        fs::write(dir1.join("sub").join("deeper").join("z.bin"), [0u8, 1, 2, 255]).unwrap();
        dir
    }

    fn unzip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = ::zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut out = Vec::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            out.push((file.name().to_string(), data));
        }
        out
    }

    fn untar(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut archive = ::tar::Archive::new(flate2::read::GzDecoder::new(bytes));
        let mut out = Vec::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            out.push((name, data));
        }
        out
    }

    #[test]
    fn parses_query_format_names() {
        assert_eq!("zip".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Zip);
        assert_eq!(
            "tar.gz".parse::<ArchiveFormat>().unwrap(),
            ArchiveFormat::TarGz
        );
        assert!(matches!(
            "rar".parse::<ArchiveFormat>(),
            Err(Error::LookupNotFound(_))
        ));
        assert!("ZIP".parse::<ArchiveFormat>().is_err());
        assert_eq!(ArchiveFormat::TarGz.mime_type(), "application/gzip");
        assert_eq!(ArchiveFormat::Zip.mime_type(), "application/zip");
    }

    #[test]
    fn single_file_zip_round_trips() {
        let dir = fixture();
        let bytes = build_archive(&[dir.path().join("a.txt")], ArchiveFormat::Zip).unwrap();
        assert_eq!(unzip(&bytes), vec![("a.txt".to_string(), b"hello".to_vec())]);
    }

    #[test]
    fn single_file_tar_gz_round_trips() {
        let dir = fixture();
        let bytes = build_archive(&[dir.path().join("a.txt")], ArchiveFormat::TarGz).unwrap();
        assert_eq!(untar(&bytes), vec![("a.txt".to_string(), b"hello".to_vec())]);
    }

    #[test]
    fn directory_members_are_relative_with_forward_slashes() {
        let dir = fixture();
        let expected = vec![
            ("sub/deeper/z.bin".to_string(), vec![0u8, 1, 2, 255]),
            ("sub/y.txt".to_string(), b"y content".to_vec()),
            ("x.txt".to_string(), b"x content".to_vec()),
        ];

        let request = ArchiveRequest::new(vec![dir.path().join("dir1")], ArchiveFormat::Zip);
        assert_eq!(unzip(&request.build().unwrap()), expected);

        let request = ArchiveRequest::new(vec![dir.path().join("dir1")], ArchiveFormat::TarGz);
        assert_eq!(untar(&request.build().unwrap()), expected);
    }

    #[test]
    fn combined_archive_roots_each_entry_under_its_name() {
        let dir = fixture();
        let paths = vec![dir.path().join("a.txt"), dir.path().join("dir1")];

        for format in ArchiveFormat::ALL {
            let bytes = build_archive(&paths, format).unwrap();
            let names: Vec<String> = match format {
                ArchiveFormat::Zip => unzip(&bytes),
                ArchiveFormat::TarGz => untar(&bytes),
            }
            .into_iter()
            .map(|(name, _)| name)
            .collect();

            assert_eq!(
                names,
                vec![
                    "a.txt",
                    "dir1/sub/deeper/z.bin",
                    "dir1/sub/y.txt",
                    "dir1/x.txt"
                ]
            );
        }
    }

    #[test]
    fn empty_directory_yields_valid_empty_archive() {
        let dir = TempDir::new().unwrap();
        let empty = dir.path().join("empty");
        fs::create_dir(&empty).unwrap();

        let zip = build_archive(&[&empty], ArchiveFormat::Zip).unwrap();
        assert!(unzip(&zip).is_empty());

        let tgz = build_archive(&[&empty], ArchiveFormat::TarGz).unwrap();
        assert!(untar(&tgz).is_empty());
    }

    #[test]
    fn missing_path_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let err = build_archive(&[dir.path().join("gone")], ArchiveFormat::Zip).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn sockets_are_rejected() {
        use std::os::unix::net::UnixListener;

        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("sock");
        let _listener = UnixListener::bind(&socket).unwrap();

        let err = build_archive(&[&socket], ArchiveFormat::TarGz).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFileType(_)));
    }

    #[cfg(unix)]
    #[test]
    fn socket_inside_directory_aborts_whole_build() {
        use std::os::unix::net::UnixListener;

        let dir = fixture();
        let _listener = UnixListener::bind(dir.path().join("dir1").join("sock")).unwrap();

        for format in ArchiveFormat::ALL {
            let err = build_archive(&[dir.path().join("dir1")], format).unwrap_err();
            assert!(matches!(err, Error::UnsupportedFileType(_)));
        }
    }

    #[test]
    fn slash_path_joins_components() {
        let relative: PathBuf = ["a", "b", "c.txt"].iter().collect();
        assert_eq!(slash_path(&relative), "a/b/c.txt");
    }
}
