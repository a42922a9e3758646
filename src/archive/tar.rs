//! gzip-compressed tar writer.
//!
//! Headers carry the member name, size, a fixed `0644` mode and the file's
//! mtime. Ownership and original permissions are not replicated.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, Read, Take};
use std::time::UNIX_EPOCH;

use crate::error::{Error, Result};

use super::Member;

const MEMBER_MODE: u32 = 0o644;

/// Yields exactly the byte count declared in a tar header.
///
/// A file that grew since it was opened is cut at the declared size. One that
/// shrank fails with [`io::ErrorKind::UnexpectedEof`] instead of leaving the
/// entry short, which would misalign every header after it.
struct DeclaredSize<R> {
    inner: Take<R>,
    declared: u64,
}

impl<R: Read> DeclaredSize<R> {
    fn new(inner: R, declared: u64) -> Self {
        Self {
            inner: inner.take(declared),
            declared,
        }
    }
}

impl<R: Read> Read for DeclaredSize<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() && self.inner.limit() > 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "file shrank while archiving: {} of {} bytes missing",
                    self.inner.limit(),
                    self.declared
                ),
            ));
        }
        Ok(n)
    }
}

pub(crate) fn write_tar_gz(members: &[Member]) -> Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = ::tar::Builder::new(encoder);

    for member in members {
        let io_err = |e: io::Error| Error::io(&member.path, e);

        // Size and mtime come from the open handle, not the earlier walk.
        let file = File::open(&member.path).map_err(io_err)?;
        let metadata = file.metadata().map_err(io_err)?;
        let size = metadata.len();

        let mut header = ::tar::Header::new_gnu();
        header.set_size(size);
        header.set_mode(MEMBER_MODE);
        header.set_entry_type(::tar::EntryType::Regular);
        if let Ok(mtime) = metadata.modified() {
            let secs = mtime
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            header.set_mtime(secs);
        }

        builder
            .append_data(&mut header, &member.name, DeclaredSize::new(file, size))
            .map_err(io_err)?;
    }

    // The tar trailer must be written before the gzip stream is closed.
    let encoder = builder
        .into_inner()
        .map_err(|e| Error::io("<tar trailer>", e))?;
    encoder
        .finish()
        .map_err(|e| Error::io("<gzip trailer>", e))
}
