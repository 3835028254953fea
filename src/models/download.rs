//! Full-model download with MD5 verification
//!
//! The response body is streamed into a temporary file next to the
//! destination while its MD5 is computed. The temporary file is renamed into
//! place only once the checksum matches, so readers never observe a partial
//! or corrupt model.

use crate::error::{Error, Result};
use md5::{Digest, Md5};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Download `url` to `dest`, verifying against `expected_md5` when given
///
/// # Arguments
/// * `url` - Source of the model file
/// * `dest` - Final path; its parent directory must exist
/// * `proxy` - Optional proxy URL applied to all schemes
/// * `expected_md5` - Lowercase hex digest, or `None` to skip verification
pub fn download_model(
    url: &str,
    dest: &Path,
    proxy: Option<&str>,
    expected_md5: Option<&str>,
) -> Result<()> {
    tracing::info!(url = %url, path = %dest.display(), via_proxy = proxy.is_some(), "Downloading model");
    let start = Instant::now();

    let download_err = |source| Error::Download {
        url: url.to_string(),
        source,
    };

    let mut builder = reqwest::blocking::Client::builder().timeout(None::<Duration>);
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy).map_err(download_err)?);
    }
    let client = builder.build().map_err(download_err)?;

    let mut response = client.get(url).send().map_err(download_err)?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let bytes = write_verified(&mut response, url, dest, expected_md5)?;
    crate::metrics::record_download();
    tracing::info!(
        path = %dest.display(),
        bytes,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Model downloaded"
    );
    Ok(())
}

/// Stream `source` into `dest` atomically, checking its MD5 first
///
/// Read failures are reported as [`Error::Transfer`] against `url`; write
/// failures as [`Error::Io`] against the temporary file. Returns the number
/// of bytes written.
pub(crate) fn write_verified<R: Read>(
    source: &mut R,
    url: &str,
    dest: &Path,
    expected_md5: Option<&str>,
) -> Result<u64> {
    let dir = dest
        .parent()
        .ok_or_else(|| Error::Config(format!("{} has no parent directory", dest.display())))?;

    let tmp = tempfile::Builder::new()
        .prefix(".lid-download-")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(|source| Error::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    let tmp_path = tmp.path().to_path_buf();
    let io_err = |source: io::Error| Error::Io {
        path: tmp_path.clone(),
        source,
    };

    let mut writer = HashingWriter::new(tmp);
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut bytes = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(Error::Transfer {
                    url: url.to_string(),
                    source: e,
                });
            }
        };
        writer.write_all(&buf[..n]).map_err(io_err)?;
        bytes += n as u64;
    }
    writer.flush().map_err(io_err)?;
    let (tmp, digest) = writer.finish();
    tmp.as_file().sync_all().map_err(io_err)?;

    if let Some(expected) = expected_md5
        && !digest.eq_ignore_ascii_case(expected)
    {
        if let Err(e) = tmp.close() {
            tracing::warn!(path = %tmp_path.display(), error = %e, "Failed to remove rejected download");
        }
        return Err(Error::Integrity {
            path: dest.to_path_buf(),
            expected: expected.to_string(),
            actual: digest,
        });
    }

    tmp.persist(dest).map_err(|e| Error::Io {
        path: dest.to_path_buf(),
        source: e.error,
    })?;
    Ok(bytes)
}

/// Lowercase hex MD5 of a file
pub fn file_md5(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut writer = HashingWriter::new(io::sink());
    io::copy(&mut BufReader::new(file), &mut writer).map_err(|e| Error::io(path, e))?;
    Ok(writer.finish().1)
}

/// Writer adapter that hashes everything passing through it
struct HashingWriter<W> {
    inner: W,
    hasher: Md5,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Md5::new(),
        }
    }

    fn finish(self) -> (W, String) {
        (self.inner, format!("{:x}", self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
