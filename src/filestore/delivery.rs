//! Streams an already-authorized file: content-type detection, transfer headers,
//! then the body in chunked or bulk mode.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::limits::ExecutionLimits;
use super::mime::MimeDetectorChain;
use super::sink::{BodyWriter, ResponseSink};
use crate::config::{DownloadType, Settings};

/// Bytes per read in chunked mode.
pub const CHUNK_SIZE: usize = 1024;

/// Seconds granted before each chunk while the host is in safe mode.
pub const TIME_LIMIT_EXTENSION_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("file not found: {}", .0.display())]
    ResourceMissing(PathBuf),
    #[error("cannot read {}: {source}", path.display())]
    ResourceAccess {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("response stream aborted: {0}")]
    Stream(#[source] io::Error),
}

impl DeliveryError {
    fn access(path: &Path, source: io::Error) -> Self {
        DeliveryError::ResourceAccess { path: path.to_path_buf(), source }
    }
}

pub struct FileDelivery {
    mime: MimeDetectorChain,
    download_type: DownloadType,
}

impl FileDelivery {
    pub fn new(mime: MimeDetectorChain, download_type: DownloadType) -> Self {
        Self { mime, download_type }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(MimeDetectorChain::from_settings(settings), settings.download_type)
    }

    pub fn download_type(&self) -> DownloadType { self.download_type }

    /// Deliver `path` into `sink`, returning the number of body bytes written.
    ///
    /// Images are sent inline (no `Content-Disposition`) and always in bulk mode.
    /// A missing file fails before any header is set or the file is opened.
    pub fn deliver<S>(&self, path: &Path, is_image: bool, limits: &dyn ExecutionLimits, sink: &mut S) -> Result<u64, DeliveryError>
    where
        S: ResponseSink + ?Sized,
    {
        if !path.is_file() {
            warn!(target: "filewarden::delivery", "requested file does not exist: {}", path.display());
            return Err(DeliveryError::ResourceMissing(path.to_path_buf()));
        }

        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let mime = self.mime.resolve(path);

        let mut file = File::open(path).map_err(|e| DeliveryError::access(path, e))?;
        let size = file.metadata().map_err(|e| DeliveryError::access(path, e))?.len();

        sink.set_header("Content-Description", "File Transfer".to_string());
        sink.set_header("Content-Type", mime);
        if !is_image {
            sink.set_header("Content-Disposition", format!("attachment; filename=\"{}\"", disposition_name(&file_name)));
        }
        sink.set_header("Content-Transfer-Encoding", "binary".to_string());
        sink.set_header("Content-Length", size.to_string());

        let chunked = self.download_type == DownloadType::Chunked && !is_image;
        sink.clear_buffer();
        sink.flush().map_err(DeliveryError::Stream)?;

        let sent = if chunked {
            stream_chunked(&mut file, path, limits, sink)?
        } else {
            stream_bulk(&mut file, path, limits, sink)?
        };
        info!(
            target: "filewarden::delivery",
            "delivered {} bytes of {} (mode={}, inline={})",
            sent, path.display(), if chunked { "chunked" } else { "bulk" }, is_image
        );
        Ok(sent)
    }
}

/// File name as it appears in `Content-Disposition`: spaces become underscores,
/// and quotes or line breaks cannot break out of the header.
pub fn disposition_name(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| match c {
            ' ' | '"' | '\r' | '\n' => '_',
            other => other,
        })
        .collect()
}

fn stream_chunked<R, S>(file: &mut R, path: &Path, limits: &dyn ExecutionLimits, sink: &mut S) -> Result<u64, DeliveryError>
where
    R: Read,
    S: ResponseSink + ?Sized,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        if limits.safe_mode() {
            limits.extend_time_limit(TIME_LIMIT_EXTENSION_SECS);
        }
        if limits.expired() {
            warn!(target: "filewarden::delivery", "time budget exhausted after {} bytes of {}", sent, path.display());
            return Err(DeliveryError::Stream(budget_exhausted()));
        }
        let n = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DeliveryError::access(path, e)),
        };
        if let Err(e) = sink.write_body(&buf[..n]) {
            debug!(target: "filewarden::delivery", "client went away after {} bytes of {}: {}", sent, path.display(), e);
            return Err(DeliveryError::Stream(e));
        }
        sent += n as u64;
    }
    Ok(sent)
}

fn budget_exhausted() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "execution time limit reached")
}

/// Tells apart the file side of an `io::copy` failure and enforces the time
/// budget between reads.
struct TrackedReader<'a, R: Read> {
    inner: &'a mut R,
    limits: &'a dyn ExecutionLimits,
    failed: bool,
    expired: bool,
}

impl<R: Read> Read for TrackedReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.limits.expired() {
            self.expired = true;
            return Err(budget_exhausted());
        }
        self.inner.read(buf).inspect_err(|_| self.failed = true)
    }
}

fn stream_bulk<R, S>(file: &mut R, path: &Path, limits: &dyn ExecutionLimits, sink: &mut S) -> Result<u64, DeliveryError>
where
    R: Read,
    S: ResponseSink + ?Sized,
{
    let mut reader = TrackedReader { inner: file, limits, failed: false, expired: false };
    match io::copy(&mut reader, &mut BodyWriter(sink)) {
        Ok(n) => Ok(n),
        Err(e) if reader.expired => {
            warn!(target: "filewarden::delivery", "time budget exhausted while sending {}", path.display());
            Err(DeliveryError::Stream(e))
        }
        Err(e) if reader.failed => Err(DeliveryError::access(path, e)),
        Err(e) => Err(DeliveryError::Stream(e)),
    }
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
