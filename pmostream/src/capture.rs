//! WAV capture of everything the output consumes

use crate::error::{Result, StreamError};
use crate::format::PcmFormat;
use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

type Writer = WavWriter<BufWriter<File>>;

/// Capture file fed from the playback callback.
///
/// The writer sits behind a mutex so the callback and [`finish`](Self::finish)
/// cannot interleave; once finished, further writes are ignored.
pub struct CaptureTap {
    path: PathBuf,
    format: PcmFormat,
    writer: Mutex<Option<Writer>>,
    error: Mutex<Option<StreamError>>,
    samples: AtomicU64,
}

impl CaptureTap {
    /// Creates (or truncates) the WAV file at `path`.
    pub fn create(path: impl Into<PathBuf>, format: PcmFormat) -> Result<Self> {
        format.validate()?;
        let path = path.into();
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: format.bits_per_sample,
            sample_format: SampleFormat::Int,
        };
        let writer = WavWriter::create(&path, spec)
            .map_err(|e| StreamError::Capture(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Capture file opened: {}", path.display());
        Ok(Self {
            path,
            format,
            writer: Mutex::new(Some(writer)),
            error: Mutex::new(None),
            samples: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Appends interleaved 16-bit little-endian PCM.
    ///
    /// The first failure closes the capture and is kept for
    /// [`take_error`](Self::take_error).
    pub fn write(&self, pcm: &[u8]) {
        let mut guard = self.writer.lock();
        let Some(writer) = guard.as_mut() else {
            return;
        };

        let mut written = 0u64;
        let mut failure = None;
        for sample in pcm.chunks_exact(2) {
            if let Err(err) = writer.write_sample(i16::from_le_bytes([sample[0], sample[1]])) {
                failure = Some(err);
                break;
            }
            written += 1;
        }
        self.samples.fetch_add(written, Ordering::Relaxed);

        if let Some(err) = failure {
            *guard = None;
            *self.error.lock() = Some(StreamError::Capture(format!(
                "{}: {}",
                self.path.display(),
                err
            )));
        }
    }

    /// Interleaved samples written so far
    pub fn samples_written(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn is_open(&self) -> bool {
        self.writer.lock().is_some()
    }

    /// Flushes the header and closes the file.
    ///
    /// Returns `Ok(false)` if it was already closed.
    pub fn finish(&self) -> Result<bool> {
        let Some(writer) = self.writer.lock().take() else {
            return Ok(false);
        };
        writer
            .finalize()
            .map_err(|e| StreamError::Capture(format!("{}: {}", self.path.display(), e)))?;
        tracing::debug!(
            "Capture file closed: {} ({} samples)",
            self.path.display(),
            self.samples_written()
        );
        Ok(true)
    }

    pub fn take_error(&self) -> Option<StreamError> {
        self.error.lock().take()
    }
}

impl Drop for CaptureTap {
    fn drop(&mut self) {
        if let Err(err) = self.finish() {
            tracing::warn!("Capture file not finalized: {}", err);
        }
    }
}
