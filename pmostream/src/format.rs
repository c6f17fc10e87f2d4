//! PCM layout of decoded audio

use crate::error::{Result, StreamError};
use std::time::Duration;

/// Layout of interleaved little-endian PCM produced by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    /// 16-bit interleaved PCM, the layout minimp3 produces
    pub fn s16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Bytes for one sample on every channel
    pub fn block_align(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    pub fn bytes_per_second(&self) -> usize {
        self.block_align() * self.sample_rate as usize
    }

    /// Playback duration of `bytes` of PCM
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let per_second = self.bytes_per_second();
        if per_second == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / per_second as f64)
    }

    /// Byte count for `duration`, rounded down to whole blocks
    pub fn bytes_for(&self, duration: Duration) -> usize {
        let raw = (duration.as_secs_f64() * self.bytes_per_second() as f64) as usize;
        raw - raw % self.block_align().max(1)
    }

    /// Interleaved samples (all channels) covering `duration`
    pub fn samples_for(&self, duration: Duration) -> usize {
        let frames = (duration.as_secs_f64() * self.sample_rate as f64) as usize;
        frames * self.channels as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(StreamError::decode("sample rate must be non-zero"));
        }
        if self.channels == 0 {
            return Err(StreamError::decode("channel count must be non-zero"));
        }
        if self.bits_per_sample != 16 {
            return Err(StreamError::decode(format!(
                "unsupported bit depth {}, expected 16",
                self.bits_per_sample
            )));
        }
        Ok(())
    }
}
