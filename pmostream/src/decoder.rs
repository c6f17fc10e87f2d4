//! Frame-by-frame MP3 decoding
//!
//! minimp3 wants a synchronous `Read`, while the network body arrives on an
//! async channel. [`ChannelReader`] bridges the two with `blocking_recv`, so
//! decoders built on it must run on a blocking thread.

use crate::error::{Result, StreamError};
use crate::format::PcmFormat;
use bytes::Bytes;
use minimp3::{Decoder as MiniMp3Decoder, Error as MiniMp3Error};
use std::io::{self, Read};
use tokio::sync::mpsc;

/// One decompressed container frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub format: PcmFormat,
    /// Interleaved little-endian PCM
    pub pcm: Vec<u8>,
}

/// Pull-based decoder producing one frame per call.
///
/// `Ok(None)` marks a clean end of stream.
pub trait FrameDecoder: Send {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>>;
}

/// Adapter from an mpsc channel of byte chunks to `std::io::Read`
pub struct ChannelReader {
    rx: mpsc::Receiver<Result<Bytes>>,
    current: Bytes,
    offset: usize,
    finished: bool,
}

impl ChannelReader {
    pub fn new(rx: mpsc::Receiver<Result<Bytes>>) -> Self {
        Self {
            rx,
            current: Bytes::new(),
            offset: 0,
            finished: false,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.offset < self.current.len() {
                let n = buf.len().min(self.current.len() - self.offset);
                buf[..n].copy_from_slice(&self.current[self.offset..self.offset + n]);
                self.offset += n;
                return Ok(n);
            }

            if self.finished {
                return Ok(0);
            }

            match self.rx.blocking_recv() {
                Some(Ok(bytes)) => {
                    if bytes.is_empty() {
                        continue;
                    }
                    self.current = bytes;
                    self.offset = 0;
                }
                Some(Err(err)) => {
                    self.finished = true;
                    return Err(io::Error::new(io::ErrorKind::Other, err.to_string()));
                }
                None => {
                    self.finished = true;
                    return Ok(0);
                }
            }
        }
    }
}

/// MP3 decoder over any byte source
pub struct Mp3FrameDecoder<R: Read> {
    inner: MiniMp3Decoder<R>,
}

impl<R: Read> Mp3FrameDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: MiniMp3Decoder::new(reader),
        }
    }
}

impl<R: Read + Send> FrameDecoder for Mp3FrameDecoder<R> {
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>> {
        loop {
            match self.inner.next_frame() {
                Ok(frame) => {
                    if frame.channels == 0 || frame.sample_rate <= 0 {
                        return Err(StreamError::decode(format!(
                            "MP3 frame reported {} channels at {} Hz",
                            frame.channels, frame.sample_rate
                        )));
                    }
                    let format = PcmFormat::s16(frame.sample_rate as u32, frame.channels as u16);
                    let mut pcm = Vec::with_capacity(frame.data.len() * 2);
                    for sample in &frame.data {
                        pcm.extend_from_slice(&sample.to_le_bytes());
                    }
                    return Ok(Some(DecodedFrame { format, pcm }));
                }
                Err(MiniMp3Error::Eof) => return Ok(None),
                Err(MiniMp3Error::InsufficientData) | Err(MiniMp3Error::SkippedData) => continue,
                // The only reader underneath is the network body
                Err(MiniMp3Error::Io(err)) => return Err(StreamError::Transport(err.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_channel_reader_concatenates_chunks() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(Bytes::from_static(b"abc"))).await.unwrap();
        tx.send(Ok(Bytes::new())).await.unwrap();
        tx.send(Ok(Bytes::from_static(b"def"))).await.unwrap();
        drop(tx);

        let out = tokio::task::spawn_blocking(move || {
            let mut reader = ChannelReader::new(rx);
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap();
            out
        })
        .await
        .unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_channel_reader_surfaces_transport_error() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(Bytes::from_static(b"ab"))).await.unwrap();
        tx.send(Err(StreamError::transport("connection reset")))
            .await
            .unwrap();
        drop(tx);

        let err = tokio::task::spawn_blocking(move || {
            let mut reader = ChannelReader::new(rx);
            let mut out = Vec::new();
            reader.read_to_end(&mut out).unwrap_err()
        })
        .await
        .unwrap();
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn test_garbage_yields_no_frames() {
        let garbage = vec![0x42u8; 8 * 1024];
        let mut decoder = Mp3FrameDecoder::new(std::io::Cursor::new(garbage));
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn test_empty_input_is_end_of_stream() {
        let mut decoder = Mp3FrameDecoder::new(std::io::Cursor::new(Vec::<u8>::new()));
        assert_eq!(decoder.next_frame().unwrap(), None);
    }
}
