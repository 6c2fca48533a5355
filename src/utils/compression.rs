//! Streaming deflate/gzip compressor for world transfer.
//!
//! The world transfer engine pulls compressed output through a fixed window
//! (one level chunk at a time), so the compressor is incremental: feed it the
//! full snapshot once, then call [`Compressor::update`] with an output buffer
//! until [`Compressor::is_done`] reports completion.
//!
//! Gzip output is the raw deflate stream wrapped in a 10-byte header and a
//! CRC-32/ISIZE trailer, both streamed through the same window.

use flate2::{Compress, Compression, FlushCompress, Status};
use std::io::Read;

use crate::error::{ProtocolError, Result};

/// Upper bound on decompressed output accepted by [`decompress`].
const MAX_DECOMPRESSION_SIZE: usize = 64 * 1024 * 1024;

const GZIP_HEADER: [u8; 10] = [0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompressionKind {
    /// Raw deflate, used by clients that negotiated fast map loading.
    Deflate,
    /// Gzip envelope, used by every other client.
    Gzip,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CompressorState {
    Idle,
    InProgress,
    Done,
}

/// Incremental compressor over an owned input buffer.
pub struct Compressor {
    kind: CompressionKind,
    engine: Compress,
    input: Vec<u8>,
    consumed: usize,
    crc: crc32fast::Hasher,
    header_sent: usize,
    trailer: Option<[u8; 8]>,
    trailer_sent: usize,
    deflate_done: bool,
    state: CompressorState,
}

impl Compressor {
    pub fn new(kind: CompressionKind) -> Self {
        Self {
            kind,
            engine: Compress::new(Compression::default(), false),
            input: Vec::new(),
            consumed: 0,
            crc: crc32fast::Hasher::new(),
            header_sent: 0,
            trailer: None,
            trailer_sent: 0,
            deflate_done: false,
            state: CompressorState::Idle,
        }
    }

    pub fn kind(&self) -> CompressionKind {
        self.kind
    }

    pub fn state(&self) -> CompressorState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == CompressorState::Done
    }

    /// Replace the input and restart the stream.
    pub fn set_input(&mut self, input: Vec<u8>) {
        self.reset();
        self.input = input;
        self.state = CompressorState::InProgress;
    }

    pub fn total_input(&self) -> usize {
        self.input.len()
    }

    /// Input bytes already fed through the deflate engine.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Input bytes not yet consumed.
    pub fn queued(&self) -> usize {
        self.input.len() - self.consumed
    }

    /// Fill `out` with as much compressed output as is available.
    /// Returns the number of bytes written, which can be zero.
    pub fn update(&mut self, out: &mut [u8]) -> Result<usize> {
        match self.state {
            CompressorState::Idle => {
                return Err(ProtocolError::CompressionFailure(
                    "compressor has no input".into(),
                ))
            }
            CompressorState::Done => return Ok(0),
            CompressorState::InProgress => {}
        }

        let mut written = 0;

        if self.kind == CompressionKind::Gzip && self.header_sent < GZIP_HEADER.len() {
            let n = copy_pending(&GZIP_HEADER[self.header_sent..], &mut out[written..]);
            self.header_sent += n;
            written += n;
        }

        if !self.deflate_done && written < out.len() {
            let before_in = self.engine.total_in();
            let before_out = self.engine.total_out();
            let status = self
                .engine
                .compress(
                    &self.input[self.consumed..],
                    &mut out[written..],
                    FlushCompress::Finish,
                )
                .map_err(|e| ProtocolError::CompressionFailure(e.to_string()))?;

            let read = (self.engine.total_in() - before_in) as usize;
            let produced = (self.engine.total_out() - before_out) as usize;
            self.crc
                .update(&self.input[self.consumed..self.consumed + read]);
            self.consumed += read;
            written += produced;

            match status {
                Status::StreamEnd => {
                    self.deflate_done = true;
                    if self.kind == CompressionKind::Gzip {
                        self.trailer = Some(self.gzip_trailer());
                    }
                }
                Status::BufError if read == 0 && produced == 0 => {
                    return Err(ProtocolError::CompressionFailure(
                        "deflate stream made no progress".into(),
                    ));
                }
                _ => {}
            }
        }

        if self.deflate_done {
            match self.trailer {
                Some(trailer) => {
                    let n = copy_pending(&trailer[self.trailer_sent..], &mut out[written..]);
                    self.trailer_sent += n;
                    written += n;
                    if self.trailer_sent == trailer.len() {
                        self.state = CompressorState::Done;
                    }
                }
                None => self.state = CompressorState::Done,
            }
        }

        Ok(written)
    }

    /// Release the input and return to the idle state.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.input = Vec::new();
        self.consumed = 0;
        self.crc = crc32fast::Hasher::new();
        self.header_sent = 0;
        self.trailer = None;
        self.trailer_sent = 0;
        self.deflate_done = false;
        self.state = CompressorState::Idle;
    }

    fn gzip_trailer(&self) -> [u8; 8] {
        let mut trailer = [0u8; 8];
        trailer[..4].copy_from_slice(&self.crc.clone().finalize().to_le_bytes());
        trailer[4..].copy_from_slice(&(self.input.len() as u32).to_le_bytes());
        trailer
    }
}

fn copy_pending(pending: &[u8], out: &mut [u8]) -> usize {
    let n = pending.len().min(out.len());
    out[..n].copy_from_slice(&pending[..n]);
    n
}

/// Compresses data in one call
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if the deflate engine fails
pub fn compress(data: &[u8], kind: CompressionKind) -> Result<Vec<u8>> {
    let mut compressor = Compressor::new(kind);
    compressor.set_input(data.to_vec());
    let mut out = Vec::with_capacity(data.len() / 2 + 64);
    let mut window = [0u8; 16 * 1024];
    while !compressor.is_done() {
        let n = compressor.update(&mut window)?;
        out.extend_from_slice(&window[..n]);
    }
    Ok(out)
}

/// Decompresses data produced by [`compress`] or by a level transfer
///
/// Enforces an output size limit so a hostile stream cannot exhaust memory.
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if the stream is invalid or too large
pub fn decompress(data: &[u8], kind: CompressionKind) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let limit = (MAX_DECOMPRESSION_SIZE + 1) as u64;
    let result = match kind {
        CompressionKind::Deflate => flate2::read::DeflateDecoder::new(data)
            .take(limit)
            .read_to_end(&mut out),
        CompressionKind::Gzip => flate2::read::GzDecoder::new(data)
            .take(limit)
            .read_to_end(&mut out),
    };
    result.map_err(|e| ProtocolError::CompressionFailure(e.to_string()))?;
    if out.len() > MAX_DECOMPRESSION_SIZE {
        return Err(ProtocolError::CompressionFailure(
            "decompressed output exceeds limit".into(),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_world() -> Vec<u8> {
        (0..64 * 64 * 64).map(|i: u32| (i % 7) as u8).collect()
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn deflate_window_round_trip() {
        let data = sample_world();
        let mut compressor = Compressor::new(CompressionKind::Deflate);
        compressor.set_input(data.clone());

        let mut stream = Vec::new();
        let mut window = [0u8; 1024];
        while !compressor.is_done() {
            let n = compressor.update(&mut window).unwrap();
            stream.extend_from_slice(&window[..n]);
        }

        assert_eq!(compressor.consumed(), data.len());
        assert_eq!(compressor.queued(), 0);
        assert_eq!(decompress(&stream, CompressionKind::Deflate).unwrap(), data);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn gzip_envelope_is_valid() {
        let data = sample_world();
        let stream = compress(&data, CompressionKind::Gzip).unwrap();
        assert_eq!(&stream[..2], &[0x1F, 0x8B]);
        assert_eq!(decompress(&stream, CompressionKind::Gzip).unwrap(), data);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn tiny_window_still_completes() {
        let data = b"hello hello hello hello".to_vec();
        let mut compressor = Compressor::new(CompressionKind::Gzip);
        compressor.set_input(data.clone());
        let mut stream = Vec::new();
        let mut window = [0u8; 3];
        while !compressor.is_done() {
            let n = compressor.update(&mut window).unwrap();
            stream.extend_from_slice(&window[..n]);
        }
        assert_eq!(decompress(&stream, CompressionKind::Gzip).unwrap(), data);
    }

    #[test]
    fn update_without_input_fails() {
        let mut compressor = Compressor::new(CompressionKind::Deflate);
        let mut window = [0u8; 16];
        assert!(matches!(
            compressor.update(&mut window),
            Err(ProtocolError::CompressionFailure(_))
        ));
    }

    #[test]
    fn invalid_stream_is_rejected() {
        let garbage = [0xFFu8; 32];
        assert!(decompress(&garbage, CompressionKind::Gzip).is_err());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn reset_returns_to_idle() {
        let mut compressor = Compressor::new(CompressionKind::Deflate);
        compressor.set_input(vec![1, 2, 3]);
        let mut window = [0u8; 64];
        compressor.update(&mut window).unwrap();
        compressor.reset();
        assert_eq!(compressor.state(), CompressorState::Idle);
        assert_eq!(compressor.total_input(), 0);
    }
}
