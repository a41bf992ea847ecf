//! Streaming zstd compressor
//!
//! Wraps a zstd compression context and pushes its output into any
//! `Write` sink. A single compressor call may leave input unconsumed or
//! output pending, so every drain loops until its completion condition
//! holds:
//!
//! - `Continue`: all input bytes consumed. The compressor may keep some
//!   data buffered internally.
//! - `End`: all input consumed and the frame fully flushed (zstd reports
//!   zero bytes of remaining work). The output is then one complete,
//!   self-terminating zstd stream, whatever number of `Continue` drains
//!   preceded it.

use crate::error::{CaptureError, CaptureResult};
use std::io::Write;
use zstd::zstd_safe::zstd_sys::ZSTD_EndDirective;
use zstd::zstd_safe::{self, CCtx, CParameter, InBuffer, OutBuffer};

/// How a drain terminates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Stop once all input is consumed
    Continue,
    /// Stop once the frame is complete
    End,
}

impl DrainMode {
    fn directive(self) -> ZSTD_EndDirective {
        match self {
            DrainMode::Continue => ZSTD_EndDirective::ZSTD_e_continue,
            DrainMode::End => ZSTD_EndDirective::ZSTD_e_end,
        }
    }
}

/// Streaming compression context with its own output staging buffer
pub struct StreamCompressor {
    cctx: CCtx<'static>,
    scratch: Vec<u8>,
    bytes_in: u64,
    bytes_out: u64,
    calls: u64,
    finished: bool,
}

impl StreamCompressor {
    /// Create a compressor at `level` with zstd's recommended output buffer size
    pub fn new(level: i32) -> CaptureResult<Self> {
        Self::with_output_capacity(level, CCtx::out_size())
    }

    /// Create a compressor with an explicit output staging size
    ///
    /// Small capacities force many compressor calls per drain.
    pub fn with_output_capacity(level: i32, capacity: usize) -> CaptureResult<Self> {
        let mut cctx = CCtx::create();
        cctx.set_parameter(CParameter::CompressionLevel(level))
            .map_err(|code| {
                CaptureError::compression(format!(
                    "set level {}: {}",
                    level,
                    zstd_safe::get_error_name(code)
                ))
            })?;
        Ok(StreamCompressor {
            cctx,
            scratch: vec![0u8; capacity.max(1)],
            bytes_in: 0,
            bytes_out: 0,
            calls: 0,
            finished: false,
        })
    }

    /// Feed `input` to the compressor and write everything it produces to `sink`
    ///
    /// Loops until the completion condition of `mode` holds. Returns the
    /// number of compressed bytes written by this drain.
    pub fn drain_until_consumed<W: Write + ?Sized>(
        &mut self,
        input: &[u8],
        mode: DrainMode,
        sink: &mut W,
    ) -> CaptureResult<u64> {
        if self.finished {
            return Err(CaptureError::compression("stream already finished"));
        }

        let directive = mode.directive();
        let mut in_buf = InBuffer::around(input);
        let mut written = 0u64;

        loop {
            let (remaining, produced) = {
                let mut out_buf = OutBuffer::around(&mut self.scratch[..]);
                let remaining = self
                    .cctx
                    .compress_stream2(&mut out_buf, &mut in_buf, directive)
                    .map_err(|code| CaptureError::compression(zstd_safe::get_error_name(code)))?;
                (remaining, out_buf.pos())
            };
            self.calls += 1;

            if produced > 0 {
                sink.write_all(&self.scratch[..produced])?;
                written += produced as u64;
            }

            let consumed = in_buf.pos() == input.len();
            let done = match mode {
                DrainMode::Continue => consumed,
                DrainMode::End => consumed && remaining == 0,
            };
            if done {
                break;
            }
        }

        self.bytes_in += input.len() as u64;
        self.bytes_out += written;
        if mode == DrainMode::End {
            self.finished = true;
        }
        Ok(written)
    }

    /// Total uncompressed bytes accepted
    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    /// Total compressed bytes emitted
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Number of underlying compressor invocations
    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Whether an `End` drain has completed
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl std::fmt::Debug for StreamCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCompressor")
            .field("scratch_len", &self.scratch.len())
            .field("bytes_in", &self.bytes_in)
            .field("bytes_out", &self.bytes_out)
            .field("finished", &self.finished)
            .finish()
    }
}
