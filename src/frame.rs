//! Video frame buffers and release accounting.
//!
//! The drone SDK owns every frame it hands out and expects each reference to
//! be returned exactly once. [`FrameRef`] models that contract in Rust terms:
//! a source issues a handle through its [`FrameLedger`], and the handle's
//! `Drop` returns the reference on every exit path: processed, skipped by
//! the rate gate, failed mid-pipeline, or drained by a flush.
//!
//! Plane data is private to the crate; consumers go through
//! [`crate::decode::decode_frame`] to obtain an RGB buffer.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};

/// Pixel layouts the drone camera emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Planar Y plane followed by quarter-resolution U and V planes.
    I420,
    /// Planar Y plane followed by one interleaved half-resolution UV plane.
    Nv12,
}

impl PixelFormat {
    /// Expected byte length of a frame at the given dimensions.
    ///
    /// Both layouts carry one full-resolution luma plane and two
    /// quarter-resolution chroma planes (interleaved or not).
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        let chroma = ((width as usize + 1) / 2) * ((height as usize + 1) / 2);
        luma + 2 * chroma
    }
}

/// A single raw camera frame.
#[derive(Debug)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl VideoFrame {
    /// Wrap raw plane data. Fails when the buffer does not match the
    /// dimensions, so malformed SDK output is caught at the boundary.
    pub fn new(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("frame dimensions must be non-zero"));
        }
        let expected = format.frame_len(width, height);
        if data.len() != expected {
            return Err(anyhow!(
                "{:?} frame {}x{} expects {} bytes, received {}",
                format,
                width,
                height,
                expected,
                data.len()
            ));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Raw plane bytes, for the decoder only.
    pub(crate) fn data(&self) -> &[u8] {
        &self.data
    }
}

// ----------------------------------------------------------------------------
// FrameLedger: issued/released accounting per source
// ----------------------------------------------------------------------------

#[derive(Default)]
struct LedgerCounters {
    issued: AtomicU64,
    released: AtomicU64,
}

/// Per-source accounting of issued versus released frames.
///
/// After a clean teardown (stream stopped, relay flushed) `outstanding()`
/// must read zero, the moral equivalent of the SDK asserting that every
/// `ref()` saw its `unref()`.
#[derive(Clone, Default)]
pub struct FrameLedger {
    counters: Arc<LedgerCounters>,
}

impl FrameLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a handle for a freshly captured frame.
    pub fn issue(&self, frame: VideoFrame) -> FrameRef {
        self.counters.issued.fetch_add(1, Ordering::Relaxed);
        FrameRef {
            frame,
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn issued(&self) -> u64 {
        self.counters.issued.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.counters.released.load(Ordering::Relaxed)
    }

    /// Frames currently alive somewhere in the pipeline.
    pub fn outstanding(&self) -> u64 {
        self.issued().saturating_sub(self.released())
    }
}

/// Single-owner handle to a [`VideoFrame`].
///
/// There is deliberately no `Clone`: one issue, one release. Dropping the
/// handle is the release, so the contract holds on every exit path without
/// call sites having to remember anything.
pub struct FrameRef {
    frame: VideoFrame,
    counters: Arc<LedgerCounters>,
}

impl Deref for FrameRef {
    type Target = VideoFrame;

    fn deref(&self) -> &VideoFrame {
        &self.frame
    }
}

impl Drop for FrameRef {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::Relaxed);
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(format: PixelFormat, width: u32, height: u32) -> VideoFrame {
        let data = vec![128u8; format.frame_len(width, height)];
        VideoFrame::new(format, width, height, data).unwrap()
    }

    #[test]
    fn frame_len_covers_both_layouts() {
        assert_eq!(PixelFormat::I420.frame_len(4, 4), 24);
        assert_eq!(PixelFormat::Nv12.frame_len(4, 4), 24);
        // Odd dimensions round the chroma planes up.
        assert_eq!(PixelFormat::I420.frame_len(5, 5), 25 + 2 * 9);
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let err = VideoFrame::new(PixelFormat::I420, 4, 4, vec![0u8; 10]).unwrap_err();
        assert!(err.to_string().contains("expects 24 bytes"));
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(VideoFrame::new(PixelFormat::Nv12, 0, 4, Vec::new()).is_err());
    }

    #[test]
    fn ledger_counts_issue_and_release() {
        let ledger = FrameLedger::new();
        let frame = ledger.issue(gray_frame(PixelFormat::I420, 4, 4));
        assert_eq!(ledger.issued(), 1);
        assert_eq!(ledger.outstanding(), 1);

        drop(frame);
        assert_eq!(ledger.released(), 1);
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn release_happens_on_error_paths_too() {
        let ledger = FrameLedger::new();
        let result: Result<()> = (|| {
            let _frame = ledger.issue(gray_frame(PixelFormat::Nv12, 4, 4));
            Err(anyhow!("mid-pipeline failure"))
        })();
        assert!(result.is_err());
        assert_eq!(ledger.outstanding(), 0);
    }
}
