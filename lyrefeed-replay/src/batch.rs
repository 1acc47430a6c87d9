//! Bounded output buffer.
//!
//! Output frames are collected and written as JSON lines in batches. The
//! buffer is flushed when it reaches capacity, when a Shutdown frame passes
//! through, and when the host loop ends.

use lyrefeed::{Frame, FrameSink, FrameType, PipelineError, Result};
use std::io::Write;

/// Frame sink writing JSON lines in bounded batches.
pub struct BatchingSink<W: Write> {
    writer: W,
    buffer: Vec<Frame>,
    capacity: usize,
    frames_written: u64,
    batches_written: u64,
}

impl<W: Write> BatchingSink<W> {
    pub fn new(writer: W, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            writer,
            buffer: Vec::with_capacity(capacity),
            capacity,
            frames_written: 0,
            batches_written: 0,
        }
    }

    /// Frames waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn batches_written(&self) -> u64 {
        self.batches_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_batch(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        for frame in self.buffer.drain(..) {
            let line = frame.to_json()?;
            writeln!(self.writer, "{line}")?;
            self.frames_written += 1;
        }
        self.writer.flush()?;
        self.batches_written += 1;
        Ok(())
    }
}

impl<W: Write> FrameSink for BatchingSink<W> {
    fn send(&mut self, frames: Vec<Frame>) -> Result<()> {
        let mut shutdown = false;
        for frame in frames {
            shutdown |= frame.frame_type() == FrameType::Shutdown;
            self.buffer.push(frame);
            if self.buffer.len() >= self.capacity {
                self.write_batch()?;
            }
        }
        if shutdown {
            self.write_batch()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.write_batch().map_err(|e| match e {
            PipelineError::Io(io) => PipelineError::SinkClosed(io.to_string()),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(bytes: &[u8]) -> Vec<&str> {
        std::str::from_utf8(bytes).unwrap().lines().collect()
    }

    #[test]
    fn test_flush_at_capacity() {
        let mut sink = BatchingSink::new(Vec::new(), 3);
        sink.send(vec![Frame::new(FrameType::Scan), Frame::new(FrameType::Scan)])
            .unwrap();
        assert_eq!(sink.pending(), 2);
        assert_eq!(sink.frames_written(), 0);

        sink.send(vec![Frame::new(FrameType::Scan); 2]).unwrap();
        assert_eq!(sink.pending(), 1);
        assert_eq!(sink.frames_written(), 3);
        assert_eq!(sink.batches_written(), 1);
    }

    #[test]
    fn test_shutdown_flushes() {
        let mut sink = BatchingSink::new(Vec::new(), 100);
        sink.send(vec![Frame::new(FrameType::Calibration)]).unwrap();
        sink.send(vec![Frame::shutdown()]).unwrap();
        assert_eq!(sink.pending(), 0);

        let out = sink.into_inner();
        let lines = lines(&out);
        assert_eq!(lines.len(), 2);
        assert_eq!(Frame::from_json(lines[1]).unwrap(), Frame::shutdown());
    }

    #[test]
    fn test_explicit_flush() {
        let mut sink = BatchingSink::new(Vec::new(), 100);
        sink.send(vec![Frame::new(FrameType::Housekeeping)]).unwrap();
        sink.flush().unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.batches_written(), 1);
        assert_eq!(lines(&sink.into_inner()).len(), 1);
    }
}
