//! JSON lines transport: one detection frame per input line, one snapshot per output line.

use async_trait::async_trait;
use blobtrack_env::{DetectionFrame, DetectionSource, EnvError, FrameSnapshot, SnapshotSink};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// Reads detection frames from newline-delimited JSON.
///
/// Blank lines are ignored. Lines that are not UTF-8 or fail to parse are
/// logged and skipped; only a failing reader ends the stream with an error.
pub struct JsonLinesSource<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: u64,
}

impl<R: AsyncBufRead + Unpin> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> DetectionSource for JsonLinesSource<R> {
    async fn recv(&mut self) -> Result<Option<DetectionFrame>, EnvError> {
        loop {
            self.buf.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.buf)
                .await
                .map_err(|e| EnvError::source(format!("line {}: {}", self.line_no + 1, e)))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    warn!(line = self.line_no, error = %e, "skipping non-UTF-8 line");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<DetectionFrame>(line) {
                Ok(frame) => return Ok(Some(frame)),
                Err(e) => warn!(line = self.line_no, error = %e, "skipping unparseable frame"),
            }
        }
    }
}

/// Writes snapshots as newline-delimited JSON.
pub struct JsonLinesSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> SnapshotSink for JsonLinesSink<W> {
    async fn publish(&mut self, snapshot: FrameSnapshot) -> Result<(), EnvError> {
        let mut line = serde_json::to_vec(&snapshot).map_err(|e| EnvError::serialization(e.to_string()))?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blobtrack_core::{TrackerConfig, TrackerNode};

    #[tokio::test]
    async fn test_source_skips_blank_and_bad_lines() {
        let input = b"{\"seq\":0,\"stamp\":0.0,\"detections\":[{\"x\":1.0,\"y\":2.0,\"area\":5.0,\"angle\":0.0}]}\n\
\n\
not json\n\
{\"seq\":1,\"stamp\":0.5}\n";
        let mut source = JsonLinesSource::new(&input[..]);

        let first = source.recv().await.unwrap().unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(first.len(), 1);

        let second = source.recv().await.unwrap().unwrap();
        assert_eq!(second.seq, 1);
        assert!(second.is_empty());

        assert!(source.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_source_continues_past_invalid_utf8() {
        let mut input = b"{\"seq\":0,\"stamp\":0.0}\n".to_vec();
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(b"{\"seq\":2,\"stamp\":0.2}");
        let mut source = JsonLinesSource::new(&input[..]);

        let mut seqs = Vec::new();
        while let Some(frame) = source.recv().await.unwrap() {
            seqs.push(frame.seq);
        }
        assert_eq!(seqs, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_replay_end_to_end() {
        let input = b"{\"seq\":0,\"stamp\":0.0,\"detections\":[{\"x\":1.0,\"y\":1.0,\"area\":5.0,\"angle\":0.0}]}\n\
{\"seq\":1,\"stamp\":0.1,\"detections\":[]}\n\
{\"seq\":2,\"stamp\":0.2,\"detections\":[{\"x\":1.1,\"y\":1.0,\"area\":5.0,\"angle\":0.0}]}\n";
        let source = JsonLinesSource::new(&input[..]);
        let sink = JsonLinesSink::new(Vec::new());
        let mut node = TrackerNode::new(TrackerConfig::default(), source, sink).unwrap();

        while node.step().await.unwrap() {}
        assert_eq!(node.metrics().frames, 3);
        assert_eq!(node.metrics().born, 1);
    }

    #[tokio::test]
    async fn test_sink_writes_one_line_per_snapshot() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.publish(FrameSnapshot { seq: 0, stamp: 0.0, tracks: vec![] }).await.unwrap();
        sink.publish(FrameSnapshot { seq: 1, stamp: 1.0, tracks: vec![] }).await.unwrap();

        let written = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: FrameSnapshot = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.seq, 1);
    }
}
