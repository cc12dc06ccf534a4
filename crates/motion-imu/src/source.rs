use crate::codec::{self, CodecError};
use crate::resp::{ProtocolError, RespConnection};
use crate::types::{MotionFrame, RawSample};
use motion_config::QueueConfig;
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Sample queue at {addr} unreachable: {reason}")]
    Unavailable { addr: String, reason: String },
    #[error("Sample queue did not answer in time")]
    Timeout,
    #[error("Sample queue closed the connection")]
    Closed,
    #[error("Sample queue error: {0}")]
    Server(String),
    #[error("Unexpected reply from sample queue: {0}")]
    UnexpectedReply(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The two kinds of motion source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Live,
    Recorded,
}

/// Where samples come from: an unbounded live queue or a finite recorded sequence.
pub enum MotionSource {
    Live(LiveQueueSource),
    Recorded(RecordedSequenceSource),
}

impl MotionSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            MotionSource::Live(_) => SourceKind::Live,
            MotionSource::Recorded(_) => SourceKind::Recorded,
        }
    }

    /// Frame count for recorded sources; `None` for the unbounded live queue.
    pub fn len(&self) -> Option<usize> {
        match self {
            MotionSource::Live(_) => None,
            MotionSource::Recorded(source) => Some(source.len()),
        }
    }

    /// Rewind a recorded source. Live sources have nothing to rewind.
    pub fn reset(&mut self) {
        if let MotionSource::Recorded(source) = self {
            source.reset();
        }
    }
}

impl From<LiveQueueSource> for MotionSource {
    fn from(source: LiveQueueSource) -> Self {
        MotionSource::Live(source)
    }
}

impl From<RecordedSequenceSource> for MotionSource {
    fn from(source: RecordedSequenceSource) -> Self {
        MotionSource::Recorded(source)
    }
}

/// In-process stand-in for the external queue, with the same FIFO pop semantics.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug, Clone, Default)]
pub struct MemoryQueue {
    entries: Arc<Mutex<VecDeque<String>>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a serialized sample, as the producer would.
    pub fn push(&self, payload: impl Into<String>) {
        self.lock().push_back(payload.into());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop(&self) -> Option<String> {
        self.lock().pop_front()
    }

    // Every critical section is a single deque call, so a poisoned lock still guards valid data.
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Memory queue lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[derive(Debug)]
enum QueueBackend {
    Redis(RespConnection),
    Memory(MemoryQueue),
}

/// Pull-based consumer of the live sample queue.
#[derive(Debug)]
pub struct LiveQueueSource {
    backend: QueueBackend,
    key: String,
    polled: u64,
}

impl LiveQueueSource {
    /// Connect to the queue server described by `config`.
    pub async fn connect(config: &QueueConfig) -> Result<Self, SourceError> {
        let io_timeout = Duration::from_millis(config.io_timeout_ms);
        let conn = RespConnection::connect(&config.addr(), io_timeout).await?;
        tracing::info!(addr = %conn.addr(), key = %config.key, "Connected to sample queue");
        Ok(Self {
            backend: QueueBackend::Redis(conn),
            key: config.key.clone(),
            polled: 0,
        })
    }

    /// Create a source backed by an in-process queue (no server required).
    pub fn in_memory(queue: MemoryQueue) -> Self {
        Self {
            backend: QueueBackend::Memory(queue),
            key: String::new(),
            polled: 0,
        }
    }

    async fn pop(&mut self) -> Result<Option<String>, SourceError> {
        match &mut self.backend {
            QueueBackend::Redis(conn) => conn.rpop(&self.key).await,
            QueueBackend::Memory(queue) => Ok(queue.pop()),
        }
    }

    /// Pop everything currently queued and hand each valid sample to `visit`,
    /// oldest first. Malformed entries are skipped. Returns the number visited.
    ///
    /// On a transport error the entries popped so far in this call are lost.
    pub async fn drain_with(
        &mut self,
        mut visit: impl FnMut(RawSample),
    ) -> Result<usize, SourceError> {
        let mut count = 0usize;
        while let Some(payload) = self.pop().await? {
            match codec::parse_queue_payload(&payload) {
                Ok(sample) => {
                    visit(sample);
                    count += 1;
                }
                Err(e) => tracing::trace!(?e, "Skipping malformed queue entry"),
            }
        }
        self.polled += count as u64;
        Ok(count)
    }

    /// Pop everything currently queued, oldest first.
    pub async fn drain(&mut self) -> Result<Vec<RawSample>, SourceError> {
        let mut samples = Vec::new();
        self.drain_with(|sample| samples.push(sample)).await?;
        Ok(samples)
    }

    /// Drain the queue and keep only the most recent sample, without buffering the backlog.
    pub async fn poll_next(&mut self) -> Result<Option<RawSample>, SourceError> {
        let mut latest = None;
        self.drain_with(|sample| latest = Some(sample)).await?;
        Ok(latest)
    }

    /// Total valid samples pulled off the queue so far.
    pub fn polled(&self) -> u64 {
        self.polled
    }
}

/// Finite, ordered, randomly indexable list of frames with a playback cursor.
#[derive(Debug, Clone, Default)]
pub struct RecordedSequenceSource {
    frames: Vec<MotionFrame>,
    cursor: usize,
}

impl RecordedSequenceSource {
    /// Load a headerless CSV file of six integers per row.
    pub fn from_csv_path(path: &Path) -> Result<Self, SourceError> {
        let file = std::fs::File::open(path)?;
        let source = Self::from_csv_reader(std::io::BufReader::new(file))?;
        tracing::info!(?path, frames = source.len(), "Loaded motion frames");
        Ok(source)
    }

    /// Read CSV rows from any buffered reader, skipping rows that do not parse.
    ///
    /// Rows that are not valid UTF-8 are skipped like any other malformed row;
    /// only read failures abort the load.
    pub fn from_csv_reader<R: BufRead>(reader: R) -> Result<Self, SourceError> {
        let mut frames = Vec::new();
        let mut skipped = 0usize;

        for (line_no, row) in reader.split(b'\n').enumerate() {
            let bytes = row?;
            let bytes = bytes.strip_suffix(b"\r").unwrap_or(&bytes);
            let line = String::from_utf8_lossy(bytes);
            match codec::parse_csv_line(&line) {
                Ok(fields) => frames.push(MotionFrame {
                    frame_number: frames.len() as u32,
                    fields,
                    sample: codec::decode_csv_frame(fields),
                }),
                Err(e) => {
                    skipped += 1;
                    log_skipped_row(line_no, &e);
                }
            }
        }

        if skipped > 0 {
            tracing::debug!(skipped, kept = frames.len(), "Skipped malformed CSV rows");
        }
        if frames.is_empty() {
            tracing::warn!("Recorded sequence is empty");
        }

        Ok(Self { frames, cursor: 0 })
    }

    /// Build from numbered raw records, ordered by frame number rather than input order.
    pub fn from_records(records: impl IntoIterator<Item = (u32, [i32; 6])>) -> Self {
        let mut frames: Vec<MotionFrame> = records
            .into_iter()
            .map(|(frame_number, fields)| MotionFrame {
                frame_number,
                fields,
                sample: codec::decode_csv_frame(fields),
            })
            .collect();
        frames.sort_by_key(|f| f.frame_number);

        if frames.is_empty() {
            tracing::warn!("Recorded sequence is empty");
        }
        Self { frames, cursor: 0 }
    }

    /// Return the frame under the cursor and advance; `None` once past the end.
    pub fn poll_next(&mut self) -> Option<MotionFrame> {
        let frame = self.frames.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(frame)
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.frames.len()
    }

    pub fn frames(&self) -> &[MotionFrame] {
        &self.frames
    }
}

fn log_skipped_row(line_no: usize, error: &CodecError) {
    tracing::trace!(line = line_no + 1, %error, "Skipping CSV row");
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::io::Cursor;

    fn payload(ax: f32, gz: f32) -> String {
        format!(
            r#"{{"accel_x":{ax},"accel_y":32768,"accel_z":32768,"gyro_x":32768,"gyro_y":32768,"gyro_z":{gz},"temperature":25.0}}"#
        )
    }

    #[test]
    fn empty_csv_yields_empty_source() {
        let mut source = RecordedSequenceSource::from_csv_reader(Cursor::new("")).unwrap();
        assert_eq!(source.len(), 0);
        assert!(source.poll_next().is_none());
        assert!(source.is_exhausted());
    }

    #[test]
    fn csv_skips_malformed_rows() {
        let text = "32768,32768,32768,0,0,0\n\
                    garbage\n\
                    1,2,3\n\
                    42768,32768,32768,65535,0,0\n\
                    1,2,three,4,5,6\n";
        let source = RecordedSequenceSource::from_csv_reader(Cursor::new(text)).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.frames()[1].fields, [42768, 32768, 32768, 65535, 0, 0]);
        assert_eq!(source.frames()[1].frame_number, 1);
        assert!((source.frames()[1].sample.acceleration.x - 1.0).abs() < 1e-6);
    }

    #[test]
    fn csv_skips_rows_that_are_not_utf8() {
        let bytes = &b"32768,32768,32768,0,0,0\n\xff\xfe,garbage\n42768,32768,32768,0,0,0\r\n"[..];
        let source = RecordedSequenceSource::from_csv_reader(Cursor::new(bytes)).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.frames()[0].fields[0], 32768);
        assert_eq!(source.frames()[1].fields[0], 42768);
        assert_eq!(source.frames()[1].frame_number, 1);
    }

    #[test]
    fn cursor_advances_and_rewinds() {
        let text = "1,1,1,1,1,1\n2,2,2,2,2,2\n";
        let mut source = RecordedSequenceSource::from_csv_reader(Cursor::new(text)).unwrap();

        assert_eq!(source.poll_next().unwrap().fields[0], 1);
        assert_eq!(source.cursor(), 1);
        assert_eq!(source.poll_next().unwrap().fields[0], 2);
        assert!(source.poll_next().is_none());
        assert!(source.poll_next().is_none());
        assert_eq!(source.cursor(), 2);

        source.reset();
        assert_eq!(source.cursor(), 0);
        assert_eq!(source.poll_next().unwrap().fields[0], 1);
    }

    #[test]
    fn records_sort_by_frame_number() {
        let source = RecordedSequenceSource::from_records([
            (2, [3, 0, 0, 0, 0, 0]),
            (0, [1, 0, 0, 0, 0, 0]),
            (1, [2, 0, 0, 0, 0, 0]),
        ]);
        let order: Vec<i32> = source.frames().iter().map(|f| f.fields[0]).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn missing_csv_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = RecordedSequenceSource::from_csv_path(&dir.path().join("absent.csv"));
        assert!(matches!(result, Err(SourceError::Io(_))));
    }

    #[test]
    fn motion_source_reports_kind_and_length() {
        let recorded: MotionSource = RecordedSequenceSource::from_records([(0, [0; 6])]).into();
        assert_eq!(recorded.kind(), SourceKind::Recorded);
        assert_eq!(recorded.len(), Some(1));

        let live: MotionSource = LiveQueueSource::in_memory(MemoryQueue::new()).into();
        assert_eq!(live.kind(), SourceKind::Live);
        assert_eq!(live.len(), None);
    }

    #[tokio::test]
    async fn drain_returns_everything_oldest_first() {
        let queue = MemoryQueue::new();
        let mut source = LiveQueueSource::in_memory(queue.clone());
        queue.push(payload(1.0, 10.0));
        queue.push(payload(2.0, 20.0));
        queue.push(payload(3.0, 30.0));

        let drained = source.drain().await.unwrap();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[0].accel.x, 1.0);
        assert_eq!(drained[2].accel.x, 3.0);
        assert!(queue.is_empty());
        assert_eq!(source.polled(), 3);
    }

    #[tokio::test]
    async fn poll_coalesces_to_latest() {
        let queue = MemoryQueue::new();
        let mut source = LiveQueueSource::in_memory(queue.clone());
        queue.push(payload(1.0, 10.0));
        queue.push("{broken");
        queue.push(payload(3.0, 30.0));

        let latest = source.poll_next().await.unwrap().unwrap();
        assert_eq!(latest.accel, Vec3::new(3.0, 32768.0, 32768.0));
        assert_eq!(latest.gyro.z, 30.0);
        assert_eq!(latest.temperature, Some(25.0));

        assert!(source.poll_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn poll_next_empties_a_large_backlog() {
        let queue = MemoryQueue::new();
        let mut source = LiveQueueSource::in_memory(queue.clone());
        for i in 0..10_000 {
            queue.push(payload(i as f32, 0.0));
        }

        let latest = source.poll_next().await.unwrap().unwrap();
        assert_eq!(latest.accel.x, 9_999.0);
        assert!(queue.is_empty());
        assert_eq!(source.polled(), 10_000);
    }

    #[test]
    fn memory_queue_survives_a_poisoned_lock() {
        let queue = MemoryQueue::new();
        queue.push(payload(1.0, 0.0));

        let holder = queue.clone();
        let result = std::thread::spawn(move || {
            let _guard = holder.entries.lock().unwrap();
            panic!("producer crashed while holding the lock");
        })
        .join();
        assert!(result.is_err());
        assert!(queue.entries.is_poisoned());

        queue.push(payload(2.0, 0.0));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().as_deref(), Some(payload(1.0, 0.0).as_str()));
    }
}
