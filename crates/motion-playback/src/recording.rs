use motion_imu::codec::round_raw;
use motion_imu::{FrameRecord, RawSample};
use std::path::Path;

/// Raw samples captured while recording is active.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    samples: Vec<RawSample>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: RawSample) {
        self.samples.push(sample);
    }

    pub fn extend(&mut self, samples: impl IntoIterator<Item = RawSample>) {
        self.samples.extend(samples);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Hand the contents off for export, leaving the buffer empty.
    pub fn take(&mut self) -> Recording {
        Recording {
            samples: std::mem::take(&mut self.samples),
        }
    }
}

/// A finished recording, ready for export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recording {
    samples: Vec<RawSample>,
}

impl Recording {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[RawSample] {
        &self.samples
    }

    /// Rounded raw-domain frames, numbered from 0 in capture order.
    ///
    /// Numbering ignores any timestamp carried by the samples.
    pub fn frames(&self) -> Vec<FrameRecord> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, s)| FrameRecord {
                accel: s.accel.to_array().map(round_raw),
                gyro: s.gyro.to_array().map(round_raw),
                frame_number: i as u32,
            })
            .collect()
    }

    /// Six integers per line, same layout as the input CSV.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(self.samples.len() * 36);
        for frame in self.frames() {
            out.push_str(&frame.to_csv_line());
            out.push('\n');
        }
        out
    }

    pub fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())?;
        tracing::info!(?path, frames = self.len(), "Recording written");
        Ok(())
    }
}

impl From<Vec<RawSample>> for Recording {
    fn from(samples: Vec<RawSample>) -> Self {
        Self { samples }
    }
}
