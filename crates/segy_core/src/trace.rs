use crate::header::FieldValues;
use crate::keys::TraceKey;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TraceStatus {
    Live,
    /// Present on disk, every sample exactly 0.
    Dead,
    /// No trace at this key; samples are synthesized zeros.
    Missing,
}

/// One trace over a z-window: `samples[i]` sits at `z_start + i * z_delta`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace {
    pub key: TraceKey,
    pub z_start: f32,
    pub z_delta: f32,
    pub samples: Vec<f32>,
    pub status: TraceStatus,
    pub header: FieldValues,
}

impl Trace {
    /// A trace to be written; status follows the samples.
    pub fn new(key: TraceKey, z_start: f32, z_delta: f32, samples: Vec<f32>) -> Self {
        let status = classify(&samples);
        Self { key, z_start, z_delta, samples, status, header: FieldValues::new() }
    }

    pub fn missing(key: TraceKey, z_start: f32, z_delta: f32, len: usize) -> Self {
        Self {
            key,
            z_start,
            z_delta,
            samples: vec![0.0; len],
            status: TraceStatus::Missing,
            header: FieldValues::new(),
        }
    }

    pub fn with_header(mut self, header: FieldValues) -> Self {
        self.header = header;
        self
    }

    pub fn z_end(&self) -> f32 {
        self.z_start + self.samples.len().saturating_sub(1) as f32 * self.z_delta
    }

    pub fn is_missing(&self) -> bool { self.status == TraceStatus::Missing }
}

pub fn classify(samples: &[f32]) -> TraceStatus {
    if samples.iter().all(|s| *s == 0.0) { TraceStatus::Dead } else { TraceStatus::Live }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_samples() {
        let k = TraceKey::cdp(1);
        assert_eq!(Trace::new(k, 0.0, 4.0, vec![0.0, -0.0]).status, TraceStatus::Dead);
        assert_eq!(Trace::new(k, 0.0, 4.0, vec![0.0, 1e-30]).status, TraceStatus::Live);
        let m = Trace::missing(k, 8.0, 4.0, 3);
        assert!(m.is_missing());
        assert_eq!(m.samples, vec![0.0; 3]);
        assert_eq!(m.z_end(), 16.0);
    }
}
