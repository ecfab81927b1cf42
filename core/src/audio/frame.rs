use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

/// A chunk of 16-bit little-endian PCM audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub data: Vec<u8>,
    pub sample_rate: u32,
    pub samples_per_channel: u32,
    pub num_channels: u16,
    pub timestamp: Duration,
}

impl AudioFrame {
    /// Builds a frame from interleaved samples.
    pub fn from_samples(
        samples: &[i16],
        sample_rate: u32,
        num_channels: u16,
        timestamp: Duration,
    ) -> Self {
        let channels = num_channels.max(1) as usize;
        let data = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self {
            data,
            sample_rate,
            samples_per_channel: (samples.len() / channels) as u32,
            num_channels,
            timestamp,
        }
    }

    /// A frame of digital silence covering `duration`.
    pub fn silence(sample_rate: u32, num_channels: u16, duration: Duration) -> Self {
        let per_channel = (sample_rate as u128 * duration.as_micros() / 1_000_000) as usize;
        let samples = vec![0i16; per_channel * num_channels.max(1) as usize];
        Self::from_samples(&samples, sample_rate, num_channels, Duration::ZERO)
    }

    /// Decodes the payload into samples; a trailing odd byte is ignored.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.samples_per_channel as u64 * 1_000_000_000 / self.sample_rate as u64)
    }

    /// Root-mean-square level normalised to [0, 1].
    pub fn rms(&self) -> f32 {
        let mut count = 0usize;
        let mut sum = 0f64;
        for sample in self.samples() {
            let s = sample as f64 / i16::MAX as f64;
            sum += s * s;
            count += 1;
        }
        if count == 0 {
            return 0.0;
        }
        (sum / count as f64).sqrt() as f32
    }
}

/// Inbound audio endpoint.
///
/// Every consumer (the voice-activity detector, each transcription feeder)
/// takes its own subscription, so frames are never split between them.
/// The source is exhausted once every sender has been dropped.
pub struct AudioInput {
    receiver: broadcast::Receiver<AudioFrame>,
}

impl AudioInput {
    /// Creates a connected sender/input pair buffering up to `capacity` frames per subscriber.
    pub fn channel(capacity: usize) -> (broadcast::Sender<AudioFrame>, AudioInput) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (tx, AudioInput { receiver: rx })
    }

    pub fn from_receiver(receiver: broadcast::Receiver<AudioFrame>) -> Self {
        Self { receiver }
    }

    /// A fresh subscription that observes frames sent from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.receiver.resubscribe()
    }
}

impl std::fmt::Debug for AudioInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioInput").finish_non_exhaustive()
    }
}

/// Outbound audio sink.
pub type AudioOutput = mpsc::Sender<AudioFrame>;
