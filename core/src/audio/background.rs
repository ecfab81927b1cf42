//! Background ambience mixed under synthesized speech.
//!
//! [`LoopingBackground`] plays a preloaded set of frames in a loop. Decoding
//! the source material is left to the caller; only PCM frames are accepted.

use parking_lot::Mutex;

use super::frame::AudioFrame;

/// Optional background-audio source consulted by the speech streamer.
pub trait BackgroundAudio: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Mixes the next background frame into `foreground`.
    fn mix(&self, foreground: AudioFrame) -> AudioFrame;
}

#[derive(Debug, Clone)]
pub struct BackgroundConfig {
    pub frames: Vec<AudioFrame>,
    /// Clamped to [0, 1].
    pub volume: f32,
    pub enabled: bool,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            frames: Vec::new(),
            volume: 0.3,
            enabled: false,
        }
    }
}

struct LoopState {
    frames: Vec<AudioFrame>,
    position: usize,
    volume: f32,
    enabled: bool,
}

pub struct LoopingBackground {
    state: Mutex<LoopState>,
}

impl LoopingBackground {
    pub fn new(config: BackgroundConfig) -> Self {
        Self {
            state: Mutex::new(LoopState {
                frames: config.frames,
                position: 0,
                volume: config.volume.clamp(0.0, 1.0),
                enabled: config.enabled,
            }),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state.lock().enabled = enabled;
    }

    pub fn set_volume(&self, volume: f32) {
        self.state.lock().volume = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    /// Next looped frame at the current volume, or `None` when disabled or empty.
    pub fn next_frame(&self) -> Option<AudioFrame> {
        let mut state = self.state.lock();
        if !state.enabled || state.frames.is_empty() {
            return None;
        }
        let frame = state.frames[state.position].clone();
        state.position = (state.position + 1) % state.frames.len();
        let volume = state.volume;
        drop(state);
        Some(scale_volume(&frame, volume))
    }
}

impl BackgroundAudio for LoopingBackground {
    fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    fn mix(&self, foreground: AudioFrame) -> AudioFrame {
        match self.next_frame() {
            Some(background) => mix_frames(&foreground, &background),
            None => foreground,
        }
    }
}

/// Averages two PCM frames sample by sample.
///
/// Only the overlapping prefix is mixed; any remaining foreground samples are
/// copied unchanged. The result keeps the foreground's format.
pub fn mix_frames(foreground: &AudioFrame, background: &AudioFrame) -> AudioFrame {
    let overlap = foreground.data.len().min(background.data.len()) & !1;
    let mut data = Vec::with_capacity(foreground.data.len());
    for (a, b) in foreground.data[..overlap]
        .chunks_exact(2)
        .zip(background.data[..overlap].chunks_exact(2))
    {
        let a = i16::from_le_bytes([a[0], a[1]]) as i32;
        let b = i16::from_le_bytes([b[0], b[1]]) as i32;
        let mixed = ((a + b) / 2).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        data.extend_from_slice(&mixed.to_le_bytes());
    }
    data.extend_from_slice(&foreground.data[overlap..]);
    AudioFrame {
        data,
        ..foreground.clone()
    }
}

/// Scales every sample by `volume` in Q15 fixed point.
pub fn scale_volume(frame: &AudioFrame, volume: f32) -> AudioFrame {
    let factor = (volume.clamp(0.0, 1.0) * 32768.0) as i32;
    let mut data = Vec::with_capacity(frame.data.len());
    for pair in frame.data.chunks_exact(2) {
        let sample = i16::from_le_bytes([pair[0], pair[1]]) as i32;
        let scaled = (sample * factor / 32768).clamp(i16::MIN as i32, i16::MAX as i32) as i16;
        data.extend_from_slice(&scaled.to_le_bytes());
    }
    AudioFrame {
        data,
        ..frame.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(samples: &[i16]) -> AudioFrame {
        AudioFrame::from_samples(samples, 48_000, 1, Duration::ZERO)
    }

    #[test]
    fn disabled_or_empty_source_yields_nothing() {
        let empty = LoopingBackground::new(BackgroundConfig {
            enabled: true,
            ..Default::default()
        });
        assert!(empty.next_frame().is_none());

        let disabled = LoopingBackground::new(BackgroundConfig {
            frames: vec![frame(&[100; 4])],
            ..Default::default()
        });
        assert!(!disabled.is_enabled());
        assert!(disabled.next_frame().is_none());
        disabled.set_enabled(true);
        assert!(disabled.next_frame().is_some());
    }

    #[test]
    fn volume_is_clamped() {
        let bg = LoopingBackground::new(BackgroundConfig {
            volume: 1.7,
            ..Default::default()
        });
        assert_eq!(bg.volume(), 1.0);
        bg.set_volume(-0.5);
        assert_eq!(bg.volume(), 0.0);
        bg.set_volume(0.5);
        assert_eq!(bg.volume(), 0.5);
    }

    #[test]
    fn frames_loop_in_order() {
        let bg = LoopingBackground::new(BackgroundConfig {
            frames: vec![frame(&[10]), frame(&[20])],
            volume: 1.0,
            enabled: true,
        });
        let seen: Vec<i16> = (0..4)
            .filter_map(|_| bg.next_frame())
            .flat_map(|f| f.samples().collect::<Vec<_>>())
            .collect();
        assert_eq!(seen, vec![10, 20, 10, 20]);
    }

    #[test]
    fn mix_averages_overlap_and_keeps_foreground_tail() {
        let fg = frame(&[1000, -1000, 500, 7]);
        let bg = frame(&[3000, 1000]);
        let mixed = mix_frames(&fg, &bg);
        assert_eq!(mixed.samples().collect::<Vec<_>>(), vec![2000, 0, 500, 7]);
        assert_eq!(mixed.sample_rate, fg.sample_rate);
        assert_eq!(mixed.data.len(), fg.data.len());
    }

    #[test]
    fn mix_does_not_overflow() {
        let fg = frame(&[i16::MAX, i16::MIN]);
        let bg = frame(&[i16::MAX, i16::MIN]);
        let mixed = mix_frames(&fg, &bg);
        assert_eq!(mixed.samples().collect::<Vec<_>>(), vec![i16::MAX, i16::MIN]);
    }

    #[test]
    fn scale_volume_extremes() {
        let f = frame(&[1234, -4321, i16::MAX]);
        let full = scale_volume(&f, 1.0);
        assert_eq!(full.data, f.data);
        let muted = scale_volume(&f, 0.0);
        assert!(muted.samples().all(|s| s == 0));
        let half = scale_volume(&frame(&[2000]), 0.5);
        assert_eq!(half.samples().collect::<Vec<_>>(), vec![1000]);
    }

    #[test]
    fn mix_through_trait_uses_next_background_frame() {
        let bg = LoopingBackground::new(BackgroundConfig {
            frames: vec![frame(&[2000, 2000])],
            volume: 1.0,
            enabled: true,
        });
        let out = bg.mix(frame(&[0, 0]));
        assert_eq!(out.samples().collect::<Vec<_>>(), vec![1000, 1000]);
    }
}
