//! Voice activity detection
//!
//! Energy gate with a hangover window. Consumers only see the binary
//! start/stop transitions; detection internals are deliberately simple
//! and are not part of the mesh contract.

use crate::config::VadConfig;
use crate::identity::PeerToken;

/// Origin of a voice activity transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceSource {
    /// The local capture stream
    Local,
    /// A remote peer's audio route
    Remote(PeerToken),
}

/// A start/stop speaking transition
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceEvent {
    /// Which stream transitioned
    pub source: VoiceSource,
    /// true = started speaking, false = stopped
    pub active: bool,
    /// The owning route's gain at the moment of the event (1.0 for local)
    pub gain: f32,
}

/// Streaming energy-gate detector
pub struct VoiceActivityDetector {
    open_threshold: f32,
    hang_samples: u64,
    active: bool,
    silent_samples: u64,
}

impl VoiceActivityDetector {
    /// Create a detector from config
    pub fn new(config: &VadConfig) -> Self {
        let hang_samples = u64::from(config.sample_rate) * u64::from(config.hang_ms) / 1000;

        Self {
            open_threshold: config.open_threshold,
            hang_samples,
            active: false,
            silent_samples: 0,
        }
    }

    /// Whether the detector currently considers the stream active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feed one frame of samples.
    ///
    /// Returns `Some(true)` on a start transition, `Some(false)` on a stop
    /// transition, `None` while the state is unchanged.
    pub fn process(&mut self, samples: &[f32]) -> Option<bool> {
        if samples.is_empty() {
            return None;
        }

        let energy: f32 = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        let rms = energy.sqrt();

        if rms >= self.open_threshold {
            self.silent_samples = 0;
            if !self.active {
                self.active = true;
                return Some(true);
            }
        } else if self.active {
            self.silent_samples += samples.len() as u64;
            if self.silent_samples >= self.hang_samples {
                self.active = false;
                self.silent_samples = 0;
                return Some(false);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> VoiceActivityDetector {
        VoiceActivityDetector::new(&VadConfig {
            open_threshold: 0.1,
            hang_ms: 10,
            sample_rate: 48000,
        })
    }

    fn loud(len: usize) -> Vec<f32> {
        vec![0.5; len]
    }

    fn quiet(len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    #[test]
    fn test_speech_triggers_start_once() {
        let mut vad = detector();

        assert_eq!(vad.process(&loud(480)), Some(true));
        assert_eq!(vad.process(&loud(480)), None);
        assert!(vad.is_active());
    }

    #[test]
    fn test_silence_never_starts() {
        let mut vad = detector();

        for _ in 0..10 {
            assert_eq!(vad.process(&quiet(480)), None);
        }
        assert!(!vad.is_active());
    }

    #[test]
    fn test_stop_fires_after_hangover() {
        let mut vad = detector();
        vad.process(&loud(480));

        // 10ms hangover at 48kHz = 480 samples; the first quiet frame
        // reaches the threshold exactly.
        assert_eq!(vad.process(&quiet(480)), Some(false));
        assert!(!vad.is_active());
    }

    #[test]
    fn test_speech_inside_hangover_resets_it() {
        let mut vad = detector();
        vad.process(&loud(480));

        assert_eq!(vad.process(&quiet(240)), None);
        assert_eq!(vad.process(&loud(480)), None); // still active, hang reset
        assert_eq!(vad.process(&quiet(240)), None);
        assert_eq!(vad.process(&quiet(240)), Some(false));
    }

    #[test]
    fn test_empty_frame_is_noop() {
        let mut vad = detector();
        assert_eq!(vad.process(&[]), None);
    }
}
