//! Per-peer audio route
//!
//! One route per remote peer: decoded audio passes through a positional
//! pan stage and a gain stage before reaching the shared mix destination.
//! The voice activity detector listens to the post-gain signal, so muted
//! routes never report speech.

use super::stream::{AudioFrame, RemoteStream};
use super::vad::{VoiceActivityDetector, VoiceEvent, VoiceSource};
use crate::identity::PeerToken;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Distance at which attenuation starts
const REF_DISTANCE: f32 = 0.1;

/// Distance at which linear attenuation bottoms out
const MAX_DISTANCE: f32 = 2.66 * 2.0;

/// Linear rolloff factor
const ROLLOFF: f32 = 1.0;

/// Lock-free gain and pan controls shared between the policy writer and
/// the audio task
pub struct RouteControls {
    gain: AtomicU32,
    pan_x: AtomicU32,
    pan_y: AtomicU32,
    pan_z: AtomicU32,
}

impl RouteControls {
    /// New controls: unity gain, centered position
    pub fn new() -> Self {
        Self {
            gain: AtomicU32::new(1.0f32.to_bits()),
            pan_x: AtomicU32::new(0.0f32.to_bits()),
            pan_y: AtomicU32::new(0.0f32.to_bits()),
            pan_z: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    /// Current gain
    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    /// Set the gain
    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    /// Current position
    pub fn pan(&self) -> (f32, f32, f32) {
        (
            f32::from_bits(self.pan_x.load(Ordering::Relaxed)),
            f32::from_bits(self.pan_y.load(Ordering::Relaxed)),
            f32::from_bits(self.pan_z.load(Ordering::Relaxed)),
        )
    }

    /// Set the position
    pub fn set_pan(&self, pan: (f32, f32, f32)) {
        self.pan_x.store(pan.0.to_bits(), Ordering::Relaxed);
        self.pan_y.store(pan.1.to_bits(), Ordering::Relaxed);
        self.pan_z.store(pan.2.to_bits(), Ordering::Relaxed);
    }
}

impl Default for RouteControls {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear distance attenuation over the planar offset
pub(crate) fn distance_attenuation(x: f32, y: f32) -> f32 {
    let distance = (x * x + y * y).sqrt().clamp(REF_DISTANCE, MAX_DISTANCE);
    1.0 - ROLLOFF * (distance - REF_DISTANCE) / (MAX_DISTANCE - REF_DISTANCE)
}

/// Constant-power left/right weights from the planar offset
pub(crate) fn stereo_weights(x: f32, y: f32) -> (f32, f32) {
    let distance = (x * x + y * y).sqrt();
    let p = if distance > f32::EPSILON {
        (x / distance).clamp(-1.0, 1.0)
    } else {
        0.0
    };

    let angle = (p + 1.0) * std::f32::consts::FRAC_PI_4;
    (angle.cos(), angle.sin())
}

/// The gain + pan processing chain for one remote peer
pub struct AudioRoute {
    controls: Arc<RouteControls>,
    task: JoinHandle<()>,
}

impl AudioRoute {
    /// Spawn the processing task for a remote stream.
    ///
    /// Processed stereo frames go to `mix_out` (the monitored playback
    /// destination); start/stop transitions from `vad` go to `events`
    /// tagged with the gain at the moment of the transition.
    pub fn spawn(
        token: PeerToken,
        mut remote: RemoteStream,
        mix_out: mpsc::UnboundedSender<AudioFrame>,
        mut vad: VoiceActivityDetector,
        events: mpsc::UnboundedSender<VoiceEvent>,
    ) -> Self {
        let controls = Arc::new(RouteControls::new());
        let shared = controls.clone();

        let task = tokio::spawn(async move {
            while let Some(frame) = remote.frames.recv().await {
                let gain = shared.gain();
                let (x, y, _z) = shared.pan();
                let scale = gain * distance_attenuation(x, y);
                let (left, right) = stereo_weights(x, y);

                let mut monitor = Vec::with_capacity(frame.samples.len());
                let mut stereo = Vec::with_capacity(frame.samples.len() * 2);
                for &sample in &frame.samples {
                    let s = sample * scale;
                    monitor.push(s);
                    stereo.push(s * left);
                    stereo.push(s * right);
                }

                if mix_out.send(AudioFrame::stereo(stereo)).is_err() {
                    break;
                }

                if let Some(active) = vad.process(&monitor) {
                    let event = VoiceEvent {
                        source: VoiceSource::Remote(token.clone()),
                        active,
                        gain: shared.gain(),
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
            }

            debug!("Audio route task for {} terminated", token);
        });

        Self { controls, task }
    }

    /// Shared handle to the gain/pan controls
    pub fn controls(&self) -> Arc<RouteControls> {
        self.controls.clone()
    }
}

impl Drop for AudioRoute {
    fn drop(&mut self) {
        // Teardown is synchronous with the owning peer entry; the playback
        // side observes the mix sender closing.
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VadConfig;

    fn vad() -> VoiceActivityDetector {
        VoiceActivityDetector::new(&VadConfig {
            open_threshold: 0.1,
            hang_ms: 10,
            sample_rate: 48000,
        })
    }

    #[test]
    fn test_controls_roundtrip() {
        let controls = RouteControls::new();
        assert_eq!(controls.gain(), 1.0);
        assert_eq!(controls.pan(), (0.0, 0.0, 0.0));

        controls.set_gain(0.0);
        controls.set_pan((3.0, 4.0, -0.5));
        assert_eq!(controls.gain(), 0.0);
        assert_eq!(controls.pan(), (3.0, 4.0, -0.5));
    }

    #[test]
    fn test_attenuation_bounds() {
        assert_eq!(distance_attenuation(0.0, 0.0), 1.0);
        assert_eq!(distance_attenuation(100.0, 0.0), 0.0);

        let near = distance_attenuation(0.5, 0.0);
        let far = distance_attenuation(3.0, 0.0);
        assert!(near > far);
    }

    #[test]
    fn test_stereo_weights_follow_x() {
        let (l, r) = stereo_weights(0.0, 0.0);
        assert!((l - r).abs() < 1e-6);

        let (l, r) = stereo_weights(5.0, 0.0);
        assert!(r > l, "positive x pans right");

        let (l, r) = stereo_weights(-5.0, 0.0);
        assert!(l > r, "negative x pans left");
    }

    #[tokio::test]
    async fn test_route_processes_frames_and_reports_voice() {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (mix_tx, mut mix_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let route = AudioRoute::spawn(
            "tok-1".to_string(),
            RemoteStream { frames: frame_rx },
            mix_tx,
            vad(),
            event_tx,
        );

        frame_tx.send(AudioFrame::mono(vec![0.5; 480])).unwrap();

        let stereo = mix_rx.recv().await.unwrap();
        assert_eq!(stereo.channels, 2);
        assert_eq!(stereo.samples.len(), 960);

        let event = event_rx.recv().await.unwrap();
        assert!(event.active);
        assert_eq!(event.gain, 1.0);
        assert_eq!(event.source, VoiceSource::Remote("tok-1".to_string()));

        drop(route);
    }

    #[tokio::test]
    async fn test_muted_route_never_reports_voice() {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (mix_tx, mut mix_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let route = AudioRoute::spawn(
            "tok-1".to_string(),
            RemoteStream { frames: frame_rx },
            mix_tx,
            vad(),
            event_tx,
        );
        route.controls().set_gain(0.0);

        frame_tx.send(AudioFrame::mono(vec![0.9; 480])).unwrap();

        // Output frame is silence and no voice event fires.
        let stereo = mix_rx.recv().await.unwrap();
        assert!(stereo.samples.iter().all(|s| *s == 0.0));
        assert!(event_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropping_route_releases_playback() {
        let (_frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (mix_tx, mut mix_rx) = mpsc::unbounded_channel();
        let (event_tx, _event_rx) = mpsc::unbounded_channel();

        let route = AudioRoute::spawn(
            "tok-1".to_string(),
            RemoteStream { frames: frame_rx },
            mix_tx,
            vad(),
            event_tx,
        );

        drop(route);
        assert_eq!(mix_rx.recv().await, None);
    }
}
