//! Audio stream plumbing
//!
//! Capture devices and decoded network audio are external collaborators;
//! this module defines the stream contract they fulfil: continuous mono
//! f32 PCM frames over a channel, plus a shared enable flag for the local
//! track (push-to-talk and deafen gate it).

use crate::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// One block of PCM samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Interleaved samples in range -1.0 to 1.0
    pub samples: Vec<f32>,
    /// Channel count (1 = mono, 2 = stereo)
    pub channels: u16,
}

impl AudioFrame {
    /// Create a mono frame
    pub fn mono(samples: Vec<f32>) -> Self {
        Self {
            samples,
            channels: 1,
        }
    }

    /// Create a stereo frame from interleaved samples
    pub fn stereo(samples: Vec<f32>) -> Self {
        Self {
            samples,
            channels: 2,
        }
    }
}

/// Decoded audio arriving from one remote peer
pub struct RemoteStream {
    /// Mono PCM frames
    pub frames: mpsc::UnboundedReceiver<AudioFrame>,
}

/// The local capture stream
#[derive(Debug)]
pub struct LocalStream {
    /// Mono PCM frames from the capture device
    pub frames: mpsc::UnboundedReceiver<AudioFrame>,
    /// Shared track-enabled flag; frames produced while disabled carry
    /// silence to the peers
    pub enabled: Arc<AtomicBool>,
}

impl LocalStream {
    /// Whether the local track is currently enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

/// One-time provider of the local capture stream
///
/// Acquisition happens once at startup and blocks the rest of mesh setup.
/// Failure is fatal to the voice feature for the session.
#[async_trait]
pub trait LocalAudioSource: Send + Sync {
    /// Acquire the continuous local audio stream
    async fn acquire(&self) -> Result<LocalStream>;
}

/// A [`LocalAudioSource`] fed through a channel
///
/// Used by headless clients and tests; a device-capture implementation
/// lives with the embedder.
pub struct ChannelAudioSource {
    stream: Mutex<Option<LocalStream>>,
}

impl ChannelAudioSource {
    /// Create a source plus the sender and enable flag that feed it
    pub fn new() -> (Self, mpsc::UnboundedSender<AudioFrame>, Arc<AtomicBool>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let enabled = Arc::new(AtomicBool::new(true));

        let source = Self {
            stream: Mutex::new(Some(LocalStream {
                frames: rx,
                enabled: enabled.clone(),
            })),
        };

        (source, tx, enabled)
    }
}

#[async_trait]
impl LocalAudioSource for ChannelAudioSource {
    async fn acquire(&self) -> Result<LocalStream> {
        self.stream.lock().await.take().ok_or_else(|| {
            crate::Error::MediaError("Local stream already acquired".to_string())
        })
    }
}
