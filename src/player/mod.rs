//! Stream player
//!
//! [`StreamPlayer`] runs a [`PlayerCore`] on a single tokio task. Commands
//! from any number of [`PlayerHandle`]s and events from the stream transport
//! share one queue, so playback state changes are strictly ordered.

pub mod controller;
pub mod delegate;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::audio::engine::AudioEngine;
use crate::codec::decoder::DecoderFactory;
use crate::error::{Error, Result};
use crate::stream::{StreamSource, StreamTransport};

pub use controller::{PlayerCore, PlayerMessage, PlayerState};
pub use delegate::{PlayerDelegate, PlayerEvent};

/// Player actor bound to one stream source
pub struct StreamPlayer {
    core: PlayerCore,
    messages: mpsc::UnboundedReceiver<PlayerMessage>,
}

impl StreamPlayer {
    /// Create the player and a handle to control it. The engine is prepared
    /// here; nothing connects until [`PlayerHandle::play`].
    pub fn new(
        source: StreamSource,
        engine: Box<dyn AudioEngine>,
        transport: Box<dyn StreamTransport>,
        delegate: Box<dyn PlayerDelegate>,
    ) -> Result<(Self, PlayerHandle)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let core = PlayerCore::new(source, engine, transport, delegate, tx.downgrade())?;
        let handle = PlayerHandle {
            messages: tx,
            state: core.shared_state(),
        };
        Ok((Self { core, messages: rx }, handle))
    }

    pub fn with_decoder_factory(mut self, factory: DecoderFactory) -> Self {
        self.core.set_decoder_factory(factory);
        self
    }

    /// Process messages until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        info!("Player task started for {}", self.core.source());

        while let Some(message) = self.messages.recv().await {
            if !self.core.handle(message) {
                break;
            }
        }

        self.core.pause();
        info!("Player task stopped");
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

/// Cloneable control surface for a running [`StreamPlayer`]
#[derive(Clone)]
pub struct PlayerHandle {
    messages: mpsc::UnboundedSender<PlayerMessage>,
    state: Arc<RwLock<PlayerState>>,
}

impl PlayerHandle {
    pub fn play(&self) -> Result<()> {
        self.send(PlayerMessage::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(PlayerMessage::Pause)
    }

    /// Play when idle, pause otherwise
    pub fn toggle(&self) -> Result<()> {
        match self.state() {
            PlayerState::Idle => self.play(),
            PlayerState::Connecting | PlayerState::Playing => self.pause(),
        }
    }

    /// Stop playback and end the player task
    pub fn shutdown(&self) -> Result<()> {
        self.send(PlayerMessage::Shutdown)
    }

    pub fn state(&self) -> PlayerState {
        *self.state.read()
    }

    pub fn is_playing(&self) -> bool {
        self.state() == PlayerState::Playing
    }

    fn send(&self, message: PlayerMessage) -> Result<()> {
        self.messages.send(message).map_err(|_| Error::PlayerClosed)
    }
}
