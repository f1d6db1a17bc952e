//! Player state machine
//!
//! [`PlayerCore`] owns the engine, the transport and at most one live
//! session. Every input (user commands and transport events) arrives as a
//! [`PlayerMessage`] and is handled to completion before the next one, so
//! the session never sees interleaved callbacks.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::buffer::PcmBuffer;
use crate::audio::engine::{AudioEngine, EngineErrorHandler};
use crate::codec::decoder::{default_decoder_factory, DecoderFactory};
use crate::codec::parser::{AdtsParser, ParserEvent};
use crate::error::{AudioError, Error, Result, StreamError};
use crate::player::delegate::PlayerDelegate;
use crate::stream::{
    IcyHeaders, SessionId, StreamConnection, StreamEvent, StreamEventSink, StreamSource,
    StreamTransport,
};

/// Input to the player task
#[derive(Debug)]
pub enum PlayerMessage {
    Play,
    Pause,
    /// Event from the transport of `session`
    Stream {
        session: SessionId,
        event: StreamEvent,
    },
    /// The audio output started for `session` failed while running
    EngineFailed {
        session: SessionId,
        error: AudioError,
    },
    Shutdown,
}

/// Externally visible player state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No session
    Idle,
    /// Transport opened, waiting for the stream response
    Connecting,
    /// Engine running, buffers being scheduled
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connecting,
    Playing,
}

/// Everything that lives exactly as long as one play session
struct Session {
    id: SessionId,
    connection: Box<dyn StreamConnection>,
    parser: AdtsParser,
    phase: Phase,
    /// Buffers decoded before the engine was started
    pending: VecDeque<PcmBuffer>,
}

pub struct PlayerCore {
    source: StreamSource,
    engine: Box<dyn AudioEngine>,
    transport: Box<dyn StreamTransport>,
    delegate: Box<dyn PlayerDelegate>,
    decoder_factory: DecoderFactory,
    messages: mpsc::WeakUnboundedSender<PlayerMessage>,
    session: Option<Session>,
    next_session_id: u64,
    state: Arc<RwLock<PlayerState>>,
}

impl PlayerCore {
    /// Build the core and prepare the engine. Transport events are routed
    /// back through `messages`.
    pub fn new(
        source: StreamSource,
        mut engine: Box<dyn AudioEngine>,
        transport: Box<dyn StreamTransport>,
        delegate: Box<dyn PlayerDelegate>,
        messages: mpsc::WeakUnboundedSender<PlayerMessage>,
    ) -> Result<Self> {
        engine.prepare()?;
        info!("Player ready for {} ({})", source, engine.output_format());

        Ok(Self {
            source,
            engine,
            transport,
            delegate,
            decoder_factory: default_decoder_factory(),
            messages,
            session: None,
            next_session_id: 0,
            state: Arc::new(RwLock::new(PlayerState::Idle)),
        })
    }

    /// Decoder used by sessions started after this call
    pub fn set_decoder_factory(&mut self, factory: DecoderFactory) {
        self.decoder_factory = factory;
    }

    pub fn source(&self) -> &StreamSource {
        &self.source
    }

    pub fn state(&self) -> PlayerState {
        *self.state.read()
    }

    pub fn shared_state(&self) -> Arc<RwLock<PlayerState>> {
        self.state.clone()
    }

    /// Process one message. Returns false once the player should exit.
    pub fn handle(&mut self, message: PlayerMessage) -> bool {
        match message {
            PlayerMessage::Play => self.play(),
            PlayerMessage::Pause => self.pause(),
            PlayerMessage::Stream { session, event } => self.on_stream_event(session, event),
            PlayerMessage::EngineFailed { session, error } => self.on_engine_failed(session, error),
            PlayerMessage::Shutdown => {
                self.pause();
                return false;
            }
        }
        true
    }

    /// Open a new session. Ignored while one is active.
    pub fn play(&mut self) {
        if let Some(session) = &self.session {
            debug!("play() ignored, session {} is active", session.id);
            return;
        }

        let id = SessionId(self.next_session_id);
        self.next_session_id += 1;

        let parser =
            AdtsParser::with_decoder_factory(self.engine.output_format(), self.decoder_factory.clone());
        let sink = self.sink_for(id);

        match self.transport.open(&self.source, sink) {
            Ok(connection) => {
                info!("Session {} connecting to {}", id, self.source);
                self.session = Some(Session {
                    id,
                    connection,
                    parser,
                    phase: Phase::Connecting,
                    pending: VecDeque::new(),
                });
                self.set_state(PlayerState::Connecting);
            }
            Err(e) => {
                warn!("Could not open {}: {}", self.source, e);
                self.delegate.did_fail(&self.source, &Error::Stream(e));
            }
        }
    }

    /// Stop playback and release the session. No-op while idle.
    pub fn pause(&mut self) {
        if self.session.is_none() {
            debug!("pause() ignored, player is idle");
            return;
        }
        self.stop_playback();
        self.teardown();
    }

    fn sink_for(&self, session: SessionId) -> StreamEventSink {
        let messages = self.messages.clone();
        StreamEventSink::new(move |event| match messages.upgrade() {
            Some(tx) => tx.send(PlayerMessage::Stream { session, event }).is_ok(),
            None => false,
        })
    }

    fn engine_error_handler(&self, session: SessionId) -> EngineErrorHandler {
        let messages = self.messages.clone();
        Arc::new(move |error| {
            if let Some(tx) = messages.upgrade() {
                let _ = tx.send(PlayerMessage::EngineFailed { session, error });
            }
        })
    }

    fn is_current(&self, session: SessionId) -> bool {
        self.session.as_ref().map(|s| s.id) == Some(session)
    }

    fn on_engine_failed(&mut self, session: SessionId, error: AudioError) {
        if !self.is_current(session) {
            debug!("Dropping output error from stale session {}: {}", session, error);
            return;
        }
        warn!("Session {} lost its audio output: {}", session, error);
        self.delegate.did_fail(&self.source, &Error::Audio(error));
        self.pause();
    }

    fn on_stream_event(&mut self, session: SessionId, event: StreamEvent) {
        if !self.is_current(session) {
            debug!("Dropping event from stale session {}", session);
            return;
        }

        match event {
            StreamEvent::Connected(headers) => self.on_connected(&headers),
            StreamEvent::Data(bytes) => self.on_data(&bytes),
            StreamEvent::TitleChanged(title) => {
                info!("Now playing: {}", title);
                self.delegate.did_change_song(&self.source, &title);
            }
            StreamEvent::Disconnected { reason } => self.on_disconnected(reason),
        }
    }

    fn on_connected(&mut self, headers: &IcyHeaders) {
        let id = match &self.session {
            Some(session) if session.phase == Phase::Connecting => session.id,
            Some(session) => {
                debug!("Session {} already connected", session.id);
                return;
            }
            None => return,
        };

        if let Some(name) = &headers.station_name {
            info!("Connected to station '{}'", name);
        }

        self.engine.set_error_handler(self.engine_error_handler(id));
        if let Err(e) = self.engine.start() {
            warn!("Could not start audio playback: {}", e);
            self.teardown();
            self.delegate.did_fail(&self.source, &Error::Audio(e));
            return;
        }

        self.engine.play_node();
        let pending: Vec<PcmBuffer> = match self.session.as_mut() {
            Some(session) => {
                session.phase = Phase::Playing;
                session.pending.drain(..).collect()
            }
            None => Vec::new(),
        };

        self.set_state(PlayerState::Playing);
        self.delegate.did_start_playback(&self.source);

        if !pending.is_empty() {
            debug!("Scheduling {} buffers decoded while connecting", pending.len());
        }
        for buffer in pending {
            self.engine.schedule_buffer(buffer);
        }
    }

    fn on_data(&mut self, bytes: &[u8]) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let mut failure = None;
        for event in session.parser.parse(bytes) {
            match event {
                ParserEvent::Decoded(buffer) => match session.phase {
                    Phase::Playing => self.engine.schedule_buffer(buffer),
                    Phase::Connecting => session.pending.push_back(buffer),
                },
                ParserEvent::Failed(e) => failure = Some(e),
            }
        }

        if let Some(e) = failure {
            warn!("Session {} stopped on undecodable stream: {}", session.id, e);
            self.delegate.did_fail(&self.source, &Error::Codec(e));
            self.pause();
        }
    }

    fn on_disconnected(&mut self, reason: Option<StreamError>) {
        match &reason {
            Some(e) => warn!("Stream disconnected: {}", e),
            None => info!("Stream ended"),
        }
        if let Some(e) = reason {
            self.delegate.did_fail(&self.source, &Error::Stream(e));
        }
        self.teardown();
        self.stop_playback();
    }

    fn stop_playback(&mut self) {
        self.engine.stop_node();
        self.engine.stop();
        debug!("Engine stopped: {:?}", self.engine.stats());
        self.delegate.did_stop_playback(&self.source);
    }

    /// Drop the session as a unit: connection closed, parser and pending
    /// buffers released
    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.connection.close();
            let stats = session.parser.stats();
            debug!(
                "Session {} closed: {} frames, {} bytes, {} discarded",
                session.id, stats.frames_decoded, stats.bytes_consumed, stats.bytes_discarded
            );
        }
        self.set_state(PlayerState::Idle);
    }

    fn set_state(&self, state: PlayerState) {
        *self.state.write() = state;
    }
}
