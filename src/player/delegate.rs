//! Notifications from the player to its owner

use tokio::sync::mpsc;

use crate::error::Error;
use crate::stream::StreamSource;

/// Receives player notifications.
///
/// All methods are called from the player task, one at a time, in the order
/// the underlying events happened.
pub trait PlayerDelegate: Send {
    fn did_start_playback(&self, source: &StreamSource);

    fn did_stop_playback(&self, source: &StreamSource);

    fn did_change_song(&self, source: &StreamSource, title: &str);

    /// A session ended or never started because of `error`
    fn did_fail(&self, _source: &StreamSource, _error: &Error) {}
}

/// Owned copy of a delegate notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Started,
    Stopped,
    SongChanged(String),
    Failed(String),
}

/// Forwards notifications into a channel
impl PlayerDelegate for mpsc::UnboundedSender<PlayerEvent> {
    fn did_start_playback(&self, _source: &StreamSource) {
        let _ = self.send(PlayerEvent::Started);
    }

    fn did_stop_playback(&self, _source: &StreamSource) {
        let _ = self.send(PlayerEvent::Stopped);
    }

    fn did_change_song(&self, _source: &StreamSource, title: &str) {
        let _ = self.send(PlayerEvent::SongChanged(title.to_string()));
    }

    fn did_fail(&self, _source: &StreamSource, error: &Error) {
        let _ = self.send(PlayerEvent::Failed(error.to_string()));
    }
}
