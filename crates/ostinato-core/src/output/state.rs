//! Play/stop state machine of the output driver.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    /// The device is being opened.
    Starting,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Start,
    Opened,
    OpenFailed,
    Stop,
}

impl PlaybackState {
    /// Next state, or `None` if `event` doesn't apply in this state.
    pub fn transition(self, event: PlaybackEvent) -> Option<PlaybackState> {
        use PlaybackEvent::*;

        match (self, event) {
            (PlaybackState::Stopped, Start) => Some(PlaybackState::Starting),
            (PlaybackState::Starting, Opened) => Some(PlaybackState::Playing),
            (PlaybackState::Starting, OpenFailed) => Some(PlaybackState::Stopped),
            (PlaybackState::Starting | PlaybackState::Playing, Stop) => {
                Some(PlaybackState::Stopped)
            }
            _ => None,
        }
    }

    pub fn is_playing(&self) -> bool {
        *self == PlaybackState::Playing
    }
}
