/// Lifecycle of one dump session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Init,
    Loading,
    AwaitingReady,
    Configuring,
    Arming,
    AwaitingCapture,
    Captured,
    Failed,
    CleanedUp,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Init => "init",
            SessionState::Loading => "loading",
            SessionState::AwaitingReady => "awaiting_ready",
            SessionState::Configuring => "configuring",
            SessionState::Arming => "arming",
            SessionState::AwaitingCapture => "awaiting_capture",
            SessionState::Captured => "captured",
            SessionState::Failed => "failed",
            SessionState::CleanedUp => "cleaned_up",
        }
    }

    /// Whether `next` is a legal successor.
    ///
    /// Any non-terminal state may fail; `Captured` and `Failed` only lead
    /// to `CleanedUp`.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        match (*self, next) {
            (Init, Loading)
            | (Loading, AwaitingReady)
            | (AwaitingReady, Configuring)
            | (Configuring, Arming)
            | (Arming, AwaitingCapture)
            | (AwaitingCapture, Captured)
            | (Captured, CleanedUp)
            | (Failed, CleanedUp) => true,
            (Captured | Failed | CleanedUp, _) => false,
            (_, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
