use reqwest::StatusCode;

/// Where one logical call currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Unauthenticated,
    Attempt1,
    NeedsRefresh,
    Attempt2,
    Success,
    HardFailure,
    SessionInvalidated,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::HardFailure | Self::SessionInvalidated
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Attempt1 => "attempt1",
            Self::NeedsRefresh => "needs_refresh",
            Self::Attempt2 => "attempt2",
            Self::Success => "success",
            Self::HardFailure => "hard_failure",
            Self::SessionInvalidated => "session_invalidated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Replay,
}

impl Attempt {
    pub fn state(self) -> CallState {
        match self {
            Self::First => CallState::Attempt1,
            Self::Replay => CallState::Attempt2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Decode,
    Refresh,
    Fail,
}

impl Step {
    pub fn next_state(self) -> CallState {
        match self {
            Self::Decode => CallState::Success,
            Self::Refresh => CallState::NeedsRefresh,
            Self::Fail => CallState::HardFailure,
        }
    }
}

/// Decides what follows a response. Only a first attempt that carried a
/// credential may ask for a refresh.
pub fn next_step(status: StatusCode, attempt: Attempt, credential_attached: bool) -> Step {
    if status.is_success() {
        return Step::Decode;
    }
    if status == StatusCode::UNAUTHORIZED && credential_attached && attempt == Attempt::First {
        return Step::Refresh;
    }
    Step::Fail
}
