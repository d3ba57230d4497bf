/// Lifecycle of one TCP connection. Terminal states are `Closed` and `Lost`;
/// a `Session` is single-use and is never moved back to `Closed` from `Lost`
/// or vice versa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Authenticating,
    Connected,
    Closed,
    Lost,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Lost)
    }
}
