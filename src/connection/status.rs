//! Connection status indicator derived from a state snapshot.

use super::machine::{ConnectionSnapshot, ConnectionState};
use std::borrow::Cow;

/// Visual category of the connection indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusStyle {
    Connected,
    Disconnected,
    Error,
    Unknown,
}

impl StatusStyle {
    /// Class name for surfaces that style by string key.
    pub fn class_name(self) -> &'static str {
        match self {
            StatusStyle::Connected => "status-connected",
            StatusStyle::Disconnected => "status-disconnected",
            StatusStyle::Error => "status-error",
            StatusStyle::Unknown => "status-unknown",
        }
    }
}

/// Display tuple for the connection indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDisplay<'a> {
    pub text: &'static str,
    pub style: StatusStyle,
    pub icon: &'static str,
    /// Carried through unchanged from the connection state.
    pub error: Option<Cow<'a, str>>,
}

/// Maps a connection state and optional error to what the status bar shows.
///
/// Pure; recompute on every read. `Connecting` has no dedicated label and
/// falls through to "Unknown".
pub fn describe(state: ConnectionState, error: Option<&str>) -> StatusDisplay<'_> {
    let (text, style, icon) = match state {
        ConnectionState::Connected => ("Connected", StatusStyle::Connected, "🟢"),
        ConnectionState::Disconnected => ("Disconnected", StatusStyle::Disconnected, "⚪"),
        ConnectionState::Error => ("Error", StatusStyle::Error, "🔴"),
        _ => ("Unknown", StatusStyle::Unknown, "⚪"),
    };

    StatusDisplay {
        text,
        style,
        icon,
        error: error.map(Cow::Borrowed),
    }
}

impl ConnectionSnapshot {
    /// Status display for this snapshot, borrowing its error message.
    pub fn display(&self) -> StatusDisplay<'_> {
        describe(self.state, self.error.as_deref())
    }
}

impl StatusDisplay<'_> {
    pub fn into_owned(self) -> StatusDisplay<'static> {
        StatusDisplay {
            text: self.text,
            style: self.style,
            icon: self.icon,
            error: self.error.map(|e| Cow::Owned(e.into_owned())),
        }
    }
}

impl std::fmt::Display for StatusDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.icon, self.text)?;
        if let Some(error) = &self.error {
            write!(f, " ({})", error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_connected() {
        let d = describe(ConnectionState::Connected, None);
        assert_eq!((d.text, d.style, d.icon), ("Connected", StatusStyle::Connected, "🟢"));
        assert_eq!(d.style.class_name(), "status-connected");
        assert!(d.error.is_none());
    }

    #[test]
    fn test_disconnected() {
        let d = describe(ConnectionState::Disconnected, None);
        assert_eq!((d.text, d.icon), ("Disconnected", "⚪"));
        assert_eq!(d.style.class_name(), "status-disconnected");
    }

    #[test]
    fn test_error_carries_message_unchanged() {
        let d = describe(ConnectionState::Error, Some("WebSocket connection error"));
        assert_eq!((d.text, d.icon), ("Error", "🔴"));
        assert_eq!(d.style, StatusStyle::Error);
        assert_eq!(d.error.as_deref(), Some("WebSocket connection error"));
    }

    #[test]
    fn test_connecting_falls_back_to_unknown() {
        let d = describe(ConnectionState::Connecting, None);
        assert_eq!(d.text, "Unknown");
        assert_eq!(d.style.class_name(), "status-unknown");
    }

    #[test]
    fn test_error_shown_with_any_state() {
        let d = describe(ConnectionState::Disconnected, Some("Failed to fetch articles from API"));
        assert_eq!(d.to_string(), "⚪ Disconnected (Failed to fetch articles from API)");
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = ConnectionSnapshot {
            state: ConnectionState::Connected,
            ..Default::default()
        };
        assert_eq!(snapshot.display().to_string(), "🟢 Connected");
        let owned: StatusDisplay<'static> = snapshot.display().into_owned();
        assert_eq!(owned.text, "Connected");
    }
}
