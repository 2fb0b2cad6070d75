//! Side effects requested by a running command.

use serde::{Deserialize, Serialize};

use super::navigation::FrameId;

/// Something a command asked the host to do.
///
/// Navigation effects are applied by the session itself; the rest are queued
/// in the session outbox for the launcher UI (hiding the window does not end
/// the command).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HostEffect {
    Push {
        frame: FrameId,
    },
    Pop,
    PopToRoot,
    CloseMainWindow,
    Toast {
        style: ToastStyle,
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Hud {
        title: String,
    },
    Open {
        target: String,
    },
    Clipboard {
        text: String,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToastStyle {
    #[default]
    Success,
    Failure,
    Animated,
}

impl HostEffect {
    /// Whether the session consumes this effect rather than the host UI.
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            HostEffect::Push { .. } | HostEffect::Pop | HostEffect::PopToRoot
        )
    }
}
