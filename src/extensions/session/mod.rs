//! Command sessions: state machine, navigation and error containment.

mod boundary;
mod effect;
mod element;
mod lifecycle;
mod navigation;

pub use boundary::ErrorBoundary;
pub use effect::{HostEffect, ToastStyle};
pub use element::{Element, ElementError, Node, CALLBACK_KEY, MAX_DEPTH, MAX_NODES};
pub use lifecycle::{
    CommandEntry, CommandSession, FocusTarget, Probe, SessionHandle, SessionState,
    NO_VIEW_CLOSE_DELAY,
};
pub use navigation::{FrameId, NavigationStack, PopOutcome};
