//! Command lifecycle controller.
//!
//! A session starts in [`SessionState::Loading`] and either renders a view
//! or runs the command to completion:
//!
//! ```text
//! loading ──► view-ready ──(push/pop)*──► closed
//!    │
//!    ├──► no-view-running ──► no-view-done ──(600ms)──► closed
//!    │                   └──► no-view-error ──(dismiss)──► closed
//!    └──► load-failed ──(dismiss)──► closed
//! ```
//!
//! Declared `no-view` and `menu-bar` commands always run without a view.
//! Declared `view` commands are probed once: an entry that hands back a
//! promise is reclassified as no-view, anything else (including a throw)
//! stays a view.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::extensions::manifest::CommandMode;

use super::boundary::ErrorBoundary;
use super::effect::{HostEffect, ToastStyle};
use super::element::Element;
use super::navigation::{FrameId, NavigationStack, PopOutcome};

/// How long a successful no-view command stays visible before closing.
pub const NO_VIEW_CLOSE_DELAY: Duration = Duration::from_millis(600);

/// Observable state of a command session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    ViewReady,
    NoViewRunning,
    NoViewDone,
    NoViewError { message: String },
    LoadFailed { message: String },
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Loading => "loading",
            SessionState::ViewReady => "view-ready",
            SessionState::NoViewRunning => "no-view-running",
            SessionState::NoViewDone => "no-view-done",
            SessionState::NoViewError { .. } => "no-view-error",
            SessionState::LoadFailed { .. } => "load-failed",
            SessionState::Closed => "closed",
        }
    }
}

/// Outcome of invoking an entry once to classify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// The entry returned a promise-like value.
    Thenable,
    /// The entry returned something renderable.
    Renderable,
    /// The entry threw synchronously.
    Threw(String),
}

/// Where keyboard focus currently sits in the host view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FocusTarget {
    #[default]
    None,
    TextInput,
    TextArea,
    Other,
}

/// A loaded command entry point the session can drive.
#[async_trait(?Send)]
pub trait CommandEntry {
    /// Invoke the entry once and report what it returned.
    fn probe(&mut self) -> Probe;

    /// Run the entry as a no-view command and wait for it to finish.
    ///
    /// If the probe already started the work, its result is awaited instead
    /// of invoking the entry again.
    async fn run(&mut self) -> Result<(), String>;

    /// Render the root view (`None`) or a pushed frame.
    fn render(&mut self, frame: Option<FrameId>) -> Result<Element, String>;

    /// Invoke a callback referenced from a rendered tree.
    fn dispatch(&mut self, callback: &str, args: &[Value]) -> Result<(), String>;

    /// Let pending asynchronous work make progress.
    async fn settle(&mut self);

    /// Take the effects recorded since the last call.
    fn drain_effects(&mut self) -> Vec<HostEffect>;

    /// Tear down a frame that left the navigation stack.
    fn release(&mut self, frame: FrameId);
}

/// Cloneable handle that observes and closes a session.
///
/// Closing is one-shot: once closed, results from work that was still
/// outstanding are dropped without touching the state.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    closed: Arc<AtomicBool>,
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionHandle {
    fn new(initial: SessionState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            closed: Arc::new(AtomicBool::new(false)),
            state: Arc::new(tx),
        }
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.send_replace(SessionState::Closed);
            tracing::debug!("command session closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Publish a new state unless the session was closed.
    fn publish(&self, next: SessionState) -> bool {
        let closed = &self.closed;
        self.state.send_if_modified(|current| {
            if closed.load(Ordering::SeqCst) {
                return false;
            }
            *current = next;
            true
        })
    }
}

/// Drives one opened command from load to close.
pub struct CommandSession<E> {
    entry: Option<E>,
    declared: CommandMode,
    handle: SessionHandle,
    navigation: NavigationStack<FrameId>,
    boundary: ErrorBoundary,
    outbox: Vec<HostEffect>,
    close_delay: Duration,
}

impl<E: CommandEntry> CommandSession<E> {
    pub fn new(entry: E, declared: CommandMode) -> Self {
        Self {
            entry: Some(entry),
            declared,
            handle: SessionHandle::new(SessionState::Loading),
            navigation: NavigationStack::new(),
            boundary: ErrorBoundary::new(),
            outbox: Vec::new(),
            close_delay: NO_VIEW_CLOSE_DELAY,
        }
    }

    /// A session whose bundle could not be loaded.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            entry: None,
            declared: CommandMode::View,
            handle: SessionHandle::new(SessionState::LoadFailed {
                message: message.into(),
            }),
            navigation: NavigationStack::new(),
            boundary: ErrorBoundary::new(),
            outbox: Vec::new(),
            close_delay: NO_VIEW_CLOSE_DELAY,
        }
    }

    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> SessionState {
        self.handle.state()
    }

    /// Number of frames pushed above the root view.
    pub fn depth(&self) -> usize {
        self.navigation.depth()
    }

    /// Classify the entry and either reach `view-ready` or run it.
    ///
    /// For no-view commands this returns once the command finished and, on
    /// success, the auto-close delay elapsed.
    pub async fn start(&mut self) {
        if self.handle.state() != SessionState::Loading {
            return;
        }
        let Some(entry) = self.entry.as_mut() else {
            return;
        };

        let no_view = if self.declared.runs_without_view() {
            true
        } else {
            match entry.probe() {
                Probe::Thenable => {
                    tracing::info!("view command returned a promise, running without a view");
                    true
                }
                Probe::Renderable => false,
                Probe::Threw(message) => {
                    tracing::debug!(error = %message, "probe threw, rendering as a component");
                    false
                }
            }
        };

        if no_view {
            self.run_no_view().await;
        } else {
            self.handle.publish(SessionState::ViewReady);
        }
    }

    async fn run_no_view(&mut self) {
        self.handle.publish(SessionState::NoViewRunning);

        let result = match self.entry.as_mut() {
            Some(entry) => entry.run().await,
            None => return,
        };

        if self.handle.is_closed() {
            tracing::debug!("ignoring result of a closed command");
            return;
        }
        self.apply_effects();

        match result {
            Ok(()) => {
                if self.handle.publish(SessionState::NoViewDone) {
                    tokio::time::sleep(self.close_delay).await;
                    self.handle.close();
                }
            }
            Err(message) => {
                tracing::warn!(error = %message, "no-view command failed");
                self.handle.publish(SessionState::NoViewError { message });
            }
        }
    }

    /// Render what the user should currently see.
    ///
    /// Failed sessions render the error panel; closed or running ones
    /// render nothing.
    pub fn view(&mut self) -> Option<Element> {
        match self.handle.state() {
            SessionState::LoadFailed { message } | SessionState::NoViewError { message } => {
                Some(Element::error_panel(&message))
            }
            SessionState::ViewReady => {
                let frame = self.navigation.top();
                let entry = self.entry.as_mut()?;
                let element = self.boundary.guard(entry.render(frame));
                self.apply_effects();
                Some(element)
            }
            _ => None,
        }
    }

    /// Invoke an action callback, then let its async work settle.
    pub async fn dispatch(&mut self, callback: &str, args: &[Value]) {
        if self.handle.state() != SessionState::ViewReady {
            return;
        }
        let Some(entry) = self.entry.as_mut() else {
            return;
        };

        if let Err(message) = entry.dispatch(callback, args) {
            tracing::warn!(callback = %callback, error = %message, "action handler failed");
            self.outbox.push(HostEffect::Toast {
                style: ToastStyle::Failure,
                title: "Action failed".to_string(),
                message: Some(message),
            });
        }

        entry.settle().await;
        self.apply_effects();
    }

    /// Let pending work (effects, timers, fetches) progress.
    pub async fn settle(&mut self) {
        if let Some(entry) = self.entry.as_mut() {
            entry.settle().await;
        }
        self.apply_effects();
    }

    pub fn push(&mut self, frame: FrameId) {
        if self.handle.state() == SessionState::ViewReady {
            self.navigation.push(frame);
        }
    }

    /// Pop the top frame; popping the root view closes the session.
    pub fn pop(&mut self) {
        match self.navigation.pop() {
            PopOutcome::Popped(frame) => self.release(frame),
            PopOutcome::Exhausted => self.close(),
        }
    }

    /// Return to the root view, releasing every pushed frame.
    pub fn pop_to_root(&mut self) {
        for frame in self.navigation.clear() {
            self.release(frame);
        }
    }

    fn release(&mut self, frame: FrameId) {
        if let Some(entry) = self.entry.as_mut() {
            entry.release(frame);
        }
    }

    /// Handle the escape key. Returns whether it was consumed.
    ///
    /// Ignored while a text field has focus, so typing in a search bar never
    /// closes the command.
    pub fn handle_escape(&mut self, focus: FocusTarget) -> bool {
        if matches!(focus, FocusTarget::TextInput | FocusTarget::TextArea) {
            return false;
        }
        match self.handle.state() {
            SessionState::Closed => false,
            SessionState::ViewReady => {
                self.pop();
                true
            }
            _ => {
                self.close();
                true
            }
        }
    }

    pub fn close(&mut self) {
        self.pop_to_root();
        self.handle.close();
    }

    /// Take effects meant for the launcher UI (toasts, HUDs, opens).
    pub fn take_outbox(&mut self) -> Vec<HostEffect> {
        std::mem::take(&mut self.outbox)
    }

    fn apply_effects(&mut self) {
        let effects = match self.entry.as_mut() {
            Some(entry) => entry.drain_effects(),
            None => return,
        };

        for effect in effects {
            if !effect.is_navigation() {
                self.outbox.push(effect);
                continue;
            }
            match effect {
                HostEffect::Push { frame } => self.push(frame),
                HostEffect::Pop => self.pop(),
                _ => self.pop_to_root(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    struct ScriptedEntry {
        probe: Probe,
        outcome: Result<(), String>,
        run_delay: Duration,
        render: Result<Element, String>,
        pending_effects: Vec<HostEffect>,
        probes: usize,
        runs: usize,
        dispatched: Vec<String>,
        released: Vec<FrameId>,
    }

    impl ScriptedEntry {
        fn view() -> Self {
            Self {
                probe: Probe::Renderable,
                outcome: Ok(()),
                run_delay: Duration::ZERO,
                render: Ok(Element::new("List")),
                pending_effects: Vec::new(),
                probes: 0,
                runs: 0,
                dispatched: Vec::new(),
                released: Vec::new(),
            }
        }

        fn probing(mut self, probe: Probe) -> Self {
            self.probe = probe;
            self
        }

        fn outcome(mut self, outcome: Result<(), String>, delay: Duration) -> Self {
            self.outcome = outcome;
            self.run_delay = delay;
            self
        }
    }

    #[async_trait(?Send)]
    impl CommandEntry for ScriptedEntry {
        fn probe(&mut self) -> Probe {
            self.probes += 1;
            self.probe.clone()
        }

        async fn run(&mut self) -> Result<(), String> {
            tokio::time::sleep(self.run_delay).await;
            self.runs += 1;
            self.outcome.clone()
        }

        fn render(&mut self, _frame: Option<FrameId>) -> Result<Element, String> {
            self.render.clone()
        }

        fn dispatch(&mut self, callback: &str, _args: &[Value]) -> Result<(), String> {
            self.dispatched.push(callback.to_string());
            if callback == "cb_throw" {
                return Err("handler threw".to_string());
            }
            Ok(())
        }

        async fn settle(&mut self) {}

        fn drain_effects(&mut self) -> Vec<HostEffect> {
            std::mem::take(&mut self.pending_effects)
        }

        fn release(&mut self, frame: FrameId) {
            self.released.push(frame);
        }
    }

    async fn start_and_record(
        session: &mut CommandSession<ScriptedEntry>,
    ) -> Vec<(SessionState, Duration)> {
        let mut rx = session.handle().subscribe();
        let started = Instant::now();
        let observer = async {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let state = rx.borrow_and_update().clone();
                let done = state == SessionState::Closed;
                seen.push((state, started.elapsed()));
                if done {
                    break;
                }
            }
            seen
        };
        let ((), seen) = tokio::join!(session.start(), observer);
        seen
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_view_success_auto_closes() {
        let entry = ScriptedEntry::view().outcome(Ok(()), Duration::from_millis(50));
        let mut session = CommandSession::new(entry, CommandMode::NoView);

        let seen = start_and_record(&mut session).await;

        let done = seen
            .iter()
            .find(|(state, _)| *state == SessionState::NoViewDone)
            .expect("no-view-done observed");
        let closed = seen.last().unwrap();
        assert_eq!(closed.0, SessionState::Closed);
        assert!(closed.1 - done.1 >= NO_VIEW_CLOSE_DELAY);
        assert_eq!(session.entry.as_ref().unwrap().probes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_view_failure_waits_for_dismissal() {
        let entry = ScriptedEntry::view().outcome(Err("boom".to_string()), Duration::ZERO);
        let mut session = CommandSession::new(entry, CommandMode::NoView);

        session.start().await;
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(
            session.state(),
            SessionState::NoViewError {
                message: "boom".to_string()
            }
        );
        assert!(session.view().unwrap().is_error_panel());

        assert!(session.handle_escape(FocusTarget::None));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_thenable_probe_reclassifies_as_no_view() {
        let entry = ScriptedEntry::view().probing(Probe::Thenable);
        let mut session = CommandSession::new(entry, CommandMode::View);

        session.start().await;

        let entry = session.entry.as_ref().unwrap();
        assert_eq!(entry.probes, 1);
        assert_eq!(entry.runs, 1);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_renderable_probe_stays_view() {
        let mut session = CommandSession::new(ScriptedEntry::view(), CommandMode::View);
        session.start().await;

        assert_eq!(session.state(), SessionState::ViewReady);
        assert_eq!(session.entry.as_ref().unwrap().runs, 0);
        assert_eq!(session.view().unwrap().kind, "List");
    }

    #[tokio::test]
    async fn test_throwing_probe_renders_as_component() {
        let entry = ScriptedEntry::view().probing(Probe::Threw("hooks outside render".into()));
        let mut session = CommandSession::new(entry, CommandMode::View);
        session.start().await;

        assert_eq!(session.state(), SessionState::ViewReady);
        let element = session.view().unwrap();
        assert!(!element.is_error_panel());
        assert_eq!(session.entry.as_ref().unwrap().runs, 0);
    }

    #[tokio::test]
    async fn test_menu_bar_runs_without_probe() {
        let mut session =
            CommandSession::new(ScriptedEntry::view(), CommandMode::MenuBar).with_close_delay(Duration::ZERO);
        session.start().await;

        let entry = session.entry.as_ref().unwrap();
        assert_eq!(entry.probes, 0);
        assert_eq!(entry.runs, 1);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_session_ignores_late_result() {
        for outcome in [Ok(()), Err("late failure".to_string())] {
            let entry = ScriptedEntry::view().outcome(outcome, Duration::from_secs(1));
            let mut session = CommandSession::new(entry, CommandMode::NoView);
            let handle = session.handle();
            let mut rx = handle.subscribe();

            let canceller = async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                handle.close();
            };
            tokio::join!(session.start(), canceller);

            assert_eq!(session.entry.as_ref().unwrap().runs, 1);
            assert_eq!(session.state(), SessionState::Closed);
            assert_eq!(*rx.borrow_and_update(), SessionState::Closed);
            assert!(!rx.has_changed().unwrap());
        }
    }

    #[tokio::test]
    async fn test_push_n_pop_n_plus_one_closes() {
        for n in 0..4u32 {
            let mut session = CommandSession::new(ScriptedEntry::view(), CommandMode::View);
            session.start().await;

            for frame in 0..n {
                session.push(frame);
            }
            assert_eq!(session.depth(), n as usize);

            for _ in 0..n {
                session.pop();
                assert_eq!(session.state(), SessionState::ViewReady);
            }
            assert_eq!(session.depth(), 0);

            session.pop();
            assert_eq!(session.state(), SessionState::Closed);
        }
    }

    #[tokio::test]
    async fn test_escape_respects_text_focus() {
        let mut session = CommandSession::new(ScriptedEntry::view(), CommandMode::View);
        session.start().await;
        session.push(1);

        assert!(!session.handle_escape(FocusTarget::TextInput));
        assert!(!session.handle_escape(FocusTarget::TextArea));
        assert_eq!(session.depth(), 1);

        assert!(session.handle_escape(FocusTarget::Other));
        assert_eq!(session.depth(), 0);
        assert_eq!(session.state(), SessionState::ViewReady);

        assert!(!session.handle_escape(FocusTarget::TextInput));
        assert_eq!(session.state(), SessionState::ViewReady);

        assert!(session.handle_escape(FocusTarget::None));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(!session.handle_escape(FocusTarget::None));
    }

    #[tokio::test]
    async fn test_render_failure_is_contained() {
        let mut entry = ScriptedEntry::view();
        entry.render = Err("TypeError: x is undefined".to_string());
        let mut session = CommandSession::new(entry, CommandMode::View);
        session.start().await;

        let element = session.view().unwrap();
        assert!(element.is_error_panel());
        assert_eq!(session.state(), SessionState::ViewReady);
    }

    #[test]
    fn test_load_failure_renders_error_panel() {
        let mut session = CommandSession::<ScriptedEntry>::failed("default export is not a function");
        assert_eq!(session.state().as_str(), "load-failed");

        let panel = session.view().unwrap();
        assert!(panel.is_error_panel());
        assert!(panel.props["markdown"]
            .as_str()
            .unwrap()
            .contains("default export is not a function"));

        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.view().is_none());
    }

    #[tokio::test]
    async fn test_effects_are_applied_after_dispatch() {
        let mut session = CommandSession::new(ScriptedEntry::view(), CommandMode::View);
        session.start().await;

        session.entry.as_mut().unwrap().pending_effects = vec![
            HostEffect::Push { frame: 7 },
            HostEffect::Toast {
                style: ToastStyle::Success,
                title: "Copied".to_string(),
                message: None,
            },
        ];
        session.dispatch("cb_1", &[]).await;

        assert_eq!(session.depth(), 1);
        let outbox = session.take_outbox();
        assert_eq!(outbox.len(), 1);
        assert!(matches!(outbox[0], HostEffect::Toast { .. }));

        session.entry.as_mut().unwrap().pending_effects = vec![HostEffect::PopToRoot];
        session.dispatch("cb_2", &[]).await;
        assert_eq!(session.depth(), 0);
        assert_eq!(session.state(), SessionState::ViewReady);

        session.dispatch("cb_throw", &[]).await;
        let outbox = session.take_outbox();
        assert!(matches!(
            &outbox[0],
            HostEffect::Toast { style: ToastStyle::Failure, .. }
        ));
        assert_eq!(session.entry.as_ref().unwrap().dispatched, vec!["cb_1", "cb_2", "cb_throw"]);
    }

    #[tokio::test]
    async fn test_frames_leaving_the_stack_are_released() {
        let mut session = CommandSession::new(ScriptedEntry::view(), CommandMode::View);
        session.start().await;

        session.push(1);
        session.push(2);
        session.pop();
        assert_eq!(session.entry.as_ref().unwrap().released, vec![2]);

        session.push(3);
        session.push(4);
        session.entry.as_mut().unwrap().pending_effects = vec![HostEffect::PopToRoot];
        session.dispatch("cb_1", &[]).await;
        assert_eq!(session.depth(), 0);
        assert_eq!(session.entry.as_ref().unwrap().released, vec![2, 4, 3, 1]);

        session.push(5);
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.entry.as_ref().unwrap().released, vec![2, 4, 3, 1, 5]);
    }
}
