//! Per-session navigation stack.

/// Identifier of a frame pushed by the extension.
pub type FrameId = u32;

/// Result of popping the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopOutcome<F> {
    /// The top frame was removed.
    Popped(F),
    /// The stack was already empty; the session should end.
    Exhausted,
}

/// Frames pushed on top of a command's root view.
///
/// Empty at session start, meaning the root view is visible. Only the top
/// frame is ever shown.
#[derive(Debug, Clone)]
pub struct NavigationStack<F> {
    frames: Vec<F>,
}

impl<F> Default for NavigationStack<F> {
    fn default() -> Self {
        Self { frames: Vec::new() }
    }
}

impl<F: Copy> NavigationStack<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: F) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> PopOutcome<F> {
        match self.frames.pop() {
            Some(frame) => PopOutcome::Popped(frame),
            None => PopOutcome::Exhausted,
        }
    }

    /// Drop every pushed frame, returning to the root view.
    ///
    /// The removed frames come back topmost first.
    pub fn clear(&mut self) -> Vec<F> {
        let mut frames = std::mem::take(&mut self.frames);
        frames.reverse();
        frames
    }

    /// Currently visible frame, `None` when the root view is showing.
    pub fn top(&self) -> Option<F> {
        self.frames.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
