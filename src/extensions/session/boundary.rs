//! Error containment for rendered views.

use super::element::Element;

/// Catches render failures and substitutes the error panel.
///
/// Once a failure is captured the boundary stays tripped for the rest of the
/// session; later renders show the same panel.
#[derive(Debug, Default)]
pub struct ErrorBoundary {
    error: Option<String>,
}

impl ErrorBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass a render result through the boundary.
    pub fn guard(&mut self, rendered: Result<Element, String>) -> Element {
        if let Some(message) = &self.error {
            return Element::error_panel(message);
        }

        let failure = match rendered {
            Ok(element) => match element.validate() {
                Ok(()) => return element,
                Err(e) => e.to_string(),
            },
            Err(message) => message,
        };

        tracing::warn!(error = %failure, "render failed, showing error panel");
        let panel = Element::error_panel(&failure);
        self.error = Some(failure);
        panel
    }

    /// Captured failure message, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}
