//! Verification verdicts from agent output.

/// Emitted by the agent only when it judges the task genuinely complete.
pub const SUCCESS_MARKER: &str = "<<SPEC_RUNNER::TASK_VERIFIED::7F3A9C>>";

/// Decides whether captured agent output signals success.
pub trait SuccessSignal {
    fn is_success(&self, output: &str) -> bool;
}

/// Success iff the exact marker appears anywhere in the output.
///
/// Prose claiming success without the marker is a failure.
#[derive(Debug, Clone, Copy)]
pub struct ExactMarker {
    marker: &'static str,
}

impl ExactMarker {
    pub fn new(marker: &'static str) -> Self {
        Self { marker }
    }

    pub fn marker(&self) -> &'static str {
        self.marker
    }
}

impl Default for ExactMarker {
    fn default() -> Self {
        Self::new(SUCCESS_MARKER)
    }
}

impl SuccessSignal for ExactMarker {
    fn is_success(&self, output: &str) -> bool {
        output.contains(self.marker)
    }
}
