//! Pull-request context read once at process start.

use tracing::{info, warn};

/// Raw run inputs as they arrive from flags or the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrInputs {
    pub pr_mode: bool,
    pub number: Option<u64>,
    pub branch: Option<String>,
    pub comment_id: Option<String>,
}

/// Whether the run is attached to a pull request, and where to report.
///
/// Enabled only when PR mode was requested and both the number and the
/// branch are present. Immutable once resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrContext {
    enabled: bool,
    number: u64,
    branch: String,
    comment_id: Option<String>,
}

impl PrContext {
    /// Context for local runs: no push, no comment.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Apply the enablement rule. A missing field downgrades to disabled with
    /// a warning, never an error.
    pub fn resolve(inputs: &PrInputs) -> Self {
        if !inputs.pr_mode {
            return Self::disabled();
        }
        if let Some(missing) = disabled_reason(inputs) {
            warn!(
                missing,
                "PR mode requested but {missing} is not set; running without PR integration"
            );
            return Self::disabled();
        }
        let ctx = Self {
            enabled: true,
            number: inputs.number.unwrap_or_default(),
            branch: inputs
                .branch
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            comment_id: inputs
                .comment_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        };
        info!(
            pr = ctx.number,
            branch = %ctx.branch,
            has_comment = ctx.comment_id.is_some(),
            "PR mode enabled"
        );
        ctx
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    /// Push target, only when enabled.
    pub fn branch(&self) -> Option<&str> {
        self.enabled.then_some(self.branch.as_str())
    }

    /// Report target, only when enabled.
    pub fn comment_id(&self) -> Option<&str> {
        if self.enabled {
            self.comment_id.as_deref()
        } else {
            None
        }
    }
}

/// Name of the first required PR field that is missing.
fn disabled_reason(inputs: &PrInputs) -> Option<&'static str> {
    if inputs.number.unwrap_or_default() == 0 {
        return Some("PR_NUMBER");
    }
    if inputs
        .branch
        .as_deref()
        .is_none_or(|b| b.trim().is_empty())
    {
        return Some("PR_BRANCH");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn full() -> PrInputs {
        PrInputs {
            pr_mode: true,
            number: Some(12),
            branch: Some("feature/x".to_string()),
            comment_id: Some("99".to_string()),
        }
    }

    #[test]
    fn enabled_when_flagged_with_number_and_branch() {
        let ctx = PrContext::resolve(&full());
        assert!(ctx.is_enabled());
        assert_eq!(ctx.number(), 12);
        assert_eq!(ctx.branch(), Some("feature/x"));
        assert_eq!(ctx.comment_id(), Some("99"));
    }

    #[test]
    fn missing_number_disables_without_error() {
        let inputs = PrInputs {
            number: None,
            ..full()
        };
        assert_eq!(disabled_reason(&inputs), Some("PR_NUMBER"));
        let ctx = PrContext::resolve(&inputs);
        assert!(!ctx.is_enabled());
        assert_eq!(ctx.branch(), None);
        assert_eq!(ctx.comment_id(), None);

        let zero = PrInputs {
            number: Some(0),
            ..full()
        };
        assert!(!PrContext::resolve(&zero).is_enabled());
    }

    #[test]
    fn blank_branch_disables() {
        let inputs = PrInputs {
            branch: Some("  ".to_string()),
            ..full()
        };
        assert_eq!(disabled_reason(&inputs), Some("PR_BRANCH"));
        assert!(!PrContext::resolve(&inputs).is_enabled());
    }

    #[test]
    fn not_flagged_is_disabled() {
        let inputs = PrInputs {
            pr_mode: false,
            ..full()
        };
        assert_eq!(PrContext::resolve(&inputs), PrContext::disabled());
    }

    #[test]
    fn enabled_without_comment_has_no_target() {
        let inputs = PrInputs {
            comment_id: Some(String::new()),
            ..full()
        };
        let ctx = PrContext::resolve(&inputs);
        assert!(ctx.is_enabled());
        assert_eq!(ctx.comment_id(), None);
    }

    #[test]
    fn missing_number_emits_warning() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let inputs = PrInputs {
            number: None,
            ..full()
        };

        let ctx = tracing::subscriber::with_default(subscriber, || PrContext::resolve(&inputs));

        assert!(!ctx.is_enabled());
        let logs = String::from_utf8(captured.0.lock().expect("lock").clone()).expect("utf8");
        assert!(logs.contains("WARN"), "{logs}");
        assert!(logs.contains("PR_NUMBER"), "{logs}");
    }
}
