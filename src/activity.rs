//! Activity logger: records which gated operation a session invoked.

use crate::session::SessionState;
use crate::transcript::{self, SharedTranscript};

/// Entry appended to a session's activity log for `operation`
pub fn entry_for(operation: &str) -> String {
    format!("Accessed {}", operation)
}

/// Process-wide logger. Entries go to the session's own log and, when
/// configured, to the audit transcript.
#[derive(Default)]
pub struct ActivityLogger {
    audit: Option<SharedTranscript>,
}

impl ActivityLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_audit(mut self, audit: SharedTranscript) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Append an access entry for `operation`. Never fails.
    pub fn record(&self, session: &mut SessionState, operation: &str) {
        session.activity_log.push(entry_for(operation));
        transcript::audit(self.audit.as_ref(), |t| {
            t.page_access(
                &session.id,
                operation,
                session.authentication_status.as_str(),
            )
        });
    }
}
