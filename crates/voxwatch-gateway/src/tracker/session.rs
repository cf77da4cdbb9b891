//! Resumable session state.

/// Identifiers needed to resume a Gateway session.
///
/// Cleared entirely on Invalid Session and when reconnects are exhausted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Session {
    /// Last dispatch sequence number seen.
    pub sequence: Option<u64>,
    /// Session ID from `READY`.
    pub session_id: Option<String>,
    /// Validated resume URL from `READY`.
    pub resume_url: Option<String>,
}

impl Session {
    /// Forget everything; the next connection must Identify.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// A Resume needs both a session ID and a sequence number.
    pub(crate) fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.sequence.is_some()
    }
}
