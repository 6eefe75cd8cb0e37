/// Lifecycle of one multipart upload attempt. Terminal states are
/// never left; exactly one of complete or abort is issued per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The store has issued an upload id
    Initiated,
    /// Parts are being dispatched to the worker pool
    InProgress,
    /// All parts accounted for, completion call in flight
    Completing,
    Completed,
    /// A failure was observed, abort call in flight
    Aborting,
    Aborted,
    /// The completion call itself failed; the remote upload is left as-is
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Aborted | SessionState::Failed
        )
    }

    pub fn can_transition(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Initiated, InProgress)
                | (InProgress, Completing)
                | (InProgress, Aborting)
                | (Completing, Completed)
                | (Completing, Failed)
                | (Aborting, Aborted)
        )
    }
}

/// Identity of one upload attempt, threaded explicitly through every
/// operation that acts on its behalf. Never stored on a shared
/// instance: concurrent uploads of identically named files must not
/// observe each other.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Generated per attempt; progress subscriptions key off this, not
    /// the raw file name
    pub session_id: String,
    pub bucket: String,
    pub key: String,
    /// Assigned by the object store at initiation
    pub upload_id: String,
}

/// One multipart upload attempt. Owned exclusively by the coordinator
/// invocation that created it and dropped when that call returns.
#[derive(Debug)]
pub struct UploadSession {
    context: SessionContext,
    state: SessionState,
}

impl UploadSession {
    pub fn new(session_id: String, bucket: String, key: String, upload_id: String) -> Self {
        Self {
            context: SessionContext {
                session_id,
                bucket,
                key,
                upload_id,
            },
            state: SessionState::Initiated,
        }
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move the session forward. Transitions are driven only by the
    /// coordinator; anything outside the table is a logic error.
    pub fn advance(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition(next),
            "illegal session transition {:?} -> {:?}",
            self.state,
            next
        );
        if self.state.can_transition(next) {
            self.state = next;
        } else {
            tracing::error!(from = ?self.state, to = ?next, "illegal session transition ignored");
        }
    }
}
