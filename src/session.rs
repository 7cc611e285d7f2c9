//! the query session: one `SessionState`, the history, and latest-only
//! bookkeeping for in-flight requests.
//!
//! ```text
//! Idle --submit--> Pending --ok--> Succeeded --clear_result--> Idle
//!                          \-err-> Failed    --clear_result--> Idle
//! Succeeded | Failed | Pending --submit--> Pending (supersedes)
//! ```
//!
//! `submit` flips to `Pending` synchronously and hands back a
//! `PendingRequest`; whoever drives it (a bevy task, a test) feeds the
//! resulting `Completion` back through `complete`. only the most recently
//! issued request may change state; older completions are discarded.

use bevy::log::{debug, info, warn};

use crate::client::{CompletionClient, Credential};
use crate::error::{CompletionError, ErrorKind};
use crate::history::HistoryStore;
use crate::query::QueryText;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    Pending { query: QueryText },
    Succeeded { query: QueryText, content: String },
    Failed { query: QueryText, reason: ErrorKind },
}

impl SessionState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn query(&self) -> Option<&QueryText> {
        match self {
            Self::Idle => None,
            Self::Pending { query }
            | Self::Succeeded { query, .. }
            | Self::Failed { query, .. } => Some(query),
        }
    }

    /// the text a view should show for a resting state.
    /// failures collapse to the generic message.
    pub fn display_text(&self) -> Option<&str> {
        match self {
            Self::Succeeded { content, .. } => Some(content.as_str()),
            Self::Failed { reason, .. } => Some(reason.user_message()),
            Self::Idle | Self::Pending { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct RequestId(u64);

/// monotonically numbered requests; only the newest is live.
#[derive(Debug, Default)]
struct LatestOnly {
    next: u64,
    active: Option<RequestId>,
}

impl LatestOnly {
    fn begin(&mut self) -> RequestId {
        let id = RequestId(self.next);
        self.next += 1;
        self.active = Some(id);
        id
    }

    fn finish_if_active(&mut self, id: RequestId) -> bool {
        if self.active == Some(id) {
            self.active = None;
            true
        } else {
            false
        }
    }
}

/// a submitted query waiting to be sent.
#[derive(Clone, Debug)]
pub struct PendingRequest {
    id: RequestId,
    query: QueryText,
}

impl PendingRequest {
    pub fn query(&self) -> &QueryText {
        &self.query
    }

    /// performs the exchange. may suspend; never touches session state.
    pub async fn run(self, client: &CompletionClient, credential: &Credential) -> Completion {
        let outcome = client.request(&self.query, credential).await;
        Completion { id: self.id, query: self.query, outcome }
    }

    /// pairs the request with an outcome produced elsewhere.
    pub fn resolve(self, outcome: Result<String, CompletionError>) -> Completion {
        Completion { id: self.id, query: self.query, outcome }
    }
}

/// a finished exchange, tagged with the request it belongs to.
#[derive(Clone, Debug)]
pub struct Completion {
    id: RequestId,
    query: QueryText,
    outcome: Result<String, CompletionError>,
}

impl Completion {
    pub fn query(&self) -> &QueryText {
        &self.query
    }

    pub fn outcome(&self) -> &Result<String, CompletionError> {
        &self.outcome
    }
}

/// what `complete` did with a completion. either way the attempt is over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settled {
    Applied,
    /// superseded by a newer submission; state untouched.
    Discarded,
}

#[derive(Debug, Default)]
pub struct QuerySession {
    state: SessionState,
    history: HistoryStore,
    requests: LatestOnly,
}

impl QuerySession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// starts a new ask. blank input is ignored (`None`, no transition).
    /// any request still in flight is superseded.
    pub fn submit(&mut self, raw: &str) -> Option<PendingRequest> {
        let query = QueryText::parse(raw)?;
        let id = self.requests.begin();
        info!(target: "bevy_askme", "submit: request={} len={}", id.0, query.as_str().len());
        self.state = SessionState::Pending { query: query.clone() };
        Some(PendingRequest { id, query })
    }

    /// applies a completion if it belongs to the live request.
    pub fn complete(&mut self, completion: Completion) -> Settled {
        let Completion { id, query, outcome } = completion;
        if !self.requests.finish_if_active(id) {
            debug!(target: "bevy_askme", "complete: discarding stale request={}", id.0);
            return Settled::Discarded;
        }

        self.state = match outcome {
            Ok(content) => {
                self.history.insert(query.clone());
                SessionState::Succeeded { query, content }
            }
            Err(err) => {
                warn!(target: "bevy_askme", "complete: request={} failed: {}", id.0, err);
                SessionState::Failed { query, reason: err.kind }
            }
        };
        Settled::Applied
    }

    /// back to `Idle` from a resting state; pending requests are not clearable.
    pub fn clear_result(&mut self) {
        if matches!(self.state, SessionState::Succeeded { .. } | SessionState::Failed { .. }) {
            self.state = SessionState::Idle;
        }
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn select_history(&self, query: QueryText) -> QueryText {
        self.history.select(query)
    }

    /// runs one submission to completion on the current task.
    ///
    /// convenience for hosts without their own task plumbing; overlapping
    /// asks must go through `submit` + `complete` to get supersession.
    pub async fn ask(
        &mut self,
        client: &CompletionClient,
        credential: &Credential,
        raw: &str,
    ) -> Option<Settled> {
        let pending = self.submit(raw)?;
        let completion = pending.run(client, credential).await;
        Some(self.complete(completion))
    }
}
