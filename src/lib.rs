//! bevy_askme: a small bevy plugin for one-shot "ask me" questions against an
//! openai-compatible chat-completion endpoint.
//!
//! - one `QuerySession` per app: idle / pending / succeeded / failed.
//! - newest submission wins; answers to superseded questions are dropped.
//! - successful questions land in a deduplicated, newest-first history.
//! - never blocks the main thread: on native we spawn onto a tiny tokio
//!   runtime (no bevy pool blocking); on wasm we use bevy's async pool,
//!   which yields to the browser/event loop.
//!
//! failures render as one generic message; the classified `ErrorKind` and
//! its diagnostics only go to the log.

use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use flume::{Receiver, Sender, TryRecvError};
use std::sync::Arc;

pub mod client;
pub mod error;
pub mod history;
pub mod query;
pub mod session;

pub use client::{
    CompletionClient, CompletionConfig, Credential, HttpReply, Transport, DEFAULT_ENDPOINT,
    DEFAULT_MODEL,
};
pub use error::{CompletionError, ErrorKind, GENERIC_FAILURE_MESSAGE};
pub use history::HistoryStore;
pub use query::QueryText;
pub use session::{Completion, PendingRequest, QuerySession, SessionState, Settled};

/// host-provided settings. the credential is injected, never discovered.
#[derive(Resource, Clone, Debug, Default)]
pub struct AskmeConfig {
    pub completion: CompletionConfig,
    pub credential: Credential,
}

impl AskmeConfig {
    /// reads `GROQ_API_KEY`, `ASKME_ENDPOINT` and `ASKME_MODEL`.
    /// anything missing falls back to defaults (empty credential included).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// same mapping as `from_env`, over any key -> value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = CompletionConfig::default();
        let completion = CompletionConfig {
            endpoint: lookup("ASKME_ENDPOINT").unwrap_or(defaults.endpoint),
            model: lookup("ASKME_MODEL").unwrap_or(defaults.model),
        };
        let credential = Credential::new(lookup("GROQ_API_KEY").unwrap_or_default());
        Self { completion, credential }
    }
}

/// the shared completion client.
#[derive(Resource, Clone, Debug)]
pub struct AskmeClient(pub Arc<CompletionClient>);

impl AskmeClient {
    pub fn new(client: CompletionClient) -> Self {
        Self(Arc::new(client))
    }
}

/// the single session; the only place state and history are mutated.
#[derive(Resource, Debug, Default, Deref, DerefMut)]
pub struct AskmeSession(pub QuerySession);

/// the input line driving submissions. cleared after every finished attempt.
#[derive(Resource, Debug, Default, Clone, PartialEq, Eq)]
pub struct QueryInput(pub String);

/// on native we keep a tiny tokio runtime to drive request futures.
/// we spawn onto this rt from compute tasks so neither the main thread
/// nor bevy's compute pools block.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "bevy_askme", "AskmePlugin: initializing Tokio multi-thread runtime (native)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// system ordering so uis can run after we emit events
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum AskSet {
    /// bevy_askme applies completions and emits Ask* events here (in `Update`)
    Drain,
}

/// ask a question. blank text is ignored.
#[derive(Event, Debug, Clone)]
pub struct SubmitQuery {
    pub text: String,
}

/// helper to enqueue a question from any system.
pub fn submit_query(writer: &mut EventWriter<SubmitQuery>, text: impl Into<String>) {
    let text = text.into();
    info!(target: "bevy_askme", "submit_query (len={})", text.len());
    writer.write(SubmitQuery { text });
}

#[derive(Event, Debug, Clone)]
pub struct AskStarted {
    pub query: QueryText,
}
#[derive(Event, Debug, Clone)]
pub struct AskSucceeded {
    pub query: QueryText,
    pub content: String,
}
#[derive(Event, Debug, Clone)]
pub struct AskFailed {
    pub query: QueryText,
    pub kind: ErrorKind,
}
/// an attempt finished. `applied` is false when a newer question had
/// already superseded it.
#[derive(Event, Debug, Clone)]
pub struct AskSettled {
    pub applied: bool,
}

/// cross-thread inbox; request tasks send, main thread drains.
/// bounded to avoid unbounded growth when the frame stalls briefly.
#[derive(Resource, Clone)]
struct CompletionInbox {
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl Default for CompletionInbox {
    fn default() -> Self {
        let (tx, rx) = flume::bounded(64);
        Self { tx, rx }
    }
}

/// send to inbox; waits (without blocking the worker) while it is full.
/// only a closed inbox drops the completion.
async fn push_inbox(tx: &Sender<Completion>, completion: Completion) {
    if tx.send_async(completion).await.is_err() {
        warn!(target: "bevy_askme", "push_inbox: inbox closed; dropping completion");
    }
}

/// bevy plugin: wires systems, events, resources.
/// inserts `AskmeConfig` (from env), `AskmeClient`, `AskmeSession` and
/// `QueryInput` unless the host already did. on native, also inserts a
/// tiny tokio runtime resource by default.
pub struct AskmePlugin;

impl Plugin for AskmePlugin {
    fn build(&self, app: &mut App) {
        info!(target: "bevy_askme", "AskmePlugin: build()");
        app.init_resource::<CompletionInbox>()
            .init_resource::<AskmeSession>()
            .init_resource::<QueryInput>()
            .add_event::<SubmitQuery>()
            .add_event::<AskStarted>()
            .add_event::<AskSucceeded>()
            .add_event::<AskFailed>()
            .add_event::<AskSettled>()
            .configure_sets(Update, AskSet::Drain)
            // submissions flip to pending before drain runs in the same frame
            .add_systems(Update, (spawn_submissions, drain_completions.in_set(AskSet::Drain)).chain());

        if app.world().get_resource::<AskmeConfig>().is_none() {
            app.insert_resource(AskmeConfig::from_env());
        }
        if app.world().get_resource::<AskmeClient>().is_none() {
            let config = app.world().resource::<AskmeConfig>().completion.clone();
            app.insert_resource(AskmeClient::new(CompletionClient::with_default_transport(config)));
        }

        #[cfg(not(target_arch = "wasm32"))]
        if app.world().get_resource::<TokioRt>().is_none() {
            app.insert_resource(TokioRt::default());
        }
    }
}

/// moves each submitted question to pending and spawns its request.
fn spawn_submissions(
    mut ev_submit: EventReader<SubmitQuery>,
    mut session: ResMut<AskmeSession>,
    config: Res<AskmeConfig>,
    client: Res<AskmeClient>,
    inbox: Res<CompletionInbox>,
    mut ev_start: EventWriter<AskStarted>,

    // native-only: small runtime to drive network futures
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    for SubmitQuery { text } in ev_submit.read() {
        let Some(pending) = session.submit(text) else {
            debug!(target: "bevy_askme", "spawn_submissions: blank input ignored");
            continue;
        };
        info!(target: "bevy_askme",
            "spawn_submissions: model={} key_present={}",
            client.0.config().model, config.credential.is_present()
        );
        ev_start.write(AskStarted { query: pending.query().clone() });

        let client = client.0.clone();
        let credential = config.credential.clone();
        let inbox_tx = inbox.tx.clone();
        let pool = AsyncComputeTaskPool::get();
        #[cfg(not(target_arch = "wasm32"))]
        let (rt, fallback, fallback_tx) = (rt.0.clone(), pending.clone(), inbox.tx.clone());

        pool.spawn(async move {
            let run = async move {
                let completion = pending.run(&client, &credential).await;
                push_inbox(&inbox_tx, completion).await;
            };

            #[cfg(target_arch = "wasm32")]
            {
                // wasm path: just await directly (no tokio).
                run.await;
            }
            #[cfg(not(target_arch = "wasm32"))]
            {
                // native: hand off to tokio so bevy pools stay free.
                if let Err(err) = rt.spawn(run).await {
                    error!(target: "bevy_askme", "request task failed: {}", err);
                    // settle the attempt so the session does not stay pending
                    let outcome = Err(CompletionError::network(format!("request task failed: {err}")));
                    push_inbox(&fallback_tx, fallback.resolve(outcome)).await;
                }
            }
        })
        .detach();
    }
}

/// drains the inbox, applies completions and emits user-facing events.
fn drain_completions(
    inbox: Res<CompletionInbox>,
    mut session: ResMut<AskmeSession>,
    mut input: ResMut<QueryInput>,
    mut ev_ok: EventWriter<AskSucceeded>,
    mut ev_err: EventWriter<AskFailed>,
    mut ev_settled: EventWriter<AskSettled>,
) {
    loop {
        let completion = match inbox.rx.try_recv() {
            Ok(c) => c,
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => break,
        };

        let query = completion.query().clone();
        let settled = session.complete(completion);
        if settled == Settled::Applied {
            match session.state() {
                SessionState::Succeeded { content, .. } => {
                    ev_ok.write(AskSucceeded { query, content: content.clone() });
                }
                SessionState::Failed { reason, .. } => {
                    ev_err.write(AskFailed { query, kind: *reason });
                }
                SessionState::Idle | SessionState::Pending { .. } => {}
            }
        }

        // every finished attempt clears the input, superseded ones included
        input.0.clear();
        ev_settled.write(AskSettled { applied: settled == Settled::Applied });
    }
}
