//! The per-turn state machine.
//!
//! ```text
//! RECEIVED ─► HISTORY_LOADED ─► RETRIEVAL_DECISION ─┬─► RETRIEVING ─► RETRIEVED ──┐
//!                                                    └─► SKIP_RETRIEVAL ──────────┤
//!                                                                                  ▼
//!            PERSISTED ◄─ RESPONDED ◄─ GENERATING ◄──────────────── PROMPT_ASSEMBLED
//! ```
//!
//! Each state is a [`TurnState`] variant and each arrow one call to
//! `Orchestrator::step`. The thread lease taken on entry to
//! `HISTORY_LOADED` is carried by the turn and released once the exchange
//! has been appended, so two turns on one thread never interleave.

use std::future::Future;
use std::sync::Arc;

use mall_catalog::ShopRecord;
use mall_conversation::{
    AppendAck, ConversationTurn, Exchange, Role, ThreadId, ThreadLease, ThreadStore,
};
use mall_retrieval::{RetrievalCandidate, Retriever};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::{GenerationError, Result, TurnError};
use crate::generation::{GenerationClient, ModelConfig};
use crate::policy::{HeuristicPolicy, RetrievalDecision, RetrievalPolicy};
use crate::prompt::PromptEnvelope;
use crate::reply::AssistantReply;

/// One visitor message addressed to a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub thread_id: String,

    pub utterance: String,

    /// Client-supplied id making retries idempotent. Generated when absent.
    #[serde(default)]
    pub exchange_id: Option<Uuid>,

    #[serde(default)]
    pub overrides: TurnOverrides,
}

impl TurnRequest {
    pub fn new(thread_id: impl Into<String>, utterance: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            utterance: utterance.into(),
            exchange_id: None,
            overrides: TurnOverrides::default(),
        }
    }

    pub fn with_exchange_id(mut self, exchange_id: Uuid) -> Self {
        self.exchange_id = Some(exchange_id);
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.overrides.top_k = Some(top_k);
        self
    }

    pub fn with_model(mut self, model: ModelConfig) -> Self {
        self.overrides.model = Some(model);
        self
    }
}

/// Per-request replacements for configured values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnOverrides {
    pub top_k: Option<usize>,
    pub model: Option<ModelConfig>,
}

/// Names of the states a turn passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnPhase {
    Received,
    HistoryLoaded,
    RetrievalDecision,
    Retrieving,
    Retrieved,
    SkipRetrieval,
    PromptAssembled,
    Generating,
    Responded,
    Persisted,
}

/// What happened to the exchange after generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Persistence {
    /// Both turns were appended.
    Persisted,

    /// The exchange id was already stored; the thread is unchanged.
    AlreadyPersisted,

    /// The append failed. The reply is valid but the thread does not
    /// contain it.
    Unpersisted { reason: String },
}

impl Persistence {
    pub fn is_persisted(&self) -> bool {
        !matches!(self, Persistence::Unpersisted { .. })
    }
}

/// Result of a completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub thread_id: ThreadId,

    pub exchange_id: Uuid,

    pub reply: AssistantReply,

    /// Full thread history including this exchange.
    pub history: Vec<ConversationTurn>,

    /// Shops the reply was grounded on, in rank order.
    pub context: Vec<ShopRecord>,

    pub decision: RetrievalDecision,

    /// States visited, in order.
    pub trace: Vec<TurnPhase>,

    pub persistence: Persistence,
}

/// Data a turn accumulates between `HISTORY_LOADED` and `PERSISTED`.
#[derive(Debug)]
pub struct TurnContext {
    pub thread_id: ThreadId,
    pub utterance: String,
    pub exchange_id: Uuid,
    pub top_k: usize,
    pub model: ModelConfig,

    /// Full stored history, oldest first.
    pub history: Vec<ConversationTurn>,

    pub decision: RetrievalDecision,

    lease: ThreadLease,
}

/// A turn in one of its states.
#[derive(Debug)]
pub enum TurnState {
    Received(TurnRequest),
    HistoryLoaded(TurnContext),
    RetrievalDecision(TurnContext, RetrievalDecision),
    Retrieving(TurnContext),
    Retrieved(TurnContext, Vec<RetrievalCandidate>),
    SkipRetrieval(TurnContext, Vec<ShopRecord>, Option<usize>),
    PromptAssembled(TurnContext, PromptEnvelope),
    Generating(TurnContext, PromptEnvelope),
    Responded(TurnContext, PromptEnvelope, AssistantReply),
    Persisted(Box<TurnOutcome>),
}

impl TurnState {
    pub fn phase(&self) -> TurnPhase {
        match self {
            TurnState::Received(_) => TurnPhase::Received,
            TurnState::HistoryLoaded(_) => TurnPhase::HistoryLoaded,
            TurnState::RetrievalDecision(..) => TurnPhase::RetrievalDecision,
            TurnState::Retrieving(_) => TurnPhase::Retrieving,
            TurnState::Retrieved(..) => TurnPhase::Retrieved,
            TurnState::SkipRetrieval(..) => TurnPhase::SkipRetrieval,
            TurnState::PromptAssembled(..) => TurnPhase::PromptAssembled,
            TurnState::Generating(..) => TurnPhase::Generating,
            TurnState::Responded(..) => TurnPhase::Responded,
            TurnState::Persisted(_) => TurnPhase::Persisted,
        }
    }

    /// Once a reply exists the turn runs to completion regardless of
    /// cancellation.
    pub fn is_committed(&self) -> bool {
        matches!(self, TurnState::Responded(..) | TurnState::Persisted(_))
    }
}

/// Runs conversational turns against injected collaborators.
///
/// Holds no per-thread state: any number of turns may run concurrently,
/// turns on the same thread are serialized by the store's lease.
pub struct Orchestrator {
    retriever: Arc<Retriever>,
    store: Arc<dyn ThreadStore>,
    generator: Arc<dyn GenerationClient>,
    policy: Arc<dyn RetrievalPolicy>,
    config: OrchestratorConfig,
    generation_permits: Semaphore,
}

impl Orchestrator {
    /// Create an orchestrator using the [`HeuristicPolicy`].
    pub fn new(
        retriever: Arc<Retriever>,
        store: Arc<dyn ThreadStore>,
        generator: Arc<dyn GenerationClient>,
        config: OrchestratorConfig,
    ) -> Self {
        let permits = config.max_concurrent_generations.max(1);
        Self {
            retriever,
            store,
            generator,
            policy: Arc::new(HeuristicPolicy),
            config,
            generation_permits: Semaphore::new(permits),
        }
    }

    /// Replace the retrieval decision strategy.
    pub fn with_policy(mut self, policy: Arc<dyn RetrievalPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Stored history of a thread; empty for unknown threads.
    pub async fn history(&self, thread_id: &str) -> Result<Vec<ConversationTurn>> {
        let thread_id = parse_thread_id(thread_id)?;
        self.store.load(&thread_id).await.map_err(TurnError::ThreadStore)
    }

    /// Run one turn to completion.
    pub async fn run_turn(&self, request: TurnRequest) -> Result<TurnOutcome> {
        self.run_turn_with_cancel(request, CancellationToken::new()).await
    }

    /// Run one turn, giving up with [`TurnError::Cancelled`] if `cancel`
    /// fires before a reply has been generated.
    pub async fn run_turn_with_cancel(
        &self,
        request: TurnRequest,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome> {
        let mut trace = Vec::new();
        let mut state = TurnState::Received(request);
        loop {
            trace.push(state.phase());
            state = match state {
                TurnState::Persisted(mut outcome) => {
                    outcome.trace = trace;
                    info!(
                        "Turn {} on {} finished with {} shops ({:?})",
                        outcome.exchange_id,
                        outcome.thread_id,
                        outcome.context.len(),
                        outcome.persistence
                    );
                    return Ok(*outcome);
                }
                state if !state.is_committed() && cancel.is_cancelled() => {
                    debug!("Turn cancelled in {:?}", state.phase());
                    return Err(TurnError::Cancelled);
                }
                state => self
                    .step(state, &cancel)
                    .await
                    .inspect_err(|e| warn!("Turn aborted: {e}"))?,
            };
        }
    }

    /// Perform one transition.
    pub async fn step(&self, state: TurnState, cancel: &CancellationToken) -> Result<TurnState> {
        match state {
            TurnState::Received(request) => self.load_history(request, cancel).await,
            TurnState::HistoryLoaded(ctx) => Ok(self.decide(ctx)),
            TurnState::RetrievalDecision(ctx, decision) => Ok(match decision {
                RetrievalDecision::NeedsRetrieval => TurnState::Retrieving(ctx),
                RetrievalDecision::ReuseContext { candidates, focus } => {
                    TurnState::SkipRetrieval(ctx, candidates, focus)
                }
            }),
            TurnState::Retrieving(ctx) => {
                let retrieval = self.retriever.retrieve(&ctx.utterance, ctx.top_k);
                let candidates = cancellable(cancel, retrieval).await??;
                Ok(TurnState::Retrieved(ctx, candidates))
            }
            TurnState::Retrieved(ctx, candidates) => {
                let shops = candidates.into_iter().map(|c| c.shop).collect();
                Ok(self.assemble(ctx, shops, None))
            }
            TurnState::SkipRetrieval(ctx, shops, focus) => Ok(self.assemble(ctx, shops, focus)),
            TurnState::PromptAssembled(ctx, envelope) => Ok(TurnState::Generating(ctx, envelope)),
            TurnState::Generating(ctx, envelope) => self.generate(ctx, envelope, cancel).await,
            TurnState::Responded(ctx, envelope, reply) => {
                Ok(self.persist(ctx, envelope.context, reply).await)
            }
            TurnState::Persisted(outcome) => Ok(TurnState::Persisted(outcome)),
        }
    }

    async fn load_history(
        &self,
        request: TurnRequest,
        cancel: &CancellationToken,
    ) -> Result<TurnState> {
        let thread_id = parse_thread_id(&request.thread_id)?;
        let utterance = request.utterance.trim().to_string();
        if utterance.is_empty() {
            return Err(TurnError::InvalidInput("utterance is empty".to_string()));
        }
        let top_k = request
            .overrides
            .top_k
            .or(self.config.top_k)
            .unwrap_or(self.retriever.config().top_k);
        if top_k == 0 {
            return Err(TurnError::InvalidInput("top_k must be at least 1".to_string()));
        }
        let model = request.overrides.model.unwrap_or_else(|| self.config.model.clone());
        let exchange_id = request.exchange_id.unwrap_or_else(Uuid::new_v4);

        let lease = cancellable(cancel, self.store.lease(&thread_id)).await?;
        let history = cancellable(cancel, self.store.load(&thread_id))
            .await?
            .map_err(TurnError::ThreadStore)?;
        debug!("Loaded {} turns of {thread_id}", history.len());

        Ok(TurnState::HistoryLoaded(TurnContext {
            thread_id,
            utterance,
            exchange_id,
            top_k,
            model,
            history,
            decision: RetrievalDecision::NeedsRetrieval,
            lease,
        }))
    }

    fn decide(&self, mut ctx: TurnContext) -> TurnState {
        let stored = ctx
            .history
            .iter()
            .find(|t| t.role == Role::Assistant && t.exchange_id == ctx.exchange_id)
            .map(|t| (t.content.clone(), t.context.clone()));
        if let Some((text, context)) = stored {
            info!(
                "Exchange {} already stored on {}, replaying its reply",
                ctx.exchange_id, ctx.thread_id
            );
            return TurnState::Persisted(Box::new(TurnOutcome {
                thread_id: ctx.thread_id,
                exchange_id: ctx.exchange_id,
                reply: AssistantReply {
                    text,
                    shops: context.iter().map(|s| s.name.clone()).collect(),
                    structured: false,
                },
                history: ctx.history,
                context: context.clone(),
                decision: RetrievalDecision::ReuseContext {
                    candidates: context,
                    focus: None,
                },
                trace: Vec::new(),
                persistence: Persistence::AlreadyPersisted,
            }));
        }

        let decision = self.policy.decide(&ctx.utterance, &ctx.history);
        debug!("{} policy decided {decision:?}", self.policy.name());
        ctx.decision = decision.clone();
        TurnState::RetrievalDecision(ctx, decision)
    }

    fn assemble(
        &self,
        ctx: TurnContext,
        shops: Vec<ShopRecord>,
        focus: Option<usize>,
    ) -> TurnState {
        let envelope = PromptEnvelope::new(
            self.config.persona.as_str(),
            &ctx.history,
            self.config.history_window,
            shops,
            focus,
            ctx.utterance.as_str(),
        );
        TurnState::PromptAssembled(ctx, envelope)
    }

    async fn generate(
        &self,
        ctx: TurnContext,
        envelope: PromptEnvelope,
        cancel: &CancellationToken,
    ) -> Result<TurnState> {
        let prompt = envelope.render();
        let _permit = cancellable(cancel, self.generation_permits.acquire())
            .await?
            .map_err(|_| GenerationError::Api("generation limiter closed".to_string()))?;

        let deadline = self.config.generation_timeout();
        debug!("Generating with {} ({})", self.generator.name(), ctx.model.model_name);
        let completion = timeout(deadline, self.generator.complete(&prompt, &ctx.model));
        let raw = match cancellable(cancel, completion).await? {
            Ok(result) => result?,
            Err(_) => return Err(GenerationError::Timeout(deadline).into()),
        };
        let reply = AssistantReply::parse(&raw)?;
        Ok(TurnState::Responded(ctx, envelope, reply))
    }

    async fn persist(
        &self,
        ctx: TurnContext,
        context: Vec<ShopRecord>,
        reply: AssistantReply,
    ) -> TurnState {
        let exchange = Exchange::new(
            ctx.exchange_id,
            ctx.utterance.as_str(),
            reply.text.as_str(),
            context.clone(),
        );
        let persistence = match self.store.append(&ctx.thread_id, exchange.clone()).await {
            Ok(AppendAck::Appended) => Persistence::Persisted,
            Ok(AppendAck::AlreadyPresent) => Persistence::AlreadyPersisted,
            Err(e) => {
                warn!("Reply for {} generated but not stored: {e}", ctx.thread_id);
                Persistence::Unpersisted { reason: e.to_string() }
            }
        };

        let TurnContext {
            thread_id,
            exchange_id,
            mut history,
            decision,
            lease,
            ..
        } = ctx;
        drop(lease);

        let next = history.last().map_or(1, |t| t.sequence + 1);
        history.extend(exchange.into_turns(next));

        TurnState::Persisted(Box::new(TurnOutcome {
            thread_id,
            exchange_id,
            reply,
            history,
            context,
            decision,
            trace: Vec::new(),
            persistence,
        }))
    }
}

fn parse_thread_id(raw: &str) -> Result<ThreadId> {
    ThreadId::parse(raw).map_err(|e| TurnError::InvalidInput(e.to_string()))
}

/// Await `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TurnError::Cancelled),
        output = fut => Ok(output),
    }
}
