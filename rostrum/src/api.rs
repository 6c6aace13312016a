//! Session lifecycle API — the programmatic surface transports wrap.
//!
//! Rejecting calls never mutates state: every error path returns before the
//! session is touched. Sessions run as spawned tasks; the service holds the
//! shared process-wide structures (pool, breakers, ledger, event bus).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::analytics::AnalysisKind;
use crate::analyzer::ArgumentAnalyzer;
use crate::config::DebateConfig;
use crate::error::ApiError;
use crate::events::types::DebateEvent;
use crate::events::{SequencedEvent, SharedEventBus};
use crate::orchestrator::{DebateRuntime, SessionCommand};
use crate::pool::{ModelPool, RotationStrategy};
use crate::resilience::ResilientClient;
use crate::session::phase::Role;
use crate::session::{DebatePhase, Session, SessionStatus, Turn};

/// Command mailbox depth per session.
const MAILBOX_CAPACITY: usize = 16;

/// Inputs to `create_session`.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub topic: String,
    pub reference: Option<String>,
    pub debater_count: u8,
    pub rotation_strategy: Option<RotationStrategy>,
    pub max_rounds: Option<u32>,
    pub session_budget_ms: Option<u64>,
}

impl SessionRequest {
    pub fn new(topic: impl Into<String>, debater_count: u8) -> Self {
        Self {
            topic: topic.into(),
            reference: None,
            debater_count,
            rotation_strategy: None,
            max_rounds: None,
            session_budget_ms: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_strategy(mut self, strategy: RotationStrategy) -> Self {
        self.rotation_strategy = Some(strategy);
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    pub fn with_budget_ms(mut self, budget_ms: u64) -> Self {
        self.session_budget_ms = Some(budget_ms);
        self
    }
}

/// Result of session creation.
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub id: String,
    pub assignment: HashMap<Role, String>,
}

/// A single analytics artefact, as requested by kind.
#[derive(Debug, Clone)]
pub enum AnalyticsArtifact {
    Chains(crate::analytics::ChainAnalysis),
    Consensus(crate::analytics::ConsensusReport),
    Judgment(crate::analytics::Judgment),
    Report(crate::analytics::FinalReport),
}

struct SessionEntry {
    session: Arc<RwLock<Session>>,
    commands: mpsc::Sender<SessionCommand>,
    /// Present until `start_session` consumes it.
    mailbox: Option<mpsc::Receiver<SessionCommand>>,
    cancel: CancellationToken,
}

/// The debate service.
pub struct DebateService {
    config: DebateConfig,
    pool: Arc<ModelPool>,
    client: Arc<ResilientClient>,
    analyzer: Arc<ArgumentAnalyzer>,
    bus: SharedEventBus,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl DebateService {
    pub fn new(
        config: DebateConfig,
        pool: Arc<ModelPool>,
        client: Arc<ResilientClient>,
        analyzer: Arc<ArgumentAnalyzer>,
        bus: SharedEventBus,
    ) -> Result<Self, ApiError> {
        config.validate()?;
        Ok(Self {
            config,
            pool,
            client,
            analyzer,
            bus,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// The shared event bus.
    pub fn bus(&self) -> &SharedEventBus {
        &self.bus
    }

    /// Subscribe to the live event stream.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SequencedEvent> {
        self.bus.subscribe()
    }

    /// Ordered event history for one session.
    pub fn history(&self, session_id: &str) -> Vec<SequencedEvent> {
        self.bus.history(session_id)
    }

    /// Create a session; nothing runs until `start_session`.
    pub fn create_session(&self, request: SessionRequest) -> Result<CreatedSession, ApiError> {
        if request.debater_count < 2 {
            return Err(ApiError::InvalidConfig(format!(
                "at least two debaters required, got {}",
                request.debater_count
            )));
        }
        if request.topic.trim().is_empty() {
            return Err(ApiError::InvalidConfig("topic is empty".into()));
        }

        let mut config = self.config.clone();
        if let Some(strategy) = request.rotation_strategy {
            config.rotation_strategy = strategy;
        }
        if let Some(max_rounds) = request.max_rounds {
            config.max_rounds = max_rounds;
            config.min_rounds = config.min_rounds.min(max_rounds);
        }
        if let Some(budget_ms) = request.session_budget_ms {
            config.session_budget_ms = budget_ms;
        }
        config.validate()?;

        let assignment = self.pool.initial_assignment(request.debater_count);
        let session = Session::new(
            request.topic,
            request.reference,
            request.debater_count,
            assignment.clone(),
            config.clone(),
        );
        let id = session.id.clone();

        self.client
            .ledger()
            .register(&id, config.session_retry_budget);

        let (commands, mailbox) = mpsc::channel(MAILBOX_CAPACITY);
        self.sessions.lock().expect("session table poisoned").insert(
            id.clone(),
            SessionEntry {
                session: Arc::new(RwLock::new(session)),
                commands,
                mailbox: Some(mailbox),
                cancel: CancellationToken::new(),
            },
        );

        info!(session_id = %id, "session created");
        Ok(CreatedSession { id, assignment })
    }

    /// Start a created session. The debate runs on its own task.
    pub fn start_session(&self, session_id: &str) -> Result<(), ApiError> {
        let (session, mailbox, cancel, config) = {
            let mut sessions = self.sessions.lock().expect("session table poisoned");
            let entry = sessions
                .get_mut(session_id)
                .ok_or_else(|| ApiError::NotFound(session_id.to_string()))?;
            let mailbox = entry
                .mailbox
                .take()
                .ok_or_else(|| ApiError::AlreadyStarted(session_id.to_string()))?;
            (
                entry.session.clone(),
                mailbox,
                entry.cancel.clone(),
                self.config.clone(),
            )
        };

        // The per-session config may carry overrides; read it back.
        let session_config = session
            .try_read()
            .map(|s| s.config.clone())
            .unwrap_or(config);

        let runtime = DebateRuntime::new(
            session,
            session_config,
            self.pool.clone(),
            self.client.clone(),
            self.analyzer.clone(),
            self.bus.clone(),
            mailbox,
            cancel,
            session_id.to_string(),
        );
        tokio::spawn(runtime.run());
        Ok(())
    }

    /// Request a pause after the in-flight turn.
    pub async fn pause_session(&self, session_id: &str) -> Result<(), ApiError> {
        let (session, commands) = self.live_entry(session_id)?;
        let status = session.read().await.status;
        if status != SessionStatus::Running {
            return Err(ApiError::InvalidState {
                operation: "pause".to_string(),
                status: status.to_string(),
            });
        }
        commands
            .send(SessionCommand::Pause)
            .await
            .map_err(|_| ApiError::InvalidState {
                operation: "pause".to_string(),
                status: "terminated".to_string(),
            })
    }

    /// Resume a paused session at the next turn of the same phase.
    pub async fn resume_session(&self, session_id: &str) -> Result<(), ApiError> {
        let (session, commands) = self.live_entry(session_id)?;
        let status = session.read().await.status;
        if status != SessionStatus::Paused {
            return Err(ApiError::InvalidState {
                operation: "resume".to_string(),
                status: status.to_string(),
            });
        }
        commands
            .send(SessionCommand::Resume)
            .await
            .map_err(|_| ApiError::InvalidState {
                operation: "resume".to_string(),
                status: "terminated".to_string(),
            })
    }

    /// Cancel immediately. The in-flight turn's result is discarded.
    pub async fn cancel_session(&self, session_id: &str) -> Result<(), ApiError> {
        let (session, cancel, never_started) = {
            let sessions = self.sessions.lock().expect("session table poisoned");
            let entry = sessions
                .get(session_id)
                .ok_or_else(|| ApiError::NotFound(session_id.to_string()))?;
            (
                entry.session.clone(),
                entry.cancel.clone(),
                entry.mailbox.is_some(),
            )
        };

        cancel.cancel();

        if never_started {
            // No runtime task exists; settle the record here.
            let mut session = session.write().await;
            if !session.status.is_terminal() {
                let _ = session.transition(DebatePhase::Cancelled, "cancelled before start");
                self.bus.publish(DebateEvent::SessionEnded {
                    session_id: session_id.to_string(),
                    status: SessionStatus::Cancelled,
                    reason: Some("cancelled before start".to_string()),
                    timestamp: Utc::now(),
                });
            }
        }
        Ok(())
    }

    /// Full session snapshot.
    pub async fn get_session(&self, session_id: &str) -> Result<Session, ApiError> {
        let session = self.session_handle(session_id)?;
        let snapshot = session.read().await.clone();
        Ok(snapshot)
    }

    /// Ordered turns from `from` (0 = everything).
    pub async fn get_transcript(
        &self,
        session_id: &str,
        from: usize,
    ) -> Result<Vec<Turn>, ApiError> {
        let session = self.session_handle(session_id)?;
        let turns = session.read().await.transcript_from(from);
        Ok(turns)
    }

    /// One analytics artefact; NOT_READY until the debate was judged.
    pub async fn get_analytics(
        &self,
        session_id: &str,
        kind: AnalysisKind,
    ) -> Result<AnalyticsArtifact, ApiError> {
        let session = self.session_handle(session_id)?;
        let session = session.read().await;
        let analytics = session
            .analytics
            .as_ref()
            .ok_or_else(|| ApiError::NotReady("analytics not produced yet".to_string()))?;

        match kind {
            AnalysisKind::Report => Ok(AnalyticsArtifact::Report(analytics.report.clone())),
            AnalysisKind::Chains => analytics
                .chains
                .clone()
                .map(AnalyticsArtifact::Chains)
                .ok_or_else(|| ApiError::NotReady("chain analysis was omitted".to_string())),
            AnalysisKind::Consensus => analytics
                .consensus
                .clone()
                .map(AnalyticsArtifact::Consensus)
                .ok_or_else(|| ApiError::NotReady("consensus analysis was omitted".to_string())),
            AnalysisKind::Judgment => analytics
                .judgment
                .clone()
                .map(AnalyticsArtifact::Judgment)
                .ok_or_else(|| ApiError::NotReady("judgment analysis was omitted".to_string())),
        }
    }

    /// Change the rotation strategy; takes effect at the next phase
    /// boundary.
    pub async fn set_rotation_strategy(
        &self,
        session_id: &str,
        strategy: RotationStrategy,
    ) -> Result<(), ApiError> {
        let session = self.session_handle(session_id)?;
        let mut session = session.write().await;
        if session.status.is_terminal() {
            return Err(ApiError::InvalidState {
                operation: "set_rotation_strategy".to_string(),
                status: session.status.to_string(),
            });
        }
        session.config.rotation_strategy = strategy;
        Ok(())
    }

    fn session_handle(&self, session_id: &str) -> Result<Arc<RwLock<Session>>, ApiError> {
        self.sessions
            .lock()
            .expect("session table poisoned")
            .get(session_id)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| ApiError::NotFound(session_id.to_string()))
    }

    /// Handle plus mailbox for a session that has been started.
    fn live_entry(
        &self,
        session_id: &str,
    ) -> Result<(Arc<RwLock<Session>>, mpsc::Sender<SessionCommand>), ApiError> {
        let sessions = self.sessions.lock().expect("session table poisoned");
        let entry = sessions
            .get(session_id)
            .ok_or_else(|| ApiError::NotFound(session_id.to_string()))?;
        if entry.mailbox.is_some() {
            return Err(ApiError::InvalidState {
                operation: "control".to_string(),
                status: "pending".to_string(),
            });
        }
        Ok((entry.session.clone(), entry.commands.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ModelClient, ModelProvider, TurnPrompt};
    use crate::client::{Completion, FinishReason};
    use crate::error::InvokeError;
    use crate::events::EventBus;
    use crate::pool::{CostTier, ModelSpec};
    use crate::resilience::{BreakerConfig, BreakerTable, RetryLedger, RetryPolicy};
    use async_trait::async_trait;

    struct EchoProvider;

    #[async_trait]
    impl ModelProvider for EchoProvider {
        async fn complete(
            &self,
            _model: &str,
            _prompt: &TurnPrompt,
            _max_tokens: u32,
        ) -> Result<Completion, InvokeError> {
            Ok(Completion {
                text: "echo".to_string(),
                input_tokens: 10,
                output_tokens: 10,
                latency_ms: 0,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    fn service() -> DebateService {
        let pool = Arc::new(
            ModelPool::new(vec![
                ModelSpec::new("alpha", CostTier::Standard),
                ModelSpec::new("bravo", CostTier::Standard),
                ModelSpec::new("charlie", CostTier::Premium),
            ])
            .unwrap(),
        );
        let client = Arc::new(ResilientClient::new(
            ModelClient::new(Arc::new(EchoProvider)),
            RetryPolicy::default(),
            Arc::new(RetryLedger::new()),
            Arc::new(BreakerTable::new(BreakerConfig::default())),
        ));
        let analyzer = Arc::new(ArgumentAnalyzer::new(Default::default()).unwrap());
        DebateService::new(
            DebateConfig::default(),
            pool,
            client,
            analyzer,
            EventBus::new().shared(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_rejects_single_debater() {
        let service = service();
        let err = service
            .create_session(SessionRequest::new("topic", 1))
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_topic() {
        let service = service();
        let err = service
            .create_session(SessionRequest::new("  ", 2))
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_create_returns_assignment() {
        let service = service();
        let created = service
            .create_session(SessionRequest::new("topic", 2))
            .unwrap();
        assert_eq!(created.assignment.len(), 3);
        assert!(created.assignment.contains_key(&Role::Judge));

        let session = service.get_session(&created.id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let service = service();
        assert!(matches!(
            service.get_session("ghost").await.unwrap_err(),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            service.cancel_session("ghost").await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let service = service();
        let created = service
            .create_session(SessionRequest::new("topic", 2))
            .unwrap();
        service.start_session(&created.id).unwrap();
        assert!(matches!(
            service.start_session(&created.id).unwrap_err(),
            ApiError::AlreadyStarted(_)
        ));
    }

    #[tokio::test]
    async fn test_pause_before_start_is_invalid_state() {
        let service = service();
        let created = service
            .create_session(SessionRequest::new("topic", 2))
            .unwrap();
        assert!(matches!(
            service.pause_session(&created.id).await.unwrap_err(),
            ApiError::InvalidState { .. }
        ));
    }

    #[tokio::test]
    async fn test_analytics_not_ready_before_judgment() {
        let service = service();
        let created = service
            .create_session(SessionRequest::new("topic", 2))
            .unwrap();
        assert!(matches!(
            service
                .get_analytics(&created.id, AnalysisKind::Report)
                .await
                .unwrap_err(),
            ApiError::NotReady(_)
        ));
    }

    #[tokio::test]
    async fn test_cancel_before_start_settles_record() {
        let service = service();
        let created = service
            .create_session(SessionRequest::new("topic", 2))
            .unwrap();
        service.cancel_session(&created.id).await.unwrap();

        let session = service.get_session(&created.id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Cancelled);
        // Record remains retrievable; transcript is empty.
        assert!(service
            .get_transcript(&created.id, 0)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_max_rounds_override_clamps_min() {
        let service = service();
        let created = service
            .create_session(SessionRequest::new("topic", 2).with_max_rounds(2))
            .unwrap();
        let session = service.get_session(&created.id).await.unwrap();
        assert_eq!(session.config.max_rounds, 2);
        assert_eq!(session.config.min_rounds, 2);
    }
}
