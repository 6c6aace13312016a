//! Debate orchestrator — the per-session runtime task.
//!
//! One spawned task per session, strictly serial inside it: the task is the
//! single writer of the session's transcript. Control arrives through a
//! command mailbox (pause/resume) and a cancellation token; the only real
//! suspension point is the model call.
//!
//! ## Step loop
//!
//! ```text
//! run()
//!   → Opening        one turn per debater, declared order
//!   → FirstRound     round 1 of the middle plan
//!   → Rebuttal       rounds 2..plan (round manager adjusts the plan)
//!   → CrossExam      final middle round, only when the plan reached 4+
//!   → Closing        one turn per debater
//!   → Judgment       single judge turn, then analytics
//!   → Completed
//! ```
//!
//! Failures follow §error policy: retriable kinds are already absorbed by
//! the resilient client; what surfaces here triggers one emergency
//! role-swap and a single retry before the session fails.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analytics::run_analytics;
use crate::analyzer::ArgumentAnalyzer;
use crate::client::TurnPrompt;
use crate::config::DebateConfig;
use crate::context::snapshot_round;
use crate::error::{FailureKind, InvokeError};
use crate::events::types::DebateEvent;
use crate::events::SharedEventBus;
use crate::pool::{ModelPool, RotationDecision, RotationEngine};
use crate::prompts;
use crate::resilience::ResilientClient;
use crate::rounds::{AdaptiveRoundManager, RoundAction};
use crate::session::phase::{round_speakers, DebatePhase, Role};
use crate::session::{Session, SessionStatus, Turn};

/// Control commands delivered through the session mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Pause,
    Resume,
    Cancel,
}

/// Why the step loop stopped before completion.
#[derive(Debug, Clone)]
enum Interrupt {
    Cancelled,
    Failed { reason: String },
}

type StepResult<T> = Result<T, Interrupt>;

/// The per-session runtime.
pub struct DebateRuntime {
    session: Arc<RwLock<Session>>,
    pool: Arc<ModelPool>,
    client: Arc<ResilientClient>,
    analyzer: Arc<ArgumentAnalyzer>,
    bus: SharedEventBus,
    commands: mpsc::Receiver<SessionCommand>,
    cancel: CancellationToken,
    rounds: AdaptiveRoundManager,
    config: DebateConfig,
    session_id: String,
    started: Instant,
    /// Current middle-round plan; EXTEND/REDUCE move it within bounds.
    planned_rounds: u32,
    /// Lowest scorer of the last middle round, for cross-examination.
    cross_asker: Option<u8>,
}

impl DebateRuntime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<RwLock<Session>>,
        config: DebateConfig,
        pool: Arc<ModelPool>,
        client: Arc<ResilientClient>,
        analyzer: Arc<ArgumentAnalyzer>,
        bus: SharedEventBus,
        commands: mpsc::Receiver<SessionCommand>,
        cancel: CancellationToken,
        session_id: String,
    ) -> Self {
        let rounds = AdaptiveRoundManager::from_config(&config);
        let planned_rounds = config.min_rounds;
        Self {
            session,
            pool,
            client,
            analyzer,
            bus,
            commands,
            cancel,
            rounds,
            config,
            session_id,
            started: Instant::now(),
            planned_rounds,
            cross_asker: None,
        }
    }

    /// Drive the session to a terminal state. Consumes the runtime.
    pub async fn run(mut self) {
        self.started = Instant::now();
        {
            let mut session = self.session.write().await;
            if session.status.is_terminal() {
                // Cancelled (or settled) before the task got scheduled.
                return;
            }
            session.status = SessionStatus::Running;
            session.started_at = Some(Utc::now());
        }
        let topic = self.session.read().await.topic.clone();
        self.bus.publish(DebateEvent::SessionStarted {
            session_id: self.session_id.clone(),
            topic,
            timestamp: Utc::now(),
        });
        info!(session_id = %self.session_id, "debate session started");

        let outcome = self.drive().await;

        let (status, reason) = match outcome {
            Ok(()) => (SessionStatus::Completed, None),
            Err(Interrupt::Cancelled) => (SessionStatus::Cancelled, Some("cancel requested".to_string())),
            Err(Interrupt::Failed { reason }) => (SessionStatus::Failed, Some(reason)),
        };

        {
            let mut session = self.session.write().await;
            if !session.status.is_terminal() {
                let terminal_phase = match status {
                    SessionStatus::Completed => DebatePhase::Completed,
                    SessionStatus::Cancelled => DebatePhase::Cancelled,
                    _ => DebatePhase::Failed,
                };
                let note = reason.clone().unwrap_or_else(|| "debate complete".to_string());
                if let Err(err) = session.transition(terminal_phase, &note) {
                    warn!(session_id = %self.session_id, %err, "terminal transition rejected");
                }
                session.failure_reason = reason.clone();
            }
        }

        self.client.ledger().release(&self.session_id);

        let final_status = self.session.read().await.status;
        self.bus.publish(DebateEvent::SessionEnded {
            session_id: self.session_id.clone(),
            status: final_status,
            reason,
            timestamp: Utc::now(),
        });
        info!(session_id = %self.session_id, status = %final_status, "debate session ended");
    }

    async fn drive(&mut self) -> StepResult<()> {
        // Opening statements.
        self.enter_phase(DebatePhase::Opening).await?;
        self.run_scripted_round(DebatePhase::Opening).await?;

        // Middle rounds under the adaptive plan.
        let mut phase = DebatePhase::FirstRound;
        self.enter_phase(phase).await?;
        loop {
            self.run_scripted_round(phase).await?;

            let action = self.close_round(phase).await?;
            match action {
                RoundAction::TerminateEarly => {
                    self.enter_phase(DebatePhase::Judgment).await?;
                    return self.run_judgment().await;
                }
                RoundAction::Reduce => break,
                RoundAction::Extend => {
                    self.planned_rounds = (self.planned_rounds + 1).min(self.config.max_rounds);
                }
                RoundAction::ContinueNormal => {}
            }

            let rounds_used = self.session.read().await.middle_rounds_used();
            match next_middle_phase(phase, rounds_used, self.planned_rounds) {
                None => break,
                Some(next) => {
                    if next != phase {
                        self.enter_phase(next).await?;
                        phase = next;
                    }
                }
            }
        }

        // Closing and judgment.
        self.enter_phase(DebatePhase::Closing).await?;
        self.run_scripted_round(DebatePhase::Closing).await?;
        self.enter_phase(DebatePhase::Judgment).await?;
        self.run_judgment().await
    }

    /// One round whose lineup is fixed by the phase table.
    ///
    /// Middle rounds get their snapshot (and decision) in `close_round`;
    /// other segments snapshot here so every round carries one.
    async fn run_scripted_round(&mut self, phase: DebatePhase) -> StepResult<()> {
        let debater_count = self.session.read().await.debater_count;
        let speakers = round_speakers(phase, debater_count, self.cross_asker);
        self.session.write().await.begin_round(phase, speakers.clone());
        for role in speakers {
            self.take_turn(role, phase).await?;
        }

        if !phase.is_middle() {
            let mut session = self.session.write().await;
            let snapshot = {
                let rounds = &session.rounds;
                let current = rounds.last().expect("round just ran");
                let previous = rounds.len().checked_sub(2).map(|i| &rounds[i]);
                snapshot_round(current, previous)
            };
            if let Some(round) = session.current_round_mut() {
                round.snapshot = Some(snapshot);
            }
        }
        Ok(())
    }

    /// Snapshot the finished round, consult the round manager, publish the
    /// decision, and remember the cross-examination asker.
    async fn close_round(&mut self, phase: DebatePhase) -> StepResult<RoundAction> {
        let mut session = self.session.write().await;

        let (current, previous) = {
            let rounds = &session.rounds;
            let current = rounds.last().expect("round just ran").clone();
            let previous = if rounds.len() >= 2 {
                Some(rounds[rounds.len() - 2].clone())
            } else {
                None
            };
            (current, previous)
        };

        let snapshot = snapshot_round(&current, previous.as_ref());
        let decision = self.rounds.evaluate(
            &current,
            &session.rounds[..session.rounds.len() - 1],
            session.middle_rounds_used(),
            self.planned_rounds,
            self.started.elapsed(),
            self.config.session_budget(),
        );

        self.cross_asker = current.lowest_scoring_debater();

        let round_index = current.index;
        if let Some(round) = session.current_round_mut() {
            round.snapshot = Some(snapshot);
            round.decision = Some(decision.clone());
        }
        drop(session);

        info!(
            session_id = %self.session_id,
            round = round_index,
            phase = %phase,
            action = %decision.action,
            score = decision.score,
            "round closed"
        );
        self.bus.publish(DebateEvent::RoundClosed {
            session_id: self.session_id.clone(),
            round_index,
            decision: decision.clone(),
            timestamp: Utc::now(),
        });

        Ok(decision.action)
    }

    async fn run_judgment(&mut self) -> StepResult<()> {
        self.run_scripted_round(DebatePhase::Judgment).await?;

        // Post-debate analytics run exactly once, after the verdict.
        let analytics = {
            let session = self.session.read().await;
            run_analytics(&session)
        };
        {
            let mut session = self.session.write().await;
            session.analytics = Some(analytics);
            session
                .transition(DebatePhase::Completed, "verdict delivered")
                .map_err(|e| Interrupt::Failed {
                    reason: format!("invariant violation: {e}"),
                })?;
        }
        Ok(())
    }

    /// Transition into `phase`, applying any rotation proposal first so the
    /// binding is constant for the whole phase.
    async fn enter_phase(&mut self, phase: DebatePhase) -> StepResult<()> {
        self.ensure_live().await?;
        self.apply_boundary_rotations().await;

        {
            let mut session = self.session.write().await;
            session
                .transition(phase, "phase plan")
                .map_err(|e| Interrupt::Failed {
                    reason: format!("invariant violation: {e}"),
                })?;
        }
        self.bus.publish(DebateEvent::PhaseEntered {
            session_id: self.session_id.clone(),
            phase,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Evaluate the rotation engine for every debater at a phase boundary.
    async fn apply_boundary_rotations(&mut self) {
        let (strategy, assignment, debater_count, trends) = {
            let session = self.session.read().await;
            let trends: std::collections::HashMap<Role, Vec<f64>> = {
                let mut map = std::collections::HashMap::new();
                for round in session.rounds.iter().filter(|r| r.phase.is_middle()) {
                    for (role, strength) in round.role_strengths() {
                        map.entry(role).or_insert_with(Vec::new).push(strength);
                    }
                }
                map
            };
            (
                session.config.rotation_strategy,
                session.assignment.clone(),
                session.debater_count,
                trends,
            )
        };

        let engine = RotationEngine::new(strategy, self.config.min_calls_before_rotation);
        let rounds_completed = self.session.read().await.middle_rounds_used();

        for role in Role::debaters(debater_count) {
            let Some(incumbent) = assignment.get(&role) else {
                continue;
            };
            let trend = trends.get(&role).cloned().unwrap_or_default();
            let proposal = engine.evaluate(
                role,
                incumbent,
                &self.pool,
                self.client.breakers(),
                rounds_completed,
                &trend,
            );
            let forced = if proposal.is_none() && self.client.breakers().is_open(incumbent) {
                // Breaker opened for this role's model since its last turn:
                // replace before the phase starts.
                engine.emergency_replacement(role, incumbent, &self.pool, self.client.breakers())
            } else {
                None
            };
            if let Some(decision) = proposal.or(forced) {
                self.apply_rotation(decision).await;
            }
        }
    }

    async fn apply_rotation(&self, decision: RotationDecision) {
        {
            let mut session = self.session.write().await;
            session
                .assignment
                .insert(decision.role, decision.new_model.clone());
            session.rotation_history.push(decision.clone());
        }
        info!(
            session_id = %self.session_id,
            role = %decision.role,
            old = %decision.old_model,
            new = %decision.new_model,
            reason = %decision.reason,
            "rotation applied"
        );
        self.bus.publish(DebateEvent::RotationApplied {
            session_id: self.session_id.clone(),
            decision,
            timestamp: Utc::now(),
        });
    }

    /// Execute one turn end to end: compose, invoke, analyze, commit.
    async fn take_turn(&mut self, role: Role, phase: DebatePhase) -> StepResult<()> {
        self.ensure_live().await?;

        if self.started.elapsed() >= self.config.session_budget() {
            return Err(Interrupt::Failed {
                reason: "session budget exhausted".to_string(),
            });
        }

        let (prompt, model) = {
            let session = self.session.read().await;
            let transcript: Vec<Turn> = session.turns().cloned().collect();
            let prompt = prompts::compose(
                phase,
                role,
                &session.topic,
                session.reference.as_deref(),
                &transcript,
                session.config.transcript_token_ceiling,
            );
            let model = session
                .assignment
                .get(&role)
                .cloned()
                .unwrap_or_else(|| "unassigned".to_string());
            (prompt, model)
        };

        let (completion, model) = self.invoke_with_failover(role, &model, &prompt).await?;

        // Analyze before committing: turns are immutable once appended.
        let (topic, prior) = {
            let session = self.session.read().await;
            (session.topic.clone(), session.turns().cloned().collect::<Vec<_>>())
        };
        let analysis = self
            .analyzer
            .analyze(&self.session_id, &completion.text, &topic, role, &prior, &self.cancel)
            .await;

        let tokens = completion.input_tokens + completion.output_tokens;
        self.pool.record_success(&model, completion.latency_ms, tokens);
        self.pool.record_strength(&model, analysis.strength);
        let tier_price = self
            .pool
            .spec(&model)
            .map(|spec| spec.tier.price_per_1k_tokens())
            .unwrap_or(0.0);

        let turn = {
            let mut session = self.session.write().await;
            session.stats.cost_estimate += tier_price * f64::from(tokens) / 1000.0;
            let turn = Turn {
                index: session.turn_count(),
                role,
                model: model.clone(),
                phase,
                content: completion.text.clone(),
                timestamp: Utc::now(),
                latency_ms: completion.latency_ms,
                input_tokens: completion.input_tokens,
                output_tokens: completion.output_tokens,
                analysis,
            };
            session.append_turn(turn.clone()).map_err(|e| Interrupt::Failed {
                reason: format!("invariant violation: {e}"),
            })?;
            turn
        };

        self.bus.publish(DebateEvent::TurnCompleted {
            session_id: self.session_id.clone(),
            turn,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Invoke the assigned model; on surfaced failure, swap the role to a
    /// healthy model once and retry, then give up.
    async fn invoke_with_failover(
        &mut self,
        role: Role,
        model: &str,
        prompt: &TurnPrompt,
    ) -> StepResult<(crate::client::Completion, String)> {
        let deadline = self.config.turn_deadline();
        let max_tokens = self.config.max_completion_tokens;

        let first_try = self
            .client
            .call(&self.session_id, model, prompt, max_tokens, deadline, &self.cancel)
            .await;

        let err = match first_try {
            Ok(completion) => return Ok((completion, model.to_string())),
            Err(InvokeError::Cancelled) => return Err(Interrupt::Cancelled),
            Err(err) => err,
        };

        let kind = err.kind().unwrap_or(FailureKind::Unavailable);
        self.record_turn_failure(model).await;
        warn!(session_id = %self.session_id, %role, model, %kind, "model call failed after policy");

        if kind.is_fatal() {
            return Err(Interrupt::Failed {
                reason: format!("fatal provider failure: {kind}"),
            });
        }
        if self.client.ledger().is_exhausted(&self.session_id) && kind.is_retriable() {
            return Err(Interrupt::Failed {
                reason: "session retry budget exhausted".to_string(),
            });
        }

        // Emergency role-swap, then exactly one more attempt.
        let strategy = self.session.read().await.config.rotation_strategy;
        let engine = RotationEngine::new(strategy, self.config.min_calls_before_rotation);
        let Some(decision) =
            engine.emergency_replacement(role, model, &self.pool, self.client.breakers())
        else {
            return Err(Interrupt::Failed {
                reason: format!("no healthy replacement for {model} ({kind})"),
            });
        };
        let replacement = decision.new_model.clone();
        self.apply_rotation(decision).await;

        match self
            .client
            .call(&self.session_id, &replacement, prompt, max_tokens, deadline, &self.cancel)
            .await
        {
            Ok(completion) => Ok((completion, replacement)),
            Err(InvokeError::Cancelled) => Err(Interrupt::Cancelled),
            Err(second) => {
                self.record_turn_failure(&replacement).await;
                Err(Interrupt::Failed {
                    reason: format!("replacement {replacement} also failed: {second}"),
                })
            }
        }
    }

    async fn record_turn_failure(&self, model: &str) {
        self.pool.record_failure(model);
        self.session.write().await.stats.error_count += 1;
    }

    /// Check cancellation and drain the command mailbox; parks while
    /// paused. Cancellation always wins over pause.
    async fn ensure_live(&mut self) -> StepResult<()> {
        if self.cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }

        let mut paused = false;
        while let Ok(command) = self.commands.try_recv() {
            match command {
                SessionCommand::Pause => paused = true,
                SessionCommand::Resume => paused = false,
                SessionCommand::Cancel => return Err(Interrupt::Cancelled),
            }
        }

        if paused {
            {
                let mut session = self.session.write().await;
                session.status = SessionStatus::Paused;
            }
            info!(session_id = %self.session_id, "session paused");
            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(Interrupt::Cancelled),
                    command = self.commands.recv() => match command {
                        Some(SessionCommand::Resume) => break,
                        Some(SessionCommand::Cancel) | None => return Err(Interrupt::Cancelled),
                        Some(SessionCommand::Pause) => {}
                    },
                }
            }
            {
                let mut session = self.session.write().await;
                session.status = SessionStatus::Running;
            }
            info!(session_id = %self.session_id, "session resumed");
        }
        Ok(())
    }
}

/// Where the middle of the debate goes after a round in `current`.
///
/// Returns `None` when the plan is used up. Cross-examination occupies the
/// final planned round only when the plan has grown to four or more.
fn next_middle_phase(
    current: DebatePhase,
    rounds_used: u32,
    planned_rounds: u32,
) -> Option<DebatePhase> {
    if rounds_used >= planned_rounds || current == DebatePhase::CrossExamination {
        return None;
    }
    if planned_rounds >= 4 && rounds_used == planned_rounds - 1 {
        return Some(DebatePhase::CrossExamination);
    }
    Some(DebatePhase::Rebuttal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_round_plan_skips_cross_examination() {
        // first_round done → rebuttal; two rebuttals; then out.
        assert_eq!(
            next_middle_phase(DebatePhase::FirstRound, 1, 3),
            Some(DebatePhase::Rebuttal)
        );
        assert_eq!(
            next_middle_phase(DebatePhase::Rebuttal, 2, 3),
            Some(DebatePhase::Rebuttal)
        );
        assert_eq!(next_middle_phase(DebatePhase::Rebuttal, 3, 3), None);
    }

    #[test]
    fn test_extended_plan_earns_cross_examination() {
        assert_eq!(
            next_middle_phase(DebatePhase::Rebuttal, 3, 4),
            Some(DebatePhase::CrossExamination)
        );
        // Cross-examination is always the last middle round.
        assert_eq!(next_middle_phase(DebatePhase::CrossExamination, 4, 4), None);
    }

    #[test]
    fn test_plan_exhaustion() {
        assert_eq!(next_middle_phase(DebatePhase::Rebuttal, 5, 5), None);
        assert_eq!(next_middle_phase(DebatePhase::FirstRound, 1, 1), None);
    }
}
