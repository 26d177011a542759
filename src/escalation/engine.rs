//! Escalation engine
//!
//! Watches phase changes and vote conclusions on the event bus, keeps one
//! timer per applicable timeout rule, and evaluates rules in priority order
//! when a trigger condition is observed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::notifier::{build_payload, Notifier};
use super::timers::{ActiveTimer, TimerTable};
use crate::config::{CouncilConfig, EscalationRule};
use crate::error::Result;
use crate::events::{CouncilEvent, EventBus};
use crate::models::{
    ActionType, Decision, DecisionOutcome, EscalationEvent, Session, SessionPhase, TriggerType,
};
use crate::store::CouncilStore;

/// Session operations the engine's actions need.
///
/// Implemented by the orchestrator; every call goes through its per-session
/// serialization.
#[async_trait]
pub trait SessionControl: Send + Sync {
    async fn session(&self, session_id: Uuid) -> Result<Session>;
    async fn escalate_to_human(&self, session_id: Uuid, message: &str) -> Result<Decision>;
    async fn restart_discussion(&self, session_id: Uuid) -> Result<Session>;
    async fn add_agent(&self, session_id: Uuid, agent_id: &str, rationale: &str) -> Result<()>;
    async fn auto_decide(
        &self,
        session_id: Uuid,
        outcome: DecisionOutcome,
        summary: &str,
    ) -> Result<Decision>;
}

pub struct EscalationEngine {
    /// Sorted by priority; ties keep declaration order
    rules: Vec<EscalationRule>,
    max_rounds: u32,
    control: Arc<dyn SessionControl>,
    store: Arc<dyn CouncilStore>,
    bus: EventBus,
    notifier: Arc<dyn Notifier>,
    fire_counts: Mutex<HashMap<Uuid, HashMap<String, u32>>>,
    timers: Mutex<TimerTable>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl EscalationEngine {
    pub fn new(
        config: &CouncilConfig,
        control: Arc<dyn SessionControl>,
        store: Arc<dyn CouncilStore>,
        bus: EventBus,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        let mut rules = config.rules.clone();
        rules.sort_by_key(|r| r.priority);

        Arc::new(Self {
            rules,
            max_rounds: config.deliberation.max_rounds,
            control,
            store,
            bus,
            notifier,
            fire_counts: Mutex::new(HashMap::new()),
            timers: Mutex::new(TimerTable::new()),
            listener: Mutex::new(None),
        })
    }

    pub fn rules(&self) -> &[EscalationRule] {
        &self.rules
    }

    /// Subscribe to the event bus and react to it until shutdown
    pub async fn start(self: &Arc<Self>) {
        let mut rx = self.bus.subscribe();
        let weak: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(engine) = weak.upgrade() else {
                            break;
                        };
                        engine.handle_event(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Escalation listener lagged behind the event bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        if let Some(previous) = self.listener.lock().await.replace(handle) {
            previous.abort();
        }
    }

    async fn handle_event(self: &Arc<Self>, event: CouncilEvent) {
        match event {
            CouncilEvent::PhaseChanged {
                session_id,
                to,
                round,
                ..
            } => self.on_phase_changed(session_id, to, round).await,
            CouncilEvent::VoteConcluded { session_id, tally } => {
                let observed = [
                    (!tally.quorum_met, TriggerType::QuorumNotMet),
                    (tally.veto_exercised, TriggerType::VetoExercised),
                    (tally.deadlocked, TriggerType::Deadlock),
                ];
                for (present, trigger) in observed {
                    if !present {
                        continue;
                    }
                    if let Err(e) = self
                        .evaluate_matching(session_id, trigger, Some(SessionPhase::Voting), None)
                        .await
                    {
                        warn!(session_id = %session_id, trigger = trigger.as_str(), "Evaluation failed: {}", e);
                    }
                }
            }
            _ => {}
        }
    }

    /// React to a session entering `phase`
    pub async fn on_phase_changed(self: &Arc<Self>, session_id: Uuid, phase: SessionPhase, round: u32) {
        let cancelled = self.timers.lock().await.cancel_session(session_id);
        if cancelled > 0 {
            debug!(session_id = %session_id, cancelled, "Cancelled timers on phase change");
        }

        if phase.is_terminal() {
            self.fire_counts.lock().await.remove(&session_id);
            return;
        }

        if phase == SessionPhase::Discussion && round > self.max_rounds {
            if let Err(e) = self.evaluate(session_id, TriggerType::MaxRoundsExceeded).await {
                warn!(session_id = %session_id, "Round limit evaluation failed: {}", e);
            }
            // An action may already have moved the session on
            match self.control.session(session_id).await {
                Ok(session) if session.phase == phase => {}
                Ok(_) => return,
                Err(e) => {
                    warn!(session_id = %session_id, "Could not reload session: {}", e);
                    return;
                }
            }
        }

        self.arm_timers(session_id, phase).await;
    }

    async fn arm_timers(self: &Arc<Self>, session_id: Uuid, phase: SessionPhase) {
        let counts = {
            let fire_counts = self.fire_counts.lock().await;
            fire_counts.get(&session_id).cloned().unwrap_or_default()
        };

        let mut timers = self.timers.lock().await;
        for rule in &self.rules {
            if rule.trigger.kind != TriggerType::Timeout || !rule.applies_in(phase) {
                continue;
            }
            if counts.get(&rule.name).copied().unwrap_or(0) >= rule.max_fires_per_session {
                continue;
            }
            let Some(duration) = rule.timeout() else {
                continue;
            };
            let Some(deadline) = Instant::now().checked_add(duration) else {
                warn!(
                    session_id = %session_id,
                    rule = %rule.name,
                    "Timeout too large to schedule; timer not armed"
                );
                continue;
            };

            let id = timers.next_id();
            let weak = Arc::downgrade(self);
            let rule_name = rule.name.clone();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                if let Some(engine) = weak.upgrade() {
                    engine.timer_fired(session_id, id, rule_name).await;
                }
            });
            timers.insert(session_id, id, rule.name.clone(), deadline, handle);
            debug!(
                session_id = %session_id,
                rule = %rule.name,
                timeout_ms = duration.as_millis() as u64,
                "Armed timer"
            );
        }
    }

    async fn timer_fired(&self, session_id: Uuid, timer_id: u64, rule_name: String) {
        if !self.timers.lock().await.complete(session_id, timer_id) {
            return;
        }
        debug!(session_id = %session_id, rule = %rule_name, "Timer fired");

        if let Err(e) = self
            .evaluate_matching(session_id, TriggerType::Timeout, None, Some(&rule_name))
            .await
        {
            warn!(session_id = %session_id, rule = %rule_name, "Timeout evaluation failed: {}", e);
        }
    }

    /// Evaluate every rule for `trigger` against the session's current phase.
    ///
    /// Returns the escalation events recorded by this call.
    pub async fn evaluate(
        &self,
        session_id: Uuid,
        trigger: TriggerType,
    ) -> Result<Vec<EscalationEvent>> {
        self.evaluate_matching(session_id, trigger, None, None).await
    }

    /// `phase` overrides the phase used for rule filters, for conditions
    /// observed in a phase the session has since left.
    async fn evaluate_matching(
        &self,
        session_id: Uuid,
        trigger: TriggerType,
        phase: Option<SessionPhase>,
        only_rule: Option<&str>,
    ) -> Result<Vec<EscalationEvent>> {
        let session = self.control.session(session_id).await?;
        let phase = phase.unwrap_or(session.phase);
        let mut fired = Vec::new();

        for rule in &self.rules {
            if rule.trigger.kind != trigger || !rule.applies_in(phase) {
                continue;
            }
            if only_rule.is_some_and(|name| name != rule.name) {
                continue;
            }

            // Check and increment under one lock so concurrent evaluations cannot double-fire
            {
                let mut fire_counts = self.fire_counts.lock().await;
                let count = fire_counts
                    .entry(session_id)
                    .or_default()
                    .entry(rule.name.clone())
                    .or_insert(0);
                if *count >= rule.max_fires_per_session {
                    continue;
                }
                *count += 1;
            }

            let event = EscalationEvent::new(
                session_id,
                rule.name.clone(),
                trigger,
                rule.action.kind,
                format!(
                    "{} observed in {}; {}",
                    trigger.as_str(),
                    phase,
                    rule.action.kind.as_str()
                ),
            );
            if let Err(e) = self.store.save_escalation_event(&event).await {
                warn!(session_id = %session_id, rule = %rule.name, "Failed to record escalation: {}", e);
            }
            self.bus.publish(CouncilEvent::EscalationFired {
                escalation: event.clone(),
            });
            info!(
                session_id = %session_id,
                rule = %rule.name,
                trigger = trigger.as_str(),
                action = rule.action.kind.as_str(),
                "Escalation rule fired"
            );

            self.dispatch(rule, &session, &event).await;
            fired.push(event);

            if rule.stop_after {
                break;
            }
        }

        Ok(fired)
    }

    async fn dispatch(&self, rule: &EscalationRule, session: &Session, event: &EscalationEvent) {
        let session_id = session.id;
        let action = &rule.action;

        match action.kind {
            ActionType::EscalateToHuman => {
                let message = action
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("Escalated to human review by rule {}", rule.name));
                if let Err(e) = self.control.escalate_to_human(session_id, &message).await {
                    warn!(session_id = %session_id, rule = %rule.name, "escalate_to_human failed: {}", e);
                }
            }
            ActionType::RestartDiscussion => {
                if let Err(e) = self.control.restart_discussion(session_id).await {
                    warn!(session_id = %session_id, rule = %rule.name, "restart_discussion skipped: {}", e);
                }
            }
            ActionType::AddAgent => {
                let Some(agent_id) = action.agent.as_deref() else {
                    warn!(session_id = %session_id, rule = %rule.name, "add_agent without an agent");
                    return;
                };
                let rationale = action.message.clone().unwrap_or_else(|| {
                    format!(
                        "You were added to \"{}\" because rule {} observed {}",
                        session.title,
                        rule.name,
                        event.trigger.as_str()
                    )
                });
                if let Err(e) = self.control.add_agent(session_id, agent_id, &rationale).await {
                    warn!(session_id = %session_id, agent_id, "add_agent failed: {}", e);
                }
            }
            ActionType::AutoDecide => {
                let outcome = action.outcome.unwrap_or(DecisionOutcome::Rejected);
                let summary = action
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("Decided automatically by rule {}", rule.name));
                if let Err(e) = self.control.auto_decide(session_id, outcome, &summary).await {
                    warn!(session_id = %session_id, rule = %rule.name, "auto_decide failed: {}", e);
                }
            }
            ActionType::NotifyExternal => {
                let Some(url) = action.url.clone() else {
                    warn!(session_id = %session_id, rule = %rule.name, "notify_external without a url");
                    return;
                };
                let payload = build_payload(action.template.as_ref(), session, event);
                let notifier = self.notifier.clone();
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify(&url, payload).await {
                        warn!(session_id = %session_id, url = %url, "Notification failed: {}", e);
                    }
                });
            }
        }
    }

    pub async fn fire_count(&self, session_id: Uuid, rule_name: &str) -> u32 {
        let fire_counts = self.fire_counts.lock().await;
        fire_counts
            .get(&session_id)
            .and_then(|counts| counts.get(rule_name))
            .copied()
            .unwrap_or(0)
    }

    pub async fn active_timers(&self, session_id: Uuid) -> Vec<ActiveTimer> {
        self.timers.lock().await.active(session_id)
    }

    /// Stop listening and cancel every pending timer
    pub async fn shutdown(&self) {
        if let Some(listener) = self.listener.lock().await.take() {
            listener.abort();
        }
        let cancelled = self.timers.lock().await.cancel_all();
        info!(cancelled, "Escalation engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ActionConfig, TriggerConfig};
    use crate::escalation::notifier::RecordingNotifier;
    use crate::store::MemoryStore;
    use crate::voting::{SchemeName, Tally};
    use std::time::Duration;

    #[derive(Default)]
    struct FakeControl {
        sessions: Mutex<HashMap<Uuid, Session>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeControl {
        async fn put(&self, session: Session) {
            self.sessions.lock().await.insert(session.id, session);
        }

        async fn calls(&self) -> Vec<String> {
            self.calls.lock().await.clone()
        }

        async fn set_phase(&self, session_id: Uuid, phase: SessionPhase) {
            if let Some(s) = self.sessions.lock().await.get_mut(&session_id) {
                s.phase = phase;
            }
        }
    }

    #[async_trait]
    impl SessionControl for FakeControl {
        async fn session(&self, session_id: Uuid) -> Result<Session> {
            self.sessions
                .lock()
                .await
                .get(&session_id)
                .cloned()
                .ok_or_else(|| crate::error::AppError::NotFound(session_id.to_string()))
        }

        async fn escalate_to_human(&self, session_id: Uuid, message: &str) -> Result<Decision> {
            self.calls.lock().await.push(format!("escalate:{}", message));
            self.set_phase(session_id, SessionPhase::Review).await;
            Ok(Decision::new(session_id, DecisionOutcome::Escalated, message))
        }

        async fn restart_discussion(&self, session_id: Uuid) -> Result<Session> {
            self.calls.lock().await.push("restart".to_string());
            self.session(session_id).await
        }

        async fn add_agent(&self, _session_id: Uuid, agent_id: &str, _rationale: &str) -> Result<()> {
            self.calls.lock().await.push(format!("add:{}", agent_id));
            Ok(())
        }

        async fn auto_decide(
            &self,
            session_id: Uuid,
            outcome: DecisionOutcome,
            summary: &str,
        ) -> Result<Decision> {
            self.calls.lock().await.push(format!("decide:{}", outcome.as_str()));
            self.set_phase(session_id, SessionPhase::Decided).await;
            Ok(Decision::new(session_id, outcome, summary))
        }
    }

    fn rule(name: &str, priority: u32, trigger: TriggerType, action: ActionType) -> EscalationRule {
        EscalationRule {
            name: name.to_string(),
            priority,
            trigger: TriggerConfig {
                kind: trigger,
                phases: None,
                timeout_secs: None,
            },
            action: ActionConfig {
                kind: action,
                message: None,
                agent: Some("sec".to_string()),
                outcome: None,
                url: Some("http://hooks.local/council".to_string()),
                template: None,
            },
            stop_after: false,
            max_fires_per_session: 1,
        }
    }

    fn timeout_rule(name: &str, secs: f64, phase: SessionPhase) -> EscalationRule {
        let mut r = rule(name, 100, TriggerType::Timeout, ActionType::EscalateToHuman);
        r.trigger.timeout_secs = Some(secs);
        r.trigger.phases = Some(vec![phase]);
        r.action.message = Some(format!("{} elapsed", name));
        r
    }

    struct Harness {
        engine: Arc<EscalationEngine>,
        control: Arc<FakeControl>,
        store: Arc<MemoryStore>,
        notifier: RecordingNotifier,
        bus: EventBus,
    }

    async fn harness(rules: Vec<EscalationRule>, max_rounds: u32) -> Harness {
        let mut config = CouncilConfig::new("core");
        config.rules = rules;
        config.deliberation.max_rounds = max_rounds;
        let control = Arc::new(FakeControl::default());
        let store = Arc::new(MemoryStore::new());
        let notifier = RecordingNotifier::new();
        let bus = EventBus::new(64);
        let engine = EscalationEngine::new(
            &config,
            control.clone(),
            store.clone(),
            bus.clone(),
            Arc::new(notifier.clone()),
        );
        Harness {
            engine,
            control,
            store,
            notifier,
            bus,
        }
    }

    async fn session_in(h: &Harness, phase: SessionPhase) -> Uuid {
        let session = Session::new("core", "Rotate keys", phase);
        let id = session.id;
        h.control.put(session).await;
        id
    }

    #[tokio::test]
    async fn test_stop_after_blocks_lower_priority() {
        let mut restart = rule("restart-first", 10, TriggerType::Deadlock, ActionType::RestartDiscussion);
        restart.stop_after = true;
        let escalate = rule("then-human", 20, TriggerType::Deadlock, ActionType::EscalateToHuman);
        let h = harness(vec![escalate, restart], 3).await;
        let id = session_in(&h, SessionPhase::Voting).await;

        let fired = h.engine.evaluate(id, TriggerType::Deadlock).await.unwrap();
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].rule_name, "restart-first");
        assert_eq!(h.control.calls().await, vec!["restart"]);
    }

    #[tokio::test]
    async fn test_ties_keep_declaration_order() {
        let first = rule("first", 50, TriggerType::Deadlock, ActionType::AddAgent);
        let second = rule("second", 50, TriggerType::Deadlock, ActionType::RestartDiscussion);
        let h = harness(vec![first, second], 3).await;
        let id = session_in(&h, SessionPhase::Voting).await;

        let fired = h.engine.evaluate(id, TriggerType::Deadlock).await.unwrap();
        let names: Vec<&str> = fired.iter().map(|e| e.rule_name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(h.control.calls().await, vec!["add:sec", "restart"]);
    }

    #[tokio::test]
    async fn test_max_fires_is_per_session() {
        let h = harness(
            vec![rule("once", 100, TriggerType::VetoExercised, ActionType::AutoDecide)],
            3,
        )
        .await;
        let a = session_in(&h, SessionPhase::Voting).await;
        let b = session_in(&h, SessionPhase::Voting).await;

        assert_eq!(h.engine.evaluate(a, TriggerType::VetoExercised).await.unwrap().len(), 1);
        assert!(h.engine.evaluate(a, TriggerType::VetoExercised).await.unwrap().is_empty());
        assert_eq!(h.engine.evaluate(b, TriggerType::VetoExercised).await.unwrap().len(), 1);
        assert_eq!(h.engine.fire_count(a, "once").await, 1);
        assert_eq!(h.control.calls().await, vec!["decide:rejected", "decide:rejected"]);
    }

    #[tokio::test]
    async fn test_phase_filter() {
        let mut r = rule("voting-only", 100, TriggerType::Deadlock, ActionType::RestartDiscussion);
        r.trigger.phases = Some(vec![SessionPhase::Voting]);
        let h = harness(vec![r], 3).await;
        let id = session_in(&h, SessionPhase::Discussion).await;

        assert!(h.engine.evaluate(id, TriggerType::Deadlock).await.unwrap().is_empty());
        assert_eq!(h.engine.fire_count(id, "voting-only").await, 0);
    }

    #[tokio::test]
    async fn test_fired_rule_is_recorded_and_published() {
        let h = harness(
            vec![rule("human", 100, TriggerType::QuorumNotMet, ActionType::EscalateToHuman)],
            3,
        )
        .await;
        let mut rx = h.bus.subscribe();
        let id = session_in(&h, SessionPhase::Voting).await;

        h.engine.evaluate(id, TriggerType::QuorumNotMet).await.unwrap();

        let recorded = h.store.list_escalation_events(id).await.unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].trigger, TriggerType::QuorumNotMet);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "escalation:fired");
    }

    #[tokio::test]
    async fn test_timeout_fires_only_its_rule() {
        let fast = timeout_rule("fast", 0.05, SessionPhase::Discussion);
        let slow = timeout_rule("slow", 60.0, SessionPhase::Discussion);
        let h = harness(vec![fast, slow], 3).await;
        let id = session_in(&h, SessionPhase::Discussion).await;

        h.engine.on_phase_changed(id, SessionPhase::Discussion, 1).await;
        assert_eq!(h.engine.active_timers(id).await.len(), 2);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(h.control.calls().await, vec!["escalate:fast elapsed"]);
        let remaining = h.engine.active_timers(id).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].rule_name, "slow");

        h.engine.shutdown().await;
        assert!(h.engine.active_timers(id).await.is_empty());
    }

    #[tokio::test]
    async fn test_phase_change_cancels_all_timers() {
        let h = harness(vec![timeout_rule("t", 0.05, SessionPhase::Discussion)], 3).await;
        let id = session_in(&h, SessionPhase::Discussion).await;

        h.engine.on_phase_changed(id, SessionPhase::Discussion, 1).await;
        h.control.set_phase(id, SessionPhase::Voting).await;
        h.engine.on_phase_changed(id, SessionPhase::Voting, 1).await;
        assert!(h.engine.active_timers(id).await.is_empty());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(h.control.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_timeout_rule_not_rearmed() {
        let h = harness(vec![timeout_rule("t", 0.02, SessionPhase::Discussion)], 3).await;
        let id = session_in(&h, SessionPhase::Discussion).await;

        h.engine.on_phase_changed(id, SessionPhase::Discussion, 1).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(h.engine.fire_count(id, "t").await, 1);

        h.control.set_phase(id, SessionPhase::Discussion).await;
        h.engine.on_phase_changed(id, SessionPhase::Discussion, 2).await;
        assert!(h.engine.active_timers(id).await.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_phase_clears_fire_counts() {
        let h = harness(
            vec![rule("r", 100, TriggerType::Deadlock, ActionType::RestartDiscussion)],
            3,
        )
        .await;
        let id = session_in(&h, SessionPhase::Voting).await;
        h.engine.evaluate(id, TriggerType::Deadlock).await.unwrap();
        assert_eq!(h.engine.fire_count(id, "r").await, 1);

        h.engine.on_phase_changed(id, SessionPhase::Closed, 1).await;
        assert_eq!(h.engine.fire_count(id, "r").await, 0);
    }

    #[tokio::test]
    async fn test_round_limit_evaluated_on_discussion_entry() {
        let h = harness(
            vec![rule("too-long", 100, TriggerType::MaxRoundsExceeded, ActionType::AutoDecide)],
            2,
        )
        .await;
        let id = session_in(&h, SessionPhase::Discussion).await;

        h.engine.on_phase_changed(id, SessionPhase::Discussion, 2).await;
        assert!(h.control.calls().await.is_empty());

        h.engine.on_phase_changed(id, SessionPhase::Discussion, 3).await;
        assert_eq!(h.control.calls().await, vec!["decide:rejected"]);
    }

    #[tokio::test]
    async fn test_notify_external_payload() {
        let mut r = rule("page", 100, TriggerType::VetoExercised, ActionType::NotifyExternal);
        r.action.template = Some(serde_json::json!({ "severity": "high" }));
        let h = harness(vec![r], 3).await;
        let id = session_in(&h, SessionPhase::Voting).await;

        h.engine.evaluate(id, TriggerType::VetoExercised).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sent = h.notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "http://hooks.local/council");
        assert_eq!(sent[0].1["severity"], "high");
        assert_eq!(sent[0].1["escalation"]["rule_name"], "page");
    }

    #[tokio::test]
    async fn test_listener_evaluates_vote_conclusion() {
        let mut r = rule("no-quorum", 100, TriggerType::QuorumNotMet, ActionType::EscalateToHuman);
        r.trigger.phases = Some(vec![SessionPhase::Voting]);
        let h = harness(vec![r], 3).await;
        // The session has already moved on by the time the listener runs
        let id = session_in(&h, SessionPhase::Review).await;
        h.engine.start().await;

        h.bus.publish(CouncilEvent::VoteConcluded {
            session_id: id,
            tally: Tally {
                scheme: SchemeName::WeightedMajority,
                approve: 1.0,
                reject: 0.0,
                abstain: 0.0,
                total_weight: 1.0,
                ballots: 1,
                quorum: 2,
                quorum_met: false,
                threshold_met: true,
                outcome: None,
                veto_exercised: false,
                deadlocked: false,
                summary: String::new(),
            },
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.engine.fire_count(id, "no-quorum").await, 1);
        h.engine.shutdown().await;
    }
}
