use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

struct ArmedTimer {
    id: u64,
    rule_name: String,
    deadline: Instant,
    handle: JoinHandle<()>,
}

/// Remaining time on one armed timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTimer {
    pub rule_name: String,
    pub remaining: Duration,
}

/// Outstanding timeout timers per session
#[derive(Default)]
pub struct TimerTable {
    next_id: u64,
    timers: HashMap<Uuid, Vec<ArmedTimer>>,
}

impl TimerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    pub fn insert(
        &mut self,
        session_id: Uuid,
        id: u64,
        rule_name: impl Into<String>,
        deadline: Instant,
        handle: JoinHandle<()>,
    ) {
        self.timers.entry(session_id).or_default().push(ArmedTimer {
            id,
            rule_name: rule_name.into(),
            deadline,
            handle,
        });
    }

    /// Forget a timer whose task is about to act. False if it was cancelled first.
    pub fn complete(&mut self, session_id: Uuid, id: u64) -> bool {
        let Some(armed) = self.timers.get_mut(&session_id) else {
            return false;
        };
        let before = armed.len();
        armed.retain(|t| t.id != id);
        let found = armed.len() != before;
        if armed.is_empty() {
            self.timers.remove(&session_id);
        }
        found
    }

    /// Abort every timer of a session
    pub fn cancel_session(&mut self, session_id: Uuid) -> usize {
        match self.timers.remove(&session_id) {
            Some(armed) => {
                for timer in &armed {
                    timer.handle.abort();
                }
                armed.len()
            }
            None => 0,
        }
    }

    /// Abort every timer of every session
    pub fn cancel_all(&mut self) -> usize {
        let mut cancelled = 0;
        for (_, armed) in self.timers.drain() {
            for timer in &armed {
                timer.handle.abort();
            }
            cancelled += armed.len();
        }
        cancelled
    }

    pub fn active(&self, session_id: Uuid) -> Vec<ActiveTimer> {
        let now = Instant::now();
        self.timers
            .get(&session_id)
            .map(|armed| {
                armed
                    .iter()
                    .map(|t| ActiveTimer {
                        rule_name: t.rule_name.clone(),
                        remaining: t.deadline.saturating_duration_since(now),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.timers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
