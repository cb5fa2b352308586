//! In-memory conversational state for one phone call.
//!
//! A `CallSession` lives exactly as long as the call: created on connect,
//! mutated only by the orchestrator while driving steps, discarded on
//! hangup or completion. It is never persisted - only its outputs are.

use crate::{EntityId, Flow, RawContent, Student, Timestamp};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One validated answer collected from the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Answer {
    /// A digit string (national ID, free numeric entry).
    Digits(String),
    /// A calendar date keyed in as digits.
    Date(NaiveDate),
    /// A single menu choice.
    Key(u8),
    /// A recorded audio clip.
    Recording(RawContent),
}

impl Answer {
    pub fn as_digits(&self) -> Option<&str> {
        match self {
            Answer::Digits(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Answer::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<u8> {
        match self {
            Answer::Key(k) => Some(*k),
            _ => None,
        }
    }
}

/// Resolved identity of the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallerIdentity {
    /// An ordinary student calling for herself.
    Student(Student),
    /// A class representative, entitled to report for classmates.
    Representative { student: Student, class_id: EntityId },
}

impl CallerIdentity {
    /// The caller's own student record, whichever role she holds.
    pub fn student(&self) -> &Student {
        match self {
            CallerIdentity::Student(s) => s,
            CallerIdentity::Representative { student, .. } => student,
        }
    }

    pub fn is_representative(&self) -> bool {
        matches!(self, CallerIdentity::Representative { .. })
    }
}

/// One phone call in progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSession {
    pub call_id: EntityId,
    /// Caller phone identifier as reported by the gateway.
    pub caller_phone: String,
    /// Sub-flow the call has committed to, once chosen from the main menu.
    pub flow: Option<Flow>,
    /// Index of the step currently being collected.
    pub step_index: usize,
    /// Resolved caller identity; None until identification succeeds.
    pub identity: Option<CallerIdentity>,
    /// Classmate a representative is reporting for, in proxy flows.
    pub proxy_target: Option<Student>,
    /// Collected answers in step order.
    pub answers: Vec<(String, Answer)>,
    /// Retry counter for the step currently being collected.
    pub attempts: u8,
    /// Set once the call has reached its terminal state.
    pub terminal: bool,
    pub started_at: Timestamp,
}

impl CallSession {
    /// Create session state for a freshly connected call.
    pub fn new(caller_phone: impl Into<String>) -> Self {
        Self {
            call_id: Uuid::now_v7(),
            caller_phone: caller_phone.into(),
            flow: None,
            step_index: 0,
            identity: None,
            proxy_target: None,
            answers: Vec::new(),
            attempts: 0,
            terminal: false,
            started_at: Utc::now(),
        }
    }

    /// Record a validated answer and advance to the next step.
    pub fn record_answer(&mut self, step: impl Into<String>, answer: Answer) {
        self.answers.push((step.into(), answer));
        self.step_index += 1;
        self.attempts = 0;
    }

    /// Look up an earlier answer by step name.
    pub fn answer(&self, step: &str) -> Option<&Answer> {
        self.answers
            .iter()
            .find(|(name, _)| name == step)
            .map(|(_, a)| a)
    }

    /// Count one failed collection attempt for the current step.
    /// Returns the new attempt count.
    pub fn register_attempt(&mut self) -> u8 {
        self.attempts += 1;
        self.attempts
    }

    /// The student events are being reported for: the proxy target when a
    /// representative reports for a classmate, otherwise the caller herself.
    pub fn subject(&self) -> Option<&Student> {
        self.proxy_target
            .as_ref()
            .or_else(|| self.identity.as_ref().map(|i| i.student()))
    }

    /// Mark the session terminal. Idempotent.
    pub fn finish(&mut self) {
        self.terminal = true;
    }
}
