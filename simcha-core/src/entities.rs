//! Core entity structures

use crate::{
    AssignmentSource, EntityId, EntryKind, NationalId, ReportOrigin, Timestamp,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A student's class membership for one school year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMembership {
    pub class_id: EntityId,
    /// School year the membership applies to.
    pub year: i32,
    /// Homeroom teacher of the class, when one is assigned.
    pub teacher_id: Option<EntityId>,
    /// Whether the student acts as the class representative ("tatnikit").
    pub is_representative: bool,
}

/// Student identity record. Owned by the administrative system;
/// read-only to the call-handling core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub student_id: EntityId,
    /// Unique 9-digit national ID, the caller's key over the phone.
    pub national_id: NationalId,
    pub first_name: String,
    pub last_name: String,
    /// Family this student belongs to, when known.
    pub family_id: Option<EntityId>,
    /// Class membership for the current school year, if any.
    pub membership: Option<ClassMembership>,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// The student's membership for the given year, if it matches.
    pub fn membership_for(&self, year: i32) -> Option<&ClassMembership> {
        self.membership.as_ref().filter(|m| m.year == year)
    }

    /// Teacher resolved from the student's membership for the given year.
    pub fn teacher_for(&self, year: i32) -> Option<EntityId> {
        self.membership_for(year).and_then(|m| m.teacher_id)
    }
}

/// Celebration event type catalog entry.
/// Selection over the phone is keyed by `menu_key`, never by internal id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventType {
    pub event_type_id: EntityId,
    /// DTMF digit the caller presses to select this type.
    pub menu_key: u8,
    pub name: String,
    pub description: Option<String>,
}

/// Level classification attached to an event (e.g. seniority tier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelType {
    pub level_type_id: EntityId,
    pub menu_key: u8,
    pub name: String,
}

/// Gift catalog entry selectable during the report flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gift {
    pub gift_id: EntityId,
    pub menu_key: u8,
    pub name: String,
}

/// Durable record of a reported celebration.
///
/// At most one authoritative event exists per (student, event type, date)
/// triple. The existence resolver enforces that at write time; subsequent
/// reports for the same triple edit rather than duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: EntityId,
    pub student_id: EntityId,
    pub event_type_id: EntityId,
    pub event_date: NaiveDate,
    pub level_type_id: Option<EntityId>,
    /// Student who phoned the report in, when not the celebrant herself.
    pub reported_by: Option<EntityId>,
    /// Who reported first: the student, a proxy, or both.
    pub report_origin: Option<ReportOrigin>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Event {
    /// Create a new event for the dedup triple.
    pub fn new(student_id: EntityId, event_type_id: EntityId, event_date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            event_id: Uuid::now_v7(),
            student_id,
            event_type_id,
            event_date,
            level_type_id: None,
            reported_by: None,
            report_origin: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the level type.
    pub fn with_level_type(mut self, level_type_id: EntityId) -> Self {
        self.level_type_id = Some(level_type_id);
        self
    }

    /// Set the reporter and report origin.
    pub fn with_reporter(mut self, reporter_id: EntityId, origin: ReportOrigin) -> Self {
        self.reported_by = Some(reporter_id);
        self.report_origin = Some(origin);
        self
    }

    /// Whether the event's date has already passed.
    pub fn is_past(&self, today: NaiveDate) -> bool {
        self.event_date < today
    }
}

/// Join record linking an event to one selected gift.
/// The whole set for an event is replaced on every save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventGift {
    pub event_id: EntityId,
    pub gift_id: EntityId,
}

/// Lottery / voucher track catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryTrack {
    pub track_id: EntityId,
    pub menu_key: u8,
    pub name: String,
}

/// A caller's enrollment into a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotteryEntry {
    pub entry_id: EntityId,
    pub student_id: EntityId,
    pub track_id: EntityId,
    pub kind: EntryKind,
    /// Prior event the enrollment is tied to, when applicable.
    pub event_id: Option<EntityId>,
    pub created_at: Timestamp,
}

impl LotteryEntry {
    pub fn new(student_id: EntityId, track_id: EntityId, kind: EntryKind) -> Self {
        Self {
            entry_id: Uuid::now_v7(),
            student_id,
            track_id,
            kind,
            event_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_event(mut self, event_id: EntityId) -> Self {
        self.event_id = Some(event_id);
        self
    }
}

/// One keypad answer in a fulfillment survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyAnswer {
    /// Symbolic key of the survey question.
    pub question_key: String,
    /// Rating the caller keyed in, 1 through 5.
    pub rating: u8,
}

/// Completed post-event fulfillment survey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentResponse {
    pub response_id: EntityId,
    pub event_id: EntityId,
    pub student_id: EntityId,
    /// Answers in question order.
    pub answers: Vec<SurveyAnswer>,
    /// Free recorded comment, when the caller left one.
    pub comment: Option<crate::RawContent>,
    /// Hash of the comment clip, for dedup and integrity.
    pub comment_hash: Option<crate::ContentHash>,
    pub created_at: Timestamp,
}

impl FulfillmentResponse {
    pub fn new(event_id: EntityId, student_id: EntityId, answers: Vec<SurveyAnswer>) -> Self {
        Self {
            response_id: Uuid::now_v7(),
            event_id,
            student_id,
            answers,
            comment: None,
            comment_hash: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a recorded comment clip.
    pub fn with_comment(mut self, clip: crate::RawContent) -> Self {
        self.comment_hash = Some(crate::compute_content_hash(&clip));
        self.comment = Some(clip);
        self
    }
}

/// One append-only entry in a family's teacher-assignment history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    /// Event whose creation or edit produced this entry.
    pub event_id: EntityId,
    pub teacher_id: EntityId,
    pub assigned_at: Timestamp,
    pub source: AssignmentSource,
}

/// Per (account scope, year, family) teacher-assignment aggregate.
///
/// History is append-only and ordered by append time; it doubles as the
/// audit trail and the basis for the family's current teacher. Invariant:
/// `current_teacher_id` always equals the teacher of the last entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyTeacherAssignment {
    pub assignment_id: EntityId,
    pub account_scope: EntityId,
    pub year: i32,
    pub family_id: EntityId,
    pub current_teacher_id: EntityId,
    pub history: Vec<AssignmentRecord>,
}

impl FamilyTeacherAssignment {
    /// Create the aggregate lazily from its first history entry.
    pub fn new(
        account_scope: EntityId,
        year: i32,
        family_id: EntityId,
        first: AssignmentRecord,
    ) -> Self {
        Self {
            assignment_id: Uuid::now_v7(),
            account_scope,
            year,
            family_id,
            current_teacher_id: first.teacher_id,
            history: vec![first],
        }
    }

    /// Append a history entry and move the current pointer.
    /// The current pointer is the only field ever overwritten.
    pub fn append(&mut self, record: AssignmentRecord) {
        self.current_teacher_id = record.teacher_id;
        self.history.push(record);
    }

    /// The most recently appended history entry.
    pub fn latest(&self) -> Option<&AssignmentRecord> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;

    fn make_record(teacher_id: EntityId) -> AssignmentRecord {
        AssignmentRecord {
            event_id: new_entity_id(),
            teacher_id,
            assigned_at: Utc::now(),
            source: AssignmentSource::StudentReport,
        }
    }

    #[test]
    fn test_assignment_current_follows_last_append() {
        let first_teacher = new_entity_id();
        let mut aggregate = FamilyTeacherAssignment::new(
            new_entity_id(),
            2024,
            new_entity_id(),
            make_record(first_teacher),
        );
        assert_eq!(aggregate.current_teacher_id, first_teacher);

        let second_teacher = new_entity_id();
        aggregate.append(make_record(second_teacher));

        assert_eq!(aggregate.current_teacher_id, second_teacher);
        assert_eq!(aggregate.history.len(), 2);
        assert_eq!(aggregate.latest().unwrap().teacher_id, second_teacher);
        // earlier entries are untouched
        assert_eq!(aggregate.history[0].teacher_id, first_teacher);
    }

    #[test]
    fn test_event_is_past() {
        let event = Event::new(
            new_entity_id(),
            new_entity_id(),
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        );
        assert!(event.is_past(NaiveDate::from_ymd_opt(2024, 6, 16).unwrap()));
        assert!(!event.is_past(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()));
    }
}
