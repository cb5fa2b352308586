//! Shared enums for SIMCHA entities and call flows

use serde::{Deserialize, Serialize};

/// The sub-flow a call is currently driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Flow {
    /// Caller reports a celebration event for herself.
    ReportEvent,
    /// Class representative reports on behalf of a classmate.
    ProxyReport,
    /// Enroll a prior event into a lottery draw track.
    Lottery,
    /// Post-event fulfillment survey.
    Fulfillment,
    /// Choose a voucher track.
    TrackSelection,
}

impl Flow {
    /// Whether the main menu may offer this flow only to callers with
    /// at least one prior event on record.
    pub fn requires_prior_event(&self) -> bool {
        matches!(self, Flow::Lottery | Flow::TrackSelection | Flow::Fulfillment)
    }

    /// Whether the flow additionally requires an event whose date has passed.
    pub fn requires_past_event(&self) -> bool {
        matches!(self, Flow::Fulfillment)
    }
}

/// Who reported an event first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReportOrigin {
    /// The student reported it herself.
    Student,
    /// A class representative reported on the student's behalf.
    Proxy,
    /// Both reported it (an edit arrived from the other origin).
    Both,
}

impl ReportOrigin {
    /// Merge a prior origin with the origin of an incoming edit.
    pub fn merged(self, incoming: ReportOrigin) -> ReportOrigin {
        if self == incoming {
            self
        } else {
            ReportOrigin::Both
        }
    }
}

/// Source of a family-teacher assignment history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssignmentSource {
    /// Appended when a student reported her own event.
    StudentReport,
    /// Appended when a class representative reported for a classmate.
    ProxyReport,
    /// Appended when an existing event was edited.
    EventEdit,
}

/// What kind of track enrollment a lottery entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    /// Enrollment into a lottery draw.
    Draw,
    /// A voucher-track choice.
    Voucher,
}

/// Entity type discriminator for storage errors and polymorphic references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Student,
    EventType,
    LevelType,
    Gift,
    Event,
    EventGift,
    LotteryTrack,
    LotteryEntry,
    FulfillmentResponse,
    TeacherAssignment,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_origin_merge() {
        assert_eq!(
            ReportOrigin::Student.merged(ReportOrigin::Student),
            ReportOrigin::Student
        );
        assert_eq!(
            ReportOrigin::Student.merged(ReportOrigin::Proxy),
            ReportOrigin::Both
        );
        assert_eq!(
            ReportOrigin::Both.merged(ReportOrigin::Student),
            ReportOrigin::Both
        );
    }

    #[test]
    fn test_flow_menu_gating() {
        assert!(!Flow::ReportEvent.requires_prior_event());
        assert!(Flow::Lottery.requires_prior_event());
        assert!(Flow::Fulfillment.requires_past_event());
        assert!(!Flow::TrackSelection.requires_past_event());
    }
}
