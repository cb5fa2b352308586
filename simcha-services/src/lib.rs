//! SIMCHA Services - Resolution and Persistence
//!
//! The business services a call drives between prompts:
//! - Caller identity resolution (student, class representative, classmate)
//! - Event existence resolution (create vs edit)
//! - Transactional event persistence with gift-set replacement
//! - Family-teacher assignment tracking

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use simcha_core::{
    AssignmentRecord, AssignmentSource, CallConfig, CallResult, CallerIdentity, EntityId, Event,
    FamilyTeacherAssignment, IdentityError, NationalId, ReportOrigin, StorageError, Student,
};
use simcha_storage::{report_lock_key, CelebrationStore, ReportLocks};
use std::sync::Arc;

// ============================================================================
// IDENTITY RESOLUTION
// ============================================================================

/// Maps keyed-in national IDs to caller records.
///
/// Lookup failures are terminal by design: a fabricated ID is
/// indistinguishable from a typo, and indefinite retry invites abuse.
#[derive(Debug, Clone)]
pub struct IdentityResolver<S> {
    store: Arc<S>,
    year: i32,
}

impl<S: CelebrationStore> IdentityResolver<S> {
    pub fn new(store: Arc<S>, year: i32) -> Self {
        Self { store, year }
    }

    /// Resolve a student by national ID.
    pub fn resolve_student(&self, national_id: &NationalId) -> CallResult<Student> {
        self.store
            .student_by_national_id(national_id)?
            .ok_or_else(|| {
                IdentityError::CallerNotFound {
                    national_id: national_id.clone(),
                }
                .into()
            })
    }

    /// Resolve a caller and classify her role for the current year.
    /// A student with a representative membership enters the proxy menu;
    /// everyone else is an ordinary student caller.
    pub fn resolve_caller(&self, national_id: &NationalId) -> CallResult<CallerIdentity> {
        let student = self.resolve_student(national_id)?;
        let represented_class = student
            .membership_for(self.year)
            .filter(|m| m.is_representative)
            .map(|m| m.class_id);
        let identity = match represented_class {
            Some(class_id) => CallerIdentity::Representative { student, class_id },
            None => CallerIdentity::Student(student),
        };
        tracing::debug!(
            representative = identity.is_representative(),
            "caller identified"
        );
        Ok(identity)
    }

    /// Strict representative resolution: the caller must hold an active
    /// class membership for the current year and be its representative.
    pub fn resolve_representative(
        &self,
        national_id: &NationalId,
    ) -> CallResult<(Student, EntityId)> {
        let student = self.resolve_student(national_id)?;
        let membership = student.membership_for(self.year).ok_or_else(|| {
            IdentityError::NoActiveClass {
                student_id: student.student_id,
                year: self.year,
            }
        })?;
        if !membership.is_representative {
            return Err(IdentityError::NotRepresentative {
                student_id: student.student_id,
                year: self.year,
            }
            .into());
        }
        let class_id = membership.class_id;
        Ok((student, class_id))
    }

    /// Resolve a proxy-report target and verify she belongs to the
    /// representative's class this year.
    pub fn resolve_classmate(
        &self,
        class_id: EntityId,
        national_id: &NationalId,
    ) -> CallResult<Student> {
        let target = self.resolve_student(national_id)?;
        let shares_class = target
            .membership_for(self.year)
            .is_some_and(|m| m.class_id == class_id);
        if shares_class {
            Ok(target)
        } else {
            Err(IdentityError::NotInClass {
                student_id: target.student_id,
                class_id,
            }
            .into())
        }
    }
}

// ============================================================================
// EVENT EXISTENCE RESOLUTION
// ============================================================================

/// Whether a save will create a new event or edit an existing one.
/// The caller is told which mode applies before any further collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveMode {
    Create,
    Edit,
}

/// Pre-write duplicate check on the authoritative triple.
#[derive(Debug, Clone)]
pub struct EventExistence<S> {
    store: Arc<S>,
}

impl<S: CelebrationStore> EventExistence<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Exact match on (student, event type, date); no date-window fuzzing.
    pub fn find_existing(
        &self,
        student_id: EntityId,
        event_type_id: EntityId,
        event_date: NaiveDate,
    ) -> CallResult<Option<Event>> {
        self.store
            .event_find_by_triple(student_id, event_type_id, event_date)
    }

    /// The save mode an existence result implies.
    pub fn mode_of(existing: &Option<Event>) -> SaveMode {
        if existing.is_some() {
            SaveMode::Edit
        } else {
            SaveMode::Create
        }
    }
}

// ============================================================================
// EVENT PERSISTENCE
// ============================================================================

/// Everything a completed report flow hands to persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDraft {
    pub student_id: EntityId,
    pub event_type_id: EntityId,
    pub event_date: NaiveDate,
    pub level_type_id: Option<EntityId>,
    /// The caller who phoned the report in, when not the celebrant.
    pub reporter_id: Option<EntityId>,
    /// Origin of this particular report.
    pub origin: ReportOrigin,
    /// Gift selection; replaces the event's whole gift set.
    pub gift_ids: Vec<EntityId>,
}

/// Transactional upsert of an event and its gift set.
#[derive(Debug, Clone)]
pub struct EventPersistence<S> {
    store: Arc<S>,
    locks: Arc<ReportLocks>,
}

impl<S: CelebrationStore> EventPersistence<S> {
    pub fn new(store: Arc<S>, locks: Arc<ReportLocks>) -> Self {
        Self { store, locks }
    }

    /// Save a report: upsert the event row, then replace its gift set,
    /// atomically. Returns the saved event for confirmation messaging.
    ///
    /// The whole check-then-write runs under the triple's advisory lock
    /// and the existence check is re-run inside the transaction, so two
    /// concurrent calls for the same triple collapse to create-then-edit
    /// instead of producing duplicate rows.
    pub fn save(&self, existing: Option<Event>, draft: &EventDraft) -> CallResult<Event> {
        let key = report_lock_key(draft.student_id, draft.event_type_id, draft.event_date);
        let gate = self.locks.handle(key)?;
        let _held = gate.lock().map_err(|_| StorageError::LockPoisoned)?;

        let mut saved: Option<Event> = None;
        self.store.transaction(&mut |store| {
            let current = store
                .event_find_by_triple(draft.student_id, draft.event_type_id, draft.event_date)?
                .or_else(|| existing.clone());

            let event = match current {
                Some(mut event) => {
                    event.level_type_id = draft.level_type_id;
                    if let Some(reporter) = draft.reporter_id {
                        event.reported_by = Some(reporter);
                    }
                    event.report_origin = Some(match event.report_origin {
                        Some(prior) => prior.merged(draft.origin),
                        None => draft.origin,
                    });
                    event.updated_at = Utc::now();
                    store.event_update(&event)?;
                    event
                }
                None => {
                    let mut event =
                        Event::new(draft.student_id, draft.event_type_id, draft.event_date);
                    event.level_type_id = draft.level_type_id;
                    event.reported_by = draft.reporter_id;
                    event.report_origin = Some(draft.origin);
                    store.event_insert(&event)?;
                    event
                }
            };

            store.event_gifts_replace(event.event_id, &draft.gift_ids)?;
            saved = Some(event);
            Ok(())
        })?;

        let event = saved.ok_or_else(|| StorageError::TransactionFailed {
            reason: "save committed without an event".to_string(),
        })?;
        tracing::info!(
            event_id = %event.event_id,
            student_id = %event.student_id,
            gifts = draft.gift_ids.len(),
            "event saved"
        );
        Ok(event)
    }
}

// ============================================================================
// FAMILY-TEACHER ASSIGNMENT TRACKING
// ============================================================================

/// Maintains the per (account scope, year, family) assignment aggregate.
///
/// History is append-only: an edit appends a correcting entry rather than
/// rewriting anything, and the current pointer always follows the last
/// appended entry.
#[derive(Debug, Clone)]
pub struct AssignmentTracker<S> {
    store: Arc<S>,
    account_scope: EntityId,
}

impl<S: CelebrationStore> AssignmentTracker<S> {
    pub fn new(store: Arc<S>, account_scope: EntityId) -> Self {
        Self {
            store,
            account_scope,
        }
    }

    /// Append one assignment derived from an event creation or edit.
    pub fn record_assignment(
        &self,
        year: i32,
        family_id: EntityId,
        teacher_id: EntityId,
        event_id: EntityId,
        source: AssignmentSource,
    ) -> CallResult<FamilyTeacherAssignment> {
        let record = AssignmentRecord {
            event_id,
            teacher_id,
            assigned_at: Utc::now(),
            source,
        };
        let aggregate = match self
            .store
            .assignment_find(self.account_scope, year, family_id)?
        {
            Some(mut aggregate) => {
                aggregate.append(record);
                aggregate
            }
            None => FamilyTeacherAssignment::new(self.account_scope, year, family_id, record),
        };
        self.store.assignment_put(&aggregate)?;
        tracing::debug!(
            family_id = %family_id,
            teacher_id = %teacher_id,
            history_len = aggregate.history.len(),
            "assignment recorded"
        );
        Ok(aggregate)
    }
}

// ============================================================================
// SERVICE BUNDLE
// ============================================================================

/// Everything the orchestrator needs, wired over one store.
#[derive(Debug, Clone)]
pub struct CallServices<S> {
    pub identity: IdentityResolver<S>,
    pub existence: EventExistence<S>,
    pub persistence: EventPersistence<S>,
    pub assignments: AssignmentTracker<S>,
}

impl<S: CelebrationStore> CallServices<S> {
    pub fn new(store: Arc<S>, config: &CallConfig) -> Self {
        let locks = Arc::new(ReportLocks::new());
        Self {
            identity: IdentityResolver::new(Arc::clone(&store), config.current_year),
            existence: EventExistence::new(Arc::clone(&store)),
            persistence: EventPersistence::new(Arc::clone(&store), locks),
            assignments: AssignmentTracker::new(store, config.account_scope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simcha_core::{new_entity_id, CallError, ClassMembership, EventGift};
    use simcha_storage::MemoryStorage;

    fn make_student(national_id: &str) -> Student {
        Student {
            student_id: new_entity_id(),
            national_id: NationalId::parse(national_id).unwrap(),
            first_name: "Noa".to_string(),
            last_name: "Levi".to_string(),
            family_id: Some(new_entity_id()),
            membership: None,
        }
    }

    fn make_representative(national_id: &str, class_id: EntityId, year: i32) -> Student {
        let mut student = make_student(national_id);
        student.membership = Some(ClassMembership {
            class_id,
            year,
            teacher_id: Some(new_entity_id()),
            is_representative: true,
        });
        student
    }

    fn make_draft(student_id: EntityId, event_type_id: EntityId) -> EventDraft {
        EventDraft {
            student_id,
            event_type_id,
            event_date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            level_type_id: None,
            reporter_id: None,
            origin: ReportOrigin::Student,
            gift_ids: vec![new_entity_id(), new_entity_id()],
        }
    }

    // ========================================================================
    // Identity Tests
    // ========================================================================

    #[test]
    fn test_resolve_student_found() {
        let store = Arc::new(MemoryStorage::new());
        let student = make_student("123456789");
        store.student_insert(&student).unwrap();

        let resolver = IdentityResolver::new(store, 2024);
        let resolved = resolver
            .resolve_student(&NationalId::parse("123456789").unwrap())
            .unwrap();
        assert_eq!(resolved.student_id, student.student_id);
    }

    #[test]
    fn test_resolve_student_not_found_is_terminal_error() {
        let store = Arc::new(MemoryStorage::new());
        let resolver = IdentityResolver::new(store, 2024);

        let err = resolver
            .resolve_student(&NationalId::parse("123456789").unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            CallError::Identity(IdentityError::CallerNotFound { .. })
        ));
    }

    #[test]
    fn test_resolve_caller_classifies_representative() {
        let store = Arc::new(MemoryStorage::new());
        let class_id = new_entity_id();
        store
            .student_insert(&make_representative("123456789", class_id, 2024))
            .unwrap();
        store.student_insert(&make_student("987654321")).unwrap();

        let resolver = IdentityResolver::new(store, 2024);

        let rep = resolver
            .resolve_caller(&NationalId::parse("123456789").unwrap())
            .unwrap();
        assert!(rep.is_representative());

        let plain = resolver
            .resolve_caller(&NationalId::parse("987654321").unwrap())
            .unwrap();
        assert!(!plain.is_representative());
    }

    #[test]
    fn test_representative_requires_current_year_membership() {
        let store = Arc::new(MemoryStorage::new());
        let class_id = new_entity_id();
        // representative of a past year, not the current one
        store
            .student_insert(&make_representative("123456789", class_id, 2023))
            .unwrap();

        let resolver = IdentityResolver::new(store, 2024);
        let err = resolver
            .resolve_representative(&NationalId::parse("123456789").unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            CallError::Identity(IdentityError::NoActiveClass { .. })
        ));
    }

    #[test]
    fn test_classmate_must_share_class() {
        let store = Arc::new(MemoryStorage::new());
        let class_id = new_entity_id();
        let other_class = new_entity_id();

        let mut classmate = make_student("111111111");
        classmate.membership = Some(ClassMembership {
            class_id,
            year: 2024,
            teacher_id: None,
            is_representative: false,
        });
        let mut stranger = make_student("222222222");
        stranger.membership = Some(ClassMembership {
            class_id: other_class,
            year: 2024,
            teacher_id: None,
            is_representative: false,
        });
        store.student_insert(&classmate).unwrap();
        store.student_insert(&stranger).unwrap();

        let resolver = IdentityResolver::new(store, 2024);
        assert!(resolver
            .resolve_classmate(class_id, &NationalId::parse("111111111").unwrap())
            .is_ok());
        let err = resolver
            .resolve_classmate(class_id, &NationalId::parse("222222222").unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            CallError::Identity(IdentityError::NotInClass { .. })
        ));
    }

    // ========================================================================
    // Existence + Persistence Tests
    // ========================================================================

    #[test]
    fn test_save_then_find_existing_round_trip() {
        let store = Arc::new(MemoryStorage::new());
        let services_store = Arc::clone(&store);
        let persistence =
            EventPersistence::new(services_store, Arc::new(ReportLocks::new()));
        let existence = EventExistence::new(Arc::clone(&store));

        let draft = make_draft(new_entity_id(), new_entity_id());
        let saved = persistence.save(None, &draft).unwrap();

        let found = existence
            .find_existing(draft.student_id, draft.event_type_id, draft.event_date)
            .unwrap()
            .unwrap();
        assert_eq!(found.event_id, saved.event_id);
        assert_eq!(found.event_date, draft.event_date);
        assert_eq!(EventExistence::<MemoryStorage>::mode_of(&Some(found)), SaveMode::Edit);
        assert_eq!(EventExistence::<MemoryStorage>::mode_of(&None), SaveMode::Create);
    }

    #[test]
    fn test_save_twice_is_idempotent_on_gift_set() {
        let store = Arc::new(MemoryStorage::new());
        let persistence =
            EventPersistence::new(Arc::clone(&store), Arc::new(ReportLocks::new()));

        let draft = make_draft(new_entity_id(), new_entity_id());
        let first = persistence.save(None, &draft).unwrap();
        let second = persistence.save(Some(first.clone()), &draft).unwrap();

        assert_eq!(first.event_id, second.event_id);
        let gifts: Vec<EntityId> = store
            .event_gifts_for(first.event_id)
            .unwrap()
            .iter()
            .map(|g: &EventGift| g.gift_id)
            .collect();
        assert_eq!(gifts, draft.gift_ids);
    }

    #[test]
    fn test_edit_replaces_gift_set_and_merges_origin() {
        let store = Arc::new(MemoryStorage::new());
        let persistence =
            EventPersistence::new(Arc::clone(&store), Arc::new(ReportLocks::new()));

        let mut draft = make_draft(new_entity_id(), new_entity_id());
        let first = persistence.save(None, &draft).unwrap();
        assert_eq!(first.report_origin, Some(ReportOrigin::Student));

        // a proxy edit with a different gift selection
        draft.origin = ReportOrigin::Proxy;
        draft.reporter_id = Some(new_entity_id());
        draft.gift_ids = vec![new_entity_id()];
        let second = persistence.save(Some(first.clone()), &draft).unwrap();

        assert_eq!(second.event_id, first.event_id);
        assert_eq!(second.report_origin, Some(ReportOrigin::Both));
        let gifts = store.event_gifts_for(first.event_id).unwrap();
        assert_eq!(gifts.len(), 1);
        assert_eq!(gifts[0].gift_id, draft.gift_ids[0]);
    }

    #[test]
    fn test_concurrent_saves_yield_one_event_row() {
        let store = Arc::new(MemoryStorage::new());
        let locks = Arc::new(ReportLocks::new());
        let student_id = new_entity_id();
        let event_type_id = new_entity_id();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let persistence =
                    EventPersistence::new(Arc::clone(&store), Arc::clone(&locks));
                let draft = EventDraft {
                    gift_ids: vec![new_entity_id()],
                    ..make_draft(student_id, event_type_id)
                };
                std::thread::spawn(move || persistence.save(None, &draft).unwrap())
            })
            .collect();
        let saved: Vec<Event> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // every thread resolved to the same row
        let ids: std::collections::HashSet<EntityId> =
            saved.iter().map(|e| e.event_id).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.events_by_student(student_id).unwrap().len(), 1);
    }

    // ========================================================================
    // Assignment Tracker Tests
    // ========================================================================

    #[test]
    fn test_assignment_history_appends_and_tracks_current() {
        let store = Arc::new(MemoryStorage::new());
        let scope = new_entity_id();
        let family = new_entity_id();
        let tracker = AssignmentTracker::new(Arc::clone(&store), scope);

        let first_teacher = new_entity_id();
        let second_teacher = new_entity_id();
        tracker
            .record_assignment(
                2024,
                family,
                first_teacher,
                new_entity_id(),
                AssignmentSource::StudentReport,
            )
            .unwrap();
        let aggregate = tracker
            .record_assignment(
                2024,
                family,
                second_teacher,
                new_entity_id(),
                AssignmentSource::EventEdit,
            )
            .unwrap();

        assert_eq!(aggregate.current_teacher_id, second_teacher);
        assert_eq!(aggregate.history.len(), 2);
        assert_eq!(aggregate.history[0].teacher_id, first_teacher);

        let stored = store.assignment_find(scope, 2024, family).unwrap().unwrap();
        assert_eq!(stored, aggregate);
    }

    #[test]
    fn test_assignment_scopes_are_independent_per_year() {
        let store = Arc::new(MemoryStorage::new());
        let scope = new_entity_id();
        let family = new_entity_id();
        let tracker = AssignmentTracker::new(Arc::clone(&store), scope);

        tracker
            .record_assignment(
                2023,
                family,
                new_entity_id(),
                new_entity_id(),
                AssignmentSource::StudentReport,
            )
            .unwrap();
        tracker
            .record_assignment(
                2024,
                family,
                new_entity_id(),
                new_entity_id(),
                AssignmentSource::StudentReport,
            )
            .unwrap();

        let y2023 = store.assignment_find(scope, 2023, family).unwrap().unwrap();
        let y2024 = store.assignment_find(scope, 2024, family).unwrap().unwrap();
        assert_eq!(y2023.history.len(), 1);
        assert_eq!(y2024.history.len(), 1);
        assert_ne!(y2023.assignment_id, y2024.assignment_id);
    }

    proptest::proptest! {
        /// After any sequence of recorded assignments, the current pointer
        /// equals the teacher of the last appended entry and the history
        /// length equals the number of calls made.
        #[test]
        fn prop_current_teacher_follows_last_append(calls in 1usize..12) {
            let store = Arc::new(MemoryStorage::new());
            let scope = new_entity_id();
            let family = new_entity_id();
            let tracker = AssignmentTracker::new(Arc::clone(&store), scope);

            let mut last_teacher = None;
            for _ in 0..calls {
                let teacher = new_entity_id();
                tracker
                    .record_assignment(
                        2024,
                        family,
                        teacher,
                        new_entity_id(),
                        AssignmentSource::StudentReport,
                    )
                    .unwrap();
                last_teacher = Some(teacher);
            }

            let aggregate = store.assignment_find(scope, 2024, family).unwrap().unwrap();
            proptest::prop_assert_eq!(aggregate.history.len(), calls);
            proptest::prop_assert_eq!(Some(aggregate.current_teacher_id), last_teacher);
            proptest::prop_assert_eq!(
                aggregate.latest().map(|r| r.teacher_id),
                last_teacher
            );
        }
    }
}
