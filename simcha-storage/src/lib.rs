//! SIMCHA Storage - Storage Trait and In-Memory Implementation
//!
//! Defines the repository abstraction the call-handling core commits
//! through. The durable entities are owned by the administrative system;
//! this crate specifies the contract and ships a thread-safe in-memory
//! implementation used by tests, call replay and the simulator.

pub mod locks;

pub use locks::{report_lock_key, ReportLocks};

use chrono::NaiveDate;
use simcha_core::{
    CallResult, EntityId, EntityKind, Event, EventGift, EventType, FamilyTeacherAssignment,
    FulfillmentResponse, Gift, LevelType, LotteryEntry, LotteryTrack, NationalId, StorageError,
    Student,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Repository contract over all durable SIMCHA entities.
///
/// Multi-step write sequences that must be atomic go through
/// [`CelebrationStore::transaction`]; a failure inside the closure rolls
/// every write in it back. Transactions do not nest.
pub trait CelebrationStore: Send + Sync {
    // === Student Operations (read-only to the call core) ===

    /// Insert a student record. Used by seeding and the admin boundary.
    fn student_insert(&self, student: &Student) -> CallResult<()>;

    /// Get a student by internal id.
    fn student_get(&self, id: EntityId) -> CallResult<Option<Student>>;

    /// Look up a student by national ID.
    fn student_by_national_id(&self, national_id: &NationalId) -> CallResult<Option<Student>>;

    /// All students belonging to a class in a given year.
    fn students_in_class(&self, class_id: EntityId, year: i32) -> CallResult<Vec<Student>>;

    // === Catalog Operations ===

    /// Insert an event type catalog entry.
    fn event_type_insert(&self, event_type: &EventType) -> CallResult<()>;

    /// All event types, ordered by menu key.
    fn event_types_all(&self) -> CallResult<Vec<EventType>>;

    /// Insert a level type catalog entry.
    fn level_type_insert(&self, level_type: &LevelType) -> CallResult<()>;

    /// All level types, ordered by menu key.
    fn level_types_all(&self) -> CallResult<Vec<LevelType>>;

    /// Insert a gift catalog entry.
    fn gift_insert(&self, gift: &Gift) -> CallResult<()>;

    /// All gifts, ordered by menu key.
    fn gifts_all(&self) -> CallResult<Vec<Gift>>;

    /// Insert a lottery/voucher track catalog entry.
    fn lottery_track_insert(&self, track: &LotteryTrack) -> CallResult<()>;

    /// All tracks, ordered by menu key.
    fn lottery_tracks_all(&self) -> CallResult<Vec<LotteryTrack>>;

    // === Event Operations ===

    /// Insert a new event.
    fn event_insert(&self, event: &Event) -> CallResult<()>;

    /// Get an event by id.
    fn event_get(&self, id: EntityId) -> CallResult<Option<Event>>;

    /// Replace an existing event row.
    fn event_update(&self, event: &Event) -> CallResult<()>;

    /// Exact match on the authoritative (student, type, date) triple.
    fn event_find_by_triple(
        &self,
        student_id: EntityId,
        event_type_id: EntityId,
        event_date: NaiveDate,
    ) -> CallResult<Option<Event>>;

    /// All events for a student, ordered by event date.
    fn events_by_student(&self, student_id: EntityId) -> CallResult<Vec<Event>>;

    // === Event Gift Operations ===

    /// Replace the whole gift set for an event (delete-then-insert).
    fn event_gifts_replace(&self, event_id: EntityId, gift_ids: &[EntityId]) -> CallResult<()>;

    /// Current gift set for an event.
    fn event_gifts_for(&self, event_id: EntityId) -> CallResult<Vec<EventGift>>;

    // === Lottery Entry Operations ===

    /// Insert a lottery/voucher enrollment.
    fn lottery_entry_insert(&self, entry: &LotteryEntry) -> CallResult<()>;

    /// All enrollments for a student, in creation order.
    fn lottery_entries_by_student(&self, student_id: EntityId) -> CallResult<Vec<LotteryEntry>>;

    // === Fulfillment Operations ===

    /// Insert a completed fulfillment survey.
    fn fulfillment_insert(&self, response: &FulfillmentResponse) -> CallResult<()>;

    /// All survey responses recorded for an event.
    fn fulfillments_by_event(&self, event_id: EntityId) -> CallResult<Vec<FulfillmentResponse>>;

    // === Family-Teacher Assignment Operations ===

    /// The aggregate for (account scope, year, family), if created yet.
    fn assignment_find(
        &self,
        account_scope: EntityId,
        year: i32,
        family_id: EntityId,
    ) -> CallResult<Option<FamilyTeacherAssignment>>;

    /// Insert or replace the aggregate under its (scope, year, family) key.
    fn assignment_put(&self, assignment: &FamilyTeacherAssignment) -> CallResult<()>;

    // === Transaction Boundary ===

    /// Run `f` atomically: all writes it performs commit together or not
    /// at all. Concurrent transactions are serialized.
    fn transaction(
        &self,
        f: &mut dyn FnMut(&dyn CelebrationStore) -> CallResult<()>,
    ) -> CallResult<()>;
}

// ============================================================================
// IN-MEMORY IMPLEMENTATION
// ============================================================================

type Table<T> = Arc<RwLock<HashMap<Uuid, T>>>;

/// Thread-safe in-memory store.
///
/// Transactions snapshot every table under a store-wide gate and restore
/// the snapshot when the closure fails, so a crash between the gift-set
/// delete and re-insert can never surface a half-written event.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    students: Table<Student>,
    event_types: Table<EventType>,
    level_types: Table<LevelType>,
    gifts: Table<Gift>,
    lottery_tracks: Table<LotteryTrack>,
    events: Table<Event>,
    event_gifts: Arc<RwLock<HashMap<Uuid, Vec<EventGift>>>>,
    lottery_entries: Table<LotteryEntry>,
    fulfillments: Table<FulfillmentResponse>,
    assignments: Arc<RwLock<HashMap<(Uuid, i32, Uuid), FamilyTeacherAssignment>>>,
    txn_gate: Arc<Mutex<()>>,
}

/// Full copy of every table, held while a transaction is open.
struct Snapshot {
    students: HashMap<Uuid, Student>,
    event_types: HashMap<Uuid, EventType>,
    level_types: HashMap<Uuid, LevelType>,
    gifts: HashMap<Uuid, Gift>,
    lottery_tracks: HashMap<Uuid, LotteryTrack>,
    events: HashMap<Uuid, Event>,
    event_gifts: HashMap<Uuid, Vec<EventGift>>,
    lottery_entries: HashMap<Uuid, LotteryEntry>,
    fulfillments: HashMap<Uuid, FulfillmentResponse>,
    assignments: HashMap<(Uuid, i32, Uuid), FamilyTeacherAssignment>,
}

fn read<T>(table: &Arc<RwLock<T>>) -> Result<std::sync::RwLockReadGuard<'_, T>, StorageError> {
    table.read().map_err(|_| StorageError::LockPoisoned)
}

fn write<T>(table: &Arc<RwLock<T>>) -> Result<std::sync::RwLockWriteGuard<'_, T>, StorageError> {
    table.write().map_err(|_| StorageError::LockPoisoned)
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_unique<T: Clone>(
        table: &Table<T>,
        kind: EntityKind,
        id: Uuid,
        row: &T,
    ) -> CallResult<()> {
        let mut guard = write(table)?;
        if guard.contains_key(&id) {
            return Err(StorageError::DuplicateInsert { kind, id }.into());
        }
        guard.insert(id, row.clone());
        Ok(())
    }

    fn snapshot(&self) -> Result<Snapshot, StorageError> {
        Ok(Snapshot {
            students: read(&self.students)?.clone(),
            event_types: read(&self.event_types)?.clone(),
            level_types: read(&self.level_types)?.clone(),
            gifts: read(&self.gifts)?.clone(),
            lottery_tracks: read(&self.lottery_tracks)?.clone(),
            events: read(&self.events)?.clone(),
            event_gifts: read(&self.event_gifts)?.clone(),
            lottery_entries: read(&self.lottery_entries)?.clone(),
            fulfillments: read(&self.fulfillments)?.clone(),
            assignments: read(&self.assignments)?.clone(),
        })
    }

    fn restore(&self, snapshot: Snapshot) -> Result<(), StorageError> {
        *write(&self.students)? = snapshot.students;
        *write(&self.event_types)? = snapshot.event_types;
        *write(&self.level_types)? = snapshot.level_types;
        *write(&self.gifts)? = snapshot.gifts;
        *write(&self.lottery_tracks)? = snapshot.lottery_tracks;
        *write(&self.events)? = snapshot.events;
        *write(&self.event_gifts)? = snapshot.event_gifts;
        *write(&self.lottery_entries)? = snapshot.lottery_entries;
        *write(&self.fulfillments)? = snapshot.fulfillments;
        *write(&self.assignments)? = snapshot.assignments;
        Ok(())
    }
}

impl CelebrationStore for MemoryStorage {
    // === Student Operations ===

    fn student_insert(&self, student: &Student) -> CallResult<()> {
        {
            let guard = read(&self.students)?;
            if let Some(existing) = guard
                .values()
                .find(|s| s.national_id == student.national_id)
            {
                // national IDs are unique across the student table
                return Err(StorageError::DuplicateInsert {
                    kind: EntityKind::Student,
                    id: existing.student_id,
                }
                .into());
            }
        }
        Self::insert_unique(
            &self.students,
            EntityKind::Student,
            student.student_id,
            student,
        )
    }

    fn student_get(&self, id: EntityId) -> CallResult<Option<Student>> {
        Ok(read(&self.students)?.get(&id).cloned())
    }

    fn student_by_national_id(&self, national_id: &NationalId) -> CallResult<Option<Student>> {
        Ok(read(&self.students)?
            .values()
            .find(|s| &s.national_id == national_id)
            .cloned())
    }

    fn students_in_class(&self, class_id: EntityId, year: i32) -> CallResult<Vec<Student>> {
        let mut students: Vec<Student> = read(&self.students)?
            .values()
            .filter(|s| {
                s.membership_for(year)
                    .is_some_and(|m| m.class_id == class_id)
            })
            .cloned()
            .collect();
        students.sort_by(|a, b| a.last_name.cmp(&b.last_name));
        Ok(students)
    }

    // === Catalog Operations ===

    fn event_type_insert(&self, event_type: &EventType) -> CallResult<()> {
        Self::insert_unique(
            &self.event_types,
            EntityKind::EventType,
            event_type.event_type_id,
            event_type,
        )
    }

    fn event_types_all(&self) -> CallResult<Vec<EventType>> {
        let mut types: Vec<EventType> = read(&self.event_types)?.values().cloned().collect();
        types.sort_by_key(|t| t.menu_key);
        Ok(types)
    }

    fn level_type_insert(&self, level_type: &LevelType) -> CallResult<()> {
        Self::insert_unique(
            &self.level_types,
            EntityKind::LevelType,
            level_type.level_type_id,
            level_type,
        )
    }

    fn level_types_all(&self) -> CallResult<Vec<LevelType>> {
        let mut types: Vec<LevelType> = read(&self.level_types)?.values().cloned().collect();
        types.sort_by_key(|t| t.menu_key);
        Ok(types)
    }

    fn gift_insert(&self, gift: &Gift) -> CallResult<()> {
        Self::insert_unique(&self.gifts, EntityKind::Gift, gift.gift_id, gift)
    }

    fn gifts_all(&self) -> CallResult<Vec<Gift>> {
        let mut gifts: Vec<Gift> = read(&self.gifts)?.values().cloned().collect();
        gifts.sort_by_key(|g| g.menu_key);
        Ok(gifts)
    }

    fn lottery_track_insert(&self, track: &LotteryTrack) -> CallResult<()> {
        Self::insert_unique(
            &self.lottery_tracks,
            EntityKind::LotteryTrack,
            track.track_id,
            track,
        )
    }

    fn lottery_tracks_all(&self) -> CallResult<Vec<LotteryTrack>> {
        let mut tracks: Vec<LotteryTrack> =
            read(&self.lottery_tracks)?.values().cloned().collect();
        tracks.sort_by_key(|t| t.menu_key);
        Ok(tracks)
    }

    // === Event Operations ===

    fn event_insert(&self, event: &Event) -> CallResult<()> {
        Self::insert_unique(&self.events, EntityKind::Event, event.event_id, event)
    }

    fn event_get(&self, id: EntityId) -> CallResult<Option<Event>> {
        Ok(read(&self.events)?.get(&id).cloned())
    }

    fn event_update(&self, event: &Event) -> CallResult<()> {
        let mut guard = write(&self.events)?;
        if !guard.contains_key(&event.event_id) {
            return Err(StorageError::NotFound {
                kind: EntityKind::Event,
                id: event.event_id,
            }
            .into());
        }
        guard.insert(event.event_id, event.clone());
        Ok(())
    }

    fn event_find_by_triple(
        &self,
        student_id: EntityId,
        event_type_id: EntityId,
        event_date: NaiveDate,
    ) -> CallResult<Option<Event>> {
        Ok(read(&self.events)?
            .values()
            .find(|e| {
                e.student_id == student_id
                    && e.event_type_id == event_type_id
                    && e.event_date == event_date
            })
            .cloned())
    }

    fn events_by_student(&self, student_id: EntityId) -> CallResult<Vec<Event>> {
        let mut events: Vec<Event> = read(&self.events)?
            .values()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect();
        events.sort_by_key(|e| (e.event_date, e.event_id));
        Ok(events)
    }

    // === Event Gift Operations ===

    fn event_gifts_replace(&self, event_id: EntityId, gift_ids: &[EntityId]) -> CallResult<()> {
        let rows: Vec<EventGift> = gift_ids
            .iter()
            .map(|gift_id| EventGift {
                event_id,
                gift_id: *gift_id,
            })
            .collect();
        write(&self.event_gifts)?.insert(event_id, rows);
        Ok(())
    }

    fn event_gifts_for(&self, event_id: EntityId) -> CallResult<Vec<EventGift>> {
        Ok(read(&self.event_gifts)?
            .get(&event_id)
            .cloned()
            .unwrap_or_default())
    }

    // === Lottery Entry Operations ===

    fn lottery_entry_insert(&self, entry: &LotteryEntry) -> CallResult<()> {
        Self::insert_unique(
            &self.lottery_entries,
            EntityKind::LotteryEntry,
            entry.entry_id,
            entry,
        )
    }

    fn lottery_entries_by_student(&self, student_id: EntityId) -> CallResult<Vec<LotteryEntry>> {
        let mut entries: Vec<LotteryEntry> = read(&self.lottery_entries)?
            .values()
            .filter(|e| e.student_id == student_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        Ok(entries)
    }

    // === Fulfillment Operations ===

    fn fulfillment_insert(&self, response: &FulfillmentResponse) -> CallResult<()> {
        Self::insert_unique(
            &self.fulfillments,
            EntityKind::FulfillmentResponse,
            response.response_id,
            response,
        )
    }

    fn fulfillments_by_event(&self, event_id: EntityId) -> CallResult<Vec<FulfillmentResponse>> {
        let mut responses: Vec<FulfillmentResponse> = read(&self.fulfillments)?
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        responses.sort_by_key(|r| r.created_at);
        Ok(responses)
    }

    // === Family-Teacher Assignment Operations ===

    fn assignment_find(
        &self,
        account_scope: EntityId,
        year: i32,
        family_id: EntityId,
    ) -> CallResult<Option<FamilyTeacherAssignment>> {
        Ok(read(&self.assignments)?
            .get(&(account_scope, year, family_id))
            .cloned())
    }

    fn assignment_put(&self, assignment: &FamilyTeacherAssignment) -> CallResult<()> {
        write(&self.assignments)?.insert(
            (
                assignment.account_scope,
                assignment.year,
                assignment.family_id,
            ),
            assignment.clone(),
        );
        Ok(())
    }

    // === Transaction Boundary ===

    fn transaction(
        &self,
        f: &mut dyn FnMut(&dyn CelebrationStore) -> CallResult<()>,
    ) -> CallResult<()> {
        let _gate = self
            .txn_gate
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        let snapshot = self.snapshot()?;
        match f(self) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.restore(snapshot)?;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use simcha_core::{new_entity_id, AssignmentRecord, AssignmentSource, ClassMembership};

    fn make_test_student(national_id: &str) -> Student {
        Student {
            student_id: new_entity_id(),
            national_id: NationalId::parse(national_id).unwrap(),
            first_name: "Noa".to_string(),
            last_name: "Levi".to_string(),
            family_id: Some(new_entity_id()),
            membership: None,
        }
    }

    fn make_test_event_type(menu_key: u8) -> EventType {
        EventType {
            event_type_id: new_entity_id(),
            menu_key,
            name: format!("Type {menu_key}"),
            description: None,
        }
    }

    fn make_test_event(student_id: EntityId, event_type_id: EntityId) -> Event {
        Event::new(
            student_id,
            event_type_id,
            NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
        )
    }

    #[test]
    fn test_student_insert_get() {
        let storage = MemoryStorage::new();
        let student = make_test_student("123456789");

        storage.student_insert(&student).unwrap();
        let retrieved = storage.student_get(student.student_id).unwrap();

        assert_eq!(retrieved.unwrap().national_id, student.national_id);
    }

    #[test]
    fn test_student_duplicate_national_id_rejected() {
        let storage = MemoryStorage::new();
        let first = make_test_student("123456789");
        let mut second = make_test_student("123456789");
        second.student_id = new_entity_id();

        storage.student_insert(&first).unwrap();
        assert!(storage.student_insert(&second).is_err());
    }

    #[test]
    fn test_student_lookup_by_national_id() {
        let storage = MemoryStorage::new();
        let student = make_test_student("987654321");
        storage.student_insert(&student).unwrap();

        let found = storage
            .student_by_national_id(&NationalId::parse("987654321").unwrap())
            .unwrap();
        assert_eq!(found.unwrap().student_id, student.student_id);

        let missing = storage
            .student_by_national_id(&NationalId::parse("111111111").unwrap())
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_students_in_class_filters_year() {
        let storage = MemoryStorage::new();
        let class_id = new_entity_id();
        let mut in_class = make_test_student("123456789");
        in_class.membership = Some(ClassMembership {
            class_id,
            year: 2024,
            teacher_id: None,
            is_representative: false,
        });
        let mut other_year = make_test_student("987654321");
        other_year.membership = Some(ClassMembership {
            class_id,
            year: 2023,
            teacher_id: None,
            is_representative: false,
        });
        storage.student_insert(&in_class).unwrap();
        storage.student_insert(&other_year).unwrap();

        let found = storage.students_in_class(class_id, 2024).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].student_id, in_class.student_id);
    }

    #[test]
    fn test_event_types_ordered_by_menu_key() {
        let storage = MemoryStorage::new();
        storage.event_type_insert(&make_test_event_type(3)).unwrap();
        storage.event_type_insert(&make_test_event_type(1)).unwrap();
        storage.event_type_insert(&make_test_event_type(2)).unwrap();

        let keys: Vec<u8> = storage
            .event_types_all()
            .unwrap()
            .iter()
            .map(|t| t.menu_key)
            .collect();
        assert_eq!(keys, vec![1, 2, 3]);
    }

    #[test]
    fn test_event_find_by_triple() {
        let storage = MemoryStorage::new();
        let student_id = new_entity_id();
        let type_id = new_entity_id();
        let event = make_test_event(student_id, type_id);
        storage.event_insert(&event).unwrap();

        let found = storage
            .event_find_by_triple(student_id, type_id, event.event_date)
            .unwrap();
        assert_eq!(found.unwrap().event_id, event.event_id);

        let other_date = NaiveDate::from_ymd_opt(2024, 6, 16).unwrap();
        assert!(storage
            .event_find_by_triple(student_id, type_id, other_date)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_event_update_requires_existing_row() {
        let storage = MemoryStorage::new();
        let event = make_test_event(new_entity_id(), new_entity_id());
        assert!(storage.event_update(&event).is_err());

        storage.event_insert(&event).unwrap();
        let mut edited = event.clone();
        edited.updated_at = Utc::now();
        storage.event_update(&edited).unwrap();
    }

    #[test]
    fn test_event_gifts_replace_is_wholesale() {
        let storage = MemoryStorage::new();
        let event_id = new_entity_id();
        let first_set = vec![new_entity_id(), new_entity_id()];
        let second_set = vec![new_entity_id()];

        storage.event_gifts_replace(event_id, &first_set).unwrap();
        assert_eq!(storage.event_gifts_for(event_id).unwrap().len(), 2);

        storage.event_gifts_replace(event_id, &second_set).unwrap();
        let rows = storage.event_gifts_for(event_id).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].gift_id, second_set[0]);
    }

    #[test]
    fn test_assignment_put_and_find() {
        let storage = MemoryStorage::new();
        let scope = new_entity_id();
        let family = new_entity_id();
        let teacher = new_entity_id();
        let aggregate = FamilyTeacherAssignment::new(
            scope,
            2024,
            family,
            AssignmentRecord {
                event_id: new_entity_id(),
                teacher_id: teacher,
                assigned_at: Utc::now(),
                source: AssignmentSource::StudentReport,
            },
        );

        storage.assignment_put(&aggregate).unwrap();
        let found = storage.assignment_find(scope, 2024, family).unwrap().unwrap();
        assert_eq!(found.current_teacher_id, teacher);

        assert!(storage
            .assignment_find(scope, 2023, family)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let storage = MemoryStorage::new();
        let event = make_test_event(new_entity_id(), new_entity_id());
        let gift_id = new_entity_id();

        let result = storage.transaction(&mut |store| {
            store.event_insert(&event)?;
            store.event_gifts_replace(event.event_id, &[gift_id])?;
            Err(StorageError::TransactionFailed {
                reason: "induced".to_string(),
            }
            .into())
        });

        assert!(result.is_err());
        assert!(storage.event_get(event.event_id).unwrap().is_none());
        assert!(storage.event_gifts_for(event.event_id).unwrap().is_empty());
    }

    #[test]
    fn test_transaction_commits_on_success() {
        let storage = MemoryStorage::new();
        let event = make_test_event(new_entity_id(), new_entity_id());
        let gift_id = new_entity_id();

        storage
            .transaction(&mut |store| {
                store.event_insert(&event)?;
                store.event_gifts_replace(event.event_id, &[gift_id])
            })
            .unwrap();

        assert!(storage.event_get(event.event_id).unwrap().is_some());
        assert_eq!(storage.event_gifts_for(event.event_id).unwrap().len(), 1);
    }

    proptest::proptest! {
        /// However many times the gift set is replaced, the stored rows
        /// always equal exactly the last written set.
        #[test]
        fn prop_gift_replace_is_wholesale(set_count in 1usize..6, last_len in 0usize..5) {
            let storage = MemoryStorage::new();
            let event_id = new_entity_id();
            for _ in 0..set_count {
                let interim: Vec<EntityId> = (0..4).map(|_| new_entity_id()).collect();
                storage.event_gifts_replace(event_id, &interim).unwrap();
            }
            let last: Vec<EntityId> = (0..last_len).map(|_| new_entity_id()).collect();
            storage.event_gifts_replace(event_id, &last).unwrap();

            let stored: Vec<EntityId> = storage
                .event_gifts_for(event_id)
                .unwrap()
                .iter()
                .map(|row| row.gift_id)
                .collect();
            proptest::prop_assert_eq!(stored, last);
        }
    }
}
