//! SIMCHA Test Utilities
//!
//! Centralized test infrastructure for the SIMCHA workspace:
//! - Fixture constructors for students, catalogs and configuration
//! - A pre-seeded in-memory store
//! - Proptest generators for caller input
//!
//! The scripted gateway lives in `simcha-gateway` and is re-exported here
//! for convenience.

pub use simcha_gateway::{ScriptedGateway, ScriptedInput};
pub use simcha_storage::MemoryStorage;

// Re-export core types for convenience
pub use simcha_core::{
    new_entity_id, CallConfig, CallSession, ClassMembership, EntityId, Event, EventType, Gift,
    LevelType, LotteryTrack, NationalId, Student,
};

use chrono::NaiveDate;
use proptest::prelude::*;
use simcha_storage::CelebrationStore;
use std::sync::Arc;

// ============================================================================
// FIXTURES
// ============================================================================

/// A configuration suitable for tests: 3 attempts, year 2024.
pub fn make_config() -> CallConfig {
    CallConfig {
        max_attempts: 3,
        national_id_digits: 9,
        current_year: 2024,
        account_scope: new_entity_id(),
    }
}

/// A student with a family but no class membership.
pub fn make_student(national_id: &str) -> Student {
    Student {
        student_id: new_entity_id(),
        national_id: NationalId::parse(national_id).expect("fixture national id"),
        first_name: "Noa".to_string(),
        last_name: "Levi".to_string(),
        family_id: Some(new_entity_id()),
        membership: Some(ClassMembership {
            class_id: new_entity_id(),
            year: 2024,
            teacher_id: Some(new_entity_id()),
            is_representative: false,
        }),
    }
}

/// A student in the given class with a homeroom teacher.
pub fn make_classmate(
    national_id: &str,
    class_id: EntityId,
    teacher_id: EntityId,
) -> Student {
    let mut student = make_student(national_id);
    student.membership = Some(ClassMembership {
        class_id,
        year: 2024,
        teacher_id: Some(teacher_id),
        is_representative: false,
    });
    student
}

/// The class representative of the given class.
pub fn make_representative(
    national_id: &str,
    class_id: EntityId,
    teacher_id: EntityId,
) -> Student {
    let mut student = make_classmate(national_id, class_id, teacher_id);
    student.first_name = "Tamar".to_string();
    if let Some(membership) = &mut student.membership {
        membership.is_representative = true;
    }
    student
}

/// Ids of everything `seeded_store` inserts, for assertions.
pub struct SeededCatalogs {
    pub event_types: Vec<EventType>,
    pub gifts: Vec<Gift>,
    pub tracks: Vec<LotteryTrack>,
}

/// An in-memory store with the standard catalogs:
/// event types Birthday(1) / Bat Mitzvah(2), gifts Book(1) / Game(2) /
/// Voucher(3), tracks Books(1) / Toys(2). Level types are left empty;
/// seed them with [`seed_level_types`] where a test needs the level step.
pub fn seeded_store() -> (Arc<MemoryStorage>, SeededCatalogs) {
    let store = Arc::new(MemoryStorage::new());

    let event_types = vec![
        EventType {
            event_type_id: new_entity_id(),
            menu_key: 1,
            name: "Birthday".to_string(),
            description: None,
        },
        EventType {
            event_type_id: new_entity_id(),
            menu_key: 2,
            name: "Bat Mitzvah".to_string(),
            description: Some("Twelfth birthday celebration".to_string()),
        },
    ];
    let gifts = vec![
        Gift {
            gift_id: new_entity_id(),
            menu_key: 1,
            name: "Book".to_string(),
        },
        Gift {
            gift_id: new_entity_id(),
            menu_key: 2,
            name: "Game".to_string(),
        },
        Gift {
            gift_id: new_entity_id(),
            menu_key: 3,
            name: "Voucher".to_string(),
        },
    ];
    let tracks = vec![
        LotteryTrack {
            track_id: new_entity_id(),
            menu_key: 1,
            name: "Books".to_string(),
        },
        LotteryTrack {
            track_id: new_entity_id(),
            menu_key: 2,
            name: "Toys".to_string(),
        },
    ];

    for event_type in &event_types {
        store
            .event_type_insert(event_type)
            .expect("seed event type");
    }
    for gift in &gifts {
        store.gift_insert(gift).expect("seed gift");
    }
    for track in &tracks {
        store.lottery_track_insert(track).expect("seed track");
    }

    (
        store,
        SeededCatalogs {
            event_types,
            gifts,
            tracks,
        },
    )
}

/// Add level types Classic(1) / Deluxe(2) to a store.
pub fn seed_level_types(store: &MemoryStorage) -> Vec<LevelType> {
    let levels = vec![
        LevelType {
            level_type_id: new_entity_id(),
            menu_key: 1,
            name: "Classic".to_string(),
        },
        LevelType {
            level_type_id: new_entity_id(),
            menu_key: 2,
            name: "Deluxe".to_string(),
        },
    ];
    for level in &levels {
        store.level_type_insert(level).expect("seed level type");
    }
    levels
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Nine-digit national ID strings.
pub fn national_id_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec(0u8..10, 9)
        .prop_map(|digits| digits.iter().map(u8::to_string).collect())
}

/// Valid calendar dates within the system's working range,
/// as the caller would key them in (DDMMYYYY).
pub fn keyed_date_strategy() -> impl Strategy<Value = (NaiveDate, String)> {
    (2023i32..2026, 1u32..13, 1u32..29).prop_map(|(year, month, day)| {
        let date = NaiveDate::from_ymd_opt(year, month, day).expect("generated date is valid");
        (date, format!("{day:02}{month:02}{year:04}"))
    })
}

/// Single digits outside the given allow-list.
pub fn rejected_key_strategy(allowed: Vec<u8>) -> impl Strategy<Value = String> {
    (0u8..10)
        .prop_filter("key must be outside the allow-list", move |k| {
            !allowed.contains(k)
        })
        .prop_map(|k| k.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_store_has_catalogs() {
        let (store, seeded) = seeded_store();
        assert_eq!(store.event_types_all().unwrap().len(), seeded.event_types.len());
        assert_eq!(store.gifts_all().unwrap().len(), seeded.gifts.len());
        assert_eq!(store.lottery_tracks_all().unwrap().len(), seeded.tracks.len());
        assert!(store.level_types_all().unwrap().is_empty());
    }

    #[test]
    fn test_representative_fixture_is_flagged() {
        let class_id = new_entity_id();
        let teacher_id = new_entity_id();
        let rep = make_representative("123456789", class_id, teacher_id);
        let membership = rep.membership.unwrap();
        assert!(membership.is_representative);
        assert_eq!(membership.class_id, class_id);
    }

    proptest::proptest! {
        #[test]
        fn prop_generated_national_ids_parse(raw in national_id_strategy()) {
            prop_assert!(NationalId::parse(&raw).is_ok());
        }

        #[test]
        fn prop_keyed_dates_have_eight_digits((_, keyed) in keyed_date_strategy()) {
            prop_assert_eq!(keyed.len(), 8);
            prop_assert!(keyed.bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
