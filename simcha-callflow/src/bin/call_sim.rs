//! Scripted call simulator.
//!
//! Seeds an in-memory store, replays one celebration-report call end to
//! end through the orchestrator, and prints the spoken transcript plus
//! the persisted rows as JSON. Exercises the full call path without
//! telephony; set RUST_LOG=debug to watch the state machine.

use simcha_callflow::Orchestrator;
use simcha_core::{new_entity_id, CallConfig, ClassMembership, EventType, Gift, NationalId, Student};
use simcha_gateway::{MessageCatalog, ScriptedGateway, ScriptedInput};
use simcha_storage::{CelebrationStore, MemoryStorage};
use std::sync::Arc;

fn seed(store: &MemoryStorage) -> Result<Student, Box<dyn std::error::Error>> {
    let class_id = new_entity_id();
    let teacher_id = new_entity_id();
    let student = Student {
        student_id: new_entity_id(),
        national_id: NationalId::parse("123456789")?,
        first_name: "Noa".to_string(),
        last_name: "Levi".to_string(),
        family_id: Some(new_entity_id()),
        membership: Some(ClassMembership {
            class_id,
            year: 2024,
            teacher_id: Some(teacher_id),
            is_representative: false,
        }),
    };
    store.student_insert(&student)?;

    for (menu_key, name) in [(1u8, "Birthday"), (2, "Bat Mitzvah")] {
        store.event_type_insert(&EventType {
            event_type_id: new_entity_id(),
            menu_key,
            name: name.to_string(),
            description: None,
        })?;
    }
    for (menu_key, name) in [(1u8, "Book"), (2, "Game"), (3, "Voucher")] {
        store.gift_insert(&Gift {
            gift_id: new_entity_id(),
            menu_key,
            name: name.to_string(),
        })?;
    }
    Ok(student)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = Arc::new(MemoryStorage::new());
    let student = seed(&store)?;

    // One complete report: identify, choose "report", Bat Mitzvah on
    // 15 June 2024, gifts 1 and 3, done.
    let script = vec![
        ScriptedInput::digits("123456789"),
        ScriptedInput::digits("1"),
        ScriptedInput::digits("2"),
        ScriptedInput::digits("15062024"),
        ScriptedInput::digits("1"),
        ScriptedInput::digits("3"),
        ScriptedInput::digits("0"),
    ];
    let config = CallConfig {
        max_attempts: 3,
        national_id_digits: 9,
        current_year: 2024,
        account_scope: new_entity_id(),
    };
    let mut orchestrator = Orchestrator::new(
        Arc::clone(&store),
        ScriptedGateway::new(script),
        MessageCatalog::builtin(),
        config,
    );

    let (session, summary) = orchestrator.run_call("0501234567");

    println!("call {} transcript:", session.call_id);
    let gateway = orchestrator.into_gateway();
    for line in gateway.transcript() {
        println!("  > {line}");
    }

    match summary {
        Some(summary) => println!("\noutcome: {:?} ({})", summary.flow, summary.detail),
        None => println!("\noutcome: call ended without completing a flow"),
    }

    let events = store.events_by_student(student.student_id)?;
    println!("\npersisted events:\n{}", serde_json::to_string_pretty(&events)?);
    if let Some(event) = events.first() {
        let gifts = store.event_gifts_for(event.event_id)?;
        println!("\ngift rows:\n{}", serde_json::to_string_pretty(&gifts)?);
    }

    Ok(())
}
