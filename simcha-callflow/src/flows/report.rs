//! Event report flow: direct reports and proxy reports by a class
//! representative on a classmate's behalf.

use super::{
    expect_date, expect_digits, expect_key, menu_prompt, spoken_date, CallFlow, FlowContext,
    FlowSummary,
};
use crate::step::{EchoStyle, StepSpec};
use simcha_core::{
    AssignmentSource, CallResult, CallerIdentity, EntityId, EntityKind, Flow, FlowError,
    IdentityError, InputError, NationalId, ReportOrigin,
};
use simcha_gateway::{PromptSegment, VoiceGateway};
use simcha_services::{EventDraft, EventExistence, SaveMode};
use simcha_storage::CelebrationStore;

/// Menu key that ends the gift-selection loop.
const GIFT_DONE_KEY: u8 = 0;

/// Collects one celebration report and persists it.
///
/// Runs for the identified caller herself, or for the session's proxy
/// target when a representative set one up first.
pub struct ReportEventFlow;

impl<S: CelebrationStore, G: VoiceGateway> CallFlow<S, G> for ReportEventFlow {
    fn flow(&self) -> Flow {
        Flow::ReportEvent
    }

    fn run(&self, cx: &mut FlowContext<'_, S, G>) -> CallResult<FlowSummary> {
        let subject = cx
            .session
            .subject()
            .cloned()
            .ok_or_else(|| FlowError::IdentityRequired {
                flow: "report".to_string(),
            })?;
        let caller = cx
            .session
            .identity
            .as_ref()
            .map(|i| i.student().clone())
            .ok_or_else(|| FlowError::IdentityRequired {
                flow: "report".to_string(),
            })?;
        let is_proxy = cx.session.proxy_target.is_some();

        // --- event type ---
        let types = cx.store.event_types_all()?;
        if types.is_empty() {
            return Err(FlowError::EmptyCatalog {
                kind: EntityKind::EventType,
            }
            .into());
        }
        let type_options: Vec<(u8, String)> =
            types.iter().map(|t| (t.menu_key, t.name.clone())).collect();
        let type_keys: Vec<u8> = type_options.iter().map(|(k, _)| *k).collect();
        let prompt = menu_prompt(
            cx.menu.catalog(),
            "event.prompt_type",
            "event.option_type",
            "name",
            &type_options,
        )?;
        let step = StepSpec::menu("event_type", prompt, &type_keys).with_echo(EchoStyle::Label {
            message_key: "event.confirm_type".to_string(),
            labels: type_options.clone(),
        });
        let type_key = expect_key(cx.menu.ask(cx.session, &step)?, "event_type")?;
        let event_type = types
            .iter()
            .find(|t| t.menu_key == type_key)
            .cloned()
            .ok_or_else(|| InputError::OutOfGrammar {
                step: "event_type".to_string(),
            })?;

        // --- event date ---
        let prompt = vec![PromptSegment::Text(
            cx.menu.catalog().render("event.prompt_date", &[])?,
        )];
        let step = StepSpec::date("event_date", prompt).with_echo(EchoStyle::Date {
            message_key: "event.confirm_date".to_string(),
        });
        let event_date = expect_date(cx.menu.ask(cx.session, &step)?, "event_date")?;

        // --- existence: tell the caller whether this creates or edits ---
        let existing = cx.services.existence.find_existing(
            subject.student_id,
            event_type.event_type_id,
            event_date,
        )?;
        let mode = EventExistence::<S>::mode_of(&existing);
        match mode {
            SaveMode::Create => cx.menu.announce("event.create_mode", &[])?,
            SaveMode::Edit => cx.menu.announce("event.edit_mode", &[])?,
        }

        // --- level (only when the catalog carries levels) ---
        let levels = cx.store.level_types_all()?;
        let level_type_id = if levels.is_empty() {
            None
        } else {
            let level_options: Vec<(u8, String)> = levels
                .iter()
                .map(|l| (l.menu_key, l.name.clone()))
                .collect();
            let level_keys: Vec<u8> = level_options.iter().map(|(k, _)| *k).collect();
            let prompt = menu_prompt(
                cx.menu.catalog(),
                "event.prompt_level",
                "event.option_level",
                "name",
                &level_options,
            )?;
            let step =
                StepSpec::menu("level_type", prompt, &level_keys).with_echo(EchoStyle::Label {
                    message_key: "event.confirm_level".to_string(),
                    labels: level_options,
                });
            let level_key = expect_key(cx.menu.ask(cx.session, &step)?, "level_type")?;
            levels
                .iter()
                .find(|l| l.menu_key == level_key)
                .map(|l| l.level_type_id)
        };

        // --- gift selection sub-loop, 0 finishes ---
        let gifts = cx.store.gifts_all()?;
        let mut gift_ids: Vec<EntityId> = Vec::new();
        if !gifts.is_empty() {
            let gift_labels: Vec<(u8, String)> =
                gifts.iter().map(|g| (g.menu_key, g.name.clone())).collect();
            let mut gift_keys: Vec<u8> = gift_labels.iter().map(|(k, _)| *k).collect();
            gift_keys.push(GIFT_DONE_KEY);
            let prompt = menu_prompt(
                cx.menu.catalog(),
                "event.prompt_gift",
                "event.option_gift",
                "name",
                &gift_labels,
            )?;
            for round in 0.. {
                let step = StepSpec::menu(format!("gift_{round}"), prompt.clone(), &gift_keys)
                    .with_echo(EchoStyle::Label {
                        message_key: "event.confirm_gift".to_string(),
                        labels: gift_labels.clone(),
                    });
                let key = expect_key(cx.menu.ask(cx.session, &step)?, "gift")?;
                if key == GIFT_DONE_KEY {
                    break;
                }
                if let Some(gift) = gifts.iter().find(|g| g.menu_key == key) {
                    if !gift_ids.contains(&gift.gift_id) {
                        gift_ids.push(gift.gift_id);
                    }
                }
            }
        }

        // --- persist, then derive the family-teacher assignment ---
        let draft = EventDraft {
            student_id: subject.student_id,
            event_type_id: event_type.event_type_id,
            event_date,
            level_type_id,
            reporter_id: is_proxy.then_some(caller.student_id),
            origin: if is_proxy {
                ReportOrigin::Proxy
            } else {
                ReportOrigin::Student
            },
            gift_ids,
        };
        let saved = cx.services.persistence.save(existing, &draft)?;

        if let (Some(family_id), Some(teacher_id)) = (
            subject.family_id,
            subject.teacher_for(cx.config.current_year),
        ) {
            let source = match (mode, is_proxy) {
                (SaveMode::Edit, _) => AssignmentSource::EventEdit,
                (SaveMode::Create, true) => AssignmentSource::ProxyReport,
                (SaveMode::Create, false) => AssignmentSource::StudentReport,
            };
            cx.services.assignments.record_assignment(
                cx.config.current_year,
                family_id,
                teacher_id,
                saved.event_id,
                source,
            )?;
        }

        cx.menu.announce(
            "event.saved",
            &[
                ("event_type", event_type.name.clone()),
                ("date", spoken_date(event_date)),
            ],
        )?;

        Ok(FlowSummary {
            flow: if is_proxy {
                Flow::ProxyReport
            } else {
                Flow::ReportEvent
            },
            entity: Some(saved.event_id),
            detail: format!("{mode:?} of {} on {event_date}", event_type.name),
        })
    }
}

/// Proxy entry for class representatives: report for herself, or pick a
/// classmate first and then run the ordinary report flow for her.
pub struct ProxyReportFlow;

impl<S: CelebrationStore, G: VoiceGateway> CallFlow<S, G> for ProxyReportFlow {
    fn flow(&self) -> Flow {
        Flow::ProxyReport
    }

    fn run(&self, cx: &mut FlowContext<'_, S, G>) -> CallResult<FlowSummary> {
        let class_id = match &cx.session.identity {
            Some(CallerIdentity::Representative { class_id, .. }) => *class_id,
            Some(CallerIdentity::Student(s)) => {
                return Err(IdentityError::NotRepresentative {
                    student_id: s.student_id,
                    year: cx.config.current_year,
                }
                .into());
            }
            None => {
                return Err(FlowError::IdentityRequired {
                    flow: "proxy".to_string(),
                }
                .into());
            }
        };

        let prompt = vec![PromptSegment::Text(
            cx.menu.catalog().render("proxy.choose", &[])?,
        )];
        let step = StepSpec::menu("proxy_choice", prompt, &[1, 2]);
        let choice = expect_key(cx.menu.ask(cx.session, &step)?, "proxy_choice")?;

        if choice == 2 {
            let prompt = vec![PromptSegment::Text(
                cx.menu.catalog().render("proxy.prompt_target_id", &[])?,
            )];
            let step = StepSpec::digits("target_national_id", prompt, NationalId::DIGITS)
                .with_echo(EchoStyle::Digits {
                    message_key: "identify.echo_id".to_string(),
                });
            let digits = expect_digits(cx.menu.ask(cx.session, &step)?, "target_national_id")?;
            let national_id =
                NationalId::parse(&digits).map_err(|_| InputError::OutOfGrammar {
                    step: "target_national_id".to_string(),
                })?;
            let target = cx.services.identity.resolve_classmate(class_id, &national_id)?;
            cx.menu
                .announce("proxy.target_confirm", &[("name", target.full_name())])?;
            tracing::debug!(target_id = %target.student_id, "proxy target resolved");
            cx.session.proxy_target = Some(target);
        }

        ReportEventFlow.run(cx)
    }
}
