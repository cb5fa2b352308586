//! Lottery draw enrollment for a prior celebration.

use super::{expect_key, menu_prompt, spoken_date, CallFlow, FlowContext, FlowSummary};
use crate::step::{EchoStyle, StepSpec};
use simcha_core::{
    CallResult, EntityKind, Event, Flow, FlowError, InputError, LotteryEntry, EntryKind,
};
use simcha_gateway::VoiceGateway;
use simcha_storage::CelebrationStore;

/// Most prior events offered in one selection menu (keys 1 through 9).
const MAX_EVENT_CHOICES: usize = 9;

/// Lets a caller with at least one prior event enroll it into a draw track.
pub struct LotteryFlow;

impl<S: CelebrationStore, G: VoiceGateway> CallFlow<S, G> for LotteryFlow {
    fn flow(&self) -> Flow {
        Flow::Lottery
    }

    fn run(&self, cx: &mut FlowContext<'_, S, G>) -> CallResult<FlowSummary> {
        let subject = cx
            .session
            .subject()
            .cloned()
            .ok_or_else(|| FlowError::IdentityRequired {
                flow: "lottery".to_string(),
            })?;

        let events = cx.store.events_by_student(subject.student_id)?;
        if events.is_empty() {
            return Err(FlowError::NoEligibleEvent {
                flow: "lottery".to_string(),
            }
            .into());
        }
        let event = choose_event(cx, &events, "lottery.prompt_event", "lottery.option_event")?;

        let tracks = cx.store.lottery_tracks_all()?;
        if tracks.is_empty() {
            return Err(FlowError::EmptyCatalog {
                kind: EntityKind::LotteryTrack,
            }
            .into());
        }
        let track_options: Vec<(u8, String)> = tracks
            .iter()
            .map(|t| (t.menu_key, t.name.clone()))
            .collect();
        let track_keys: Vec<u8> = track_options.iter().map(|(k, _)| *k).collect();
        let prompt = menu_prompt(
            cx.menu.catalog(),
            "lottery.prompt_track",
            "lottery.option_track",
            "name",
            &track_options,
        )?;
        let step = StepSpec::menu("lottery_track", prompt, &track_keys).with_echo(
            EchoStyle::Label {
                message_key: "lottery.confirm_track".to_string(),
                labels: track_options,
            },
        );
        let track_key = expect_key(cx.menu.ask(cx.session, &step)?, "lottery_track")?;
        let track = tracks
            .iter()
            .find(|t| t.menu_key == track_key)
            .cloned()
            .ok_or_else(|| InputError::OutOfGrammar {
                step: "lottery_track".to_string(),
            })?;

        let entry = LotteryEntry::new(subject.student_id, track.track_id, EntryKind::Draw)
            .with_event(event.event_id);
        cx.store.lottery_entry_insert(&entry)?;

        cx.menu
            .announce("lottery.saved", &[("name", track.name.clone())])?;

        Ok(FlowSummary {
            flow: Flow::Lottery,
            entity: Some(entry.entry_id),
            detail: format!("draw enrollment in {}", track.name),
        })
    }
}

/// Offer the caller's prior events and return the chosen one.
/// A single event is taken without asking.
pub(crate) fn choose_event<S: CelebrationStore, G: VoiceGateway>(
    cx: &mut FlowContext<'_, S, G>,
    events: &[Event],
    header_key: &str,
    option_key: &str,
) -> CallResult<Event> {
    if events.len() == 1 {
        return Ok(events[0].clone());
    }
    let shown = &events[..events.len().min(MAX_EVENT_CHOICES)];
    let options: Vec<(u8, String)> = shown
        .iter()
        .enumerate()
        .map(|(i, e)| (i as u8 + 1, spoken_date(e.event_date)))
        .collect();
    let keys: Vec<u8> = options.iter().map(|(k, _)| *k).collect();
    let prompt = menu_prompt(cx.menu.catalog(), header_key, option_key, "date", &options)?;
    let step = StepSpec::menu("event_choice", prompt, &keys);
    let key = expect_key(cx.menu.ask(cx.session, &step)?, "event_choice")?;
    shown
        .get(key as usize - 1)
        .cloned()
        .ok_or_else(|| {
            InputError::OutOfGrammar {
                step: "event_choice".to_string(),
            }
            .into()
        })
}
