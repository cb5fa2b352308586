//! Call flow orchestrator.
//!
//! Sequences one call through its states and composes the sub-flows.
//!
//! # State Transition Diagram
//!
//! ```text
//! Identifying ──→ MainMenu ──→ SubFlow(..) ──→ Confirming ──→ Done
//!      │             │              │              │
//!      └──────── any terminal failure or hangup ───┴─────────→ Done
//! ```
//!
//! `Identifying` is the only entry point and `Done` the sole terminal
//! state. A hangup or timeout at any suspension point aborts the call
//! without persisting partial state; a re-call starts over from
//! `Identifying`.

use crate::flows::{
    expect_digits, expect_key, CallFlow, FlowContext, FlowSummary, FulfillmentFlow, LotteryFlow,
    ProxyReportFlow, ReportEventFlow, TrackSelectionFlow,
};
use crate::menu::MenuEngine;
use crate::step::{EchoStyle, StepSpec};
use chrono::{NaiveDate, Utc};
use simcha_core::{
    CallConfig, CallError, CallResult, CallSession, EntityKind, Event, Flow, FlowError,
    GatewayError, IdentityError, InputError, NationalId,
};
use simcha_gateway::{MessageCatalog, PromptSegment, VoiceGateway};
use simcha_services::CallServices;
use simcha_storage::CelebrationStore;
use std::sync::Arc;

/// Orchestrator state for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Identifying,
    MainMenu,
    SubFlow(Flow),
    Confirming,
    Done,
}

impl CallState {
    /// Check if this is the terminal state (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Done)
    }
}

/// One offered main-menu option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MenuOption {
    pub key: u8,
    pub flow: Flow,
    pub message_key: &'static str,
}

const MAIN_MENU: [(u8, Flow, &str); 4] = [
    (1, Flow::ReportEvent, "menu.option_report"),
    (2, Flow::Lottery, "menu.option_lottery"),
    (3, Flow::TrackSelection, "menu.option_tracks"),
    (4, Flow::Fulfillment, "menu.option_fulfillment"),
];

/// Compute the options this caller is offered, from her event history.
/// Reporting is always offered; draw and voucher tracks need a prior
/// event; the follow-up survey needs an event whose date has passed.
/// Representatives get the proxy report entry in place of the direct one.
pub fn main_menu_options(
    events: &[Event],
    today: NaiveDate,
    representative: bool,
) -> Vec<MenuOption> {
    let has_prior = !events.is_empty();
    let has_past = events.iter().any(|e| e.is_past(today));
    MAIN_MENU
        .iter()
        .filter(|(_, flow, _)| {
            (!flow.requires_prior_event() || has_prior)
                && (!flow.requires_past_event() || has_past)
        })
        .map(|&(key, flow, message_key)| MenuOption {
            key,
            flow: match flow {
                Flow::ReportEvent if representative => Flow::ProxyReport,
                other => other,
            },
            message_key,
        })
        .collect()
}

/// Catalog key announced for a terminal failure, chosen per the error
/// taxonomy and the flow the call was in.
pub fn terminal_message_key(err: &CallError, flow: Option<Flow>) -> &'static str {
    match err {
        CallError::Identity(IdentityError::CallerNotFound { .. }) => {
            if matches!(flow, Some(Flow::ProxyReport)) {
                "proxy.target_not_found"
            } else {
                "identify.not_found"
            }
        }
        CallError::Identity(IdentityError::NoActiveClass { .. })
        | CallError::Identity(IdentityError::NotRepresentative { .. }) => {
            "identify.no_active_class"
        }
        CallError::Identity(IdentityError::NotInClass { .. }) => "proxy.target_not_in_class",
        // no response exhausts the attempt budget just like bad input
        CallError::Input(_) | CallError::Gateway(GatewayError::Timeout) => "menu.max_attempts",
        CallError::Flow(FlowError::EmptyCatalog { kind }) => match kind {
            EntityKind::EventType => "event.no_types",
            EntityKind::LotteryTrack => {
                if matches!(flow, Some(Flow::TrackSelection)) {
                    "tracks.no_tracks"
                } else {
                    "lottery.no_tracks"
                }
            }
            _ => "call.failure",
        },
        CallError::Flow(FlowError::NoEligibleEvent { .. }) => {
            if matches!(flow, Some(Flow::Fulfillment)) {
                "fulfillment.no_past_event"
            } else {
                "call.failure"
            }
        }
        CallError::Flow(FlowError::IdentityRequired { .. }) => "call.failure",
        CallError::Storage(_) => "call.storage_failure",
        CallError::Catalog(_) | CallError::Gateway(_) => "call.failure",
    }
}

/// Drives one call from connect to hangup.
///
/// Owns the call's gateway handle and all per-call services; concurrent
/// calls each hold their own orchestrator, sharing only the store.
pub struct Orchestrator<S, G> {
    store: Arc<S>,
    services: CallServices<S>,
    menu: MenuEngine<G>,
    config: CallConfig,
    today: NaiveDate,
}

impl<S: CelebrationStore, G: VoiceGateway> Orchestrator<S, G> {
    pub fn new(store: Arc<S>, gateway: G, catalog: MessageCatalog, config: CallConfig) -> Self {
        let services = CallServices::new(Arc::clone(&store), &config);
        let menu = MenuEngine::new(gateway, catalog, config.max_attempts);
        Self {
            store,
            services,
            menu,
            config,
            today: Utc::now().date_naive(),
        }
    }

    /// Pin "today" instead of reading the clock, so calls are replayable.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Hand the gateway back, consuming the orchestrator.
    pub fn into_gateway(self) -> G {
        self.menu.into_gateway()
    }

    /// Drive one call start to finish. The returned session is terminal;
    /// a summary is present when a sub-flow ran to completion.
    pub fn run_call(&mut self, caller_phone: &str) -> (CallSession, Option<FlowSummary>) {
        let mut session = CallSession::new(caller_phone);
        tracing::info!(call_id = %session.call_id, caller = caller_phone, "call connected");
        let summary = match self.drive(&mut session) {
            Ok(summary) => {
                tracing::info!(
                    call_id = %session.call_id,
                    flow = ?summary.flow,
                    detail = %summary.detail,
                    "call completed"
                );
                Some(summary)
            }
            Err(err) => {
                self.terminate(&session, &err);
                None
            }
        };
        session.finish();
        (session, summary)
    }

    fn drive(&mut self, session: &mut CallSession) -> CallResult<FlowSummary> {
        // --- Identifying ---
        self.transition(session, CallState::Identifying);
        self.menu.announce("identify.welcome", &[])?;
        let prompt = vec![PromptSegment::Text(
            self.menu.catalog().render("identify.prompt_id", &[])?,
        )];
        let step = StepSpec::digits("national_id", prompt, self.config.national_id_digits)
            .with_echo(EchoStyle::Digits {
                message_key: "identify.echo_id".to_string(),
            });
        let digits = expect_digits(self.menu.ask(session, &step)?, "national_id")?;
        let national_id = NationalId::parse(&digits).map_err(|_| InputError::OutOfGrammar {
            step: "national_id".to_string(),
        })?;
        let identity = self.services.identity.resolve_caller(&national_id)?;
        let caller_id = identity.student().student_id;
        let representative = identity.is_representative();
        session.identity = Some(identity);

        // --- MainMenu ---
        self.transition(session, CallState::MainMenu);
        let events = self.store.events_by_student(caller_id)?;
        let options = main_menu_options(&events, self.today, representative);
        let mut prompt = vec![PromptSegment::Text(
            self.menu.catalog().render("menu.choose", &[])?,
        )];
        for option in &options {
            prompt.push(PromptSegment::Text(self.menu.catalog().render(
                option.message_key,
                &[("key", option.key.to_string())],
            )?));
        }
        let keys: Vec<u8> = options.iter().map(|o| o.key).collect();
        let step = StepSpec::menu("main_menu", prompt, &keys);
        let choice = expect_key(self.menu.ask(session, &step)?, "main_menu")?;
        let flow = options
            .iter()
            .find(|o| o.key == choice)
            .map(|o| o.flow)
            .ok_or_else(|| InputError::OutOfGrammar {
                step: "main_menu".to_string(),
            })?;
        session.flow = Some(flow);

        // --- SubFlow ---
        self.transition(session, CallState::SubFlow(flow));
        let chosen: Box<dyn CallFlow<S, G>> = match flow {
            Flow::ReportEvent => Box::new(ReportEventFlow),
            Flow::ProxyReport => Box::new(ProxyReportFlow),
            Flow::Lottery => Box::new(LotteryFlow),
            Flow::TrackSelection => Box::new(TrackSelectionFlow),
            Flow::Fulfillment => Box::new(FulfillmentFlow),
        };
        let mut cx = FlowContext {
            session: &mut *session,
            menu: &mut self.menu,
            services: &self.services,
            store: self.store.as_ref(),
            config: &self.config,
            today: self.today,
        };
        let summary = chosen.run(&mut cx)?;

        // --- Confirming -> Done ---
        self.transition(session, CallState::Confirming);
        self.menu.announce_hangup("call.goodbye", &[])?;
        self.transition(session, CallState::Done);
        Ok(summary)
    }

    /// Single terminal exit: announce the mapped message and hang up.
    /// A caller who already hung up gets nothing, everyone else a farewell.
    fn terminate(&mut self, session: &CallSession, err: &CallError) {
        if err.is_hangup() {
            tracing::info!(call_id = %session.call_id, "caller hung up");
            return;
        }
        tracing::warn!(call_id = %session.call_id, error = %err, "call failed");
        let key = terminal_message_key(err, session.flow);
        if let Err(announce_err) = self.menu.announce_hangup(key, &[]) {
            tracing::warn!(
                call_id = %session.call_id,
                error = %announce_err,
                "terminal announcement failed"
            );
        }
    }

    fn transition(&self, session: &CallSession, state: CallState) {
        tracing::debug!(call_id = %session.call_id, state = ?state, "state transition");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simcha_core::{new_entity_id, StorageError};

    fn make_event(date: NaiveDate) -> Event {
        Event::new(new_entity_id(), new_entity_id(), date)
    }

    #[test]
    fn test_new_caller_is_only_offered_reporting() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let options = main_menu_options(&[], today, false);
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].flow, Flow::ReportEvent);
    }

    #[test]
    fn test_prior_event_unlocks_draw_and_tracks() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let future = make_event(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        let options = main_menu_options(&[future], today, false);
        let flows: Vec<Flow> = options.iter().map(|o| o.flow).collect();
        assert_eq!(
            flows,
            vec![Flow::ReportEvent, Flow::Lottery, Flow::TrackSelection]
        );
    }

    #[test]
    fn test_past_event_unlocks_fulfillment() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let past = make_event(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        let options = main_menu_options(&[past], today, false);
        assert!(options.iter().any(|o| o.flow == Flow::Fulfillment));
    }

    #[test]
    fn test_representative_gets_proxy_entry() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let options = main_menu_options(&[], today, true);
        assert_eq!(options[0].flow, Flow::ProxyReport);
        assert_eq!(options[0].key, 1);
    }

    #[test]
    fn test_terminal_message_mapping() {
        let not_found = CallError::from(IdentityError::CallerNotFound {
            national_id: NationalId::parse("123456789").unwrap(),
        });
        assert_eq!(terminal_message_key(&not_found, None), "identify.not_found");
        assert_eq!(
            terminal_message_key(&not_found, Some(Flow::ProxyReport)),
            "proxy.target_not_found"
        );

        let exhausted = CallError::from(InputError::MaxAttempts {
            step: "event_type".to_string(),
            attempts: 3,
        });
        assert_eq!(terminal_message_key(&exhausted, None), "menu.max_attempts");

        let timeout = CallError::from(GatewayError::Timeout);
        assert_eq!(terminal_message_key(&timeout, None), "menu.max_attempts");

        let storage = CallError::from(StorageError::TransactionFailed {
            reason: "disk".to_string(),
        });
        assert_eq!(terminal_message_key(&storage, None), "call.storage_failure");

        let no_tracks = CallError::from(FlowError::EmptyCatalog {
            kind: EntityKind::LotteryTrack,
        });
        assert_eq!(
            terminal_message_key(&no_tracks, Some(Flow::TrackSelection)),
            "tracks.no_tracks"
        );
        assert_eq!(
            terminal_message_key(&no_tracks, Some(Flow::Lottery)),
            "lottery.no_tracks"
        );
    }

    #[test]
    fn test_done_is_the_only_terminal_state() {
        assert!(CallState::Done.is_terminal());
        assert!(!CallState::Identifying.is_terminal());
        assert!(!CallState::MainMenu.is_terminal());
        assert!(!CallState::SubFlow(Flow::ReportEvent).is_terminal());
        assert!(!CallState::Confirming.is_terminal());
    }
}
