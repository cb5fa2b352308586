//! Sub-flows composed by the orchestrator.
//!
//! Each menu option maps to one flow behind a common trait: drive the
//! flow's ordered steps to completion, or fail terminally. Flows are
//! independent of one another, so adding a flow never touches the rest.

mod fulfillment;
mod lottery;
mod report;
mod tracks;

pub use fulfillment::FulfillmentFlow;
pub use lottery::LotteryFlow;
pub use report::{ProxyReportFlow, ReportEventFlow};
pub use tracks::TrackSelectionFlow;

use crate::menu::MenuEngine;
use chrono::NaiveDate;
use simcha_core::{CallConfig, CallResult, CallSession, EntityId, Flow};
use simcha_gateway::{MessageCatalog, PromptSegment, VoiceGateway};
use simcha_services::CallServices;
use simcha_storage::CelebrationStore;

/// Everything one flow invocation may touch: the session it mutates, the
/// menu engine it collects through, and the read/persist services.
pub struct FlowContext<'a, S, G> {
    pub session: &'a mut CallSession,
    pub menu: &'a mut MenuEngine<G>,
    pub services: &'a CallServices<S>,
    pub store: &'a S,
    pub config: &'a CallConfig,
    /// Injected rather than read from the clock, so flows are replayable.
    pub today: NaiveDate,
}

/// What a completed flow reports back for logging and confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSummary {
    pub flow: Flow,
    /// Primary entity the flow persisted, when it persisted one.
    pub entity: Option<EntityId>,
    pub detail: String,
}

/// One sub-flow: drive to completion, or fail terminally.
pub trait CallFlow<S: CelebrationStore, G: VoiceGateway> {
    fn flow(&self) -> Flow;

    /// Run the flow's ordered steps. The flow announces its own
    /// confirmation; any error that escapes is terminal for the call.
    fn run(&self, cx: &mut FlowContext<'_, S, G>) -> CallResult<FlowSummary>;
}

/// Render a header line plus one option line per (key, label) pair.
/// `placeholder` names the option message's data placeholder.
pub(crate) fn menu_prompt(
    catalog: &MessageCatalog,
    header_key: &str,
    option_key: &str,
    placeholder: &'static str,
    options: &[(u8, String)],
) -> CallResult<Vec<PromptSegment>> {
    let mut segments = vec![PromptSegment::Text(catalog.render(header_key, &[])?)];
    for (key, label) in options {
        segments.push(PromptSegment::Text(catalog.render(
            option_key,
            &[(placeholder, label.clone()), ("key", key.to_string())],
        )?));
    }
    Ok(segments)
}

/// Spoken form of an event date, shared by prompts and confirmations.
pub(crate) fn spoken_date(date: NaiveDate) -> String {
    date.format("%d %B %Y").to_string()
}

// The step kind guarantees the answer variant; a mismatch can only mean a
// mis-declared step, which surfaces as a grammar failure, never a panic.

pub(crate) fn expect_key(answer: simcha_core::Answer, step: &str) -> CallResult<u8> {
    answer.as_key().ok_or_else(|| {
        simcha_core::InputError::OutOfGrammar {
            step: step.to_string(),
        }
        .into()
    })
}

pub(crate) fn expect_date(answer: simcha_core::Answer, step: &str) -> CallResult<NaiveDate> {
    answer.as_date().ok_or_else(|| {
        simcha_core::InputError::OutOfGrammar {
            step: step.to_string(),
        }
        .into()
    })
}

pub(crate) fn expect_digits(answer: simcha_core::Answer, step: &str) -> CallResult<String> {
    answer
        .as_digits()
        .map(str::to_string)
        .ok_or_else(|| {
            simcha_core::InputError::OutOfGrammar {
                step: step.to_string(),
            }
            .into()
        })
}
