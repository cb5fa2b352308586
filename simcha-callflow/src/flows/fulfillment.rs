//! Post-event fulfillment survey.

use super::{expect_key, lottery::choose_event, CallFlow, FlowContext, FlowSummary};
use crate::step::{EchoStyle, StepSpec};
use simcha_core::{
    CallResult, Event, Flow, FlowError, FulfillmentResponse, SurveyAnswer,
};
use simcha_gateway::{PromptSegment, VoiceGateway};
use simcha_storage::CelebrationStore;

/// Fixed question sequence: (stored question key, catalog message key).
const QUESTIONS: [(&str, &str); 3] = [
    ("gift", "fulfillment.question_gift"),
    ("delivery", "fulfillment.question_delivery"),
    ("overall", "fulfillment.question_overall"),
];

/// Asks the fixed rating questions about a past celebration.
pub struct FulfillmentFlow;

impl<S: CelebrationStore, G: VoiceGateway> CallFlow<S, G> for FulfillmentFlow {
    fn flow(&self) -> Flow {
        Flow::Fulfillment
    }

    fn run(&self, cx: &mut FlowContext<'_, S, G>) -> CallResult<FlowSummary> {
        let subject = cx
            .session
            .subject()
            .cloned()
            .ok_or_else(|| FlowError::IdentityRequired {
                flow: "fulfillment".to_string(),
            })?;

        let past: Vec<Event> = cx
            .store
            .events_by_student(subject.student_id)?
            .into_iter()
            .filter(|e| e.is_past(cx.today))
            .collect();
        if past.is_empty() {
            return Err(FlowError::NoEligibleEvent {
                flow: "fulfillment".to_string(),
            }
            .into());
        }
        let event = choose_event(
            cx,
            &past,
            "fulfillment.prompt_event",
            "fulfillment.option_event",
        )?;

        let mut answers = Vec::with_capacity(QUESTIONS.len());
        for (question_key, message_key) in QUESTIONS {
            let prompt = vec![PromptSegment::Text(
                cx.menu.catalog().render(message_key, &[])?,
            )];
            let step = StepSpec::menu(format!("rating_{question_key}"), prompt, &[1, 2, 3, 4, 5])
                .with_echo(EchoStyle::Rating {
                    message_key: "fulfillment.confirm_rating".to_string(),
                });
            let rating = expect_key(
                cx.menu.ask(cx.session, &step)?,
                &format!("rating_{question_key}"),
            )?;
            answers.push(SurveyAnswer {
                question_key: question_key.to_string(),
                rating,
            });
        }

        let mut response = FulfillmentResponse::new(event.event_id, subject.student_id, answers);

        // optional free-form comment clip
        let prompt = vec![PromptSegment::Text(
            cx.menu.catalog().render("fulfillment.prompt_comment", &[])?,
        )];
        let step = StepSpec::menu("comment_choice", prompt, &[0, 1]);
        if expect_key(cx.menu.ask(cx.session, &step)?, "comment_choice")? == 1 {
            let prompt = vec![PromptSegment::Text(
                cx.menu.catalog().render("fulfillment.prompt_record", &[])?,
            )];
            let step = StepSpec::recording("comment", prompt);
            if let simcha_core::Answer::Recording(clip) = cx.menu.ask(cx.session, &step)? {
                response = response.with_comment(clip);
                cx.menu.announce("fulfillment.comment_saved", &[])?;
            }
        }

        cx.store.fulfillment_insert(&response)?;

        cx.menu.announce("fulfillment.saved", &[])?;

        Ok(FlowSummary {
            flow: Flow::Fulfillment,
            entity: Some(response.response_id),
            detail: format!("survey for event {}", event.event_id),
        })
    }
}
