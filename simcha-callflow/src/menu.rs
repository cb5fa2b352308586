//! Menu/prompt engine: renders a step, collects one input, validates it,
//! and manages the bounded-retry loop.

use crate::step::{EchoStyle, StepSpec};
use simcha_core::{Answer, CallResult, CallSession, InputError};
use simcha_gateway::{MessageCatalog, PromptSegment, VoiceGateway};

/// Drives individual collection steps against the voice gateway.
///
/// Validation failures are recovered locally up to `max_attempts`;
/// exhausting the budget is terminal and never falls back to a default.
/// Gateway failures (hangup, timeout) propagate immediately.
#[derive(Debug)]
pub struct MenuEngine<G> {
    gateway: G,
    catalog: MessageCatalog,
    max_attempts: u8,
}

impl<G: VoiceGateway> MenuEngine<G> {
    pub fn new(gateway: G, catalog: MessageCatalog, max_attempts: u8) -> Self {
        Self {
            gateway,
            catalog,
            max_attempts,
        }
    }

    pub fn catalog(&self) -> &MessageCatalog {
        &self.catalog
    }

    /// Hand the gateway back, consuming the engine. Used by tests and the
    /// simulator to inspect the transcript after a call.
    pub fn into_gateway(self) -> G {
        self.gateway
    }

    /// Collect one validated answer for `spec`.
    ///
    /// On success the value is echoed back per the step's echo style and
    /// recorded on the session before it is returned.
    pub fn ask(&mut self, session: &mut CallSession, spec: &StepSpec) -> CallResult<Answer> {
        let constraints = spec.constraints();
        loop {
            let raw = self
                .gateway
                .read(&spec.prompt, spec.grammar.mode(), &constraints)?;
            match spec.validate(&raw) {
                Ok(answer) => {
                    self.echo(spec, &answer)?;
                    session.record_answer(&spec.name, answer.clone());
                    return Ok(answer);
                }
                Err(invalid) => {
                    let attempts = session.register_attempt();
                    tracing::debug!(step = %spec.name, attempts, %invalid, "input rejected");
                    if attempts >= self.max_attempts {
                        return Err(InputError::MaxAttempts {
                            step: spec.name.clone(),
                            attempts,
                        }
                        .into());
                    }
                    self.announce("menu.invalid", &[])?;
                }
            }
        }
    }

    /// Render a catalog message and speak it, keeping the call alive.
    pub fn announce(&mut self, key: &str, args: &[(&str, String)]) -> CallResult<()> {
        let text = self.catalog.render(key, args)?;
        self.gateway.announce(&[PromptSegment::Text(text)])?;
        Ok(())
    }

    /// Render a catalog message, speak it, and end the call.
    /// Every terminal outcome leaves through here, so no call ends silently.
    pub fn announce_hangup(&mut self, key: &str, args: &[(&str, String)]) -> CallResult<()> {
        let text = self.catalog.render(key, args)?;
        self.gateway.announce_hangup(&[PromptSegment::Text(text)])?;
        Ok(())
    }

    fn echo(&mut self, spec: &StepSpec, answer: &Answer) -> CallResult<()> {
        match (&spec.echo, answer) {
            (EchoStyle::None, _) => Ok(()),
            (EchoStyle::Digits { message_key }, Answer::Digits(digits)) => {
                self.announce(message_key, &[("digits", digits.clone())])
            }
            (EchoStyle::Date { message_key }, Answer::Date(date)) => self.announce(
                message_key,
                &[("date", date.format("%d %B %Y").to_string())],
            ),
            (EchoStyle::Label { message_key, labels }, Answer::Key(key)) => {
                match labels.iter().find(|(k, _)| k == key) {
                    Some((_, label)) => self.announce(message_key, &[("name", label.clone())]),
                    // unlabeled keys (e.g. the "done" key) echo nothing
                    None => Ok(()),
                }
            }
            (EchoStyle::Rating { message_key }, Answer::Key(key)) => {
                self.announce(message_key, &[("rating", key.to_string())])
            }
            // echo style and parsed value disagree; skip rather than
            // speak something wrong
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepSpec;
    use simcha_core::CallError;
    use simcha_gateway::{PromptSegment, ScriptedGateway, ScriptedInput};

    fn engine(inputs: Vec<ScriptedInput>) -> MenuEngine<ScriptedGateway> {
        MenuEngine::new(ScriptedGateway::new(inputs), MessageCatalog::builtin(), 3)
    }

    fn menu_step() -> StepSpec {
        StepSpec::menu(
            "event_type",
            vec![PromptSegment::text("choose the celebration type")],
            &[1, 2, 3],
        )
    }

    #[test]
    fn test_ask_returns_valid_first_try() {
        let mut engine = engine(vec![ScriptedInput::digits("2")]);
        let mut session = CallSession::new("0501234567");

        let answer = engine.ask(&mut session, &menu_step()).unwrap();
        assert_eq!(answer, Answer::Key(2));
        assert_eq!(session.attempts, 0);
    }

    #[test]
    fn test_ask_retries_then_succeeds() {
        let mut engine = engine(vec![
            ScriptedInput::digits("9"),
            ScriptedInput::digits("2"),
        ]);
        let mut session = CallSession::new("0501234567");

        let answer = engine.ask(&mut session, &menu_step()).unwrap();
        assert_eq!(answer, Answer::Key(2));

        let gateway = engine.into_gateway();
        assert!(gateway.spoke("That entry was not recognized"));
    }

    #[test]
    fn test_third_rejection_is_terminal() {
        let mut engine = engine(vec![
            ScriptedInput::digits("9"),
            ScriptedInput::digits("8"),
            ScriptedInput::digits("7"),
        ]);
        let mut session = CallSession::new("0501234567");

        let err = engine.ask(&mut session, &menu_step()).unwrap_err();
        assert!(matches!(
            err,
            CallError::Input(InputError::MaxAttempts { attempts: 3, .. })
        ));
        assert!(session.answer("event_type").is_none());
    }

    #[test]
    fn test_hangup_propagates_immediately() {
        let mut engine = engine(vec![ScriptedInput::Hangup]);
        let mut session = CallSession::new("0501234567");

        let err = engine.ask(&mut session, &menu_step()).unwrap_err();
        assert!(err.is_hangup());
    }

    #[test]
    fn test_echo_speaks_chosen_label() {
        let step = menu_step().with_echo(EchoStyle::Label {
            message_key: "event.confirm_type".to_string(),
            labels: vec![(2, "Bat Mitzvah".to_string())],
        });
        let mut engine = engine(vec![ScriptedInput::digits("2")]);
        let mut session = CallSession::new("0501234567");

        engine.ask(&mut session, &step).unwrap();
        let gateway = engine.into_gateway();
        assert!(gateway.spoke("You chose Bat Mitzvah."));
    }
}
