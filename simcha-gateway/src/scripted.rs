//! Scripted gateway for tests and call replay.
//!
//! Plays the role of the telephony transport with a fixed queue of caller
//! inputs, and keeps a transcript of everything "spoken" so a conversation
//! can be asserted on without live telephony.

use crate::{InputMode, PromptSegment, RawInput, ReadConstraints, VoiceGateway};
use simcha_core::{GatewayError, RawContent};
use std::collections::VecDeque;

/// One scripted caller action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedInput {
    /// Caller keys in a digit string.
    Digits(String),
    /// Caller records a clip.
    Recording(RawContent),
    /// Caller hangs up at this suspension point.
    Hangup,
    /// Gateway times out waiting at this suspension point.
    Timeout,
}

impl ScriptedInput {
    pub fn digits(d: impl Into<String>) -> Self {
        ScriptedInput::Digits(d.into())
    }
}

/// Replay gateway driven by a pre-arranged input script.
///
/// Inputs are handed back verbatim, without pre-filtering on
/// `digits_allowed`, so the menu engine's own validation is exercised.
/// An exhausted script behaves like a hangup.
#[derive(Debug, Default)]
pub struct ScriptedGateway {
    inputs: VecDeque<ScriptedInput>,
    transcript: Vec<String>,
    ended: bool,
}

impl ScriptedGateway {
    pub fn new(inputs: Vec<ScriptedInput>) -> Self {
        Self {
            inputs: inputs.into(),
            transcript: Vec::new(),
            ended: false,
        }
    }

    /// Everything spoken to the caller so far, one line per prompt batch.
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Whether the transcript contains `needle` anywhere.
    pub fn spoke(&self, needle: &str) -> bool {
        self.transcript.iter().any(|line| line.contains(needle))
    }

    /// Whether the call was terminated through `announce_hangup`.
    pub fn ended(&self) -> bool {
        self.ended
    }

    fn speak(&mut self, prompts: &[PromptSegment]) {
        let line = prompts
            .iter()
            .map(render_segment)
            .collect::<Vec<_>>()
            .join(" ");
        self.transcript.push(line);
    }
}

fn render_segment(segment: &PromptSegment) -> String {
    match segment {
        PromptSegment::Text(text) => text.clone(),
        PromptSegment::Digits(digits) => digits
            .chars()
            .map(String::from)
            .collect::<Vec<_>>()
            .join(" "),
        PromptSegment::Date(date) => date.format("%d %B %Y").to_string(),
    }
}

impl VoiceGateway for ScriptedGateway {
    fn read(
        &mut self,
        prompts: &[PromptSegment],
        mode: InputMode,
        _constraints: &ReadConstraints,
    ) -> Result<RawInput, GatewayError> {
        self.speak(prompts);
        match self.inputs.pop_front() {
            Some(ScriptedInput::Digits(d)) => Ok(RawInput::Digits(d)),
            Some(ScriptedInput::Recording(clip)) => match mode {
                InputMode::Record => Ok(RawInput::Recording(clip)),
                // a clip where digits were expected is a transport glitch
                InputMode::Tap => Err(GatewayError::Transport {
                    reason: "recording delivered in tap mode".to_string(),
                }),
            },
            Some(ScriptedInput::Hangup) | None => Err(GatewayError::Hangup),
            Some(ScriptedInput::Timeout) => Err(GatewayError::Timeout),
        }
    }

    fn announce(&mut self, prompts: &[PromptSegment]) -> Result<(), GatewayError> {
        self.speak(prompts);
        Ok(())
    }

    fn announce_hangup(&mut self, prompts: &[PromptSegment]) -> Result<(), GatewayError> {
        self.speak(prompts);
        self.ended = true;
        Ok(())
    }
}
