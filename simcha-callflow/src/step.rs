//! Step specifications and input validation.
//!
//! A `StepSpec` declares everything the menu engine needs to collect one
//! value: the prompt, the input grammar, an optional allow-list, what the
//! raw digits parse into, and how the collected value is echoed back.

use chrono::NaiveDate;
use simcha_core::{Answer, InputError};
use simcha_gateway::{InputMode, PromptSegment, RawInput, ReadConstraints};

/// Shape of the raw input the gateway collects for a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputGrammar {
    /// Exactly `n` digits.
    FixedDigits(usize),
    /// Between `min` and `max` digits.
    BoundedDigits { min: usize, max: usize },
    /// A free recorded clip.
    Record,
}

impl InputGrammar {
    pub fn mode(&self) -> InputMode {
        match self {
            InputGrammar::Record => InputMode::Record,
            _ => InputMode::Tap,
        }
    }
}

/// What a validated input parses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Keep the digits as entered.
    Digits,
    /// A single menu choice.
    MenuKey,
    /// A calendar date keyed in as DDMMYYYY.
    Date,
    /// A recorded clip.
    Recording,
}

/// How a successful collection is echoed back to the caller before the
/// flow advances. Echoing lets the caller detect misrecognition before
/// anything is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EchoStyle {
    /// No echo for this step.
    None,
    /// Speak the digits back, message takes `{digits}`.
    Digits { message_key: String },
    /// Speak the parsed date back, message takes `{date}`.
    Date { message_key: String },
    /// Speak the chosen option's label, message takes `{name}`.
    /// Keys absent from the label list (e.g. a "done" key) echo nothing.
    Label {
        message_key: String,
        labels: Vec<(u8, String)>,
    },
    /// Speak the rating back, message takes `{rating}`.
    Rating { message_key: String },
}

/// Declarative description of one collection step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    /// Step name, used as the answer key and in input errors.
    pub name: String,
    pub prompt: Vec<PromptSegment>,
    pub grammar: InputGrammar,
    pub kind: ValueKind,
    /// Allow-list of acceptable raw digit strings, when restricted.
    pub allowed: Option<Vec<String>>,
    pub echo: EchoStyle,
}

impl StepSpec {
    /// A single-keypress menu restricted to the given keys.
    pub fn menu(name: impl Into<String>, prompt: Vec<PromptSegment>, keys: &[u8]) -> Self {
        Self {
            name: name.into(),
            prompt,
            grammar: InputGrammar::FixedDigits(1),
            kind: ValueKind::MenuKey,
            allowed: Some(keys.iter().map(u8::to_string).collect()),
            echo: EchoStyle::None,
        }
    }

    /// A fixed-length digit entry.
    pub fn digits(name: impl Into<String>, prompt: Vec<PromptSegment>, len: usize) -> Self {
        Self {
            name: name.into(),
            prompt,
            grammar: InputGrammar::FixedDigits(len),
            kind: ValueKind::Digits,
            allowed: None,
            echo: EchoStyle::None,
        }
    }

    /// An eight-digit DDMMYYYY date entry.
    pub fn date(name: impl Into<String>, prompt: Vec<PromptSegment>) -> Self {
        Self {
            name: name.into(),
            prompt,
            grammar: InputGrammar::FixedDigits(8),
            kind: ValueKind::Date,
            allowed: None,
            echo: EchoStyle::None,
        }
    }

    /// A free recorded clip.
    pub fn recording(name: impl Into<String>, prompt: Vec<PromptSegment>) -> Self {
        Self {
            name: name.into(),
            prompt,
            grammar: InputGrammar::Record,
            kind: ValueKind::Recording,
            allowed: None,
            echo: EchoStyle::None,
        }
    }

    pub fn with_echo(mut self, echo: EchoStyle) -> Self {
        self.echo = echo;
        self
    }

    /// Gateway constraints implied by the grammar and allow-list.
    pub fn constraints(&self) -> ReadConstraints {
        match (&self.grammar, &self.allowed) {
            (InputGrammar::FixedDigits(1), Some(allowed)) => {
                let keys: Vec<u8> = allowed
                    .iter()
                    .filter_map(|s| s.parse::<u8>().ok())
                    .collect();
                ReadConstraints::menu_keys(&keys)
            }
            (InputGrammar::FixedDigits(n), _) => ReadConstraints::fixed(*n),
            (InputGrammar::BoundedDigits { min, max }, _) => ReadConstraints::bounded(*min, *max),
            // recording length is the gateway's concern
            (InputGrammar::Record, _) => ReadConstraints::bounded(0, 0),
        }
    }

    /// Validate raw gateway input against this step and parse it.
    pub fn validate(&self, raw: &RawInput) -> Result<Answer, InputError> {
        let digits = match (&self.grammar, raw) {
            (InputGrammar::Record, RawInput::Recording(clip)) => {
                return Ok(Answer::Recording(clip.clone()));
            }
            (InputGrammar::Record, RawInput::Digits(_)) => {
                return Err(self.out_of_grammar());
            }
            (_, RawInput::Recording(_)) => return Err(self.out_of_grammar()),
            (_, RawInput::Digits(digits)) => digits,
        };

        if !self.constraints().accepts(digits) {
            return Err(self.out_of_grammar());
        }
        if let Some(allowed) = &self.allowed {
            if !allowed.iter().any(|a| a == digits) {
                return Err(InputError::NotAllowed {
                    step: self.name.clone(),
                    entered: digits.clone(),
                });
            }
        }

        match self.kind {
            ValueKind::Digits => Ok(Answer::Digits(digits.clone())),
            ValueKind::MenuKey => digits
                .parse::<u8>()
                .map(Answer::Key)
                .map_err(|_| self.out_of_grammar()),
            ValueKind::Date => parse_ddmmyyyy(digits)
                .map(Answer::Date)
                .ok_or_else(|| self.out_of_grammar()),
            // a recording step never yields digits
            ValueKind::Recording => Err(self.out_of_grammar()),
        }
    }

    fn out_of_grammar(&self) -> InputError {
        InputError::OutOfGrammar {
            step: self.name.clone(),
        }
    }
}

/// Parse eight digits as a DDMMYYYY calendar date.
/// Calendar-invalid entries (e.g. 31022024) fail like any other bad input.
fn parse_ddmmyyyy(digits: &str) -> Option<NaiveDate> {
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day: u32 = digits[0..2].parse().ok()?;
    let month: u32 = digits[2..4].parse().ok()?;
    let year: i32 = digits[4..8].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use simcha_gateway::PromptSegment;

    fn prompt() -> Vec<PromptSegment> {
        vec![PromptSegment::text("enter something")]
    }

    #[test]
    fn test_menu_step_accepts_allowed_key() {
        let step = StepSpec::menu("event_type", prompt(), &[1, 2, 3]);
        let answer = step
            .validate(&RawInput::Digits("2".to_string()))
            .unwrap();
        assert_eq!(answer, Answer::Key(2));
    }

    #[test]
    fn test_menu_step_rejects_key_outside_allow_list() {
        let step = StepSpec::menu("event_type", prompt(), &[1, 2, 3]);
        let err = step.validate(&RawInput::Digits("7".to_string())).unwrap_err();
        // gateway constraints already exclude it, so this is out-of-grammar
        assert!(matches!(err, InputError::OutOfGrammar { .. }));
    }

    #[test]
    fn test_digits_step_enforces_length() {
        let step = StepSpec::digits("national_id", prompt(), 9);
        assert!(step.validate(&RawInput::Digits("123456789".to_string())).is_ok());
        assert!(step.validate(&RawInput::Digits("12345".to_string())).is_err());
    }

    #[test]
    fn test_date_step_parses_ddmmyyyy() {
        let step = StepSpec::date("event_date", prompt());
        let answer = step
            .validate(&RawInput::Digits("15062024".to_string()))
            .unwrap();
        assert_eq!(
            answer,
            Answer::Date(NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
        );
    }

    #[test]
    fn test_date_step_rejects_calendar_invalid_entry() {
        let step = StepSpec::date("event_date", prompt());
        let err = step
            .validate(&RawInput::Digits("31022024".to_string()))
            .unwrap_err();
        assert!(matches!(err, InputError::OutOfGrammar { .. }));
    }

    #[test]
    fn test_bounded_digits_accept_any_length_in_range() {
        let step = StepSpec {
            name: "free_entry".to_string(),
            prompt: prompt(),
            grammar: InputGrammar::BoundedDigits { min: 2, max: 4 },
            kind: ValueKind::Digits,
            allowed: None,
            echo: EchoStyle::None,
        };
        assert!(step.validate(&RawInput::Digits("12".to_string())).is_ok());
        assert!(step.validate(&RawInput::Digits("1234".to_string())).is_ok());
        assert!(step.validate(&RawInput::Digits("1".to_string())).is_err());
        assert!(step.validate(&RawInput::Digits("12345".to_string())).is_err());
    }

    #[test]
    fn test_recording_where_digits_expected_is_rejected() {
        let step = StepSpec::digits("national_id", prompt(), 9);
        let err = step
            .validate(&RawInput::Recording(vec![1, 2, 3]))
            .unwrap_err();
        assert!(matches!(err, InputError::OutOfGrammar { .. }));
    }
}
