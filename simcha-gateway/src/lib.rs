//! SIMCHA Gateway - Voice Gateway Abstraction
//!
//! Transport-agnostic contract for the telephony layer. The core only ever
//! prompts, collects one input, or announces; DTMF detection, audio playback
//! and call signaling live behind this trait. Actual transport
//! implementations are operator-supplied; a scripted replay implementation
//! ships here for tests and call replay.

pub mod catalog;
pub mod scripted;

pub use catalog::MessageCatalog;
pub use scripted::{ScriptedGateway, ScriptedInput};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use simcha_core::{GatewayError, RawContent};

// ============================================================================
// PROMPT AND INPUT TYPES
// ============================================================================

/// One spoken segment of a prompt.
///
/// Prompts are composed of static catalog text and data-driven segments; the
/// gateway decides how each is voiced (text-to-speech, digit-by-digit, etc).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptSegment {
    /// Rendered catalog text, spoken as-is.
    Text(String),
    /// A digit string, spoken digit by digit.
    Digits(String),
    /// A calendar date, spoken in long form.
    Date(NaiveDate),
}

impl PromptSegment {
    pub fn text(s: impl Into<String>) -> Self {
        PromptSegment::Text(s.into())
    }
}

/// How the gateway should collect the caller's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMode {
    /// Collect DTMF keypad digits.
    Tap,
    /// Record a free audio clip.
    Record,
}

/// Digit constraints for one collection.
/// The gateway may pre-filter on `digits_allowed`; the menu engine
/// validates again regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadConstraints {
    pub min_digits: usize,
    pub max_digits: usize,
    /// Explicit allow-list of acceptable digits.
    pub digits_allowed: Vec<char>,
}

impl ReadConstraints {
    const ALL_DIGITS: [char; 10] = ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];

    /// Exactly `n` digits, any digit allowed.
    pub fn fixed(n: usize) -> Self {
        Self {
            min_digits: n,
            max_digits: n,
            digits_allowed: Self::ALL_DIGITS.to_vec(),
        }
    }

    /// Between `min` and `max` digits, any digit allowed.
    pub fn bounded(min: usize, max: usize) -> Self {
        Self {
            min_digits: min,
            max_digits: max,
            digits_allowed: Self::ALL_DIGITS.to_vec(),
        }
    }

    /// A single keypress restricted to the given menu keys.
    pub fn menu_keys(keys: &[u8]) -> Self {
        let mut digits_allowed: Vec<char> = keys
            .iter()
            .map(|k| char::from_digit(*k as u32, 10).unwrap_or('0'))
            .collect();
        digits_allowed.sort_unstable();
        digits_allowed.dedup();
        Self {
            min_digits: 1,
            max_digits: 1,
            digits_allowed,
        }
    }

    /// Whether a raw digit string satisfies these constraints.
    pub fn accepts(&self, raw: &str) -> bool {
        let len = raw.chars().count();
        len >= self.min_digits
            && len <= self.max_digits
            && raw.chars().all(|c| self.digits_allowed.contains(&c))
    }
}

/// Raw input returned by the gateway, before grammar validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawInput {
    Digits(String),
    Recording(RawContent),
}

// ============================================================================
// VOICE GATEWAY TRAIT
// ============================================================================

/// The narrow contract the core drives a call through.
///
/// One gateway handle belongs to exactly one call and is exclusively owned
/// by the task handling that call, hence `&mut self`. Every method blocks
/// until the transport answers; hangup and timeout surface as
/// [`GatewayError`] from whichever method was waiting.
pub trait VoiceGateway: Send {
    /// Play the prompts, then collect one input under the constraints.
    fn read(
        &mut self,
        prompts: &[PromptSegment],
        mode: InputMode,
        constraints: &ReadConstraints,
    ) -> Result<RawInput, GatewayError>;

    /// Play the prompts and keep the call alive.
    fn announce(&mut self, prompts: &[PromptSegment]) -> Result<(), GatewayError>;

    /// Play the prompts, then terminate the call.
    fn announce_hangup(&mut self, prompts: &[PromptSegment]) -> Result<(), GatewayError>;
}
