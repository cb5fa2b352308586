//! Configuration types

use crate::{EntityId, NationalId};
use serde::{Deserialize, Serialize};

/// Master configuration for the call-handling core.
/// ALL values are required - no defaults anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallConfig {
    /// Maximum collection attempts per step before the call ends.
    pub max_attempts: u8,
    /// Digit count expected for caller identification.
    pub national_id_digits: usize,
    /// School year used for class-membership and assignment lookups.
    pub current_year: i32,
    /// Account scope under which family-teacher assignments are recorded.
    /// Explicit by requirement: the legacy system fell back to a hard-coded
    /// account when none was resolved, which this field replaces.
    pub account_scope: EntityId,
}

impl CallConfig {
    /// Validate internal consistency of the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.national_id_digits != NationalId::DIGITS {
            return Err(format!(
                "national_id_digits must be {} (got {})",
                NationalId::DIGITS,
                self.national_id_digits
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::new_entity_id;

    #[test]
    fn test_config_validate() {
        let config = CallConfig {
            max_attempts: 3,
            national_id_digits: 9,
            current_year: 2024,
            account_scope: new_entity_id(),
        };
        assert!(config.validate().is_ok());

        let zero_attempts = CallConfig {
            max_attempts: 0,
            ..config.clone()
        };
        assert!(zero_attempts.validate().is_err());

        let bad_digits = CallConfig {
            national_id_digits: 8,
            ..config
        };
        assert!(bad_digits.validate().is_err());
    }
}
