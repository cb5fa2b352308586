//! Localized message catalog
//!
//! Every caller-facing string is looked up by a symbolic dotted key
//! (`event.confirm_type`) with `{placeholder}` substitution. Operators edit
//! wording by overriding keys from a TOML file; flow logic never embeds
//! caller-facing text.

use once_cell::sync::Lazy;
use regex::Regex;
use simcha_core::CatalogError;
use std::collections::HashMap;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([a-z0-9_]+)\}").expect("placeholder regex is valid"));

static BUILTIN: Lazy<MessageCatalog> = Lazy::new(|| {
    MessageCatalog::from_toml_str(include_str!("builtin.toml"))
        .expect("builtin catalog is well-formed")
});

/// Catalog of caller-facing messages keyed by symbolic name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCatalog {
    entries: HashMap<String, String>,
}

impl MessageCatalog {
    /// The built-in catalog shipped with the crate.
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    /// Parse a catalog from TOML text. Nested tables flatten into dotted
    /// keys; every leaf value must be a string.
    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let value: toml::Value = toml::from_str(source).map_err(|e| CatalogError::Parse {
            reason: e.to_string(),
        })?;
        let mut entries = HashMap::new();
        flatten_into(&mut entries, "", &value)?;
        Ok(Self { entries })
    }

    /// Overlay another catalog on top of this one; the override wins on
    /// key collisions. Used to apply an operator-edited file over builtin.
    pub fn with_overrides(mut self, overrides: MessageCatalog) -> Self {
        self.entries.extend(overrides.entries);
        self
    }

    /// Raw message text for a key.
    pub fn get(&self, key: &str) -> Result<&str, CatalogError> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| CatalogError::MissingMessage {
                key: key.to_string(),
            })
    }

    /// Render a message, substituting `{name}` placeholders from `args`.
    /// A placeholder left unbound after substitution is an error, never
    /// silently spoken to the caller.
    pub fn render(&self, key: &str, args: &[(&str, String)]) -> Result<String, CatalogError> {
        let mut text = self.get(key)?.to_string();
        for (name, value) in args {
            text = text.replace(&format!("{{{name}}}"), value);
        }
        if let Some(caps) = PLACEHOLDER_RE.captures(&text) {
            return Err(CatalogError::UnboundPlaceholder {
                key: key.to_string(),
                placeholder: caps[1].to_string(),
            });
        }
        Ok(text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn flatten_into(
    entries: &mut HashMap<String, String>,
    prefix: &str,
    value: &toml::Value,
) -> Result<(), CatalogError> {
    match value {
        toml::Value::Table(table) => {
            for (name, child) in table {
                let key = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                };
                flatten_into(entries, &key, child)?;
            }
            Ok(())
        }
        toml::Value::String(text) => {
            entries.insert(prefix.to_string(), text.clone());
            Ok(())
        }
        other => Err(CatalogError::Parse {
            reason: format!("key {prefix:?} must be a string, got {}", other.type_str()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_terminal_messages() {
        let catalog = MessageCatalog::builtin();
        assert!(!catalog.is_empty());
        assert!(catalog.len() > 30);
        assert!(catalog.get("identify.not_found").is_ok());
        assert!(catalog.get("menu.max_attempts").is_ok());
        assert!(catalog.get("call.storage_failure").is_ok());
    }

    #[test]
    fn test_render_substitutes_placeholders() {
        let catalog = MessageCatalog::builtin();
        let text = catalog
            .render(
                "event.saved",
                &[
                    ("event_type", "Bat Mitzvah".to_string()),
                    ("date", "15 June 2024".to_string()),
                ],
            )
            .unwrap();
        assert!(text.contains("Bat Mitzvah"));
        assert!(text.contains("15 June 2024"));
    }

    #[test]
    fn test_render_rejects_unbound_placeholder() {
        let catalog = MessageCatalog::builtin();
        let err = catalog.render("event.saved", &[]).unwrap_err();
        assert!(matches!(err, CatalogError::UnboundPlaceholder { .. }));
    }

    #[test]
    fn test_missing_key() {
        let catalog = MessageCatalog::builtin();
        let err = catalog.render("event.no_such_key", &[]).unwrap_err();
        assert!(matches!(err, CatalogError::MissingMessage { .. }));
    }

    #[test]
    fn test_overrides_win() {
        let base = MessageCatalog::builtin();
        let overrides =
            MessageCatalog::from_toml_str("[call]\ngoodbye = \"Shalom.\"\n").unwrap();
        let merged = base.with_overrides(overrides);
        assert_eq!(merged.get("call.goodbye").unwrap(), "Shalom.");
        // untouched keys survive the overlay
        assert!(merged.get("identify.prompt_id").is_ok());
    }

    #[test]
    fn test_non_string_leaf_rejected() {
        let err = MessageCatalog::from_toml_str("[call]\ngoodbye = 3\n").unwrap_err();
        assert!(matches!(err, CatalogError::Parse { .. }));
    }
}
