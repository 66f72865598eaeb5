//! Validation of client-supplied identifiers (item ids, loadout selections).

use crate::storage::ItemKind;

/// Longest accepted item id.
pub const MAX_ITEM_ID_LEN: usize = 32;

/// Field validation errors with helpful messages
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is too long (maximum {max} characters)")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} contains invalid characters: {chars}")]
    InvalidCharacters { field: &'static str, chars: String },

    #[error("unknown item type: {0}")]
    UnknownItemType(String),
}

/// Item ids are short lowercase slugs: `a-z`, `0-9`, `_` and `-`.
pub fn validate_item_id(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    if value.chars().count() > MAX_ITEM_ID_LEN {
        return Err(ValidationError::TooLong {
            field,
            max: MAX_ITEM_ID_LEN,
        });
    }
    let mut bad: Vec<char> = value
        .chars()
        .filter(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-'))
        .collect();
    if !bad.is_empty() {
        bad.dedup();
        return Err(ValidationError::InvalidCharacters {
            field,
            chars: bad.into_iter().collect(),
        });
    }
    Ok(())
}

/// Trim an optional selection; blank means "not supplied".
pub fn optional_item_id(field: &'static str, value: Option<&str>) -> Result<Option<String>, ValidationError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => {
            validate_item_id(field, v)?;
            Ok(Some(v.to_string()))
        }
        None => Ok(None),
    }
}

pub fn parse_item_kind(value: &str) -> Result<ItemKind, ValidationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ValidationError::UnknownItemType(value.to_string()))
}
