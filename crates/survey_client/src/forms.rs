use std::collections::BTreeMap;

use shared::protocol::{LanguageLevel, SubjectForm};
use thiserror::Error;

/// Proficiency recorded for the native language.
pub const NATIVE_LEVEL: u8 = 10;
const LEVEL_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("level field '{field}' refers to language {slot}, which was not entered")]
    UnknownLanguageSlot { field: String, slot: usize },
    #[error("level field '{field}' has invalid value '{value}'")]
    InvalidLevel { field: String, value: String },
}

/// Turns the raw personalia fields, in form order, into a [`SubjectForm`].
///
/// `nativelang` becomes `[value, 10]`, `languageN` opens entry N, `levelN` sets
/// the proficiency of entry N and every other field is copied as-is.
pub fn parse_personalia<I, K, V>(fields: I) -> Result<SubjectForm, FormError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut form = SubjectForm::default();
    for (name, value) in fields {
        let (name, value) = (name.as_ref(), value.as_ref());
        if name == "nativelang" {
            form.languages
                .push(LanguageLevel::new(value, Some(NATIVE_LEVEL)));
        } else if slot_number(name, "language").is_some() {
            form.languages.push(LanguageLevel::new(value, None));
        } else if let Some(slot) = trailing_number(name) {
            let entry = form
                .languages
                .get_mut(slot)
                .ok_or_else(|| FormError::UnknownLanguageSlot {
                    field: name.to_string(),
                    slot,
                })?;
            entry.level = parse_level(name, value)?;
        } else {
            form.fields.insert(name.to_string(), value.to_string());
        }
    }
    Ok(form)
}

/// Evaluation answers are a plain name to value map.
pub fn parse_evaluation<I, K, V>(fields: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    fields
        .into_iter()
        .map(|(name, value)| (name.as_ref().to_string(), value.as_ref().to_string()))
        .collect()
}

fn slot_number(name: &str, prefix: &str) -> Option<usize> {
    name.strip_prefix(prefix).and_then(|rest| rest.parse().ok())
}

fn trailing_number(name: &str) -> Option<usize> {
    let digits_at = name.find(|c: char| c.is_ascii_digit())?;
    let digits: String = name[digits_at..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

fn parse_level(field: &str, value: &str) -> Result<Option<u8>, FormError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    let invalid = || FormError::InvalidLevel {
        field: field.to_string(),
        value: value.to_string(),
    };
    let level: u8 = value.parse().map_err(|_| invalid())?;
    if !LEVEL_RANGE.contains(&level) {
        return Err(invalid());
    }
    Ok(Some(level))
}

#[cfg(test)]
#[path = "tests/forms_tests.rs"]
mod tests;
