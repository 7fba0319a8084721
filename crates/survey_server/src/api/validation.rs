use chrono::NaiveDate;
use shared::{
    domain::Page,
    error::ApiError,
    protocol::{CommandRecord, SessionPayload},
};

/// Roughly one hundred years.
pub(crate) const MAX_AGE_TOLERANCE_DAYS: i64 = 36524;

/// Checks a payload the way the survey database expects it.
pub(crate) fn validate_payload(
    payload: &SessionPayload,
    pages: &[Page],
    today: NaiveDate,
) -> Result<(), ApiError> {
    let subject = &payload.subject;
    if subject.field("name").unwrap_or_default().trim().is_empty() {
        return Err(ApiError::validation("name must be non-empty"));
    }
    let birth = subject.field("birth").unwrap_or_default().trim();
    if birth.is_empty() {
        return Err(ApiError::validation("birth date must be non-empty"));
    }
    let birth = NaiveDate::parse_from_str(birth, "%Y-%m-%d")
        .map_err(|e| ApiError::validation(format!("invalid birth date '{birth}': {e}")))?;
    let age_days = (today - birth).num_days();
    if age_days > MAX_AGE_TOLERANCE_DAYS {
        return Err(ApiError::validation("age greater than maximum tolerance"));
    }
    if age_days < 0 {
        return Err(ApiError::validation("negative age"));
    }
    if let Some(numeral) = subject.field("numeral").filter(|v| !v.is_empty()) {
        numeral
            .parse::<i64>()
            .map_err(|_| ApiError::validation(format!("numeral '{numeral}' is not a number")))?;
    }

    if subject.languages.is_empty() {
        return Err(ApiError::validation("native language must be set"));
    }
    for language in &subject.languages {
        if language.language.trim().is_empty() || language.level.is_none() {
            return Err(ApiError::validation("incomplete language data"));
        }
    }

    if payload.results.len() != pages.len() {
        return Err(ApiError::validation(format!(
            "expected results for {} pages, got {}",
            pages.len(),
            payload.results.len()
        )));
    }
    for (page_index, commands) in payload.results.iter().enumerate() {
        for (action_index, command) in commands.iter().enumerate() {
            if let CommandRecord::Fill { target, color, .. } = command {
                if target.is_empty() || color.is_empty() {
                    return Err(ApiError::validation(format!(
                        "action {action_index} of page {page_index} has no target or color"
                    )));
                }
            }
        }
    }
    Ok(())
}
