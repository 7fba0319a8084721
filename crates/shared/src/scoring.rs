use serde::{Deserialize, Serialize};

use crate::{domain::Page, protocol::CommandRecord};

/// Per-page evaluation of a subject's fills against the page's expected regions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageScore {
    pub page: String,
    pub target: String,
    pub color: String,
    pub correct: u8,
}

/// Scores one page.
///
/// A page without fills is skipped (`-`/`-`, incorrect). Otherwise the first fill
/// that hits an expected target makes the page correct and is reported; when no
/// fill hits, every fill target and color is listed.
pub fn evaluate_page(page: &Page, records: &[CommandRecord]) -> PageScore {
    let fills: Vec<(&str, &str)> = records
        .iter()
        .filter_map(|record| match record {
            CommandRecord::Fill { target, color, .. } => Some((target.as_str(), color.as_str())),
            CommandRecord::Resume { .. } => None,
        })
        .collect();

    if records.is_empty() {
        return PageScore {
            page: page.name.clone(),
            target: "-".to_string(),
            color: "-".to_string(),
            correct: 0,
        };
    }

    if let Some((target, color)) = fills
        .iter()
        .find(|(target, _)| page.expected_targets.iter().any(|expected| expected == target))
    {
        return PageScore {
            page: page.name.clone(),
            target: target.to_string(),
            color: color.to_string(),
            correct: 1,
        };
    }

    PageScore {
        page: page.name.clone(),
        target: fills.iter().map(|(t, _)| *t).collect::<Vec<_>>().join(", "),
        color: fills.iter().map(|(_, c)| *c).collect::<Vec<_>>().join(", "),
        correct: 0,
    }
}
