//! Compliance Recorder
//!
//! Accumulates probe outcomes per category. The driver is the only writer
//! and holds the report by `&mut`, one [`ComplianceReport::record`] per probe.

#[cfg(test)]
mod tests;

pub mod render;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::probes::{Category, Outcome, Verdict};

pub use render::{render_json, render_text};

/// Detail recorded for categories no probe reached a verdict on
pub const NEEDS_TESTING: &str = "needs testing";

/// One probe's outcome as it appears in the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeRecord {
    pub probe: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Aggregated verdict of a category plus the probes behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryRecord {
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub probes: Vec<ProbeRecord>,
}

impl CategoryRecord {
    fn untested() -> Self {
        Self {
            verdict: Verdict::Partial,
            note: Some(NEEDS_TESTING.to_string()),
            probes: Vec::new(),
        }
    }
}

/// Passed categories over categories with a definitive verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Score {
    pub passed: usize,
    pub scored: usize,
}

impl Score {
    /// `None` when no category was scored
    #[inline]
    pub fn ratio(self) -> Option<f64> {
        if self.scored == 0 {
            None
        } else {
            Some(self.passed as f64 / self.scored as f64)
        }
    }

    #[inline]
    pub fn percent(self) -> Option<usize> {
        (self.scored > 0).then(|| self.passed * 100 / self.scored)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub run_id: Uuid,
    pub target: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    categories: BTreeMap<Category, CategoryRecord>,
}

impl ComplianceReport {
    #[inline]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target: target.into(),
            started_at: Utc::now(),
            finished_at: None,
            categories: BTreeMap::new(),
        }
    }

    /// Add one probe outcome and fold it into its category verdict
    #[inline]
    pub fn record(&mut self, probe: &str, category: Category, outcome: Outcome) {
        let verdict = outcome.verdict;
        let record = ProbeRecord {
            probe: probe.to_string(),
            outcome,
        };

        match self.categories.get_mut(&category) {
            Some(entry) if entry.probes.is_empty() => {
                entry.verdict = verdict;
                entry.note = None;
                entry.probes.push(record);
            }
            Some(entry) => {
                entry.verdict = combine(entry.verdict, verdict);
                entry.probes.push(record);
            }
            None => {
                self.categories.insert(
                    category,
                    CategoryRecord {
                        verdict,
                        note: None,
                        probes: vec![record],
                    },
                );
            }
        }
    }

    /// Fill in every category no probe reported on and stamp the finish time
    #[inline]
    pub fn finalize(&mut self) {
        for category in Category::ALL {
            self.categories
                .entry(category)
                .or_insert_with(CategoryRecord::untested);
        }
        self.finished_at = Some(Utc::now());
    }

    #[inline]
    pub fn is_finalized(&self) -> bool {
        self.finished_at.is_some()
    }

    #[inline]
    pub fn category(&self, category: Category) -> Option<&CategoryRecord> {
        self.categories.get(&category)
    }

    #[inline]
    pub fn category_verdict(&self, category: Category) -> Option<Verdict> {
        self.categories.get(&category).map(|record| record.verdict)
    }

    /// Categories in their fixed display order
    #[inline]
    pub fn categories(&self) -> impl Iterator<Item = (Category, &CategoryRecord)> {
        self.categories.iter().map(|(category, record)| (*category, record))
    }

    #[inline]
    pub fn score(&self) -> Score {
        let definitive = self
            .categories
            .values()
            .filter(|record| record.verdict.is_definitive());
        let (passed, scored) = definitive.fold((0, 0), |(passed, scored), record| {
            let passed = passed + usize::from(record.verdict == Verdict::Pass);
            (passed, scored + 1)
        });
        Score { passed, scored }
    }

    /// 0 when every definitively scored category passed, 1 otherwise
    #[inline]
    pub fn exit_code(&self) -> i32 {
        let failed = self
            .categories
            .values()
            .any(|record| record.verdict == Verdict::Fail);
        i32::from(failed)
    }
}

/// Fail dominates, then Partial
fn combine(current: Verdict, next: Verdict) -> Verdict {
    match (current, next) {
        (Verdict::Fail, _) | (_, Verdict::Fail) => Verdict::Fail,
        (Verdict::Partial, _) | (_, Verdict::Partial) => Verdict::Partial,
        _ => Verdict::Pass,
    }
}
