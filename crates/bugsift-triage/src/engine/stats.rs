use std::collections::HashMap;

use bugsift_core::DetectError;
use bugsift_core::model::{ClassificationTag, MatchMethod, ReviewStatus};

use super::Engine;
use crate::outcome::{EngineStats, GroupCount, ParentCount};

/// Parents listed in [`EngineStats::top_parents`].
const TOP_PARENTS: usize = 10;

/// Builds listed in [`EngineStats::by_build`].
const TOP_BUILDS: usize = 20;

/// Key for reports that lack the grouped field.
const UNKNOWN: &str = "unknown";

/// Count occurrences per key, largest group first, ties by key.
fn group_counts<'a>(keys: impl Iterator<Item = Option<&'a str>>) -> Vec<GroupCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for key in keys {
        let key = key.map(str::trim).filter(|k| !k.is_empty()).unwrap_or(UNKNOWN);
        *counts.entry(key).or_default() += 1;
    }
    let mut groups: Vec<GroupCount> = counts
        .into_iter()
        .map(|(key, count)| GroupCount {
            key: key.to_string(),
            count,
        })
        .collect();
    groups.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
    groups
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0_usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Engine {
    /// Read-only aggregate for external monitoring.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn stats(&self) -> Result<EngineStats, DetectError> {
        let reports = self.store.list_reports().map_err(DetectError::Storage)?;
        let history = self.store.list_history(None).map_err(DetectError::Storage)?;
        let queue = self
            .store
            .list_low_quality(None)
            .map_err(DetectError::Storage)?;

        let count_tag = |tag| reports.iter().filter(|r| r.tag == tag).count();
        let duplicates = count_tag(ClassificationTag::Duplicate);
        let recurring = count_tag(ClassificationTag::Recurring);
        let blocked = history.iter().filter(|h| h.record.was_blocked).count();
        let count_status = |status| queue.iter().filter(|e| e.status == status).count();

        let mut direct: HashMap<&str, usize> = HashMap::new();
        for report in &reports {
            if report.tag == ClassificationTag::Duplicate {
                if let Some(parent) = report.parent_id.as_deref() {
                    *direct.entry(parent).or_default() += 1;
                }
            }
        }
        let mut top_parents: Vec<ParentCount> = reports
            .iter()
            .filter_map(|r| {
                direct.get(r.id.as_str()).map(|&duplicate_count| ParentCount {
                    report_id: r.id.clone(),
                    title: r.title.clone(),
                    tag: r.tag,
                    duplicate_count,
                })
            })
            .collect();
        top_parents.sort_by(|a, b| {
            b.duplicate_count
                .cmp(&a.duplicate_count)
                .then_with(|| a.report_id.cmp(&b.report_id))
        });
        top_parents.truncate(TOP_PARENTS);

        let attempts = reports.len() + blocked;
        let prevention_rate = if attempts == 0 {
            0.0
        } else {
            round2(blocked as f64 / attempts as f64 * 100.0)
        };

        let by_region = group_counts(reports.iter().map(|r| r.metadata.region.as_deref()));
        let duplicates_by_region = group_counts(
            reports
                .iter()
                .filter(|r| r.tag == ClassificationTag::Duplicate)
                .map(|r| r.metadata.region.as_deref()),
        );
        let mut by_build =
            group_counts(reports.iter().map(|r| r.metadata.build_version.as_deref()));
        by_build.truncate(TOP_BUILDS);

        let index = self.index.stats();
        Ok(EngineStats {
            total: reports.len(),
            duplicates_detected: duplicates + blocked,
            duplicates_blocked: blocked,
            recurring,
            resolved: reports.iter().filter(|r| r.is_resolved()).count(),
            low_quality_count: queue.len(),
            low_quality_pending: count_status(ReviewStatus::Pending),
            low_quality_approved: count_status(ReviewStatus::Approved),
            low_quality_rejected: count_status(ReviewStatus::Rejected),
            avg_quality_score: mean(reports.iter().filter_map(|r| r.quality_score)),
            avg_similarity_score: mean(
                history
                    .iter()
                    .filter(|h| h.record.match_method != MatchMethod::Manual)
                    .filter_map(|h| h.record.match_score),
            ),
            prevention_rate,
            top_parents,
            by_region,
            duplicates_by_region,
            by_build,
            index_len: index.len,
            index_generation: index.generation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_nothing_is_none() {
        assert_eq!(mean(std::iter::empty()), None);
        let avg = mean([0.5, 1.0].into_iter()).expect("mean");
        assert!((avg - 0.75).abs() < 1e-12);
    }

    #[test]
    fn groups_sort_by_count_and_fold_missing_keys() {
        let groups = group_counts(
            [Some("EU"), None, Some("US"), Some("EU"), Some("  "), Some("APAC")].into_iter(),
        );
        let flat: Vec<(&str, usize)> = groups.iter().map(|g| (g.key.as_str(), g.count)).collect();
        assert_eq!(flat, [("EU", 2), ("unknown", 2), ("APAC", 1), ("US", 1)]);
    }

    #[test]
    fn rounding_keeps_two_decimals() {
        assert!((round2(33.333_333) - 33.33).abs() < 1e-9);
    }
}
