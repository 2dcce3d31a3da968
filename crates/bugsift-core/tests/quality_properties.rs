//! Property tests for the quality gate and report ids.

use bugsift_core::config::QualityConfig;
use bugsift_core::model::id::{generate_report_id, is_report_id};
use bugsift_core::model::{RawSubmission, Submission};
use bugsift_core::quality::QualityChecker;
use proptest::prelude::*;

fn raw_submission() -> impl Strategy<Value = RawSubmission> {
    (
        ".{0,80}",
        ".{0,300}",
        proptest::option::of(".{0,60}"),
        proptest::option::of("[A-Za-z0-9 ]{1,20}"),
        proptest::option::of("[0-9]{1,2}\\.[0-9]{1,2}\\.[0-9]{1,2}"),
        proptest::option::of("(EU|US|APAC)"),
    )
        .prop_map(|(title, description, repro_steps, device, build, region)| RawSubmission {
            title: Some(title),
            description: Some(description),
            repro_steps,
            device,
            build_version: build,
            region,
            ..RawSubmission::default()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn score_stays_in_unit_interval(raw in raw_submission()) {
        let Ok(submission) = Submission::try_from_raw(raw) else {
            return Ok(());
        };
        let checker = QualityChecker::new(QualityConfig::default());
        let result = checker.check(&submission);
        prop_assert!((0.0..=1.0).contains(&result.score), "score {}", result.score);
        if result.passed {
            prop_assert!(result.score >= checker.config().min_quality_score);
        }
        if result.issues.is_empty() {
            prop_assert!((result.score - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn empty_description_never_passes(title in "[A-Za-z ]{10,60}") {
        let submission = Submission::try_from_raw(RawSubmission {
            title: Some(title),
            description: Some(String::new()),
            ..RawSubmission::default()
        })
        .expect("structurally valid");
        let result = QualityChecker::new(QualityConfig::default()).check(&submission);
        prop_assert!(!result.passed);
    }

    #[test]
    fn generated_ids_are_well_formed(ts in any::<i64>(), text in ".{0,64}", attempt in 0u32..8) {
        let id = generate_report_id(ts, &text, attempt);
        prop_assert!(is_report_id(&id), "bad id {id}");
    }
}
