#![no_main]

use bugsift_core::config::QualityConfig;
use bugsift_core::model::Submission;
use bugsift_core::quality::QualityChecker;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };
    let Ok(submission) = Submission::from_json(value) else {
        return;
    };

    let result = QualityChecker::new(QualityConfig::default()).check(&submission);
    assert!((0.0..=1.0).contains(&result.score));
    assert!(!result.passed || result.issues.iter().all(|i| !i.code.is_hard()));

    // The stored payload must parse back to the same submission.
    let again = Submission::from_json(submission.to_payload()).expect("payload round-trips");
    assert_eq!(again, submission);
});
