use tempo_core::errors::{ErrorInfo, TempoError};

fn sample_info(code: &str, message: &str) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("node", "mu")
        .with_context("reason", "example")
}

#[test]
fn config_error_surface() {
    let err = TempoError::Config(sample_info("sample-freq-exceeds-generations", "no samples"));
    assert_eq!(err.info().code, "sample-freq-exceeds-generations");
    assert!(err.info().context.contains_key("node"));
}

#[test]
fn model_error_surface() {
    let err = TempoError::Model(sample_info("no-computable-start", "all draws failed"));
    assert_eq!(err.info().code, "no-computable-start");
    assert!(err.to_string().starts_with("model error: all draws failed"));
}

#[test]
fn parallel_error_surface() {
    let err = TempoError::Parallel(sample_info("unknown-rank", "rank 9"));
    assert_eq!(err.info().code, "unknown-rank");
}

#[test]
fn errors_round_trip_through_json() {
    let err = TempoError::Io(
        ErrorInfo::new("stone-write", "disk full").with_hint("free some space"),
    );
    let json = serde_json::to_string(&err).unwrap();
    assert!(json.contains("\"family\":\"Io\""));
    let back: TempoError = serde_json::from_str(&json).unwrap();
    assert_eq!(back, err);
}
