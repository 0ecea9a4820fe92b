//! SDK session tests against a scripted backend
//!
//! Covers authentication, background registration, planning on a constrained
//! device and telemetry delivery.

mod support;

use edgeinfer::progress::EventKind;
use edgeinfer::runtime::GenerateOptions;
use edgeinfer::{LoadOptions, Precision, SdkError};
use std::time::Duration;
use support::{test_config, HarnessBuilder, StubBackend};

const WAIT: Duration = Duration::from_secs(5);

async fn wait_for_event(handler: &edgeinfer::progress::CollectingHandler, kind: EventKind) -> bool {
    for _ in 0..500 {
        if !handler.events_of(kind).is_empty() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_initialize_authenticates_and_registers() {
    let backend = StubBackend::start().await;
    let harness = HarnessBuilder::new(test_config(backend.url())).build();

    let profile = harness.sdk.initialize().await.unwrap();
    assert_eq!(profile.memory_mb, 8192);
    assert!(harness.sdk.is_initialized());
    assert_eq!(harness.sdk.device_id().as_deref(), Some("dev_test"));

    let auth = backend.requests_to("/api/auth/sdk");
    assert_eq!(auth.len(), 1);
    assert_eq!(auth[0].json()["apiKey"], "ei_test_key");

    let registration = backend
        .wait_for("/api/devices/register", WAIT)
        .await
        .expect("registration request");
    assert_eq!(registration.json()["device_id"], "dev_test");
    assert_eq!(
        registration.headers.get("authorization").map(String::as_str),
        Some("Bearer tok_test")
    );
    assert!(wait_for_event(&harness.handler, EventKind::DeviceRegistered).await);
}

#[tokio::test]
async fn test_rejected_api_key_fails_initialize() {
    let backend = StubBackend::start().await;
    backend.route(
        "POST",
        "/api/auth/sdk",
        401,
        serde_json::json!({ "error": "invalid api key" }),
    );
    let harness = HarnessBuilder::new(test_config(backend.url())).build();

    let err = harness.sdk.initialize().await.unwrap_err();
    assert!(matches!(err, SdkError::Authentication(_)), "got {:?}", err);
    assert!(err.to_string().contains("invalid api key"));
    assert!(!harness.sdk.is_initialized());

    let errors = harness.handler.events_of(EventKind::Error);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].payload["stage"], "auth");
    assert!(backend.requests_to("/api/devices/register").is_empty());
}

#[tokio::test]
async fn test_registration_failure_does_not_fail_initialize() {
    let backend = StubBackend::start().await;
    backend.route(
        "POST",
        "/api/devices/register",
        500,
        serde_json::json!({ "error": "database unavailable" }),
    );
    let harness = HarnessBuilder::new(test_config(backend.url())).build();

    harness.sdk.initialize().await.unwrap();

    assert!(wait_for_event(&harness.handler, EventKind::RegistrationFailed).await);
    assert!(harness.handler.events_of(EventKind::Error).is_empty());
}

#[tokio::test]
async fn test_small_device_plans_lowest_precision() {
    let harness = HarnessBuilder::new(test_config("http://127.0.0.1:9"))
        .memory_mb(2048)
        .build();

    let planned = harness.sdk.can_run_model("quantum-1.7b", None).await.unwrap();
    assert!(planned.can_run);
    assert_eq!(planned.precision, Precision::Q4);

    let q8 = harness
        .sdk
        .can_run_model("quantum-1.7b", Some(Precision::Q8))
        .await
        .unwrap();
    assert!(!q8.can_run);
    assert_eq!(q8.required_mb, Some(3072));
    assert_eq!(q8.recommended_quant, Some(Precision::Q4));

    let loaded = harness
        .sdk
        .load_model("quantum-1.7b", LoadOptions::default())
        .await
        .unwrap();
    assert_eq!(loaded.precision, Precision::Q4);
    assert_eq!(loaded.context_window, 1024);
    assert_eq!(harness.runtime.requests()[0].precision, Precision::Q4);
}

#[tokio::test]
async fn test_profile_recommendation_uses_configured_model() {
    let config = test_config("http://127.0.0.1:9").with_default_model("whisper-base");
    let harness = HarnessBuilder::new(config).memory_mb(8192).build();

    let profile = harness.sdk.analyze_device().await;

    assert_eq!(profile.recommended_precision, Precision::Fp32);
    let profiled = harness.handler.events_of(EventKind::DeviceProfiled);
    assert_eq!(profiled[0].payload["recommended_precision"], "fp32");
}

#[tokio::test]
async fn test_oversized_model_never_reaches_runtime() {
    let harness = HarnessBuilder::new(test_config("http://127.0.0.1:9"))
        .memory_mb(2048)
        .build();

    let err = harness
        .sdk
        .load_model("quantum-7b", LoadOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SdkError::InsufficientMemory { .. }), "got {:?}", err);
    assert_eq!(harness.runtime.load_calls(), 0);
}

#[tokio::test]
async fn test_unknown_model_is_rejected() {
    let harness = HarnessBuilder::new(test_config("http://127.0.0.1:9")).build();

    let err = harness
        .sdk
        .generate("no-such-model", "hi", &GenerateOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SdkError::UnknownModel(_)), "got {:?}", err);
    assert_eq!(harness.handler.events_of(EventKind::Error).len(), 1);
}

#[tokio::test]
async fn test_tenth_telemetry_entry_ships_a_batch() {
    let backend = StubBackend::start().await;
    let harness = HarnessBuilder::new(test_config(backend.url())).build();
    harness.sdk.initialize().await.unwrap();

    // One load entry plus nine generations
    for _ in 0..9 {
        harness
            .sdk
            .generate("quantum-0.5b", "ping", &GenerateOptions::default())
            .await
            .unwrap();
    }

    let batch = backend
        .wait_for("/api/devices/telemetry", WAIT)
        .await
        .expect("telemetry batch");
    let body = batch.json();
    assert_eq!(body["device_id"], "dev_test");
    let metrics = body["metrics"].as_array().unwrap();
    assert_eq!(metrics.len(), 10);
    assert!(metrics.iter().all(|m| m["model_id"] == "quantum-0.5b"));
    assert_eq!(metrics[0]["tokens_generated"], 0);
}

#[tokio::test]
async fn test_destroy_flushes_and_ends_session() {
    let backend = StubBackend::start().await;
    let harness = HarnessBuilder::new(test_config(backend.url())).build();
    harness.sdk.initialize().await.unwrap();

    harness
        .sdk
        .generate("quantum-0.5b", "ping", &GenerateOptions::default())
        .await
        .unwrap();
    assert_eq!(harness.sdk.loaded_models(), vec!["quantum-0.5b".to_string()]);

    harness.sdk.destroy().await;

    let batches = backend.requests_to("/api/devices/telemetry");
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].json()["metrics"].as_array().unwrap().len(), 2);
    assert!(!harness.sdk.is_initialized());
    assert!(harness.sdk.loaded_models().is_empty());
}
