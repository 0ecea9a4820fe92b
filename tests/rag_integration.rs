//! Retrieval-augmented generation across the three tiers

mod support;

use edgeinfer::progress::EventKind;
use edgeinfer::rag::{Document, RagTier};
use edgeinfer::runtime::{MockPipeline, MockRuntime};
use edgeinfer::{RagOptions, SdkError};
use support::{test_config, Harness, HarnessBuilder, StubBackend};

const QUERY_PATH: &str = "/api/rag/knowledge-bases/kb_docs/query";
const SYNC_PATH: &str = "/api/rag/knowledge-bases/kb_docs/sync";

fn answering(backend_url: &str, answer: &str, memory_mb: u64) -> Harness {
    HarnessBuilder::new(test_config(backend_url))
        .runtime(MockRuntime::new(MockPipeline::new(vec![answer.to_string()])))
        .memory_mb(memory_mb)
        .build()
}

fn sync_package(expires_at: &str) -> serde_json::Value {
    serde_json::json!({
        "sync_package": {
            "metadata": {
                "knowledge_base_id": "kb_docs",
                "knowledge_base_name": "Travel notes",
                "chunk_size": 512,
                "embedding_dimension": 384,
                "sync_token": "sync_1"
            },
            "chunks": [
                {
                    "id": "c1",
                    "document_name": "geo.md",
                    "content": "Paris is the capital of France and sits on the Seine."
                },
                {
                    "id": "c2",
                    "document_name": "lang.md",
                    "content": "Rust enforces ownership and borrowing at compile time."
                }
            ]
        },
        "chunk_count": 2,
        "package_size_mb": 0.02,
        "expires_at": expires_at
    })
}

#[tokio::test]
async fn test_local_query_returns_whole_sentences() {
    let harness = answering("http://127.0.0.1:9", "Sentence two.", 8192);
    let documents = vec![Document::new(
        "short.txt",
        "Sentence one. Sentence two. Sentence three.",
    )];

    let response = harness
        .sdk
        .rag_query_local("What is sentence two?", &documents, &RagOptions::default().with_top_k(1))
        .await
        .unwrap();

    assert_eq!(response.tier, RagTier::Local);
    assert_eq!(response.chunks.len(), 1);
    assert!(response.chunks[0].content.ends_with('.'));
    assert_eq!(response.chunks[0].source, "short.txt");
    assert_eq!(response.answer, "Sentence two.");
    assert!(response.context.contains("Sentence two."));
}

#[tokio::test]
async fn test_local_query_needs_no_session() {
    let harness = answering("http://127.0.0.1:9", "42", 8192);
    let documents = vec![
        Document::new("answers.md", "The answer to everything is forty two, said the computer."),
        Document::new("weather.md", "Rain is expected over the weekend in the northern hills."),
    ];

    let response = harness
        .sdk
        .rag_query_local("what is the answer to everything", &documents, &RagOptions::default())
        .await
        .unwrap();

    assert!(!harness.sdk.is_initialized());
    assert_eq!(response.chunks[0].source, "answers.md");
    assert!(response.chunks[0].similarity >= response.chunks[1].similarity);
}

#[tokio::test]
async fn test_cloud_context_is_truncated_to_window() {
    let backend = StubBackend::start().await;
    backend.route(
        "POST",
        QUERY_PATH,
        200,
        serde_json::json!({
            "retrieved_chunks": [
                { "id": "r1", "source": "big.md", "content": "irrelevant", "score": 0.9 }
            ],
            "context": "x".repeat(10_000)
        }),
    );
    let harness = answering(backend.url(), "ok", 2048);
    harness.sdk.initialize().await.unwrap();

    let response = harness
        .sdk
        .rag_query("kb_docs", "anything?", &RagOptions::default())
        .await
        .unwrap();

    // 1024-token window: (1024 - 200) * 3 characters
    assert_eq!(response.context.chars().count(), 2472);
    assert_eq!(response.tier, RagTier::Cloud);
    assert_eq!(response.chunks[0].source, "big.md");

    let request = &backend.requests_to(QUERY_PATH)[0];
    assert_eq!(request.json()["query"], "anything?");
    assert_eq!(request.json()["model_id"], "quantum-0.5b");
    assert_eq!(
        request.headers.get("authorization").map(String::as_str),
        Some("Bearer tok_test")
    );
}

#[tokio::test]
async fn test_knowledge_base_id_is_path_encoded() {
    let backend = StubBackend::start().await;
    backend.route(
        "POST",
        "/api/rag/knowledge-bases/team%2Fdocs/query",
        200,
        serde_json::json!({
            "retrieved_chunks": [
                { "id": "r1", "source": "team.md", "content": "Team facts.", "score": 0.8 }
            ]
        }),
    );
    let harness = answering(backend.url(), "ok", 8192);
    harness.sdk.initialize().await.unwrap();

    let response = harness
        .sdk
        .rag_query("team/docs", "who?", &RagOptions::default())
        .await
        .unwrap();

    assert_eq!(response.chunks[0].source, "team.md");
    assert!(backend
        .requests()
        .iter()
        .all(|r| r.path != "/api/rag/knowledge-bases/team/docs/query"));
}

#[tokio::test]
async fn test_cloud_template_is_filled() {
    let backend = StubBackend::start().await;
    backend.route(
        "POST",
        QUERY_PATH,
        200,
        serde_json::json!({
            "retrieved_chunks": [
                { "id": "r1", "document_name": "a.md", "content": "Alpha facts.", "similarity": 0.9 },
                { "id": "r2", "document_name": "b.md", "content": "Beta facts.", "similarity": 0.5 }
            ],
            "prompt_template": "Docs:\n{context}\nQ: {question}"
        }),
    );
    let harness = answering(backend.url(), "Alpha", 8192);
    harness.sdk.initialize().await.unwrap();

    harness
        .sdk
        .rag_query("kb_docs", "which?", &RagOptions::default())
        .await
        .unwrap();

    let prompt = harness.runtime.pipeline().last_prompt().unwrap();
    assert_eq!(prompt, "Docs:\nAlpha facts.\n\nBeta facts.\nQ: which?");
}

#[tokio::test]
async fn test_cloud_query_error_is_mirrored() {
    let backend = StubBackend::start().await;
    backend.route(
        "POST",
        QUERY_PATH,
        503,
        serde_json::json!({ "error": "index rebuilding" }),
    );
    let harness = answering(backend.url(), "unused", 8192);
    harness.sdk.initialize().await.unwrap();

    let err = harness
        .sdk
        .rag_query("kb_docs", "q", &RagOptions::default())
        .await
        .unwrap_err();

    assert!(
        matches!(err, SdkError::Api { status: 503, .. }),
        "got {:?}",
        err
    );
    assert_eq!(harness.handler.events_of(EventKind::Error).len(), 1);
}

#[tokio::test]
async fn test_sync_then_offline_query() {
    let backend = StubBackend::start().await;
    backend.route("POST", SYNC_PATH, 200, sync_package("2099-01-01T00:00:00Z"));
    let harness = answering(backend.url(), "Paris", 8192);
    harness.sdk.initialize().await.unwrap();

    let metadata = harness.sdk.sync_knowledge_base("kb_docs").await.unwrap();
    assert_eq!(metadata.total_chunks, 2);
    assert_eq!(metadata.kb_name.as_deref(), Some("Travel notes"));
    // Shipped without vectors, so both were embedded locally
    assert_eq!(harness.embeddings.embedder().embed_calls(), 2);
    assert_eq!(metadata.embedding_dimension, 64);
    assert_eq!(backend.requests_to(SYNC_PATH)[0].json()["device_id"], "dev_test");

    let synced = harness.handler.events_of(EventKind::KbSynced);
    assert_eq!(synced.len(), 1);
    assert_eq!(synced[0].payload["chunk_count"], 2);

    let before = backend.requests().len();
    let response = harness
        .sdk
        .rag_query_offline(
            "kb_docs",
            "What is the capital of France?",
            &RagOptions::default().with_top_k(1),
        )
        .await
        .unwrap();

    assert_eq!(response.tier, RagTier::Offline);
    assert_eq!(response.chunks[0].id, "c1");
    assert_eq!(response.chunks[0].source, "geo.md");
    assert_eq!(response.answer, "Paris");
    // Retrieval stays on device; only telemetry may reach the backend
    assert!(backend.requests()[before..]
        .iter()
        .all(|r| !r.path.starts_with("/api/rag")));
}

#[tokio::test]
async fn test_expired_index_fails_before_embedding() {
    let backend = StubBackend::start().await;
    backend.route("POST", SYNC_PATH, 200, sync_package("2001-01-01T00:00:00Z"));
    let harness = answering(backend.url(), "unused", 8192);
    harness.sdk.initialize().await.unwrap();
    harness.sdk.sync_knowledge_base("kb_docs").await.unwrap();

    let embeds_after_sync = harness.embeddings.embedder().embed_calls();
    let err = harness
        .sdk
        .rag_query_offline("kb_docs", "anything", &RagOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SdkError::Expired { .. }), "got {:?}", err);
    assert_eq!(harness.embeddings.embedder().embed_calls(), embeds_after_sync);
    assert_eq!(harness.runtime.load_calls(), 0);
    assert!(harness.sdk.offline_index("kb_docs").is_some());
}

#[tokio::test]
async fn test_removed_index_reports_not_synced() {
    let backend = StubBackend::start().await;
    backend.route("POST", SYNC_PATH, 200, sync_package("2099-01-01T00:00:00Z"));
    let harness = answering(backend.url(), "unused", 8192);
    harness.sdk.initialize().await.unwrap();
    harness.sdk.sync_knowledge_base("kb_docs").await.unwrap();

    assert_eq!(harness.sdk.offline_knowledge_bases(), vec!["kb_docs".to_string()]);
    assert!(harness.sdk.remove_offline_index("kb_docs"));

    let err = harness
        .sdk
        .rag_query_offline("kb_docs", "anything", &RagOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::NotSynced(_)), "got {:?}", err);
}
