mod common;

use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use common::{build_index, medical_rows, AxisEmbedder, ScriptedGenerator};
use medibot::chat;
use medibot::config::Config;
use medibot::pipeline::Pipeline;
use medibot_core::error::PipelineError;
use medibot_core::format::DISCLAIMER;
use medibot_core::generate::{GenerationError, GenerationErrorKind};
use medibot_core::models::Role;
use medibot_core::session::{ConversationSession, SessionState};

fn config_for(index: &Path) -> Config {
    let mut cfg = Config::default();
    cfg.index.path = index.to_path_buf();
    cfg.embedding.provider = "disabled".to_string();
    cfg
}

async fn fixture() -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("db.sqlite");
    build_index(&path, &medical_rows(), Some(2)).await;
    let cfg = config_for(&path);
    (tmp, cfg)
}

#[tokio::test]
async fn test_diabetes_question_cites_sources() {
    let (_tmp, cfg) = fixture().await;
    let generator = Arc::new(ScriptedGenerator::answering(
        "  Common symptoms are excessive thirst and frequent urination.\n",
    ));
    let pipeline = Pipeline::open(&cfg, Arc::new(AxisEmbedder::default()), generator.clone())
        .await
        .unwrap();

    let record = pipeline
        .answer("What are the symptoms of diabetes?", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(record.sources.len(), 3);
    assert!(record
        .display
        .starts_with("Common symptoms are excessive thirst and frequent urination."));
    assert!(record.display.contains("**📚 Sources:**"));
    assert!(record.display.contains("📄 encyclopedia.pdf (Page 12)"));
    assert!(record.display.contains("📄 encyclopedia.pdf (Page 45)"));
    assert!(record.display.contains("📄 Medical Encyclopedia (Page 7)"));
    assert!(!record.display.contains("(Page 3)"));
    assert!(record.display.ends_with(DISCLAIMER));

    let prompt = generator.last_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("What are the symptoms of diabetes?"));
    assert!(prompt.contains("excessive thirst and frequent urination"));
    assert!(!prompt.contains("Asthma"));
}

#[tokio::test]
async fn test_missing_index_fails_before_any_call() {
    let tmp = TempDir::new().unwrap();
    let cfg = config_for(&tmp.path().join("missing.sqlite"));
    let embedder = Arc::new(AxisEmbedder::default());
    let generator = Arc::new(ScriptedGenerator::answering("never"));

    let err = Pipeline::open(&cfg, embedder.clone(), generator.clone())
        .await
        .err()
        .unwrap();

    assert!(matches!(err, PipelineError::IndexUnavailable { .. }));
    assert_eq!(err.code(), "index_unavailable");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_configured_k_bounds_sources() {
    let (_tmp, mut cfg) = fixture().await;
    cfg.retrieval.k = 2;
    let pipeline = Pipeline::open(
        &cfg,
        Arc::new(AxisEmbedder::default()),
        Arc::new(ScriptedGenerator::answering("Thirst.")),
    )
    .await
    .unwrap();

    let record = pipeline
        .answer("diabetes?", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(record.sources.len(), 2);
    assert!(record.display.contains("(Page 12)"));
    assert!(record.display.contains("(Page 45)"));
    assert!(!record.display.contains("(Page 7)"));
}

#[tokio::test]
async fn test_zero_k_answers_without_sources() {
    let (_tmp, mut cfg) = fixture().await;
    cfg.retrieval.k = 0;
    let embedder = Arc::new(AxisEmbedder::default());
    let pipeline = Pipeline::open(
        &cfg,
        embedder.clone(),
        Arc::new(ScriptedGenerator::answering("I don't know.")),
    )
    .await
    .unwrap();

    let record = pipeline
        .answer("diabetes?", &CancellationToken::new())
        .await
        .unwrap();
    assert!(record.sources.is_empty());
    assert!(!record.display.contains("Sources"));
    assert_eq!(record.display, format!("I don't know.{}", DISCLAIMER));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_transcript_parity_across_success_and_failure() {
    let (_tmp, cfg) = fixture().await;
    let ok = Pipeline::open(
        &cfg,
        Arc::new(AxisEmbedder::default()),
        Arc::new(ScriptedGenerator::answering("Thirst.")),
    )
    .await
    .unwrap();

    let mut failing_cfg = cfg.clone();
    failing_cfg.generation.api_key_env = "MEDIBOT_TEST_UNSET_KEY".to_string();
    let failing = Pipeline::open(
        &failing_cfg,
        Arc::new(AxisEmbedder::default()),
        Arc::new(ScriptedGenerator::failing(GenerationError::new(
            GenerationErrorKind::Auth,
            "HTTP 401 Unauthorized",
        ))),
    )
    .await
    .unwrap();

    let cancel = CancellationToken::new();
    let mut session = ConversationSession::new();

    chat::ask(&mut session, &ok, "diabetes?", &cancel).await.unwrap();
    assert_eq!(session.transcript().len() % 2, 0);

    let notification = chat::ask(&mut session, &failing, "and asthma?", &cancel)
        .await
        .unwrap_err();
    assert_eq!(session.transcript().len() % 2, 1);
    assert_eq!(session.state(), SessionState::Idle);
    let last = session.transcript().last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content, "and asthma?");
    assert_eq!(notification.code, "generation_failed");
    assert!(notification.hint.contains("credential configuration"));

    chat::ask(&mut session, &ok, "diabetes again?", &cancel)
        .await
        .unwrap();
    let roles: Vec<Role> = session.transcript().iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        [Role::User, Role::Assistant, Role::User, Role::User, Role::Assistant]
    );
}

#[tokio::test]
async fn test_cancelled_request_leaves_session_usable() {
    let (_tmp, cfg) = fixture().await;
    let pipeline = Pipeline::open(
        &cfg,
        Arc::new(AxisEmbedder::default()),
        Arc::new(ScriptedGenerator::answering("Thirst.").with_delay(std::time::Duration::from_secs(30))),
    )
    .await
    .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let mut session = ConversationSession::new();
    let n = chat::ask(&mut session, &pipeline, "diabetes?", &cancel)
        .await
        .unwrap_err();
    assert_eq!(n.code, "cancelled");
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.transcript().len(), 1);
}
