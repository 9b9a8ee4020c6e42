
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use test_harness::{staged_count, staging_dir, submit_in_order, test_config, ScriptedEngine};
use transcribe_lite::http::{router, AppState};
use transcribe_lite::scheduler::JobParams;
use transcribe_lite::service::TranscriptionService;

const BOUNDARY: &str = "transcribe-lite-test-boundary";

/// A multipart form part: (field name, optional file name, content).
type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file_name, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match file_name {
            Some(file_name) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
            }
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn transcription_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/audio/transcriptions")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn app(service: Arc<TranscriptionService>) -> Router {
    router(AppState {
        service,
        model_id: "iic/SenseVoiceSmall".to_string(),
    })
}

async fn started_app(raw: &str) -> (Router, tempfile::TempDir) {
    let dir = staging_dir();
    let (engine, _probe) = ScriptedEngine::always(raw);
    let service = TranscriptionService::start(engine, test_config(4, &dir))
        .await
        .unwrap();
    (app(Arc::new(service)), dir)
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _dir) = started_app("ok").await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["model"], "iic/SenseVoiceSmall");
    assert_eq!(json["queue_depth"], 0);
    assert_eq!(json["queue_capacity"], 4);
}

#[tokio::test]
async fn test_transcription_json() {
    let (app, dir) = started_app("<|zh|><|HAPPY|>你好   世界").await;

    let response = app
        .oneshot(transcription_request(&[
            ("file", Some("test.wav"), b"fake audio"),
            ("model", None, b"sensevoice-small"),
            ("language", None, b"zh"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert!(content_type.contains("application/json"));

    let json = body_json(response).await;
    assert_eq!(json["text"], "你好 世界");
    assert_eq!(json["task"], "transcribe");
    assert_eq!(json["language"], "zh");
    assert!(json["duration"].as_f64().unwrap() >= 0.0);
    assert!(json.get("raw_text").is_none());
    assert_eq!(staged_count(dir.path()), 0);
}

#[tokio::test]
async fn test_transcription_verbose_json_uncleaned() {
    let (app, _dir) = started_app("<|en|>raw   text").await;

    let response = app
        .oneshot(transcription_request(&[
            ("file", Some("test.mp3"), b"fake audio"),
            ("clean_tags", None, b"false"),
            ("response_format", None, b"verbose_json"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["text"], "<|en|>raw   text");
    assert_eq!(json["raw_text"], "<|en|>raw   text");
    assert_eq!(json["is_cleaned"], false);
    assert!(json["job_id"].as_str().is_some());
    assert_eq!(json["language"], "auto");

    let created = json["created"].as_i64().unwrap();
    let now = chrono::Utc::now().timestamp();
    assert!(created <= now && created >= now - 60);
}

#[tokio::test]
async fn test_unsupported_language_reported_as_auto() {
    let (app, _dir) = started_app("bonjour").await;

    let response = app
        .oneshot(transcription_request(&[
            ("file", Some("test.wav"), b"fake audio"),
            ("language", None, b"fr"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["language"], "auto");
    assert!(json.get("created").is_none());
}

#[tokio::test]
async fn test_models_endpoint() {
    let (app, _dir) = started_app("ok").await;

    let response = app
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["object"], "list");
    let models = json["data"].as_array().unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0]["id"], "iic/SenseVoiceSmall");
    assert_eq!(models[0]["object"], "model");
    assert!(models[0]["created"].as_i64().unwrap() > 0);
    assert!(models[0]["owned_by"].as_str().is_some());
}

#[tokio::test]
async fn test_transcription_text_format() {
    let (app, _dir) = started_app("<|en|>plain").await;

    let response = app
        .oneshot(transcription_request(&[
            ("file", Some("test.wav"), b"fake audio"),
            ("response_format", None, b"text"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"plain");
}

#[tokio::test]
async fn test_missing_file_is_bad_request() {
    let (app, _dir) = started_app("ok").await;

    let response = app
        .oneshot(transcription_request(&[("language", None, b"en")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("file"));
}

#[tokio::test]
async fn test_invalid_clean_tags_is_bad_request() {
    let (app, _dir) = started_app("ok").await;

    let response = app
        .oneshot(transcription_request(&[
            ("file", Some("test.wav"), b"fake audio"),
            ("clean_tags", None, b"sometimes"),
        ]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_full_queue_returns_service_unavailable() {
    let dir = staging_dir();
    let (service, _rx) = TranscriptionService::new(test_config(1, &dir)).unwrap();
    let service = Arc::new(service);
    let _pending = submit_in_order(&service, &dir, 1, JobParams::default()).await;

    let response = app(service.clone())
        .oneshot(transcription_request(&[("file", Some("test.wav"), b"fake audio")]))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("busy"));
    assert_eq!(staged_count(dir.path()), 1);
}

#[tokio::test]
async fn test_health_reports_stopping_after_shutdown() {
    let dir = staging_dir();
    let (engine, _probe) = ScriptedEngine::always("ok");
    let service = Arc::new(
        TranscriptionService::start(engine, test_config(2, &dir))
            .await
            .unwrap(),
    );
    service.shutdown().await;

    let response = app(service.clone())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = body_json(response).await;
    assert_eq!(json["status"], "stopping");

    let response = app(service)
        .oneshot(transcription_request(&[("file", Some("test.wav"), b"fake audio")]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
