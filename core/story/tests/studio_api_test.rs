use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use bookwright_assistant::{GenerateOptions, TextGenerator};
use bookwright_story::{router, AppState, Session};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::{NamedTempFile, TempDir};
use tower::ServiceExt;

/// Records every prompt and answers with a fixed reply
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl TextGenerator for RecordingGenerator {
    async fn generate(&self, prompt: &str, _options: Option<&GenerateOptions>) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Once upon a time".to_string())
    }
}

struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str, _options: Option<&GenerateOptions>) -> Result<String> {
        anyhow::bail!("Ollama API error 500 Internal Server Error: model not loaded")
    }
}

struct Studio {
    app: Router,
    generator: Arc<RecordingGenerator>,
    export_dir: TempDir,
    _db: NamedTempFile,
}

fn studio() -> Studio {
    let db = NamedTempFile::new().unwrap();
    let export_dir = TempDir::new().unwrap();
    let generator = Arc::new(RecordingGenerator::default());

    let session = Session::open(db.path()).unwrap();
    let state = AppState::new(session, generator.clone(), export_dir.path().to_path_buf());

    Studio {
        app: router(state),
        generator,
        export_dir,
        _db: db,
    }
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn seed(app: &Router) {
    for name in ["Lira", "Kael"] {
        let (status, _) = call(app, Method::PUT, "/characters", Some(json!({ "name": name }))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = call(
        app,
        Method::PUT,
        "/scenes",
        Some(json!({
            "title": "Meeting at Dawn",
            "location": "River bank",
            "characters": ["Lira", "Kael"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(
        app,
        Method::PUT,
        "/chapters",
        Some(json!({ "title": "Chapter One", "scenes": ["Meeting at Dawn"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_and_empty_stats() {
    let studio = studio();

    let (status, body) = call(&studio.app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (_, stats) = call(&studio.app, Method::GET, "/stats", None).await;
    assert_eq!(
        stats,
        json!({ "has_book": false, "characters": 0, "scenes": 0, "chapters": 0 })
    );
}

#[tokio::test]
async fn test_save_returns_status_message() {
    let studio = studio();

    let (status, body) = call(
        &studio.app,
        Method::PUT,
        "/characters",
        Some(json!({ "name": "Lira", "role": "Protagonist" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Saved new character: Lira");
    assert_eq!(body["data"]["role"], "Protagonist");

    let (_, body) = call(
        &studio.app,
        Method::PUT,
        "/characters",
        Some(json!({ "name": "Lira", "role": "Hero" })),
    )
    .await;
    assert_eq!(body["status"], "Updated character: Lira");

    let (_, body) = call(&studio.app, Method::GET, "/characters/Lira", None).await;
    assert_eq!(body["role"], "Hero");
}

#[tokio::test]
async fn test_error_status_codes() {
    let studio = studio();
    seed(&studio.app).await;

    // empty natural key
    let (status, body) = call(&studio.app, Method::PUT, "/characters", Some(json!({ "name": " " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["status"].as_str().unwrap().contains("must not be empty"));

    // unknown target of a mutation
    let (status, body) = call(
        &studio.app,
        Method::POST,
        "/chapters/Missing/scenes",
        Some(json!({ "titles": ["Meeting at Dawn"] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "Chapter not found: Missing");

    // reorder that is not a permutation
    let (status, _) = call(
        &studio.app,
        Method::PUT,
        "/chapters/Chapter%20One/order",
        Some(json!({ "titles": ["Meeting at Dawn", "Ghost Scene"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&studio.app, Method::GET, "/scenes/Nowhere", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_answers_with_status() {
    let studio = studio();

    let (status, body) = call(
        &studio.app,
        Method::PUT,
        "/characters",
        Some(json!({ "name": "Lira", "age": -3 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["status"].as_str().unwrap().contains("age"));

    let (status, body) = call(&studio.app, Method::POST, "/chat", Some(json!({ "focus": null }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["status"].is_string());

    let (_, stats) = call(&studio.app, Method::GET, "/stats", None).await;
    assert_eq!(stats["characters"], 0);
}

#[tokio::test]
async fn test_scene_membership_routes() {
    let studio = studio();
    seed(&studio.app).await;
    call(&studio.app, Method::PUT, "/characters", Some(json!({ "name": "Mira" }))).await;

    let (status, body) = call(
        &studio.app,
        Method::POST,
        "/scenes/Meeting%20at%20Dawn/characters",
        Some(json!({ "name": "Mira" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["characters"], json!(["Lira", "Kael", "Mira"]));

    let (status, body) = call(
        &studio.app,
        Method::PUT,
        "/scenes/Meeting%20at%20Dawn/characters/Mira",
        Some(json!({ "role": "Scout", "notes": "Keeps watch" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["character_roles"]["Mira"], "Scout");

    let (_, body) = call(&studio.app, Method::GET, "/characters/Mira/scenes", None).await;
    assert_eq!(body["scenes"][0]["scene_title"], "Meeting at Dawn");
    assert_eq!(body["scenes"][0]["notes"], "Keeps watch");

    let (_, body) = call(
        &studio.app,
        Method::DELETE,
        "/scenes/Meeting%20at%20Dawn/characters/Lira",
        None,
    )
    .await;
    assert_eq!(body["data"]["characters"], json!(["Kael", "Mira"]));

    let (_, body) = call(&studio.app, Method::POST, "/characters/Kael/new-scene", None).await;
    assert_eq!(body["data"]["title"], "New Scene with Kael");
}

#[tokio::test]
async fn test_delete_reports_cascade() {
    let studio = studio();
    seed(&studio.app).await;

    let (status, body) = call(&studio.app, Method::DELETE, "/scenes/Meeting%20at%20Dawn", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], true);
    assert_eq!(body["data"]["cascaded"], json!(["Chapter One"]));

    let (_, chapter) = call(&studio.app, Method::GET, "/chapters/Chapter%20One", None).await;
    assert_eq!(chapter["scenes"], json!([]));

    let (status, body) = call(&studio.app, Method::DELETE, "/characters/Nobody", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["removed"], false);
}

#[tokio::test]
async fn test_chat_includes_focus_context() {
    let studio = studio();
    seed(&studio.app).await;

    let (status, body) = call(
        &studio.app,
        Method::POST,
        "/chat",
        Some(json!({
            "message": "What does Kael want?",
            "focus": { "kind": "character", "key": "Kael" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], "Once upon a time");

    let prompts = studio.generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Current Character: Kael"));
    assert!(prompts[0].contains("Meeting at Dawn"));
    assert!(prompts[0].ends_with("User: What does Kael want?\nAssistant: "));
}

#[tokio::test]
async fn test_draft_uses_chapter_cast() {
    let studio = studio();
    seed(&studio.app).await;

    let (status, body) = call(
        &studio.app,
        Method::POST,
        "/chapters/Chapter%20One/draft",
        Some(json!({ "outline": "Lira meets Kael by the river." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "Drafted chapter Chapter One");

    let prompts = studio.generator.prompts.lock().unwrap();
    assert!(prompts[0].contains("titled 'Chapter One'"));
    assert!(prompts[0].contains("\nLira:\n"));
    assert!(prompts[0].contains("\nKael:\n"));
}

#[tokio::test]
async fn test_assistant_failure_is_bad_gateway() {
    let db = NamedTempFile::new().unwrap();
    let export_dir = TempDir::new().unwrap();
    let session = Session::open(db.path()).unwrap();
    let app = router(AppState::new(
        session,
        Arc::new(FailingGenerator),
        export_dir.path().to_path_buf(),
    ));

    let (status, body) = call(&app, Method::POST, "/chat", Some(json!({ "message": "Hello" }))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["status"].as_str().unwrap().contains("model not loaded"));
}

#[tokio::test]
async fn test_export_file_and_import() {
    let source = studio();
    seed(&source.app).await;

    let (status, body) = call(
        &source.app,
        Method::POST,
        "/export/file",
        Some(json!({ "prefix": "lost kingdom" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let path = body["data"]["path"].as_str().unwrap().to_string();
    assert!(path.contains("lost_kingdom_"));
    assert!(path.starts_with(source.export_dir.path().to_str().unwrap()));

    let (_, exported) = call(&source.app, Method::GET, "/export", None).await;
    assert_eq!(exported["book_info"], Value::Null);
    assert_eq!(exported["scenes"][0]["characters"], json!(["Lira", "Kael"]));

    // a second studio restores the export
    let target = studio();
    let (status, body) = call(&target.app, Method::POST, "/import", Some(exported.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["characters"], 2);

    let (_, restored) = call(&target.app, Method::GET, "/export", None).await;
    assert_eq!(restored["characters"], exported["characters"]);
    assert_eq!(restored["chapters"], exported["chapters"]);
}

#[tokio::test]
async fn test_shutdown_notifies_server() {
    let db = NamedTempFile::new().unwrap();
    let session = Session::open(db.path()).unwrap();
    let state = AppState::new(
        session,
        Arc::new(RecordingGenerator::default()),
        std::env::temp_dir(),
    );
    let shutdown = state.shutdown.clone();
    let app = router(state);

    let (status, _) = call(&app, Method::POST, "/shutdown", None).await;
    assert_eq!(status, StatusCode::OK);

    // the permit is stored until the server waits on it
    tokio::time::timeout(std::time::Duration::from_secs(1), shutdown.notified())
        .await
        .unwrap();
}
