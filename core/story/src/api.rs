use axum::{
    extract::{rejection::JsonRejection, FromRequest, Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use bookwright_assistant::{PromptRenderer, TextGenerator};
use bookwright_schemas::{
    Book, Chapter, Character, ChatRequest, ChatResponse, DraftRequest, EntityKind,
    ExportFileRequest, MemberRequest, Scene, SceneDetailsRequest, StorySnapshot, StoryStats,
    TitlesRequest,
};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::error::StoryError;
use crate::export;
use crate::session::{Deletion, Outcome, Session};

#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Mutex<Session>>,
    pub assistant: Arc<dyn TextGenerator>,
    pub renderer: Arc<PromptRenderer>,
    pub export_dir: PathBuf,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(session: Session, assistant: Arc<dyn TextGenerator>, export_dir: PathBuf) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            assistant,
            renderer: Arc::new(PromptRenderer::new()),
            export_dir,
            shutdown: Arc::new(Notify::new()),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Failure of a studio request, answered as `{ "status": <message> }`
#[derive(Debug)]
pub enum ApiError {
    Story(StoryError),
    Body(JsonRejection),
    Assistant(anyhow::Error),
}

impl From<StoryError> for ApiError {
    fn from(err: StoryError) -> Self {
        ApiError::Story(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Body(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (code, message) = match self {
            ApiError::Story(err) => {
                let code = match err {
                    StoryError::Validation(_) => StatusCode::BAD_REQUEST,
                    StoryError::UnknownRecord { .. } => StatusCode::NOT_FOUND,
                    StoryError::Storage(_)
                    | StoryError::Serialization(_)
                    | StoryError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if code == StatusCode::INTERNAL_SERVER_ERROR {
                    error!("Request failed: {}", err);
                } else {
                    warn!("Request rejected: {}", err);
                }
                (code, err.to_string())
            }
            ApiError::Body(rejection) => {
                warn!("Request body rejected: {}", rejection.body_text());
                (StatusCode::BAD_REQUEST, rejection.body_text())
            }
            ApiError::Assistant(err) => {
                error!("Assistant call failed: {:#}", err);
                (StatusCode::BAD_GATEWAY, format!("Assistant error: {:#}", err))
            }
        };

        (code, Json(json!({ "status": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// JSON request body; a body that fails to parse is answered like any other `ApiError`
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct ApiJson<T>(T);

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/book", get(get_book).put(save_book))

        // Characters
        .route("/characters", get(list_characters).put(save_character))
        .route("/characters/:name", get(get_character).delete(delete_character))
        .route("/characters/:name/scenes", get(character_scenes))
        .route("/characters/:name/new-scene", post(add_to_new_scene))

        // Scenes and their members
        .route("/scenes", get(list_scenes).put(save_scene))
        .route("/scenes/:title", get(get_scene).delete(delete_scene))
        .route("/scenes/:title/characters", post(add_scene_member))
        .route(
            "/scenes/:title/characters/:name",
            put(set_member_details).delete(remove_scene_member),
        )

        // Chapters and their scenes
        .route("/chapters", get(list_chapters).put(save_chapter))
        .route("/chapters/:title", get(get_chapter).delete(delete_chapter))
        .route("/chapters/:title/scenes", post(assign_scenes))
        .route("/chapters/:title/scenes/:scene", delete(remove_chapter_scene))
        .route("/chapters/:title/order", put(reorder_chapter))
        .route("/chapters/:title/draft", post(draft_chapter))

        // Export and assistant
        .route("/export", get(get_export))
        .route("/export/file", post(export_file))
        .route("/import", post(import_snapshot))
        .route("/chat", post(chat))
        .route("/shutdown", post(shutdown))

        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "service": "studio",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(session.working_set().stats())
}

// ========== BOOK ==========

async fn get_book(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(json!({ "book": session.working_set().book() }))
}

async fn save_book(
    State(state): State<AppState>,
    ApiJson(book): ApiJson<Book>,
) -> ApiResult<Outcome<Book>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.save_book(book)?))
}

// ========== CHARACTERS ==========

async fn list_characters(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(json!({ "characters": session.working_set().characters() }))
}

async fn get_character(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Character> {
    let session = state.session.lock().await;
    session
        .working_set()
        .find_character(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| StoryError::unknown(EntityKind::Character, name).into())
}

async fn save_character(
    State(state): State<AppState>,
    ApiJson(character): ApiJson<Character>,
) -> ApiResult<Outcome<Character>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.save_character(character)?))
}

async fn delete_character(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Outcome<Deletion>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.delete_character(&name)?))
}

async fn character_scenes(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.session.lock().await;
    if session.working_set().find_character(&name).is_none() {
        return Err(StoryError::unknown(EntityKind::Character, name).into());
    }

    Ok(Json(json!({ "scenes": session.character_appearances(&name) })))
}

async fn add_to_new_scene(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Outcome<Scene>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.add_character_to_new_scene(&name)?))
}

// ========== SCENES ==========

async fn list_scenes(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(json!({ "scenes": session.working_set().scenes() }))
}

async fn get_scene(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> ApiResult<Scene> {
    let session = state.session.lock().await;
    session
        .working_set()
        .find_scene(&title)
        .cloned()
        .map(Json)
        .ok_or_else(|| StoryError::unknown(EntityKind::Scene, title).into())
}

async fn save_scene(
    State(state): State<AppState>,
    ApiJson(scene): ApiJson<Scene>,
) -> ApiResult<Outcome<Scene>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.save_scene(scene)?))
}

async fn delete_scene(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> ApiResult<Outcome<Deletion>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.delete_scene(&title)?))
}

async fn add_scene_member(
    State(state): State<AppState>,
    Path(title): Path<String>,
    ApiJson(request): ApiJson<MemberRequest>,
) -> ApiResult<Outcome<Scene>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.add_character_to_scene(&title, &request.name)?))
}

async fn remove_scene_member(
    State(state): State<AppState>,
    Path((title, name)): Path<(String, String)>,
) -> ApiResult<Outcome<Scene>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.remove_character_from_scene(&title, &name)?))
}

async fn set_member_details(
    State(state): State<AppState>,
    Path((title, name)): Path<(String, String)>,
    ApiJson(request): ApiJson<SceneDetailsRequest>,
) -> ApiResult<Outcome<Scene>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.set_character_scene_details(
        &title,
        &name,
        &request.role,
        &request.notes,
    )?))
}

// ========== CHAPTERS ==========

async fn list_chapters(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.session.lock().await;
    Json(json!({ "chapters": session.working_set().chapters() }))
}

async fn get_chapter(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> ApiResult<Chapter> {
    let session = state.session.lock().await;
    session
        .working_set()
        .find_chapter(&title)
        .cloned()
        .map(Json)
        .ok_or_else(|| StoryError::unknown(EntityKind::Chapter, title).into())
}

async fn save_chapter(
    State(state): State<AppState>,
    ApiJson(chapter): ApiJson<Chapter>,
) -> ApiResult<Outcome<Chapter>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.save_chapter(chapter)?))
}

async fn delete_chapter(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> ApiResult<Outcome<Deletion>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.delete_chapter(&title)?))
}

async fn assign_scenes(
    State(state): State<AppState>,
    Path(title): Path<String>,
    ApiJson(request): ApiJson<TitlesRequest>,
) -> ApiResult<Outcome<Chapter>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.assign_scenes(&title, &request.titles)?))
}

async fn remove_chapter_scene(
    State(state): State<AppState>,
    Path((title, scene)): Path<(String, String)>,
) -> ApiResult<Outcome<Chapter>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.remove_scene_from_chapter(&title, &scene)?))
}

async fn reorder_chapter(
    State(state): State<AppState>,
    Path(title): Path<String>,
    ApiJson(request): ApiJson<TitlesRequest>,
) -> ApiResult<Outcome<Chapter>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.reorder_chapter(&title, &request.titles)?))
}

// ========== ASSISTANT ==========

async fn draft_chapter(
    State(state): State<AppState>,
    Path(title): Path<String>,
    ApiJson(request): ApiJson<DraftRequest>,
) -> ApiResult<Outcome<ChatResponse>> {
    if request.outline.trim().is_empty() {
        return Err(StoryError::validation("Chapter outline must not be empty").into());
    }

    let prompt = {
        let session = state.session.lock().await;
        let (chapter, cast) = session.chapter_cast(&title)?;
        state
            .renderer
            .chapter_draft_prompt(&chapter.title, &request.outline, &cast)
    };

    info!("Requesting draft for chapter {}", title);
    let reply = state
        .assistant
        .generate(&prompt, request.options.as_ref())
        .await
        .map_err(ApiError::Assistant)?;

    Ok(Json(Outcome::new(
        format!("Drafted chapter {}", title.trim()),
        ChatResponse { reply },
    )))
}

async fn chat(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResult<ChatResponse> {
    if request.message.trim().is_empty() {
        return Err(StoryError::validation("Chat message must not be empty").into());
    }

    // the lock is released before the assistant call
    let prompt = {
        let session = state.session.lock().await;
        let context = session.chat_context(request.focus.as_ref())?;
        state.renderer.chat_prompt(&context, &request.message)
    };

    let reply = state
        .assistant
        .generate(&prompt, request.options.as_ref())
        .await
        .map_err(ApiError::Assistant)?;

    Ok(Json(ChatResponse { reply }))
}

// ========== EXPORT / IMPORT ==========

async fn get_export(State(state): State<AppState>) -> Json<StorySnapshot> {
    let session = state.session.lock().await;
    Json(session.snapshot())
}

async fn export_file(
    State(state): State<AppState>,
    request: Option<Json<ExportFileRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let prefix = request.and_then(|Json(r)| r.prefix).unwrap_or_default();

    let session = state.session.lock().await;
    let doc = session.snapshot();
    let path = export::write_snapshot(&state.export_dir, &prefix, &doc)?;

    Ok(Json(Outcome::new(
        format!("Story exported to {}", path.display()),
        json!({ "path": path }),
    )))
}

async fn import_snapshot(
    State(state): State<AppState>,
    ApiJson(doc): ApiJson<StorySnapshot>,
) -> ApiResult<Outcome<StoryStats>> {
    let mut session = state.session.lock().await;
    Ok(Json(session.import_snapshot(doc)?))
}

async fn shutdown(State(state): State<AppState>) -> impl IntoResponse {
    info!("Shutdown requested");
    state.shutdown.notify_one();
    Json(json!({ "status": "Shutting down" }))
}
