//! HTTP control surface for the task registry.
//!
//! JSON request/response routes mirroring the dashboard contract: task CRUD,
//! status toggling, and guild/channel discovery. Validation failures map to
//! 400, unknown task ids to 404.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use sweepbot_engine::{ChannelDirectory, CreateTask, TaskRegistry};
use sweepbot_types::{ChannelRef, TaskError, TaskStatus};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    pub directory: Arc<dyn ChannelDirectory>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/api/tasks", get(handle_list_tasks).post(handle_create_task))
        .route("/api/tasks/{id}/delete", post(handle_delete_task))
        .route("/api/tasks/{id}/status", post(handle_update_status))
        .route("/api/guilds", get(handle_list_guilds))
        .route("/api/guilds/{guild_id}/channels", get(handle_list_channels))
        .with_state(state)
}

/// Error payload: `{"error": "..."}` with the matching status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        let status = match &err {
            TaskError::NotFound(_) => StatusCode::NOT_FOUND,
            TaskError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ if err.is_validation() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// GET /health
async fn handle_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/tasks — all tasks with derived liveness.
async fn handle_list_tasks(State(state): State<AppState>) -> Json<serde_json::Value> {
    let tasks = state.registry.list_tasks().await;
    Json(json!({ "tasks": tasks }))
}

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    channel_id: String,
    /// Cached display label; looked up from Discord when omitted.
    #[serde(default)]
    channel_name: Option<String>,
    start_time: String,
    day_of_week: String,
    timezone: String,
    #[serde(default)]
    status: Option<TaskStatus>,
}

/// POST /api/tasks — create a deletion task.
///
/// Body: channel_id, start_time ("HH:MM"), day_of_week ("Daily" or a weekday
/// name), timezone (IANA), optional channel_name and status.
async fn handle_create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let channel_name = match req.channel_name {
        Some(name) => name,
        None => state
            .directory
            .channel_name(&req.channel_id)
            .await
            .map_err(|e| ApiError::not_found(format!("Channel not found: {e}")))?,
    };

    let id = state
        .registry
        .create_task(CreateTask {
            channel: ChannelRef {
                id: req.channel_id,
                name: channel_name,
            },
            start_time: req.start_time,
            day_of_week: req.day_of_week,
            timezone: req.timezone,
            status: req.status.unwrap_or(TaskStatus::Active),
        })
        .await?;

    info!(task_id = %id, "task created via API");
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

/// POST /api/tasks/{id}/delete — cancel a task outright.
async fn handle_delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.cancel_task(&id).await?;
    Ok(Json(json!({ "deleted": id })))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: TaskStatus,
}

/// POST /api/tasks/{id}/status — activate or suspend a task.
async fn handle_update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.registry.set_status(&id, req.status).await?;
    Ok(Json(json!({ "id": id, "status": req.status })))
}

/// GET /api/guilds — guilds the bot is a member of.
async fn handle_list_guilds(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let guilds = state
        .directory
        .list_guilds()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(json!({ "guilds": guilds })))
}

/// GET /api/guilds/{guild_id}/channels — text channels of one guild.
async fn handle_list_channels(
    State(state): State<AppState>,
    Path(guild_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let channels = state
        .directory
        .list_channels(&guild_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(json!({ "channels": channels })))
}

#[cfg(test)]
mod tests {
    use super::*;

    use sweepbot_engine::{ChannelInfo, ChannelOps, ChannelProvider, GuildInfo, MessageRef, PurgeError};
    use sweepbot_store::TaskStore;

    struct EmptyChannel;

    #[async_trait::async_trait]
    impl ChannelOps for EmptyChannel {
        async fn history(&self, _limit: u8) -> Result<Vec<MessageRef>, PurgeError> {
            Ok(Vec::new())
        }
        async fn delete_messages(&self, _batch: &[MessageRef]) -> Result<(), PurgeError> {
            Ok(())
        }
        async fn delete_message(&self, _message: &MessageRef) -> Result<(), PurgeError> {
            Ok(())
        }
    }

    /// Fake Discord: one guild with one text channel, id "42".
    struct FakeDirectory;

    #[async_trait::async_trait]
    impl ChannelProvider for FakeDirectory {
        async fn resolve(&self, channel_id: &str) -> Option<Arc<dyn ChannelOps>> {
            (channel_id == "42").then(|| Arc::new(EmptyChannel) as Arc<dyn ChannelOps>)
        }
    }

    #[async_trait::async_trait]
    impl ChannelDirectory for FakeDirectory {
        async fn list_guilds(&self) -> anyhow::Result<Vec<GuildInfo>> {
            Ok(vec![GuildInfo {
                id: "1".into(),
                name: "test guild".into(),
            }])
        }
        async fn list_channels(&self, guild_id: &str) -> anyhow::Result<Vec<ChannelInfo>> {
            if guild_id == "1" {
                Ok(vec![ChannelInfo {
                    id: "42".into(),
                    name: "general".into(),
                }])
            } else {
                anyhow::bail!("unknown guild {guild_id}")
            }
        }
        async fn channel_name(&self, channel_id: &str) -> anyhow::Result<String> {
            if channel_id == "42" {
                Ok("general".into())
            } else {
                anyhow::bail!("unknown channel {channel_id}")
            }
        }
    }

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        let fake = Arc::new(FakeDirectory);
        let store = TaskStore::new(dir.path().join("tasks.json"));
        AppState {
            registry: Arc::new(TaskRegistry::new(store, fake.clone())),
            directory: fake,
        }
    }

    fn create_request() -> CreateTaskRequest {
        CreateTaskRequest {
            channel_id: "42".into(),
            channel_name: None,
            start_time: "09:00".into(),
            day_of_week: "Friday".into(),
            timezone: "Europe/Paris".into(),
            status: None,
        }
    }

    #[tokio::test]
    async fn test_health() {
        let resp = handle_health().await;
        assert_eq!(resp.0["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_resolves_channel_name() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let result = handle_create_task(State(state.clone()), Json(create_request())).await;
        assert!(result.is_ok());

        let tasks = state.registry.list_tasks().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task.channel.name, "general");
        assert!(tasks[0].running);
    }

    #[tokio::test]
    async fn test_create_unknown_channel_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let mut req = create_request();
        req.channel_id = "77".into();
        let err = handle_create_task(State(state), Json(req)).await.err().unwrap();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_invalid_start_time_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let mut req = create_request();
        req.start_time = "9am".into();
        let err = handle_create_task(State(state.clone()), Json(req)).await.err().unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(state.registry.list_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_invalid_timezone_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let mut req = create_request();
        req.timezone = "Europe/Atlantis".into();
        let err = handle_create_task(State(state), Json(req)).await.err().unwrap();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_task_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        handle_create_task(State(state.clone()), Json(create_request()))
            .await
            .ok()
            .unwrap();
        let id = state.registry.list_tasks().await[0].task.id.clone();

        let resp = handle_delete_task(State(state.clone()), Path(id)).await;
        assert!(resp.is_ok());
        assert!(state.registry.list_tasks().await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_task_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let err = handle_delete_task(State(state), Path("ghost".into()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        handle_create_task(State(state.clone()), Json(create_request()))
            .await
            .ok()
            .unwrap();
        let id = state.registry.list_tasks().await[0].task.id.clone();

        let resp = handle_update_status(
            State(state.clone()),
            Path(id.clone()),
            Json(UpdateStatusRequest {
                status: TaskStatus::Inactive,
            }),
        )
        .await;
        assert!(resp.is_ok());

        let tasks = state.registry.list_tasks().await;
        assert_eq!(tasks[0].task.status, TaskStatus::Inactive);
        assert!(!tasks[0].running);
    }

    #[tokio::test]
    async fn test_status_unknown_task_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let err = handle_update_status(
            State(state),
            Path("ghost".into()),
            Json(UpdateStatusRequest {
                status: TaskStatus::Active,
            }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_guild_and_channel_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let guilds = handle_list_guilds(State(state.clone())).await.unwrap();
        assert_eq!(guilds.0["guilds"][0]["name"], "test guild");

        let channels = handle_list_channels(State(state.clone()), Path("1".into()))
            .await
            .unwrap();
        assert_eq!(channels.0["channels"][0]["id"], "42");

        let err = handle_list_channels(State(state), Path("999".into()))
            .await
            .err()
            .unwrap();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_list_tasks_shape() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        handle_create_task(State(state.clone()), Json(create_request()))
            .await
            .ok()
            .unwrap();

        let resp = handle_list_tasks(State(state)).await;
        let task = &resp.0["tasks"][0];
        assert_eq!(task["channel_id"], "42");
        assert_eq!(task["day_of_week"], "Friday");
        assert_eq!(task["running"], true);
    }
}
