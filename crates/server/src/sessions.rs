use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use shopper_agent::{ChatSession, IgnoreReason, RecommendationClient, SendOutcome, SessionSnapshot};
use shopper_core::{RecommendationResult, ShoppingContext};
use tracing::info;
use uuid::Uuid;

use crate::api::{error, ApiError, ApiResult, ApiState};

pub const DEFAULT_MAX_SESSIONS: usize = 1_000;
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(3_600);

struct SessionEntry {
    session: ChatSession,
    last_seen: Instant,
}

/// In-memory sessions keyed by id.
///
/// Sessions idle for longer than `idle_ttl` are dropped whenever a new one is
/// created, and the least recently used ones go first once `max_sessions` is
/// reached.
#[derive(Clone)]
pub struct SessionRegistry {
    client: RecommendationClient,
    initial_context: ShoppingContext,
    max_sessions: usize,
    idle_ttl: Duration,
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new(client: RecommendationClient, initial_context: ShoppingContext) -> Self {
        Self::with_limits(client, initial_context, DEFAULT_MAX_SESSIONS, DEFAULT_IDLE_TTL)
    }

    pub fn with_limits(
        client: RecommendationClient,
        initial_context: ShoppingContext,
        max_sessions: usize,
        idle_ttl: Duration,
    ) -> Self {
        Self {
            client,
            initial_context,
            max_sessions: max_sessions.max(1),
            idle_ttl,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn create(&self) -> (Uuid, ChatSession) {
        let id = Uuid::new_v4();
        let session = ChatSession::new(self.client.clone(), self.initial_context.clone());
        let now = Instant::now();

        let mut sessions = self.write();
        self.evict_locked(&mut sessions, now);
        sessions.insert(id, SessionEntry { session: session.clone(), last_seen: now });
        (id, session)
    }

    /// Looks a session up and marks it as used.
    pub fn get(&self, id: Uuid) -> Option<ChatSession> {
        let mut sessions = self.write();
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    pub fn remove(&self, id: Uuid) -> Option<ChatSession> {
        self.write().remove(&id).map(|entry| entry.session)
    }

    pub fn len(&self) -> usize {
        match self.sessions.read() {
            Ok(sessions) => sessions.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Drops idle sessions as of `now`. Returns how many were removed.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let mut sessions = self.write();
        self.evict_locked(&mut sessions, now)
    }

    fn evict_locked(&self, sessions: &mut HashMap<Uuid, SessionEntry>, now: Instant) -> usize {
        let before = sessions.len();
        sessions.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= self.idle_ttl);

        // Leave room for the session about to be inserted.
        while sessions.len() >= self.max_sessions {
            let Some(oldest) =
                sessions.iter().min_by_key(|(_, entry)| entry.last_seen).map(|(id, _)| *id)
            else {
                break;
            };
            sessions.remove(&oldest);
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(
                event_name = "api.session.evicted",
                evicted,
                remaining = sessions.len(),
                "idle chat sessions evicted"
            );
        }
        evicted
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, SessionEntry>> {
        match self.sessions.write() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub session: SessionSnapshot,
}

#[derive(Clone, Debug, Deserialize)]
pub struct MessageRequest {
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct MessageResponse {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<RecommendationResult>,
    pub session: SessionSnapshot,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ContextRequest {
    pub weather: String,
    pub location: Option<String>,
}

fn parse_id(id: &str) -> Result<Uuid, (StatusCode, Json<ApiError>)> {
    Uuid::parse_str(id.trim())
        .map_err(|_| error(StatusCode::BAD_REQUEST, format!("invalid session id `{id}`")))
}

fn lookup(state: &ApiState, id: &str) -> Result<ChatSession, (StatusCode, Json<ApiError>)> {
    let id = parse_id(id)?;
    state
        .sessions
        .get(id)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("session {id} not found")))
}

pub async fn create_session(
    State(state): State<ApiState>,
) -> (StatusCode, Json<SessionResponse>) {
    let (id, session) = state.sessions.create();
    info!(event_name = "api.session.created", session_id = %id, "chat session created");
    (StatusCode::CREATED, Json(SessionResponse { id, session: session.snapshot() }))
}

pub async fn get_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    Ok(Json(lookup(&state, &id)?.snapshot()))
}

pub async fn delete_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let id = parse_id(&id)?;
    if state.sessions.remove(id).is_none() {
        return Err(error(StatusCode::NOT_FOUND, format!("session {id} not found")));
    }
    info!(event_name = "api.session.deleted", session_id = %id, "chat session deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_message(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> ApiResult<MessageResponse> {
    let session = lookup(&state, &id)?;

    let (outcome, result) = match session.send_message(&request.text).await {
        SendOutcome::Completed(result) => ("completed", Some(result)),
        SendOutcome::Discarded => ("discarded", None),
        SendOutcome::Ignored(IgnoreReason::Empty) => {
            return Err(error(StatusCode::BAD_REQUEST, "message text must not be empty"));
        }
        SendOutcome::Ignored(IgnoreReason::Busy) => {
            return Err(error(
                StatusCode::CONFLICT,
                "a recommendation request is already in flight for this session",
            ));
        }
    };

    Ok(Json(MessageResponse { outcome, result, session: session.snapshot() }))
}

pub async fn clear_messages(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    let session = lookup(&state, &id)?;
    session.clear_chat();
    Ok(Json(session.snapshot()))
}

pub async fn update_context(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<ContextRequest>,
) -> ApiResult<SessionSnapshot> {
    let session = lookup(&state, &id)?;

    let weather = request.weather.trim();
    if weather.is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "weather must not be empty"));
    }
    let location = request
        .location
        .map(|location| location.trim().to_string())
        .filter(|location| !location.is_empty());

    session.update_context(weather, location);
    Ok(Json(session.snapshot()))
}
