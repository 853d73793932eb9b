//! HTTP implementation of [`GraphStore`].
//!
//! Wraps `reqwest` with bearer-token lifecycle management and bounded
//! retry. All list endpoints are cursor-paginated; mutation endpoints
//! return the assigned identifier.

use crate::error::{ClientError, ClientResult};
use crate::store::{GraphStore, RemoteEntity, RemoteRelation, RemoteRelationType};
use async_trait::async_trait;
use graft_types::RemoteId;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Safety margin subtracted from the server-reported token lifetime, so
/// a token is refreshed before it actually expires mid-call.
const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

/// Configuration for the HTTP graph store client.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Base URL of the graph store API, without a trailing slash.
    pub base_url: String,
    /// Account used for token acquisition.
    pub username: String,
    pub password: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Maximum number of retry attempts per call.
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry).
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct EntityPage {
    entities: Vec<RemoteEntity>,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct RelationTypePage {
    relation_types: Vec<RemoteRelationType>,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct RelationPage {
    relations: Vec<RemoteRelation>,
    next_cursor: Option<String>,
}

#[derive(Deserialize)]
struct IdResponse {
    id: RemoteId,
}

/// Session token state shared by all in-flight calls.
///
/// `generation` counts successful refreshes; a worker that observed a
/// 401 hands back the generation it used, and the refresh path only
/// hits the network if no other worker refreshed in the meantime.
/// A failed refresh poisons the session: remaining calls fail fast
/// with an auth error instead of re-attempting the refresh.
#[derive(Debug, Default)]
struct TokenState {
    token: Option<String>,
    expires_at: Option<Instant>,
    generation: u64,
    poisoned: bool,
}

impl TokenState {
    fn usable(&self) -> Option<String> {
        let token = self.token.as_ref()?;
        if self.expires_at.is_some_and(|at| Instant::now() >= at) {
            return None;
        }
        Some(token.clone())
    }
}

/// HTTP graph store client.
pub struct HttpGraphStore {
    config: StoreConfig,
    client: Client,
    token: RwLock<TokenState>,
}

impl HttpGraphStore {
    /// Creates a client; no network traffic happens until the first
    /// call.
    pub fn new(config: StoreConfig) -> ClientResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            client,
            token: RwLock::new(TokenState::default()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Returns a usable token and its generation, acquiring or
    /// refreshing one when needed.
    async fn current_token(&self) -> ClientResult<(String, u64)> {
        let observed = {
            let state = self.token.read().await;
            if state.poisoned {
                return Err(ClientError::Auth("session poisoned by earlier refresh failure".to_string()));
            }
            if let Some(token) = state.usable() {
                return Ok((token, state.generation));
            }
            state.generation
        };
        self.refresh_token(observed).await
    }

    /// Refreshes the session token, single-flight across workers.
    ///
    /// Workers racing here all block on the write lock; whoever wins
    /// performs the network call, and the rest observe a bumped
    /// generation and reuse the fresh token without re-authenticating.
    async fn refresh_token(&self, observed: u64) -> ClientResult<(String, u64)> {
        let mut state = self.token.write().await;
        if state.poisoned {
            return Err(ClientError::Auth("session poisoned by earlier refresh failure".to_string()));
        }
        if state.generation != observed
            && let Some(token) = state.usable()
        {
            return Ok((token, state.generation));
        }

        debug!("requesting session token");
        match self.request_token().await {
            Ok(response) => {
                let expires_at = response.expires_in.map(|secs| {
                    Instant::now() + Duration::from_secs(secs.saturating_sub(TOKEN_EXPIRY_MARGIN_SECS))
                });
                state.token = Some(response.token.clone());
                state.expires_at = expires_at;
                state.generation += 1;
                Ok((response.token, state.generation))
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, poisoning session");
                state.poisoned = true;
                Err(e)
            }
        }
    }

    async fn request_token(&self) -> ClientResult<TokenResponse> {
        let request = TokenRequest {
            username: &self.config.username,
            password: &self.config.password,
        };
        let response = self
            .client
            .post(self.url("/auth/token"))
            .json(&request)
            .send()
            .await
            .map_err(|e| ClientError::Auth(format!("token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Auth(format!("token request failed: HTTP {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::Auth(format!("failed to parse token response: {e}")))
    }

    /// Sends one authenticated request with re-auth and bounded retry.
    ///
    /// A 401 triggers exactly one re-authentication followed by one
    /// retry of the call; a second 401 surfaces as an auth error.
    /// Transport errors, 5xx, and 429 back off exponentially up to
    /// `max_retries`; other 4xx fail immediately.
    async fn send<R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> ClientResult<R> {
        let mut backoff = self.config.initial_backoff;
        let mut reauthenticated = false;
        let mut attempt: u32 = 0;

        loop {
            let (token, generation) = self.current_token().await?;
            let mut request = self
                .client
                .request(method.clone(), self.url(path))
                .bearer_auth(&token);
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let failure = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<R>().await.map_err(|e| {
                            ClientError::Network(format!("invalid response body: {e}"))
                        });
                    }
                    let message = response.text().await.unwrap_or_default();
                    ClientError::Api {
                        status: status.as_u16(),
                        message,
                    }
                }
                Err(e) => ClientError::Network(e.to_string()),
            };

            if failure.is_auth() {
                if reauthenticated {
                    return Err(ClientError::Auth(format!("still unauthorized after re-authentication: {failure}")));
                }
                warn!(path, "unauthorized, re-authenticating once");
                self.refresh_token(generation).await?;
                reauthenticated = true;
                continue;
            }

            if !failure.is_retriable() {
                return Err(failure);
            }
            attempt += 1;
            if attempt > self.config.max_retries {
                return Err(ClientError::RetriesExhausted {
                    attempts: attempt,
                    last: failure.to_string(),
                });
            }
            debug!(path, attempt, max = self.config.max_retries, wait_ms = backoff.as_millis() as u64, "retrying after transient failure");
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(self.config.max_backoff);
        }
    }
}

#[async_trait]
impl GraphStore for HttpGraphStore {
    async fn authenticate(&self) -> ClientResult<()> {
        self.current_token().await.map(|_| ())
    }

    async fn list_entities(&self) -> ClientResult<Vec<RemoteEntity>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![("active", "true".to_string())];
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }
            let page: EntityPage = self.send(Method::GET, "/entities", &query, None).await?;
            all.extend(page.entities);
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        debug!(count = all.len(), "listed active entities");
        Ok(all)
    }

    async fn list_relation_types(&self) -> ClientResult<Vec<RemoteRelationType>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = Vec::new();
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }
            let page: RelationTypePage =
                self.send(Method::GET, "/relation-types", &query, None).await?;
            all.extend(page.relation_types);
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        debug!(count = all.len(), "listed relation types");
        Ok(all)
    }

    async fn list_relations(&self) -> ClientResult<Vec<RemoteRelation>> {
        let mut all = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = Vec::new();
            if let Some(cursor) = &cursor {
                query.push(("cursor", cursor.clone()));
            }
            let page: RelationPage = self.send(Method::GET, "/relations", &query, None).await?;
            all.extend(page.relations);
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        debug!(count = all.len(), "listed relation instances");
        Ok(all)
    }

    async fn create_entity(
        &self,
        entity_type: &str,
        properties: &BTreeMap<String, String>,
    ) -> ClientResult<RemoteId> {
        let body = serde_json::json!({
            "entity_type": entity_type,
            "properties": properties,
        });
        let response: IdResponse = self
            .send(Method::POST, "/entities", &[], Some(&body))
            .await?;
        Ok(response.id)
    }

    async fn update_entity(
        &self,
        id: &RemoteId,
        properties: &BTreeMap<String, String>,
        version: Option<&str>,
    ) -> ClientResult<RemoteId> {
        let mut body = serde_json::json!({ "properties": properties });
        if let Some(version) = version {
            body["version"] = serde_json::Value::String(version.to_string());
        }
        let response: IdResponse = self
            .send(Method::PUT, &format!("/entities/{id}"), &[], Some(&body))
            .await?;
        Ok(response.id)
    }

    async fn create_relation_type(
        &self,
        name: &str,
        source_type: &str,
        target_type: &str,
    ) -> ClientResult<RemoteId> {
        let body = serde_json::json!({
            "name": name,
            "source_type": source_type,
            "target_type": target_type,
        });
        let response: IdResponse = self
            .send(Method::POST, "/relation-types", &[], Some(&body))
            .await?;
        Ok(response.id)
    }

    async fn create_relation(
        &self,
        relation_type: &RemoteId,
        source: &RemoteId,
        target: &RemoteId,
        properties: &BTreeMap<String, String>,
    ) -> ClientResult<RemoteId> {
        let body = serde_json::json!({
            "relation_type_id": relation_type,
            "source_id": source,
            "target_id": target,
            "properties": properties,
        });
        let response: IdResponse = self
            .send(Method::POST, "/relations", &[], Some(&body))
            .await?;
        Ok(response.id)
    }

    async fn update_relation(
        &self,
        id: &RemoteId,
        properties: &BTreeMap<String, String>,
    ) -> ClientResult<RemoteId> {
        let body = serde_json::json!({ "properties": properties });
        let response: IdResponse = self
            .send(Method::PUT, &format!("/relations/{id}"), &[], Some(&body))
            .await?;
        Ok(response.id)
    }
}
