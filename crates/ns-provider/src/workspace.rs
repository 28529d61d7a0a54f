//! Notion-compatible workspace client.

use async_trait::async_trait;
use ns_blueprint::EntityKind;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use serde_json::{Value, json};
use url::Url;

use crate::error::{ProviderError, ProviderErrorKind, ProviderResult};
use crate::http::{JsonTransport, header_value, response_id};
use crate::retry::RetryPolicy;
use crate::traits::{RemoteUser, WorkspaceProvider};

pub const DEFAULT_WORKSPACE_BASE_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";

/// The API accepts at most this many children per append request.
const MAX_CHILDREN_PER_REQUEST: usize = 100;
const PAGE_SIZE: &str = "100";

#[derive(Debug, Clone)]
pub struct WorkspaceClientConfig {
    pub token: String,
    pub base_url: String,
    pub notion_version: String,
    pub timeout_secs: f64,
    pub retry: RetryPolicy,
}

impl Default for WorkspaceClientConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            base_url: DEFAULT_WORKSPACE_BASE_URL.into(),
            notion_version: DEFAULT_NOTION_VERSION.into(),
            timeout_secs: 30.0,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotionClient {
    transport: JsonTransport,
    base_url: String,
}

impl NotionClient {
    pub fn new(config: WorkspaceClientConfig) -> ProviderResult<Self> {
        const PROVIDER: &str = "notion";
        if config.token.is_empty() {
            return Err(ProviderError::new(
                PROVIDER,
                ProviderErrorKind::Configuration,
                "workspace token is empty",
            ));
        }
        Url::parse(&config.base_url).map_err(|error| {
            ProviderError::new(
                PROVIDER,
                ProviderErrorKind::Configuration,
                format!("invalid base url '{}': {error}", config.base_url),
            )
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            header_value(PROVIDER, "authorization", &format!("Bearer {}", config.token))?,
        );
        headers.insert(
            "Notion-Version",
            header_value(PROVIDER, "Notion-Version", &config.notion_version)?,
        );
        let transport = JsonTransport::new(PROVIDER, headers, config.timeout_secs, config.retry)?;
        Ok(Self {
            transport,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Collection path for an entity kind; rows are pages inside a database.
    fn collection(&self, kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Page | EntityKind::Row => "/pages",
            EntityKind::Database => "/databases",
            EntityKind::Comment => "/comments",
        }
    }

    fn comment_unsupported(&self, operation: &str) -> ProviderError {
        ProviderError::new(
            self.transport.provider(),
            ProviderErrorKind::InvalidRequest,
            format!("comments do not support {operation}"),
        )
    }

    async fn list_child_ids(&self, remote_id: &str) -> ProviderResult<Vec<String>> {
        let url = self.endpoint(&format!("/blocks/{remote_id}/children"));
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let data = self
                .transport
                .send(|client| {
                    let mut request = client.get(&url).query(&[("page_size", PAGE_SIZE)]);
                    if let Some(cursor) = &cursor {
                        request = request.query(&[("start_cursor", cursor.as_str())]);
                    }
                    request
                })
                .await?;
            ids.extend(
                results(&data)
                    .iter()
                    .filter_map(|block| block.get("id").and_then(Value::as_str))
                    .map(str::to_string),
            );
            match next_cursor(&data) {
                Some(next) => cursor = Some(next),
                None => return Ok(ids),
            }
        }
    }
}

#[async_trait]
impl WorkspaceProvider for NotionClient {
    fn name(&self) -> &str {
        self.transport.provider()
    }

    async fn create_object(&self, kind: EntityKind, payload: &Value) -> ProviderResult<String> {
        let url = self.endpoint(self.collection(kind));
        let response = self
            .transport
            .send(|client| client.post(&url).json(payload))
            .await?;
        response_id(self.transport.provider(), &response)
    }

    async fn update_object(
        &self,
        kind: EntityKind,
        remote_id: &str,
        payload: &Value,
    ) -> ProviderResult<String> {
        if kind == EntityKind::Comment {
            return Err(self.comment_unsupported("updates"));
        }
        let url = self.endpoint(&format!("{}/{remote_id}", self.collection(kind)));
        let response = self
            .transport
            .send(|client| client.patch(&url).json(payload))
            .await?;
        Ok(response_id(self.transport.provider(), &response).unwrap_or_else(|_| remote_id.into()))
    }

    async fn append_blocks(&self, remote_id: &str, blocks: &[Value]) -> ProviderResult<()> {
        let url = self.endpoint(&format!("/blocks/{remote_id}/children"));
        for chunk in blocks.chunks(MAX_CHILDREN_PER_REQUEST) {
            let body = json!({ "children": chunk });
            self.transport
                .send(|client| client.patch(&url).json(&body))
                .await?;
        }
        Ok(())
    }

    async fn replace_blocks(&self, remote_id: &str, blocks: &[Value]) -> ProviderResult<()> {
        let existing = self.list_child_ids(remote_id).await?;
        tracing::debug!(remote_id, removed = existing.len(), added = blocks.len(), "replacing blocks");
        for child in existing {
            let url = self.endpoint(&format!("/blocks/{child}"));
            self.transport.send(|client| client.delete(&url)).await?;
        }
        self.append_blocks(remote_id, blocks).await
    }

    async fn archive_object(&self, kind: EntityKind, remote_id: &str) -> ProviderResult<()> {
        if kind == EntityKind::Comment {
            return Err(self.comment_unsupported("archiving"));
        }
        let url = self.endpoint(&format!("{}/{remote_id}", self.collection(kind)));
        let body = json!({ "archived": true });
        self.transport
            .send(|client| client.patch(&url).json(&body))
            .await?;
        Ok(())
    }

    async fn get_object(&self, kind: EntityKind, remote_id: &str) -> ProviderResult<Value> {
        if kind == EntityKind::Comment {
            return Err(self.comment_unsupported("lookups"));
        }
        let url = self.endpoint(&format!("{}/{remote_id}", self.collection(kind)));
        self.transport.send(|client| client.get(&url)).await
    }

    async fn list_users(&self) -> ProviderResult<Vec<RemoteUser>> {
        let url = self.endpoint("/users");
        let mut users = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let data = self
                .transport
                .send(|client| {
                    let mut request = client.get(&url).query(&[("page_size", PAGE_SIZE)]);
                    if let Some(cursor) = &cursor {
                        request = request.query(&[("start_cursor", cursor.as_str())]);
                    }
                    request
                })
                .await?;
            users.extend(results(&data).iter().filter_map(parse_user));
            match next_cursor(&data) {
                Some(next) => cursor = Some(next),
                None => return Ok(users),
            }
        }
    }
}

fn results(data: &Value) -> &[Value] {
    data.get("results")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn next_cursor(data: &Value) -> Option<String> {
    if !data.get("has_more").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    data.get("next_cursor")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn parse_user(value: &Value) -> Option<RemoteUser> {
    let id = value.get("id")?.as_str()?.to_string();
    let email = value
        .get("person")
        .and_then(|person| person.get("email"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(RemoteUser { id, email })
}
