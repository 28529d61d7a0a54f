//! Microsoft Graph directory client using OAuth client credentials.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use url::Url;

use crate::error::{ProviderError, ProviderErrorKind, ProviderResult};
use crate::http::JsonTransport;
use crate::retry::RetryPolicy;
use crate::traits::{DirectoryObject, DirectoryProvider, NewDirectoryGroup, NewDirectoryUser};

pub const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DirectoryClientConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub authority_url: String,
    pub graph_base_url: String,
    pub timeout_secs: f64,
    pub retry: RetryPolicy,
}

impl Default for DirectoryClientConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            authority_url: DEFAULT_AUTHORITY_URL.into(),
            graph_base_url: DEFAULT_GRAPH_BASE_URL.into(),
            timeout_secs: 30.0,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct GraphClient {
    transport: JsonTransport,
    config: DirectoryClientConfig,
    token: Mutex<Option<CachedToken>>,
}

impl GraphClient {
    pub fn new(config: DirectoryClientConfig) -> ProviderResult<Self> {
        const PROVIDER: &str = "entra";
        for (name, value) in [
            ("tenant id", &config.tenant_id),
            ("client id", &config.client_id),
            ("client secret", &config.client_secret),
        ] {
            if value.is_empty() {
                return Err(ProviderError::new(
                    PROVIDER,
                    ProviderErrorKind::Configuration,
                    format!("directory {name} is empty"),
                ));
            }
        }
        for url in [&config.authority_url, &config.graph_base_url] {
            Url::parse(url).map_err(|error| {
                ProviderError::new(
                    PROVIDER,
                    ProviderErrorKind::Configuration,
                    format!("invalid url '{url}': {error}"),
                )
            })?;
        }
        let transport = JsonTransport::new(
            PROVIDER,
            HeaderMap::new(),
            config.timeout_secs,
            config.retry.clone(),
        )?;
        Ok(Self {
            transport,
            config,
            token: Mutex::new(None),
        })
    }

    fn graph_url(&self, path: &str) -> String {
        format!("{}{}", self.config.graph_base_url.trim_end_matches('/'), path)
    }

    async fn access_token(&self) -> ProviderResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.access_token.clone());
            }
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.authority_url.trim_end_matches('/'),
            self.config.tenant_id
        );
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("scope", GRAPH_SCOPE),
            ("grant_type", "client_credentials"),
        ];
        let response = self
            .transport
            .send(|client| client.post(&url).form(&form))
            .await?;
        let access_token = response
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ProviderError::new(
                    self.transport.provider(),
                    ProviderErrorKind::Authentication,
                    "token response is missing access_token",
                )
            })?
            .to_string();
        let expires_in = response
            .get("expires_in")
            .and_then(Value::as_u64)
            .unwrap_or(3600);
        tracing::debug!(expires_in, "acquired directory access token");
        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(expires_in),
        });
        Ok(access_token)
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> ProviderResult<Value> {
        let token = self.access_token().await?;
        let url = self.graph_url(path);
        self.transport
            .send(|client| client.get(&url).bearer_auth(&token).query(query))
            .await
    }

    async fn post(&self, path: &str, body: &Value) -> ProviderResult<Value> {
        let token = self.access_token().await?;
        let url = self.graph_url(path);
        self.transport
            .send(|client| client.post(&url).bearer_auth(&token).json(body))
            .await
    }

    async fn find_first(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> ProviderResult<Option<DirectoryObject>> {
        let filter = format!("{field} eq '{}'", value.replace('\'', "''"));
        let data = self.get(collection, &[("$filter", filter)]).await?;
        Ok(data
            .get("value")
            .and_then(Value::as_array)
            .and_then(|values| values.first())
            .map(|first| directory_object(self.transport.provider(), first))
            .transpose()?)
    }
}

#[async_trait]
impl DirectoryProvider for GraphClient {
    fn name(&self) -> &str {
        self.transport.provider()
    }

    async fn find_user_by_principal(&self, upn: &str) -> ProviderResult<Option<DirectoryObject>> {
        self.find_first("/users", "userPrincipalName", upn).await
    }

    async fn create_user(&self, user: &NewDirectoryUser) -> ProviderResult<DirectoryObject> {
        let body = json!({
            "accountEnabled": true,
            "displayName": user.display_name,
            "mailNickname": user.mail_nickname,
            "userPrincipalName": user.user_principal_name,
            "givenName": user.given_name,
            "surname": user.surname,
            "jobTitle": user.job_title,
            "department": user.department,
            "officeLocation": user.office_location,
            "passwordProfile": {
                "forceChangePasswordNextSignIn": true,
                "password": user.password,
            },
        });
        let created = self.post("/users", &body).await?;
        directory_object(self.transport.provider(), &created)
    }

    async fn find_group_by_name(&self, name: &str) -> ProviderResult<Option<DirectoryObject>> {
        self.find_first("/groups", "displayName", name).await
    }

    async fn create_group(&self, group: &NewDirectoryGroup) -> ProviderResult<DirectoryObject> {
        let body = json!({
            "displayName": group.display_name,
            "description": group.description,
            "mailEnabled": false,
            "mailNickname": group.mail_nickname,
            "securityEnabled": true,
        });
        let created = self.post("/groups", &body).await?;
        directory_object(self.transport.provider(), &created)
    }

    async fn add_group_member(&self, group_id: &str, user_id: &str) -> ProviderResult<()> {
        let body = json!({
            "@odata.id": self.graph_url(&format!("/directoryObjects/{user_id}")),
        });
        self.post(&format!("/groups/{group_id}/members/$ref"), &body)
            .await?;
        Ok(())
    }
}

fn directory_object(provider: &str, value: &Value) -> ProviderResult<DirectoryObject> {
    let id = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::decode(provider, "directory object is missing 'id'"))?;
    Ok(DirectoryObject {
        id: id.to_string(),
        display_name: value
            .get("displayName")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Mail nickname derived from a group display name: no spaces, lower case,
/// at most 40 characters.
pub fn group_mail_nickname(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .take(40)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_credentials_are_configuration_errors() {
        let err = GraphClient::new(DirectoryClientConfig {
            tenant_id: "t".into(),
            client_id: "c".into(),
            ..DirectoryClientConfig::default()
        })
        .expect_err("empty secret");
        assert_eq!(err.kind, ProviderErrorKind::Configuration);
        assert!(err.message.contains("client secret"));
    }

    #[test]
    fn mail_nickname_strips_spaces_and_truncates() {
        assert_eq!(group_mail_nickname("SYNTH Acme Platform"), "synthacmeplatform");
        let long = "X".repeat(60);
        assert_eq!(group_mail_nickname(&long).len(), 40);
    }

    #[test]
    fn directory_object_requires_id() {
        let ok = directory_object("entra", &json!({"id": "g1", "displayName": "Team"}))
            .expect("object");
        assert_eq!(ok.display_name.as_deref(), Some("Team"));
        assert!(directory_object("entra", &json!({})).is_err());
    }
}
