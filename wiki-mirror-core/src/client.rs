//! HTTP implementation of [`WikiApi`] on top of the rate-limited [`Transport`].
//!
//! The bearer token obtained by [`WikiApi::authenticate`] is kept inside the
//! client value for the lifetime of the run and never written anywhere.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::config::{Credentials, TransportConfig};
use crate::contract::{ChildrenPage, WikiApi};
use crate::transport::{ApiRequest, Transport, TransportError};

const TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";
const CONTENT_PATH: &str = "/open-apis/docs/v1/content";
const CHILDREN_PAGE_SIZE: &str = "50";

pub struct WikiClient {
    transport: Transport,
    credentials: Credentials,
    space_id: String,
    token: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct TokenResponse {
    tenant_access_token: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ContentData {
    #[serde(default)]
    content: String,
}

impl WikiClient {
    pub fn new(
        transport_config: TransportConfig,
        credentials: Credentials,
        space_id: impl Into<String>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            transport: Transport::new(transport_config)?,
            credentials,
            space_id: space_id.into(),
            token: RwLock::new(None),
        })
    }

    async fn bearer(&self) -> Result<String, TransportError> {
        self.token
            .read()
            .await
            .clone()
            .ok_or(TransportError::Unauthenticated)
    }

    fn children_path(&self) -> String {
        format!("/open-apis/wiki/v2/spaces/{}/nodes", self.space_id)
    }
}

fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Result<T, TransportError> {
    serde_json::from_value(value).map_err(|e| TransportError::Decode {
        url: path.to_string(),
        message: e.to_string(),
    })
}

#[async_trait]
impl WikiApi for WikiClient {
    async fn authenticate(&self) -> Result<(), TransportError> {
        info!(app_id = %self.credentials.app_id, "Requesting tenant access token");
        let request = ApiRequest::post(
            TOKEN_PATH,
            json!({
                "app_id": self.credentials.app_id,
                "app_secret": self.credentials.app_secret,
            }),
        );
        let response = self.transport.send(&request).await.map_err(|e| {
            error!(error = %e, "Token acquisition failed");
            e
        })?;
        let token: TokenResponse = decode(TOKEN_PATH, response)?;
        *self.token.write().await = Some(token.tenant_access_token);
        info!("Tenant access token acquired");
        Ok(())
    }

    async fn list_children(
        &self,
        node_token: &str,
        page_token: Option<String>,
    ) -> Result<ChildrenPage, TransportError> {
        let path = self.children_path();
        let mut request = ApiRequest::get(path.clone())
            .query("parent_node_token", node_token)
            .query("page_size", CHILDREN_PAGE_SIZE)
            .bearer(self.bearer().await?);
        if let Some(page_token) = page_token {
            request = request.query("page_token", page_token);
        }
        let response = self.transport.send(&request).await?;
        let envelope: Envelope<ChildrenPage> = decode(&path, response)?;
        debug!(
            node_token,
            items = envelope.data.items.len(),
            has_more = envelope.data.has_more,
            "Listed children"
        );
        Ok(envelope.data)
    }

    async fn fetch_content(&self, obj_token: &str) -> Result<String, TransportError> {
        let request = ApiRequest::get(CONTENT_PATH)
            .query("doc_token", obj_token)
            .query("doc_type", "docx")
            .query("content_type", "markdown")
            .bearer(self.bearer().await?);
        let response = self.transport.send(&request).await?;
        let envelope: Envelope<ContentData> = decode(CONTENT_PATH, response)?;
        debug!(obj_token, bytes = envelope.data.content.len(), "Fetched document content");
        Ok(envelope.data.content)
    }
}
