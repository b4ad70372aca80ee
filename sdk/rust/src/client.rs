use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {message}")]
    Api { status: StatusCode, message: String },
}

impl SdkError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SdkError::Api { status, .. } => Some(*status),
            SdkError::Http(e) => e.status(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub items: Vec<Value>,
    pub total: f64,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub user_id: String,
    pub items: Vec<Value>,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub ok: bool,
    pub service: String,
    /// Events are published once the broker bootstrap has finished.
    #[serde(default)]
    pub broker_connected: bool,
    /// Orders only.
    #[serde(default)]
    pub breaker: Option<String>,
    /// Orders only.
    #[serde(default)]
    pub cached_entities: Option<usize>,
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, SdkError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }

    let text = resp.text().await?;
    let message = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(text);
    Err(SdkError::Api { status, message })
}

fn trimmed(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

pub struct UsersClient {
    client: Client,
    base_url: String,
}

impl UsersClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trimmed(base_url),
        }
    }

    pub async fn list(&self) -> Result<Vec<User>, SdkError> {
        decode(self.client.get(format!("{}/", self.base_url)).send().await?).await
    }

    pub async fn get(&self, id: &str) -> Result<User, SdkError> {
        decode(self.client.get(format!("{}/{}", self.base_url, id)).send().await?).await
    }

    pub async fn create(&self, user: &NewUser) -> Result<User, SdkError> {
        decode(self.client.post(format!("{}/", self.base_url)).json(user).send().await?).await
    }

    pub async fn update(&self, id: &str, user: &NewUser) -> Result<User, SdkError> {
        decode(self.client.put(format!("{}/{}", self.base_url, id)).json(user).send().await?).await
    }

    pub async fn health(&self) -> Result<ServiceHealth, SdkError> {
        decode(self.client.get(format!("{}/health", self.base_url)).send().await?).await
    }
}

pub struct OrdersClient {
    client: Client,
    base_url: String,
}

impl OrdersClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: trimmed(base_url),
        }
    }

    pub async fn list(&self) -> Result<Vec<Order>, SdkError> {
        decode(self.client.get(format!("{}/", self.base_url)).send().await?).await
    }

    pub async fn get(&self, id: &str) -> Result<Order, SdkError> {
        decode(self.client.get(format!("{}/{}", self.base_url, id)).send().await?).await
    }

    /// Place an order; fails with 400 for an unknown user, 503 if the
    /// users service is down and the user is not cached.
    pub async fn create(&self, order: &NewOrder) -> Result<Order, SdkError> {
        decode(self.client.post(format!("{}/", self.base_url)).json(order).send().await?).await
    }

    pub async fn cancel(&self, id: &str) -> Result<Order, SdkError> {
        decode(self.client.patch(format!("{}/{}/cancel", self.base_url, id)).send().await?).await
    }

    pub async fn health(&self) -> Result<ServiceHealth, SdkError> {
        decode(self.client.get(format!("{}/health", self.base_url)).send().await?).await
    }
}
