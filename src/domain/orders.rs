//! Order records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::{Entity, InputError};
use crate::store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Created,
    Cancelled,
}

/// An order placed against a user owned by the users service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub items: Vec<Value>,
    pub total: f64,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

/// Raw create body. Kept loosely typed so shape errors surface as 400s.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderInput {
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub items: Option<Value>,
    #[serde(default)]
    pub total: Option<Value>,
}

/// Validated order fields.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub user_id: String,
    pub items: Vec<Value>,
    pub total: f64,
}

impl OrderInput {
    pub fn validate(self) -> Result<NewOrder, InputError> {
        const REQUIRED: InputError = InputError("userId, items[] and numeric total are required");

        let user_id = match self.user_id {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            _ => return Err(REQUIRED),
        };
        let items = match self.items {
            Some(Value::Array(items)) => items,
            _ => return Err(REQUIRED),
        };
        let total = match self.total.as_ref().and_then(Value::as_f64) {
            Some(total) => total,
            None => return Err(REQUIRED),
        };

        Ok(NewOrder { user_id, items, total })
    }
}

impl Order {
    pub fn new(order: NewOrder) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: order.user_id,
            items: order.items,
            total: order.total,
            status: OrderStatus::Created,
            created_at: Utc::now(),
        }
    }
}

impl Entity for Order {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Order {
    type Patch = OrderStatus;

    fn apply(&mut self, status: OrderStatus) {
        self.status = status;
    }
}
