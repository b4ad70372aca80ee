//! User records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Entity, InputError};
use crate::store::Record;

/// A user as stored by the users service and broadcast in `user.*` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Raw create/update body; both fields are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Validated user fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFields {
    pub name: String,
    pub email: String,
}

impl UserInput {
    pub fn validate(self) -> Result<UserFields, InputError> {
        match (non_blank(self.name), non_blank(self.email)) {
            (Some(name), Some(email)) => Ok(UserFields { name, email }),
            _ => Err(InputError("name and email are required")),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl User {
    pub fn new(fields: UserFields) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: fields.name,
            email: fields.email,
            created_at: Utc::now(),
        }
    }
}

impl Entity for User {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for User {
    type Patch = UserFields;

    fn unique_key(&self) -> Option<(&'static str, &str)> {
        Some(("email", &self.email))
    }

    fn apply(&mut self, patch: UserFields) {
        self.name = patch.name;
        self.email = patch.email;
    }
}
