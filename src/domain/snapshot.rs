//! Last-known copy of a foreign entity, as received in an event.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::Entity;

/// A JSON object carrying a string `id`; every other field is kept as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Snapshot {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl Entity for Snapshot {
    fn id(&self) -> &str {
        &self.id
    }
}
