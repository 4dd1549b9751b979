//! Registry record of a statement handed off to the warehouse.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::statement::StatementKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IssuedStatement {
    pub id: Uuid,
    pub kind: StatementKind,
    /// Fully qualified name of the object the statement creates or alters.
    pub target: String,
    pub sql: String,
    pub issued_by: String,
    pub issued_at: DateTime<Utc>,
}
