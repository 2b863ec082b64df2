use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EntityKind, ObjectNotFound};

/// Identifier assigned by the store when a record is created.
pub type RecordId = i64;

/// Organisational unit that profiles may point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: RecordId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Person record, optionally assigned to a department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: RecordId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<Department>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Identifier of the referenced department, if any.
    pub fn department_id(&self) -> Option<RecordId> {
        self.department.as_ref().map(|department| department.id)
    }
}

/// Payload used to create a department.
#[derive(Debug, Clone)]
pub struct NewDepartment {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Payload used to create a profile. New profiles never carry a department.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Parses an identifier received in string form.
///
/// Text that is not an integer cannot name any stored record, so it is
/// reported as a miss for `kind` carrying the raw input.
pub fn parse_record_id(kind: EntityKind, raw: &str) -> Result<RecordId, ObjectNotFound> {
    raw.parse::<RecordId>()
        .map_err(|_| ObjectNotFound::new(kind, raw))
}
