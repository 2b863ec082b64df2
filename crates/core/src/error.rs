use std::fmt;

use thiserror::Error;

/// Kind of record a lookup was searching for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Profile,
    Department,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "Profile",
            Self::Department => "Department",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lookup by identifier found no matching record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} not found with ID: {id}")]
pub struct ObjectNotFound {
    pub kind: EntityKind,
    pub id: String,
}

impl ObjectNotFound {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn profile(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Profile, id)
    }

    pub fn department(id: impl Into<String>) -> Self {
        Self::new(EntityKind::Department, id)
    }
}

/// Opaque failure reported by a store backend.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StoreError(Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self(err.into())
    }
}

/// Errors returned by the profile and department services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    NotFound(#[from] ObjectNotFound),
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Returns the not-found details when this is a lookup miss.
    pub fn as_not_found(&self) -> Option<&ObjectNotFound> {
        match self {
            Self::NotFound(err) => Some(err),
            Self::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_kind_and_id() {
        assert_eq!(
            ObjectNotFound::profile("1").to_string(),
            "Profile not found with ID: 1"
        );
        assert_eq!(
            ObjectNotFound::department("999").to_string(),
            "Department not found with ID: 999"
        );
    }

    #[test]
    fn service_error_keeps_not_found_message() {
        let err = ServiceError::from(ObjectNotFound::department("999"));
        assert_eq!(err.to_string(), "Department not found with ID: 999");
        assert_eq!(
            err.as_not_found().map(|miss| miss.kind),
            Some(EntityKind::Department)
        );
    }

    #[test]
    fn store_error_wraps_backend_message() {
        let err = ServiceError::from(StoreError::backend("disk full"));
        assert_eq!(err.to_string(), "store failure: disk full");
        assert!(err.as_not_found().is_none());
    }
}
