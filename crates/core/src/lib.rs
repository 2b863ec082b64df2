//! Domain layer shared by the storage backend and the HTTP application.
//!
//! The services here only see the traits in [`store`]; persistence and
//! transaction handling live in `staffdir-storage`.

pub mod department;
pub mod error;
pub mod profile;
pub mod store;
pub mod types;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use department::{DepartmentLookup, DepartmentService};
pub use error::{EntityKind, ObjectNotFound, ServiceError, StoreError};
pub use profile::ProfileService;
pub use store::{DepartmentStore, ProfileStore};
pub use types::{Department, NewDepartment, NewProfile, Profile, RecordId};

/// Source of "now" for timestamps written by the services.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Returns a clock backed by the system time.
pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}
