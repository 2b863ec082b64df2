//! Persistence seams consumed by the services.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{Department, NewDepartment, NewProfile, Profile, RecordId};

/// Storage for department records.
#[async_trait]
pub trait DepartmentStore: Send + Sync {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Department>, StoreError>;

    /// Inserts a department, returning it with its assigned identifier.
    async fn insert(&self, department: NewDepartment) -> Result<Department, StoreError>;

    /// Lists all departments ordered by identifier.
    async fn list(&self) -> Result<Vec<Department>, StoreError>;
}

/// Storage for profile records. Loaded profiles carry their resolved department.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Profile>, StoreError>;

    /// Inserts a profile without a department.
    async fn insert(&self, profile: NewProfile) -> Result<Profile, StoreError>;

    /// Persists the mutable fields of an existing profile.
    async fn save(&self, profile: Profile) -> Result<Profile, StoreError>;

    /// Lists all profiles ordered by identifier.
    async fn list(&self) -> Result<Vec<Profile>, StoreError>;
}

#[async_trait]
impl<T: DepartmentStore + ?Sized> DepartmentStore for &T {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Department>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn insert(&self, department: NewDepartment) -> Result<Department, StoreError> {
        (**self).insert(department).await
    }

    async fn list(&self) -> Result<Vec<Department>, StoreError> {
        (**self).list().await
    }
}

#[async_trait]
impl<T: ProfileStore + ?Sized> ProfileStore for &T {
    async fn find_by_id(&self, id: RecordId) -> Result<Option<Profile>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn insert(&self, profile: NewProfile) -> Result<Profile, StoreError> {
        (**self).insert(profile).await
    }

    async fn save(&self, profile: Profile) -> Result<Profile, StoreError> {
        (**self).save(profile).await
    }

    async fn list(&self) -> Result<Vec<Profile>, StoreError> {
        (**self).list().await
    }
}
