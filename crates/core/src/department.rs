use async_trait::async_trait;
use tracing::debug;

use crate::error::{EntityKind, ObjectNotFound, ServiceError};
use crate::store::DepartmentStore;
use crate::types::{parse_record_id, Department, NewDepartment};
use crate::Clock;

/// Resolves departments by their string identifier.
#[async_trait]
pub trait DepartmentLookup: Send + Sync {
    /// Fails with [`ObjectNotFound`] when no department has the identifier.
    async fn find(&self, department_id: &str) -> Result<Department, ServiceError>;
}

#[async_trait]
impl<T: DepartmentLookup + ?Sized> DepartmentLookup for &T {
    async fn find(&self, department_id: &str) -> Result<Department, ServiceError> {
        (**self).find(department_id).await
    }
}

/// Department use cases on top of a [`DepartmentStore`].
pub struct DepartmentService<S> {
    store: S,
    clock: Clock,
}

impl<S: DepartmentStore> DepartmentService<S> {
    pub fn new(store: S, clock: Clock) -> Self {
        Self { store, clock }
    }

    /// Creates a department with the provided display name.
    pub async fn create(&self, name: &str) -> Result<Department, ServiceError> {
        let department = self
            .store
            .insert(NewDepartment {
                name: name.to_string(),
                created_at: (self.clock)(),
            })
            .await?;
        debug!(stage = "department", department_id = department.id, "department created");
        Ok(department)
    }

    pub async fn list(&self) -> Result<Vec<Department>, ServiceError> {
        Ok(self.store.list().await?)
    }
}

#[async_trait]
impl<S: DepartmentStore> DepartmentLookup for DepartmentService<S> {
    async fn find(&self, department_id: &str) -> Result<Department, ServiceError> {
        let id = parse_record_id(EntityKind::Department, department_id)?;
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| ObjectNotFound::department(department_id).into())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::error::StoreError;
    use crate::types::RecordId;

    #[derive(Default)]
    struct MemoryDepartments {
        rows: Mutex<BTreeMap<RecordId, Department>>,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl DepartmentStore for MemoryDepartments {
        async fn find_by_id(&self, id: RecordId) -> Result<Option<Department>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows.lock().unwrap().get(&id).cloned())
        }

        async fn insert(&self, department: NewDepartment) -> Result<Department, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
            let stored = Department {
                id,
                name: department.name,
                created_at: department.created_at,
            };
            rows.insert(id, stored.clone());
            Ok(stored)
        }

        async fn list(&self) -> Result<Vec<Department>, StoreError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn service() -> DepartmentService<MemoryDepartments> {
        DepartmentService::new(
            MemoryDepartments::default(),
            std::sync::Arc::new(fixed_time),
        )
    }

    #[tokio::test]
    async fn find_returns_existing_department() {
        let service = service();
        let created = service.create("IT Department").await.expect("create");

        let found = service
            .find(&created.id.to_string())
            .await
            .expect("department exists");
        assert_eq!(found, created);
        assert_eq!(found.created_at, fixed_time());
    }

    #[tokio::test]
    async fn find_reports_missing_department() {
        let service = service();
        let err = service.find("999").await.unwrap_err();
        assert_eq!(err.to_string(), "Department not found with ID: 999");
        assert_eq!(service.store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn find_rejects_non_numeric_id_without_reading() {
        let service = service();
        let err = service.find("it").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::NotFound(ObjectNotFound { kind: EntityKind::Department, ref id }) if id == "it"
        ));
        assert_eq!(service.store.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn list_returns_departments_in_id_order() {
        let service = service();
        service.create("Sales").await.expect("create");
        service.create("Support").await.expect("create");

        let names: Vec<_> = service
            .list()
            .await
            .expect("list")
            .into_iter()
            .map(|department| department.name)
            .collect();
        assert_eq!(names, vec!["Sales", "Support"]);
    }
}
