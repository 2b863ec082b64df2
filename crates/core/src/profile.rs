use tracing::{debug, info};

use crate::department::DepartmentLookup;
use crate::error::{EntityKind, ObjectNotFound, ServiceError};
use crate::store::ProfileStore;
use crate::types::{parse_record_id, NewProfile, Profile};
use crate::Clock;

/// Profile use cases, including assigning a profile to a department.
pub struct ProfileService<P, D> {
    profiles: P,
    departments: D,
    clock: Clock,
}

impl<P, D> ProfileService<P, D>
where
    P: ProfileStore,
    D: DepartmentLookup,
{
    pub fn new(profiles: P, departments: D, clock: Clock) -> Self {
        Self {
            profiles,
            departments,
            clock,
        }
    }

    /// Creates a profile with no department.
    pub async fn create(&self, name: &str) -> Result<Profile, ServiceError> {
        let profile = self
            .profiles
            .insert(NewProfile {
                name: name.to_string(),
                created_at: (self.clock)(),
            })
            .await?;
        debug!(stage = "profile", profile_id = profile.id, "profile created");
        Ok(profile)
    }

    /// Loads a profile together with its department.
    pub async fn find(&self, profile_id: &str) -> Result<Profile, ServiceError> {
        let id = parse_record_id(EntityKind::Profile, profile_id)?;
        self.profiles
            .find_by_id(id)
            .await?
            .ok_or_else(|| ObjectNotFound::profile(profile_id).into())
    }

    pub async fn list(&self) -> Result<Vec<Profile>, ServiceError> {
        Ok(self.profiles.list().await?)
    }

    /// Points the profile at the department and persists it.
    ///
    /// Nothing is written unless both records exist. Lookup failures from
    /// the department side are returned as they are.
    pub async fn update_department(
        &self,
        profile_id: &str,
        department_id: &str,
    ) -> Result<Profile, ServiceError> {
        let mut profile = self.find(profile_id).await?;
        let department = self.departments.find(department_id).await?;

        let previous = profile.department_id();
        profile.department = Some(department);
        profile.updated_at = (self.clock)();

        let saved = self.profiles.save(profile).await?;
        info!(
            stage = "profile",
            profile_id = saved.id,
            department_id = ?saved.department_id(),
            previous_department_id = ?previous,
            "profile department updated"
        );
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;
    use crate::error::StoreError;
    use crate::types::{Department, RecordId};

    #[derive(Default)]
    struct MemoryProfiles {
        rows: Mutex<BTreeMap<RecordId, Profile>>,
        reads: AtomicUsize,
        saves: AtomicUsize,
    }

    impl MemoryProfiles {
        fn with(profile: Profile) -> Self {
            let store = Self::default();
            store.rows.lock().unwrap().insert(profile.id, profile);
            store
        }

        fn stored(&self, id: RecordId) -> Option<Profile> {
            self.rows.lock().unwrap().get(&id).cloned()
        }
    }

    #[async_trait]
    impl ProfileStore for MemoryProfiles {
        async fn find_by_id(&self, id: RecordId) -> Result<Option<Profile>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.stored(id))
        }

        async fn insert(&self, profile: NewProfile) -> Result<Profile, StoreError> {
            let mut rows = self.rows.lock().unwrap();
            let id = rows.keys().next_back().copied().unwrap_or(0) + 1;
            let stored = Profile {
                id,
                name: profile.name,
                department: None,
                created_at: profile.created_at,
                updated_at: profile.created_at,
            };
            rows.insert(id, stored.clone());
            Ok(stored)
        }

        async fn save(&self, profile: Profile) -> Result<Profile, StoreError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.rows
                .lock()
                .unwrap()
                .insert(profile.id, profile.clone());
            Ok(profile)
        }

        async fn list(&self) -> Result<Vec<Profile>, StoreError> {
            Ok(self.rows.lock().unwrap().values().cloned().collect())
        }
    }

    #[derive(Default)]
    struct StubLookup {
        departments: HashMap<String, Department>,
        calls: Mutex<Vec<String>>,
    }

    impl StubLookup {
        fn with(department: Department) -> Self {
            let mut lookup = Self::default();
            lookup
                .departments
                .insert(department.id.to_string(), department);
            lookup
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DepartmentLookup for StubLookup {
        async fn find(&self, department_id: &str) -> Result<Department, ServiceError> {
            self.calls.lock().unwrap().push(department_id.to_string());
            self.departments
                .get(department_id)
                .cloned()
                .ok_or_else(|| ObjectNotFound::department(department_id).into())
        }
    }

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn now() -> DateTime<Utc> {
        created_at() + Duration::hours(1)
    }

    fn john_doe() -> Profile {
        Profile {
            id: 1,
            name: "John Doe".to_string(),
            department: None,
            created_at: created_at(),
            updated_at: created_at(),
        }
    }

    fn it_department() -> Department {
        Department {
            id: 10,
            name: "IT Department".to_string(),
            created_at: created_at(),
        }
    }

    fn service<'a>(
        profiles: &'a MemoryProfiles,
        lookup: &'a StubLookup,
    ) -> ProfileService<&'a MemoryProfiles, &'a StubLookup> {
        ProfileService::new(profiles, lookup, Arc::new(now))
    }

    #[tokio::test]
    async fn update_department_assigns_and_saves() {
        let profiles = MemoryProfiles::with(john_doe());
        let lookup = StubLookup::with(it_department());

        let updated = service(&profiles, &lookup)
            .update_department("1", "10")
            .await
            .expect("update succeeds");

        assert_eq!(updated.department, Some(it_department()));
        assert_eq!(updated.updated_at, now());
        assert_eq!(profiles.reads.load(Ordering::SeqCst), 1);
        assert_eq!(profiles.saves.load(Ordering::SeqCst), 1);
        assert_eq!(lookup.calls(), vec!["10".to_string()]);

        let stored = profiles.stored(1).expect("profile still stored");
        assert_eq!(stored.department_id(), Some(10));
    }

    #[tokio::test]
    async fn missing_profile_skips_lookup_and_save() {
        let profiles = MemoryProfiles::default();
        let lookup = StubLookup::with(it_department());

        let err = service(&profiles, &lookup)
            .update_department("1", "10")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Profile not found with ID: 1");
        assert_eq!(profiles.reads.load(Ordering::SeqCst), 1);
        assert!(lookup.calls().is_empty());
        assert_eq!(profiles.saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_department_error_is_propagated_without_saving() {
        let profiles = MemoryProfiles::with(john_doe());
        let lookup = StubLookup::default();

        let err = service(&profiles, &lookup)
            .update_department("1", "999")
            .await
            .unwrap_err();

        assert_eq!(
            err.as_not_found(),
            Some(&ObjectNotFound::department("999"))
        );
        assert_eq!(err.to_string(), "Department not found with ID: 999");
        assert_eq!(lookup.calls(), vec!["999".to_string()]);
        assert_eq!(profiles.saves.load(Ordering::SeqCst), 0);
        assert_eq!(profiles.stored(1), Some(john_doe()));
    }

    #[tokio::test]
    async fn repeated_update_keeps_same_department() {
        let profiles = MemoryProfiles::with(john_doe());
        let lookup = StubLookup::with(it_department());
        let service = service(&profiles, &lookup);

        let first = service.update_department("1", "10").await.expect("first");
        let second = service.update_department("1", "10").await.expect("second");

        assert_eq!(first.department, second.department);
        assert_eq!(second.department_id(), Some(10));
    }

    #[tokio::test]
    async fn non_numeric_profile_id_is_not_found() {
        let profiles = MemoryProfiles::with(john_doe());
        let lookup = StubLookup::with(it_department());

        let err = service(&profiles, &lookup)
            .update_department("one", "10")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Profile not found with ID: one");
        assert_eq!(profiles.reads.load(Ordering::SeqCst), 0);
        assert!(lookup.calls().is_empty());
    }

    #[tokio::test]
    async fn create_starts_without_department() {
        let profiles = MemoryProfiles::default();
        let lookup = StubLookup::default();
        let service = service(&profiles, &lookup);

        let created = service.create("Jane Doe").await.expect("create");
        assert_eq!(created.department, None);
        assert_eq!(created.created_at, now());

        let listed = service.list().await.expect("list");
        assert_eq!(listed, vec![created]);
    }
}
