//! In-memory collaborators for service tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::NaiveDate;
use enrollment_common::{AppError, AppResult, StorageBackend, StoredObject, TenantScope};

use crate::services::collaborators::{
    MasterdataCheck, MasterdataValidator, ProductReader, ProductRecord, TenantReader,
    TenantRecord, UserProfile, UserProfileReader,
};

/// Blob store that keeps objects in memory.
#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<(String, String), Bytes>>,
    pub fail_uploads: bool,
    pub fail_deletes: bool,
    /// Keys whose deletion fails even when `fail_deletes` is off.
    pub failing_keys: HashSet<String>,
}

impl MemoryStorage {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_deletes() -> Arc<Self> {
        Arc::new(Self {
            fail_deletes: true,
            ..Self::default()
        })
    }

    pub fn failing_uploads() -> Arc<Self> {
        Arc::new(Self {
            fail_uploads: true,
            ..Self::default()
        })
    }

    /// Fails deletes of the given keys only.
    pub fn failing_deletes_for(keys: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing_keys: keys.iter().map(ToString::to_string).collect(),
            ..Self::default()
        })
    }

    pub fn put(&self, bucket: &str, key: &str) {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((bucket.to_string(), key.to_string()), Bytes::from_static(b"blob"));
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> AppResult<StoredObject> {
        if self.fail_uploads {
            return Err(AppError::Storage("upload refused".to_string()));
        }
        let stored = StoredObject {
            key: key.to_string(),
            size: data.len() as u64,
            md5: "0".repeat(32),
        };
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert((bucket.to_string(), key.to_string()), data);
        Ok(stored)
    }

    async fn delete(&self, bucket: &str, key: &str) -> AppResult<()> {
        if self.fail_deletes || self.failing_keys.contains(key) {
            return Err(AppError::Storage("delete refused".to_string()));
        }
        self.objects
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn exists(&self, bucket: &str, key: &str) -> AppResult<bool> {
        Ok(self.contains(bucket, key))
    }
}

/// Masterdata that accepts every code except the listed ones.
#[derive(Default)]
pub struct StaticMasterdata {
    pub rejected: HashSet<(String, String)>,
}

impl StaticMasterdata {
    pub fn rejecting(category: &str, code: &str) -> Self {
        let mut rejected = HashSet::new();
        rejected.insert((category.to_string(), code.to_string()));
        Self { rejected }
    }
}

#[async_trait]
impl MasterdataValidator for StaticMasterdata {
    async fn validate_item_code(
        &self,
        category: &str,
        code: &str,
        _scope: &TenantScope,
    ) -> AppResult<MasterdataCheck> {
        if self
            .rejected
            .contains(&(category.to_string(), code.to_string()))
        {
            Ok(MasterdataCheck::invalid(format!("Unknown {category} code {code}")))
        } else {
            Ok(MasterdataCheck::valid())
        }
    }
}

/// Profiles, tenants and products held in memory.
#[derive(Default)]
pub struct Directory {
    pub profiles: HashMap<String, UserProfile>,
    pub tenants: Vec<TenantRecord>,
    pub products: Vec<ProductRecord>,
}

impl Directory {
    /// One active tenant with one product open for self-registration, and a
    /// complete profile for user `u1`.
    pub fn standard() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            "u1".to_string(),
            UserProfile {
                user_id: "u1".to_string(),
                full_name: Some("Siti Rahmawati".to_string()),
                date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 15),
                gender: Some("F".to_string()),
                ..Default::default()
            },
        );

        Self {
            profiles,
            tenants: vec![TenantRecord {
                id: enrollment_db::test_utils::fixtures::TENANT_ID.to_string(),
                code: "ACME".to_string(),
                is_active: true,
            }],
            products: vec![ProductRecord {
                id: enrollment_db::test_utils::fixtures::PRODUCT_ID.to_string(),
                tenant_id: enrollment_db::test_utils::fixtures::TENANT_ID.to_string(),
                code: "DPLK".to_string(),
                self_registration_enabled: true,
            }],
        }
    }
}

#[async_trait]
impl UserProfileReader for Directory {
    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        Ok(self.profiles.get(user_id).cloned())
    }
}

#[async_trait]
impl TenantReader for Directory {
    async fn find_by_code(&self, code: &str) -> AppResult<Option<TenantRecord>> {
        Ok(self.tenants.iter().find(|t| t.code == code).cloned())
    }
}

#[async_trait]
impl ProductReader for Directory {
    async fn find_by_code(&self, tenant_id: &str, code: &str) -> AppResult<Option<ProductRecord>> {
        Ok(self
            .products
            .iter()
            .find(|p| p.tenant_id == tenant_id && p.code == code)
            .cloned())
    }
}
