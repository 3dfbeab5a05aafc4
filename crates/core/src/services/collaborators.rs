//! Interfaces to systems outside the aggregate.
//!
//! Masterdata, user profiles, tenants and products are owned elsewhere; the
//! services only read them through these traits.

use async_trait::async_trait;
use chrono::NaiveDate;
use enrollment_common::{AppResult, TenantScope};
use serde::{Deserialize, Serialize};

/// Masterdata category codes.
pub mod categories {
    pub const IDENTITY_TYPE: &str = "IDENTITY_TYPE";
    pub const ADDRESS_TYPE: &str = "ADDRESS_TYPE";
    pub const COUNTRY: &str = "COUNTRY";
    pub const BANK: &str = "BANK";
    pub const CURRENCY: &str = "CURRENCY";
    pub const RELATIONSHIP: &str = "RELATIONSHIP";
    pub const OCCUPATION: &str = "OCCUPATION";
    pub const EMPLOYMENT_STATUS: &str = "EMPLOYMENT_STATUS";
    pub const INCOME_RANGE: &str = "INCOME_RANGE";
    pub const PENSION_PROGRAM: &str = "PENSION_PROGRAM";
    pub const ORGANIZATION: &str = "ORGANIZATION";
}

/// Result of a masterdata lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterdataCheck {
    pub valid: bool,
    pub message: Option<String>,
}

impl MasterdataCheck {
    #[must_use]
    pub const fn valid() -> Self {
        Self {
            valid: true,
            message: None,
        }
    }

    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// Validates codes against tenant masterdata.
#[async_trait]
pub trait MasterdataValidator: Send + Sync {
    async fn validate_item_code(
        &self,
        category: &str,
        code: &str,
        scope: &TenantScope,
    ) -> AppResult<MasterdataCheck>;
}

/// Profile of an authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub full_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

impl UserProfile {
    /// Name, birth date and gender are all present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.full_name.as_deref().is_some_and(|n| !n.trim().is_empty())
            && self.date_of_birth.is_some()
            && self.gender.as_deref().is_some_and(|g| !g.trim().is_empty())
    }
}

#[async_trait]
pub trait UserProfileReader: Send + Sync {
    async fn get_by_user_id(&self, user_id: &str) -> AppResult<Option<UserProfile>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub id: String,
    pub code: String,
    pub is_active: bool,
}

#[async_trait]
pub trait TenantReader: Send + Sync {
    async fn find_by_code(&self, code: &str) -> AppResult<Option<TenantRecord>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub tenant_id: String,
    pub code: String,
    pub self_registration_enabled: bool,
}

#[async_trait]
pub trait ProductReader: Send + Sync {
    async fn find_by_code(&self, tenant_id: &str, code: &str) -> AppResult<Option<ProductRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_completeness() {
        let mut profile = UserProfile {
            user_id: "u1".to_string(),
            full_name: Some("Siti".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1),
            gender: Some("F".to_string()),
            ..Default::default()
        };
        assert!(profile.is_complete());

        profile.gender = Some("  ".to_string());
        assert!(!profile.is_complete());

        profile.gender = Some("F".to_string());
        profile.date_of_birth = None;
        assert!(!profile.is_complete());
    }
}
