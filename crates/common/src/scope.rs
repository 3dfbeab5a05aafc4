//! Tenant/product scoping.

use serde::{Deserialize, Serialize};

/// The tenant and product a request operates in.
///
/// Every query against participant data carries this predicate; it is the
/// application-level substitute for row-level tenant isolation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantScope {
    /// Tenant identifier.
    pub tenant_id: String,
    /// Product identifier within the tenant.
    pub product_id: String,
}

impl TenantScope {
    /// Create a new scope.
    pub fn new(tenant_id: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            product_id: product_id.into(),
        }
    }

    /// Whether a row with the given tenant and product lies inside this scope.
    #[must_use]
    pub fn contains(&self, tenant_id: &str, product_id: &str) -> bool {
        self.tenant_id == tenant_id && self.product_id == product_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let scope = TenantScope::new("t1", "p1");
        assert!(scope.contains("t1", "p1"));
        assert!(!scope.contains("t1", "p2"));
        assert!(!scope.contains("t2", "p1"));
    }
}
