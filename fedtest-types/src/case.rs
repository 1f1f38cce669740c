//! Test case definitions.

use indexmap::IndexMap;
use serde_json::Value;
use std::time::Duration;

use crate::{Role, RoleOutput};

/// One role's configuration within a case.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleSpec {
    /// The role this configuration is for.
    pub role: Role,
    /// Protocol input, passed to the worker verbatim.
    pub input: Value,
    /// Per-role timeout; `None` means the suite default applies.
    pub timeout: Option<Duration>,
    /// Known-good output to check against, in addition to cross-role agreement.
    pub expect: Option<RoleOutput>,
}

impl RoleSpec {
    /// Create a role spec with no timeout override and no expectation.
    pub fn new(role: Role, input: Value) -> Self {
        Self {
            role,
            input,
            timeout: None,
            expect: None,
        }
    }

    /// Set the per-role timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the expected output.
    pub fn with_expectation(mut self, expect: RoleOutput) -> Self {
        self.expect = Some(expect);
        self
    }
}

/// A named scenario: the fixed set of roles and their configurations.
#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    name: String,
    roles: IndexMap<Role, RoleSpec>,
}

impl TestCase {
    /// Create an empty case.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            roles: IndexMap::new(),
        }
    }

    /// Add a role. A second spec for the same role replaces the first.
    pub fn with_role(mut self, spec: RoleSpec) -> Self {
        self.roles.insert(spec.role, spec);
        self
    }

    /// The case identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role specs in definition order.
    pub fn roles(&self) -> impl Iterator<Item = &RoleSpec> {
        self.roles.values()
    }

    /// Role names in definition order.
    pub fn role_names(&self) -> impl Iterator<Item = Role> + '_ {
        self.roles.keys().copied()
    }

    /// Look up one role's spec.
    pub fn role(&self, role: Role) -> Option<&RoleSpec> {
        self.roles.get(&role)
    }

    /// Number of roles.
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns true if the case defines no roles.
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Case-level deadline: the longest per-role timeout, where roles without
    /// their own timeout count as `default`.
    pub fn timeout(&self, default: Duration) -> Duration {
        self.roles
            .values()
            .map(|spec| spec.timeout.unwrap_or(default))
            .max()
            .unwrap_or(default)
    }
}
