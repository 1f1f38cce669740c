//! Participant roles in a simulated multi-party run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// A named participant in a multi-party protocol run.
///
/// Displayed as `guest`, `host`, `host-N` or `coordinator`. Parsing also
/// accepts the compact `hostN` spelling. Ordering is guest, host, numbered
/// hosts by index, then coordinator, which gives result listings a stable
/// order independent of arrival order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    /// The party holding labels; drives the protocol.
    Guest,
    /// The single data-holding peer of a two-party run.
    Host,
    /// One of several data-holding peers.
    HostN(u16),
    /// Third party that aggregates but holds no samples.
    Coordinator,
}

impl Role {
    /// Returns true for the coordinator role.
    pub fn is_coordinator(&self) -> bool {
        matches!(self, Role::Coordinator)
    }

    /// Returns true for roles that load data (everything but the coordinator).
    pub fn holds_data(&self) -> bool {
        !self.is_coordinator()
    }

    /// Returns true for `host` and `host-N`.
    pub fn is_host(&self) -> bool {
        matches!(self, Role::Host | Role::HostN(_))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Guest => write!(f, "guest"),
            Role::Host => write!(f, "host"),
            Role::HostN(n) => write!(f, "host-{}", n),
            Role::Coordinator => write!(f, "coordinator"),
        }
    }
}

impl fmt::Debug for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Role({})", self)
    }
}

impl FromStr for Role {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Role::Guest),
            "host" => Ok(Role::Host),
            "coordinator" => Ok(Role::Coordinator),
            other => {
                let index = other
                    .strip_prefix("host")
                    .map(|rest| rest.strip_prefix('-').unwrap_or(rest))
                    .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                    .filter(|digits| *digits == "0" || !digits.starts_with('0'))
                    .and_then(|digits| digits.parse::<u16>().ok());
                index
                    .map(Role::HostN)
                    .ok_or_else(|| TypesError::InvalidRole(other.to_string()))
            }
        }
    }
}

impl TryFrom<String> for Role {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_fixed_roles() {
        assert_eq!("guest".parse::<Role>().unwrap(), Role::Guest);
        assert_eq!("host".parse::<Role>().unwrap(), Role::Host);
        assert_eq!("coordinator".parse::<Role>().unwrap(), Role::Coordinator);
    }

    #[test]
    fn parse_numbered_hosts() {
        assert_eq!("host1".parse::<Role>().unwrap(), Role::HostN(1));
        assert_eq!("host-2".parse::<Role>().unwrap(), Role::HostN(2));
        assert_eq!(Role::HostN(2).to_string(), "host-2");
        assert_eq!("host-0".parse::<Role>().unwrap(), Role::HostN(0));
    }

    #[test]
    fn parse_rejects_unknown_names() {
        for bad in ["", "Guest", "host-", "hostx", "host--1", "arbiter", "host-99999", "host-01", "host007"] {
            assert!(bad.parse::<Role>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn ordering_is_guest_hosts_coordinator() {
        let mut roles = vec![
            Role::Coordinator,
            Role::HostN(2),
            Role::Guest,
            Role::HostN(1),
            Role::Host,
        ];
        roles.sort();
        assert_eq!(
            roles,
            vec![
                Role::Guest,
                Role::Host,
                Role::HostN(1),
                Role::HostN(2),
                Role::Coordinator
            ]
        );
    }

    #[test]
    fn serde_uses_display_form() {
        let json = serde_json::to_string(&Role::HostN(3)).unwrap();
        assert_eq!(json, "\"host-3\"");
        let role: Role = serde_json::from_str("\"host3\"").unwrap();
        assert_eq!(role, Role::HostN(3));
        assert!(serde_json::from_str::<Role>("\"arbiter\"").is_err());
    }

    #[test]
    fn coordinator_holds_no_data() {
        assert!(!Role::Coordinator.holds_data());
        assert!(Role::Guest.holds_data());
        assert!(Role::HostN(1).is_host());
        assert!(!Role::Guest.is_host());
    }
}
