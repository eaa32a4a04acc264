//! Access control model.
//!
//! ACLs are stored on documents as a complex `acp` property. Only storage is
//! modeled here; nothing in docrepo evaluates permissions.

use crate::error::{CoreError, CoreResult};
use docrepo_state::Value;
use std::collections::BTreeMap;

/// Group of repository administrators.
pub const ADMINISTRATORS: &str = "administrators";
/// The built-in administrator user.
pub const ADMINISTRATOR: &str = "Administrator";
/// Group of all authenticated members.
pub const MEMBERS: &str = "members";
/// Permission implying every other permission.
pub const EVERYTHING: &str = "Everything";
/// Read permission.
pub const READ: &str = "Read";
/// Name of the ACL that local grants go to.
pub const LOCAL_ACL: &str = "local";

/// A single access control entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ace {
    /// User or group the entry applies to.
    pub principal: String,
    /// Permission granted or denied.
    pub permission: String,
    /// True to grant, false to deny.
    pub granted: bool,
}

impl Ace {
    /// Creates a granting entry.
    pub fn grant(principal: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            permission: permission.into(),
            granted: true,
        }
    }

    /// Creates a denying entry.
    pub fn deny(principal: impl Into<String>, permission: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            permission: permission.into(),
            granted: false,
        }
    }
}

/// A named, ordered list of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    /// ACL name, unique within an [`Acp`].
    pub name: String,
    /// Entries, in evaluation order.
    pub aces: Vec<Ace>,
}

impl Acl {
    /// Creates an empty ACL.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aces: Vec::new(),
        }
    }

    /// Appends an entry.
    #[must_use]
    pub fn with(mut self, ace: Ace) -> Self {
        self.aces.push(ace);
        self
    }
}

/// Access control policy: the ordered ACLs of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Acp {
    acls: Vec<Acl>,
}

impl Acp {
    /// Creates an empty policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The policy placed on a new repository root: administrators may do
    /// everything, members may read.
    #[must_use]
    pub fn root_default() -> Self {
        let acl = Acl::new(LOCAL_ACL)
            .with(Ace::grant(ADMINISTRATORS, EVERYTHING))
            .with(Ace::grant(ADMINISTRATOR, EVERYTHING))
            .with(Ace::grant(MEMBERS, READ));
        let mut acp = Self::new();
        acp.add_acl(acl);
        acp
    }

    /// Returns the ACLs in order.
    pub fn acls(&self) -> &[Acl] {
        &self.acls
    }

    /// Returns the ACL with this name.
    pub fn acl(&self, name: &str) -> Option<&Acl> {
        self.acls.iter().find(|acl| acl.name == name)
    }

    /// Returns true if there are no ACLs.
    pub fn is_empty(&self) -> bool {
        self.acls.is_empty()
    }

    /// Adds an ACL, replacing any existing ACL with the same name in place.
    pub fn add_acl(&mut self, acl: Acl) {
        match self.acls.iter_mut().find(|existing| existing.name == acl.name) {
            Some(existing) => *existing = acl,
            None => self.acls.push(acl),
        }
    }

    /// Merges `other` into this policy, ACL by ACL.
    pub fn merge(&mut self, other: &Acp) {
        for acl in &other.acls {
            self.add_acl(acl.clone());
        }
    }

    /// Encodes the policy as a stored property value.
    pub fn to_value(&self) -> Value {
        Value::Array(
            self.acls
                .iter()
                .map(|acl| {
                    let aces = acl
                        .aces
                        .iter()
                        .map(|ace| {
                            let mut map = BTreeMap::new();
                            map.insert("principal".to_string(), Value::from(ace.principal.as_str()));
                            map.insert("permission".to_string(), Value::from(ace.permission.as_str()));
                            map.insert("granted".to_string(), Value::Boolean(ace.granted));
                            Value::Object(map)
                        })
                        .collect();
                    let mut map = BTreeMap::new();
                    map.insert("name".to_string(), Value::from(acl.name.as_str()));
                    map.insert("aces".to_string(), Value::Array(aces));
                    Value::Object(map)
                })
                .collect(),
        )
    }

    /// Decodes a stored property value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if the value is not a well-formed policy.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        let malformed = || CoreError::invalid_operation("malformed acp property");
        let mut acp = Self::new();
        for acl in value.as_array().ok_or_else(malformed)? {
            let acl = acl.as_object().ok_or_else(malformed)?;
            let name = field_str(acl, "name").ok_or_else(malformed)?;
            let mut decoded = Acl::new(name);
            let aces = acl
                .get("aces")
                .and_then(Value::as_array)
                .ok_or_else(malformed)?;
            for ace in aces {
                let ace = ace.as_object().ok_or_else(malformed)?;
                decoded.aces.push(Ace {
                    principal: field_str(ace, "principal").ok_or_else(malformed)?.to_string(),
                    permission: field_str(ace, "permission").ok_or_else(malformed)?.to_string(),
                    granted: ace
                        .get("granted")
                        .and_then(Value::as_bool)
                        .ok_or_else(malformed)?,
                });
            }
            acp.add_acl(decoded);
        }
        Ok(acp)
    }
}

fn field_str<'a>(map: &'a BTreeMap<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_default_grants() {
        let acp = Acp::root_default();
        let local = acp.acl(LOCAL_ACL).unwrap();
        assert_eq!(local.aces.len(), 3);
        assert_eq!(local.aces[0], Ace::grant(ADMINISTRATORS, EVERYTHING));
        assert_eq!(local.aces[2], Ace::grant(MEMBERS, READ));
    }

    #[test]
    fn value_round_trip() {
        let mut acp = Acp::root_default();
        acp.add_acl(Acl::new("inherited").with(Ace::deny("bob", READ)));
        let decoded = Acp::from_value(&acp.to_value()).unwrap();
        assert_eq!(decoded, acp);
    }

    #[test]
    fn merge_replaces_by_name() {
        let mut acp = Acp::root_default();
        acp.merge(&Acp::from_value(&Acp::new().to_value()).unwrap());
        assert_eq!(acp, Acp::root_default());

        let mut other = Acp::new();
        other.add_acl(Acl::new(LOCAL_ACL).with(Ace::grant("alice", READ)));
        acp.merge(&other);
        assert_eq!(acp.acls().len(), 1);
        assert_eq!(acp.acl(LOCAL_ACL).unwrap().aces, vec![Ace::grant("alice", READ)]);
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(Acp::from_value(&Value::from("nope")).is_err());
        assert!(Acp::from_value(&Value::Array(vec![Value::Long(1)])).is_err());
    }
}
