use std::{fmt, str::FromStr, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ProvisionError;

const MAX_DATABASE_NAME_BYTES: usize = 63;

fn forbidden_database_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[/\\. "$*<>:|?\x00]"#).expect("static pattern"))
}

fn forbidden_collection_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[$\x00]").expect("static pattern"))
}

/// Name of the database users and collections are provisioned into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatabaseTarget(String);

impl DatabaseTarget {
    pub fn new(name: impl Into<String>) -> Result<Self, ProvisionError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ProvisionError::InvalidTarget("database name is empty".to_string()));
        }
        if name.len() > MAX_DATABASE_NAME_BYTES {
            return Err(ProvisionError::InvalidTarget(format!(
                "database name `{}` is longer than {} bytes",
                name, MAX_DATABASE_NAME_BYTES
            )));
        }
        if forbidden_database_chars().is_match(&name) {
            return Err(ProvisionError::InvalidTarget(format!(
                "database name `{}` contains a forbidden character",
                name
            )));
        }
        Ok(DatabaseTarget(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DatabaseTarget {
    type Error = ProvisionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DatabaseTarget::new(value)
    }
}

impl From<DatabaseTarget> for String {
    fn from(target: DatabaseTarget) -> Self {
        target.0
    }
}

/// Credential granted on the target database.
#[derive(Clone, PartialEq, Eq, Validate)]
pub struct UserDescriptor {
    #[validate(length(min = 1))]
    pub username: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[validate(length(min = 1))]
    pub role: String,
    #[validate(length(min = 1))]
    pub scope_database: String,
}

impl UserDescriptor {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        role: impl Into<String>,
        scope_database: impl Into<String>,
    ) -> Self {
        UserDescriptor {
            username: username.into(),
            password: password.into(),
            role: role.into(),
            scope_database: scope_database.into(),
        }
    }

    /// `readWrite` on the target itself, the usual application credential.
    pub fn read_write(
        username: impl Into<String>,
        password: impl Into<String>,
        target: &DatabaseTarget,
    ) -> Self {
        UserDescriptor::new(username, password, "readWrite", target.as_str())
    }

    pub fn role_grant(&self) -> RoleGrant<'_> {
        RoleGrant {
            role: &self.role,
            db: &self.scope_database,
        }
    }
}

impl fmt::Debug for UserDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserDescriptor")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("role", &self.role)
            .field("scope_database", &self.scope_database)
            .finish()
    }
}

/// Role entry in the shape the server expects inside `roles: [...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleGrant<'a> {
    pub role: &'a str,
    pub db: &'a str,
}

/// Ordered collection names; duplicates are kept as given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionSet(Vec<String>);

impl CollectionSet {
    pub fn new<I, S>(names: I) -> Result<Self, ProvisionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = names
            .into_iter()
            .map(Into::into)
            .map(|name: String| validate_collection_name(&name).map(|_| name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CollectionSet(names))
    }

    pub fn empty() -> Self {
        CollectionSet(Vec::new())
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn validate_collection_name(name: &str) -> Result<(), ProvisionError> {
    if name.is_empty() {
        return Err(ProvisionError::InvalidCollection("collection name is empty".to_string()));
    }
    if name.starts_with("system.") {
        return Err(ProvisionError::InvalidCollection(format!(
            "collection name `{}` uses the reserved `system.` prefix",
            name
        )));
    }
    if forbidden_collection_chars().is_match(name) {
        return Err(ProvisionError::InvalidCollection(format!(
            "collection name `{}` contains a forbidden character",
            name
        )));
    }
    Ok(())
}

/// What to do when the user or a collection is already there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvisionPolicy {
    /// Check before creating; existing objects are left as they are and the
    /// role is granted to an existing user.
    #[default]
    Idempotent,
    /// Create unconditionally and fail on anything that already exists.
    Strict,
}

impl FromStr for ProvisionPolicy {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idempotent" => Ok(ProvisionPolicy::Idempotent),
            "strict" => Ok(ProvisionPolicy::Strict),
            _ => Err(ProvisionError::InvalidConfig {
                key: "PROVISION_POLICY",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ProvisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionPolicy::Idempotent => f.write_str("idempotent"),
            ProvisionPolicy::Strict => f.write_str("strict"),
        }
    }
}
