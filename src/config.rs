use std::{collections::HashMap, env};

use dotenv::dotenv;

use crate::{
    error::{ProvisionError, ProvisionResult},
    models::{CollectionSet, DatabaseTarget, ProvisionPolicy, UserDescriptor},
};

const DEFAULT_MONGODB_URI: &str = "mongodb://localhost:27017";
const DEFAULT_ROLE: &str = "readWrite";

/// Everything one provisioning run needs, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub mongo_uri: String,
    pub target: DatabaseTarget,
    pub user: UserDescriptor,
    pub collections: CollectionSet,
    pub policy: ProvisionPolicy,
    pub dry_run: bool,
}

impl Settings {
    /// Loads `.env` if present, then reads the process environment.
    pub fn init() -> ProvisionResult<Self> {
        dotenv().ok();
        Self::from_vars(env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> ProvisionResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| lookup(&vars, key);
        let require =
            |key: &'static str| lookup(&vars, key).ok_or(ProvisionError::MissingConfig(key));

        let mongo_uri = get("MONGODB_URI")
            .unwrap_or(DEFAULT_MONGODB_URI)
            .to_string();
        let target = DatabaseTarget::new(require("DATABASE_NAME")?)?;

        let user = UserDescriptor::new(
            require("MONGO_USERNAME")?,
            lookup_secret(&vars, "MONGO_PASSWORD")?,
            get("MONGO_ROLE").unwrap_or(DEFAULT_ROLE),
            get("MONGO_ROLE_DB").unwrap_or(target.as_str()),
        );

        let collections = match get("MONGO_COLLECTIONS") {
            Some(list) => CollectionSet::new(
                list.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty()),
            )?,
            None => CollectionSet::empty(),
        };

        let policy = match get("PROVISION_POLICY") {
            Some(value) => value.parse()?,
            None => ProvisionPolicy::default(),
        };

        let dry_run = match get("PROVISION_DRY_RUN") {
            Some(value) => parse_flag("PROVISION_DRY_RUN", value)?,
            None => false,
        };

        Ok(Settings {
            mongo_uri,
            target,
            user,
            collections,
            policy,
            dry_run,
        })
    }
}

fn lookup<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Secrets are taken verbatim; surrounding whitespace is part of the value.
fn lookup_secret<'a>(
    vars: &'a HashMap<String, String>,
    key: &'static str,
) -> ProvisionResult<&'a str> {
    vars.get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or(ProvisionError::MissingConfig(key))
}

fn parse_flag(key: &'static str, value: &str) -> ProvisionResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ProvisionError::InvalidConfig {
            key,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("DATABASE_NAME", "user"),
            ("MONGO_USERNAME", "dev"),
            ("MONGO_PASSWORD", "dev_pass"),
        ]
    }

    #[test]
    fn defaults_fill_in_optional_values() {
        let settings = Settings::from_vars(base()).unwrap();
        assert_eq!(settings.mongo_uri, "mongodb://localhost:27017");
        assert_eq!(settings.target.as_str(), "user");
        assert_eq!(settings.user, UserDescriptor::new("dev", "dev_pass", "readWrite", "user"));
        assert!(settings.collections.is_empty());
        assert_eq!(settings.policy, ProvisionPolicy::Idempotent);
        assert!(!settings.dry_run);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let mut vars = base();
        vars.extend([
            ("MONGODB_URI", "mongodb://db:27017"),
            ("MONGO_ROLE", "read"),
            ("MONGO_ROLE_DB", "reporting"),
            ("MONGO_COLLECTIONS", "users, relationship,,auth "),
            ("PROVISION_POLICY", "strict"),
            ("PROVISION_DRY_RUN", "yes"),
        ]);
        let settings = Settings::from_vars(vars).unwrap();
        assert_eq!(settings.mongo_uri, "mongodb://db:27017");
        assert_eq!(settings.user.role, "read");
        assert_eq!(settings.user.scope_database, "reporting");
        assert_eq!(
            settings.collections.iter().collect::<Vec<_>>(),
            vec!["users", "relationship", "auth"]
        );
        assert_eq!(settings.policy, ProvisionPolicy::Strict);
        assert!(settings.dry_run);
    }

    #[test]
    fn credentials_are_required() {
        let vars = vec![("DATABASE_NAME", "user"), ("MONGO_USERNAME", "dev")];
        assert!(matches!(
            Settings::from_vars(vars),
            Err(ProvisionError::MissingConfig("MONGO_PASSWORD"))
        ));

        let blank = vec![
            ("DATABASE_NAME", "  "),
            ("MONGO_USERNAME", "dev"),
            ("MONGO_PASSWORD", "dev_pass"),
        ];
        assert!(matches!(
            Settings::from_vars(blank),
            Err(ProvisionError::MissingConfig("DATABASE_NAME"))
        ));
    }

    #[test]
    fn password_keeps_surrounding_whitespace() {
        let vars = vec![
            ("DATABASE_NAME", " user "),
            ("MONGO_USERNAME", "dev"),
            ("MONGO_PASSWORD", "  s3cret "),
        ];
        let settings = Settings::from_vars(vars).unwrap();
        assert_eq!(settings.user.password, "  s3cret ");
        assert_eq!(settings.target.as_str(), "user");

        let empty = vec![
            ("DATABASE_NAME", "user"),
            ("MONGO_USERNAME", "dev"),
            ("MONGO_PASSWORD", ""),
        ];
        assert!(matches!(
            Settings::from_vars(empty),
            Err(ProvisionError::MissingConfig("MONGO_PASSWORD"))
        ));
    }

    #[test]
    fn bad_values_are_reported() {
        let mut vars = base();
        vars.push(("PROVISION_DRY_RUN", "maybe"));
        assert!(matches!(
            Settings::from_vars(vars),
            Err(ProvisionError::InvalidConfig { key: "PROVISION_DRY_RUN", .. })
        ));

        let mut vars = base();
        vars.push(("PROVISION_POLICY", "lenient"));
        assert!(matches!(
            Settings::from_vars(vars),
            Err(ProvisionError::InvalidConfig { key: "PROVISION_POLICY", .. })
        ));

        let mut vars = base();
        vars.push(("MONGO_COLLECTIONS", "users,system.views"));
        assert!(matches!(
            Settings::from_vars(vars),
            Err(ProvisionError::InvalidCollection(_))
        ));
    }
}
