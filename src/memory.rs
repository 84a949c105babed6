//! In-process administration backend.
//!
//! Rejects duplicate users and collections the same way a MongoDB server does
//! and records every call it receives, which makes it usable both for tests and
//! for dry runs of the provisioning binary.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    admin::{AdminClient, DatabaseAdmin},
    error::{ProvisionError, ProvisionResult},
    models::{DatabaseTarget, UserDescriptor},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    SelectDatabase { database: String },
    UserExists { database: String, username: String },
    CreateUser { database: String, username: String },
    GrantRole { database: String, username: String, role: String },
    UpdatePassword { database: String, username: String },
    CollectionExists { database: String, collection: String },
    CreateCollection { database: String, collection: String },
}

impl AdminCall {
    pub fn is_collection_creation(&self) -> bool {
        matches!(self, AdminCall::CreateCollection { .. })
    }
}

#[derive(Debug, Default)]
struct StoredUser {
    password: String,
    // (role, scope database)
    roles: BTreeSet<(String, String)>,
}

#[derive(Debug, Default)]
struct DatabaseState {
    users: BTreeMap<String, StoredUser>,
    collections: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    databases: HashMap<String, DatabaseState>,
    calls: Vec<AdminCall>,
    failing_collections: HashSet<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryAdmin {
    state: Arc<Mutex<State>>,
}

impl InMemoryAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every later `create_collection` for `name` fail with a backend error.
    pub fn fail_on_collection(&self, name: impl Into<String>) {
        self.state().failing_collections.insert(name.into());
    }

    pub fn seed_collection(&self, database: &str, name: &str) {
        let mut state = self.state();
        let db = state.databases.entry(database.to_string()).or_default();
        if !db.collections.iter().any(|c| c == name) {
            db.collections.push(name.to_string());
        }
    }

    pub fn seed_user(&self, database: &str, user: &UserDescriptor) {
        let mut state = self.state();
        let stored = state
            .databases
            .entry(database.to_string())
            .or_default()
            .users
            .entry(user.username.clone())
            .or_default();
        stored.password = user.password.clone();
        stored
            .roles
            .insert((user.role.clone(), user.scope_database.clone()));
    }

    /// Collections of `database` in creation order.
    pub fn collections(&self, database: &str) -> Vec<String> {
        self.state()
            .databases
            .get(database)
            .map(|db| db.collections.clone())
            .unwrap_or_default()
    }

    pub fn usernames(&self, database: &str) -> Vec<String> {
        self.state()
            .databases
            .get(database)
            .map(|db| db.users.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Roles of a user as `(role, scope database)` pairs, `None` if absent.
    pub fn user_roles(&self, database: &str, username: &str) -> Option<Vec<(String, String)>> {
        self.state()
            .databases
            .get(database)
            .and_then(|db| db.users.get(username))
            .map(|user| user.roles.iter().cloned().collect())
    }

    pub fn user_password(&self, database: &str, username: &str) -> Option<String> {
        self.state()
            .databases
            .get(database)
            .and_then(|db| db.users.get(username))
            .map(|user| user.password.clone())
    }

    pub fn calls(&self) -> Vec<AdminCall> {
        self.state().calls.clone()
    }
}

impl AdminClient for InMemoryAdmin {
    type Database = InMemoryDatabase;

    fn select_database(&self, target: &DatabaseTarget) -> InMemoryDatabase {
        self.state().calls.push(AdminCall::SelectDatabase {
            database: target.to_string(),
        });
        InMemoryDatabase {
            name: target.to_string(),
            admin: self.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryDatabase {
    name: String,
    admin: InMemoryAdmin,
}

#[async_trait]
impl DatabaseAdmin for InMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn user_exists(&self, username: &str) -> ProvisionResult<bool> {
        let mut state = self.admin.state();
        state.calls.push(AdminCall::UserExists {
            database: self.name.clone(),
            username: username.to_string(),
        });
        Ok(state
            .databases
            .get(&self.name)
            .map_or(false, |db| db.users.contains_key(username)))
    }

    async fn create_user(&self, user: &UserDescriptor) -> ProvisionResult<()> {
        let mut state = self.admin.state();
        state.calls.push(AdminCall::CreateUser {
            database: self.name.clone(),
            username: user.username.clone(),
        });

        let db = state.databases.entry(self.name.clone()).or_default();
        if db.users.contains_key(&user.username) {
            return Err(ProvisionError::UserExists {
                username: user.username.clone(),
                database: self.name.clone(),
            });
        }
        let mut stored = StoredUser {
            password: user.password.clone(),
            ..StoredUser::default()
        };
        stored
            .roles
            .insert((user.role.clone(), user.scope_database.clone()));
        db.users.insert(user.username.clone(), stored);
        debug!("in-memory: created user {} in {}", user.username, self.name);
        Ok(())
    }

    async fn grant_role(&self, user: &UserDescriptor) -> ProvisionResult<()> {
        let mut state = self.admin.state();
        state.calls.push(AdminCall::GrantRole {
            database: self.name.clone(),
            username: user.username.clone(),
            role: user.role.clone(),
        });

        let stored = state
            .databases
            .get_mut(&self.name)
            .and_then(|db| db.users.get_mut(&user.username))
            .ok_or_else(|| {
                ProvisionError::Backend(format!(
                    "could not find user {}@{}",
                    user.username, self.name
                ))
            })?;
        stored
            .roles
            .insert((user.role.clone(), user.scope_database.clone()));
        Ok(())
    }

    async fn update_password(&self, user: &UserDescriptor) -> ProvisionResult<()> {
        let mut state = self.admin.state();
        state.calls.push(AdminCall::UpdatePassword {
            database: self.name.clone(),
            username: user.username.clone(),
        });

        let stored = state
            .databases
            .get_mut(&self.name)
            .and_then(|db| db.users.get_mut(&user.username))
            .ok_or_else(|| {
                ProvisionError::Backend(format!(
                    "could not find user {}@{}",
                    user.username, self.name
                ))
            })?;
        stored.password = user.password.clone();
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> ProvisionResult<bool> {
        let mut state = self.admin.state();
        state.calls.push(AdminCall::CollectionExists {
            database: self.name.clone(),
            collection: name.to_string(),
        });
        Ok(state
            .databases
            .get(&self.name)
            .map_or(false, |db| db.collections.iter().any(|c| c == name)))
    }

    async fn create_collection(&self, name: &str) -> ProvisionResult<()> {
        let mut state = self.admin.state();
        state.calls.push(AdminCall::CreateCollection {
            database: self.name.clone(),
            collection: name.to_string(),
        });

        if state.failing_collections.contains(name) {
            return Err(ProvisionError::Backend(format!(
                "injected failure creating {}",
                name
            )));
        }

        let db = state.databases.entry(self.name.clone()).or_default();
        if db.collections.iter().any(|c| c == name) {
            return Err(ProvisionError::CollectionExists {
                collection: name.to_string(),
                database: self.name.clone(),
            });
        }
        db.collections.push(name.to_string());
        debug!("in-memory: created collection {} in {}", name, self.name);
        Ok(())
    }
}
