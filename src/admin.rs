use async_trait::async_trait;
use mongodb::{
    bson::{self, doc, Bson, Document},
    error::{Error as MongoError, ErrorKind},
    options::ClientOptions,
    Client, Database,
};
use tracing::{debug, error, info};

use crate::{
    error::{ProvisionError, ProvisionResult},
    models::{DatabaseTarget, UserDescriptor},
};

const DUPLICATE_USER_CODE: i32 = 51003;
const NAMESPACE_EXISTS_CODE: i32 = 48;

/// Entry point of a database administration backend.
pub trait AdminClient: Send + Sync {
    type Database: DatabaseAdmin;

    /// Opens the administration context of one database.
    fn select_database(&self, target: &DatabaseTarget) -> Self::Database;
}

/// Administrative operations scoped to a single selected database.
#[async_trait]
pub trait DatabaseAdmin: Send + Sync {
    fn name(&self) -> &str;

    async fn user_exists(&self, username: &str) -> ProvisionResult<bool>;

    /// Fails with [`ProvisionError::UserExists`] when the user is already defined.
    async fn create_user(&self, user: &UserDescriptor) -> ProvisionResult<()>;

    async fn grant_role(&self, user: &UserDescriptor) -> ProvisionResult<()>;

    /// Replaces the password of an existing user.
    async fn update_password(&self, user: &UserDescriptor) -> ProvisionResult<()>;

    async fn collection_exists(&self, name: &str) -> ProvisionResult<bool>;

    /// Fails with [`ProvisionError::CollectionExists`] when the collection is already there.
    async fn create_collection(&self, name: &str) -> ProvisionResult<()>;
}

/// [`AdminClient`] backed by the MongoDB driver.
#[derive(Debug, Clone)]
pub struct MongoAdmin {
    client: Client,
}

impl MongoAdmin {
    /// Connects and pings `admin` so an unreachable server fails here rather
    /// than halfway through provisioning.
    pub async fn connect(uri: &str) -> ProvisionResult<Self> {
        let options = ClientOptions::parse(uri).await.map_err(|e| {
            error!("Failed to parse MongoDB URI: {}", e);
            ProvisionError::from(e)
        })?;
        let client = Client::with_options(options)?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                error!("MongoDB ping failed: {}", e);
                ProvisionError::from(e)
            })?;

        info!("Connected to MongoDB");
        Ok(MongoAdmin { client })
    }
}

impl AdminClient for MongoAdmin {
    type Database = MongoDatabaseAdmin;

    fn select_database(&self, target: &DatabaseTarget) -> MongoDatabaseAdmin {
        MongoDatabaseAdmin {
            database: self.client.database(target.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MongoDatabaseAdmin {
    database: Database,
}

fn command_code(err: &MongoError) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => Some(command.code),
        _ => None,
    }
}

fn roles_array(user: &UserDescriptor) -> ProvisionResult<Bson> {
    let grant = bson::to_bson(&user.role_grant())
        .map_err(|e| ProvisionError::Backend(format!("cannot encode role: {}", e)))?;
    Ok(Bson::Array(vec![grant]))
}

fn create_user_command(user: &UserDescriptor) -> ProvisionResult<Document> {
    Ok(doc! {
        "createUser": user.username.as_str(),
        "pwd": user.password.as_str(),
        "roles": roles_array(user)?,
    })
}

fn grant_role_command(user: &UserDescriptor) -> ProvisionResult<Document> {
    Ok(doc! {
        "grantRolesToUser": user.username.as_str(),
        "roles": roles_array(user)?,
    })
}

fn update_password_command(user: &UserDescriptor) -> Document {
    doc! {
        "updateUser": user.username.as_str(),
        "pwd": user.password.as_str(),
    }
}

#[async_trait]
impl DatabaseAdmin for MongoDatabaseAdmin {
    fn name(&self) -> &str {
        self.database.name()
    }

    async fn user_exists(&self, username: &str) -> ProvisionResult<bool> {
        let reply: Document = self
            .database
            .run_command(doc! { "usersInfo": username }, None)
            .await
            .map_err(|e| {
                error!("Failed to look up user {}: {}", username, e);
                ProvisionError::from(e)
            })?;

        let users = reply.get_array("users").map_err(|e| {
            ProvisionError::Backend(format!("malformed usersInfo reply: {}", e))
        })?;
        debug!("usersInfo for {} returned {} entries", username, users.len());
        Ok(!users.is_empty())
    }

    async fn create_user(&self, user: &UserDescriptor) -> ProvisionResult<()> {
        let command = create_user_command(user)?;

        match self.database.run_command(command, None).await {
            Ok(_) => Ok(()),
            Err(e) if command_code(&e) == Some(DUPLICATE_USER_CODE) => {
                Err(ProvisionError::UserExists {
                    username: user.username.clone(),
                    database: self.name().to_string(),
                })
            }
            Err(e) => {
                error!("Failed to create user {}: {}", user.username, e);
                Err(e.into())
            }
        }
    }

    async fn grant_role(&self, user: &UserDescriptor) -> ProvisionResult<()> {
        let command = grant_role_command(user)?;

        self.database.run_command(command, None).await.map_err(|e| {
            error!("Failed to grant {} to {}: {}", user.role, user.username, e);
            ProvisionError::from(e)
        })?;
        Ok(())
    }

    async fn update_password(&self, user: &UserDescriptor) -> ProvisionResult<()> {
        self.database
            .run_command(update_password_command(user), None)
            .await
            .map_err(|e| {
                error!("Failed to update password of {}: {}", user.username, e);
                ProvisionError::from(e)
            })?;
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> ProvisionResult<bool> {
        let names = self
            .database
            .list_collection_names(doc! { "name": name })
            .await
            .map_err(|e| {
                error!("Failed to list collections: {}", e);
                ProvisionError::from(e)
            })?;
        Ok(names.iter().any(|existing| existing == name))
    }

    async fn create_collection(&self, name: &str) -> ProvisionResult<()> {
        match self.database.create_collection(name, None).await {
            Ok(()) => Ok(()),
            Err(e) if command_code(&e) == Some(NAMESPACE_EXISTS_CODE) => {
                Err(ProvisionError::CollectionExists {
                    collection: name.to_string(),
                    database: self.name().to_string(),
                })
            }
            Err(e) => {
                error!("Failed to create collection {}: {}", name, e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev() -> UserDescriptor {
        UserDescriptor::new("dev", "dev_pass", "readWrite", "user")
    }

    #[test]
    fn create_user_command_scopes_role_to_database() {
        let command = create_user_command(&dev()).unwrap();
        assert_eq!(
            command,
            doc! {
                "createUser": "dev",
                "pwd": "dev_pass",
                "roles": [{ "role": "readWrite", "db": "user" }],
            }
        );
        // the command name must lead the document
        assert_eq!(command.keys().next().map(String::as_str), Some("createUser"));
    }

    #[test]
    fn grant_role_command_carries_no_password() {
        let command = grant_role_command(&dev()).unwrap();
        assert_eq!(
            command,
            doc! {
                "grantRolesToUser": "dev",
                "roles": [{ "role": "readWrite", "db": "user" }],
            }
        );
    }

    #[test]
    fn update_password_command_sets_pwd() {
        assert_eq!(
            update_password_command(&dev()),
            doc! { "updateUser": "dev", "pwd": "dev_pass" }
        );
    }

    #[tokio::test]
    async fn client_side_errors_have_no_command_code() {
        let err = ClientOptions::parse("not-a-uri").await.unwrap_err();
        assert_eq!(command_code(&err), None);
    }
}
