use tracing::{debug, info, instrument};
use validator::Validate;

use crate::{
    admin::{AdminClient, DatabaseAdmin},
    error::ProvisionResult,
    models::{CollectionSet, DatabaseTarget, ProvisionPolicy, UserDescriptor},
};

/// Brings a database to the declared state: one user holding one role and a
/// set of empty collections.
///
/// Steps run in order and the first failure aborts the rest. Nothing is
/// retried or rolled back.
pub struct Provisioner<C> {
    client: C,
    policy: ProvisionPolicy,
}

impl<C: AdminClient> Provisioner<C> {
    pub fn new(client: C, policy: ProvisionPolicy) -> Self {
        Provisioner { client, policy }
    }

    #[instrument(skip_all, fields(database = %target, policy = %self.policy))]
    pub async fn provision(
        &self,
        target: &DatabaseTarget,
        user: &UserDescriptor,
        collections: &CollectionSet,
    ) -> ProvisionResult<()> {
        user.validate()?;

        let database = self.client.select_database(target);
        self.ensure_user(&database, user).await?;

        for name in collections.iter() {
            self.ensure_collection(&database, name).await?;
        }

        info!(
            "Provisioned user {} and {} collection(s)",
            user.username,
            collections.len()
        );
        Ok(())
    }

    async fn ensure_user<D: DatabaseAdmin>(
        &self,
        database: &D,
        user: &UserDescriptor,
    ) -> ProvisionResult<()> {
        if self.policy == ProvisionPolicy::Idempotent
            && database.user_exists(&user.username).await?
        {
            debug!("User {} already exists, granting {}", user.username, user.role);
            database.grant_role(user).await?;
            database.update_password(user).await?;
            info!("Updated existing user {}", user.username);
            return Ok(());
        }

        database.create_user(user).await?;
        info!(
            "Created user {} with {} on {}",
            user.username, user.role, user.scope_database
        );
        Ok(())
    }

    async fn ensure_collection<D: DatabaseAdmin>(
        &self,
        database: &D,
        name: &str,
    ) -> ProvisionResult<()> {
        if self.policy == ProvisionPolicy::Idempotent && database.collection_exists(name).await? {
            debug!("Collection {} already exists", name);
            return Ok(());
        }

        database.create_collection(name).await?;
        info!("Created collection {}", name);
        Ok(())
    }
}
