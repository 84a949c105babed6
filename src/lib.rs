pub mod admin;
pub mod config;
pub mod error;
pub mod memory;
pub mod models;
pub mod provisioner;

pub use admin::{AdminClient, DatabaseAdmin, MongoAdmin};
pub use error::{ProvisionError, ProvisionResult};
pub use memory::InMemoryAdmin;
pub use models::{CollectionSet, DatabaseTarget, ProvisionPolicy, UserDescriptor};
pub use provisioner::Provisioner;
