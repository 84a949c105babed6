use thiserror::Error;

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("user `{username}` already exists in database `{database}`")]
    UserExists { username: String, database: String },

    #[error("collection `{collection}` already exists in database `{database}`")]
    CollectionExists { collection: String, database: String },

    #[error("database client error: {0}")]
    Connection(#[from] mongodb::error::Error),

    #[error("invalid target database: {0}")]
    InvalidTarget(String),

    #[error("invalid collection: {0}")]
    InvalidCollection(String),

    #[error("invalid user descriptor: {0}")]
    InvalidUser(#[from] validator::ValidationErrors),

    #[error("missing configuration value `{0}`")]
    MissingConfig(&'static str),

    #[error("invalid value `{value}` for `{key}`")]
    InvalidConfig { key: &'static str, value: String },

    #[error("backend error: {0}")]
    Backend(String),
}
