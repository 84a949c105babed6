use std::process::ExitCode;

use mongo_provisioner::{
    config::Settings, InMemoryAdmin, MongoAdmin, ProvisionResult, Provisioner,
};
use tracing::{error, info, Level};
use tracing_subscriber::{self, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("mongo_provisioner=debug".parse().expect("valid directive")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Provisioning failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ProvisionResult<()> {
    let settings = Settings::init()?;
    info!(
        "Provisioning database {} ({} policy)",
        settings.target, settings.policy
    );

    if settings.dry_run {
        let admin = InMemoryAdmin::new();
        Provisioner::new(admin.clone(), settings.policy)
            .provision(&settings.target, &settings.user, &settings.collections)
            .await?;
        for call in admin.calls() {
            info!("dry run: {:?}", call);
        }
        return Ok(());
    }

    let admin = MongoAdmin::connect(&settings.mongo_uri).await?;
    Provisioner::new(admin, settings.policy)
        .provision(&settings.target, &settings.user, &settings.collections)
        .await
}
