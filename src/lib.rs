use std::sync::Arc;

use anyhow::Context;
use zeroize::Zeroizing;

mod domain;
mod interfaces;
mod infrastructure;
pub mod errors;
pub mod settings;
pub mod constants;
pub mod graceful_shutdown;
pub mod background_task;

pub use domain::{entities, use_cases};
pub use interfaces::{handlers, repositories, routes};
pub use infrastructure::{db, nasa, utils};

use db::postgres::{create_pool, run_migrations};
use errors::FetchError;
use nasa::apod_client::NasaApodClient;
use repositories::{
    daily_picture::PictureRepository, memory::InMemoryPictureRepo, picture_source::PictureSource,
    sqlx_repo::SqlxPictureRepo,
};
use settings::{AppConfig, StorageBackend};
use use_cases::apod::{ApodHandler, ResolverPolicy};

pub struct AppState {
    pub apod_handler: ApodHandler,
    pub admin_api_key: Option<Zeroizing<String>>,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        picture_repo: Arc<dyn PictureRepository>,
    ) -> Result<Self, FetchError> {
        let picture_source = Arc::new(NasaApodClient::new(&config.apod)?);

        Ok(Self::with_source(config, picture_repo, picture_source))
    }

    pub fn with_source(
        config: &AppConfig,
        picture_repo: Arc<dyn PictureRepository>,
        picture_source: Arc<dyn PictureSource>,
    ) -> Self {
        let apod_handler = ApodHandler::new(
            picture_repo,
            picture_source,
            ResolverPolicy::from(&config.apod),
        );

        AppState {
            apod_handler,
            admin_api_key: config.admin_api_key.clone().map(Zeroizing::new),
        }
    }
}

/// Opens the configured picture store, applying migrations for Postgres.
pub async fn connect_store(config: &AppConfig) -> anyhow::Result<Arc<dyn PictureRepository>> {
    match config.storage {
        StorageBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.database_max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            run_migrations(&pool)
                .await
                .context("Failed to apply database migrations")?;
            Ok(Arc::new(SqlxPictureRepo::new(pool)))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory picture storage; data is lost on restart");
            Ok(Arc::new(InMemoryPictureRepo::new()))
        }
    }
}
