//! Startup state: configuration plus the file-backed stores

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::engine::EngineLink;
use crate::session::{SessionController, SessionError, Services};
use crate::store::{Catalog, CatalogDirs, IdentityRegistry, RankingStore};

/// Everything the session controller needs besides its engine link
pub struct AppState {
    pub config: Arc<Config>,
    pub catalog: Catalog,
    pub ranking: RankingStore,
    pub identities: IdentityRegistry,
}

impl AppState {
    pub async fn load(config: Config) -> Result<Self, SessionError> {
        let config = Arc::new(config);

        // Initialize catalog
        let dirs = CatalogDirs {
            preset_dir: config.preset_dir.clone(),
            level_dir: config.level_dir.clone(),
            mod_dir: config.mod_dir.clone(),
        };
        let catalog = Catalog::scan(dirs, config.policy.presets.clone()).await?;

        // Initialize stores
        let ranking = RankingStore::open(&config.ranking_file).await?;
        let identities = IdentityRegistry::open(&config.auth_file).await?;
        info!(
            ranked = ranking.total(),
            identities = identities.len(),
            "Stores loaded"
        );

        Ok(Self {
            config,
            catalog,
            ranking,
            identities,
        })
    }

    /// Hand the stores over to a controller driving `link`
    pub fn into_controller<L: EngineLink>(self, link: L) -> SessionController<L> {
        let services = Services {
            catalog: self.catalog,
            ranking: self.ranking,
            identities: self.identities,
        };
        SessionController::new(link, self.config.policy.clone(), services)
    }
}
