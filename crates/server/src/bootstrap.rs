use std::sync::Arc;
use std::time::Duration;

use shopper_agent::RecommendationClient;
use shopper_core::config::{AppConfig, ConfigError};
use shopper_core::{Catalog, CatalogError};
use thiserror::Error;
use tracing::{info, warn};

use crate::sessions::SessionRegistry;

pub struct Application {
    pub config: AppConfig,
    pub catalog: Arc<Catalog>,
    pub client: RecommendationClient,
    pub sessions: SessionRegistry,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("catalogue load failed: {0}")]
    Catalog(#[from] CatalogError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let catalog = Arc::new(Catalog::from_config(&config.catalog)?);
    info!(
        event_name = "system.bootstrap.catalog_loaded",
        product_count = catalog.len(),
        source = config
            .catalog
            .path
            .as_deref()
            .map_or_else(|| "embedded".to_string(), |path| path.display().to_string()),
        "product catalogue loaded"
    );

    let client = RecommendationClient::from_config(&config.llm, Arc::clone(&catalog));
    if client.is_demo_mode() {
        warn!(
            event_name = "system.bootstrap.demo_mode",
            "no LLM credential configured; recommendations run in demo mode"
        );
    } else {
        info!(
            event_name = "system.bootstrap.llm_ready",
            model = %config.llm.model,
            endpoint = %config.llm.completions_url(),
            "LLM client configured"
        );
    }

    let sessions = SessionRegistry::with_limits(
        client.clone(),
        config.session.initial_context(),
        config.session.max_sessions,
        Duration::from_secs(config.session.idle_ttl_secs),
    );

    Ok(Application { config, catalog, client, sessions })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use shopper_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, Application, BootstrapError};

    fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?)
    }

    #[test]
    fn bootstrap_defaults_to_embedded_catalogue_in_demo_mode() {
        let app = bootstrap(LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/shopper.toml")),
            overrides: ConfigOverrides {
                llm_api_key: Some(String::new()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("bootstrap should succeed with defaults");

        assert_eq!(app.catalog.len(), 26);
        assert!(app.client.is_demo_mode());
        assert_eq!(app.sessions.len(), 0);
    }

    #[test]
    fn bootstrap_fails_fast_on_missing_catalogue_file() {
        let result = bootstrap(LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/shopper.toml")),
            overrides: ConfigOverrides {
                catalog_path: Some(PathBuf::from("/nonexistent/products.json")),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        assert!(matches!(result, Err(BootstrapError::Catalog(_))));
    }

    #[test]
    fn bootstrap_with_key_is_not_demo_mode() {
        let app = bootstrap(LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/shopper.toml")),
            overrides: ConfigOverrides {
                llm_api_key: Some("real-key".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("bootstrap should succeed");

        assert!(!app.client.is_demo_mode());
    }
}
