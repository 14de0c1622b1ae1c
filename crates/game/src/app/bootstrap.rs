use std::path::PathBuf;
use std::sync::Arc;

use engine::{
    resolve_app_paths, resolve_font_path, AssetLoader, LoopConfig, Scene, StartupError,
    DEFAULT_LOADER_WORKERS,
};
use guide::{build_api_key, ChatDispatcher, ChatSession, HttpCompletionBackend, SettingsStore};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::gallery::{ChatPanel, GalleryScene};

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) scene: Box<dyn Scene>,
}

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Paths(#[from] StartupError),
    #[error("failed to start asset loader for {asset_dir}: {source}")]
    AssetLoader {
        asset_dir: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Gallery Startup ===");

    let paths = resolve_app_paths()?;
    info!(
        root = %paths.root.display(),
        assets = %paths.asset_dir.display(),
        "app_paths_resolved"
    );

    let loader = AssetLoader::new(paths.asset_dir.clone(), DEFAULT_LOADER_WORKERS).map_err(
        |source| BootstrapError::AssetLoader {
            asset_dir: paths.asset_dir.clone(),
            source,
        },
    )?;

    let store = SettingsStore::in_dir(&paths.data_dir);
    let build_key = build_api_key();
    info!(
        settings = %store.path().display(),
        build_key = build_key.is_some(),
        "chat_configured"
    );
    let session = ChatSession::new(Some(store), build_key);
    let chat = ChatPanel::new(session, start_chat_dispatcher());

    let font_path = resolve_font_path(&paths.asset_dir);
    info!(
        font = %font_path
            .as_deref()
            .map_or_else(|| "builtin".to_string(), |path| path.display().to_string()),
        "text_font_selected"
    );

    Ok(AppWiring {
        config: LoopConfig {
            font_path,
            ..LoopConfig::default()
        },
        scene: Box::new(GalleryScene::new(loader, chat)),
    })
}

/// The exhibit still runs without a chat worker; submissions then fail
/// with a visible bubble.
fn start_chat_dispatcher() -> Option<ChatDispatcher> {
    let backend = match HttpCompletionBackend::new() {
        Ok(backend) => backend,
        Err(error) => {
            warn!(error = %error, "chat_backend_unavailable");
            return None;
        }
    };
    match ChatDispatcher::new(Arc::new(backend)) {
        Ok(dispatcher) => Some(dispatcher),
        Err(error) => {
            warn!(error = %error, "chat_worker_spawn_failed");
            None
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
