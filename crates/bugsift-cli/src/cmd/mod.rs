pub mod audit;
pub mod dups;
pub mod overrides;
pub mod rebuild;
pub mod review;
pub mod show;
pub mod stats;
pub mod submit;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use bugsift_core::config::{self, Config, EmbedderKind, UserConfig};
use bugsift_core::db::{DEFAULT_DB_RELATIVE_PATH, SqliteStore};
use bugsift_search::semantic::{self, OrtEmbedder};
use bugsift_search::{Embedder, HashEmbedder};
use bugsift_triage::Engine;
use tracing::{debug, warn};

use crate::output::OutputMode;

/// Environment variable naming the acting principal.
pub const ACTOR_ENV: &str = "BUGSIFT_ACTOR";

/// Everything a command handler needs.
pub struct Session {
    pub engine: Engine,
    pub output: OutputMode,
    /// Principal recorded on manual overrides.
    pub actor: String,
}

/// Where to find state, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Locations {
    pub db: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

impl Locations {
    pub fn config_path(&self, project_root: &Path) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| config::config_path(project_root))
    }

    pub fn db_path(&self, project_root: &Path) -> PathBuf {
        self.db
            .clone()
            .unwrap_or_else(|| project_root.join(DEFAULT_DB_RELATIVE_PATH))
    }
}

/// Actor precedence: `--actor`, `BUGSIFT_ACTOR`, user config, project config.
pub fn resolve_actor(flag: Option<&str>, user: &UserConfig, config: &Config) -> String {
    flag.map(str::to_string)
        .or_else(|| std::env::var(ACTOR_ENV).ok())
        .filter(|a| !a.trim().is_empty())
        .or_else(|| user.actor.clone())
        .unwrap_or_else(|| config.engine.actor.clone())
}

/// Build the configured embedder. An unavailable semantic model falls back
/// to feature hashing with a warning.
pub fn select_embedder(config: &Config) -> Arc<dyn Embedder> {
    let dims = config.engine.dimensions;
    if config.engine.embedder == EmbedderKind::Ort {
        let loaded = config
            .engine
            .model_dir
            .clone()
            .map_or_else(semantic::model_cache_dir, Ok)
            .and_then(|dir| OrtEmbedder::load_dir(&dir, dims));
        match loaded {
            Ok(embedder) => return Arc::new(embedder),
            Err(err) => {
                warn!("semantic model unavailable; using hash embeddings: {err:#}");
            }
        }
    }
    Arc::new(HashEmbedder::new(dims))
}

/// Load configuration and open the engine over the project's database.
pub fn open_session(
    locations: &Locations,
    project_root: &Path,
    actor_flag: Option<&str>,
    format_flag: Option<OutputMode>,
    json_flag: bool,
) -> Result<Session> {
    let config_path = locations.config_path(project_root);
    let config = config::load_config(&config_path)?;
    let user = config::load_user_config()?;
    let output = crate::output::resolve_output_mode(
        format_flag,
        json_flag,
        config.output.as_deref().or(user.output.as_deref()),
    );
    let actor = resolve_actor(actor_flag, &user, &config);

    let db_path = locations.db_path(project_root);
    debug!(db = %db_path.display(), config = %config_path.display(), "opening engine");
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("open database {}", db_path.display()))?;
    let embedder = select_embedder(&config);
    debug!(model = embedder.model_name(), "embedder selected");
    let engine = Engine::new(config, Arc::new(store), embedder)?;

    Ok(Session {
        engine,
        output,
        actor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_flag_wins() {
        let user = UserConfig {
            actor: Some("from-user".into()),
            ..UserConfig::default()
        };
        assert_eq!(
            resolve_actor(Some("alice"), &user, &Config::default()),
            "alice"
        );
    }

    #[test]
    fn missing_semantic_model_falls_back_to_hashing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = Config::default();
        config.engine.embedder = EmbedderKind::Ort;
        config.engine.model_dir = Some(dir.path().to_path_buf());
        let embedder = select_embedder(&config);
        assert_eq!(embedder.model_name(), "bugsift-hash-v1-384");
        assert_eq!(embedder.dims(), 384);
    }

    #[test]
    fn default_paths_live_under_project_root() {
        let root = Path::new("/srv/triage");
        let locations = Locations::default();
        assert_eq!(
            locations.db_path(root),
            root.join(".bugsift/bugsift.sqlite3")
        );
        let explicit = Locations {
            db: Some(PathBuf::from("/tmp/x.sqlite3")),
            config: None,
        };
        assert_eq!(explicit.db_path(root), PathBuf::from("/tmp/x.sqlite3"));
    }
}
