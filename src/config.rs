use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CATEGORY: &str = "Concept";
pub const DEFAULT_GRAPH_ID: &str = "demo-biology";
pub const DEFAULT_PORT: u16 = 8000;

/// Contents of `kgstore.toml`. Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct KgConfig {
    pub database: Option<String>,
    pub default_category: Option<String>,
    pub graph_id: Option<String>,
    pub port: Option<u16>,
    pub transition_ms: Option<u64>,
    pub busy_timeout_ms: Option<u64>,
}

impl KgConfig {
    /// Database path: explicit flag, then config, then `.kgstore/kgstore.db` under `base`
    pub fn database_path(&self, flag: Option<PathBuf>, base: &Path) -> PathBuf {
        flag.or_else(|| self.database.as_ref().map(PathBuf::from))
            .unwrap_or_else(|| default_database_path_in(base))
    }

    pub fn default_category(&self) -> &str {
        self.default_category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
    }

    pub fn graph_id(&self) -> &str {
        self.graph_id.as_deref().unwrap_or(DEFAULT_GRAPH_ID)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn transition(&self) -> Duration {
        self.transition_ms
            .map(Duration::from_millis)
            .unwrap_or(crate::extraction::DEFAULT_TRANSITION)
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(crate::storage::DEFAULT_BUSY_TIMEOUT)
    }
}

/// Database path that keeps the whole graph in memory for the life of the process
pub const IN_MEMORY_DATABASE: &str = ":memory:";

const CONFIG_FILE_NAME: &str = "kgstore.toml";

pub fn default_config_path() -> PathBuf {
    PathBuf::from(CONFIG_FILE_NAME)
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".kgstore").join("kgstore.db")
}

pub fn is_in_memory(db_path: &Path) -> bool {
    db_path.as_os_str() == IN_MEMORY_DATABASE
}

/// Load the config file. A missing file is `None`, not an error.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<KgConfig>> {
    let path = path.map_or_else(default_config_path, Path::to_path_buf);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };

    let config: KgConfig = toml::from_str(&contents)
        .with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(Some(config))
}

/// Write `config` as TOML. Without `force` an existing file is left alone.
pub fn write_config(path: &Path, config: &KgConfig, force: bool) -> anyhow::Result<()> {
    let contents = toml::to_string_pretty(config)?;

    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    let mut file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display())
        }
        Err(e) => return Err(e).with_context(|| format!("failed to write {}", path.display())),
    };
    file.write_all(contents.as_bytes())?;
    Ok(())
}

/// Create the directory a database file lives in. In-memory databases need none.
pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if is_in_memory(db_path) {
        return Ok(());
    }
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kgstore.toml");
        let config = KgConfig {
            database: Some("graph.db".into()),
            default_category: Some("Structure".into()),
            port: Some(9001),
            ..Default::default()
        };

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.default_category(), "Structure");
        assert_eq!(loaded.port(), 9001);
        assert_eq!(loaded.graph_id(), DEFAULT_GRAPH_ID);
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kgstore.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();
        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("kgstore.toml"));
    }

    #[test]
    fn test_database_path_precedence() {
        let base = Path::new("/work");
        let empty = KgConfig::default();
        assert_eq!(empty.database_path(None, base), PathBuf::from("/work/.kgstore/kgstore.db"));

        let configured = KgConfig {
            database: Some("from_config.db".into()),
            ..Default::default()
        };
        assert_eq!(configured.database_path(None, base), PathBuf::from("from_config.db"));
        assert_eq!(
            configured.database_path(Some(PathBuf::from("flag.db")), base),
            PathBuf::from("flag.db")
        );
    }

    #[test]
    fn test_blank_default_category_falls_back() {
        let config = KgConfig {
            default_category: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(config.default_category(), DEFAULT_CATEGORY);
    }

    #[test]
    fn test_in_memory_database_needs_no_dir() {
        let path = Path::new(IN_MEMORY_DATABASE);
        assert!(is_in_memory(path));
        assert!(!is_in_memory(Path::new("memory.db")));
        ensure_db_dir(path).unwrap();
        assert!(!Path::new(IN_MEMORY_DATABASE).exists());
    }

    #[test]
    fn test_refused_overwrite_keeps_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kgstore.toml");
        std::fs::write(&path, "port = 1234\n").unwrap();

        let err = write_config(&path, &KgConfig::default(), false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(load_config(Some(&path)).unwrap().unwrap().port(), 1234);
    }

    #[test]
    fn test_ensure_db_dir_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("nested").join("kg.db");
        ensure_db_dir(&db).unwrap();
        assert!(db.parent().unwrap().is_dir());
    }
}
