//! Configuration file loader with multi-source merging

use super::file_config::{ConfigError, FileConfig};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

const PROJECT_FILES: [&str; 2] = ["shelfscan.toml", ".shelfscan.toml"];
const ENV_PREFIX: &str = "SHELFSCAN_";

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. Environment: `SHELFSCAN_RUN__COST_BUDGET=0.5` style variables
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./shelfscan.toml` or `./.shelfscan.toml`
    /// 4. Global: `$XDG_CONFIG_HOME/shelfscan/config.toml`
    /// 5. Default values
    pub fn load(config_path: Option<&Path>) -> Result<FileConfig, ConfigError> {
        // figment silently skips missing files
        if let Some(path) = config_path
            && !path.exists()
        {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        Self::figment(Self::global_config_path(), Self::project_config_path(), config_path)
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// Load only default configuration (for --no-config)
    pub fn load_defaults() -> FileConfig {
        FileConfig::default()
    }

    fn figment(
        global: Option<PathBuf>,
        project: Option<PathBuf>,
        explicit: Option<&Path>,
    ) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(global_path));
        }

        if let Some(project_path) = project {
            figment = figment.merge(Toml::file(project_path));
        }

        if let Some(path) = explicit {
            figment = figment.merge(Toml::file(path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Get the global config file path
    ///
    /// Returns `$XDG_CONFIG_HOME/shelfscan/config.toml` if set,
    /// otherwise the platform config directory equivalent.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("shelfscan").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Print the config file locations being used (for debugging)
    pub fn print_config_sources(explicit: Option<&Path>) {
        println!("Configuration sources (in priority order):");

        println!("  [     ] Env:     {}*", ENV_PREFIX);

        if let Some(path) = explicit {
            let mark = if path.exists() { "FOUND" } else { "MISSING" };
            println!("  [{:<5}] Explicit: {}", mark, path.display());
        }

        if let Some(path) = Self::project_config_path() {
            println!("  [FOUND] Project: {}", path.display());
        } else {
            println!("  [     ] Project: ./shelfscan.toml or ./.shelfscan.toml");
        }

        if let Some(path) = Self::global_config_path() {
            if path.exists() {
                println!("  [FOUND] Global:  {}", path.display());
            } else {
                println!("  [     ] Global:  {}", path.display());
            }
        }

        println!("  [     ] Default: built-in defaults");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn extract(
        global: Option<PathBuf>,
        project: Option<PathBuf>,
        explicit: Option<&Path>,
    ) -> FileConfig {
        ConfigLoader::figment(global, project, explicit)
            .extract()
            .unwrap()
    }

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert!(config.stages.is_empty());
        assert_eq!(config.run.max_iterations, 6);
    }

    #[test]
    fn test_global_config_path_returns_some() {
        let path = ConfigLoader::global_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("shelfscan"));
    }

    #[test]
    fn test_later_sources_override_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join("global.toml");
        let project = dir.path().join("project.toml");
        let explicit = dir.path().join("explicit.toml");

        fs::write(
            &global,
            "[run]\ncost_budget = 2.0\nmax_iterations = 3\n\n[stages.structure]\nmodels = [\"gpt-4o\"]\n",
        )
        .unwrap();
        fs::write(&project, "[run]\ncost_budget = 0.5\n").unwrap();
        fs::write(&explicit, "[run]\nmax_iterations = 9\n").unwrap();

        let config = extract(Some(global), Some(project), Some(explicit.as_path()));
        assert_eq!(config.run.cost_budget, 0.5);
        assert_eq!(config.run.max_iterations, 9);
        assert_eq!(config.stages["structure"].models, vec!["gpt-4o".to_string()]);
        // Untouched values keep their defaults
        assert_eq!(config.run.target_accuracy, 0.9);
    }

    #[test]
    fn test_missing_global_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = extract(Some(dir.path().join("absent.toml")), None, None);
        assert_eq!(config, FileConfig::default());
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            ConfigLoader::load(Some(missing.as_path())),
            Err(ConfigError::NotFound(path)) if path == missing
        ));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[run]\nmax_iterations = \"many\"\n").unwrap();
        assert!(ConfigLoader::load(Some(path.as_path())).is_err());
    }
}
