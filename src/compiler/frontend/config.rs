use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// File names searched by `Config::discover`, in order
pub const CONFIG_FILE_NAMES: [&str; 2] = [".paramspec.toml", "paramspec.toml"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub check: CheckConfig,

    #[serde(default)]
    pub errors: ErrorConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub overrides: HashMap<String, OverrideConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `P = ParamSpec("Q")` is rejected when set
    #[serde(default = "default_true")]
    pub require_matching_name: bool,

    /// Treat `__x` parameters as positional-only for the leading-parameter rule
    #[serde(default = "default_true")]
    pub dunder_positional: bool,

    #[serde(default)]
    pub join_strategy: JoinStrategy,

    #[serde(default = "default_true")]
    pub check_argument_types: bool,

    #[serde(default = "default_true")]
    pub check_return_types: bool,
}

/// How several candidates for one ParamSpec at a call site are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinStrategy {
    /// Common behavioral supertype of the candidates
    #[default]
    Supertype,
    /// Candidates must be equivalent
    Exact,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorConfig {
    #[serde(default = "default_100")]
    pub max_errors: usize,

    #[serde(default = "default_true")]
    pub show_suggestions: bool,

    #[serde(default = "default_true")]
    pub show_error_codes: bool,

    #[serde(default = "default_true")]
    pub color: bool,

    #[serde(default)]
    pub format: ErrorFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorFormat {
    #[default]
    Default,
    Json,
    Compact,
    Verbose,
}

impl std::str::FromStr for ErrorFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(ErrorFormat::Default),
            "json" => Ok(ErrorFormat::Json),
            "compact" => Ok(ErrorFormat::Compact),
            "verbose" => Ok(ErrorFormat::Verbose),
            other => Err(format!(
                "Unknown format '{}' (expected default, json, compact or verbose)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub include: Vec<String>,

    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverrideConfig {
    #[serde(default)]
    pub check: Option<CheckConfig>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_matching_name: true,
            dunder_positional: true,
            join_strategy: JoinStrategy::Supertype,
            check_argument_types: true,
            check_return_types: true,
        }
    }
}

impl Default for ErrorConfig {
    fn default() -> Self {
        Self {
            max_errors: 100,
            show_suggestions: true,
            show_error_codes: true,
            color: true,
            format: ErrorFormat::Default,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*.py".to_string()],
            exclude: vec![
                "**/__pycache__/**".to_string(),
                "**/venv/**".to_string(),
                "**/.venv/**".to_string(),
            ],
        }
    }
}

fn default_true() -> bool { true }
fn default_100() -> usize { 100 }

impl Config {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Find and load configuration file from current directory or parents
    pub fn discover() -> Self {
        match std::env::current_dir() {
            Ok(dir) => Self::discover_from(&dir),
            Err(_) => Self::default(),
        }
    }

    pub fn discover_from(start: &Path) -> Self {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            for name in CONFIG_FILE_NAMES {
                let config_path = dir.join(name);
                if config_path.exists() {
                    match Self::load(&config_path) {
                        Ok(config) => {
                            tracing::debug!(path = %config_path.display(), "Loaded config");
                            return config;
                        }
                        Err(e) => tracing::warn!(error = %e, "Ignoring unreadable config"),
                    }
                }
            }

            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Get configuration for specific file (applying overrides)
    pub fn for_file(&self, path: &Path) -> Config {
        let mut config = self.clone();

        // Sorted so that overlapping overrides apply deterministically
        let mut patterns: Vec<&String> = self.overrides.keys().collect();
        patterns.sort();

        for pattern in patterns {
            if Self::matches_glob(path, pattern) {
                if let Some(check) = &self.overrides[pattern].check {
                    config.check = check.clone();
                }
            }
        }

        config
    }

    fn matches_glob(path: &Path, pattern: &str) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        let normalized = normalized.trim_start_matches("./");

        match Pattern::new(pattern) {
            Ok(glob) => glob.matches(normalized),
            // A plain substring is still useful for hand-written overrides
            Err(_) => normalized.contains(pattern),
        }
    }

    /// Check if a path should be checked based on include/exclude patterns
    pub fn should_check(&self, path: &Path) -> bool {
        if self.paths.exclude.iter().any(|p| Self::matches_glob(path, p)) {
            return false;
        }

        self.paths.include.is_empty()
            || self.paths.include.iter().any(|p| Self::matches_glob(path, p))
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(path, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.check.enabled);
        assert!(config.check.require_matching_name);
        assert_eq!(config.check.join_strategy, JoinStrategy::Supertype);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[check]
require_matching_name = false
join_strategy = "exact"

[errors]
max_errors = 50
format = "json"
"#;

        let config = Config::parse(toml).unwrap();
        assert!(config.check.enabled);
        assert!(!config.check.require_matching_name);
        assert_eq!(config.check.join_strategy, JoinStrategy::Exact);
        assert_eq!(config.errors.max_errors, 50);
        assert_eq!(config.errors.format, ErrorFormat::Json);
    }

    #[test]
    fn test_parse_rejects_unknown_strategy() {
        assert!(Config::parse("[check]\njoin_strategy = \"widest\"\n").is_err());
    }

    #[test]
    fn test_should_check() {
        let config = Config::default();
        assert!(config.should_check(Path::new("src/main.py")));
        assert!(!config.should_check(Path::new("project/venv/lib/site.py")));
        assert!(!config.should_check(Path::new("src/readme.md")));
    }

    #[test]
    fn test_override_replaces_check_table() {
        let toml = r#"
[overrides."legacy/**"]
check = { require_matching_name = false }
"#;
        let config = Config::parse(toml).unwrap();

        assert!(!config.for_file(Path::new("legacy/old.py")).check.require_matching_name);
        assert!(config.for_file(Path::new("src/new.py")).check.require_matching_name);
    }

    #[test]
    fn test_generate_default_round_trips() {
        let rendered = Config::generate_default();
        let config = Config::parse(&rendered).unwrap();
        assert_eq!(config.check, CheckConfig::default());
    }

    #[test]
    fn test_discover_walks_parents() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".paramspec.toml"),
            "[errors]\nmax_errors = 7\n",
        )
        .unwrap();
        let nested = dir.path().join("pkg").join("sub");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(Config::discover_from(&nested).errors.max_errors, 7);
    }
}
