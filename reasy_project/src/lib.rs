use std::{
    fmt::{Display, Formatter},
    fs,
    path::{Path, PathBuf},
};
use toml::Value;

pub const CONFIG_FILE_NAME: &str = "reasy.toml";
pub const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub registry_path: PathBuf,
    /// `None` falls back to the per-user clipboard directory.
    pub clipboard_dir: Option<PathBuf>,
    pub randomize_guids: bool,
    pub log_filter: String,
}

impl ProjectConfig {
    pub fn with_registry(registry_path: impl Into<PathBuf>) -> Self {
        Self {
            registry_path: registry_path.into(),
            clipboard_dir: None,
            randomize_guids: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }

    /// Makes relative paths relative to `root`, the directory holding `reasy.toml`.
    pub fn resolved(mut self, root: &Path) -> Self {
        self.registry_path = resolve_path(&self.registry_path, root);
        self.clipboard_dir = self.clipboard_dir.map(|dir| resolve_path(&dir, root));
        self
    }
}

#[derive(Debug)]
pub enum ProjectError {
    Io(std::io::Error),
    ParseToml(toml::de::Error),
    MissingField(&'static str),
    InvalidField(&'static str, String),
}

impl Display for ProjectError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::ParseToml(err) => write!(f, "{err}"),
            Self::MissingField(field) => write!(f, "missing required field `{field}`"),
            Self::InvalidField(field, reason) => write!(f, "invalid field `{field}`: {reason}"),
        }
    }
}

impl std::error::Error for ProjectError {}

impl From<std::io::Error> for ProjectError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<toml::de::Error> for ProjectError {
    fn from(value: toml::de::Error) -> Self {
        Self::ParseToml(value)
    }
}

pub fn resolve_path(input: &Path, root: &Path) -> PathBuf {
    if input.is_absolute() {
        input.to_path_buf()
    } else {
        root.join(input)
    }
}

/// Nearest `reasy.toml` in `start` or one of its ancestors.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Loads a config file and resolves its paths against the file's directory.
pub fn load_config(path: &Path) -> Result<ProjectConfig, ProjectError> {
    let contents = fs::read_to_string(path)?;
    let root = path.parent().unwrap_or(Path::new("."));
    Ok(parse_config_toml(&contents)?.resolved(root))
}

pub fn ensure_config_toml(root: &Path, registry_path: &str) -> std::io::Result<PathBuf> {
    let path = root.join(CONFIG_FILE_NAME);
    if !path.exists() {
        fs::create_dir_all(root)?;
        fs::write(&path, default_config_toml(registry_path))?;
    }
    Ok(path)
}

pub fn default_config_toml(registry_path: &str) -> String {
    format!(
        r#"[registry]
path = "{registry_path}"

[clipboard]
randomize_guids = true

[log]
filter = "{DEFAULT_LOG_FILTER}"
"#
    )
}

pub fn parse_config_toml(contents: &str) -> Result<ProjectConfig, ProjectError> {
    let parsed: Value = toml::from_str(contents)?;
    let registry = parsed
        .get("registry")
        .and_then(Value::as_table)
        .ok_or(ProjectError::MissingField("registry"))?;
    let registry_path = registry
        .get("path")
        .and_then(Value::as_str)
        .ok_or(ProjectError::MissingField("registry.path"))?
        .trim();
    if registry_path.is_empty() {
        return Err(ProjectError::InvalidField(
            "registry.path",
            "path must not be empty".to_string(),
        ));
    }

    let mut config = ProjectConfig::with_registry(registry_path);

    if let Some(clipboard) = parsed.get("clipboard") {
        let clipboard = clipboard.as_table().ok_or(ProjectError::InvalidField(
            "clipboard",
            "expected a table".to_string(),
        ))?;
        if let Some(dir) = clipboard.get("dir") {
            let dir = dir.as_str().ok_or(ProjectError::InvalidField(
                "clipboard.dir",
                "expected a string".to_string(),
            ))?;
            config.clipboard_dir = Some(PathBuf::from(dir));
        }
        if let Some(randomize) = clipboard.get("randomize_guids") {
            config.randomize_guids = randomize.as_bool().ok_or(ProjectError::InvalidField(
                "clipboard.randomize_guids",
                "expected a boolean".to_string(),
            ))?;
        }
    }

    if let Some(filter) = parsed.get("log").and_then(|log| log.get("filter")) {
        let filter = filter.as_str().ok_or(ProjectError::InvalidField(
            "log.filter",
            "expected a string".to_string(),
        ))?;
        validate_log_filter(filter)?;
        config.log_filter = filter.to_string();
    }

    Ok(config)
}

/// Accepts `level` or comma-separated `target=level` directives.
fn validate_log_filter(filter: &str) -> Result<(), ProjectError> {
    const LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];
    for directive in filter.split(',').map(str::trim).filter(|d| !d.is_empty()) {
        let level = directive.rsplit_once('=').map_or(directive, |(_, level)| level);
        if !LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            return Err(ProjectError::InvalidField(
                "log.filter",
                format!("unknown level `{level}`"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_toml_reads_all_sections() {
        let toml = r#"
[registry]
path = "rszre4.json"

[clipboard]
dir = "clip"
randomize_guids = false

[log]
filter = "reasy_io=debug,warn"
"#;
        let parsed = parse_config_toml(toml).expect("failed to parse reasy.toml");
        assert_eq!(parsed.registry_path, PathBuf::from("rszre4.json"));
        assert_eq!(parsed.clipboard_dir, Some(PathBuf::from("clip")));
        assert!(!parsed.randomize_guids);
        assert_eq!(parsed.log_filter, "reasy_io=debug,warn");
    }

    #[test]
    fn parse_config_toml_defaults_optional_sections() {
        let parsed = parse_config_toml("[registry]\npath = \"types.json\"\n")
            .expect("failed to parse reasy.toml");
        assert_eq!(parsed, ProjectConfig::with_registry("types.json"));
        assert!(parsed.randomize_guids);
        assert_eq!(parsed.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn parse_config_toml_requires_registry_path() {
        let err = parse_config_toml("[clipboard]\nrandomize_guids = true\n")
            .expect_err("expected parse failure");
        assert!(matches!(err, ProjectError::MissingField("registry")));

        let err = parse_config_toml("[registry]\n").expect_err("expected parse failure");
        assert!(matches!(err, ProjectError::MissingField("registry.path")));
    }

    #[test]
    fn parse_config_toml_rejects_bad_values() {
        let err = parse_config_toml("[registry]\npath = \"a.json\"\n[clipboard]\nrandomize_guids = \"yes\"\n")
            .expect_err("expected parse failure");
        assert!(matches!(
            err,
            ProjectError::InvalidField("clipboard.randomize_guids", _)
        ));

        let err = parse_config_toml("[registry]\npath = \"a.json\"\n[log]\nfilter = \"loud\"\n")
            .expect_err("expected parse failure");
        assert!(matches!(err, ProjectError::InvalidField("log.filter", _)));
    }

    #[test]
    fn default_config_round_trips() {
        let parsed = parse_config_toml(&default_config_toml("rszre4.json")).expect("default must parse");
        assert_eq!(parsed, ProjectConfig::with_registry("rszre4.json"));
    }

    #[test]
    fn resolved_paths_are_relative_to_config_dir() {
        let mut config = ProjectConfig::with_registry("types/rsz.json");
        config.clipboard_dir = Some(PathBuf::from("clip"));
        let root = Path::new("/work/mod");
        let config = config.resolved(root);
        assert_eq!(config.registry_path, PathBuf::from("/work/mod/types/rsz.json"));
        assert_eq!(config.clipboard_dir, Some(PathBuf::from("/work/mod/clip")));
    }
}
