//! YAML configuration loader
//!
//! Custom tags understood while loading:
//! - `!include path` - Include another YAML file
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR [default]` - Environment variable substitution

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Source of environment variables for `!env_var`
pub type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// YAML loader resolving the custom tags relative to a config directory
pub struct YamlLoader {
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files currently being loaded, innermost last
    include_chain: Vec<PathBuf>,
    env: EnvLookup,
}

impl YamlLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    /// Create a loader with pre-loaded secrets
    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            include_chain: Vec::new(),
            env: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Replace the environment used by `!env_var`
    pub fn with_env(
        mut self,
        env: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.env = Box::new(env);
        self
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!("Loading YAML file: {:?}", path);

        if self.include_chain.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_chain.push(path.clone());
        let result = self.load_string(&content, &path);
        self.include_chain.pop();

        result
    }

    /// Load and process YAML from a string attributed to `source_path`
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        // An empty document is an empty configuration
        if value.is_null() {
            return Ok(Value::Mapping(Mapping::new()));
        }

        self.resolve(value, source_path)
    }

    fn resolve(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.resolve_tag(*tagged, source_path),
            Value::Mapping(map) => map
                .into_iter()
                .map(|(k, v)| Ok((k, self.resolve(v, source_path)?)))
                .collect::<ConfigResult<Mapping>>()
                .map(Value::Mapping),
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.resolve(v, source_path))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn resolve_tag(&mut self, tagged: TaggedValue, source_path: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!("Resolving tag '{}'", tag);

        match tag.as_str() {
            "!include" => {
                let target = self.include_target(&tagged.value, source_path)?;
                self.load_file(target)
            }
            "!secret" => {
                let key = scalar_arg(&tagged.value, "!secret")?;
                let secret = self.secrets.get(&key)?;
                debug!("Substituted secret: {}", key);
                Ok(Value::String(secret.to_string()))
            }
            "!env_var" => self.env_var(&tagged.value),
            _ => {
                let value = self.resolve(tagged.value, source_path)?;
                Ok(Value::Tagged(Box::new(TaggedValue {
                    tag: tagged.tag,
                    value,
                })))
            }
        }
    }

    /// `!env_var NAME` or `!env_var NAME default`
    fn env_var(&self, value: &Value) -> ConfigResult<Value> {
        let arg = scalar_arg(value, "!env_var")?;
        let (name, default) = match arg.split_once(char::is_whitespace) {
            Some((name, default)) => (name.to_string(), Some(default.trim().to_string())),
            None => (arg, None),
        };

        match ((self.env)(&name), default) {
            (Some(v), _) => {
                debug!("Substituted env var: {}", name);
                Ok(Value::String(v))
            }
            (None, Some(default)) => Ok(Value::String(default)),
            (None, None) => Err(ConfigError::EnvVarNotFound { var: name }),
        }
    }

    fn include_target(&self, value: &Value, source_path: &Path) -> ConfigResult<PathBuf> {
        let Value::String(raw) = value else {
            return Err(ConfigError::InvalidIncludePath {
                path: format!("{:?}", value),
                reason: "path must be a string".to_string(),
            });
        };

        let target = Path::new(raw);
        if target.is_absolute() {
            return Ok(target.to_path_buf());
        }
        let base = source_path.parent().unwrap_or(&self.config_dir);
        Ok(base.join(target))
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }
}

fn scalar_arg(value: &Value, tag: &str) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        _ => Err(ConfigError::InvalidValue {
            key: tag.to_string(),
            reason: "argument must be a string".to_string(),
        }),
    }
}

/// Load `file` from `config_dir`, resolving all custom tags
pub fn load_yaml(config_dir: impl AsRef<Path>, file: &str) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir.as_ref())?;
    loader.load_file(file)
}

/// Load YAML text with tags resolved against `config_dir`
pub fn load_yaml_string(config_dir: impl AsRef<Path>, content: &str) -> ConfigResult<Value> {
    let config_dir = config_dir.as_ref();
    let mut loader = YamlLoader::new(config_dir)?;
    loader.load_string(content, &config_dir.join("configuration.yaml"))
}
