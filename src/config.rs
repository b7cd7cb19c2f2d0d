use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::SchemaDefinition;
use crate::providers::openai::DEFAULT_BASE_URL;

const CONFIG_FILE_NAME: &str = ".pipegpt.yaml";
const ENV_PREFIX: &str = "PIPEGPT";
const DEFAULT_MODEL: &str = "gpt-4";
const DEFAULT_TIMEOUT_SECS: u64 = 240;
pub const DEFAULT_ROLE: &str = "Act like you are professional IT engineer to help solve user's business problem in enterprise IT tech company.";

const FUNCTION_CALL_KEY: &str = "function-call";
const RESERVED_SECTIONS: [&str; 2] = ["api", "default"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}'", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file '{}'", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error(
        "API key is not configured; pass --key, set PIPEGPT_API_KEY or add api.key to the config file"
    )]
    MissingApiKey,
    #[error("invalid timeout '{0}'; expected a duration such as '240s', '2m' or '1m30s'")]
    InvalidTimeout(String),
    #[error("'api.conversion' must be comma separated key=value pairs, got '{0}'")]
    InvalidConversion(String),
    #[error(
        "unknown task definition '{name}'; expected keys 'role' and 'prompt', optionally with 'function-call'"
    )]
    UnknownTaskDefinition { name: String },
    #[error("invalid task definition '{name}': {reason}")]
    InvalidTask { name: String, reason: String },
    #[error("invalid function-call schema in task '{name}'")]
    InvalidSchema {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Where outbound requests go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiTarget {
    Direct {
        base_url: String,
    },
    /// Gateway deployments are addressed by name; logical model names are
    /// translated through `model_map` and pass through when absent.
    Gateway {
        endpoint: String,
        model_map: HashMap<String, String>,
    },
}

impl ApiTarget {
    pub fn outbound_model<'a>(&'a self, model: &'a str) -> &'a str {
        match self {
            Self::Direct { .. } => model,
            Self::Gateway { model_map, .. } => {
                model_map.get(model).map(String::as_str).unwrap_or(model)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    pub target: ApiTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    Generic,
    FunctionCall(Vec<SchemaDefinition>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinition {
    pub role: String,
    pub prompt: String,
    pub kind: TaskKind,
}

/// Values supplied on the command line. They win over every other source.
#[derive(Debug, Clone, Default)]
pub struct ApiOverrides {
    pub key: Option<String>,
    pub model: Option<String>,
    pub timeout: Option<String>,
    pub endpoint: Option<String>,
    pub conversion: Option<String>,
    pub base_url: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub client: ClientConfig,
    pub default_role: String,
    pub tasks: BTreeMap<String, TaskDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(u64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Conversion {
    Text(String),
    Table(HashMap<String, String>),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiSection {
    key: Option<String>,
    model: Option<String>,
    timeout: Option<Scalar>,
    endpoint: Option<String>,
    conversion: Option<Conversion>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DefaultSection {
    role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api: ApiSection,
    default: DefaultSection,
    #[serde(flatten)]
    tasks: BTreeMap<String, serde_yaml::Value>,
}

impl FileConfig {
    fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match discover_config_file() {
                Some(path) => path,
                None => {
                    debug!("no config file found, using environment and defaults");
                    return Ok(Self::default());
                }
            },
        };

        let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::parse(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }
}

fn discover_config_file() -> Option<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(CONFIG_FILE_NAME));
    }
    candidates.into_iter().find(|path| path.is_file())
}

impl Config {
    pub fn load(path: Option<&Path>, overrides: &ApiOverrides) -> Result<Self, ConfigError> {
        let file = FileConfig::load(path)?;
        Self::resolve(file, overrides, |key| env::var(key).ok())
    }

    fn resolve(
        file: FileConfig,
        overrides: &ApiOverrides,
        mut get_var: impl FnMut(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut lookup = |flag: &Option<String>, key: &str, from_file: Option<String>| {
            non_empty(flag.clone())
                .or_else(|| non_empty(get_var(&env_key(&["API", key]))))
                .or_else(|| non_empty(from_file))
        };

        let api = file.api;
        let api_key = lookup(&overrides.key, "KEY", api.key);
        let model = lookup(&overrides.model, "MODEL", api.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let timeout = match lookup(
            &overrides.timeout,
            "TIMEOUT",
            api.timeout.map(Scalar::into_string),
        ) {
            Some(raw) => parse_duration(&raw).ok_or(ConfigError::InvalidTimeout(raw))?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };
        let endpoint = lookup(&overrides.endpoint, "ENDPOINT", api.endpoint);
        let base_url = lookup(&overrides.base_url, "BASE_URL", api.base_url)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let conversion = match lookup(&overrides.conversion, "CONVERSION", None) {
            Some(raw) => parse_conversion(&raw)?,
            None => match api.conversion {
                Some(Conversion::Text(raw)) => parse_conversion(&raw)?,
                Some(Conversion::Table(table)) => table,
                None => HashMap::new(),
            },
        };

        let default_role = non_empty(overrides.role.clone())
            .or_else(|| non_empty(get_var(&env_key(&["DEFAULT", "ROLE"]))))
            .or_else(|| non_empty(file.default.role))
            .unwrap_or_else(|| DEFAULT_ROLE.to_string());

        let mut tasks = BTreeMap::new();
        for (name, value) in file.tasks {
            if RESERVED_SECTIONS.contains(&name.as_str()) {
                continue;
            }
            let mut task = TaskDefinition::from_yaml(&name, &value)?;
            if let Some(role) = non_empty(get_var(&env_key(&[&name, "ROLE"]))) {
                task.role = role;
            }
            if let Some(prompt) = non_empty(get_var(&env_key(&[&name, "PROMPT"]))) {
                task.prompt = prompt;
            }
            tasks.insert(name, task);
        }

        let Some(api_key) = api_key else {
            warn!("no API key configured");
            return Err(ConfigError::MissingApiKey);
        };

        let target = match endpoint {
            Some(endpoint) => ApiTarget::Gateway {
                endpoint,
                model_map: conversion,
            },
            None => {
                if !conversion.is_empty() {
                    warn!("model conversion table is ignored without an API endpoint");
                }
                ApiTarget::Direct { base_url }
            }
        };

        Ok(Self {
            client: ClientConfig {
                api_key,
                model,
                timeout,
                target,
            },
            default_role,
            tasks,
        })
    }

    pub fn task(&self, name: &str) -> Option<&TaskDefinition> {
        self.tasks.get(name)
    }
}

impl TaskDefinition {
    fn from_yaml(name: &str, value: &serde_yaml::Value) -> Result<Self, ConfigError> {
        let unknown = || ConfigError::UnknownTaskDefinition {
            name: name.to_string(),
        };
        let mapping = value.as_mapping().ok_or_else(unknown)?;

        let mut keys: Vec<&str> = mapping.keys().filter_map(|key| key.as_str()).collect();
        if keys.len() != mapping.len() {
            return Err(unknown());
        }
        keys.sort_unstable();

        let text_field = |field: &str| -> Result<String, ConfigError> {
            match mapping.get(field) {
                Some(serde_yaml::Value::String(text)) => Ok(text.clone()),
                Some(serde_yaml::Value::Null) => Ok(String::new()),
                _ => Err(ConfigError::InvalidTask {
                    name: name.to_string(),
                    reason: format!("'{field}' must be a string"),
                }),
            }
        };

        let kind = match keys.as_slice() {
            ["prompt", "role"] => TaskKind::Generic,
            [FUNCTION_CALL_KEY, "prompt", "role"] => {
                let raw = mapping.get(FUNCTION_CALL_KEY).cloned().unwrap_or_default();
                let schemas: Vec<SchemaDefinition> =
                    serde_yaml::from_value(raw).map_err(|source| ConfigError::InvalidSchema {
                        name: name.to_string(),
                        source,
                    })?;
                TaskKind::FunctionCall(schemas)
            }
            _ => return Err(unknown()),
        };

        Ok(Self {
            role: text_field("role")?,
            prompt: text_field("prompt")?,
            kind,
        })
    }
}

fn env_key(parts: &[&str]) -> String {
    let mut key = String::from(ENV_PREFIX);
    for part in parts {
        key.push('_');
        key.push_str(&part.to_ascii_uppercase().replace(['-', '.'], "_"));
    }
    key
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parses durations such as `240s`, `1m30s`, `1.5h` or `500ms`. A bare
/// integer is seconds. Zero is rejected.
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return (secs > 0).then(|| Duration::from_secs(secs));
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut total = 0.0_f64;
    let mut rest = raw;
    while !rest.is_empty() {
        let number_len = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest.find(is_number).unwrap_or(rest.len());
        let scale = match &rest[..unit_len] {
            "ms" => 0.001,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        total += value * scale;
        rest = &rest[unit_len..];
    }

    if total <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(total).ok()
}

fn parse_conversion(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut table = HashMap::new();
    if raw.trim().is_empty() {
        return Ok(table);
    }

    for pair in raw.split(',') {
        let pair = pair.trim();
        let mut parts = pair.split('=');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(logical), Some(deployment), None)
                if !logical.trim().is_empty() && !deployment.trim().is_empty() =>
            {
                table.insert(logical.trim().to_string(), deployment.trim().to_string());
            }
            _ => return Err(ConfigError::InvalidConversion(pair.to_string())),
        }
    }
    Ok(table)
}
