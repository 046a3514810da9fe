//! Environment profile resolution.
//!
//! All environment access of the harness happens here. The resolver turns a
//! string map (the process environment, optionally seeded from the
//! per-environment variable file the operator selected) into one immutable
//! [`EnvironmentProfile`]. Every other component reads the profile and never
//! the raw environment.
//!
//! Credentials are stored as [`SecretString`] and are redacted in Debug output.

use crate::readiness::ProbePolicy;
use crate::targets::TargetKind;
use common::secret::SecretString;
use common::types::OrganizationId;
use reqwest::Url;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Environment tag, exported by the selected variable file.
pub const ENVIRONMENT_VAR: &str = "ENVIRONMENT";

/// Base URL of the AWS API edge (the emulation layer on `local`).
pub const BASE_URL_VAR: &str = "YONDA_BASE_URL";

/// Request timeout override in seconds.
pub const TIMEOUT_VAR: &str = "YONDA_TIMEOUT_SECONDS";

/// Smoke-enable flag.
pub const SMOKE_ENABLE_VAR: &str = "YONDA_ENABLE_SMOKE";

/// Production opt-in flag, independent of the smoke-enable flag.
pub const PRODUCTION_OPT_IN_VAR: &str = "YONDA_ALLOW_PROD";

/// Number of readiness probe attempts.
pub const PROBE_ATTEMPTS_VAR: &str = "YONDA_PROBE_ATTEMPTS";

/// Linear backoff step between readiness probe attempts, in milliseconds.
pub const PROBE_BACKOFF_VAR: &str = "YONDA_PROBE_BACKOFF_MS";

/// Knox API key, used as is in every environment.
pub const KNOX_API_KEY_VAR: &str = "KNOX_API_KEY";

/// Secrets Manager secret holding the Knox API key outside `local`.
pub const KNOX_API_KEY_SECRET_VAR: &str = "KNOX_API_KEY_SECRET_NAME";

/// Secrets Manager endpoint override.
pub const SECRETS_MANAGER_ENDPOINT_VAR: &str = "SECRETS_MANAGER_ENDPOINT";

/// Default base URL, applied only on `local`.
pub const DEFAULT_LOCAL_BASE_URL: &str = "http://localhost:4566";

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default AWS region used for request signing.
pub const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Ingestion queue name on the emulation layer.
pub const LOCAL_INGESTION_QUEUE_NAME: &str = "local-stack-source-ntd-queue";

/// Ingestion queue name in deployed environments.
pub const DEPLOYED_INGESTION_QUEUE_NAME: &str = "knox-ingestion-source-ntd-queue";

/// Variables collected into [`EnvironmentProfile::extra_credentials`].
pub const CREDENTIAL_VARS: [&str; 4] = [
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    KNOX_API_KEY_VAR,
];

/// Values that turn a boolean flag on. Anything else, including absence, is off.
const TRUE_TOKENS: [&str; 4] = ["1", "true", "TRUE", "True"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment '{0}': expected one of local, dev, prod")]
    InvalidEnvironment(String),

    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid readiness probe configuration: {0}")]
    InvalidProbe(String),

    #[error("Invalid URL in {var}: {reason}")]
    InvalidUrl { var: String, reason: String },

    #[error("Invalid TEST_ORGANIZATION_ID '{0}': expected a UUID")]
    InvalidOrganizationId(String),

    #[error("NTDV1 template override does not exist: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("Failed to read environment file {}: {reason}", path.display())]
    EnvFile { path: PathBuf, reason: String },
}

/// Target environment of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Local,
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Environment::Local),
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(ConfigError::InvalidEnvironment(value.to_string())),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved endpoint of one service target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEndpoint {
    pub base_url: Url,
    pub health_path: String,
}

impl TargetEndpoint {
    /// Full URL of the health path.
    pub fn health_url(&self) -> String {
        join_url(&self.base_url, &self.health_path)
    }
}

/// Where the ingestion queue is found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueRef {
    /// Fully-qualified queue URL, used as is.
    Url(String),
    /// Queue name, resolved through `GetQueueUrl`.
    Name(String),
}

/// Resolved, immutable configuration of one test session.
///
/// Built once by [`EnvironmentProfile::from_vars`]; fields are only readable.
#[derive(Debug, Clone)]
pub struct EnvironmentProfile {
    environment: Environment,
    base_url: Url,
    timeout: Duration,
    smoke_enabled: bool,
    production_opt_in: bool,
    extra_credentials: BTreeMap<String, SecretString>,
    targets: BTreeMap<TargetKind, TargetEndpoint>,
    probe: ProbePolicy,
    aws_region: String,
    ingestion_queue: QueueRef,
    test_organization_id: Option<OrganizationId>,
    template_path: Option<PathBuf>,
    knox_api_key_secret: Option<String>,
    secrets_manager_endpoint: Url,
}

impl EnvironmentProfile {
    /// Resolve the profile from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Resolve the profile from the process environment seeded by an env file.
    ///
    /// Variables already present in the process environment win over the file.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        let mut vars = read_env_file(path)?;
        vars.extend(env::vars());
        Self::from_vars(&vars)
    }

    /// Resolve the profile from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let environment = match lookup(vars, ENVIRONMENT_VAR) {
            Some(value) => value.parse()?,
            None => Environment::Local,
        };

        let base_url = match lookup(vars, BASE_URL_VAR) {
            Some(value) => parse_url(BASE_URL_VAR, value)?,
            None if environment == Environment::Local => {
                parse_url(BASE_URL_VAR, DEFAULT_LOCAL_BASE_URL)?
            }
            None => return Err(ConfigError::MissingEnvVar(BASE_URL_VAR.to_string())),
        };

        let timeout = match lookup(vars, TIMEOUT_VAR) {
            Some(value) => parse_timeout(value)?,
            None => DEFAULT_TIMEOUT,
        };

        let smoke_enabled = flag(vars, SMOKE_ENABLE_VAR);
        let production_opt_in = flag(vars, PRODUCTION_OPT_IN_VAR);

        let extra_credentials = CREDENTIAL_VARS
            .iter()
            .filter_map(|name| {
                lookup(vars, name).map(|value| (name.to_string(), SecretString::from(value)))
            })
            .collect();

        let mut targets = BTreeMap::new();
        for kind in TargetKind::DEPLOYMENT_ORDER {
            let endpoint = resolve_target(vars, kind, environment, &base_url)?;
            targets.insert(kind, endpoint);
        }

        let probe = resolve_probe(vars, timeout)?;

        let aws_region = lookup(vars, "AWS_REGION")
            .unwrap_or(DEFAULT_AWS_REGION)
            .to_string();

        // The emulation layer serves Secrets Manager on the edge URL.
        let secrets_manager_endpoint = match lookup(vars, SECRETS_MANAGER_ENDPOINT_VAR) {
            Some(value) => parse_url(SECRETS_MANAGER_ENDPOINT_VAR, value)?,
            None if environment == Environment::Local => base_url.clone(),
            None => parse_url(
                SECRETS_MANAGER_ENDPOINT_VAR,
                &format!("https://secretsmanager.{}.amazonaws.com", aws_region),
            )?,
        };

        let knox_api_key_secret = lookup(vars, KNOX_API_KEY_SECRET_VAR).map(str::to_string);

        let ingestion_queue = if let Some(url) = lookup(vars, "KNOX_INGESTION_QUEUE_URL") {
            QueueRef::Url(url.to_string())
        } else if let Some(name) = lookup(vars, "KNOX_INGESTION_QUEUE_NAME") {
            QueueRef::Name(name.to_string())
        } else if environment == Environment::Local {
            QueueRef::Name(LOCAL_INGESTION_QUEUE_NAME.to_string())
        } else {
            QueueRef::Name(DEPLOYED_INGESTION_QUEUE_NAME.to_string())
        };

        let test_organization_id = match lookup(vars, "TEST_ORGANIZATION_ID") {
            Some(value) => Some(OrganizationId(
                Uuid::parse_str(value)
                    .map_err(|_| ConfigError::InvalidOrganizationId(value.to_string()))?,
            )),
            None if environment == Environment::Local => Some(OrganizationId::new()),
            None => None,
        };

        let template_path = match lookup(vars, "NTDV1_TEMPLATE_PATH") {
            Some(value) => {
                let path = PathBuf::from(value);
                if !path.is_file() {
                    return Err(ConfigError::TemplateNotFound(path));
                }
                Some(path)
            }
            None => None,
        };

        Ok(Self {
            environment,
            base_url,
            timeout,
            smoke_enabled,
            production_opt_in,
            extra_credentials,
            targets,
            probe,
            aws_region,
            ingestion_queue,
            test_organization_id,
            template_path,
            knox_api_key_secret,
            secrets_manager_endpoint,
        })
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn smoke_enabled(&self) -> bool {
        self.smoke_enabled
    }

    pub fn production_opt_in(&self) -> bool {
        self.production_opt_in
    }

    pub fn extra_credentials(&self) -> &BTreeMap<String, SecretString> {
        &self.extra_credentials
    }

    /// Look up one credential by variable name.
    pub fn credential(&self, name: &str) -> Option<&SecretString> {
        self.extra_credentials.get(name)
    }

    /// Endpoint of a service target. Every target is resolved, so this is total.
    pub fn target(&self, kind: TargetKind) -> Option<&TargetEndpoint> {
        self.targets.get(&kind)
    }

    pub fn probe(&self) -> &ProbePolicy {
        &self.probe
    }

    pub fn aws_region(&self) -> &str {
        &self.aws_region
    }

    pub fn ingestion_queue(&self) -> &QueueRef {
        &self.ingestion_queue
    }

    pub fn test_organization_id(&self) -> Option<OrganizationId> {
        self.test_organization_id
    }

    pub fn template_path(&self) -> Option<&Path> {
        self.template_path.as_deref()
    }

    /// Name of the secret holding the Knox API key.
    pub fn knox_api_key_secret(&self) -> Option<&str> {
        self.knox_api_key_secret.as_deref()
    }

    pub fn secrets_manager_endpoint(&self) -> &Url {
        &self.secrets_manager_endpoint
    }
}

/// Read `KEY=VALUE` pairs from a per-environment variable file.
///
/// The process environment is not modified.
pub fn read_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let env_file_error = |reason: String| ConfigError::EnvFile {
        path: path.to_path_buf(),
        reason,
    };

    let iter = dotenvy::from_path_iter(path).map_err(|e| env_file_error(e.to_string()))?;

    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| env_file_error(e.to_string()))?;
        vars.insert(key, value);
    }

    Ok(vars)
}

/// Join a base URL and a path with exactly one `/` between them.
pub fn join_url(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Non-empty, trimmed value of a variable. Empty assignments count as absent.
fn lookup<'a>(vars: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    vars.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn flag(vars: &HashMap<String, String>, name: &str) -> bool {
    lookup(vars, name).is_some_and(|value| TRUE_TOKENS.contains(&value))
}

fn parse_url(var: &str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value.trim_end_matches('/')).map_err(|e| ConfigError::InvalidUrl {
        var: var.to_string(),
        reason: format!("'{}': {}", value, e),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            var: var.to_string(),
            reason: format!("'{}': scheme must be http or https", value),
        });
    }

    Ok(url)
}

fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    let seconds: f64 = value.parse().map_err(|e| {
        ConfigError::InvalidTimeout(format!(
            "{} must be a number of seconds, got '{}': {}",
            TIMEOUT_VAR, value, e
        ))
    })?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ConfigError::InvalidTimeout(format!(
            "{} must be positive, got {}",
            TIMEOUT_VAR, value
        )));
    }

    let timeout = Duration::try_from_secs_f64(seconds).map_err(|e| {
        ConfigError::InvalidTimeout(format!("{} is out of range, got {}: {}", TIMEOUT_VAR, value, e))
    })?;

    if timeout.is_zero() {
        return Err(ConfigError::InvalidTimeout(format!(
            "{} rounds to zero, got {}",
            TIMEOUT_VAR, value
        )));
    }

    Ok(timeout)
}

fn resolve_target(
    vars: &HashMap<String, String>,
    kind: TargetKind,
    environment: Environment,
    base_url: &Url,
) -> Result<TargetEndpoint, ConfigError> {
    let target_base = match kind.endpoint_var() {
        None => base_url.clone(),
        Some(var) => match lookup(vars, var) {
            Some(value) => parse_url(var, value)?,
            None if environment == Environment::Local => {
                parse_url(var, kind.default_local_endpoint())?
            }
            None => return Err(ConfigError::MissingEnvVar(var.to_string())),
        },
    };

    let health_path = lookup(vars, kind.health_path_var())
        .unwrap_or(kind.default_health_path(environment))
        .to_string();

    Ok(TargetEndpoint {
        base_url: target_base,
        health_path,
    })
}

fn resolve_probe(
    vars: &HashMap<String, String>,
    timeout: Duration,
) -> Result<ProbePolicy, ConfigError> {
    let mut probe = ProbePolicy::with_attempt_timeout(timeout);

    if let Some(value) = lookup(vars, PROBE_ATTEMPTS_VAR) {
        let attempts: u32 = value.parse().map_err(|e| {
            ConfigError::InvalidProbe(format!(
                "{} must be a positive integer, got '{}': {}",
                PROBE_ATTEMPTS_VAR, value, e
            ))
        })?;

        if attempts == 0 {
            return Err(ConfigError::InvalidProbe(format!(
                "{} must be greater than 0",
                PROBE_ATTEMPTS_VAR
            )));
        }

        probe.attempts = attempts;
    }

    if let Some(value) = lookup(vars, PROBE_BACKOFF_VAR) {
        let millis: u64 = value.parse().map_err(|e| {
            ConfigError::InvalidProbe(format!(
                "{} must be a non-negative integer, got '{}': {}",
                PROBE_BACKOFF_VAR, value, e
            ))
        })?;

        probe.backoff_step = Duration::from_millis(millis);
    }

    Ok(probe)
}
