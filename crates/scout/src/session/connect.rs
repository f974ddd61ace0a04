use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::errors::{ClientError, ClientResult};

use super::{HttpSession, Session, StdioSession};

/// Interpreter names probed, in order, when no executable is configured
const INTERPRETER_CANDIDATES: &[&str] = &[
    "python3",
    "python",
    "python3.10",
    "python3.11",
    "python3.12",
    "python3.13",
];

const DEFAULT_INTERPRETER: &str = "python3";

/// Registry-spawned backends are commonly Python; force a UTF-8 locale so
/// their stdio survives non-ASCII payloads.
const FORCED_ENV: &[(&str, &str)] = &[
    ("PYTHONIOENCODING", "utf-8"),
    ("PYTHONUTF8", "1"),
    ("PYTHONLEGACYWINDOWSSTDIO", "0"),
    ("LC_ALL", "C.UTF-8"),
    ("LANG", "C.UTF-8"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectType {
    /// Spawn a configured executable and talk over stdio
    Executable,
    /// Probe an HTTP tool backend
    Http,
    /// Look the server up by name in the local registry file
    #[serde(alias = "mcp_lookup")]
    Lookup,
}

/// Declarative description of how to reach a tool backend.
///
/// Which fields are required depends on `connect_type`; [`connect`]
/// validates before use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub connect_type: ConnectType,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Locate a usable interpreter: probe the candidate list on PATH, fall back
/// to the running executable, then to the default name.
pub fn find_interpreter() -> String {
    for candidate in INTERPRETER_CANDIDATES {
        if let Ok(path) = which::which(candidate) {
            info!(interpreter = %path.display(), "found interpreter");
            return candidate.to_string();
        }
    }
    if let Ok(current) = std::env::current_exe() {
        info!(interpreter = %current.display(), "using the running executable");
        return current.display().to_string();
    }
    warn!("no interpreter found, falling back to '{DEFAULT_INTERPRETER}'");
    DEFAULT_INTERPRETER.to_string()
}

fn merged_env(env: Option<&HashMap<String, String>>) -> HashMap<String, String> {
    let mut merged = env.cloned().unwrap_or_default();
    for (name, value) in FORCED_ENV {
        merged.insert((*name).to_string(), (*value).to_string());
    }
    merged
}

fn registry_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config").join("mcp").join("config.json"));
    }
    paths
}

async fn spawn_and_initialize(
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
) -> ClientResult<Session> {
    let mut session = Session::Stdio(StdioSession::spawn(command, args, env)?);
    session.initialize().await?;
    Ok(session)
}

/// Resolve one registry file against the requested server name.
///
/// Returns Ok(None) when the file does not mention the name, so the caller
/// can move on to the next path.
async fn connect_from_registry(path: &Path, name: &str) -> ClientResult<Option<Session>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return Ok(None),
    };
    info!(registry = %path.display(), "found tool server registry");
    let registry: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(registry = %path.display(), "unreadable registry: {e}");
            return Ok(None);
        }
    };

    let Some(entry) = registry.get("mcpServers").and_then(|servers| servers.get(name)) else {
        return Ok(None);
    };

    let mut command = entry
        .get("command")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if which::which(&command).is_err() {
        warn!(%command, "registry command not on PATH, probing for an interpreter");
        command = find_interpreter();
    }
    let args: Vec<String> = entry
        .get("args")
        .and_then(Value::as_array)
        .map(|args| {
            args.iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    let env: HashMap<String, String> = entry
        .get("env")
        .and_then(Value::as_object)
        .map(|env| {
            env.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    info!(server = %name, "using server from registry");
    match spawn_and_initialize(&command, &args, &merged_env(Some(&env))).await {
        Ok(session) => Ok(Some(session)),
        Err(e) => {
            warn!(server = %name, "failed to start registry server: {e}");
            Ok(None)
        }
    }
}

/// Turn a connection spec into a live, initialized session.
pub async fn connect(spec: &ConnectionSpec) -> ClientResult<Session> {
    match spec.connect_type {
        ConnectType::Http => {
            let host = spec.host.as_deref().ok_or_else(|| {
                ClientError::Validation("http connection requires a host".to_string())
            })?;
            let port = spec.port.ok_or_else(|| {
                ClientError::Validation("http connection requires a port".to_string())
            })?;

            info!(%host, port, "connecting to HTTP tool backend");
            let mut session = Session::Http(HttpSession::new(host, port));
            session.initialize().await?;
            Ok(session)
        }
        ConnectType::Executable => {
            let executable = match &spec.executable {
                Some(executable) => executable.clone(),
                None => {
                    info!("no executable configured, probing for an interpreter");
                    find_interpreter()
                }
            };
            let resolved = which::which(&executable)
                .map_err(|_| ClientError::NotFound(executable.clone()))?;
            info!(executable = %resolved.display(), "starting tool backend");

            let args = spec.args.clone().unwrap_or_default();
            spawn_and_initialize(
                &resolved.display().to_string(),
                &args,
                &merged_env(spec.env.as_ref()),
            )
            .await
        }
        ConnectType::Lookup => {
            let name = spec.name.as_deref().ok_or_else(|| {
                ClientError::Validation("lookup connection requires a server name".to_string())
            })?;

            for path in registry_paths() {
                if let Some(session) = connect_from_registry(&path, name).await? {
                    return Ok(session);
                }
            }
            Err(ClientError::Validation(format!(
                "server '{name}' not found in the registry or could not be started"
            )))
        }
    }
}
