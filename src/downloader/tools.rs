// yt-dlp binary discovery and installation

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use super::errors::ExtractionError;
use super::utils::run_output;

const BINARY_NAME: &str = "yt-dlp";
const INSTALL_DEADLINE: Duration = Duration::from_secs(600);

const BREW_PATHS: [&str; 2] = ["/opt/homebrew/bin/brew", "/usr/local/bin/brew"];

/// What we know about the yt-dlp install
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub path: String,
    pub version: Option<String>,
    pub is_available: bool,
}

fn common_paths() -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = [
        "/opt/homebrew/bin/yt-dlp", // Homebrew on Apple Silicon
        "/usr/local/bin/yt-dlp",    // Homebrew on Intel Mac
        "/usr/bin/yt-dlp",          // System installation
    ]
    .iter()
    .map(PathBuf::from)
    .collect();

    // pip install --user
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".local").join("bin").join(BINARY_NAME));
    }
    paths
}

/// Pick the yt-dlp binary: configured path, common install paths, `which`, then bare name
pub async fn find_ytdlp(configured: Option<&str>) -> String {
    if let Some(path) = configured.filter(|p| !p.is_empty()) {
        return path.to_string();
    }

    for path in common_paths() {
        if path.exists() {
            return path.to_string_lossy().into_owned();
        }
    }

    let which = Command::new("which")
        .arg(BINARY_NAME)
        .kill_on_drop(true)
        .output()
        .await;
    if let Ok(output) = which {
        if output.status.success() {
            let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !path.is_empty() {
                return path;
            }
        }
    }

    BINARY_NAME.to_string()
}

/// Ask the binary for its version; `None` if it cannot be run
pub async fn get_version(path: &str) -> Option<String> {
    let run = Command::new(path).arg("--version").kill_on_drop(true).output();

    match timeout(Duration::from_secs(10), run).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        _ => None,
    }
}

pub async fn get_tool_info(configured: Option<&str>) -> ToolInfo {
    let path = find_ytdlp(configured).await;
    let version = get_version(&path).await;

    ToolInfo {
        name: BINARY_NAME.to_string(),
        is_available: version.is_some(),
        path,
        version,
    }
}

/// Package manager invocation that installs yt-dlp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl InstallCommand {
    /// Homebrew when present, otherwise a user-level pip install
    pub fn detect() -> Self {
        Self::for_brew(BREW_PATHS.into_iter().find(|path| Path::new(path).exists()))
    }

    fn for_brew(brew: Option<&str>) -> Self {
        match brew {
            Some(brew) => Self {
                program: brew.to_string(),
                args: vec!["install".to_string(), BINARY_NAME.to_string()],
            },
            None => Self {
                program: "pip3".to_string(),
                args: ["install", "--user", "-U", BINARY_NAME]
                    .map(String::from)
                    .to_vec(),
            },
        }
    }
}

pub async fn install(command: &InstallCommand) -> Result<(), ExtractionError> {
    info!(program = %command.program, args = ?command.args, "Installing {}", BINARY_NAME);

    let output = run_output(&command.program, &command.args, Some(INSTALL_DEADLINE)).await?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(ExtractionError::ExecutionError(format!(
        "{} failed: {}",
        command.program,
        stderr.trim()
    )))
}

/// Locate yt-dlp, installing it first when nothing runnable is found.
///
/// An explicitly configured path is never installed over.
pub async fn ensure_tool(
    configured: Option<&str>,
    auto_install: bool,
    installer: &InstallCommand,
) -> ToolInfo {
    let info = get_tool_info(configured).await;
    ensure_installed(info, configured, auto_install, installer).await
}

async fn ensure_installed(
    info: ToolInfo,
    configured: Option<&str>,
    auto_install: bool,
    installer: &InstallCommand,
) -> ToolInfo {
    if info.is_available || !auto_install {
        return info;
    }

    if configured.is_some_and(|path| !path.is_empty()) {
        warn!(path = %info.path, "Configured {} is not runnable, skipping install", BINARY_NAME);
        return info;
    }

    match install(installer).await {
        Ok(()) => get_tool_info(None).await,
        Err(err) => {
            warn!(error = %err, "Automatic {} install failed", BINARY_NAME);
            info
        }
    }
}
