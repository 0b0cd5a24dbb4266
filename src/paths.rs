use anyhow::Context;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

pub const CONFIG_FILE: &str = "config.toml";

/// Where the config directory lives, given the relevant environment variables.
///
/// `REPURPOSE_HOME` wins, then `XDG_CONFIG_HOME`, then `~/.config`.
fn resolve_config_dir(
    repurpose_home: Option<OsString>,
    xdg_config_home: Option<OsString>,
    home: Option<OsString>,
) -> anyhow::Result<PathBuf> {
    if let Some(base) = repurpose_home {
        return Ok(PathBuf::from(base).join("config"));
    }
    if let Some(xdg) = xdg_config_home.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join("repurpose"));
    }
    let home = home.context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".config").join("repurpose"))
}

fn ensure_dir(path: PathBuf) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(&path)
        .with_context(|| format!("failed to create directory: {}", path.display()))?;
    Ok(path)
}

pub fn config_dir() -> anyhow::Result<PathBuf> {
    ensure_dir(resolve_config_dir(
        env::var_os("REPURPOSE_HOME"),
        env::var_os("XDG_CONFIG_HOME"),
        env::var_os("HOME"),
    )?)
}

pub fn config_path() -> anyhow::Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}
