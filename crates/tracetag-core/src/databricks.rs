use std::fs;
use std::path::{Path, PathBuf};

/// One profile from `~/.databrickscfg`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub host: Option<String>,
    pub token: Option<String>,
}

pub fn config_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".databrickscfg"))
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// Read all profiles from the default config file location.
pub fn read_profiles() -> Vec<Profile> {
    config_path()
        .map(|path| read_profiles_from(&path))
        .unwrap_or_default()
}

/// Line-oriented scan of the Databricks config file. Only `[section]`,
/// `host` and `token` lines are recognized; everything else is ignored.
pub fn read_profiles_from(path: &Path) -> Vec<Profile> {
    let Ok(content) = fs::read_to_string(path) else {
        return Vec::new();
    };

    let mut profiles = Vec::new();
    let mut current: Option<Profile> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('[') && line.ends_with(']') {
            if let Some(profile) = current.take() {
                profiles.push(profile);
            }
            current = Some(Profile {
                name: line[1..line.len() - 1].to_string(),
                ..Profile::default()
            });
            continue;
        }
        let Some(profile) = current.as_mut() else {
            continue;
        };
        if let Some(value) = key_value(line, "host") {
            profile.host = Some(value);
        } else if let Some(value) = key_value(line, "token") {
            profile.token = Some(value);
        }
    }
    if let Some(profile) = current {
        profiles.push(profile);
    }
    profiles
}

fn key_value(line: &str, key: &str) -> Option<String> {
    let rest = line.strip_prefix(key)?.trim_start();
    let value = rest.strip_prefix('=')?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub fn find_profile(name: &str) -> Option<Profile> {
    read_profiles().into_iter().find(|p| p.name == name)
}
