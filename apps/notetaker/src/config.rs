use std::{fs, path::Path};

use anyhow::Context;
use clap::Args;
use client_core::{Credentials, GraphQlClient};
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "notetaker.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_url: String,
    pub realtime_url: Option<String>,
    pub api_key: Option<String>,
    pub auth_token: Option<String>,
    pub list_limit: Option<u32>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:4000/graphql".into(),
            realtime_url: None,
            api_key: None,
            auth_token: None,
            list_limit: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileSettings {
    api_url: Option<String>,
    realtime_url: Option<String>,
    api_key: Option<String>,
    auth_token: Option<String>,
    list_limit: Option<u32>,
}

/// Endpoint flags; each one beats the file and the environment.
#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// Config file (defaults to ./notetaker.toml when present)
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
    #[arg(long, global = true)]
    pub api_url: Option<String>,
    /// Subscription endpoint; derived from --api-url when omitted
    #[arg(long, global = true)]
    pub realtime_url: Option<String>,
    #[arg(long, global = true)]
    pub api_key: Option<String>,
    #[arg(long, global = true)]
    pub auth_token: Option<String>,
}

impl Settings {
    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.api_url {
            self.api_url = v;
        }
        if file.realtime_url.is_some() {
            self.realtime_url = file.realtime_url;
        }
        if file.api_key.is_some() {
            self.api_key = file.api_key;
        }
        if file.auth_token.is_some() {
            self.auth_token = file.auth_token;
        }
        if file.list_limit.is_some() {
            self.list_limit = file.list_limit;
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("NOTETAKER_API_URL") {
            self.api_url = v;
        }
        if let Some(v) = lookup("NOTETAKER_REALTIME_URL") {
            self.realtime_url = Some(v);
        }
        if let Some(v) = lookup("NOTETAKER_API_KEY") {
            self.api_key = Some(v);
        }
        if let Some(v) = lookup("NOTETAKER_AUTH_TOKEN") {
            self.auth_token = Some(v);
        }
        if let Some(v) = lookup("NOTETAKER_LIST_LIMIT") {
            match v.parse::<u32>() {
                Ok(parsed) => self.list_limit = Some(parsed),
                Err(_) => warn!(value = %v, "ignoring unparsable NOTETAKER_LIST_LIMIT"),
            }
        }
    }

    fn apply_args(&mut self, args: &ConnectionArgs) {
        if let Some(v) = &args.api_url {
            self.api_url = v.clone();
        }
        if let Some(v) = &args.realtime_url {
            self.realtime_url = Some(v.clone());
        }
        if let Some(v) = &args.api_key {
            self.api_key = Some(v.clone());
        }
        if let Some(v) = &args.auth_token {
            self.auth_token = Some(v.clone());
        }
    }

    pub fn build_client(&self) -> anyhow::Result<GraphQlClient> {
        let mut client = GraphQlClient::new(&self.api_url)?.with_credentials(Credentials {
            api_key: self.api_key.clone(),
            auth_token: self.auth_token.clone(),
        });
        if let Some(realtime_url) = &self.realtime_url {
            client = client.with_realtime_url(realtime_url)?;
        }
        if let Some(limit) = self.list_limit {
            client = client.with_list_limit(limit);
        }
        Ok(client)
    }
}

fn parse_file(raw: &str) -> anyhow::Result<FileSettings> {
    Ok(toml::from_str(raw)?)
}

/// Defaults, then the config file, then `NOTETAKER_*` variables, then flags.
pub fn load_settings(args: &ConnectionArgs) -> anyhow::Result<Settings> {
    load_settings_with(args, |key| std::env::var(key).ok())
}

fn load_settings_with(
    args: &ConnectionArgs,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match &args.config {
        Some(path) => settings.apply_file(read_file(path)?),
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                settings.apply_file(read_file(default_path)?);
            }
        }
    }

    settings.apply_env(lookup);
    settings.apply_args(args);
    Ok(settings)
}

fn read_file(path: &Path) -> anyhow::Result<FileSettings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    parse_file(&raw).with_context(|| format!("invalid config file '{}'", path.display()))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
