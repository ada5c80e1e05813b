// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Utilities shared by the TipChain crates.

#[cfg(feature = "config")]
use std::path::{Path, PathBuf};

#[cfg(feature = "config")]
use anyhow::Context;
#[cfg(feature = "config")]
use serde::de::DeserializeOwned;

#[cfg(feature = "metrics")]
pub mod metrics;

/// The environment variable selecting the log output format.
#[cfg(feature = "log")]
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Load the config from a YAML file located at the provided path.
#[cfg(feature = "config")]
pub fn load_from_yaml<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> anyhow::Result<T> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "[load_from_yaml] reading from file");

    let reader = std::fs::File::open(path).with_context(|| {
        format!(
            "[load_from_yaml] unable to load config from {}",
            path.display()
        )
    })?;

    Ok(serde_yaml::from_reader(reader)?)
}

/// Returns the path if it is `Some` or any of the default paths if they exist (attempt in order).
#[cfg(feature = "config")]
pub fn path_or_defaults_if_exist(
    path: Option<impl AsRef<Path>>,
    defaults: &[PathBuf],
) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(path.as_ref().to_path_buf());
    }
    defaults.iter().find(|default| default.exists()).cloned()
}

/// Returns the candidate locations of a configuration file named `file_name`.
///
/// The order is: the current directory, `$XDG_CONFIG_HOME`, `~/.config/<app_name>`, and
/// `~/.<app_name>`.
#[cfg(feature = "config")]
pub fn default_configuration_paths(app_name: &str, file_name: &str) -> Vec<PathBuf> {
    let mut directories = vec![PathBuf::from(".")];
    if let Ok(xdg_config_dir) = std::env::var("XDG_CONFIG_HOME") {
        directories.push(xdg_config_dir.into());
    }
    if let Some(home_dir) = home::home_dir() {
        directories.push(home_dir.join(".config").join(app_name));
        directories.push(home_dir.join(format!(".{app_name}")));
    }
    directories
        .into_iter()
        .map(|directory| directory.join(file_name))
        .collect()
}

/// Initializes the logger and tracing subscriber.
///
/// Logs go to stderr at INFO level unless `RUST_LOG` says otherwise. The output format is
/// controlled by the `LOG_FORMAT` environment variable.
#[cfg(feature = "log")]
pub fn init_tracing_subscriber() -> anyhow::Result<()> {
    use std::env;

    use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt as _, util::SubscriberInitExt};

    // Use INFO level by default.
    let directive = format!(
        "info,{}",
        env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default()
    );
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let format = env::var(LOG_FORMAT_ENV).ok();
    let layer = if let Some(format) = &format {
        match format.to_lowercase().as_str() {
            "default" => layer.boxed(),
            "compact" => layer.compact().boxed(),
            "pretty" => layer.pretty().boxed(),
            "json" => layer.json().boxed(),
            s => Err(anyhow::anyhow!("LOG_FORMAT '{}' is not supported", s))?,
        }
    } else {
        layer.boxed()
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(EnvFilter::new(directive.clone())))
        .try_init()?;
    tracing::debug!(%directive, ?format, "initialized tracing subscriber");

    Ok(())
}

#[cfg(all(test, feature = "config"))]
mod tests {
    use std::io::Write as _;

    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn loads_yaml_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file can be created");
        writeln!(file, "name: chain").expect("write succeeds");

        let sample: Sample = load_from_yaml(file.path()).expect("valid yaml");
        assert_eq!(
            sample,
            Sample {
                name: "chain".to_owned(),
                count: 0
            }
        );
    }

    #[test]
    fn missing_file_reports_path() {
        let error = load_from_yaml::<_, Sample>("/definitely/not/here.yaml")
            .expect_err("the file does not exist");
        assert!(error.to_string().contains("/definitely/not/here.yaml"));
    }

    #[test]
    fn explicit_path_wins_over_defaults() {
        let existing = tempfile::NamedTempFile::new().expect("temp file can be created");
        let defaults = vec![existing.path().to_path_buf()];

        let chosen = path_or_defaults_if_exist(Some("explicit.yaml"), &defaults);
        assert_eq!(chosen, Some(PathBuf::from("explicit.yaml")));
    }

    #[test]
    fn first_existing_default_is_chosen() {
        let existing = tempfile::NamedTempFile::new().expect("temp file can be created");
        let defaults = vec![
            PathBuf::from("/definitely/not/here.yaml"),
            existing.path().to_path_buf(),
        ];

        let chosen = path_or_defaults_if_exist(None::<&Path>, &defaults);
        assert_eq!(chosen.as_deref(), Some(existing.path()));
    }

    #[test]
    fn default_paths_start_in_current_directory() {
        let paths = default_configuration_paths("tipchain", "tipchain_config.yaml");
        assert_eq!(paths[0], PathBuf::from("./tipchain_config.yaml"));
        assert!(paths.iter().all(|path| path.ends_with("tipchain_config.yaml")));
    }
}
