// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;
use crate::schema::Config;

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones (spec §6: config files sit
/// below env vars and CLI flags in overall priority, but layer among
/// themselves this way).
fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/zulip-mcp/config.yaml"));

    if let Some(cfg) = dirs::config_dir() {
        paths.push(cfg.join("zulip-mcp/config.yaml"));
    }

    paths.push(PathBuf::from(".zulip-mcp.yaml"));
    paths.push(PathBuf::from("zulip-mcp.yaml"));

    paths
}

/// Load configuration by merging all discovered YAML files, then an
/// optional explicit path (e.g. `--config`), which wins over everything.
pub fn load(extra: Option<&Path>) -> Result<Config, ConfigError> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let layer = read_yaml(&path)?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let layer = read_yaml(p)?;
        merge_yaml(&mut merged, layer);
    }

    let config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty()) {
        Config::default()
    } else {
        serde_yaml::from_value(merged)?
    };
    Ok(config)
}

fn read_yaml(path: &Path) -> Result<serde_yaml::Value, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(ConfigError::Yaml)
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                let entry = d
                    .entry(k)
                    .or_insert(serde_yaml::Value::Mapping(serde_yaml::Mapping::new()));
                merge_yaml(entry, v);
            }
        }
        (dst, src) => *dst = src,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn val(s: &str) -> serde_yaml::Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn merge_scalar_src_wins() {
        let mut dst = val("x: 1");
        let src = val("x: 2");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["x"].as_i64(), Some(2));
    }

    #[test]
    fn merge_nested_tables() {
        let mut dst = val("rest:\n  max_retries: 3\n  request_timeout_secs: 30");
        let src = val("rest:\n  max_retries: 5");
        merge_yaml(&mut dst, src);
        assert_eq!(dst["rest"]["max_retries"].as_i64(), Some(5));
        assert_eq!(dst["rest"]["request_timeout_secs"].as_i64(), Some(30));
    }

    #[test]
    fn load_with_no_files_returns_defaults() {
        let cfg = load(None).unwrap();
        assert_eq!(cfg.rest.max_retries, 3);
    }

    #[test]
    fn load_returns_error_when_explicit_path_missing() {
        let result = load(Some(Path::new("/tmp/zulip_mcp_nonexistent_config_xyz.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn load_explicit_file_overrides_defaults() {
        use std::io::Write;
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "rest:\n  max_retries: 7\n").unwrap();
        let cfg = load(Some(f.path())).unwrap();
        assert_eq!(cfg.rest.max_retries, 7);
    }
}
