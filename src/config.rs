use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::factory::{LayoutKind, LayoutParams, OverlapParams, RoutingParams};
use crate::geometry::Size;

/// Pipeline configuration. A `null` stage disables it; `layout: null` means
/// every vertex position comes from the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub layout: Option<LayoutParams>,
    pub overlap: Option<OverlapParams>,
    pub routing: Option<RoutingParams>,
    /// Footprint for vertices that do not carry their own size.
    pub default_vertex_size: Size,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            layout: Some(LayoutParams::default_for(LayoutKind::Fr)),
            overlap: Some(OverlapParams::default()),
            routing: Some(RoutingParams::default()),
            default_vertex_size: Size::new(40.0, 20.0),
        }
    }
}

/// Parses a config document: strict JSON first, JSON5 (comments, trailing
/// commas) as a fallback.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    match serde_json::from_str(contents) {
        Ok(config) => Ok(config),
        Err(strict) => json5::from_str(contents)
            .with_context(|| format!("invalid config (strict JSON error: {strict})")),
    }
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = parse_config(&contents)?;
    log::debug!("loaded config from {}", path.display());
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::OverlapKind;

    #[test]
    fn missing_path_gives_defaults() {
        assert_eq!(load_config(None).unwrap(), Config::default());
    }

    #[test]
    fn partial_documents_keep_defaults() {
        let config = parse_config(r#"{"layout": {"kind": "kk", "max_iterations": 50}}"#).unwrap();
        match config.layout {
            Some(LayoutParams::Kk(p)) => assert_eq!(p.max_iterations, 50),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(config.overlap, Config::default().overlap);
        assert_eq!(config.default_vertex_size, Size::new(40.0, 20.0));
    }

    #[test]
    fn json5_and_disabled_stages() {
        let config = parse_config(
            r#"{
                // positions come from the input
                layout: null,
                overlap: { kind: "one-way-fsa", way: "vertical", },
                routing: null,
            }"#,
        )
        .unwrap();
        assert!(config.layout.is_none());
        assert!(config.routing.is_none());
        assert_eq!(config.overlap.map(|o| o.kind()), Some(OverlapKind::OneWayFsa));
    }

    #[test]
    fn unreadable_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/arrange.json"))).is_err());
    }
}
