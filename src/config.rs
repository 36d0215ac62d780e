// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Loading and generating the application configuration file
//!
//! The file is a JSON array of objects:
//!
//! ```json
//! [
//!   { "name": "Sleep", "path": "sleep", "arguments": "3600" }
//! ]
//! ```
//!
//! `arguments` is optional and is split with shell quoting rules at launch.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ErrorKind;
use crate::Error;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// A named program that may be started by the supervisor
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApplicationDefinition {
    name: String,
    path: String,
    arguments: String,
}

impl ApplicationDefinition {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            arguments: arguments.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executable, either absolute or resolved from `PATH`
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn arguments(&self) -> &str {
        &self.arguments
    }
}

/// As written in the file, before validation
#[derive(Debug, Deserialize)]
struct RawDefinition {
    name: Option<String>,
    path: Option<String>,
    arguments: Option<String>,
}

impl RawDefinition {
    fn validate(self, index: usize) -> Result<ApplicationDefinition, String> {
        let name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            Some(_) => return Err(format!("entry {} has an empty name", index)),
            None => return Err(format!("entry {} is missing a name", index)),
        };

        let path = match self.path {
            Some(path) if !path.trim().is_empty() => path,
            Some(_) => return Err(format!("'{}' has an empty path", name)),
            None => return Err(format!("'{}' is missing a path", name)),
        };

        Ok(ApplicationDefinition {
            name,
            path,
            arguments: self.arguments.unwrap_or_default(),
        })
    }
}

/// Parses and validates the contents of a configuration file
///
/// Either every record is complete, or the whole load fails.
pub fn parse(path: &Path, json: &str) -> Result<Vec<ApplicationDefinition>, Error> {
    let config_error = |reason: String| ErrorKind::ConfigLoad {
        path: path.to_path_buf(),
        reason,
    };

    let raw: Vec<RawDefinition> =
        serde_json::from_str(json).map_err(|e| config_error(e.to_string()))?;

    let definitions = raw
        .into_iter()
        .enumerate()
        .map(|(index, raw)| raw.validate(index))
        .collect::<Result<Vec<_>, _>>()
        .map_err(config_error)?;

    debug!(path = %path.display(), count = definitions.len(), "parsed configuration");
    Ok(definitions)
}

/// Reads the configuration file at `path`
pub fn load(path: &Path) -> Result<Vec<ApplicationDefinition>, Error> {
    let json = fs::read_to_string(path).map_err(|e| ErrorKind::ConfigLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    parse(path, &json)
}

/// The programs written to a freshly generated configuration
pub fn default_definitions() -> Vec<ApplicationDefinition> {
    vec![
        ApplicationDefinition::new("Sleep", "sleep", "3600"),
        ApplicationDefinition::new("Tail", "tail", "-f /dev/null"),
    ]
}

/// Writes the default configuration to `path`, replacing anything there
pub fn write_default(path: &Path) -> Result<(), Error> {
    let json = serde_json::to_string_pretty(&default_definitions())?;

    fs::write(path, json)?;
    debug!(path = %path.display(), "wrote default configuration");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_str(json: &str) -> Result<Vec<ApplicationDefinition>, Error> {
        parse(Path::new("test.json"), json)
    }

    fn assert_config_error(result: Result<Vec<ApplicationDefinition>, Error>, needle: &str) {
        match result {
            Err(err) => match err.kind() {
                ErrorKind::ConfigLoad { reason, .. } => {
                    assert!(reason.contains(needle), "unexpected reason: {}", reason)
                }
                other => panic!("expected a config error, got: {:?}", other),
            },
            Ok(defs) => panic!("expected failure, got: {:?}", defs),
        }
    }

    #[test]
    fn test_parse_defaults_missing_arguments() {
        let defs = parse_str(
            r#"[
                {"name": "Editor", "path": "/usr/bin/vi"},
                {"name": "Clock", "path": "watch", "arguments": "-n 1 date"}
            ]"#,
        )
        .expect("valid config");

        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0], ApplicationDefinition::new("Editor", "/usr/bin/vi", ""));
        assert_eq!(defs[1].arguments(), "-n 1 date");
    }

    #[test]
    fn test_parse_ignores_unknown_fields() {
        let defs = parse_str(r#"[{"name": "a", "path": "b", "comment": "hi"}]"#)
            .expect("valid config");
        assert_eq!(defs[0].name(), "a");
    }

    #[test]
    fn test_parse_rejects_empty_name() {
        assert_config_error(
            parse_str(r#"[{"name": "  ", "path": "sleep"}]"#),
            "empty name",
        );
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert_config_error(parse_str(r#"[{"path": "sleep"}]"#), "missing a name");
        assert_config_error(parse_str(r#"[{"name": "Sleep"}]"#), "missing a path");
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        let err = parse_str(r#"[{"name": "Sleep", "path": }]"#).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ConfigLoad { .. }));

        let err = parse_str(r#"{"name": "Sleep"}"#).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ConfigLoad { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::ConfigLoad { .. }));
    }

    #[test]
    fn test_default_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join(DEFAULT_CONFIG_FILE);

        write_default(&path).expect("failed to write default");
        let loaded = load(&path).expect("failed to load default");

        assert_eq!(loaded, default_definitions());
    }
}
