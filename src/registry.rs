// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::path::Path;

use crate::config::{self, ApplicationDefinition};
use crate::error::ErrorKind;
use crate::Error;

/// Case-insensitive for all of Unicode, not only ASCII
fn same_name(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

/// The configured programs, in file order. Read-only once loaded.
#[derive(Clone, Debug)]
pub struct Registry {
    definitions: Vec<ApplicationDefinition>,
}

impl Registry {
    /// Requires at least one definition, and names unique ignoring case
    pub fn new(path: &Path, definitions: Vec<ApplicationDefinition>) -> Result<Self, Error> {
        let config_error = |reason: String| ErrorKind::ConfigLoad {
            path: path.to_path_buf(),
            reason,
        };

        if definitions.is_empty() {
            return Err(config_error("no programs are configured".to_string()).into());
        }

        for (i, def) in definitions.iter().enumerate() {
            if definitions[..i]
                .iter()
                .any(|prior| same_name(prior.name(), def.name()))
            {
                return Err(config_error(format!("'{}' is configured twice", def.name())).into());
            }
        }

        Ok(Self { definitions })
    }

    /// Loads and validates the configuration file at `path`
    pub fn load(path: &Path) -> Result<Self, Error> {
        Self::new(path, config::load(path)?)
    }

    /// Case-insensitive exact match on the program name
    pub fn lookup(&self, name: &str) -> Option<&ApplicationDefinition> {
        self.definitions
            .iter()
            .find(|def| same_name(def.name(), name))
    }

    pub fn list(&self) -> &[ApplicationDefinition] {
        &self.definitions
    }

    pub fn iter(&self) -> impl Iterator<Item = &ApplicationDefinition> {
        self.definitions.iter()
    }
}
