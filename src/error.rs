// Copyright 2019-2020 Benjamin Fry <benjaminfry@me.com>
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
    #[error("nix error: {0}")]
    NixError(#[from] nix::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    /// The configuration could not be read, parsed or validated
    #[error("failed to load configuration {}: {reason}", .path.display())]
    ConfigLoad { path: PathBuf, reason: String },
    /// The OS refused to create the process
    #[error("could not start '{name}': {reason}")]
    Launch { name: String, reason: String },
    #[error("no running program found: {0}")]
    NotRunning(String),
    #[error("program not found: {0}")]
    UnknownApplication(String),
    #[error("unknown command: {0}, type `help` for the list of commands")]
    UnknownCommand(String),
    /// Holds an example of the expected usage
    #[error("please name the program, e.g. `{0}`")]
    MissingArgument(&'static str),
}

#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }
}

impl<E> From<E> for Error
where
    E: Into<ErrorKind>,
{
    fn from(err: E) -> Self {
        Self::from_kind(err.into())
    }
}
