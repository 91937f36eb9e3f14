//-
// Copyright (c) 2026, The Mockmta Authors
//
// This file is part of Mockmta.
//
// Mockmta is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Mockmta is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along
// with Mockmta. If not, see <http://www.gnu.org/licenses/>.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid query {query:?}: {reason}")]
    InvalidQuery { query: String, reason: String },
    #[error("no such email: {0}")]
    NxEmail(String),
    #[error("no such attachment: {0}")]
    NxAttachment(String),
    #[error("no such part: {0}")]
    NxPart(String),
    #[error("no such relay: {0}")]
    NxRelay(String),
    #[error("cannot parse email: {0}")]
    MimeParse(String),
    #[error("invalid body version: {0}")]
    BadBodyVersion(String),
    #[error("invalid page number: {0}")]
    BadPageNumber(String),
    #[error("cannot parse request body: {0}")]
    BadRequestBody(String),
    #[error("method {0} is not implemented in layer {1}")]
    UnimplementedInLayer(&'static str, &'static str),
    #[error("no storage layer implements {0}")]
    NoLayerImplements(&'static str),
    #[error("no storage layers configured")]
    NoStorageLayers,
    #[error("errors: {0}")]
    Multiple(String),
    #[error("cannot seed a non-empty storage")]
    StorageNotEmpty,
    #[error("unexpected server challenge: {0:?}")]
    UnexpectedServerChallenge(String),
    #[error("unexpected SMTP reply: {0}")]
    UnexpectedSmtpReply(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Ssl(#[from] openssl::error::ErrorStack),
}

impl Error {
    /// Whether this is the internal "ask the next layer" sentinel.
    ///
    /// The sentinel is not a true failure and must never escape the storage
    /// engine.
    pub fn is_unimplemented_in_layer(&self) -> bool {
        matches!(self, Error::UnimplementedInLayer(..))
    }
}
