// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Data sources that produce batches of aircraft state on demand.
//!
//! - [`SimulatedSource`] - a random fleet that flies between fetches
//! - [`OpenSkySource`] - the public OpenSky Network REST API
//! - [`ReplaySource`] - batches recorded to a JSON file, played in a loop

mod opensky;
mod replay;
mod simulated;

pub use opensky::{OpenSkySource, OPENSKY_STATES_URL};
pub use replay::ReplaySource;
pub use simulated::SimulatedSource;

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::{Batch, ParseError};

/// Errors that can occur while fetching a batch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("could not decode batch: {0}")]
    Decode(#[from] ParseError),

    #[error("could not read replay file: {0}")]
    Io(#[from] std::io::Error),

    #[error("source has no batches")]
    Empty,
}

/// Something that can be asked for the current set of aircraft.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch the current batch. `limit` is a hint; callers truncate anyway.
    async fn fetch(&self, limit: usize) -> Result<Batch, FetchError>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}
