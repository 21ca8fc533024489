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

//! OpenSky Network REST source.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde_json::Value;

use super::{DataSource, FetchError};
use crate::protocol::{Batch, OpenSkyParser};

/// Anonymous endpoint returning every state vector OpenSky knows about.
pub const OPENSKY_STATES_URL: &str = "https://opensky-network.org/api/states/all";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Fetches live state vectors from the OpenSky Network.
#[derive(Debug, Clone)]
pub struct OpenSkySource {
    client: reqwest::Client,
    url: String,
}

impl OpenSkySource {
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let url = url.into();
        info!("Using OpenSky endpoint {}", url);
        Ok(Self { client, url })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DataSource for OpenSkySource {
    async fn fetch(&self, limit: usize) -> Result<Batch, FetchError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        let mut batch = OpenSkyParser::new().parse_value(&body)?;
        debug!("OpenSky returned {} state vectors", batch.len());
        batch.truncate(limit);
        Ok(batch)
    }

    fn name(&self) -> &str {
        "opensky"
    }
}
