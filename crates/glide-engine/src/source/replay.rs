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

//! Replay of recorded batches.
//!
//! The file holds one batch object, an array of them, or one per line. Each fetch
//! returns the next batch, wrapping around at the end.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use log::info;

use super::{DataSource, FetchError};
use crate::protocol::{Batch, RecordBatchParser};

#[derive(Debug)]
pub struct ReplaySource {
    batches: Vec<Batch>,
    cursor: AtomicUsize,
}

impl ReplaySource {
    #[must_use]
    pub fn from_batches(batches: Vec<Batch>) -> Self {
        Self {
            batches,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Load every batch from a JSON file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, FetchError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let batches = RecordBatchParser::new().parse_all(&bytes)?;
        if batches.is_empty() {
            return Err(FetchError::Empty);
        }
        info!("Loaded {} batches from {}", batches.len(), path.display());
        Ok(Self::from_batches(batches))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

#[async_trait]
impl DataSource for ReplaySource {
    async fn fetch(&self, limit: usize) -> Result<Batch, FetchError> {
        if self.batches.is_empty() {
            return Err(FetchError::Empty);
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.batches.len();
        let mut batch = self.batches[index].clone();
        batch.truncate(limit);
        Ok(batch)
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StateRecord;

    #[tokio::test]
    async fn test_replay_cycles() {
        let source = ReplaySource::from_batches(vec![
            Batch::new(vec![StateRecord::new("a"), StateRecord::new("b")]),
            Batch::new(vec![StateRecord::new("c")]),
        ]);

        assert_eq!(source.fetch(10).await.unwrap().len(), 2);
        assert_eq!(source.fetch(10).await.unwrap().states[0].id(), Some("c"));
        assert_eq!(source.fetch(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_replay_errors() {
        let source = ReplaySource::from_batches(Vec::new());
        assert!(matches!(source.fetch(10).await, Err(FetchError::Empty)));
    }

    #[tokio::test]
    async fn test_open_reads_file() {
        let path = std::env::temp_dir().join(format!("replay-{}.json", std::process::id()));
        tokio::fs::write(
            &path,
            br#"[{"states":[{"icao24":"abc123","latitude":1.0,"longitude":2.0}]},{"states":[]}]"#,
        )
        .await
        .unwrap();

        let source = ReplaySource::open(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(source.len(), 2);
        let first = source.fetch(10).await.unwrap();
        assert_eq!(first.states[0].id(), Some("abc123"));
        assert!(source.fetch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let result = ReplaySource::open("/nonexistent/replay.json").await;
        assert!(matches!(result, Err(FetchError::Io(_))));
    }
}
