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

//! Record-form batch parser.
//!
//! Accepts a single batch object, an array of batch objects, or one batch
//! object per line:
//! ```text
//! { "states": [ { "icao24": "abc123", "latitude": 10.0, ... }, ... ] }
//! ```
//! Records that fail to decode are dropped one by one so a single bad entry
//! never loses the rest of the batch.

use log::debug;
use serde_json::Value;

use super::{Batch, ParseError, Protocol, StateRecord};

/// Parser for record-form batches.
#[derive(Debug, Default)]
pub struct RecordBatchParser;

impl RecordBatchParser {
    /// Create a new record-form parser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Decode every batch in `input`.
    ///
    /// Top-level values are read in sequence, so newline-delimited batches
    /// work too. An array yields one batch per element, an object yields one.
    pub fn parse_all(&mut self, input: &[u8]) -> Result<Vec<Batch>, ParseError> {
        let mut batches = Vec::new();
        for value in serde_json::Deserializer::from_slice(input).into_iter::<Value>() {
            match value? {
                Value::Array(items) => {
                    for item in &items {
                        batches.push(batch_from_value(item)?);
                    }
                }
                other => batches.push(batch_from_value(&other)?),
            }
        }
        Ok(batches)
    }
}

impl Protocol for RecordBatchParser {
    type Message = Batch;
    type Error = ParseError;

    fn parse(&mut self, input: &[u8]) -> Result<Option<Batch>, ParseError> {
        if input.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let value: Value = serde_json::from_slice(input)?;
        batch_from_value(&value).map(Some)
    }
}

fn batch_from_value(value: &Value) -> Result<Batch, ParseError> {
    let Value::Object(object) = value else {
        return Err(ParseError::InvalidFormat("batch must be a JSON object".to_string()));
    };

    let records = match object.get("states").or_else(|| object.get("entities")) {
        None | Some(Value::Null) => return Ok(Batch::default()),
        Some(Value::Array(records)) => records,
        Some(other) => {
            return Err(ParseError::InvalidValue {
                field: "states",
                value: other.to_string(),
            })
        }
    };

    let mut states = Vec::with_capacity(records.len());
    for record in records {
        match serde_json::from_value::<StateRecord>(record.clone()) {
            Ok(state) => states.push(state),
            Err(e) => debug!("Dropping malformed record: {}", e),
        }
    }

    Ok(Batch::new(states))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_record_batch() {
        let mut parser = RecordBatchParser::new();
        let input = br#"{"states":[{"icao24":"abc123","latitude":10,"longitude":20,"velocity":100,"trueTrack":90,"category":"cargo","positionSource":2}]}"#;
        let batch = parser.parse(input).unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        let record = &batch.states[0];
        assert_eq!(record.id(), Some("abc123"));
        assert_eq!(record.category.as_deref(), Some("cargo"));
        assert_eq!(record.position_source, Some(2));
        assert!((record.speed_mps() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_entities_alias() {
        let mut parser = RecordBatchParser::new();
        let batch = parser
            .parse(br#"{"entities":[{"id":"A1","latitude":10.0,"longitude":20.0}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(batch.states[0].id(), Some("A1"));
    }

    #[test]
    fn test_malformed_record_dropped() {
        let mut parser = RecordBatchParser::new();
        let input = br#"{"states":[{"icao24":"good"},{"icao24":"bad","latitude":"north"},{"icao24":"also-good"}]}"#;
        let batch = parser.parse(input).unwrap().unwrap();
        let ids: Vec<_> = batch.states.iter().filter_map(StateRecord::id).collect();
        assert_eq!(ids, vec!["good", "also-good"]);
    }

    #[test]
    fn test_null_states_is_empty_batch() {
        let mut parser = RecordBatchParser::new();
        let batch = parser.parse(br#"{"time":1,"states":null}"#).unwrap().unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_parse_all_array() {
        let mut parser = RecordBatchParser::new();
        let batches = parser
            .parse_all(br#"[{"states":[{"icao24":"a"}]},{"states":[]}]"#)
            .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 1);
        assert!(batches[1].is_empty());
    }

    #[test]
    fn test_parse_all_newline_delimited() {
        let mut parser = RecordBatchParser::new();
        let input = b"{\"states\":[{\"icao24\":\"a\"},{\"icao24\":\"b\"}]}\n{\"states\":[{\"icao24\":\"c\"}]}\n\n";
        let batches = parser.parse_all(input).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].states[0].id(), Some("c"));
    }

    #[test]
    fn test_parse_all_rejects_bad_line() {
        let mut parser = RecordBatchParser::new();
        let input = b"{\"states\":[]}\n{\"states\": oops}\n";
        assert!(matches!(parser.parse_all(input), Err(ParseError::Json(_))));
    }

    #[test]
    fn test_parse_empty_input() {
        let mut parser = RecordBatchParser::new();
        assert!(parser.parse(b"  \n").unwrap().is_none());
    }

    #[test]
    fn test_non_object_rejected() {
        let mut parser = RecordBatchParser::new();
        assert!(matches!(
            parser.parse(b"42"),
            Err(ParseError::InvalidFormat(_))
        ));
    }
}
