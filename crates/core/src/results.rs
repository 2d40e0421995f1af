use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Raw result container published by a backend on completion.
///
/// Serializes to `{ "results": <value>, ...extra }`: the `results` entry is what the
/// callable returned, `extra` carries backend-specific keys (timings, remote metadata).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResults {
    pub results: JsonValue,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl JobResults {
    pub fn new(results: JsonValue) -> Self {
        Self {
            results,
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        match key {
            "results" => Some(&self.results),
            _ => self.extra.get(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_results_next_to_extra_keys() {
        let results = JobResults::new(json!([1, 2, 3])).with_extra("physical_perf", json!(0.9));

        assert_eq!(
            serde_json::to_value(&results).unwrap(),
            json!({"results": [1, 2, 3], "physical_perf": 0.9})
        );
    }

    #[test]
    fn deserializes_backend_payload() {
        let results: JobResults =
            serde_json::from_value(json!({"results": {"a": 1}, "job_context": "x"})).unwrap();

        assert_eq!(results.results, json!({"a": 1}));
        assert_eq!(results.get("job_context"), Some(&json!("x")));
        assert_eq!(results.get("results"), Some(&json!({"a": 1})));
    }
}
