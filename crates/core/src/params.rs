//! Call arguments and delta-parameter reintegration.
//!
//! A job may pin some parameters when it is built ("fixed" delta entries) and ask
//! for others to be captured from the call site ("pending" entries). When the job is
//! executed, [`DeltaParameters::reintegrate`] strips the pending values out of the
//! call arguments and injects the fixed ones, producing a fresh delta map that holds
//! exactly the captured values. That map is later replayed as keyword arguments to
//! the result mapping function.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{JobError, JobResult};

/// Positional call arguments.
pub type Args = Vec<JsonValue>;

/// Keyword call arguments.
pub type Kwargs = Map<String, JsonValue>;

/// A delta-parameter entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaValue {
    /// Capture the value supplied at call time (by keyword, else positionally).
    Pending,
    /// Value chosen at construction time; injected as a keyword argument.
    Fixed(JsonValue),
}

/// Insertion-ordered map of parameter name to [`DeltaValue`].
///
/// Iteration order is significant: it decides which pending entry consumes which
/// positional argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaParameters {
    entries: Vec<(String, DeltaValue)>,
}

/// Output of one reintegration pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Reintegration {
    /// Positional arguments left for the actual call.
    pub args: Args,
    /// Keyword arguments for the actual call (fixed entries injected).
    pub kwargs: Kwargs,
    /// The replacement delta map: every captured value, as a fixed entry.
    pub delta: DeltaParameters,
}

impl DeltaParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry. A replaced entry keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: DeltaValue) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn pending(mut self, name: impl Into<String>) -> Self {
        self.insert(name, DeltaValue::Pending);
        self
    }

    pub fn fixed(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.insert(name, DeltaValue::Fixed(value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&DeltaValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DeltaValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Fixed entries as keyword arguments (pending entries have no value yet and are skipped).
    pub fn as_kwargs(&self) -> Kwargs {
        self.entries
            .iter()
            .filter_map(|(name, value)| match value {
                DeltaValue::Fixed(v) => Some((name.clone(), v.clone())),
                DeltaValue::Pending => None,
            })
            .collect()
    }

    /// Adapt call arguments to this delta map.
    ///
    /// Walks the entries in order:
    /// - pending, present in `kwargs`: moved out of `kwargs` into the new delta
    /// - pending, absent: the first remaining positional argument is captured
    /// - fixed: written into `kwargs` (overwriting), not carried over
    ///
    /// `self` is left untouched; the caller swaps in [`Reintegration::delta`].
    pub fn reintegrate(&self, args: Args, mut kwargs: Kwargs) -> JobResult<Reintegration> {
        let mut args: VecDeque<JsonValue> = args.into();
        let mut delta = DeltaParameters::new();

        for (name, value) in &self.entries {
            match value {
                DeltaValue::Pending => {
                    let captured = match kwargs.remove(name) {
                        Some(v) => v,
                        None => args
                            .pop_front()
                            .ok_or_else(|| JobError::insufficient_arguments(name.clone()))?,
                    };
                    delta.insert(name.clone(), DeltaValue::Fixed(captured));
                }
                DeltaValue::Fixed(v) => {
                    kwargs.insert(name.clone(), v.clone());
                }
            }
        }

        Ok(Reintegration {
            args: args.into(),
            kwargs,
            delta,
        })
    }
}

impl<N: Into<String>> FromIterator<(N, DeltaValue)> for DeltaParameters {
    fn from_iter<I: IntoIterator<Item = (N, DeltaValue)>>(iter: I) -> Self {
        let mut params = DeltaParameters::new();
        for (name, value) in iter {
            params.insert(name, value);
        }
        params
    }
}
