use tracing::debug;

use crate::error::EngineError;
use crate::spec::{Spec, merge_missing, overlap};

/// A spec produced by a successful top-level match.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Global key of the grammar root that produced it.
    pub grammar: String,
    pub spec: Spec,
}

/// Session history used for analogical completion.
#[derive(Debug, Default)]
pub struct SampleStore {
    samples: Vec<Sample>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, grammar: &str, spec: Spec) {
        self.samples.push(Sample {
            grammar: grammar.to_string(),
            spec,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Fill the gaps of `partial` from the most similar sample.
    pub fn complete(&self, partial: &Spec) -> Result<Spec, EngineError> {
        complete_from(self.samples.iter(), partial)
    }

    /// Like [`SampleStore::complete`], considering only samples of `grammar`.
    pub fn complete_for(&self, grammar: &str, partial: &Spec) -> Result<Spec, EngineError> {
        complete_from(
            self.samples.iter().filter(|sample| sample.grammar == grammar),
            partial,
        )
    }
}

/// Similarity is the number of equal key/value pairs; on a tie the earliest
/// sample wins. Keys already in `partial` are never overwritten.
fn complete_from<'a>(
    candidates: impl Iterator<Item = &'a Sample>,
    partial: &Spec,
) -> Result<Spec, EngineError> {
    let mut best: Option<(usize, &Sample)> = None;
    for sample in candidates {
        let score = overlap(partial, &sample.spec);
        if best.is_none_or(|(top, _)| score > top) {
            best = Some((score, sample));
        }
    }

    let (score, sample) = best.ok_or(EngineError::NoSamples)?;
    debug!(grammar = %sample.grammar, score, "completing from sample");
    Ok(merge_missing(partial, &sample.spec))
}
