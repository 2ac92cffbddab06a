use std::collections::{BTreeMap, BTreeSet};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::pipelines::text_classification::ConfigError;

use super::LabeledExample;

/// The default separator between text and label, following the fastText convention
pub static DEFAULT_SEPARATOR: &str = "__label__";

/// The result of a stratified train/test split
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Split {
    /// Training texts
    pub train_x: Vec<String>,

    /// Training labels, parallel to `train_x`
    pub train_y: Vec<String>,

    /// Test texts
    pub test_x: Vec<String>,

    /// Test labels, parallel to `test_x`
    pub test_y: Vec<String>,

    /// Every label seen among the well-formed lines
    pub labels: BTreeSet<String>,

    /// Lines that had no usable label
    pub malformed: Vec<String>,
}

impl Split {
    /// The training examples
    pub fn train(&self) -> Vec<LabeledExample> {
        zip_examples(&self.train_x, &self.train_y)
    }

    /// The held-out test examples
    pub fn test(&self) -> Vec<LabeledExample> {
        zip_examples(&self.test_x, &self.test_y)
    }
}

fn zip_examples(texts: &[String], labels: &[String]) -> Vec<LabeledExample> {
    texts
        .iter()
        .zip(labels)
        .map(|(text, label)| LabeledExample::new(text.clone(), label.clone()))
        .collect()
}

/// Parse a `text<SEP>label` line. Returns `None` when the label is missing or blank.
pub fn parse_line(line: &str, separator: &str) -> Option<LabeledExample> {
    let (text, rest) = line.split_once(separator)?;

    let label = rest.split(separator).next().unwrap_or_default().trim();

    if label.is_empty() {
        return None;
    }

    Some(LabeledExample::new(text.trim().to_string(), label.to_string()))
}

/// How many of `group_size` examples of one label go to the test set.
///
/// Always at least one, so every label is represented in evaluation.
pub fn test_count(group_size: usize, test_fraction: f64) -> usize {
    let rest = group_size.saturating_sub(1) as f64;

    ((test_fraction * rest).floor() as usize + 1).min(group_size.max(1))
}

/// Split labeled lines into train and test sets, per label.
///
/// Each label group is shuffled with a generator seeded from `seed`, so the
/// same input and seed always produce the same split.
pub fn split<S: AsRef<str>>(
    lines: &[S],
    test_fraction: f64,
    separator: &str,
    seed: u64,
) -> Result<Split, ConfigError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ConfigError::invalid(
            "test_fraction",
            format!("must be between 0 and 1 (exclusive), got {test_fraction}"),
        ));
    }

    if separator.is_empty() {
        return Err(ConfigError::invalid("separator", "must not be empty"));
    }

    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut malformed = Vec::new();

    for line in lines {
        let line = line.as_ref();

        match parse_line(line, separator) {
            Some(example) => groups.entry(example.label).or_default().push(example.text),
            None => malformed.push(line.to_string()),
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut result = Split {
        labels: groups.keys().cloned().collect(),
        malformed,
        ..Default::default()
    };

    for (label, mut texts) in groups {
        let n_test = test_count(texts.len(), test_fraction);

        texts.shuffle(&mut rng);

        let train = texts.split_off(n_test);

        result.train_y.extend(train.iter().map(|_| label.clone()));
        result.train_x.extend(train);

        result.test_y.extend(texts.iter().map(|_| label.clone()));
        result.test_x.extend(texts);
    }

    log::info!(
        "Split {} labels: {} train, {} test, {} malformed",
        result.labels.len(),
        result.train_x.len(),
        result.test_x.len(),
        result.malformed.len()
    );

    if !result.malformed.is_empty() {
        log::warn!("Malformed lines: {:?}", result.malformed);
    }

    Ok(result)
}
