use std::{
    collections::{BTreeMap, BTreeSet},
    hash::Hash,
};

/// Invert a map by swapping keys and values
pub fn invert_map<K, V, MK, MV>(original: MK) -> MV
where
    K: Ord + Hash + Eq,
    V: Ord + Hash + Eq + Clone,
    MK: IntoIterator<Item = (K, V)>,
    MV: FromIterator<(V, K)>,
{
    original
        .into_iter()
        .map(|(key, value)| (value, key))
        .collect()
}

/// Enumerate a label set into a stable mapping from class ids to class names.
///
/// Ids follow the sorted order of the labels, so the same label set always
/// yields the same mapping.
pub fn enumerate_labels(labels: &BTreeSet<String>) -> BTreeMap<usize, String> {
    labels.iter().cloned().enumerate().collect()
}

/// Index of the largest score. Ties keep the earliest index.
pub fn argmax(scores: &[f32]) -> Option<usize> {
    let (first, rest) = scores.split_first()?;

    let mut best = 0;
    let mut best_score = *first;

    for (offset, score) in rest.iter().enumerate() {
        if *score > best_score {
            best = offset + 1;
            best_score = *score;
        }
    }

    Some(best)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_enumerate_labels_is_sorted() {
        let labels: BTreeSet<String> = ["yes", "no", "maybe"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let id2label = enumerate_labels(&labels);
        let label2id: BTreeMap<String, usize> = invert_map(id2label.clone());

        assert_eq!(id2label[&0], "maybe");
        assert_eq!(id2label[&1], "no");
        assert_eq!(id2label[&2], "yes");
        assert_eq!(label2id["yes"], 2);
    }

    #[test]
    fn test_argmax_first_seen_wins() {
        assert_eq!(argmax(&[0.25, 0.5, 0.25]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[0.1, 0.45, 0.45]), Some(1));
        assert_eq!(argmax(&[]), None);
    }
}
