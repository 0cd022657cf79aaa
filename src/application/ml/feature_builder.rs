use crate::domain::market::AnnotatedBar;
use crate::domain::ml::feature_registry::features_to_vector;

/// Feature matrix and binary next-bar-direction labels, row-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<u32>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn extend(&mut self, other: TrainingSet) {
        self.features.extend(other.features);
        self.targets.extend(other.targets);
    }
}

/// Builds `(features, targets)` from an ordered, annotated series.
///
/// A row is kept only when every feature is defined and a next bar exists;
/// `target = 1` when the next close is higher. The last bar never has a label.
pub fn build(bars: &[AnnotatedBar]) -> TrainingSet {
    let mut set = TrainingSet::default();

    for pair in bars.windows(2) {
        let (row, next) = (&pair[0], &pair[1]);
        if let Some(features) = features_to_vector(&row.indicators) {
            set.features.push(features);
            set.targets.push(u32::from(next.bar.close > row.bar.close));
        }
    }

    set
}
