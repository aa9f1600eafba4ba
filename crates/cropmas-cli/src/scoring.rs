//! Detection scores against hand-labelled plants.

use serde::Serialize;

use crate::input::Label;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionScore {
    pub labelled_plants: usize,
    pub leaders: usize,
    pub true_positives: usize,
    pub false_negatives: usize,
    pub false_positives: usize,
    /// Ids of the labels found inside some leader's scanning square.
    pub detected: Vec<String>,
}

/// A label is detected when it lies in the nominal scanning square of at
/// least one leader. Every (label, leader) hit counts as an association;
/// leaders beyond the associations are false positives.
pub fn score(leaders: &[(i32, i32)], half_size: i32, labels: &[Label]) -> DetectionScore {
    let covers = |(x, y): (i32, i32), l: &Label| (l.x - x).abs() <= half_size && (l.y - y).abs() <= half_size;
    let mut out = DetectionScore { labelled_plants: labels.len(), leaders: leaders.len(), ..Default::default() };
    let mut associated = 0;
    for label in labels {
        let hits = leaders.iter().filter(|&&p| covers(p, label)).count();
        if hits > 0 {
            out.true_positives += 1;
            out.detected.push(label.id.clone());
        }
        associated += hits;
    }
    out.false_negatives = labels.len() - out.true_positives;
    out.false_positives = leaders.len().saturating_sub(associated);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(id: &str, x: i32, y: i32) -> Label {
        Label { id: id.into(), x, y }
    }

    #[test]
    fn counts_hits_misses_and_spurious_leaders() {
        let leaders = [(100, 100), (100, 200), (300, 300)];
        let labels = [label("a", 105, 95), label("b", 100, 211), label("c", 500, 500)];
        let s = score(&leaders, 10, &labels);
        assert_eq!(s.true_positives, 1);
        assert_eq!(s.false_negatives, 2);
        assert_eq!(s.false_positives, 2);
        assert_eq!(s.detected, vec!["a".to_string()]);
    }

    #[test]
    fn square_edge_is_inclusive() {
        let s = score(&[(50, 50)], 10, &[label("a", 60, 40)]);
        assert_eq!(s.true_positives, 1);
        assert_eq!(s.false_positives, 0);
    }

    #[test]
    fn several_leaders_on_one_plant_are_not_false_positives() {
        let s = score(&[(50, 50), (52, 50)], 10, &[label("a", 50, 50)]);
        assert_eq!((s.true_positives, s.false_positives), (1, 0));
    }

    #[test]
    fn no_labels() {
        let s = score(&[(50, 50)], 10, &[]);
        assert_eq!((s.true_positives, s.false_negatives, s.false_positives), (0, 0, 1));
    }
}
