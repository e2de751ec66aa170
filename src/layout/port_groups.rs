//! Port group arrangement styles
//!
//! Every style is a pure function of the ordered port list, the spacing and
//! the available height. Offsets are measured from the top edge.

use super::types::PortOffset;
use crate::definition::GroupStyle;

/// Compute offsets for `ports` arranged in `style`
pub fn arrange(style: GroupStyle, ports: &[String], spacing: f64, height: f64) -> Vec<PortOffset> {
    match style {
        GroupStyle::Sequential => sequential(ports, spacing, height),
        GroupStyle::Interleaved => interleaved(ports, spacing, height),
        GroupStyle::Alternating => alternating(ports, spacing, height),
    }
}

/// One after another, the block centered in the available height
fn sequential(ports: &[String], spacing: f64, height: f64) -> Vec<PortOffset> {
    let start = centered_start(ports.len(), spacing, height);
    ports
        .iter()
        .enumerate()
        .map(|(i, p)| PortOffset::new(p.as_str(), start + i as f64 * spacing))
        .collect()
}

/// Pairs alternate above and below the centerline, moving outward
///
/// Pair 0 sits just above the center, pair 1 just below, pair 2 above
/// pair 0 and so on. Within a pair the first port is nearer the center.
fn interleaved(ports: &[String], spacing: f64, height: f64) -> Vec<PortOffset> {
    let center = height / 2.0;
    ports
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let pair = i / 2;
            let slot = (pair / 2) * 2 + i % 2;
            let distance = spacing / 2.0 + slot as f64 * spacing;
            let offset = if pair % 2 == 0 {
                center - distance
            } else {
                center + distance
            };
            PortOffset::new(p.as_str(), offset)
        })
        .collect()
}

/// Pairs share a baseline, one a quarter-spacing above it and one below
///
/// Baselines are spaced like a sequential block of pairs.
fn alternating(ports: &[String], spacing: f64, height: f64) -> Vec<PortOffset> {
    let pairs = ports.len().div_ceil(2);
    let start = centered_start(pairs, spacing, height);
    ports
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let baseline = start + (i / 2) as f64 * spacing;
            let offset = if i % 2 == 0 {
                baseline - spacing / 4.0
            } else {
                baseline + spacing / 4.0
            };
            PortOffset::new(p.as_str(), offset)
        })
        .collect()
}

fn centered_start(count: usize, spacing: f64, height: f64) -> f64 {
    let span = count.saturating_sub(1) as f64 * spacing;
    (height - span) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("p{}", i)).collect()
    }

    fn offsets(arranged: &[PortOffset]) -> Vec<f64> {
        arranged.iter().map(|p| p.offset).collect()
    }

    #[test]
    fn test_sequential_centered() {
        let arranged = arrange(GroupStyle::Sequential, &names(3), 20.0, 100.0);
        assert_eq!(offsets(&arranged), vec![30.0, 50.0, 70.0]);
        assert_eq!(arranged[1].port, "p1");
    }

    #[test]
    fn test_sequential_single_port_at_center() {
        let arranged = arrange(GroupStyle::Sequential, &names(1), 20.0, 80.0);
        assert_eq!(offsets(&arranged), vec![40.0]);
    }

    #[test]
    fn test_interleaved_pairs_alternate_sides() {
        let arranged = arrange(GroupStyle::Interleaved, &names(6), 20.0, 200.0);
        assert_eq!(
            offsets(&arranged),
            vec![90.0, 70.0, 110.0, 130.0, 50.0, 30.0]
        );
    }

    #[test]
    fn test_alternating_quarter_offsets() {
        let arranged = arrange(GroupStyle::Alternating, &names(4), 20.0, 100.0);
        assert_eq!(offsets(&arranged), vec![35.0, 45.0, 55.0, 65.0]);
    }

    #[test]
    fn test_empty_group() {
        for style in [
            GroupStyle::Sequential,
            GroupStyle::Interleaved,
            GroupStyle::Alternating,
        ] {
            assert!(arrange(style, &[], 20.0, 100.0).is_empty());
        }
    }

    #[test]
    fn test_reproducible() {
        let ports = names(5);
        assert_eq!(
            arrange(GroupStyle::Interleaved, &ports, 15.0, 120.0),
            arrange(GroupStyle::Interleaved, &ports, 15.0, 120.0)
        );
    }
}
