//! Depth normalization for the depth-of-market bars

use serde::{Deserialize, Serialize};

use super::{BookView, OrderLevel};

/// Where the deepest visible total is taken from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthPolicy {
    /// One maximum across both sides, so bid and ask bars are comparable
    #[default]
    Combined,
    /// Each side normalized against its own maximum
    PerSide,
}

/// Annotate the first `visible_rows` levels of each side with their depth,
/// using the combined maximum
pub fn compute_depth(view: &BookView, visible_rows: usize) -> BookView {
    compute_depth_with(view, visible_rows, DepthPolicy::Combined)
}

/// Annotate the first `visible_rows` levels of each side with their depth
///
/// `depth = 100 - total * 100 / highest_total` inside the window and `0`
/// beyond it. When the highest visible total is zero (empty book) every
/// in-window depth is `NaN`; callers must guard for that case.
pub fn compute_depth_with(view: &BookView, visible_rows: usize, policy: DepthPolicy) -> BookView {
    let bid_highest = highest_total(&view.bids, visible_rows);
    let ask_highest = highest_total(&view.asks, visible_rows);

    let (bid_highest, ask_highest) = match policy {
        DepthPolicy::Combined => {
            let highest = bid_highest.max(ask_highest);
            (highest, highest)
        }
        DepthPolicy::PerSide => (bid_highest, ask_highest),
    };

    BookView {
        bids: annotate(&view.bids, visible_rows, bid_highest),
        asks: annotate(&view.asks, visible_rows, ask_highest),
    }
}

fn highest_total(levels: &[OrderLevel], visible_rows: usize) -> f64 {
    levels
        .iter()
        .take(visible_rows)
        .fold(0.0, |highest, level| f64::max(highest, level.total))
}

fn annotate(levels: &[OrderLevel], visible_rows: usize, highest_total: f64) -> Vec<OrderLevel> {
    levels
        .iter()
        .enumerate()
        .map(|(index, level)| {
            let depth = if index >= visible_rows {
                0.0
            } else if highest_total == 0.0 {
                f64::NAN
            } else {
                100.0 - (level.total * 100.0) / highest_total
            };
            OrderLevel { depth, ..*level }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn side(rows: &[(f64, f64, f64)]) -> Vec<OrderLevel> {
        rows.iter()
            .map(|&(price, size, total)| OrderLevel::new(price, size, total))
            .collect()
    }

    fn depths(levels: &[OrderLevel]) -> Vec<f64> {
        levels.iter().map(|l| l.depth).collect()
    }

    fn assert_depths(actual: &[OrderLevel], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (level, want) in actual.iter().zip(expected) {
            assert!(
                (level.depth - want).abs() < EPSILON,
                "price {}: depth {} != {}",
                level.price,
                level.depth,
                want
            );
        }
    }

    fn xbt_view() -> BookView {
        BookView {
            bids: side(&[
                (42259.0, 470649.0, 470649.0),
                (42400.0, 475589.0, 946238.0),
                (42421.0, 26730.0, 972968.0),
                (42573.0, 182604.0, 1155572.0),
                (42620.5, 26730.0, 1182302.0),
                (42687.0, 2029.0, 1184331.0),
                (42709.5, 7053.0, 1191384.0),
                (42722.0, 17488.0, 1208872.0),
            ]),
            asks: side(&[
                (43474.5, 26730.0, 26730.0),
                (43438.5, 16428.0, 43158.0),
                (43433.5, 11562.0, 54720.0),
                (43387.5, 480314.0, 535034.0),
                (43281.5, 26730.0, 561764.0),
                (43203.0, 2086.0, 563850.0),
                (43162.5, 17669.0, 581519.0),
                (43152.5, 26730.0, 608249.0),
            ]),
        }
    }

    fn eth_view() -> BookView {
        BookView {
            bids: side(&[
                (2933.45, 45304.0, 45304.0),
                (2939.55, 40288.0, 85592.0),
                (2940.5, 133637.0, 219229.0),
                (2940.7, 15891.0, 235120.0),
                (2940.75, 151463.0, 386583.0),
                (2940.9, 3275.0, 389858.0),
                (2941.0, 5008.0, 394866.0),
                (2941.1, 3932.0, 398798.0),
            ]),
            asks: side(&[
                (2981.95, 36514.0, 36514.0),
                (2955.95, 48610.0, 85124.0),
                (2949.2, 5000.0, 90124.0),
                (2948.9, 31773.0, 121897.0),
                (2948.85, 4141.0, 126038.0),
                (2948.6, 1824.0, 127862.0),
                (2948.5, 5862.0, 133724.0),
                (2948.45, 3003.0, 136727.0),
            ]),
        }
    }

    #[test]
    fn test_combined_depth_window_larger_than_book() {
        let annotated = compute_depth(&xbt_view(), 20);

        assert_depths(
            &annotated.bids,
            &[
                61.06709395204786,
                21.725542489196542,
                19.51439027457002,
                4.409068950227976,
                2.197916735601453,
                2.0300743172147264,
                1.446637857440649,
                0.0,
            ],
        );
        assert_depths(
            &annotated.asks,
            &[
                97.78884778537348,
                96.42989497647393,
                95.47346617342448,
                55.741054470613925,
                53.5299022559874,
                53.35734469819799,
                51.895734205110216,
                49.68458199048369,
            ],
        );
    }

    #[test]
    fn test_levels_beyond_window_get_zero_depth() {
        let annotated = compute_depth(&eth_view(), 4);

        assert_depths(
            &annotated.bids,
            &[
                80.73154134059203,
                63.59646138142225,
                6.758676420551211,
                0.0,
                0.0,
                0.0,
                0.0,
                0.0,
            ],
        );
        assert_depths(
            &annotated.asks,
            &[
                84.47005784280367,
                63.79550867642055,
                61.668935011908815,
                48.155410003402515,
                0.0,
                0.0,
                0.0,
                0.0,
            ],
        );
    }

    #[test]
    fn test_per_side_policy_uses_own_maximum() {
        let annotated = compute_depth_with(&xbt_view(), 20, DepthPolicy::PerSide);

        // deepest level of each side sits at zero
        assert_eq!(annotated.bids[7].depth, 0.0);
        assert_eq!(annotated.asks[7].depth, 0.0);
        let expected_first_ask = 100.0 - (26730.0 * 100.0) / 608249.0;
        assert!((annotated.asks[0].depth - expected_first_ask).abs() < EPSILON);
        // bids are unaffected because they already hold the combined maximum
        assert_depths(&annotated.bids, &depths(&compute_depth(&xbt_view(), 20).bids));
    }

    #[test]
    fn test_depth_within_bounds() {
        for view in [xbt_view(), eth_view()] {
            for rows in [0, 1, 3, 8, 50] {
                for policy in [DepthPolicy::Combined, DepthPolicy::PerSide] {
                    let annotated = compute_depth_with(&view, rows, policy);
                    for levels in [&annotated.bids, &annotated.asks] {
                        for (index, level) in levels.iter().enumerate() {
                            if index < rows {
                                assert!((0.0..=100.0).contains(&level.depth));
                            } else {
                                assert_eq!(level.depth, 0.0);
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_zero_window_leaves_all_depth_zero() {
        let annotated = compute_depth(&xbt_view(), 0);
        assert!(annotated.bids.iter().all(|l| l.depth == 0.0));
        assert!(annotated.asks.iter().all(|l| l.depth == 0.0));
    }

    #[test]
    fn test_empty_book() {
        let annotated = compute_depth(&BookView::default(), 20);
        assert!(annotated.is_empty());
    }

    #[test]
    fn test_zero_highest_total_yields_nan() {
        let view = BookView {
            bids: side(&[(10.0, 0.0, 0.0)]),
            asks: Vec::new(),
        };
        let annotated = compute_depth(&view, 5);
        assert!(annotated.bids[0].depth.is_nan());
    }

    #[test]
    fn test_per_side_with_one_empty_side() {
        let view = BookView {
            bids: side(&[(10.0, 2.0, 2.0), (9.0, 2.0, 4.0)]),
            asks: Vec::new(),
        };
        let annotated = compute_depth_with(&view, 5, DepthPolicy::PerSide);
        assert_eq!(depths(&annotated.bids), vec![50.0, 0.0]);
    }

    #[test]
    fn test_policy_deserializes_from_snake_case() {
        let policy: DepthPolicy = serde_json::from_str("\"per_side\"").unwrap();
        assert_eq!(policy, DepthPolicy::PerSide);
        assert_eq!(DepthPolicy::default(), DepthPolicy::Combined);
    }
}
