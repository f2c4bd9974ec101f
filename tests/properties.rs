use asset_criticality::normalize::normalize;
use asset_criticality::scenario::{run_scenarios, Scenario};
use asset_criticality::scoring::{rank, score, WeightConfig};
use asset_criticality::types::{attr, AssetRecord, Dataset};
use asset_criticality::NormalizedTable;
use proptest::prelude::*;

fn dataset(rows: &[(f64, f64)]) -> Dataset {
    Dataset::new(
        rows.iter()
            .enumerate()
            .map(|(i, (ff, ri))| {
                AssetRecord::new(format!("A-{:04}", i + 1))
                    .with_attribute(attr::FAILURE_FREQUENCY, *ff)
                    .with_attribute(attr::REGULATORY_IMPACT, *ri)
            })
            .collect(),
    )
    .unwrap()
}

fn table(rows: &[(f64, f64)]) -> NormalizedTable {
    normalize(&dataset(rows), &[attr::FAILURE_FREQUENCY, attr::REGULATORY_IMPACT]).table
}

fn weights(ff: f64, ri: f64) -> WeightConfig {
    WeightConfig::new([(attr::FAILURE_FREQUENCY, ff), (attr::REGULATORY_IMPACT, ri)]).unwrap()
}

fn rows() -> impl Strategy<Value = Vec<(f64, f64)>> {
    // Integers keep the two columns from collapsing into a single value.
    prop::collection::vec((0u32..1000, 0u32..1000), 2..40)
        .prop_map(|v| v.into_iter().map(|(a, b)| (a as f64, b as f64)).collect())
}

proptest! {
    #[test]
    fn normalized_values_stay_in_unit_interval(rows in rows()) {
        let n = normalize(&dataset(&rows), &[attr::FAILURE_FREQUENCY, attr::REGULATORY_IMPACT]);
        for name in n.table.attributes() {
            let column = n.table.column(name).unwrap();
            prop_assert!(column.iter().all(|v| (0.0..=1.0).contains(v)));
            prop_assert!(column.contains(&0.0));
            prop_assert!(column.contains(&1.0));
        }
    }

    #[test]
    fn score_is_linear_in_weights(rows in rows(), a in 0.0f64..5.0, b in 0.0f64..5.0) {
        let t = table(&rows);
        prop_assume!(t.has_attribute(attr::FAILURE_FREQUENCY) && t.has_attribute(attr::REGULATORY_IMPACT));
        let ff = score(&t, &weights(1.0, 0.0)).unwrap();
        let ri = score(&t, &weights(0.0, 1.0)).unwrap();
        let mixed = score(&t, &weights(a, b)).unwrap();
        for ((m, x), y) in mixed.scores().iter().zip(ff.scores()).zip(ri.scores()) {
            prop_assert!((m - (a * x + b * y)).abs() < 1e-9);
        }
    }

    #[test]
    fn ranking_is_deterministic_and_descending(rows in rows(), a in 0.0f64..1.0) {
        let t = table(&rows);
        prop_assume!(t.has_attribute(attr::FAILURE_FREQUENCY));
        let w = WeightConfig::new([(attr::FAILURE_FREQUENCY, a)]).unwrap();
        let first = rank(&score(&t, &w).unwrap());
        let second = rank(&score(&t, &w).unwrap());
        prop_assert_eq!(&first, &second);
        for pair in first.entries().windows(2) {
            prop_assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn scenario_results_ignore_order(rows in rows(), a in 0.0f64..1.0, b in 0.0f64..1.0) {
        let t = table(&rows);
        let x = Scenario::new("x", weights(a, 1.0 - a));
        let y = Scenario::new("y", weights(b, 1.0 - b));
        let forward = run_scenarios(&t, &[x.clone(), y.clone()], 5);
        let backward = run_scenarios(&t, &[y, x], 5);
        prop_assert_eq!(forward.get("x"), backward.get("x"));
        prop_assert_eq!(forward.get("y"), backward.get("y"));
    }
}
