//! Property-based invariants over the indexes and the filter
//! evaluator.

use lodestone_core::{IndexConfig, LodestoneId, Metadata, Value};
use lodestone_engine::Filter;
use lodestone_index::{math, IvfIndex, LinearIndex, VectorIndex};
use proptest::prelude::*;
use serde_json::json;

fn vector_strategy(dimension: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0, dimension)
        .prop_filter("needs non-zero norm", |v| math::l2_norm(v) > 1e-3)
}

proptest! {
    #[test]
    fn normalized_vectors_are_unit_norm(v in vector_strategy(12)) {
        let unit = math::normalized(&v).unwrap();
        prop_assert!((math::l2_norm(&unit) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn linear_results_are_ordered_and_sized(
        vectors in proptest::collection::vec(vector_strategy(8), 1..40),
        query in vector_strategy(8),
        k in 1usize..50,
    ) {
        let mut index = LinearIndex::new();
        for v in &vectors {
            index.add(LodestoneId::new(), v.clone(), Metadata::new()).unwrap();
        }

        let results = index.query(&query, k);
        // k <= n gives k results, k > n gives n.
        prop_assert_eq!(results.len(), k.min(vectors.len()));
        for pair in results.windows(2) {
            let ordered = pair[0].score > pair[1].score
                || (pair[0].score == pair[1].score && pair[0].id < pair[1].id);
            prop_assert!(ordered);
        }
    }

    #[test]
    fn ivf_holds_each_chunk_exactly_once(
        ops in proptest::collection::vec(0u8..3, 1..60),
        seed in 0u64..1000,
    ) {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        // Probe every cluster so the query surface covers the whole
        // searchable state.
        let config = IndexConfig {
            ivf_n_clusters: Some(4),
            ivf_n_probes: 4,
            ..IndexConfig::default()
        };
        let mut index = IvfIndex::new(&config);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut live: Vec<LodestoneId> = Vec::new();

        for op in ops {
            match op {
                0 => {
                    let id = LodestoneId::new();
                    let mut v: Vec<f32> =
                        (0..6).map(|_| rng.random::<f32>() - 0.5).collect();
                    if math::normalize(&mut v).is_ok() {
                        index.add(id, v, Metadata::new()).unwrap();
                        live.push(id);
                    }
                }
                1 => {
                    if !live.is_empty() {
                        let pick = rng.random_range(0..live.len());
                        let id = live.swap_remove(pick);
                        index.remove(id);
                    }
                }
                _ => index.build().unwrap(),
            }
            // Searchable state holds every live chunk exactly once:
            // buffered entries plus clustered entries equal the total.
            let stats = index.stats();
            prop_assert_eq!(stats.size, live.len());
            prop_assert!(stats.buffered <= stats.size);

            let probe = vec![1.0f32, 0.0, 0.0, 0.0, 0.0, 0.0];
            let all = index.query(&probe, live.len() + 1);
            prop_assert_eq!(all.len(), live.len());
            let mut seen: Vec<LodestoneId> = all.iter().map(|p| p.id).collect();
            seen.sort();
            let mut expected = live.clone();
            expected.sort();
            prop_assert_eq!(seen, expected);
        }

        index.build().unwrap();
        prop_assert_eq!(index.stats().buffered, 0);
        prop_assert_eq!(index.stats().size, live.len());
    }

    #[test]
    fn range_filters_form_half_open_intervals(
        a in -1000.0f64..1000.0,
        width in 0.1f64..500.0,
        x in -2000.0f64..2000.0,
    ) {
        let b = a + width;
        let spec = json!({"score": {"gte": a, "lt": b}});
        let filter = Filter::compile(&spec).unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("score".into(), Value::Number(x));
        prop_assert_eq!(filter.matches(&metadata), a <= x && x < b);
    }

    #[test]
    fn nin_complements_in_for_present_fields(value in "[a-d]") {
        let in_filter = Filter::compile(&json!({"tag": {"in": ["a", "b"]}})).unwrap();
        let nin_filter = Filter::compile(&json!({"tag": {"nin": ["a", "b"]}})).unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("tag".into(), Value::from(value.as_str()));
        prop_assert_ne!(in_filter.matches(&metadata), nin_filter.matches(&metadata));
    }

    #[test]
    fn scalar_shorthand_equals_explicit_eq(n in -1000i64..1000) {
        let shorthand = Filter::compile(&json!({"count": n})).unwrap();
        let explicit = Filter::compile(&json!({"count": {"eq": n}})).unwrap();

        for candidate in [n, n + 1] {
            let mut metadata = Metadata::new();
            metadata.insert("count".into(), Value::from(candidate));
            prop_assert_eq!(
                shorthand.matches(&metadata),
                explicit.matches(&metadata)
            );
        }
    }
}
