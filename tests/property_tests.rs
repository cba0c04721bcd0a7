//! Property-based tests for client assembly and ranking
//!
//! Following the proptest pattern:
//! - Test assembly invariants over arbitrary declarations
//! - Test ranking invariants over arbitrary scores
//! - Run with ProptestConfig::with_cases(100)

use proptest::prelude::*;
use serde_json::{json, Value};
use vdb_bench::client::ScoredPoint;
use vdb_bench::topk::{top_k, SortOrder};
use vdb_bench::{ClientFactory, Error, ExperimentDeclaration, Params};

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Search variant carrying a distinguishing `ef`
fn arb_variant() -> impl Strategy<Value = Params> {
    (1u64..4096, any::<bool>()).prop_map(|(ef, nested)| {
        let value = if nested {
            json!({"config": {"hnsw_ef": ef}, "parallel": 2})
        } else {
            json!({"ef": ef})
        };
        match value {
            Value::Object(map) => map,
            _ => Params::new(),
        }
    })
}

fn arb_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,24}"
}

fn arb_engine() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec!["qdrant", "weaviate", "milvus", "elastic", "opensearch", "memory"])
}

fn arb_points(max: usize) -> impl Strategy<Value = Vec<ScoredPoint>> {
    prop::collection::vec(-1000.0f32..1000.0, 0..max).prop_map(|scores| {
        scores
            .into_iter()
            .enumerate()
            .map(|(id, score)| ScoredPoint { id: id as u64, score })
            .collect()
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: searcher count equals the variant count, or one when empty
    #[test]
    fn prop_searcher_count(
        name in arb_name(),
        engine in arb_engine(),
        variants in prop::collection::vec(arb_variant(), 0..8)
    ) {
        let factory = ClientFactory::with_default_backends("localhost");
        let expected = variants.len().max(1);
        let decl = ExperimentDeclaration::builder(name.clone(), engine)
            .search_params(variants)
            .build();
        let client = factory.build_client(&decl).unwrap();

        prop_assert_eq!(client.name(), name.as_str());
        prop_assert_eq!(client.searchers().len(), expected);
    }

    /// Property: searchers keep declaration order and their exact variant
    #[test]
    fn prop_searcher_order(
        engine in arb_engine(),
        variants in prop::collection::vec(arb_variant(), 1..8)
    ) {
        let factory = ClientFactory::with_default_backends("localhost");
        let decl = ExperimentDeclaration::builder("ordered", engine)
            .search_params(variants.clone())
            .build();
        let client = factory.build_client(&decl).unwrap();

        for (searcher, variant) in client.searchers().iter().zip(&variants) {
            prop_assert_eq!(searcher.search_params(), variant);
            prop_assert_eq!(searcher.engine(), engine);
        }
    }

    /// Property: engines outside the registry never assemble
    #[test]
    fn prop_unregistered_engine_rejected(engine in "[A-Z][a-z]{2,10}") {
        let factory = ClientFactory::with_default_backends("localhost");
        let result = factory.build_client(&ExperimentDeclaration::new("x", engine));
        let is_unsupported = matches!(result, Err(Error::UnsupportedEngine { .. }));
        prop_assert!(is_unsupported);
    }

    /// Property: Top-K returns min(k, n) points
    #[test]
    fn prop_topk_size(points in arb_points(200), k in 0usize..50) {
        let n = points.len();
        prop_assert_eq!(top_k(points, k, SortOrder::Descending).len(), k.min(n));
    }

    /// Property: Top-K output is ordered and no excluded point beats it
    #[test]
    fn prop_topk_matches_full_sort(
        points in arb_points(200),
        k in 1usize..50,
        descending in any::<bool>()
    ) {
        let order = if descending { SortOrder::Descending } else { SortOrder::Ascending };
        let best = top_k(points.clone(), k, order);

        let mut sorted = points;
        sorted.sort_by(|a, b| {
            let by_score = if descending {
                b.score.partial_cmp(&a.score).unwrap()
            } else {
                a.score.partial_cmp(&b.score).unwrap()
            };
            by_score.then(a.id.cmp(&b.id))
        });
        sorted.truncate(k);
        prop_assert_eq!(best, sorted);
    }
}
