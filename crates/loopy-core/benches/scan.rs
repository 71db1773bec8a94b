use criterion::{black_box, criterion_group, criterion_main, Criterion};
use loopy_core::{
    compute_embeddings, standard, BinaryRuleCollection, FeatureSet, FeatureSetState, PatternBoard, PatternRule,
    SolutionChannels,
};
use std::sync::Arc;

fn square_rules(square: &Arc<PatternBoard>) -> Vec<PatternRule> {
    let empty = FeatureSet::empty(square);
    let mut rules = Vec::new();
    for value in 0..=4 {
        let Some(input) = empty.with_face_value(0, value) else { continue };
        for edge in 0..square.edges.len() {
            for candidate in [input.with_black_edge(edge), input.with_red_edge(edge)].into_iter().flatten() {
                if let Some(rule) = PatternRule::get_basic_rule(&candidate, false, SolutionChannels::default()) {
                    if !rule.is_trivial() {
                        rules.push(rule);
                    }
                }
            }
        }
    }
    rules
}

fn bench_scan(c: &mut Criterion) {
    let square = Arc::new(PatternBoard::new(standard::square()).expect("square board"));
    let target = Arc::new(PatternBoard::new(standard::square_2x2()).expect("2x2 board"));
    let collection = BinaryRuleCollection::from_rules(&square_rules(&square), false).expect("encodable rules");
    let embeddings = compute_embeddings(&square, &target);

    let live = FeatureSet::empty(&target)
        .with_face_value(0, 3)
        .and_then(|s| s.with_face_value(3, 1))
        .expect("consistent clues");
    let state = FeatureSetState::new(&live);

    c.bench_function("scan_each_embedding", |b| {
        b.iter(|| {
            let mut hits = 0;
            for rule in 0..collection.size() {
                for embedding in &embeddings {
                    if collection.is_actionable_embedding_from_data(rule, embedding, &state) {
                        hits += 1;
                    }
                }
            }
            black_box(hits)
        })
    });

    c.bench_function("scan_vectorized", |b| {
        b.iter(|| {
            let mut hits = 0;
            for rule in 0..collection.size() {
                hits += collection
                    .get_actionable_embeddings_from_data(rule, black_box(&embeddings), &state)
                    .len();
            }
            black_box(hits)
        })
    });
}

criterion_group!(benches, bench_scan);
criterion_main!(benches);
