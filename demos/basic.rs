//! Basic walkthrough of the loop-puzzle rule engine

use loopy_core::{
    compute_embeddings, generate_enumerated_rules, standard, BinaryRuleCollection, EmbeddingCache, FeatureSet,
    FeatureSetState, GenerationConfig, MatchState, PatternBoard, PatternRule, SolutionChannels,
};
use std::sync::Arc;

fn main() -> loopy_core::Result<()> {
    // A single square with unknown surroundings
    let square = Arc::new(PatternBoard::new(standard::square())?);
    println!("Board: {}", square.to_descriptor_string());
    println!("Solutions with no clues: {}\n", loopy_core::count_solutions(&FeatureSet::empty(&square)));

    // What a 3 in the square forces
    if let Some(three) = FeatureSet::empty(&square).with_face_value(0, 3) {
        if let Some(rule) = PatternRule::get_basic_rule(&three, false, SolutionChannels::default()) {
            println!("Basic rule for a 3:");
            println!("  {}", rule);
            println!("  sound: {}\n", rule.is_correct_slow());
        }
    }

    // Mine a small rule set and pack it
    println!("Generating edge rules for the square...");
    let mut cache = EmbeddingCache::new();
    let config = GenerationConfig::quick();
    let rules = generate_enumerated_rules(&square, &BinaryRuleCollection::empty(false), &config, &mut cache)?;
    println!("Found {} rules in {} bytes\n", rules.size(), rules.data().len());

    // Scan the packed rules against a domino with a 0 in its left square
    let domino = Arc::new(PatternBoard::new(standard::domino())?);
    let Some(live) = FeatureSet::empty(&domino).with_face_value(0, 0) else {
        return Ok(());
    };
    let state = FeatureSetState::new(&live);
    let embeddings = compute_embeddings(&square, &domino);
    println!("Live domino: {}", live);
    for i in 0..rules.size() {
        let actionable = rules.get_actionable_embeddings_from_data(i, &embeddings, &state);
        if actionable.is_empty() {
            continue;
        }
        let rule = rules.get_rule(i)?;
        for &k in &actionable {
            if let Some(placed) = rule.embedded(&embeddings[k], &domino) {
                debug_assert_eq!(placed.get_match_state(&live), MatchState::Actionable);
                println!("  fires: {}", placed);
            }
        }
    }

    Ok(())
}
