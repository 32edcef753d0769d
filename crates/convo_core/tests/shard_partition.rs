use std::collections::HashSet;

use convo_core::{pending_prompts, plan, ShardError, ShardPlan};
use pretty_assertions::assert_eq;

fn prompts(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("prompt {i}")).collect()
}

#[test]
fn union_of_shards_covers_every_prompt_once() {
    let items = prompts(23);
    for count in 1..=5 {
        let mut seen = Vec::new();
        for shard in ShardPlan::all(count).unwrap() {
            seen.extend(plan(&items, shard));
        }
        seen.sort();
        let mut expected = items.clone();
        expected.sort();
        assert_eq!(seen, expected, "shard count {count}");
    }
}

#[test]
fn shard_selection_is_positional_and_ordered() {
    let items = prompts(7);
    let shard = ShardPlan::new(1, 3).unwrap();
    assert_eq!(
        shard.select(&items),
        vec!["prompt 1".to_string(), "prompt 4".to_string()]
    );
    assert_eq!(shard.to_string(), "shard 1/3");
}

#[test]
fn each_shard_depends_only_on_the_list() {
    let items = prompts(10);
    let alone = ShardPlan::new(2, 4).unwrap().select(&items);
    let together: Vec<Vec<String>> = ShardPlan::all(4)
        .unwrap()
        .into_iter()
        .map(|s| s.select(&items))
        .collect();
    assert_eq!(together[2], alone);
    assert_eq!(alone, vec!["prompt 2".to_string(), "prompt 6".to_string()]);
}

#[test]
fn invalid_plans_are_rejected() {
    assert_eq!(ShardPlan::new(0, 0), Err(ShardError::ZeroCount));
    assert_eq!(
        ShardPlan::new(3, 3),
        Err(ShardError::IndexOutOfRange { index: 3, count: 3 })
    );
    assert!(!ShardPlan::single().is_sharded());
}

#[test]
fn done_prompts_are_filtered_before_sharding() {
    let items = vec![
        "alpha".to_string(),
        " beta ".to_string(),
        "gamma".to_string(),
    ];
    let done: HashSet<String> = ["beta".to_string()].into_iter().collect();
    let pending = pending_prompts(&items, &done);
    assert_eq!(pending, vec!["alpha".to_string(), "gamma".to_string()]);

    let second = ShardPlan::new(1, 2).unwrap().select(&pending);
    assert_eq!(second, vec!["gamma".to_string()]);
}

#[test]
fn fully_done_list_yields_nothing() {
    let items = prompts(4);
    let done: HashSet<String> = items.iter().cloned().collect();
    assert!(pending_prompts(&items, &done).is_empty());
}
