use std::sync::Arc;

use chatline_common::{ActorId, ConversationId, Turn, TurnRole};
use chatline_conversation::{CacheKey, ClientCache, MemoryStorage};
use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;

fn timeline(len: usize) -> Vec<Turn> {
    let base = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
    (0..len)
        .map(|i| {
            // Pairs of turns share a timestamp so ordering leans on the id.
            let at = base + Duration::milliseconds((i / 2) as i64);
            Turn::at(ConversationId::new("c1"), TurnRole::Actor, format!("t{i}"), at)
        })
        .collect()
}

proptest! {
    #[test]
    fn append_is_idempotent_under_redelivery(
        len in 1usize..40,
        split in 0usize..40,
        page_start in 0usize..40,
        repeats in 1usize..4,
    ) {
        let mut all = timeline(len);
        all.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        let split = split.min(len);
        let page_start = page_start.min(split);

        let cache = ClientCache::new("dm", Arc::new(MemoryStorage::new()));
        let key = CacheKey::turns(ActorId::new("u1"), ConversationId::new("c1"));
        cache.put(key.clone(), all[split..].to_vec(), true);

        // The older page overlaps the newest one by a turn when possible.
        let end = (split + 1).min(len);
        for _ in 0..repeats {
            cache.append(key.clone(), all[page_start..end].to_vec(), page_start > 0);
        }

        let entry = cache.get(&key).unwrap();
        prop_assert_eq!(&entry.items, &all[page_start..].to_vec());
        prop_assert_eq!(entry.has_more, page_start > 0);
    }
}
