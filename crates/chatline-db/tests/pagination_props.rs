use std::sync::Arc;

use chatline_common::{ActorId, ConversationId, Turn, TurnId, TurnRole};
use chatline_db::{CursorPager, SqliteTurnStore, TurnStore};
use chrono::DateTime;
use proptest::prelude::*;

fn build_turns(offsets: &[i64]) -> Vec<Turn> {
    offsets
        .iter()
        .enumerate()
        .map(|(i, offset)| {
            // Small offsets produce plenty of shared timestamps.
            let created_at =
                DateTime::from_timestamp_micros(1_700_000_000_000_000 + offset).unwrap();
            Turn {
                id: TurnId::generate(created_at),
                conversation_id: ConversationId::new("c1"),
                role: if i % 2 == 0 { TurnRole::Actor } else { TurnRole::Counterpart },
                text: format!("turn {i}"),
                created_at,
                local: false,
            }
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn walking_all_pages_reproduces_the_log(
        offsets in proptest::collection::vec(0i64..20, 0..40),
        page_size in 1usize..8,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let actor = ActorId::new("u1");
        let conversation = ConversationId::new("c1");

        let store = Arc::new(SqliteTurnStore::in_memory("dm").unwrap());
        let mut expected = build_turns(&offsets);
        runtime.block_on(async {
            for turn in &expected {
                store.append_turn(&actor, turn).await.unwrap();
            }
        });
        expected.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let pager = CursorPager::new(store);
        let mut collected: Vec<Turn> = Vec::new();
        let mut cursor = None;
        let mut fetches = 0;
        loop {
            let page = runtime
                .block_on(pager.page(&actor, &conversation, page_size, cursor.as_ref()))
                .unwrap();
            fetches += 1;
            prop_assert!(page.turns.len() <= page_size);
            if page.has_more {
                prop_assert_eq!(page.turns.len(), page_size);
            }

            let mut older = page.turns.clone();
            older.extend(collected);
            collected = older;

            if !page.has_more {
                break;
            }
            cursor = page.next_cursor();
            prop_assert!(fetches <= expected.len() + 1, "pagination did not terminate");
        }

        prop_assert_eq!(collected, expected);
    }
}
