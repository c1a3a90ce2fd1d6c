use chatline_agents::HistoryWindow;
use chatline_common::{ConversationId, Turn, TurnRole};
use proptest::prelude::*;

fn history_strategy() -> impl Strategy<Value = Vec<Turn>> {
    proptest::collection::vec((any::<bool>(), "\\PC{0,300}"), 0..60).prop_map(|items| {
        items
            .into_iter()
            .map(|(from_actor, text)| {
                let role = if from_actor { TurnRole::Actor } else { TurnRole::Counterpart };
                Turn::new(ConversationId::new("c1"), role, text)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn optimize_is_idempotent(
        history in history_strategy(),
        max_turns in 0usize..40,
        max_bytes in 0usize..6_000,
    ) {
        let window = HistoryWindow::new(max_turns, max_bytes);
        let once = window.optimize(&history);
        let twice = window.optimize(&once);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn optimize_never_exceeds_budgets(
        history in history_strategy(),
        max_turns in 0usize..40,
        max_bytes in 0usize..6_000,
    ) {
        let window = HistoryWindow::new(max_turns, max_bytes);
        let kept = window.optimize(&history);

        prop_assert!(kept.len() <= max_turns);
        if !kept.is_empty() {
            prop_assert!(serde_json::to_vec(&kept).unwrap().len() <= max_bytes);
            // Always a suffix of the input.
            prop_assert_eq!(&history[history.len() - kept.len()..], kept.as_slice());
        }
    }
}
