use std::time::{Duration, Instant};

use chatline_common::{ActorId, Error};
use chatline_security::RateLimiter;
use proptest::prelude::*;

proptest! {
    #[test]
    fn call_after_ceiling_is_rejected_until_window_elapses(
        ceiling in 1u32..25,
        window_ms in 1u64..120_000,
        spacing in proptest::collection::vec(0u64..1_000, 1..40),
    ) {
        let window = Duration::from_millis(window_ms);
        let limiter = RateLimiter::new(ceiling, window);
        let actor = ActorId::new("u1");
        let t0 = Instant::now();

        // Spread the calls over the window without ever leaving it.
        let mut offsets: Vec<Duration> = spacing
            .iter()
            .map(|ms| Duration::from_millis(ms % window_ms.max(1)))
            .collect();
        offsets.sort();
        offsets.insert(0, Duration::ZERO);

        for (i, offset) in offsets.iter().enumerate() {
            let outcome = limiter.check_and_consume_at(&actor, t0 + *offset);
            if (i as u32) < ceiling {
                prop_assert!(outcome.is_ok(), "call {} should be admitted", i + 1);
            } else {
                prop_assert!(matches!(outcome, Err(Error::RateLimited(_))));
            }
        }

        // Still inside the window at its exact end.
        if offsets.len() as u32 >= ceiling {
            prop_assert!(limiter.check_and_consume_at(&actor, t0 + window).is_err());
        }

        // Strictly after the window a fresh budget is granted.
        let after = t0 + window + Duration::from_nanos(1);
        prop_assert!(limiter.check_and_consume_at(&actor, after).is_ok());
        prop_assert_eq!(limiter.entry(&actor).map(|e| e.count), Some(1));
    }
}
