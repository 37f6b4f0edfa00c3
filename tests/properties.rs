//! Property-based tests for retry, fan-out, and pagination.
//!
//! Async properties run on a current-thread runtime with paused time, so
//! backoff sleeps cost nothing.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tideline::testing::ConcurrencyProbe;
use tideline::{
    collect_pages, paginate, BatchRequest, Outcome, Page, PageCursor, Retrier, RetryNone,
    RetryPolicy,
};

fn block_on_paused<F: Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap()
        .block_on(fut)
}

fn policy_strategy() -> impl Strategy<Value = RetryPolicy> {
    (1u32..=8, 1u64..=500, 1u32..=4, 0u64..=5_000).prop_map(
        |(attempts, base_ms, multiplier, extra_ms)| {
            RetryPolicy::new(attempts, Duration::from_millis(base_ms))
                .with_backoff_multiplier(f64::from(multiplier))
                .with_max_delay(Duration::from_millis(base_ms + extra_ms))
        },
    )
}

proptest! {
    #[test]
    fn prop_always_failing_uses_exact_budget(policy in policy_strategy()) {
        let max_attempts = policy.max_attempts();
        let retrier = Retrier::new(policy).unwrap();
        let calls = AtomicU32::new(0);

        let report = block_on_paused(retrier.run(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>("unavailable")
        }));

        prop_assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
        prop_assert_eq!(report.attempt_count(), max_attempts);
        prop_assert!(report.outcome().is_retryable());
    }

    #[test]
    fn prop_success_after_k_failures(policy in policy_strategy(), k in 0u32..8) {
        let max_attempts = policy.max_attempts();
        let retrier = Retrier::new(policy).unwrap();
        let calls = AtomicU32::new(0);

        let report = block_on_paused(retrier.run(|| async {
            if calls.fetch_add(1, Ordering::SeqCst) < k { Err("busy") } else { Ok(()) }
        }));

        if k < max_attempts {
            prop_assert!(report.is_success());
            prop_assert_eq!(report.attempt_count(), k + 1);
        } else {
            prop_assert!(report.outcome().is_retryable());
            prop_assert_eq!(report.attempt_count(), max_attempts);
        }
    }

    #[test]
    fn prop_fatal_means_one_attempt(policy in policy_strategy()) {
        let retrier = Retrier::new(policy).unwrap().with_classifier(RetryNone);

        let report = block_on_paused(retrier.run(|| async { Err::<(), _>("denied") }));

        prop_assert_eq!(report.attempt_count(), 1);
        prop_assert!(report.outcome().is_fatal());
    }

    #[test]
    fn prop_recorded_delays_match_schedule(policy in policy_strategy()) {
        let schedule = policy.schedule();
        let retrier = Retrier::new(policy).unwrap();

        let report = block_on_paused(retrier.run(|| async { Err::<(), _>(()) }));

        prop_assert_eq!(report.delays(), schedule);
    }

    #[test]
    fn prop_delays_are_monotonic_and_capped(policy in policy_strategy()) {
        let schedule = policy.schedule();

        prop_assert_eq!(schedule[0], Duration::ZERO);
        for pair in schedule.windows(2) {
            prop_assert!(pair[0] <= pair[1]);
        }
        for delay in &schedule {
            prop_assert!(*delay <= policy.max_delay());
        }
    }

    #[test]
    fn prop_jitter_is_within_fraction(
        policy in policy_strategy(),
        fraction in 0.0f64..=1.0,
        seed in any::<u64>(),
        attempt in 2u32..12,
    ) {
        let policy = policy.with_jitter(fraction);
        let mut rng = StdRng::seed_from_u64(seed);
        let delay = policy.delay_before(attempt);
        let jittered = policy.jittered_with(delay, &mut rng);

        prop_assert!(jittered >= delay);
        prop_assert!(jittered <= delay + policy.jitter_bound(delay));
    }

    #[test]
    fn prop_batch_bounds_concurrency_and_keeps_order(
        latencies in prop::collection::vec(1u64..200, 0..40),
        limit in 1usize..8,
    ) {
        let probe = &ConcurrencyProbe::new();
        let count = latencies.len();
        let batch = BatchRequest::new(latencies.into_iter().enumerate().collect(), limit).unwrap();

        let report = block_on_paused(batch.run(|_, item: &(usize, u64), _| {
            let (id, latency) = *item;
            async move {
                let _guard = probe.enter();
                tokio::time::sleep(Duration::from_millis(latency)).await;
                Outcome::<_, String>::Success(id)
            }
        }));

        prop_assert!(probe.peak() <= limit);
        prop_assert_eq!(report.len(), count);
        let ids: Vec<usize> = report.successes().map(|(_, id)| *id).collect();
        prop_assert_eq!(ids, (0..count).collect::<Vec<_>>());
    }

    #[test]
    fn prop_pages_concatenate(pages in prop::collection::vec(
        prop::collection::vec(any::<u16>(), 1..10),
        0..10,
    )) {
        let retrier = Retrier::new(RetryPolicy::new(1, Duration::from_millis(1))).unwrap();
        let expected: Vec<u16> = pages.iter().flatten().copied().collect();

        let result = block_on_paused(collect_pages(paginate(
            &retrier,
            |cursor: &PageCursor<usize>| {
                let index = cursor.position().copied().unwrap_or(0);
                let page = match pages.get(index) {
                    Some(items) if index + 1 < pages.len() => Page::new(items.clone(), Some(index + 1)),
                    Some(items) => Page::last(items.clone()),
                    None => Page::last(Vec::new()),
                };
                async move { Ok::<_, String>(page) }
            },
        )));

        prop_assert!(result.is_complete());
        prop_assert_eq!(result.items, expected);
    }
}
