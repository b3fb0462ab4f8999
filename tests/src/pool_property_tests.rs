//! Property tests for the code-sequence pool: no two live handles ever
//! name the same slot, and exhaustion is deterministic.

use proptest::prelude::*;

use telegraph_core::pool::{CodeHandle, CodePool, PoolError};
use telegraph_core::CodeSource;

const POOL: usize = 4;

proptest! {
    #[test]
    fn pool_invariants_hold_under_any_alloc_free_order(
        ops in proptest::collection::vec(0u8..=2, 1..128)
    ) {
        let pool: CodePool<POOL, 8> = CodePool::new();
        let mut live: Vec<CodeHandle> = Vec::new();

        for op in ops {
            match op {
                0 => match pool.alloc(CodeSource::Key, &[60, -60]) {
                    Ok(h) => {
                        prop_assert!(
                            !live.iter().any(|l| l.index() == h.index()),
                            "slot {} handed out twice",
                            h.index()
                        );
                        live.push(h);
                    }
                    Err(e) => {
                        prop_assert_eq!(e, PoolError::Exhausted);
                        prop_assert_eq!(live.len(), POOL);
                    }
                },
                1 => {
                    if let Some(h) = live.pop() {
                        prop_assert!(pool.free(h).is_ok());
                        // The handle is dead from here on
                        prop_assert_eq!(pool.free(h), Err(PoolError::StaleHandle));
                    }
                }
                _ => {
                    for h in &live {
                        prop_assert!(pool.snapshot(*h).is_ok());
                    }
                }
            }
            prop_assert_eq!(pool.live(), live.len());
        }
    }

    #[test]
    fn append_never_overruns_capacity(
        chunks in proptest::collection::vec(proptest::collection::vec(-500i32..500, 0..16), 0..8)
    ) {
        let pool: CodePool<2, 8> = CodePool::new();
        let h = pool.alloc(CodeSource::Wire, &[]).unwrap();
        for chunk in &chunks {
            pool.append(h, chunk).unwrap();
        }
        let (_, seq) = pool.snapshot(h).unwrap();
        prop_assert!(seq.len() <= 8);
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        prop_assert_eq!(seq.len(), total.min(8));
    }
}

#[test]
fn test_exactly_n_plus_one_allocation_fails() {
    let pool: CodePool<POOL, 8> = CodePool::new();
    let handles: Vec<_> = (0..POOL)
        .map(|_| pool.alloc(CodeSource::LocalUi, &[1]).unwrap())
        .collect();
    assert_eq!(
        pool.alloc(CodeSource::LocalUi, &[1]),
        Err(PoolError::Exhausted)
    );
    for h in handles {
        pool.free(h).unwrap();
    }
    assert_eq!(pool.live(), 0);
}
