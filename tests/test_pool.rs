use harvest_search::{
    pool::SolutionPool,
    rng::Pseudorandom,
    trajectory::{hamming_distance, HarvestPeriod, NO_HARVEST},
};

const TREES: usize = 16;

/// Thins trees `2 * block` and `2 * block + 1`, so any two different blocks
/// are four trees apart.
fn block_selection(block: usize) -> Vec<HarvestPeriod> {
    let mut selection = vec![NO_HARVEST; TREES];
    selection[2 * block] = 3;
    selection[2 * block + 1] = 3;
    selection
}

fn random_selection(rng: &mut Pseudorandom) -> Vec<HarvestPeriod> {
    (0..TREES)
        .map(|_| if rng.chance(0.5) { 3 } else { NO_HARVEST })
        .collect()
}

#[test]
fn test_overflowing_pool_evicts_lowest() {
    let capacity = 5;
    let mut pool = SolutionPool::new(capacity).unwrap();
    for block in 0..capacity {
        assert!(pool.try_add_or_replace(&block_selection(block), 10.0 + block as f64));
    }
    assert!(pool.is_full());
    assert_eq!(pool.low().unwrap().value, 10.0);

    assert!(pool.try_add_or_replace(&block_selection(capacity), 100.0));
    assert_eq!(pool.len(), capacity);
    assert!(pool.solutions().iter().all(|s| s.value != 10.0));
    assert!(pool
        .solutions()
        .iter()
        .all(|s| s.selection != block_selection(0)));
    assert_eq!(pool.low().unwrap().value, 11.0);
    assert_eq!(pool.high().unwrap().value, 100.0);
}

#[test]
fn test_hamming_distance_is_a_metric_on_selections() {
    let mut rng = Pseudorandom::from_seed(3);
    for _ in 0..50 {
        let a = random_selection(&mut rng);
        let b = random_selection(&mut rng);
        assert_eq!(hamming_distance(&a, &b), hamming_distance(&b, &a));
        assert_eq!(hamming_distance(&a, &a), 0);
        assert_eq!(hamming_distance(&a, &b) == 0, a == b);
    }
}

#[test]
fn test_pool_never_holds_duplicates_and_keeps_distances_exact() {
    let mut rng = Pseudorandom::from_seed(99);
    let mut pool = SolutionPool::new(6).unwrap();
    for _ in 0..400 {
        let selection = random_selection(&mut rng);
        let value = 100.0 * rng.probability();
        pool.try_add_or_replace(&selection, value);

        let members = pool.solutions();
        for i in 0..members.len() {
            for j in 0..members.len() {
                let expected = hamming_distance(&members[i].selection, &members[j].selection);
                assert_eq!(pool.distances().distance(i, j), expected);
                if i != j {
                    assert!(expected > 0);
                }
            }
        }
        let low = members.iter().map(|s| s.value).fold(f64::INFINITY, f64::min);
        let high = members.iter().map(|s| s.value).fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(pool.low().unwrap().value, low);
        assert_eq!(pool.high().unwrap().value, high);
    }
    assert_eq!(pool.solutions_accepted() + pool.solutions_rejected(), 400);
}
