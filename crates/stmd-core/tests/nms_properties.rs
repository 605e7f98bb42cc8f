//! Cross-algorithm properties of the NMS engine.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::time::Duration;
use stmd_core::nms::{
    bubble_nms, conv2_nms, greedy_nms, sort_nms, NmsAlgorithm, NmsBench, NmsEngine, NmsMemo,
    NmsMethod, ALL_ALGORITHMS,
};
use stmd_core::Matrix;

/// Tie-free matrix: a seeded shuffle of n distinct values.
fn tie_free_matrix(w: usize, h: usize, seed: u64) -> Matrix {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let n = w * h;
    let mut values: Vec<f32> = (1..=n).map(|i| i as f32 / n as f32).collect();
    values.shuffle(&mut rng);
    Matrix::from_vec(w, h, values).unwrap()
}

#[test]
fn algorithms_agree_on_tie_free_inputs() {
    for (w, h, radius, seed) in [
        (40, 25, 1, 7),
        (40, 25, 3, 11),
        (64, 48, 5, 13),
        (17, 17, 8, 17),
    ] {
        let m = tie_free_matrix(w, h, seed);
        let reference = conv2_nms(&m, radius);
        assert_eq!(sort_nms(&m, radius), reference, "sort, r={radius}");
        assert_eq!(bubble_nms(&m, radius), reference, "bubble, r={radius}");
        assert_eq!(greedy_nms(&m, radius), reference, "greedy, r={radius}");
    }
}

#[test]
fn suppression_is_idempotent() {
    let m = tie_free_matrix(32, 24, 42);
    for algo in ALL_ALGORITHMS {
        let once = algo.run(&m, 3);
        let twice = algo.run(&once, 3);
        assert_eq!(once, twice, "{}", algo.name());
    }
}

#[test]
fn survivors_are_local_maxima() {
    let m = tie_free_matrix(50, 30, 99);
    let radius = 4;
    for algo in ALL_ALGORITHMS {
        let out = algo.run(&m, radius);
        for y in 0..m.h {
            for x in 0..m.w {
                let v = out.at(x, y);
                if v == 0.0 {
                    continue;
                }
                let x0 = x.saturating_sub(radius);
                let y0 = y.saturating_sub(radius);
                let x1 = (x + radius + 1).min(m.w);
                let y1 = (y + radius + 1).min(m.h);
                let mut max_w = f32::NEG_INFINITY;
                for yy in y0..y1 {
                    for xx in x0..x1 {
                        max_w = max_w.max(m.at(xx, yy));
                    }
                }
                assert_eq!(v, max_w, "{} at ({x},{y})", algo.name());
            }
        }
    }
}

#[test]
fn documented_window_geometry() {
    // radius 1 centered at (2,2) includes (1,1), so the 3 is dominated
    let m = Matrix::from_vec(3, 3, vec![0.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 3.0]).unwrap();
    let expected =
        Matrix::from_vec(3, 3, vec![0.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
    let mut engine = NmsEngine::new(1, NmsMethod::Conv2).unwrap();
    assert_eq!(engine.suppress(&m), expected);
}

/// Deterministic bench that prefers one algorithm and counts invocations.
struct CountingBench {
    favorite: NmsAlgorithm,
    selections: usize,
}

impl NmsBench for CountingBench {
    fn measure(&mut self, algo: NmsAlgorithm, _input: &Matrix, _radius: usize) -> Duration {
        if algo == self.favorite {
            self.selections += 1;
            Duration::from_nanos(1)
        } else {
            Duration::from_secs(1)
        }
    }
}

#[test]
fn auto_resolution_is_memoized_per_signature() {
    let memo = NmsMemo::new();
    let m = tie_free_matrix(30, 20, 5);

    let mut first = NmsEngine::with_memo(3, NmsMethod::Auto, memo.clone()).unwrap();
    first.set_bench(Box::new(CountingBench {
        favorite: NmsAlgorithm::Greedy,
        selections: 0,
    }));
    assert!(first.resolved().is_none());
    first.suppress(&m);
    assert_eq!(first.resolved(), Some(NmsAlgorithm::Greedy));
    assert_eq!(memo.len(), 1);

    // a second engine on the same signature must skip the benchmark
    struct PanickingBench;
    impl NmsBench for PanickingBench {
        fn measure(&mut self, _: NmsAlgorithm, _: &Matrix, _: usize) -> Duration {
            panic!("signature was already memoized");
        }
    }
    let mut second = NmsEngine::with_memo(3, NmsMethod::Auto, memo.clone()).unwrap();
    second.set_bench(Box::new(PanickingBench));
    second.suppress(&m);
    assert_eq!(second.resolved(), Some(NmsAlgorithm::Greedy));
    assert_eq!(memo.len(), 1);

    // a different radius is a new signature
    let mut third = NmsEngine::with_memo(5, NmsMethod::Auto, memo.clone()).unwrap();
    third.set_bench(Box::new(CountingBench {
        favorite: NmsAlgorithm::Sort,
        selections: 0,
    }));
    third.suppress(&m);
    assert_eq!(third.resolved(), Some(NmsAlgorithm::Sort));
    assert_eq!(memo.len(), 2);
}

#[test]
fn fixed_methods_match_their_algorithm() {
    let m = tie_free_matrix(20, 20, 3);
    for (method, algo) in [
        (NmsMethod::Sort, NmsAlgorithm::Sort),
        (NmsMethod::Conv2, NmsAlgorithm::Conv2),
        (NmsMethod::Bubble, NmsAlgorithm::Bubble),
        (NmsMethod::Greedy, NmsAlgorithm::Greedy),
    ] {
        let mut engine = NmsEngine::new(2, method).unwrap();
        assert_eq!(engine.suppress(&m), algo.run(&m, 2));
        assert_eq!(engine.resolved(), Some(algo));
    }
}
