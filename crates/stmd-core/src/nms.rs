//! Matrix non-maximum suppression.
//!
//! Four interchangeable algorithms zero out every cell that is not the
//! maximum of its `(2R+1)×(2R+1)` neighborhood; surviving cells keep their
//! original value. On tie-free inputs all four produce identical results;
//! ties break in row-major scan order. The `Auto` method benchmarks the
//! four on first use of a `(h, w, radius)` signature and memoizes the
//! winner for the lifetime of the memo scope.

use crate::{Error, Matrix};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::debug;

/// Suppression method requested by configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NmsMethod {
    Sort,
    Conv2,
    Bubble,
    Greedy,
    /// Benchmark the four algorithms on first use and memoize the winner.
    Auto,
}

impl NmsMethod {
    pub fn name(&self) -> &'static str {
        match self {
            NmsMethod::Sort => "sort",
            NmsMethod::Conv2 => "conv2",
            NmsMethod::Bubble => "bubble",
            NmsMethod::Greedy => "greedy",
            NmsMethod::Auto => "auto",
        }
    }
}

impl FromStr for NmsMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sort" => Ok(NmsMethod::Sort),
            "conv2" => Ok(NmsMethod::Conv2),
            "bubble" => Ok(NmsMethod::Bubble),
            "greedy" => Ok(NmsMethod::Greedy),
            "auto" => Ok(NmsMethod::Auto),
            other => Err(Error::InvalidParameter(format!(
                "unknown NMS method '{other}', expected sort|conv2|bubble|greedy|auto"
            ))),
        }
    }
}

/// One of the four concrete algorithms (`Auto` resolves to one of these).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NmsAlgorithm {
    Sort,
    Conv2,
    Bubble,
    Greedy,
}

pub const ALL_ALGORITHMS: [NmsAlgorithm; 4] = [
    NmsAlgorithm::Sort,
    NmsAlgorithm::Conv2,
    NmsAlgorithm::Bubble,
    NmsAlgorithm::Greedy,
];

impl NmsAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            NmsAlgorithm::Sort => "sort",
            NmsAlgorithm::Conv2 => "conv2",
            NmsAlgorithm::Bubble => "bubble",
            NmsAlgorithm::Greedy => "greedy",
        }
    }

    pub fn run(&self, input: &Matrix, radius: usize) -> Matrix {
        match self {
            NmsAlgorithm::Sort => sort_nms(input, radius),
            NmsAlgorithm::Conv2 => conv2_nms(input, radius),
            NmsAlgorithm::Bubble => bubble_nms(input, radius),
            NmsAlgorithm::Greedy => greedy_nms(input, radius),
        }
    }
}

type Signature = (usize, usize, usize);

/// Shared memo of the fastest algorithm per `(h, w, radius)` signature.
///
/// Clone handles to share one scope across engines (the original keeps a
/// single process-wide table); entries are never invalidated.
#[derive(Clone, Debug, Default)]
pub struct NmsMemo {
    inner: Arc<Mutex<HashMap<Signature, NmsAlgorithm>>>,
}

impl NmsMemo {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup(&self, sig: Signature) -> Option<NmsAlgorithm> {
        self.inner.lock().expect("nms memo poisoned").get(&sig).copied()
    }

    fn store(&self, sig: Signature, algo: NmsAlgorithm) {
        self.inner.lock().expect("nms memo poisoned").insert(sig, algo);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("nms memo poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Measures how long an algorithm takes on a representative input.
///
/// Wall-clock selection is inherently machine-dependent, so the routine is
/// a trait: tests inject a deterministic implementation.
pub trait NmsBench {
    fn measure(&mut self, algo: NmsAlgorithm, input: &Matrix, radius: usize) -> Duration;
}

/// Default bench: one discarded warm-up run, then `repeats` timed runs.
#[derive(Clone, Copy, Debug)]
pub struct WallClockBench {
    pub repeats: usize,
}

impl Default for WallClockBench {
    fn default() -> Self {
        Self { repeats: 2 }
    }
}

impl NmsBench for WallClockBench {
    fn measure(&mut self, algo: NmsAlgorithm, input: &Matrix, radius: usize) -> Duration {
        algo.run(input, radius); // warm-up, discarded
        let start = Instant::now();
        for _ in 0..self.repeats.max(1) {
            algo.run(input, radius);
        }
        start.elapsed()
    }
}

/// Non-maximum suppression engine with a self-tuning dispatcher.
pub struct NmsEngine {
    radius: usize,
    method: NmsMethod,
    resolved: Option<NmsAlgorithm>,
    memo: NmsMemo,
    bench: Box<dyn NmsBench + Send>,
}

impl NmsEngine {
    /// Engine with a private memo scope.
    pub fn new(radius: usize, method: NmsMethod) -> Result<Self, Error> {
        Self::with_memo(radius, method, NmsMemo::new())
    }

    /// Engine sharing an explicit memo scope with other engines.
    pub fn with_memo(radius: usize, method: NmsMethod, memo: NmsMemo) -> Result<Self, Error> {
        if radius == 0 {
            return Err(Error::InvalidParameter(
                "NMS radius must be positive".into(),
            ));
        }
        Ok(Self {
            radius,
            method,
            resolved: None,
            memo,
            bench: Box::new(WallClockBench::default()),
        })
    }

    /// Replace the selection bench (deterministic benches for tests).
    pub fn set_bench(&mut self, bench: Box<dyn NmsBench + Send>) {
        self.bench = bench;
    }

    #[inline]
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Algorithm the engine has settled on, if resolution happened yet.
    pub fn resolved(&self) -> Option<NmsAlgorithm> {
        self.resolved.or(match self.method {
            NmsMethod::Sort => Some(NmsAlgorithm::Sort),
            NmsMethod::Conv2 => Some(NmsAlgorithm::Conv2),
            NmsMethod::Bubble => Some(NmsAlgorithm::Bubble),
            NmsMethod::Greedy => Some(NmsAlgorithm::Greedy),
            NmsMethod::Auto => None,
        })
    }

    /// Suppress non-maxima of `input` within the engine's radius.
    ///
    /// Empty input yields an equally empty output.
    pub fn suppress(&mut self, input: &Matrix) -> Matrix {
        if input.is_empty() {
            return Matrix::zeros(input.w, input.h);
        }
        let algo = self.resolve(input);
        algo.run(input, self.radius)
    }

    fn resolve(&mut self, input: &Matrix) -> NmsAlgorithm {
        match self.method {
            NmsMethod::Sort => NmsAlgorithm::Sort,
            NmsMethod::Conv2 => NmsAlgorithm::Conv2,
            NmsMethod::Bubble => NmsAlgorithm::Bubble,
            NmsMethod::Greedy => NmsAlgorithm::Greedy,
            NmsMethod::Auto => {
                if let Some(algo) = self.resolved {
                    return algo;
                }
                let sig = (input.h, input.w, self.radius);
                let algo = match self.memo.lookup(sig) {
                    Some(algo) => algo,
                    None => {
                        let algo = select_fastest(self.bench.as_mut(), input, self.radius);
                        self.memo.store(sig, algo);
                        algo
                    }
                };
                self.resolved = Some(algo);
                algo
            }
        }
    }
}

/// Time all four algorithms and pick the minimum.
fn select_fastest(bench: &mut dyn NmsBench, input: &Matrix, radius: usize) -> NmsAlgorithm {
    let mut best = ALL_ALGORITHMS[0];
    let mut best_time = Duration::MAX;
    for algo in ALL_ALGORITHMS {
        let elapsed = bench.measure(algo, input, radius);
        if elapsed < best_time {
            best_time = elapsed;
            best = algo;
        }
    }
    #[cfg(feature = "tracing")]
    debug!(
        algo = best.name(),
        h = input.h,
        w = input.w,
        radius,
        "auto-selected NMS algorithm"
    );
    best
}

#[inline]
fn window(center: usize, radius: usize, limit: usize) -> (usize, usize) {
    (center.saturating_sub(radius), (center + radius + 1).min(limit))
}

/// Maximum of `input` over the window centered at `(x, y)`.
fn window_max(input: &Matrix, x: usize, y: usize, radius: usize) -> f32 {
    let (x0, x1) = window(x, radius, input.w);
    let (y0, y1) = window(y, radius, input.h);
    let mut best = f32::NEG_INFINITY;
    for yy in y0..y1 {
        for xx in x0..x1 {
            best = best.max(input.at(xx, yy));
        }
    }
    best
}

/// Position of the window maximum; ties go to the first cell in row-major
/// order.
fn window_argmax(input: &Matrix, x: usize, y: usize, radius: usize) -> (usize, usize) {
    let (x0, x1) = window(x, radius, input.w);
    let (y0, y1) = window(y, radius, input.h);
    let mut best = f32::NEG_INFINITY;
    let mut pos = (x0, y0);
    for yy in y0..y1 {
        for xx in x0..x1 {
            let v = input.at(xx, yy);
            if v > best {
                best = v;
                pos = (xx, yy);
            }
        }
    }
    pos
}

fn fill_window(mask: &mut [bool], w: usize, h: usize, x: usize, y: usize, radius: usize, v: bool) {
    let (x0, x1) = window(x, radius, w);
    let (y0, y1) = window(y, radius, h);
    for yy in y0..y1 {
        mask[yy * w + x0..yy * w + x1].fill(v);
    }
}

/// Dilation-compare suppression: a cell survives iff no neighbor in its
/// window is strictly larger. `O(R²·H·W)`.
pub fn conv2_nms(input: &Matrix, radius: usize) -> Matrix {
    let (w, h) = input.shape();
    let mut out = input.clone();
    for y in 0..h {
        for x in 0..w {
            let v = input.at(x, y);
            if v < window_max(input, x, y, radius) {
                out.set(x, y, 0.0);
            }
        }
    }
    out
}

/// Sort-priority suppression: visit positive cells in descending value
/// order, mark each unvisited cell's window as visited, and keep the cell
/// only if it equals the true window maximum. The re-check rescues cells
/// that a larger neighbor's window already covered but that are the real
/// peak of their own sub-region.
pub fn sort_nms(input: &Matrix, radius: usize) -> Matrix {
    let (w, h) = input.shape();
    let mut candidates: Vec<(usize, f32)> = input
        .data
        .iter()
        .enumerate()
        .filter(|(_, &v)| v > 0.0)
        .map(|(i, &v)| (i, v))
        .collect();
    // descending value, ties by scan order
    candidates.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut keep = vec![true; w * h];
    for &(idx, v) in &candidates {
        if !keep[idx] {
            continue;
        }
        let (x, y) = (idx % w, idx / w);
        fill_window(&mut keep, w, h, x, y, radius, false);
        if v == window_max(input, x, y, radius) {
            keep[idx] = true;
        }
    }

    let mut out = Matrix::zeros(w, h);
    for (i, (&v, &k)) in input.data.iter().zip(&keep).enumerate() {
        if k {
            out.data[i] = v;
        }
    }
    out
}

/// Bubble-greedy suppression: repeatedly extract the global maximum of a
/// shrinking working copy, keep it if it is the true local maximum of the
/// original matrix, and zero its window in the copy. Stops when the
/// remaining maximum is ≈0.
pub fn bubble_nms(input: &Matrix, radius: usize) -> Matrix {
    let (w, h) = input.shape();
    let mut out = Matrix::zeros(w, h);
    let mut work = input.clone();

    loop {
        let mut max_v = f32::NEG_INFINITY;
        let mut max_i = 0;
        for (i, &v) in work.data.iter().enumerate() {
            if v > max_v {
                max_v = v;
                max_i = i;
            }
        }
        if max_v <= 1e-16 {
            break;
        }
        let (x, y) = (max_i % w, max_i / w);
        let local_max = window_max(input, x, y, radius);
        if max_v == local_max {
            out.data[max_i] = local_max;
        }
        let (x0, x1) = window(x, radius, w);
        let (y0, y1) = window(y, radius, h);
        for yy in y0..y1 {
            work.data[yy * w + x0..yy * w + x1].fill(0.0);
        }
    }
    out
}

struct GreedyFrame {
    x: usize,
    y: usize,
    max_x: usize,
    max_y: usize,
    located: bool,
}

/// Recursive-greedy suppression, implemented with an explicit work stack
/// and a visited mask so plateaus cannot exhaust the call stack.
///
/// For each unvisited cell, locate the window maximum. If the cell is its
/// own maximum, confirm it and suppress its window; otherwise resolve the
/// maximum first, then suppress only the overlap of the two windows when
/// the maximum precedes the cell in scan order, so earlier rows are not
/// rediscovered.
pub fn greedy_nms(input: &Matrix, radius: usize) -> Matrix {
    let (w, h) = input.shape();
    let mut out = Matrix::zeros(w, h);
    let mut unvisited = vec![true; w * h];
    let mut stack: Vec<GreedyFrame> = Vec::new();

    for y in 0..h {
        for x in 0..w {
            if !unvisited[y * w + x] {
                continue;
            }
            stack.push(GreedyFrame {
                x,
                y,
                max_x: 0,
                max_y: 0,
                located: false,
            });
            while !stack.is_empty() {
                let top = stack.len() - 1;
                if !stack[top].located {
                    let (cx, cy) = (stack[top].x, stack[top].y);
                    let (mx, my) = window_argmax(input, cx, cy, radius);
                    stack[top].max_x = mx;
                    stack[top].max_y = my;
                    stack[top].located = true;
                    if (mx, my) == (cx, cy) {
                        out.set(mx, my, input.at(mx, my));
                        fill_window(&mut unvisited, w, h, mx, my, radius, false);
                        stack.pop();
                        continue;
                    }
                    if unvisited[my * w + mx] {
                        stack.push(GreedyFrame {
                            x: mx,
                            y: my,
                            max_x: 0,
                            max_y: 0,
                            located: false,
                        });
                        continue;
                    }
                }
                let frame = stack.pop().expect("stack is non-empty");
                // the window maximum is resolved; if it sits earlier in scan
                // order, its window already covers part of ours, so mark the
                // overlap as visited
                if frame.max_y < frame.y || (frame.max_y == frame.y && frame.max_x < frame.x) {
                    suppress_overlap(&mut unvisited, input, radius, &frame);
                }
            }
        }
    }
    out
}

/// Mark the intersection of the windows around `(x, y)` and
/// `(max_x, max_y)` as visited.
fn suppress_overlap(unvisited: &mut [bool], input: &Matrix, radius: usize, f: &GreedyFrame) {
    let (ax0, ax1) = window(f.x, radius, input.w);
    let (ay0, ay1) = window(f.y, radius, input.h);
    let (bx0, bx1) = window(f.max_x, radius, input.w);
    let (by0, by1) = window(f.max_y, radius, input.h);
    let (x0, x1) = (ax0.max(bx0), ax1.min(bx1));
    let (y0, y1) = (ay0.max(by0), ay1.min(by1));
    for yy in y0..y1 {
        if x0 < x1 {
            unvisited[yy * input.w + x0..yy * input.w + x1].fill(false);
        }
    }
}
