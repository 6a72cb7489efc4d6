//! Two solving strategies for the selection BQM, chosen by problem size:
//! exhaustive enumeration up to 20 variables (deterministic), simulated
//! annealing beyond that (reproducible for a fixed caller-supplied RNG).

use crate::application::optimization::qubo::Bqm;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;
use tracing::{debug, info};

/// Largest problem the exact solver will enumerate (2^20 assignments).
pub const EXACT_SOLVER_MAX_VARS: usize = 20;

/// Fraction of the hot temperature the schedule cools down to.
const COLD_FRACTION: f64 = 1e-3;

#[derive(Debug, Clone, Copy)]
pub struct AnnealParams {
    pub num_reads: usize,
    pub num_sweeps: usize,
}

impl Default for AnnealParams {
    fn default() -> Self {
        Self {
            num_reads: 200,
            num_sweeps: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SolverOutput {
    pub bits: Vec<u8>,
    pub energy: f64,
    pub solver_name: &'static str,
    pub elapsed_s: f64,
}

/// Solve the BQM, returning the lowest-energy assignment found.
pub fn solve(bqm: &Bqm, anneal: &AnnealParams, rng: &mut StdRng) -> SolverOutput {
    let t0 = Instant::now();
    let (bits, energy, solver_name) = if bqm.num_vars() <= EXACT_SOLVER_MAX_VARS {
        let (bits, energy) = solve_exact(bqm);
        (bits, energy, "exact")
    } else {
        let (bits, energy) = solve_annealing(bqm, anneal, rng);
        (bits, energy, "simulated_annealing")
    };
    let elapsed_s = t0.elapsed().as_secs_f64();

    info!(
        "Solved in {:.3}s ({}): {} of {} bits set, energy={:.4}",
        elapsed_s,
        solver_name,
        bits.iter().filter(|b| **b == 1).count(),
        bits.len(),
        energy
    );

    SolverOutput {
        bits,
        energy,
        solver_name,
        elapsed_s,
    }
}

/// Scan all 2^n bitmasks; strict improvement keeps the lowest mask on ties,
/// so the result is fully deterministic.
fn solve_exact(bqm: &Bqm) -> (Vec<u8>, f64) {
    let n = bqm.num_vars();
    let mut best_mask = 0u32;
    let mut best_energy = f64::INFINITY;
    let mut bits = vec![0u8; n];

    for mask in 0u32..(1u32 << n) {
        for (i, bit) in bits.iter_mut().enumerate() {
            *bit = ((mask >> i) & 1) as u8;
        }
        let e = bqm.energy(&bits);
        if e < best_energy {
            best_energy = e;
            best_mask = mask;
        }
    }

    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = ((best_mask >> i) & 1) as u8;
    }
    (bits, best_energy)
}

/// Single-flip simulated annealing: independent restarts, each running a
/// linear hot-to-cold temperature schedule. Per-read seeds are drawn from the
/// caller's RNG up front, so a fixed seed reproduces the best energy exactly.
fn solve_annealing(bqm: &Bqm, params: &AnnealParams, rng: &mut StdRng) -> (Vec<u8>, f64) {
    let n = bqm.num_vars();
    let adjacency = build_adjacency(bqm);

    // Hot temperature scaled to the largest coefficient magnitude.
    let max_coeff = bqm
        .linear
        .iter()
        .map(|h| h.abs())
        .chain(bqm.quadratic.values().map(|j| j.abs()))
        .fold(0.0f64, f64::max)
        .max(1.0);
    let t_hot = max_coeff;
    let t_cold = max_coeff * COLD_FRACTION;

    let seeds: Vec<u64> = (0..params.num_reads).map(|_| rng.random::<u64>()).collect();

    let mut best_bits = vec![0u8; n];
    let mut best_energy = bqm.energy(&best_bits);

    for (read, &seed) in seeds.iter().enumerate() {
        let mut read_rng = StdRng::seed_from_u64(seed);
        let mut bits: Vec<u8> = (0..n).map(|_| read_rng.random_range(0..=1) as u8).collect();
        let mut energy = bqm.energy(&bits);

        for sweep in 0..params.num_sweeps {
            let frac = if params.num_sweeps > 1 {
                sweep as f64 / (params.num_sweeps - 1) as f64
            } else {
                1.0
            };
            let temp = t_hot + (t_cold - t_hot) * frac;

            for i in 0..n {
                let delta = flip_delta(bqm, &adjacency, &bits, i);
                if delta <= 0.0 || read_rng.random::<f64>() < (-delta / temp).exp() {
                    bits[i] ^= 1;
                    energy += delta;
                }
            }
        }

        if energy < best_energy {
            best_energy = energy;
            best_bits = bits;
            debug!("SA read {}: new best energy {:.4}", read, best_energy);
        }
    }

    // Recompute from scratch to shed accumulated float drift.
    let energy = bqm.energy(&best_bits);
    (best_bits, energy)
}

/// Per-variable coupling lists for O(degree) flip deltas.
fn build_adjacency(bqm: &Bqm) -> Vec<Vec<(usize, f64)>> {
    let mut adjacency = vec![Vec::new(); bqm.num_vars()];
    for (&(i, j), &coupling) in &bqm.quadratic {
        adjacency[i].push((j, coupling));
        adjacency[j].push((i, coupling));
    }
    adjacency
}

/// Energy change from flipping bit `i`.
fn flip_delta(bqm: &Bqm, adjacency: &[Vec<(usize, f64)>], bits: &[u8], i: usize) -> f64 {
    let mut local = bqm.linear[i];
    for &(j, coupling) in &adjacency[i] {
        if bits[j] == 1 {
            local += coupling;
        }
    }
    if bits[i] == 0 { local } else { -local }
}
