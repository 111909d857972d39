//! Next-token selection from a logits vector.
//!
//! Stateless: every call is a pure function of the logits, the sampling
//! parameters, and the RNG.

use anyhow::Result;
use ndarray::Array1;
use rand::Rng;

use crate::activations::softmax_1d;

/// Per-session sampling parameters.
#[derive(Clone, Copy, Debug)]
pub struct SamplingParams {
    /// 0 selects the argmax; higher values flatten the distribution.
    pub temperature: f32,
    /// Nucleus threshold; values outside (0, 1) disable truncation.
    pub top_p: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.8,
        }
    }
}

/// A selected token together with its probability under the full softmax
/// of the original logits. The probability is informational only.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampledToken {
    pub id: u32,
    pub prob: f32,
}

/// Samples with a thread-local RNG.
pub fn sample(logits: &Array1<f32>, params: &SamplingParams) -> Result<SampledToken> {
    sample_with(logits, params, &mut rand::thread_rng())
}

/// Selects the next token.
///
/// - `temperature == 0`: greedy argmax, ties broken on the first maximal
///   index.
/// - `0 < top_p < 1`: nucleus sampling over `softmax(logits / temperature)`.
/// - otherwise: categorical sampling over `softmax(logits / temperature)`.
pub fn sample_with<R: Rng>(
    logits: &Array1<f32>,
    params: &SamplingParams,
    rng: &mut R,
) -> Result<SampledToken> {
    anyhow::ensure!(!logits.is_empty(), "cannot sample from empty logits");
    anyhow::ensure!(
        params.temperature >= 0.0,
        "temperature must be non-negative (got {})",
        params.temperature
    );

    let id = if params.temperature == 0.0 {
        argmax(logits)
    } else {
        let scaled = logits / params.temperature;
        let probs = softmax_1d(&scaled);
        if params.top_p > 0.0 && params.top_p < 1.0 {
            top_p_sample(&probs, params.top_p, rng)
        } else {
            categorical(&probs, rng)
        }
    };

    // Reported probability always comes from the untempered distribution.
    let prob = softmax_1d(logits)[id as usize];
    Ok(SampledToken { id, prob })
}

/// First maximal index.
fn argmax(logits: &Array1<f32>) -> u32 {
    let mut best = 0;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in logits.iter().enumerate() {
        if v > best_val {
            best = i;
            best_val = v;
        }
    }
    best as u32
}

/// Draws one index from a probability vector by cumulative scan.
fn categorical<R: Rng>(probs: &Array1<f32>, rng: &mut R) -> u32 {
    draw(probs.iter().copied().enumerate(), probs.sum(), rng)
        .unwrap_or((probs.len() - 1) as u32)
}

/// Nucleus sampling: keep the smallest high-probability set whose mass
/// reaches `top_p`, then draw from it proportionally.
fn top_p_sample<R: Rng>(probs: &Array1<f32>, top_p: f32, rng: &mut R) -> u32 {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].partial_cmp(&probs[a]).unwrap_or(std::cmp::Ordering::Equal));

    let mut retained = Vec::with_capacity(order.len());
    let mut mass = 0.0;
    for &idx in &order {
        retained.push((idx, probs[idx]));
        mass += probs[idx];
        if mass >= top_p {
            break;
        }
    }

    draw(retained.iter().map(|&(i, p)| (i, p)), mass, rng)
        .unwrap_or(order[0] as u32)
}

fn draw<R: Rng>(
    weighted: impl Iterator<Item = (usize, f32)>,
    total: f32,
    rng: &mut R,
) -> Option<u32> {
    if total <= 0.0 {
        return None;
    }
    let target: f32 = rng.gen::<f32>() * total;
    let mut cumulative = 0.0;
    let mut last = None;
    for (idx, weight) in weighted {
        cumulative += weight;
        last = Some(idx as u32);
        if cumulative >= target {
            return last;
        }
    }
    last
}
