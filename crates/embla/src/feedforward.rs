//! SwiGLU feed-forward block.
//!
//! Three projections instead of the classic two:
//! `down(SiLU(gate(x)) * up(x))`.

use anyhow::Result;
use ndarray::Array3;

use crate::activations::silu_inplace;
use crate::linear::Linear;

#[derive(Debug)]
pub struct SwiGluFeedForward {
    pub gate: Linear,
    pub up: Linear,
    pub down: Linear,
}

impl SwiGluFeedForward {
    pub fn new(gate: Linear, up: Linear, down: Linear) -> Self {
        Self { gate, up, down }
    }

    pub fn forward(&self, hidden: &Array3<f32>) -> Result<Array3<f32>> {
        // Gate and up projections are independent
        let (mut gate_out, up_out) = rayon::join(
            || self.gate.forward_3d(hidden),
            || self.up.forward_3d(hidden),
        );

        silu_inplace(&mut gate_out);
        let activated = gate_out * up_out;

        Ok(self.down.forward_3d(&activated))
    }
}
