//! State, noise and input vectors, and the sampling-block partition
//!
//! The tracked state concatenates one 6-dof pose block per rigid part:
//! `[x, y, z, rx, ry, rz]` with translation in meters and orientation as
//! an axis-angle rotation vector.

use nalgebra::DVector;

use crate::{Result, TrackError};

/// Full object state: concatenated per-part pose blocks.
pub type StateVector = DVector<f64>;

/// Standard-normal process noise consumed by a transition model.
pub type NoiseVector = DVector<f64>;

/// Control/command vector consumed by a transition model.
pub type InputVector = DVector<f64>;

/// Dimensions of one pose block: 3 translation + 3 rotation coordinates.
pub const POSE_BLOCK_SIZE: usize = 6;

/// A partition of state-vector indices into per-part coordinate blocks.
///
/// Block `i` covers the contiguous index range
/// `[i * block_size, (i + 1) * block_size)`. The partition tiles the full
/// noise dimension exactly: no index is dropped, none appears twice. It is
/// built once at filter construction and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplingBlocks {
    blocks: Vec<Vec<usize>>,
    block_size: usize,
}

impl SamplingBlocks {
    /// Tiles `noise_dimension` indices into `blocks` equal coordinate blocks.
    ///
    /// # Arguments
    /// - `blocks`: number of trackable parts (must be >= 1)
    /// - `noise_dimension`: transition-model noise dimension (must be >= 1
    ///   and evenly divisible by `blocks`)
    ///
    /// # Errors
    /// Returns [`TrackError::Configuration`] when either argument is zero or
    /// the division is inexact. Truncating the remainder would leave trailing
    /// state dimensions out of every block, so inexact tilings are rejected
    /// outright.
    pub fn tile(blocks: usize, noise_dimension: usize) -> Result<Self> {
        if blocks == 0 {
            return Err(TrackError::Configuration {
                description: "sampling blocks require at least one part".into(),
            });
        }
        if noise_dimension == 0 {
            return Err(TrackError::Configuration {
                description: "sampling blocks require a positive noise dimension".into(),
            });
        }
        if noise_dimension % blocks != 0 {
            return Err(TrackError::Configuration {
                description: format!(
                    "noise dimension {} is not divisible by {} blocks",
                    noise_dimension, blocks
                ),
            });
        }

        let block_size = noise_dimension / blocks;
        let mut partition = Vec::with_capacity(blocks);
        for i in 0..blocks {
            let mut block = Vec::with_capacity(block_size);
            for k in 0..block_size {
                block.push(i * block_size + k);
            }
            partition.push(block);
        }

        Ok(Self {
            blocks: partition,
            block_size,
        })
    }

    /// Number of coordinate blocks.
    #[inline]
    pub fn count(&self) -> usize {
        self.blocks.len()
    }

    /// Indices per block.
    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total number of indices covered by the partition.
    #[inline]
    pub fn state_dimension(&self) -> usize {
        self.blocks.len() * self.block_size
    }

    /// The index sequence of block `i`.
    ///
    /// # Panics
    /// Panics if `i` is out of range.
    #[inline]
    pub fn block(&self, i: usize) -> &[usize] {
        &self.blocks[i]
    }

    /// Iterates over the blocks in order.
    pub fn iter(&self) -> impl Iterator<Item = &[usize]> {
        self.blocks.iter().map(|b| b.as_slice())
    }
}
