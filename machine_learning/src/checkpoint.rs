//! The checkpoint blob: the flat parameter vector as little endian `f32`s.

use crate::{MlErr, Result};

const F32_SIZE: usize = size_of::<f32>();

/// Decodes a checkpoint blob into its parameter vector.
///
/// # Arguments
/// * `bytes` - The checkpoint, it doesn't need to be aligned.
///
/// # Returns
/// The parameters or `MlErr::InvalidCheckpoint` if the length isn't a multiple of 4.
pub fn decode(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % F32_SIZE != 0 {
        return Err(MlErr::InvalidCheckpoint { len: bytes.len() });
    }

    let params = bytes
        .chunks_exact(F32_SIZE)
        .map(|chunk| f32::from_le_bytes(bytemuck::pod_read_unaligned(chunk)))
        .collect();

    Ok(params)
}

/// Encodes a parameter vector into a checkpoint blob.
pub fn encode(params: &[f32]) -> Vec<u8> {
    params.iter().flat_map(|p| p.to_le_bytes()).collect()
}
