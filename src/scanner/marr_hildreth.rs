//! Marr-Hildreth perceptual hash (`mh`).
//!
//! The grayscale image is blurred, resized to 512x512, histogram-equalized
//! and correlated with a Marr-Hildreth (Mexican hat) kernel. The edge
//! response is summed over a 31x31 grid of 16x16 blocks. Every fourth 3x3
//! neighbourhood of blocks yields nine bits, one per block, set when the
//! block is above the neighbourhood mean. 8x8 neighbourhoods give a 576-bit
//! (72-byte) fingerprint compared by normalized Hamming distance.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage};
use rayon::prelude::*;
use std::path::Path;

use super::perceptual::{AlgorithmError, Fingerprint, HashAlgorithm};

/// Name under which `mh` fingerprints are stored.
pub const MH_ALGORITHM: &str = "mh";

/// Fingerprint length in bytes.
pub const MH_HASH_BYTES: usize = 72;

const SIDE: usize = 512;
const BLOCK: usize = 16;
const BLOCKS: usize = 31;
const STEP: usize = 4;

/// Marr-Hildreth hash with configurable kernel scale.
#[derive(Debug, Clone, Copy)]
pub struct MarrHildrethAlgorithm {
    alpha: f32,
    level: f32,
}

impl Default for MarrHildrethAlgorithm {
    fn default() -> Self {
        Self::new(2.0, 1.0)
    }
}

impl MarrHildrethAlgorithm {
    /// Create the algorithm with kernel scale `alpha` and `level`.
    #[must_use]
    pub fn new(alpha: f32, level: f32) -> Self {
        Self { alpha, level }
    }

    /// Kernel radius and row-major kernel weights.
    fn kernel(&self) -> (usize, Vec<f32>) {
        let radius = (4.0 * self.alpha.powf(self.level)) as usize;
        let scale = self.alpha.powf(-self.level);
        let size = 2 * radius + 1;

        let mut weights = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                let xpos = scale * (x as f32 - radius as f32);
                let ypos = scale * (y as f32 - radius as f32);
                let a = xpos * xpos + ypos * ypos;
                weights.push((2.0 - a) * (-a / 2.0).exp());
            }
        }
        (radius, weights)
    }

    /// Fingerprint of an already decoded image.
    #[must_use]
    pub fn hash_image(&self, img: &DynamicImage) -> Fingerprint {
        let gray = imageops::blur(&img.to_luma8(), 1.0);
        let mut gray = imageops::resize(&gray, SIDE as u32, SIDE as u32, FilterType::CatmullRom);
        equalize(&mut gray);
        let response = self.correlate(&gray);
        Fingerprint::from_bytes(pack_bits(&block_sums(&response)))
    }

    /// Edge response normalized to [0, 1]; borders are clamped.
    fn correlate(&self, img: &GrayImage) -> Vec<f32> {
        let (radius, kernel) = self.kernel();
        let size = 2 * radius + 1;
        let pixels = img.as_raw();

        let mut response = vec![0.0f32; SIDE * SIDE];
        response
            .par_chunks_mut(SIDE)
            .enumerate()
            .for_each(|(y, row_out)| {
                for (x, out) in row_out.iter_mut().enumerate() {
                    let mut acc = 0.0f32;
                    for ky in 0..size {
                        let sy = (y + ky).saturating_sub(radius).min(SIDE - 1);
                        let row = &pixels[sy * SIDE..(sy + 1) * SIDE];
                        let weights = &kernel[ky * size..(ky + 1) * size];
                        for (kx, w) in weights.iter().enumerate() {
                            let sx = (x + kx).saturating_sub(radius).min(SIDE - 1);
                            acc += w * f32::from(row[sx]);
                        }
                    }
                    *out = acc;
                }
            });

        let (min, max) = response
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = max - min;
        if range <= f32::EPSILON {
            response.iter_mut().for_each(|v| *v = 0.0);
        } else {
            response.iter_mut().for_each(|v| *v = (*v - min) / range);
        }
        response
    }
}

impl HashAlgorithm for MarrHildrethAlgorithm {
    fn name(&self) -> &str {
        MH_ALGORITHM
    }

    fn compute(&self, path: &Path) -> Result<Fingerprint, AlgorithmError> {
        let img = image::open(path).map_err(|e| AlgorithmError::LoadError(path.to_path_buf(), e))?;
        Ok(self.hash_image(&img))
    }
}

/// Spread the gray levels over the image's own value range.
fn equalize(img: &mut GrayImage) {
    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[usize::from(p[0])] += 1;
    }
    let Some(min) = histogram.iter().position(|&n| n > 0) else {
        return;
    };
    let max = histogram.iter().rposition(|&n| n > 0).unwrap_or(min);
    if min == max {
        return;
    }

    let mut cumulative = [0u64; 256];
    let mut running = 0u64;
    for (level, count) in histogram.iter().enumerate() {
        running += count;
        cumulative[level] = running;
    }
    let total = running as f64;
    let span = (max - min) as f64;
    for p in img.pixels_mut() {
        let share = cumulative[usize::from(p[0])] as f64 / total;
        p[0] = (min as f64 + span * share).round() as u8;
    }
}

/// Sum of the response over each 16x16 block, indexed `[row][column]`.
fn block_sums(response: &[f32]) -> Vec<[f32; BLOCKS]> {
    let mut blocks = vec![[0.0f32; BLOCKS]; BLOCKS];
    for (by, block_row) in blocks.iter_mut().enumerate() {
        for (bx, sum) in block_row.iter_mut().enumerate() {
            for y in by * BLOCK..(by + 1) * BLOCK {
                let start = y * SIDE + bx * BLOCK;
                *sum += response[start..start + BLOCK].iter().sum::<f32>();
            }
        }
    }
    blocks
}

/// Nine bits per sampled 3x3 neighbourhood, most significant bit first.
fn pack_bits(blocks: &[[f32; BLOCKS]]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MH_HASH_BYTES);
    let mut byte = 0u8;
    let mut bits = 0usize;

    for by in (0..BLOCKS - 2).step_by(STEP) {
        for bx in (0..BLOCKS - 2).step_by(STEP) {
            let mut neighbourhood = [0.0f32; 9];
            for dy in 0..3 {
                for dx in 0..3 {
                    neighbourhood[dy * 3 + dx] = blocks[by + dy][bx + dx];
                }
            }
            let mean = neighbourhood.iter().sum::<f32>() / 9.0;
            for value in neighbourhood {
                byte = (byte << 1) | u8::from(value > mean);
                bits += 1;
                if bits % 8 == 0 {
                    bytes.push(byte);
                    byte = 0;
                }
            }
        }
    }
    bytes
}
