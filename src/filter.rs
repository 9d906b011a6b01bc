use rayon::prelude::*;

use crate::{Error, Result};

/// Normalized 1D box kernel.
pub fn box_kernel_1d(kernel_size: usize) -> Vec<f32> {
    vec![1.0 / kernel_size as f32; kernel_size]
}

/// Blur a single channel `height x width` buffer with a normalized box filter.
///
/// The filter is separable: a horizontal pass of `block_size.0` taps followed
/// by a vertical pass of `block_size.1` taps. Pixels outside the buffer count
/// as zero and the output has the size of the input. For a window of `w`
/// taps, output `i` averages inputs `i - w / 2 ..= i + (w - 1) / 2`. A NaN
/// anywhere inside the window makes the output NaN.
///
/// Returns `Err(Error::InvalidBlockSize)` for a zero sized window and
/// `Err(Error::BufferSizeMismatch)` if `values` is not `width * height` long.
pub fn box_filter(
    values: &[f32],
    width: usize,
    height: usize,
    block_size: (usize, usize),
) -> Result<Vec<f32>> {
    let (block_w, block_h) = block_size;
    if block_w == 0 || block_h == 0 {
        return Err(Error::InvalidBlockSize(block_w, block_h));
    }
    if values.len() != width * height {
        return Err(Error::BufferSizeMismatch {
            expected: width * height,
            actual: values.len(),
        });
    }
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let kernel_x = box_kernel_1d(block_w);
    let kernel_y = box_kernel_1d(block_h);
    let offsets_x = kernel_offsets(block_w);
    let offsets_y = kernel_offsets(block_h);

    // horizontal pass
    let mut temp = vec![0.0f32; values.len()];
    temp.par_chunks_exact_mut(width)
        .zip(values.par_chunks_exact(width))
        .for_each(|(dst_row, src_row)| {
            for (c, dst) in dst_row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for (k, dx) in kernel_x.iter().zip(offsets_x.iter()) {
                    let x = c as isize + dx;
                    if x >= 0 && (x as usize) < width {
                        acc += src_row[x as usize] * k;
                    }
                }
                *dst = acc;
            }
        });

    // vertical pass
    let mut dst = vec![0.0f32; values.len()];
    dst.par_chunks_exact_mut(width)
        .enumerate()
        .for_each(|(r, dst_row)| {
            for (c, out) in dst_row.iter_mut().enumerate() {
                let mut acc = 0.0f32;
                for (k, dy) in kernel_y.iter().zip(offsets_y.iter()) {
                    let y = r as isize + dy;
                    if y >= 0 && (y as usize) < height {
                        acc += temp[y as usize * width + c] * k;
                    }
                }
                *out = acc;
            }
        });

    Ok(dst)
}

fn kernel_offsets(kernel_size: usize) -> Vec<isize> {
    let before = (kernel_size / 2) as isize;
    (0..kernel_size as isize).map(|i| i - before).collect()
}
