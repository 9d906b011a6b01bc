use rayon::prelude::*;

use crate::{Error, Image, Result};

/// Bilinearly sample `image` at the sub-pixel location `(u, v)`.
///
/// `u` is the column and `v` the row. Every channel is written to `pixel`,
/// which must hold `image.num_channels()` values. Locations outside
/// `[0, width - 1] x [0, height - 1]`, including NaN locations, yield NaN in
/// every channel.
pub fn sample_bilinear(image: &Image, u: f32, v: f32, pixel: &mut [f32]) {
    let (cols, rows) = (image.width(), image.height());
    let inside = u >= 0.0 && v >= 0.0 && u <= (cols as f32 - 1.0) && v <= (rows as f32 - 1.0);
    if !inside {
        pixel.iter_mut().for_each(|p| *p = f32::NAN);
        return;
    }

    let iu0 = (u.trunc() as usize).min(cols - 1);
    let iv0 = (v.trunc() as usize).min(rows - 1);
    let iu1 = if iu0 + 1 < cols { iu0 + 1 } else { iu0 };
    let iv1 = if iv0 + 1 < rows { iv0 + 1 } else { iv0 };

    let frac_u = u - iu0 as f32;
    let frac_v = v - iv0 as f32;
    let frac_uu = 1.0 - frac_u;
    let frac_vv = 1.0 - frac_v;

    let w00 = frac_uu * frac_vv;
    let w01 = frac_u * frac_vv;
    let w10 = frac_uu * frac_v;
    let w11 = frac_u * frac_v;

    let p00 = image.pixel(iu0, iv0);
    let p01 = image.pixel(iu1, iv0);
    let p10 = image.pixel(iu0, iv1);
    let p11 = image.pixel(iu1, iv1);

    for (k, out) in pixel.iter_mut().enumerate() {
        *out = p00[k] * w00 + p01[k] * w01 + p10[k] * w10 + p11[k] * w11;
    }
}

/// Resample `image` on a grid of sub-pixel locations.
///
/// `map_x` and `map_y` hold the source column and row of every destination
/// pixel of a `width x height` output, row major. Out of range locations
/// produce NaN, see [`sample_bilinear`].
pub fn remap_bilinear(
    image: &Image,
    map_x: &[f32],
    map_y: &[f32],
    width: usize,
    height: usize,
) -> Result<Image> {
    let n = width * height;
    for map in [map_x, map_y] {
        if map.len() != n {
            return Err(Error::BufferSizeMismatch {
                expected: n,
                actual: map.len(),
            });
        }
    }

    let channels = image.num_channels();
    let mut data = vec![0.0f32; n * channels];
    data.par_chunks_exact_mut(channels)
        .zip(map_x.par_iter().zip(map_y.par_iter()))
        .for_each(|(pixel, (&u, &v))| sample_bilinear(image, u, v, pixel));

    Image::new(width, height, channels, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> Image {
        Image::from_fn(4, 3, 2, |x, y| vec![x as f32, 10.0 * y as f32]).unwrap()
    }

    #[test]
    fn samples_on_grid_and_between() {
        let image = ramp();
        let mut pixel = [0.0f32; 2];
        sample_bilinear(&image, 2.0, 1.0, &mut pixel);
        assert_eq!(pixel, [2.0, 10.0]);
        sample_bilinear(&image, 1.25, 0.5, &mut pixel);
        assert_relative_eq!(pixel[0], 1.25, epsilon = 1e-6);
        assert_relative_eq!(pixel[1], 5.0, epsilon = 1e-6);
    }

    #[test]
    fn last_row_and_column_are_inside() {
        let image = ramp();
        let mut pixel = [0.0f32; 2];
        sample_bilinear(&image, 3.0, 2.0, &mut pixel);
        assert_eq!(pixel, [3.0, 20.0]);
    }

    #[test]
    fn outside_is_nan() {
        let image = ramp();
        let mut pixel = [0.0f32; 2];
        for (u, v) in [(-0.01, 1.0), (3.01, 1.0), (1.0, 2.5), (f32::NAN, 0.0)] {
            sample_bilinear(&image, u, v, &mut pixel);
            assert!(pixel.iter().all(|p| p.is_nan()), "({u}, {v})");
        }
    }

    #[test]
    fn remap_shifts_image() {
        let image = ramp();
        let map_x: Vec<f32> = (0..12).map(|i| (i % 4) as f32 + 0.5).collect();
        let map_y: Vec<f32> = (0..12).map(|i| (i / 4) as f32).collect();
        let out = remap_bilinear(&image, &map_x, &map_y, 4, 3).unwrap();
        assert_relative_eq!(out.pixel(0, 0)[0], 0.5, epsilon = 1e-6);
        assert_relative_eq!(out.pixel(2, 2)[1], 20.0, epsilon = 1e-6);
        assert!(out.pixel(3, 1)[0].is_nan());
    }
}
