//! Dense depth estimation by plane sweeping.
//!
//! The reference view is swept through a range of fronto-parallel depth
//! planes. At each depth every secondary image is warped onto the reference
//! view, compared pixel by pixel and the differences are aggregated with a
//! box filter. The depth with the lowest aggregated cost wins, optionally
//! refined with a parabola fit, and is turned into a 3D point along the
//! reference ray.

use std::str::FromStr;

use log::{debug, trace};
use nalgebra::Vector3;
use rayon::prelude::*;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

use crate::{
    box_filter, find_subvalue_poly2, project_point, remap_bilinear, Error, Image, LensModel,
    PointCloud, Result, RigidTransform, DEFAULT_UNDISTORT_ITERATIONS,
};

/// Photometric dissimilarity between the reference and a warped image.
///
/// The per-pixel difference is summed over channels and secondary views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub enum CostFunction {
    /// Sum of absolute differences.
    #[default]
    #[cfg_attr(feature = "serde-serialize", serde(rename = "sad"))]
    SumOfAbsoluteDifference,
    /// Sum of squared differences.
    #[cfg_attr(feature = "serde-serialize", serde(rename = "ssd"))]
    SumOfSquaredDifference,
}

impl CostFunction {
    #[inline]
    fn eval(self, a: f32, b: f32) -> f32 {
        let diff = a - b;
        match self {
            CostFunction::SumOfAbsoluteDifference => diff.abs(),
            CostFunction::SumOfSquaredDifference => diff * diff,
        }
    }
}

impl FromStr for CostFunction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sad" => Ok(CostFunction::SumOfAbsoluteDifference),
            "ssd" => Ok(CostFunction::SumOfSquaredDifference),
            _ => Err(Error::UnknownCostFunction(s.to_string())),
        }
    }
}

fn default_block_size() -> (usize, usize) {
    (11, 11)
}

fn default_subpixel_fit() -> bool {
    true
}

/// Options of [`plane_sweeping`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct PlaneSweepConfig {
    /// Smallest and largest depth to test, in the units of the transforms.
    pub depth_range: [f32; 2],
    /// Distance between two tested depths.
    pub step_size: f32,
    /// Width and height of the matching window, in pixels.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_block_size"))]
    pub block_size: (usize, usize),
    /// Refine each depth with a parabola through the neighbouring costs.
    #[cfg_attr(feature = "serde-serialize", serde(default = "default_subpixel_fit"))]
    pub subpixel_fit: bool,
    /// How differences are accumulated.
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub cost_function: CostFunction,
}

impl PlaneSweepConfig {
    /// A configuration with an 11x11 window, sub-step refinement and the sum
    /// of absolute differences.
    pub fn new(depth_range: [f32; 2], step_size: f32) -> Self {
        Self {
            depth_range,
            step_size,
            block_size: default_block_size(),
            subpixel_fit: default_subpixel_fit(),
            cost_function: CostFunction::default(),
        }
    }

    /// Check the configuration without running anything.
    pub fn validate(&self) -> Result<()> {
        let (block_w, block_h) = self.block_size;
        if block_w == 0 || block_h == 0 {
            return Err(Error::InvalidBlockSize(block_w, block_h));
        }
        sample_depths(self.depth_range, self.step_size).map(|_| ())
    }
}

/// The depths tested by a sweep over `depth_range` with `step_size`.
///
/// The sequence starts at the minimum and holds
/// `ceil((max - min) / step_size) + 1` evenly spaced samples, so the maximum
/// is included when the step divides the range.
///
/// Fails unless `step_size` is positive and finite and
/// `0 < min <= max` with both finite.
pub fn sample_depths(depth_range: [f32; 2], step_size: f32) -> Result<Vec<f32>> {
    if !step_size.is_finite() || step_size <= 0.0 {
        return Err(Error::InvalidStepSize(step_size));
    }
    let [min, max] = depth_range;
    if !min.is_finite() || !max.is_finite() || min <= 0.0 || min > max {
        return Err(Error::InvalidDepthRange(min, max));
    }

    let span = (max as f64 - min as f64) / step_size as f64;
    // absorb rounding so an exact multiple does not gain a sample
    let count = (span - 1e-6 * span.max(1.0)).ceil().max(0.0) as usize + 1;
    Ok((0..count)
        .map(|i| (min as f64 + i as f64 * step_size as f64) as f32)
        .collect())
}

/// A secondary camera of a sweep.
#[derive(Debug, Clone, Copy)]
pub struct SecondaryView<'a> {
    /// The image seen by this camera. Must have the reference image size
    /// and channel count.
    pub image: &'a Image,
    /// The lens of this camera.
    pub lens_model: &'a LensModel<f32>,
    /// Maps coordinates of this camera into the reference camera frame,
    /// i.e. the pose of this camera seen from the reference camera.
    pub secondary_to_reference: &'a RigidTransform<f32>,
}

/// Undistorted reference rays, one per pixel, row major, with `z = 1`.
pub fn reference_rays(lens_model: &LensModel<f32>, width: usize, height: usize) -> Vec<Vector3<f32>> {
    let mut rays = vec![Vector3::zeros(); width * height];
    if rays.is_empty() {
        return rays;
    }
    rays.par_chunks_exact_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, ray) in row.iter_mut().enumerate() {
                let (xd, yd) = lens_model.normalize_point(x as f32, y as f32);
                let (xu, yu) = lens_model.undistort_point(xd, yd, DEFAULT_UNDISTORT_ITERATIONS);
                *ray = Vector3::new(xu, yu, 1.0);
            }
        });
    rays
}

/// Warp a secondary image onto the reference view, assuming every reference
/// pixel lies at `depth` along its ray.
///
/// `rays` are the reference rays from [`reference_rays`] for a
/// `width x height` reference image. Reference pixels that land outside the
/// secondary image are NaN.
pub fn reproject_image_at_depth(
    view: &SecondaryView<'_>,
    rays: &[Vector3<f32>],
    width: usize,
    height: usize,
    depth: f32,
) -> Result<Image> {
    let reference_to_secondary = view.secondary_to_reference.inverse();
    reproject_with(view, &reference_to_secondary, rays, width, height, depth)
}

fn reproject_with(
    view: &SecondaryView<'_>,
    reference_to_secondary: &RigidTransform<f32>,
    rays: &[Vector3<f32>],
    width: usize,
    height: usize,
    depth: f32,
) -> Result<Image> {
    let (map_x, map_y): (Vec<f32>, Vec<f32>) = rays
        .par_iter()
        .map(|ray| project_point(&(ray * depth), view.lens_model, reference_to_secondary))
        .unzip();
    remap_bilinear(view.image, &map_x, &map_y, width, height)
}

/// Aggregated matching costs of every pixel at every tested depth.
///
/// Stored as `D` slices of `height x width` values, one slice per depth.
#[derive(Debug, Clone, PartialEq)]
pub struct CostVolume {
    depths: Vec<f32>,
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl CostVolume {
    /// Build a cost volume from depth-major data.
    pub fn new(depths: Vec<f32>, width: usize, height: usize, data: Vec<f32>) -> Result<Self> {
        let expected = depths.len() * width * height;
        if data.len() != expected {
            return Err(Error::BufferSizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            depths,
            width,
            height,
            data,
        })
    }

    fn from_slices(depths: Vec<f32>, width: usize, height: usize, slices: Vec<Vec<f32>>) -> Result<Self> {
        let data = slices.into_iter().flatten().collect();
        Self::new(depths, width, height, data)
    }

    /// The tested depths.
    #[inline]
    pub fn depths(&self) -> &[f32] {
        &self.depths
    }

    /// Width of every slice.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height of every slice.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// The costs of all pixels at depth index `k`.
    ///
    /// # Panics
    ///
    /// Panics if `k` is out of range.
    pub fn slice(&self, k: usize) -> &[f32] {
        let n = self.width * self.height;
        &self.data[k * n..(k + 1) * n]
    }

    /// The depth of lowest cost of every pixel, row major.
    ///
    /// Ties go to the smaller depth. A pixel with a NaN cost at any depth is
    /// NaN. No refinement and no boundary check is applied, see
    /// [`resolve_depths`](Self::resolve_depths) for that.
    pub fn argmin_depths(&self) -> Vec<f32> {
        let n = self.width * self.height;
        let num_depths = self.depths.len();
        let mut depths = vec![f32::NAN; n];
        if n == 0 {
            return depths;
        }
        depths
            .par_chunks_exact_mut(self.width)
            .enumerate()
            .for_each(|(y, row)| {
                let mut profile = vec![0.0f32; num_depths];
                for (x, out) in row.iter_mut().enumerate() {
                    self.fill_profile(y * self.width + x, &mut profile);
                    if let Some(index) = argmin(&profile) {
                        *out = self.depths[index];
                    }
                }
            });
        depths
    }

    fn fill_profile(&self, i: usize, profile: &mut [f32]) {
        let n = self.width * self.height;
        for (k, c) in profile.iter_mut().enumerate() {
            *c = self.data[k * n + i];
        }
    }

    /// Resolve one depth per pixel, row major.
    ///
    /// Picks the first depth of lowest cost. A NaN cost at any depth makes
    /// the pixel NaN, as it does in [`argmin_depths`](Self::argmin_depths).
    /// With `subpixel_fit` the depth is replaced by
    /// the vertex of the parabola through the minimum and its neighbours
    /// where that fit is well posed. Finally, depths at or beyond either end
    /// of the tested range become NaN: the cost had no interior minimum.
    pub fn resolve_depths(&self, subpixel_fit: bool) -> Vec<f32> {
        let n = self.width * self.height;
        let num_depths = self.depths.len();
        let mut resolved = vec![f32::NAN; n];
        if n == 0 || num_depths == 0 {
            return resolved;
        }
        let min_depth = self.depths[0];
        let max_depth = self.depths[num_depths - 1];

        resolved
            .par_chunks_exact_mut(self.width)
            .enumerate()
            .for_each(|(y, row)| {
                let mut profile = vec![0.0f32; num_depths];
                for (x, out) in row.iter_mut().enumerate() {
                    self.fill_profile(y * self.width + x, &mut profile);
                    let Some(index) = argmin(&profile) else {
                        continue;
                    };

                    let mut depth = self.depths[index];
                    if subpixel_fit {
                        if let Some(refined) = find_subvalue_poly2(&self.depths, &profile, index) {
                            depth = refined;
                        }
                    }
                    if depth > min_depth && depth < max_depth {
                        *out = depth;
                    }
                }
            });
        resolved
    }
}

/// Index of the first smallest value, or `None` if any value is NaN.
fn argmin(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            return None;
        }
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

fn check_views(reference: &Image, views: &[SecondaryView<'_>]) -> Result<()> {
    if views.is_empty() {
        return Err(Error::NoSecondaryViews);
    }
    for view in views {
        let expected = (reference.width(), reference.height());
        let actual = (view.image.width(), view.image.height());
        if expected != actual {
            return Err(Error::ImageSizeMismatch { expected, actual });
        }
        if view.image.num_channels() != reference.num_channels() {
            return Err(Error::ChannelMismatch {
                expected: reference.num_channels(),
                actual: view.image.num_channels(),
            });
        }
    }
    Ok(())
}

/// Compute the aggregated cost volume of a sweep.
///
/// This is [`plane_sweeping`] without the depth selection.
pub fn compute_cost_volume(
    image: &Image,
    lens_model: &LensModel<f32>,
    views: &[SecondaryView<'_>],
    config: &PlaneSweepConfig,
) -> Result<CostVolume> {
    config.validate()?;
    check_views(image, views)?;
    let depths = sample_depths(config.depth_range, config.step_size)?;
    let (width, height) = (image.width(), image.height());
    let rays = reference_rays(lens_model, width, height);
    compute_cost_volume_with_rays(image, &rays, views, config, depths)
}

fn compute_cost_volume_with_rays(
    image: &Image,
    rays: &[Vector3<f32>],
    views: &[SecondaryView<'_>],
    config: &PlaneSweepConfig,
    depths: Vec<f32>,
) -> Result<CostVolume> {
    let (width, height) = (image.width(), image.height());
    let channels = image.num_channels();
    let reference_to_secondary: Vec<RigidTransform<f32>> = views
        .iter()
        .map(|view| view.secondary_to_reference.inverse())
        .collect();

    debug!(
        "plane sweep: {} depths in [{}, {}], {} secondary views, {}x{} window, {:?}",
        depths.len(),
        config.depth_range[0],
        config.depth_range[1],
        views.len(),
        config.block_size.0,
        config.block_size.1,
        config.cost_function,
    );

    let slices = depths
        .par_iter()
        .map(|&depth| {
            let mut cost = vec![0.0f32; width * height];
            for (view, transform) in views.iter().zip(reference_to_secondary.iter()) {
                let warped = reproject_with(view, transform, rays, width, height, depth)?;
                cost.par_iter_mut()
                    .zip(image.as_slice().par_chunks_exact(channels))
                    .zip(warped.as_slice().par_chunks_exact(channels))
                    .for_each(|((c, reference), secondary)| {
                        *c += reference
                            .iter()
                            .zip(secondary)
                            .map(|(&a, &b)| config.cost_function.eval(a, b))
                            .sum::<f32>();
                    });
            }
            trace!("plane sweep: depth {depth} done");
            box_filter(&cost, width, height, config.block_size)
        })
        .collect::<Result<Vec<Vec<f32>>>>()?;

    CostVolume::from_slices(depths, width, height, slices)
}

/// Estimate a dense point cloud of the reference view by plane sweeping.
///
/// `image` and `lens_model` describe the reference camera; `views` the
/// secondary cameras. The result has one point per reference pixel, in the
/// reference camera frame. Pixels without a conclusive depth are NaN: those
/// whose cost is lowest at either end of the depth range, and those that
/// never reproject inside a secondary image.
///
/// Fails fast on an invalid `config`, when `views` is empty, or when a
/// secondary image differs from the reference in size or channel count.
pub fn plane_sweeping(
    image: &Image,
    lens_model: &LensModel<f32>,
    views: &[SecondaryView<'_>],
    config: &PlaneSweepConfig,
) -> Result<PointCloud> {
    config.validate()?;
    check_views(image, views)?;
    let depths = sample_depths(config.depth_range, config.step_size)?;

    let (width, height) = (image.width(), image.height());
    let rays = reference_rays(lens_model, width, height);
    let volume = compute_cost_volume_with_rays(image, &rays, views, config, depths)?;
    let resolved = volume.resolve_depths(config.subpixel_fit);

    let points = rays
        .par_iter()
        .zip(resolved.par_iter())
        .map(|(ray, &depth)| {
            let p = ray * depth;
            [p[0], p[1], p[2]]
        })
        .collect();
    let cloud = PointCloud::new(width, height, points)?;
    debug!(
        "plane sweep: {} of {} pixels resolved",
        cloud.num_valid(),
        width * height
    );
    Ok(cloud)
}
