use nalgebra::{
    allocator::Allocator,
    base::storage::{Owned, Storage},
    one, DefaultAllocator, Dim, OMatrix, RealField, Vector3, U3,
};

use cam_geom::{coordinate_system::CameraFrame, Points};

use crate::{Error, NormalizedPixels, Result, RigidTransform};

#[cfg(feature = "std")]
use crate::{Image, LensModel, PointCloud, DEFAULT_UNDISTORT_ITERATIONS};

/// Intersect two rays in the least squares sense.
///
/// `(x0, y0)` and `(x1, y1)` are undistorted normalized coordinates in
/// camera 0 and camera 1. `camera_1_to_camera_0` maps camera 1 coordinates
/// into camera 0, so its translation is the center of camera 1 seen from
/// camera 0.
///
/// The result lies on the ray of camera 0, at the parameter closest to the
/// ray of camera 1. Parallel rays divide by (near) zero and give
/// non-finite coordinates.
pub fn triangulate_point<R: RealField>(
    x0: R,
    y0: R,
    x1: R,
    y1: R,
    camera_1_to_camera_0: &RigidTransform<R>,
) -> Vector3<R> {
    let v0 = Vector3::new(x0, y0, one());
    let v1 = camera_1_to_camera_0.rotate_point(&Vector3::new(x1, y1, one()));
    let p = -camera_1_to_camera_0.translation().clone();

    let a = v0.dot(&v0);
    let b = v0.dot(&v1);
    let c = v1.dot(&v1);
    let d = v0.dot(&p);
    let e = v1.dot(&p);

    let t = (b.clone() * e - c.clone() * d) / (a * c - b.clone() * b);
    v0 * t
}

/// Triangulate corresponding rays of two cameras.
///
/// Row `i` of `rays_0` and row `i` of `rays_1` are the undistorted
/// normalized coordinates of the same scene point. The points are returned
/// in the frame of camera 0. See [`triangulate_point`] for the geometry.
///
/// Returns `Err(Error::BufferSizeMismatch)` if the row counts differ.
pub fn triangulate_points<R, NPTS, IN0, IN1>(
    rays_0: &NormalizedPixels<R, NPTS, IN0>,
    rays_1: &NormalizedPixels<R, NPTS, IN1>,
    camera_1_to_camera_0: &RigidTransform<R>,
) -> Result<Points<CameraFrame, R, NPTS, Owned<R, NPTS, U3>>>
where
    R: RealField,
    NPTS: Dim,
    IN0: Storage<R, NPTS, nalgebra::U2>,
    IN1: Storage<R, NPTS, nalgebra::U2>,
    DefaultAllocator: Allocator<NPTS, U3>,
{
    let n = rays_0.data.nrows();
    if rays_1.data.nrows() != n {
        return Err(Error::BufferSizeMismatch {
            expected: n,
            actual: rays_1.data.nrows(),
        });
    }

    let mut result = OMatrix::zeros_generic(NPTS::from_usize(n), U3::from_usize(3));
    for i in 0..n {
        let point = triangulate_point(
            rays_0.data[(i, 0)].clone(),
            rays_0.data[(i, 1)].clone(),
            rays_1.data[(i, 0)].clone(),
            rays_1.data[(i, 1)].clone(),
            camera_1_to_camera_0,
        );
        result[(i, 0)] = point[0].clone();
        result[(i, 1)] = point[1].clone();
        result[(i, 2)] = point[2].clone();
    }
    Ok(Points::new(result))
}

/// Triangulate a dense horizontal disparity map.
///
/// Pixel `(x, y)` of camera 0 is matched with pixel `(x - disparity, y)` of
/// camera 1. Both are undistorted before triangulation. NaN disparities give
/// NaN points.
///
/// Returns `Err(Error::ChannelMismatch)` unless `disparity` has exactly one
/// channel.
#[cfg(feature = "std")]
pub fn triangulate_disparity(
    disparity: &Image,
    lens_model_0: &LensModel<f32>,
    lens_model_1: &LensModel<f32>,
    camera_1_to_camera_0: &RigidTransform<f32>,
) -> Result<PointCloud> {
    use rayon::prelude::*;

    if disparity.num_channels() != 1 {
        return Err(Error::ChannelMismatch {
            expected: 1,
            actual: disparity.num_channels(),
        });
    }

    let (width, height) = (disparity.width(), disparity.height());
    let mut points = vec![[0.0f32; 3]; width * height];
    if points.is_empty() {
        return PointCloud::new(width, height, points);
    }

    points
        .par_chunks_exact_mut(width)
        .zip(disparity.as_slice().par_chunks_exact(width))
        .enumerate()
        .for_each(|(y, (points_row, disparity_row))| {
            for (x, (point, d)) in points_row.iter_mut().zip(disparity_row).enumerate() {
                let (u, v) = (x as f32, y as f32);
                let (x0, y0) = {
                    let (xd, yd) = lens_model_0.normalize_point(u, v);
                    lens_model_0.undistort_point(xd, yd, DEFAULT_UNDISTORT_ITERATIONS)
                };
                let (x1, y1) = {
                    let (xd, yd) = lens_model_1.normalize_point(u - d, v);
                    lens_model_1.undistort_point(xd, yd, DEFAULT_UNDISTORT_ITERATIONS)
                };
                let p = triangulate_point(x0, y0, x1, y1, camera_1_to_camera_0);
                *point = [p[0], p[1], p[2]];
            }
        });

    PointCloud::new(width, height, points)
}
