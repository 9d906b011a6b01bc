use nalgebra::{
    allocator::Allocator,
    base::storage::{Owned, Storage},
    DefaultAllocator, Dim, RealField, Vector3, U2, U3,
};

use cam_geom::{coordinate_system::CameraFrame, IntrinsicParameters, Pixels, Points, WorldFrame};

use crate::{LensModel, RigidTransform};

/// Project 3D points into a camera.
///
/// `world_to_camera` maps the points into the camera frame. Each point is
/// then divided by its depth, distorted by `lens_model` and mapped to pixels.
/// Points at or behind the camera (`z <= 0`) give meaningless pixels; they
/// are not flagged.
pub fn project_points<R, NPTS, IN>(
    points: &Points<WorldFrame, R, NPTS, IN>,
    lens_model: &LensModel<R>,
    world_to_camera: &RigidTransform<R>,
) -> Pixels<R, NPTS, Owned<R, NPTS, U2>>
where
    R: RealField,
    NPTS: Dim,
    IN: Storage<R, NPTS, U3>,
    DefaultAllocator: Allocator<NPTS, U3>,
    DefaultAllocator: Allocator<NPTS, U2>,
{
    let camera: Points<CameraFrame, R, NPTS, Owned<R, NPTS, U3>> =
        Points::new(world_to_camera.apply(&points.data));
    lens_model.camera_to_pixel(&camera)
}

/// Project a single point. See [`project_points`].
#[inline]
pub fn project_point<R: RealField>(
    point: &Vector3<R>,
    lens_model: &LensModel<R>,
    world_to_camera: &RigidTransform<R>,
) -> (R, R) {
    let p = world_to_camera.apply_point(point);
    let x = p[0].clone() / p[2].clone();
    let y = p[1].clone() / p[2].clone();
    let (xd, yd) = lens_model.distort_point(x, y);
    lens_model.denormalize_point(xd, yd)
}
