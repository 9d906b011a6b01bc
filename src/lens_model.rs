use nalgebra::{
    allocator::Allocator,
    base::storage::{Owned, Storage},
    convert, one, zero, DefaultAllocator, Dim, Matrix3, OMatrix, RealField, SVector, Vector3, U1,
    U2, U3,
};

use cam_geom::{
    coordinate_system::CameraFrame, ray_bundle_types::SharedOriginRayBundle, Bundle,
    IntrinsicParameters, Pixels, Points, RayBundle,
};

use crate::{Error, Result};

/// Number of fixed-point iterations used by [`LensModel::undistort`].
pub const DEFAULT_UNDISTORT_ITERATIONS: usize = 10;

/// Pinhole intrinsics: focal lengths and principal point, in pixels.
///
/// Both focal lengths are guaranteed to be non-zero, so normalization never
/// divides by zero.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraMatrix<R: RealField> {
    fx: R,
    fy: R,
    cx: R,
    cy: R,
}

impl<R: RealField> CameraMatrix<R> {
    /// Construct a camera matrix from its four parameters.
    ///
    /// Returns `Err(Error::ZeroFocalLength)` if `fx` or `fy` is zero.
    pub fn new(fx: R, fy: R, cx: R, cy: R) -> Result<Self> {
        if fx == zero() || fy == zero() {
            return Err(Error::ZeroFocalLength);
        }
        Ok(Self { fx, fy, cx, cy })
    }

    /// Horizontal focal length.
    #[inline]
    pub fn fx(&self) -> R {
        self.fx.clone()
    }

    /// Vertical focal length.
    #[inline]
    pub fn fy(&self) -> R {
        self.fy.clone()
    }

    /// Horizontal coordinate of the principal point.
    #[inline]
    pub fn cx(&self) -> R {
        self.cx.clone()
    }

    /// Vertical coordinate of the principal point.
    #[inline]
    pub fn cy(&self) -> R {
        self.cy.clone()
    }

    /// The 3x3 matrix `K`.
    pub fn as_matrix(&self) -> Matrix3<R> {
        Matrix3::new(
            self.fx(),
            zero(),
            self.cx(),
            zero(),
            self.fy(),
            self.cy(),
            zero(),
            zero(),
            one(),
        )
    }
}

/// The full OpenCV distortion model.
///
/// Holds six radial terms `k1..k6` (a rational function of the squared
/// radius), two tangential terms `p1, p2`, four thin prism terms `s1..s4` and
/// the two sensor tilt angles `tau_x, tau_y`. Every term defaults to zero, in
/// which case the model is the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct DistortionCoefficients<R: RealField>(SVector<R, 14>);

impl<R: RealField> Default for DistortionCoefficients<R> {
    fn default() -> Self {
        Self::zero()
    }
}

impl<R: RealField> DistortionCoefficients<R> {
    /// Construct a zero distortion model.
    #[inline]
    pub fn zero() -> Self {
        DistortionCoefficients(SVector::<R, 14>::zeros())
    }

    /// Build from a vector in OpenCV order
    /// `[k1, k2, p1, p2, k3, k4, k5, k6, s1, s2, s3, s4, tau_x, tau_y]`.
    #[inline]
    pub fn from_opencv_vec(v: SVector<R, 14>) -> Self {
        DistortionCoefficients(v)
    }

    /// OpenCV ordered vector of distortion terms.
    ///
    /// The order is `[k1, k2, p1, p2, k3, k4, k5, k6, s1, s2, s3, s4, tau_x, tau_y]`.
    #[inline]
    pub fn opencv_vec(&self) -> &SVector<R, 14> {
        &self.0
    }

    /// Replace the six radial terms.
    #[must_use]
    pub fn with_radial(mut self, k1: R, k2: R, k3: R, k4: R, k5: R, k6: R) -> Self {
        self.0[0] = k1;
        self.0[1] = k2;
        self.0[4] = k3;
        self.0[5] = k4;
        self.0[6] = k5;
        self.0[7] = k6;
        self
    }

    /// Replace the two tangential terms.
    #[must_use]
    pub fn with_tangential(mut self, p1: R, p2: R) -> Self {
        self.0[2] = p1;
        self.0[3] = p2;
        self
    }

    /// Replace the four thin prism terms.
    #[must_use]
    pub fn with_prism(mut self, s1: R, s2: R, s3: R, s4: R) -> Self {
        self.0[8] = s1;
        self.0[9] = s2;
        self.0[10] = s3;
        self.0[11] = s4;
        self
    }

    /// Replace the two tilt angles (radians).
    #[must_use]
    pub fn with_tilt(mut self, tau_x: R, tau_y: R) -> Self {
        self.0[12] = tau_x;
        self.0[13] = tau_y;
        self
    }

    /// First radial term.
    #[inline]
    pub fn k1(&self) -> R {
        self.0[0].clone()
    }

    /// Second radial term.
    #[inline]
    pub fn k2(&self) -> R {
        self.0[1].clone()
    }

    /// First tangential term.
    #[inline]
    pub fn p1(&self) -> R {
        self.0[2].clone()
    }

    /// Second tangential term.
    #[inline]
    pub fn p2(&self) -> R {
        self.0[3].clone()
    }

    /// Third radial term.
    #[inline]
    pub fn k3(&self) -> R {
        self.0[4].clone()
    }

    /// Fourth radial term (first term of the denominator).
    #[inline]
    pub fn k4(&self) -> R {
        self.0[5].clone()
    }

    /// Fifth radial term.
    #[inline]
    pub fn k5(&self) -> R {
        self.0[6].clone()
    }

    /// Sixth radial term.
    #[inline]
    pub fn k6(&self) -> R {
        self.0[7].clone()
    }

    /// First thin prism term.
    #[inline]
    pub fn s1(&self) -> R {
        self.0[8].clone()
    }

    /// Second thin prism term.
    #[inline]
    pub fn s2(&self) -> R {
        self.0[9].clone()
    }

    /// Third thin prism term.
    #[inline]
    pub fn s3(&self) -> R {
        self.0[10].clone()
    }

    /// Fourth thin prism term.
    #[inline]
    pub fn s4(&self) -> R {
        self.0[11].clone()
    }

    /// Sensor tilt around the x axis.
    #[inline]
    pub fn tau_x(&self) -> R {
        self.0[12].clone()
    }

    /// Sensor tilt around the y axis.
    #[inline]
    pub fn tau_y(&self) -> R {
        self.0[13].clone()
    }

    /// Return `true` if there is approximately zero distortion, else `false`.
    pub fn is_linear(&self) -> bool {
        let v = &self.0;
        let sum_squared = v.dot(v);
        sum_squared < convert(1e-16)
    }

    /// The projective tilt matrix for `tau_x` and `tau_y`.
    ///
    /// Both angles zero gives the identity.
    pub fn tilt_matrix(&self) -> Matrix3<R> {
        let (s_x, c_x) = self.tau_x().sin_cos();
        let (s_y, c_y) = self.tau_y().sin_cos();

        let rot_x = Matrix3::new(
            one(),
            zero(),
            zero(),
            zero(),
            c_x.clone(),
            s_x.clone(),
            zero(),
            -s_x,
            c_x,
        );
        let rot_y = Matrix3::new(
            c_y.clone(),
            zero(),
            -s_y.clone(),
            zero(),
            one(),
            zero(),
            s_y,
            zero(),
            c_y,
        );
        let rot_xy = rot_y * rot_x;
        let proj_z = Matrix3::new(
            rot_xy[(2, 2)].clone(),
            zero(),
            -rot_xy[(0, 2)].clone(),
            zero(),
            rot_xy[(2, 2)].clone(),
            -rot_xy[(1, 2)].clone(),
            zero(),
            zero(),
            one(),
        );
        proj_z * rot_xy
    }
}

/// Normalized camera coordinates, one point per row.
///
/// These are pixel coordinates with the camera matrix removed: the `x` and
/// `y` of a ray whose `z` is 1. Whether they are distorted depends on where
/// they came from.
///
/// This is a newtype wrapping an `nalgebra::Matrix`.
pub struct NormalizedPixels<R: RealField, NPTS: Dim, STORAGE> {
    /// The normalized coordinates.
    pub data: nalgebra::Matrix<R, NPTS, U2, STORAGE>,
}

impl<R: RealField, NPTS: Dim, STORAGE> NormalizedPixels<R, NPTS, STORAGE> {
    /// Wrap a matrix of normalized coordinates.
    #[inline]
    pub fn new(data: nalgebra::Matrix<R, NPTS, U2, STORAGE>) -> Self {
        Self { data }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Cache<R: RealField> {
    tilt: Matrix3<R>,
}

/// A camera lens: pinhole intrinsics plus the OpenCV distortion model.
///
/// Converts pixels to and from normalized camera coordinates and applies or
/// removes lens distortion on normalized coordinates. It is an immutable
/// value; build a new one to change parameters.
///
/// `LensModel` implements the
/// [`IntrinsicParameters`](https://docs.rs/cam-geom/latest/cam_geom/trait.IntrinsicParameters.html)
/// trait, so it can be combined with `cam_geom::Camera`.
#[derive(Debug, Clone, PartialEq)]
pub struct LensModel<R: RealField> {
    camera_matrix: CameraMatrix<R>,
    distortion: DistortionCoefficients<R>,
    cache: Cache<R>,
}

impl<R: RealField> LensModel<R> {
    /// Construct a lens model from its intrinsics and distortion.
    pub fn new(camera_matrix: CameraMatrix<R>, distortion: DistortionCoefficients<R>) -> Self {
        let cache = Cache {
            tilt: distortion.tilt_matrix(),
        };
        Self {
            camera_matrix,
            distortion,
            cache,
        }
    }

    /// Construct a distortion free lens model from individual parameters.
    ///
    /// Returns `Err(Error::ZeroFocalLength)` if `fx` or `fy` is zero.
    #[inline]
    pub fn from_params(fx: R, fy: R, cx: R, cy: R) -> Result<Self> {
        Ok(Self::new(
            CameraMatrix::new(fx, fy, cx, cy)?,
            DistortionCoefficients::zero(),
        ))
    }

    /// The pinhole intrinsics.
    #[inline]
    pub fn camera_matrix(&self) -> &CameraMatrix<R> {
        &self.camera_matrix
    }

    /// The distortion terms.
    #[inline]
    pub fn distortion(&self) -> &DistortionCoefficients<R> {
        &self.distortion
    }

    /// Pixel coordinate to normalized coordinate.
    #[inline]
    pub fn normalize_point(&self, u: R, v: R) -> (R, R) {
        let k = &self.camera_matrix;
        ((u - k.cx()) / k.fx(), (v - k.cy()) / k.fy())
    }

    /// Normalized coordinate to pixel coordinate.
    #[inline]
    pub fn denormalize_point(&self, x: R, y: R) -> (R, R) {
        let k = &self.camera_matrix;
        (x * k.fx() + k.cx(), y * k.fy() + k.cy())
    }

    /// Apply the forward distortion model to one normalized coordinate.
    #[allow(clippy::many_single_char_names)]
    pub fn distort_point(&self, x: R, y: R) -> (R, R) {
        let d = &self.distortion;
        let one: R = one();
        let two: R = convert(2.0);

        let r2 = x.clone() * x.clone() + y.clone() * y.clone();
        let r4 = r2.clone() * r2.clone();
        let r6 = r4.clone() * r2.clone();
        let a1 = two.clone() * x.clone() * y.clone();
        let a2 = r2.clone() + two.clone() * x.clone() * x.clone();
        let a3 = r2.clone() + two * y.clone() * y.clone();

        let radial = (one.clone() + d.k1() * r2.clone() + d.k2() * r4.clone() + d.k3() * r6.clone())
            / (one.clone() + d.k4() * r2.clone() + d.k5() * r4.clone() + d.k6() * r6);

        let xd = x * radial.clone()
            + d.p1() * a1.clone()
            + d.p2() * a2
            + d.s1() * r2.clone()
            + d.s2() * r4.clone();
        let yd = y * radial + d.p1() * a3 + d.p2() * a1 + d.s3() * r2 + d.s4() * r4;

        let tilted = self.cache.tilt.clone() * Vector3::new(xd, yd, one);
        (
            tilted[0].clone() / tilted[2].clone(),
            tilted[1].clone() / tilted[2].clone(),
        )
    }

    /// Remove distortion from one normalized coordinate.
    ///
    /// Runs exactly `iterations` additive fixed-point corrections starting
    /// from the distorted coordinate. There is no convergence test.
    pub fn undistort_point(&self, xd: R, yd: R, iterations: usize) -> (R, R) {
        let mut x = xd.clone();
        let mut y = yd.clone();
        for _ in 0..iterations {
            let (x_est, y_est) = self.distort_point(x.clone(), y.clone());
            x += xd.clone() - x_est;
            y += yd.clone() - y_est;
        }
        (x, y)
    }

    /// Convert pixel coordinates to normalized coordinates.
    pub fn normalize<NPTS, IN>(
        &self,
        pixels: &Pixels<R, NPTS, IN>,
    ) -> NormalizedPixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        NPTS: Dim,
        IN: Storage<R, NPTS, U2>,
        DefaultAllocator: Allocator<NPTS, U2>,
    {
        let mut result = NormalizedPixels::new(OMatrix::zeros_generic(
            NPTS::from_usize(pixels.data.nrows()),
            U2::from_usize(2),
        ));
        for i in 0..pixels.data.nrows() {
            let (x, y) =
                self.normalize_point(pixels.data[(i, 0)].clone(), pixels.data[(i, 1)].clone());
            result.data[(i, 0)] = x;
            result.data[(i, 1)] = y;
        }
        result
    }

    /// Convert normalized coordinates to pixel coordinates.
    pub fn denormalize<NPTS, IN>(
        &self,
        normalized: &NormalizedPixels<R, NPTS, IN>,
    ) -> Pixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        NPTS: Dim,
        IN: Storage<R, NPTS, U2>,
        DefaultAllocator: Allocator<NPTS, U2>,
    {
        let mut result = Pixels::new(OMatrix::zeros_generic(
            NPTS::from_usize(normalized.data.nrows()),
            U2::from_usize(2),
        ));
        for i in 0..normalized.data.nrows() {
            let (u, v) = self.denormalize_point(
                normalized.data[(i, 0)].clone(),
                normalized.data[(i, 1)].clone(),
            );
            result.data[(i, 0)] = u;
            result.data[(i, 1)] = v;
        }
        result
    }

    /// Convert undistorted normalized coordinates to distorted ones.
    ///
    /// This models the action of the real lens on ideal rays.
    pub fn distort<NPTS, IN>(
        &self,
        undistorted: &NormalizedPixels<R, NPTS, IN>,
    ) -> NormalizedPixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        NPTS: Dim,
        IN: Storage<R, NPTS, U2>,
        DefaultAllocator: Allocator<NPTS, U2>,
    {
        let mut result = NormalizedPixels::new(OMatrix::zeros_generic(
            NPTS::from_usize(undistorted.data.nrows()),
            U2::from_usize(2),
        ));
        for i in 0..undistorted.data.nrows() {
            let (x, y) = self.distort_point(
                undistorted.data[(i, 0)].clone(),
                undistorted.data[(i, 1)].clone(),
            );
            result.data[(i, 0)] = x;
            result.data[(i, 1)] = y;
        }
        result
    }

    /// Convert distorted normalized coordinates to undistorted ones.
    ///
    /// This method calls [undistort_ext](Self::undistort_ext) with
    /// [`DEFAULT_UNDISTORT_ITERATIONS`].
    pub fn undistort<NPTS, IN>(
        &self,
        distorted: &NormalizedPixels<R, NPTS, IN>,
    ) -> NormalizedPixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        NPTS: Dim,
        IN: Storage<R, NPTS, U2>,
        DefaultAllocator: Allocator<NPTS, U2>,
    {
        self.undistort_ext(distorted, None)
    }

    /// Convert distorted normalized coordinates to undistorted ones.
    ///
    /// Each coordinate is refined by a fixed number of additive corrections,
    /// `x += distorted - distort(x)`. If `iterations` is not specified,
    /// [`DEFAULT_UNDISTORT_ITERATIONS`] is used. The result is only an
    /// approximate inverse of [distort](Self::distort), and less so for
    /// strong distortion.
    pub fn undistort_ext<NPTS, IN>(
        &self,
        distorted: &NormalizedPixels<R, NPTS, IN>,
        iterations: impl Into<Option<usize>>,
    ) -> NormalizedPixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        NPTS: Dim,
        IN: Storage<R, NPTS, U2>,
        DefaultAllocator: Allocator<NPTS, U2>,
    {
        let iterations = iterations
            .into()
            .unwrap_or(DEFAULT_UNDISTORT_ITERATIONS);
        let mut result = NormalizedPixels::new(OMatrix::zeros_generic(
            NPTS::from_usize(distorted.data.nrows()),
            U2::from_usize(2),
        ));
        for i in 0..distorted.data.nrows() {
            let (x, y) = self.undistort_point(
                distorted.data[(i, 0)].clone(),
                distorted.data[(i, 1)].clone(),
                iterations,
            );
            result.data[(i, 0)] = x;
            result.data[(i, 1)] = y;
        }
        result
    }
}

impl<R: RealField> IntrinsicParameters<R> for LensModel<R> {
    type BundleType = SharedOriginRayBundle<R>;

    fn pixel_to_camera<IN, NPTS>(
        &self,
        pixels: &Pixels<R, NPTS, IN>,
    ) -> RayBundle<CameraFrame, Self::BundleType, R, NPTS, Owned<R, NPTS, U3>>
    where
        Self::BundleType: Bundle<R>,
        IN: Storage<R, NPTS, U2>,
        NPTS: Dim,
        DefaultAllocator: Allocator<NPTS, U2>,
        DefaultAllocator: Allocator<NPTS, U3>,
        DefaultAllocator: Allocator<U1, U2>,
    {
        let mut result = RayBundle::new_shared_zero_origin(OMatrix::zeros_generic(
            NPTS::from_usize(pixels.data.nrows()),
            U3::from_usize(3),
        ));

        for i in 0..pixels.data.nrows() {
            let (xd, yd) =
                self.normalize_point(pixels.data[(i, 0)].clone(), pixels.data[(i, 1)].clone());
            let (x, y) = self.undistort_point(xd, yd, DEFAULT_UNDISTORT_ITERATIONS);
            result.data[(i, 0)] = x;
            result.data[(i, 1)] = y;
            result.data[(i, 2)] = one();
        }
        result
    }

    fn camera_to_pixel<IN, NPTS>(
        &self,
        camera: &Points<CameraFrame, R, NPTS, IN>,
    ) -> Pixels<R, NPTS, Owned<R, NPTS, U2>>
    where
        IN: Storage<R, NPTS, U3>,
        NPTS: Dim,
        DefaultAllocator: Allocator<NPTS, U2>,
    {
        let mut result = Pixels::new(OMatrix::zeros_generic(
            NPTS::from_usize(camera.data.nrows()),
            U2::from_usize(2),
        ));

        for i in 0..camera.data.nrows() {
            let z = camera.data[(i, 2)].clone();
            let x = camera.data[(i, 0)].clone() / z.clone();
            let y = camera.data[(i, 1)].clone() / z;
            let (xd, yd) = self.distort_point(x, y);
            let (u, v) = self.denormalize_point(xd, yd);
            result.data[(i, 0)] = u;
            result.data[(i, 1)] = v;
        }
        result
    }
}
