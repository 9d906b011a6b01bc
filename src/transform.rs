use nalgebra::{
    allocator::Allocator, base::storage::Storage, DefaultAllocator, Dim, Matrix, Matrix3, Matrix4,
    OMatrix, RealField, Rotation3, UnitQuaternion, Vector3, U3,
};

/// A rigid body transform: a rotation followed by a translation.
///
/// Applying the transform to a point `p` gives `R p + t`. The rotation is
/// held as a unit quaternion, which keeps it orthonormal no matter how the
/// transform was built. The default is the identity.
///
/// Composition and application are explicit methods,
/// [`compose`](Self::compose) and [`apply`](Self::apply).
#[derive(Debug, Clone, PartialEq)]
pub struct RigidTransform<R: RealField> {
    rotation: UnitQuaternion<R>,
    translation: Vector3<R>,
}

impl<R: RealField> Default for RigidTransform<R> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<R: RealField> RigidTransform<R> {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Construct from a rotation and a translation.
    pub fn from_parts(rotation: UnitQuaternion<R>, translation: Vector3<R>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from a rotation vector (axis times angle, radians) and a
    /// translation.
    pub fn from_rotation_vector_and_translation(
        rotation_vector: Vector3<R>,
        translation: Vector3<R>,
    ) -> Self {
        Self::from_parts(UnitQuaternion::from_scaled_axis(rotation_vector), translation)
    }

    /// Construct from a 4x4 homogeneous matrix.
    ///
    /// The upper left 3x3 block is projected onto the closest rotation, so a
    /// block that drifted away from orthonormal is repaired here. The last
    /// row is ignored.
    pub fn from_matrix(matrix: &Matrix4<R>) -> Self {
        let block: Matrix3<R> = matrix.fixed_view::<3, 3>(0, 0).into_owned();
        let rotation = Rotation3::from_matrix(&block);
        let translation: Vector3<R> = matrix.fixed_view::<3, 1>(0, 3).into_owned();
        Self::from_parts(UnitQuaternion::from_rotation_matrix(&rotation), translation)
    }

    /// The 4x4 homogeneous matrix.
    pub fn as_matrix(&self) -> Matrix4<R> {
        let mut matrix = Matrix4::identity();
        matrix
            .fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.clone().to_rotation_matrix().matrix());
        matrix
            .fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&self.translation);
        matrix
    }

    /// The rotation.
    #[inline]
    pub fn rotation(&self) -> &UnitQuaternion<R> {
        &self.rotation
    }

    /// The rotation as axis times angle.
    #[inline]
    pub fn rotation_vector(&self) -> Vector3<R> {
        self.rotation.scaled_axis()
    }

    /// The translation.
    #[inline]
    pub fn translation(&self) -> &Vector3<R> {
        &self.translation
    }

    /// The inverse transform, `(R^T, -R^T t)`.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        let translation = -(rotation.clone() * self.translation.clone());
        Self::from_parts(rotation, translation)
    }

    /// The transform that applies `other` first and then `self`.
    ///
    /// `a.compose(&b).as_matrix()` equals `a.as_matrix() * b.as_matrix()`.
    pub fn compose(&self, other: &Self) -> Self {
        let mut rotation = self.rotation.clone() * other.rotation.clone();
        rotation.renormalize_fast();
        let translation = self.rotation.clone() * other.translation.clone() + self.translation.clone();
        Self::from_parts(rotation, translation)
    }

    /// Rotate a single point.
    #[inline]
    pub fn rotate_point(&self, point: &Vector3<R>) -> Vector3<R> {
        self.rotation.clone() * point.clone()
    }

    /// Transform a single point, `R p + t`.
    #[inline]
    pub fn apply_point(&self, point: &Vector3<R>) -> Vector3<R> {
        self.rotate_point(point) + self.translation.clone()
    }

    /// Rotate every row of an `N x 3` point matrix.
    pub fn rotate<NPTS, IN>(&self, points: &Matrix<R, NPTS, U3, IN>) -> OMatrix<R, NPTS, U3>
    where
        NPTS: Dim,
        IN: Storage<R, NPTS, U3>,
        DefaultAllocator: Allocator<NPTS, U3>,
    {
        map_rows(points, |p| self.rotate_point(&p))
    }

    /// Translate every row of an `N x 3` point matrix.
    pub fn translate<NPTS, IN>(&self, points: &Matrix<R, NPTS, U3, IN>) -> OMatrix<R, NPTS, U3>
    where
        NPTS: Dim,
        IN: Storage<R, NPTS, U3>,
        DefaultAllocator: Allocator<NPTS, U3>,
    {
        map_rows(points, |p| p + self.translation.clone())
    }

    /// Transform every row of an `N x 3` point matrix: rotate, then translate.
    pub fn apply<NPTS, IN>(&self, points: &Matrix<R, NPTS, U3, IN>) -> OMatrix<R, NPTS, U3>
    where
        NPTS: Dim,
        IN: Storage<R, NPTS, U3>,
        DefaultAllocator: Allocator<NPTS, U3>,
    {
        map_rows(points, |p| self.apply_point(&p))
    }
}

fn map_rows<R, NPTS, IN, F>(points: &Matrix<R, NPTS, U3, IN>, f: F) -> OMatrix<R, NPTS, U3>
where
    R: RealField,
    NPTS: Dim,
    IN: Storage<R, NPTS, U3>,
    DefaultAllocator: Allocator<NPTS, U3>,
    F: Fn(Vector3<R>) -> Vector3<R>,
{
    let mut result =
        OMatrix::zeros_generic(NPTS::from_usize(points.nrows()), U3::from_usize(3));
    for i in 0..points.nrows() {
        let p = Vector3::new(
            points[(i, 0)].clone(),
            points[(i, 1)].clone(),
            points[(i, 2)].clone(),
        );
        let q = f(p);
        result[(i, 0)] = q[0].clone();
        result[(i, 1)] = q[1].clone();
        result[(i, 2)] = q[2].clone();
    }
    result
}
