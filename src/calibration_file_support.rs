// This module requires std.

#[cfg(feature = "serde-serialize")]
use std::io::{Read, Write};

use nalgebra::{RealField, SVector};

use crate::{CameraMatrix, DistortionCoefficients, Error, LensModel, Result};

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "serde-serialize")]
fn zero_coefficient<R: RealField>() -> R {
    nalgebra::zero()
}

/// Persisted calibration of one lens.
///
/// This is the flat record stored alongside the images:
///
/// ```yaml
/// camera_matrix: {fx: 800.0, fy: 800.0, cx: 320.0, cy: 240.0}
/// distortion_coefficients: {k1: -0.2, k2: 0.05}
/// ```
///
/// Every distortion coefficient is optional and defaults to zero, as does
/// the whole `distortion_coefficients` block. Convert to a
/// [`LensModel`](struct.LensModel.html) with
/// [`LensModel::from_record`](struct.LensModel.html#method.from_record) or
/// `try_from`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde-serialize",
    serde(bound(
        serialize = "R: RealField + serde::Serialize",
        deserialize = "R: RealField + serde::Deserialize<'de>"
    ))
)]
pub struct CalibrationRecord<R: RealField> {
    /// The pinhole intrinsics.
    pub camera_matrix: CameraMatrixRecord<R>,
    /// The distortion terms.
    #[cfg_attr(feature = "serde-serialize", serde(default))]
    pub distortion_coefficients: DistortionRecord<R>,
}

/// The `camera_matrix` block of a [`CalibrationRecord`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct CameraMatrixRecord<R: RealField> {
    /// Horizontal focal length.
    pub fx: R,
    /// Vertical focal length.
    pub fy: R,
    /// Horizontal principal point.
    pub cx: R,
    /// Vertical principal point.
    pub cy: R,
}

/// The `distortion_coefficients` block of a [`CalibrationRecord`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
#[allow(missing_docs)]
pub struct DistortionRecord<R: RealField> {
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub k1: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub k2: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub k3: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub k4: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub k5: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub k6: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub p1: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub p2: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub s1: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub s2: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub s3: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub s4: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub tau_x: R,
    #[cfg_attr(feature = "serde-serialize", serde(default = "zero_coefficient"))]
    pub tau_y: R,
}

impl<R: RealField> Default for DistortionRecord<R> {
    fn default() -> Self {
        (&DistortionCoefficients::zero()).into()
    }
}

impl<R: RealField> From<&DistortionCoefficients<R>> for DistortionRecord<R> {
    fn from(d: &DistortionCoefficients<R>) -> Self {
        Self {
            k1: d.k1(),
            k2: d.k2(),
            k3: d.k3(),
            k4: d.k4(),
            k5: d.k5(),
            k6: d.k6(),
            p1: d.p1(),
            p2: d.p2(),
            s1: d.s1(),
            s2: d.s2(),
            s3: d.s3(),
            s4: d.s4(),
            tau_x: d.tau_x(),
            tau_y: d.tau_y(),
        }
    }
}

impl<R: RealField> From<DistortionRecord<R>> for DistortionCoefficients<R> {
    fn from(d: DistortionRecord<R>) -> Self {
        DistortionCoefficients::from_opencv_vec(SVector::<R, 14>::from_column_slice(&[
            d.k1, d.k2, d.p1, d.p2, d.k3, d.k4, d.k5, d.k6, d.s1, d.s2, d.s3, d.s4, d.tau_x,
            d.tau_y,
        ]))
    }
}

impl<R: RealField> From<&LensModel<R>> for CalibrationRecord<R> {
    fn from(lens: &LensModel<R>) -> Self {
        let k = lens.camera_matrix();
        Self {
            camera_matrix: CameraMatrixRecord {
                fx: k.fx(),
                fy: k.fy(),
                cx: k.cx(),
                cy: k.cy(),
            },
            distortion_coefficients: lens.distortion().into(),
        }
    }
}

impl<R: RealField> std::convert::TryFrom<CalibrationRecord<R>> for LensModel<R> {
    type Error = Error;
    fn try_from(record: CalibrationRecord<R>) -> Result<LensModel<R>> {
        let k = record.camera_matrix;
        let camera_matrix = CameraMatrix::new(k.fx, k.fy, k.cx, k.cy)?;
        Ok(LensModel::new(
            camera_matrix,
            record.distortion_coefficients.into(),
        ))
    }
}

impl<R: RealField> LensModel<R> {
    /// The persisted form of this lens.
    pub fn to_record(&self) -> CalibrationRecord<R> {
        self.into()
    }

    /// Rebuild a lens from its persisted form.
    ///
    /// Returns `Err(Error::ZeroFocalLength)` if a focal length is zero.
    pub fn from_record(record: CalibrationRecord<R>) -> Result<Self> {
        std::convert::TryInto::try_into(record)
    }
}

#[cfg(feature = "serde-serialize")]
/// Read a [`LensModel`](struct.LensModel.html) from a YAML calibration record.
///
/// This is a small wrapper around `serde_yaml::from_reader()` and
/// [`LensModel::from_record`](struct.LensModel.html#method.from_record).
pub fn from_calibration_yaml<R, Rd>(reader: Rd) -> Result<LensModel<R>>
where
    R: RealField + serde::de::DeserializeOwned,
    Rd: Read,
{
    let record: CalibrationRecord<R> = serde_yaml::from_reader(reader)?;
    LensModel::from_record(record)
}

#[cfg(feature = "serde-serialize")]
/// Write a [`LensModel`](struct.LensModel.html) as a YAML calibration record.
pub fn to_calibration_yaml<R, W>(writer: W, lens: &LensModel<R>) -> Result<()>
where
    R: RealField + serde::Serialize,
    W: Write,
{
    serde_yaml::to_writer(writer, &lens.to_record())?;
    Ok(())
}
