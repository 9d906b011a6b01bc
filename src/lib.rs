//! Multi-view depth estimation with OpenCV compatible lens models
//!
//! # About
//!
//! This crate estimates dense depth for a reference camera from one or more
//! secondary cameras with known poses. It is in pure Rust and the geometric
//! core can be compiled in `no_std` mode.
//!
//! In greater detail:
//!
//! - [`LensModel`](struct.LensModel.html) is a pinhole camera with the full
//!   14 coefficient OpenCV distortion model (rational radial, tangential,
//!   thin prism and tilted sensor). It implements
//!   [the `IntrinsicParameters` trait from the `cam-geom`
//!   crate](https://docs.rs/cam-geom/latest/cam_geom/trait.IntrinsicParameters.html).
//! - [`RigidTransform`](struct.RigidTransform.html) moves points between
//!   camera frames.
//! - [`project_points`](fn.project_points.html) maps world points to pixels
//!   and [`triangulate_points`](fn.triangulate_points.html) maps pairs of
//!   rays back to 3D.
//! - [`plane_sweeping`](fn.plane_sweeping.html) builds a cost volume over a
//!   range of fronto-parallel planes, picks the best depth per pixel and
//!   returns a [`PointCloud`](struct.PointCloud.html). This requires `std`.
//! - When compiled with the `serde-serialize` feature, lens calibrations can
//!   be read and written as YAML with
//!   [`from_calibration_yaml`](fn.from_calibration_yaml.html) and
//!   [`to_calibration_yaml`](fn.to_calibration_yaml.html).
//!
//! # Example - project a point into two cameras and triangulate it back.
//!
//! ```
//! use nalgebra::{UnitQuaternion, Vector3};
//! use plane_sweep_mvs::{project_point, triangulate_point, LensModel, RigidTransform};
//!
//! let lens = LensModel::<f64>::from_params(500.0, 500.0, 320.0, 240.0).unwrap();
//!
//! // Camera 1 sits 20 cm to the right of camera 0.
//! let camera_1_to_camera_0 =
//!     RigidTransform::from_parts(UnitQuaternion::identity(), Vector3::new(0.2, 0.0, 0.0));
//!
//! let point = Vector3::new(0.1, -0.05, 2.0);
//! let (u0, v0) = project_point(&point, &lens, &RigidTransform::identity());
//! let (u1, v1) = project_point(&point, &lens, &camera_1_to_camera_0.inverse());
//!
//! let (x0, y0) = lens.normalize_point(u0, v0);
//! let (x1, y1) = lens.normalize_point(u1, v1);
//! let recovered = triangulate_point(x0, y0, x1, y1, &camera_1_to_camera_0);
//! assert!((recovered - point).norm() < 1e-9);
//! ```
//!
//! # testing
//!
//! Test `no_std` compilation with:
//!
//! ```text
//! # install target with: "rustup target add thumbv7em-none-eabihf"
//! cargo check --no-default-features --target thumbv7em-none-eabihf
//! ```
//!
//! Run unit tests with:
//!
//! ```text
//! cargo test
//! cargo test --features serde-serialize
//! ```
//!
//! serde support requires std.

#![deny(rust_2018_idioms, unsafe_code, missing_docs)]
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate core as std;

mod lens_model;
pub use lens_model::{
    CameraMatrix, DistortionCoefficients, LensModel, NormalizedPixels,
    DEFAULT_UNDISTORT_ITERATIONS,
};

mod transform;
pub use transform::RigidTransform;

mod projection;
pub use projection::{project_point, project_points};

mod triangulation;
pub use triangulation::{triangulate_point, triangulate_points};
#[cfg(feature = "std")]
pub use triangulation::triangulate_disparity;

mod subvalue;
pub use subvalue::{find_subvalue_poly2, poly2_vertex};

#[cfg(feature = "std")]
mod image;
#[cfg(feature = "std")]
pub use image::{Image, PointCloud};

#[cfg(feature = "std")]
mod filter;
#[cfg(feature = "std")]
pub use filter::{box_filter, box_kernel_1d};

#[cfg(feature = "std")]
mod warp;
#[cfg(feature = "std")]
pub use warp::{remap_bilinear, sample_bilinear};

#[cfg(feature = "std")]
mod plane_sweep;
#[cfg(feature = "std")]
pub use plane_sweep::{
    compute_cost_volume, plane_sweeping, reference_rays, reproject_image_at_depth,
    sample_depths, CostFunction, CostVolume, PlaneSweepConfig, SecondaryView,
};

#[cfg(feature = "std")]
mod calibration_file_support;
#[cfg(feature = "std")]
pub use calibration_file_support::{CalibrationRecord, CameraMatrixRecord, DistortionRecord};

#[cfg(feature = "serde-serialize")]
pub use calibration_file_support::{from_calibration_yaml, to_calibration_yaml};

/// Possible errors.
#[derive(Debug)]
#[cfg_attr(feature = "std", derive(thiserror::Error))]
#[non_exhaustive]
pub enum Error {
    #[cfg_attr(feature = "std", error("invalid input"))]
    /// invalid input
    InvalidInput,
    #[cfg_attr(feature = "std", error("error parsing YAML"))]
    /// error parsing YAML
    YamlParseError,
    #[cfg_attr(feature = "std", error("focal length is zero"))]
    /// focal length is zero
    ZeroFocalLength,
    #[cfg_attr(feature = "std", error("step size must be positive, got {0}"))]
    /// step size is not positive and finite
    InvalidStepSize(f32),
    #[cfg_attr(feature = "std", error("invalid depth range [{0}, {1}]"))]
    /// depth range is not `0 < min <= max`
    InvalidDepthRange(f32, f32),
    #[cfg_attr(feature = "std", error("invalid block size {0}x{1}"))]
    /// block size has a zero dimension
    InvalidBlockSize(usize, usize),
    #[cfg_attr(feature = "std", error("at least one secondary view is required"))]
    /// no secondary view given
    NoSecondaryViews,
    #[cfg_attr(
        feature = "std",
        error("image size mismatch: expected {expected:?}, got {actual:?}")
    )]
    /// image sizes differ
    ImageSizeMismatch {
        /// `(width, height)` of the reference
        expected: (usize, usize),
        /// `(width, height)` found
        actual: (usize, usize),
    },
    #[cfg_attr(
        feature = "std",
        error("channel mismatch: expected {expected}, got {actual}")
    )]
    /// channel counts differ
    ChannelMismatch {
        /// expected number of channels
        expected: usize,
        /// number of channels found
        actual: usize,
    },
    #[cfg_attr(
        feature = "std",
        error("buffer size mismatch: expected {expected}, got {actual}")
    )]
    /// buffer has the wrong length
    BufferSizeMismatch {
        /// expected length
        expected: usize,
        /// length found
        actual: usize,
    },
    #[cfg(feature = "std")]
    #[cfg_attr(feature = "std", error("unknown cost function: {0}"))]
    /// unknown cost function name
    UnknownCostFunction(String),
}

#[cfg(feature = "serde-serialize")]
impl std::convert::From<serde_yaml::Error> for Error {
    #[inline]
    fn from(_orig: serde_yaml::Error) -> Self {
        Error::YamlParseError
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
