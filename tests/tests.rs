use approx::assert_relative_eq;
use nalgebra::{Dyn, OMatrix, UnitQuaternion, Vector3, U2, U3};

use cam_geom::{IntrinsicParameters, Pixels, Points};
use plane_sweep_mvs::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn offset(x: f32, y: f32, z: f32) -> RigidTransform<f32> {
    RigidTransform::from_parts(UnitQuaternion::identity(), Vector3::new(x, y, z))
}

mod sweep {
    use super::*;

    const WIDTH: usize = 64;
    const HEIGHT: usize = 48;
    const FOCAL: f32 = 100.0;
    const BASELINE: f32 = 0.2;
    const TRUE_DEPTH: f32 = 2.03;

    fn texture(u: f32, v: f32) -> f32 {
        (0.31 * u).sin()
            + (0.67 * u + 0.2 * v).sin()
            + (0.23 * v + 0.11 * u).cos()
            + 0.5 * (0.83 * u + 0.05 * v).sin()
    }

    fn lens() -> LensModel<f32> {
        LensModel::from_params(FOCAL, FOCAL, 31.5, 23.5).unwrap()
    }

    /// A fronto-parallel textured plane at `TRUE_DEPTH` seen by a camera
    /// displaced by `baseline` along x.
    fn view_of_plane(baseline: f32) -> Image {
        let shift = FOCAL * baseline / TRUE_DEPTH;
        Image::from_fn(WIDTH, HEIGHT, 1, |u, v| {
            vec![texture(u as f32 + shift, v as f32)]
        })
        .unwrap()
    }

    fn config() -> PlaneSweepConfig {
        PlaneSweepConfig {
            block_size: (5, 5),
            cost_function: CostFunction::SumOfSquaredDifference,
            ..PlaneSweepConfig::new([1.5, 2.5], 0.1)
        }
    }

    fn view<'a>(
        image: &'a Image,
        lens_model: &'a LensModel<f32>,
        secondary_to_reference: &'a RigidTransform<f32>,
    ) -> SecondaryView<'a> {
        SecondaryView {
            image,
            lens_model,
            secondary_to_reference,
        }
    }

    fn rms(errors: &[f32]) -> f32 {
        (errors.iter().map(|e| e * e).sum::<f32>() / errors.len() as f32).sqrt()
    }

    #[test]
    fn recovers_plane_depth() {
        init_logging();
        let lens = lens();
        let reference = view_of_plane(0.0);
        let secondary = view_of_plane(BASELINE);
        let secondary_to_reference = offset(BASELINE, 0.0, 0.0);
        let views = [SecondaryView {
            image: &secondary,
            lens_model: &lens,
            secondary_to_reference: &secondary_to_reference,
        }];

        let coarse_config = PlaneSweepConfig {
            subpixel_fit: false,
            ..config()
        };
        let coarse = plane_sweeping(&reference, &lens, &views, &coarse_config).unwrap();
        let refined = plane_sweeping(&reference, &lens, &views, &config()).unwrap();
        assert_eq!(refined.width(), WIDTH);
        assert_eq!(refined.height(), HEIGHT);

        let mut coarse_errors = Vec::new();
        let mut refined_errors = Vec::new();
        for v in 5..HEIGHT - 5 {
            for u in 25..WIDTH - 5 {
                let c = coarse.get(u, v);
                assert_relative_eq!(c[2], 2.0, epsilon = 1e-4);
                let p = refined.get(u, v);
                assert!((p[2] - TRUE_DEPTH).abs() < 0.05, "pixel ({u}, {v}): {}", p[2]);
                // points lie on the reference rays
                assert_relative_eq!(p[0], (u as f32 - 31.5) / FOCAL * p[2], epsilon = 1e-4);
                assert_relative_eq!(p[1], (v as f32 - 23.5) / FOCAL * p[2], epsilon = 1e-4);
                coarse_errors.push(c[2] - TRUE_DEPTH);
                refined_errors.push(p[2] - TRUE_DEPTH);
            }
        }
        assert!(rms(&refined_errors) < rms(&coarse_errors));
    }

    #[test]
    fn two_views_agree() {
        init_logging();
        let lens = lens();
        let reference = view_of_plane(0.0);
        let right = view_of_plane(BASELINE);
        let left = view_of_plane(-BASELINE);
        let right_to_reference = offset(BASELINE, 0.0, 0.0);
        let left_to_reference = offset(-BASELINE, 0.0, 0.0);
        let views = [
            SecondaryView {
                image: &right,
                lens_model: &lens,
                secondary_to_reference: &right_to_reference,
            },
            SecondaryView {
                image: &left,
                lens_model: &lens,
                secondary_to_reference: &left_to_reference,
            },
        ];

        let volume = compute_cost_volume(&reference, &lens, &views, &config()).unwrap();
        assert_eq!(volume.depths().len(), 11);
        assert_eq!(volume.slice(0).len(), WIDTH * HEIGHT);

        let cloud = plane_sweeping(&reference, &lens, &views, &config()).unwrap();
        for v in 5..HEIGHT - 5 {
            for u in 20..44 {
                let z = cloud.get(u, v)[2];
                assert!((z - TRUE_DEPTH).abs() < 0.02, "pixel ({u}, {v}): {z}");
            }
        }
    }

    /// Like [`view_of_plane`] with three differently textured channels.
    fn color_view_of_plane(baseline: f32) -> Image {
        let shift = FOCAL * baseline / TRUE_DEPTH;
        Image::from_fn(WIDTH, HEIGHT, 3, |u, v| {
            let (u, v) = (u as f32 + shift, v as f32);
            vec![
                texture(u, v),
                texture(0.8 * u + 3.0, 1.1 * v + 1.0),
                (0.47 * u - 0.3 * v).cos() + 0.5 * (0.21 * v).sin(),
            ]
        })
        .unwrap()
    }

    #[test]
    fn color_sweep_with_absolute_differences() {
        let lens = lens();
        let reference = color_view_of_plane(0.0);
        let secondary = color_view_of_plane(BASELINE);
        let secondary_to_reference = offset(BASELINE, 0.0, 0.0);
        let views = [view(&secondary, &lens, &secondary_to_reference)];
        let config = PlaneSweepConfig {
            cost_function: CostFunction::SumOfAbsoluteDifference,
            ..config()
        };

        let volume = compute_cost_volume(&reference, &lens, &views, &config).unwrap();
        let coarse = volume.argmin_depths();
        let cloud = plane_sweeping(&reference, &lens, &views, &config).unwrap();
        for v in 5..HEIGHT - 5 {
            for u in 25..WIDTH - 5 {
                assert_relative_eq!(coarse[v * WIDTH + u], 2.0, epsilon = 1e-4);
                let z = cloud.get(u, v)[2];
                assert!((z - TRUE_DEPTH).abs() < 0.05, "pixel ({u}, {v}): {z}");
            }
        }
    }

    #[test]
    fn cost_slices_sum_channels_and_views() {
        let lens = LensModel::from_params(10.0, 10.0, 3.0, 2.0).unwrap();
        let reference = Image::from_fn(7, 5, 3, |_, _| vec![1.0, 2.0, 3.0]).unwrap();
        let first = Image::from_fn(7, 5, 3, |_, _| vec![0.5, 2.5, 5.0]).unwrap();
        let second = Image::from_size_val(7, 5, 3, 1.0).unwrap();
        let first_pose = offset(0.1, 0.0, 0.0);
        let second_pose = offset(0.0, 0.1, 0.0);
        let views = [
            view(&first, &lens, &first_pose),
            view(&second, &lens, &second_pose),
        ];

        // per view: |1 - 0.5| + |2 - 2.5| + |3 - 5| = 3 and 0 + 1 + 2 = 3
        // squared: 0.25 + 0.25 + 4 = 4.5 and 0 + 1 + 4 = 5
        for (cost_function, expected) in [
            (CostFunction::SumOfAbsoluteDifference, 6.0),
            (CostFunction::SumOfSquaredDifference, 9.5),
        ] {
            let config = PlaneSweepConfig {
                block_size: (3, 3),
                cost_function,
                ..PlaneSweepConfig::new([1.0, 2.0], 0.5)
            };
            let volume = compute_cost_volume(&reference, &lens, &views, &config).unwrap();
            assert_eq!(volume.depths(), &[1.0, 1.5, 2.0]);
            for k in 0..3 {
                assert_relative_eq!(volume.slice(k)[2 * 7 + 3], expected, epsilon = 1e-4);
            }
        }
    }

    #[test]
    fn single_depth_resolves_nothing() {
        let lens = lens();
        let reference = view_of_plane(0.0);
        let secondary = view_of_plane(BASELINE);
        let secondary_to_reference = offset(BASELINE, 0.0, 0.0);
        let views = [SecondaryView {
            image: &secondary,
            lens_model: &lens,
            secondary_to_reference: &secondary_to_reference,
        }];
        let config = PlaneSweepConfig::new([5.0, 5.0], 0.1);
        let cloud = plane_sweeping(&reference, &lens, &views, &config).unwrap();
        assert_eq!(cloud.num_valid(), 0);
        assert!(cloud.depth_map().as_slice().iter().all(|z| z.is_nan()));
    }

    #[test]
    fn bad_inputs_fail_fast() {
        let lens = lens();
        let reference = view_of_plane(0.0);
        let small = Image::from_size_val(WIDTH / 2, HEIGHT, 1, 0.0).unwrap();
        let color = Image::from_size_val(WIDTH, HEIGHT, 3, 0.0).unwrap();
        let pose = offset(BASELINE, 0.0, 0.0);

        assert!(matches!(
            plane_sweeping(&reference, &lens, &[], &config()),
            Err(Error::NoSecondaryViews)
        ));
        assert!(matches!(
            plane_sweeping(&reference, &lens, &[view(&small, &lens, &pose)], &config()),
            Err(Error::ImageSizeMismatch { .. })
        ));
        assert!(matches!(
            plane_sweeping(&reference, &lens, &[view(&color, &lens, &pose)], &config()),
            Err(Error::ChannelMismatch { .. })
        ));

        let ok = [view(&reference, &lens, &pose)];
        let bad_step = PlaneSweepConfig::new([1.0, 2.0], 0.0);
        assert!(matches!(
            plane_sweeping(&reference, &lens, &ok, &bad_step),
            Err(Error::InvalidStepSize(_))
        ));
        let bad_range = PlaneSweepConfig::new([3.0, 2.0], 0.1);
        assert!(matches!(
            plane_sweeping(&reference, &lens, &ok, &bad_range),
            Err(Error::InvalidDepthRange(..))
        ));
        let bad_block = PlaneSweepConfig {
            block_size: (0, 5),
            ..config()
        };
        assert!(matches!(
            plane_sweeping(&reference, &lens, &ok, &bad_block),
            Err(Error::InvalidBlockSize(0, 5))
        ));
    }

    #[test]
    fn reprojection_shifts_secondary() {
        let lens = lens();
        let secondary = view_of_plane(BASELINE);
        let secondary_to_reference = offset(BASELINE, 0.0, 0.0);
        let view = view(&secondary, &lens, &secondary_to_reference);
        let rays = reference_rays(&lens, WIDTH, HEIGHT);
        // at depth 2.0 the shift is exactly 10 pixels
        let warped = reproject_image_at_depth(&view, &rays, WIDTH, HEIGHT, 2.0).unwrap();
        for v in 1..HEIGHT - 1 {
            for u in 0..10 {
                assert!(warped.pixel(u, v)[0].is_nan());
            }
            for u in 11..WIDTH {
                assert_relative_eq!(
                    warped.pixel(u, v)[0],
                    secondary.pixel(u - 10, v)[0],
                    epsilon = 1e-3
                );
            }
        }
    }
}

mod geometry {
    use super::*;

    fn lens() -> LensModel<f64> {
        LensModel::new(
            CameraMatrix::new(600.0, 610.0, 330.0, 250.0).unwrap(),
            DistortionCoefficients::zero()
                .with_radial(-0.2, 0.05, 0.0, 0.0, 0.0, 0.0)
                .with_tangential(0.001, -0.0005),
        )
    }

    #[test]
    fn intrinsics_roundtrip() {
        let lens = lens();
        let mut rows = Vec::new();
        for v in (20..480).step_by(60) {
            for u in (20..640).step_by(60) {
                rows.push(u as f64);
                rows.push(v as f64);
            }
        }
        let pixels = Pixels::new(OMatrix::<f64, Dyn, U2>::from_row_slice(&rows));
        let rays = lens.pixel_to_camera(&pixels);
        let points = rays.point_on_ray();
        let back = lens.camera_to_pixel(&points);
        assert_relative_eq!(back.data, pixels.data, epsilon = 0.02);
    }

    #[test]
    fn project_then_triangulate() {
        let lens = lens();
        let world_to_camera_0 = RigidTransform::from_rotation_vector_and_translation(
            Vector3::new(0.02, -0.01, 0.03),
            Vector3::new(0.1, -0.2, 0.5),
        );
        let camera_1_to_camera_0 = RigidTransform::from_rotation_vector_and_translation(
            Vector3::new(0.0, -0.08, 0.0),
            Vector3::new(0.3, 0.0, 0.02),
        );
        let world_to_camera_1 = camera_1_to_camera_0.inverse().compose(&world_to_camera_0);

        let world = OMatrix::<f64, Dyn, U3>::from_row_slice(&[
            0.0, 0.0, 3.0, //
            0.5, -0.3, 2.5, //
            -0.4, 0.2, 4.0,
        ]);
        let world = Points::new(world);
        let pixels_0 = project_points(&world, &lens, &world_to_camera_0);
        let pixels_1 = project_points(&world, &lens, &world_to_camera_1);

        let rays_0 = lens.undistort(&lens.normalize(&pixels_0));
        let rays_1 = lens.undistort(&lens.normalize(&pixels_1));
        let points = triangulate_points(&rays_0, &rays_1, &camera_1_to_camera_0).unwrap();

        let expected = world_to_camera_0.apply(&world.data);
        assert_relative_eq!(points.data, expected, epsilon = 1e-4);
    }

    #[test]
    fn inverse_and_matrix_agree() {
        let t = RigidTransform::from_rotation_vector_and_translation(
            Vector3::new(0.3, -0.2, 0.1),
            Vector3::new(1.0, 2.0, -0.5),
        );
        let m = t.as_matrix();
        let inverse = m.try_inverse().unwrap();
        assert_relative_eq!(t.inverse().as_matrix(), inverse, epsilon = 1e-9);
        assert_relative_eq!(
            RigidTransform::from_matrix(&m).as_matrix(),
            m,
            epsilon = 1e-9
        );
        let p = Vector3::new(0.3, 0.4, 0.5);
        assert_relative_eq!(t.inverse().apply_point(&t.apply_point(&p)), p, epsilon = 1e-9);
    }
}

#[cfg(feature = "serde-serialize")]
mod serde_tests {
    use super::*;

    #[test]
    fn read_calibration() {
        let buf = include_str!("data/calibration.yaml");
        let lens: LensModel<f64> = from_calibration_yaml(buf.as_bytes()).unwrap();
        assert_eq!(lens.camera_matrix().fx(), 516.385667640757);
        assert_eq!(lens.distortion().k1(), -0.331416226762003);
        assert_eq!(lens.distortion().k4(), 0.0);
        assert_eq!(lens.distortion().tau_y(), 0.0);
    }

    #[test]
    fn write_then_read_calibration() {
        let lens = LensModel::new(
            CameraMatrix::new(812.5, 811.0, 330.25, 241.75).unwrap(),
            DistortionCoefficients::zero()
                .with_radial(-0.3, 0.1, -0.02, 0.01, 0.002, -0.001)
                .with_tilt(0.01, -0.02),
        );
        let mut buf = Vec::new();
        to_calibration_yaml(&mut buf, &lens).unwrap();
        let back: LensModel<f64> = from_calibration_yaml(&buf[..]).unwrap();
        assert_eq!(back, lens);
    }

    #[test]
    fn distortion_block_is_optional() {
        let buf = b"camera_matrix: {fx: 100.0, fy: 100.0, cx: 50.0, cy: 40.0}\n";
        let lens: LensModel<f32> = from_calibration_yaml(&buf[..]).unwrap();
        assert!(lens.distortion().is_linear());
    }

    #[test]
    fn bad_calibrations_are_rejected() {
        let zero = b"camera_matrix: {fx: 0.0, fy: 100.0, cx: 50.0, cy: 40.0}\n";
        assert!(matches!(
            from_calibration_yaml::<f64, _>(&zero[..]),
            Err(Error::ZeroFocalLength)
        ));
        let missing = b"distortion_coefficients: {k1: 0.1}\n";
        assert!(matches!(
            from_calibration_yaml::<f64, _>(&missing[..]),
            Err(Error::YamlParseError)
        ));
    }

    #[test]
    fn config_defaults() {
        let buf = "depth_range: [1.0, 3.0]\nstep_size: 0.5\ncost_function: ssd\n";
        let config: PlaneSweepConfig = serde_yaml::from_str(buf).unwrap();
        assert_eq!(config.block_size, (11, 11));
        assert!(config.subpixel_fit);
        assert_eq!(config.cost_function, CostFunction::SumOfSquaredDifference);
        config.validate().unwrap();
    }
}
