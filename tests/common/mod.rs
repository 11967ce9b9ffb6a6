//! Common test helpers for depth tracking integration tests

#![allow(dead_code)]

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

use depthtrack::prelude::*;

pub type TestParticleTracker =
    Tracker<CoordinateParticleFilter<BrownianPoseTransition, DepthObservationModel<SphereRenderer>>>;

pub type TestGaussianTracker =
    Tracker<RobustGaussianFilter<BrownianPoseTransition, DepthObservationModel<SphereRenderer>>>;

/// Camera every scenario renders through.
pub fn test_camera() -> CameraData {
    CameraData::new(48, 48, 45.0, 45.0, 24.0, 24.0)
}

/// The tracked object: a single 15 cm sphere.
pub fn sphere_renderer() -> Arc<SphereRenderer> {
    Arc::new(SphereRenderer::single(0.15))
}

/// Pose with the given position and identity orientation.
pub fn pose(x: f64, y: f64, z: f64) -> StateVector {
    let mut state = StateVector::zeros(POSE_BLOCK_SIZE);
    state[0] = x;
    state[1] = y;
    state[2] = z;
    state
}

/// Euclidean position error between an estimate and the true pose.
pub fn position_error(estimate: &StateVector, truth: &StateVector) -> f64 {
    (estimate.rows(0, 3) - truth.rows(0, 3)).norm()
}

/// Noise-free rendering of the scene at `pose`.
pub fn clean_frame(renderer: &SphereRenderer, pose: &StateVector) -> DepthImage {
    renderer.render(pose, &test_camera())
}

/// Rendering of the scene at `pose` with per-pixel sensor noise on every
/// hit ray.
pub fn noisy_frame(renderer: &SphereRenderer, pose: &StateVector, rng: &mut StdRng) -> DepthImage {
    let clean = clean_frame(renderer, pose);
    let camera = test_camera();
    DepthImage::from_fn(camera.width, camera.height, |x, y| {
        let depth = clean.at(x, y);
        if depth.is_finite() {
            depth + 0.005 * rng.sample::<f64, _>(StandardNormal)
        } else {
            depth
        }
    })
}

/// Like `noisy_frame`, but with the left half of the image covered by a
/// flat occluder at `occluder_depth`.
pub fn occluded_frame(
    renderer: &SphereRenderer,
    pose: &StateVector,
    occluder_depth: f64,
    rng: &mut StdRng,
) -> DepthImage {
    let clean = clean_frame(renderer, pose);
    let camera = test_camera();
    DepthImage::from_fn(camera.width, camera.height, |x, y| {
        if x < camera.width / 2 {
            occluder_depth + 0.005 * rng.sample::<f64, _>(StandardNormal)
        } else {
            let depth = clean.at(x, y);
            if depth.is_finite() {
                depth + 0.005 * rng.sample::<f64, _>(StandardNormal)
            } else {
                depth
            }
        }
    })
}

/// Standard particle tracker over the sphere scene.
pub fn make_particle_tracker(seed: u64, evaluation_count: usize) -> TestParticleTracker {
    let renderer = sphere_renderer();
    ParticleTrackerBuilder::new(
        renderer.as_ref(),
        BrownianTransitionBuilder::new()
            .linear_sigma(0.02)
            .angular_sigma(0.02),
        DepthObservationModelBuilder::new(Arc::clone(&renderer), test_camera())
            .body_sigma(0.01)
            .tail_weight(0.05)
            .depth_range(0.4, 2.5),
    )
    .params(TrackerParams {
        evaluation_count,
        moving_average_update_rate: 0.7,
        max_kl_divergence: 2.0,
    })
    .seed(seed)
    .build()
    .expect("particle tracker configuration is valid")
}

/// Standard Gaussian tracker over the sphere scene.
pub fn make_gaussian_tracker() -> TestGaussianTracker {
    let renderer = sphere_renderer();
    GaussianTrackerBuilder::new(
        renderer.as_ref(),
        BrownianTransitionBuilder::new()
            .linear_sigma(0.02)
            .angular_sigma(0.02),
        DepthObservationModelBuilder::new(Arc::clone(&renderer), test_camera())
            .body_sigma(0.01)
            .tail_weight(0.05)
            .depth_range(0.4, 2.5),
    )
    .params(TrackerParams {
        moving_average_update_rate: 0.7,
        ..TrackerParams::default()
    })
    .build()
    .expect("gaussian tracker configuration is valid")
}
