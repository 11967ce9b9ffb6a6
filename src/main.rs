//! Example usage of the depthtrack library
//!
//! Tracks a synthetic sphere through a short sequence of noisy depth
//! frames, once with the coordinate particle filter and once with the
//! robust Gaussian filter.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use depthtrack::prelude::*;

/// Renders the scene at `pose` and perturbs every hit pixel with sensor
/// noise. Rays that miss the sphere stay invalid, as on a real sensor.
fn noisy_frame(
    renderer: &SphereRenderer,
    camera: &CameraData,
    pose: &StateVector,
    rng: &mut StdRng,
) -> DepthImage {
    let clean = renderer.render(pose, camera);
    DepthImage::from_fn(camera.width, camera.height, |x, y| {
        let depth = clean.at(x, y);
        if depth.is_finite() {
            depth + 0.005 * rng.sample::<f64, _>(StandardNormal)
        } else {
            depth
        }
    })
}

fn main() -> depthtrack::Result<()> {
    println!("depthtrack: Depth-Based Object Pose Tracking");
    println!("============================================\n");

    // Scene: a 15 cm sphere one meter in front of a small depth camera
    let camera = CameraData::new(64, 64, 60.0, 60.0, 32.0, 32.0);
    let renderer = Arc::new(SphereRenderer::single(0.15));

    let mut truth = StateVector::zeros(POSE_BLOCK_SIZE);
    truth[2] = 1.0;

    // Create trackers
    let transition = BrownianTransitionBuilder::new()
        .linear_sigma(0.02) // Position random walk per frame (m)
        .angular_sigma(0.02); // Orientation random walk per frame (rad)

    let observation = DepthObservationModelBuilder::new(Arc::clone(&renderer), camera)
        .body_sigma(0.01) // Sensor noise around the rendered surface (m)
        .tail_weight(0.05) // Prior mass of occlusion and outliers
        .depth_range(0.4, 2.5); // Measurable range (m)

    let mut particle_tracker =
        ParticleTrackerBuilder::new(renderer.as_ref(), transition.clone(), observation.clone())
            .params(TrackerParams {
                evaluation_count: 60,
                moving_average_update_rate: 0.6,
                max_kl_divergence: 2.0,
            })
            .seed(17)
            .build()?;

    let mut gaussian_tracker =
        GaussianTrackerBuilder::new(renderer.as_ref(), transition, observation).build()?;

    // Initialize both from two rough pose candidates
    let candidates = vec![
        {
            let mut candidate = truth.clone();
            candidate[0] += 0.05;
            candidate[2] += 0.08;
            candidate
        },
        {
            let mut candidate = truth.clone();
            candidate[0] -= 0.04;
            candidate[2] -= 0.06;
            candidate
        },
    ];
    particle_tracker.on_initialize(&candidates)?;
    gaussian_tracker.on_initialize(&candidates)?;
    println!("Initialized from {} pose candidates\n", candidates.len());

    // Track the sphere drifting right and toward the camera
    let mut rng = StdRng::seed_from_u64(5);
    for step in 0..10 {
        truth[0] += 0.015;
        truth[2] -= 0.01;
        let frame = noisy_frame(&renderer, &camera, &truth, &mut rng);

        let particle_estimate = particle_tracker.on_track(&frame)?;
        let gaussian_estimate = gaussian_tracker.on_track(&frame)?;

        let particle_error = (particle_estimate.rows(0, 3) - truth.rows(0, 3)).norm();
        let gaussian_error = (gaussian_estimate.rows(0, 3) - truth.rows(0, 3)).norm();

        println!(
            "Frame {}: truth pos=({:+.3}, {:+.3}, {:.3}), {} valid pixels",
            step,
            truth[0],
            truth[1],
            truth[2],
            frame.valid_count()
        );
        println!(
            "  particle: pos=({:+.3}, {:+.3}, {:.3}), err={:.3} m, next evaluations={}",
            particle_estimate[0],
            particle_estimate[1],
            particle_estimate[2],
            particle_error,
            particle_tracker.filter().evaluation_count()
        );
        println!(
            "  gaussian: pos=({:+.3}, {:+.3}, {:.3}), err={:.3} m",
            gaussian_estimate[0], gaussian_estimate[1], gaussian_estimate[2], gaussian_error
        );
        println!();
    }

    println!("Tracking complete!");
    Ok(())
}
