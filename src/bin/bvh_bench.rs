use lbvh::bindings::bvh::BvhGpu;
use lbvh::gpu_handles::GpuHandles;
use lbvh::timings::{BuildTimings, Stage};
use lbvh::vector::Vec3f32;
use lbvh::{Aabb, Bvh};

use rand::Rng;
use rand_pcg::Pcg32;
use std::time::Instant;

/// Benchmark binary for the hierarchy builder

fn main() {
    env_logger::init();

    let runs = 20;
    println!("Benchmarking with {runs} samples.\n");

    println!("Rebuild scaling with leaf count (1/3):");
    run_rebuild(10_000, runs).display("BVH rebuild: 10,000 leaves");
    run_rebuild(100_000, runs).display("BVH rebuild: 100,000 leaves");
    let build_1m = run_rebuild(1_000_000, runs).display("BVH rebuild: 1,000,000 leaves");
    println!("----------------------------------");

    println!("\nRefit vs rebuild (2/3):");
    build_1m.display_short("Rebuild: 1,000,000 leaves");
    run_refit(1_000_000, runs).display_short("Refit:   1,000,000 leaves");
    println!("----------------------------------");

    println!("\nDevice upload (3/3):");
    match GpuHandles::new() {
        Ok(handles) => {
            let (lower, upper) = random_scene(100_000, 0.01, 0);
            let bvh = Bvh::build(&lower, &upper).expect("Failed to build hierarchy");
            let timer = Instant::now();
            let gpu = BvhGpu::new(&handles.device, &bvh);
            println!(
                "Uploaded {} nodes in {:?} on {:?}",
                gpu.node_count(),
                timer.elapsed(),
                handles.adapter.get_info().name,
            );
        }
        Err(error) => println!("Skipping upload benchmark: {error}"),
    }
    println!("----------------------------------");

    println!("\nAll done.");
}

/// Uniform random scene of half-extent `radius` boxes with centers in [0,1)^3.
fn random_scene(count: usize, radius: f32, seed: u64) -> (Vec<Vec3f32>, Vec<Vec3f32>) {
    let mut rng = Pcg32::new(seed, 0xa02bdbf7bb3c0a7);
    let mut lower = Vec::with_capacity(count);
    let mut upper = Vec::with_capacity(count);
    for _ in 0..count {
        let center = Vec3f32::new(rng.gen::<f32>(), rng.gen::<f32>(), rng.gen::<f32>());
        let aabb = Aabb::around(center, Vec3f32::splat(radius));
        lower.push(aabb.lower);
        upper.push(aabb.upper);
    }
    (lower, upper)
}

fn run_rebuild(count: usize, runs: u32) -> BuildTimings {
    let (lower, upper) = random_scene(count, 0.01, 42);
    let mut total = BuildTimings::default();
    for _ in 0..runs {
        let bvh = Bvh::build(&lower, &upper).expect("Failed to build hierarchy");
        total += bvh.timings;
    }
    total /= runs;
    total
}

fn run_refit(count: usize, runs: u32) -> BuildTimings {
    let (mut lower, mut upper) = random_scene(count, 0.01, 42);
    let mut bvh = Bvh::build(&lower, &upper).expect("Failed to build hierarchy");
    let mut total = BuildTimings::default();
    for run in 0..runs {
        // jitter the bounds a little so the refit has work to do
        let shift = 0.001 * (run as f32 + 1.0);
        lower.iter_mut().for_each(|corner| corner.y += shift);
        upper.iter_mut().for_each(|corner| corner.y += shift);
        bvh.refit(&lower, &upper).expect("Failed to refit hierarchy");
        total += bvh.timings;
    }
    total /= runs;
    // only the refit stages ran; drop the stale rebuild numbers
    let mut refit_only = BuildTimings::default();
    refit_only[Stage::Refit] = total[Stage::Refit];
    refit_only[Stage::Compaction] = total[Stage::Compaction];
    refit_only
}
