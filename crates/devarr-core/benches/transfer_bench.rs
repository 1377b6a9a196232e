//! Benchmark: host↔device transfers, fills and the triangular mask.
//!
//! Runs on the device selected by DEVARR_DEVICE (emulated by default).

use std::time::Instant;

use devarr_core::{GpuArray, RuntimeConfig};

fn time_it(iters: usize, mut f: impl FnMut()) -> f64 {
    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn gib_per_s(bytes: usize, secs: f64) -> f64 {
    bytes as f64 / secs / (1u64 << 30) as f64
}

fn main() {
    let alloc = RuntimeConfig::from_env()
        .and_then(|c| c.open())
        .expect("failed to open device");
    println!("=== devarr Transfer Benchmark ({}) ===\n", alloc.context());

    let sizes: &[usize] = &[1 << 10, 1 << 14, 1 << 18, 1 << 22];

    println!(
        "{:<10} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "Elements", "H2D GiB/s", "D2H GiB/s", "D2D GiB/s", "fill32 ms", "fill64 ms"
    );
    println!("{}", "-".repeat(66));

    for &n in sizes {
        let iters = ((1 << 24) / n).clamp(3, 200);
        let host: Vec<f32> = (0..n).map(|i| (i % 97) as f32 * 0.5).collect();
        let mut out = vec![0f32; n];
        let a = GpuArray::<f32, 1>::new_in(&alloc, [n]).unwrap();
        let b = a.similar().unwrap();
        let wide = GpuArray::<f64, 1>::new_in(&alloc, [n]).unwrap();
        let bytes = n * 4;

        let h2d = time_it(iters, || a.copy_from_host(&host).unwrap());
        let d2h = time_it(iters, || a.copy_to_host(&mut out).unwrap());
        let d2d = time_it(iters, || b.copy_from(&a).unwrap());
        let fill32 = time_it(iters, || a.fill(1.0).unwrap());
        let fill64 = time_it(iters, || wide.fill(1.0).unwrap());

        println!(
            "{:<10} {:>10.2} {:>10.2} {:>10.2} {:>10.3} {:>10.3}",
            n,
            gib_per_s(bytes, h2d),
            gib_per_s(bytes, d2h),
            gib_per_s(bytes, d2d),
            fill32 * 1000.0,
            fill64 * 1000.0,
        );
    }

    println!("\nTriangular mask");
    for &side in &[64usize, 256, 1024] {
        let m = GpuArray::<f32, 2>::filled_in(&alloc, [side, side], 1.0).unwrap();
        let secs = time_it(5, || m.tril_in_place(0).unwrap());
        println!("  {side:>5}x{side:<5} {:>10.3} ms", secs * 1000.0);
    }
}
