use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use half::f16;

use devarr_core::{Allocator, Device, GpuArray, RuntimeConfig, TriangleMode};

#[derive(Parser)]
#[command(
    name = "devarr",
    about = "Inspect and exercise devarr devices",
    version
)]
struct Cli {
    /// JSON runtime config; defaults to DEVARR_DEVICE / DEVARR_EMULATED_MEMORY_LIMIT
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Show the configured device and build features
    Info,
    /// Run transfers, fills and kernels on the configured device
    Selftest {
        /// Elements per test array
        #[arg(long, default_value = "4096")]
        size: usize,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        Commands::Info => cmd_info(&config),
        Commands::Selftest { size, json } => cmd_selftest(&config, size, json),
    });
    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> devarr_core::Result<RuntimeConfig> {
    match path {
        Some(path) => RuntimeConfig::from_file(path),
        None => RuntimeConfig::from_env(),
    }
}

fn cmd_info(config: &RuntimeConfig) -> devarr_core::Result<()> {
    println!("devarr v{}\n", env!("CARGO_PKG_VERSION"));

    println!("Config");
    for line in config.to_json()?.lines() {
        println!("  {line}");
    }

    println!("\nBuild");
    println!("  cuda feature: {}", if cfg!(feature = "cuda") { "[x]" } else { "[ ]" });

    println!("\nAvailable devices");
    for device in Device::available() {
        println!("  {device}");
    }

    let alloc = config.open()?;
    println!("\nConfigured device");
    println!("  driver:  {}", alloc.driver().name());
    println!("  context: {}", alloc.context());

    println!("\nDTypes");
    println!("  memset fill: u8 i8 u16 i16 f16 bf16 u32 i32 f32");
    println!("  kernel fill: u64 i64 f64");
    Ok(())
}

struct Check {
    name: &'static str,
    passed: bool,
    millis: f64,
}

fn run_check(name: &'static str, f: impl FnOnce() -> devarr_core::Result<bool>) -> Check {
    let start = Instant::now();
    let passed = match f() {
        Ok(passed) => passed,
        Err(e) => {
            tracing::warn!("{name} failed: {e}");
            false
        }
    };
    Check {
        name,
        passed,
        millis: start.elapsed().as_secs_f64() * 1000.0,
    }
}

fn cmd_selftest(config: &RuntimeConfig, size: usize, json: bool) -> devarr_core::Result<()> {
    let alloc = config.open()?;
    let side = (size as f64).sqrt() as usize;

    let checks = vec![
        run_check("round_trip_f32", || {
            let data: Vec<f32> = (0..size).map(|i| i as f32 * 0.5).collect();
            let a = GpuArray::<f32, 1>::from_host_in(&alloc, &data, [size])?;
            Ok(a.to_vec()? == data)
        }),
        run_check("device_copy_u16", || {
            let data: Vec<u16> = (0..size).map(|i| i as u16).collect();
            let a = GpuArray::<u16, 1>::from_host_in(&alloc, &data, [size])?;
            Ok(a.copy()?.to_vec()? == data)
        }),
        run_check("cross_context_copy", || {
            let a = GpuArray::<i32, 1>::filled_in(&alloc, [size], -7)?;
            let host = GpuArray::<i32, 1>::zeros_in(&Allocator::emulated(), [size])?;
            host.copy_from(&a)?;
            Ok(host.to_vec()?.iter().all(|&x| x == -7))
        }),
        run_check("memset_fill_f16", || {
            let v = f16::from_f32(1.5);
            let a = GpuArray::<f16, 1>::filled_in(&alloc, [size], v)?;
            Ok(a.to_vec()?.iter().all(|&x| x == v))
        }),
        run_check("kernel_fill_f64", || {
            let a = GpuArray::<f64, 1>::filled_in(&alloc, [size], -0.25)?;
            Ok(a.to_vec()?.iter().all(|&x| x == -0.25))
        }),
        run_check("triangular_zero", || {
            let m = GpuArray::<f32, 2>::filled_in(&alloc, [side, side], 1.0)?;
            m.triangular_zero(0, TriangleMode::LowerExcludingAbove)?;
            let host = m.to_vec()?;
            Ok((0..side * side).all(|i| {
                let (r, c) = (i / side, i % side);
                host[i] == if c > r { 0.0 } else { 1.0 }
            }))
        }),
    ];

    let failed = checks.iter().filter(|c| !c.passed).count();
    if json {
        let report = serde_json::json!({
            "context": alloc.context().to_string(),
            "size": size,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "passed": c.passed,
                "millis": c.millis,
            })).collect::<Vec<_>>(),
        });
        println!("{report:#}");
    } else {
        println!("selftest on {} ({} elements)\n", alloc.context(), size);
        for c in &checks {
            let mark = if c.passed { "[x]" } else { "[ ]" };
            println!("  {mark} {:<20} {:>9.3} ms", c.name, c.millis);
        }
        println!("\n{} passed, {} failed", checks.len() - failed, failed);
    }

    if failed > 0 {
        std::process::exit(2);
    }
    Ok(())
}
