//! # prism
//!
//! An offline Monte Carlo path tracer. A scene — camera, lights, a
//! hierarchical graph of transformed shape instances, materials, textures,
//! and an environment — is rendered into three images: color, a normalized
//! z-buffer, and a per-pixel sample-count map.
//!
//! ## Architecture
//!
//! - **Ray engine**: scene-graph traversal with per-node affine frames,
//!   and a stack-based BVH descent for triangle meshes (Möller–Trumbore
//!   with winding-based side filtering).
//! - **Transport**: Blinn–Phong dielectric shading with Fresnel glass and
//!   Beer–Lambert absorption, driven either by a recursive analytic shader
//!   or an iterative path tracer with next-event estimation and Russian
//!   roulette.
//! - **Sampling**: Halton-jittered sub-pixel and thin-lens samples, and a
//!   per-pixel adaptive estimator that stops once the color confidence
//!   interval tightens below a threshold.
//! - **Scheduling**: 16×16 pixel tiles dealt to worker threads through a
//!   single atomic counter; pixel writes are disjoint by construction.

mod bvh;
mod camera;
mod geometry;
mod integrator;
mod light;
mod material;
mod math;
mod photon;
mod presets;
mod renderer;
mod sampling;
mod scene;

use anyhow::Result;
use clap::Parser;
use photon::PhotonMap;
use presets::ScenePreset;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use renderer::{render, IntegratorKind, RenderConfig};
use std::path::PathBuf;

/// prism — offline path tracer
#[derive(Parser, Debug)]
#[command(
    name = "prism",
    version,
    about = "An offline Monte Carlo path tracer written in Rust 🦀",
    long_about = "Renders built-in scenes with adaptive Monte Carlo sampling, \
                  BVH-accelerated meshes, thin-lens depth of field, soft shadows, \
                  and Fresnel glass. Produces a color image plus z-buffer and \
                  sample-density diagnostics as PNG.",
    after_help = "EXAMPLES:\n  \
                  prism --scene showcase\n  \
                  prism --scene cornell --max-spp 256 --delta-max 0.005\n  \
                  prism --scene glass --integrator whitted --bounces 8\n  \
                  prism --scene showcase --seed 42 --threads 1 --preview"
)]
struct Cli {
    /// Scene preset to render
    #[arg(short, long, value_enum, default_value_t = ScenePreset::Showcase)]
    scene: ScenePreset,

    /// Output width in pixels
    #[arg(short = 'W', long)]
    width: Option<u32>,

    /// Output height in pixels
    #[arg(short = 'H', long)]
    height: Option<u32>,

    /// Minimum samples per pixel before the adaptive test may stop
    #[arg(long, default_value_t = 16)]
    min_spp: u32,

    /// Maximum samples per pixel
    #[arg(long, default_value_t = 64)]
    max_spp: u32,

    /// Per-channel confidence half-width at which a pixel is done
    #[arg(long, default_value_t = 0.01)]
    delta_max: f32,

    /// Maximum ray bounce depth
    #[arg(long, default_value_t = 5)]
    bounces: u32,

    /// Square tile edge length in pixels
    #[arg(long, default_value_t = 16)]
    tile_size: u32,

    /// Worker thread count (0 = hardware concurrency)
    #[arg(long, default_value_t = 0)]
    threads: usize,

    /// Deterministic per-pixel seed; 0 draws from entropy
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Light transport integrator
    #[arg(short, long, value_enum, default_value_t = CliIntegrator::Path)]
    integrator: CliIntegrator,

    /// Photons to emit into the photon map before rendering (0 = skip)
    #[arg(long, default_value_t = 0)]
    photons: u64,

    /// Color output path
    #[arg(short, long, default_value = "image.png")]
    output: PathBuf,

    /// Z-buffer output path
    #[arg(long, default_value = "zbuffer.png")]
    zbuffer: PathBuf,

    /// Sample-count output path
    #[arg(long, default_value = "sampleCount.png")]
    sample_count: PathBuf,

    /// Write linear radiance without the sRGB transfer curve
    #[arg(long)]
    no_srgb: bool,

    /// Show a half-block preview of the result in the terminal
    #[arg(long)]
    preview: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliIntegrator {
    /// Iterative path tracing with next-event estimation
    Path,
    /// Recursive analytic shading (reflection/refraction rays)
    Whitted,
}

impl From<CliIntegrator> for IntegratorKind {
    fn from(i: CliIntegrator) -> Self {
        match i {
            CliIntegrator::Path => IntegratorKind::Path,
            CliIntegrator::Whitted => IntegratorKind::Whitted,
        }
    }
}

fn print_header(scene_name: &str, config: &RenderConfig) {
    eprintln!();
    eprintln!("  ╔═══════════════════════════════════════════════╗");
    eprintln!("  ║  prism 🔭  Offline Path Tracer                ║");
    eprintln!("  ╚═══════════════════════════════════════════════╝");
    eprintln!();
    eprintln!("  Scene:      {scene_name}");
    eprintln!("  Resolution: {}×{}", config.width, config.height);
    eprintln!(
        "  Samples:    {}–{} spp (δ ≤ {})",
        config.min_samples, config.max_samples, config.delta_max
    );
    eprintln!("  Bounces:    {}", config.max_bounces);
    eprintln!(
        "  Integrator: {}",
        match config.integrator {
            IntegratorKind::Path => "path",
            IntegratorKind::Whitted => "whitted",
        }
    );
    eprintln!();
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    log::info!("building scene preset '{}'", cli.scene.name());
    let scene = cli.scene.build();

    let mut config = RenderConfig {
        min_samples: cli.min_spp.max(1),
        max_samples: cli.max_spp.max(cli.min_spp.max(1)),
        delta_max: cli.delta_max,
        max_bounces: cli.bounces,
        tile_size: cli.tile_size,
        threads: cli.threads,
        seed: cli.seed,
        srgb: !cli.no_srgb,
        integrator: cli.integrator.into(),
        width: scene.camera.width,
        height: scene.camera.height,
    };
    if let Some(w) = cli.width {
        config.width = w;
    }
    if let Some(h) = cli.height {
        config.height = h;
    }

    // The camera drives the image-plane aspect, so resolution overrides
    // must reach it before the basis is derived.
    let mut scene = scene;
    scene.camera.width = config.width;
    scene.camera.height = config.height;

    print_header(cli.scene.name(), &config);

    if cli.photons > 0 {
        let mut map = PhotonMap::new(cli.photons as usize);
        let mut rng = if cli.seed != 0 {
            SmallRng::seed_from_u64(cli.seed)
        } else {
            SmallRng::from_entropy()
        };
        let emitted = photon::emit_photons(&scene, &mut map, cli.photons * 100, &mut rng);
        eprintln!(
            "  Photons:    {} stored of {} emitted",
            map.len(),
            emitted
        );
    }

    let (targets, stats) = render(&scene, &config);
    stats.print_summary();

    targets.save_color(&cli.output)?;
    targets.save_zbuffer(&cli.zbuffer)?;
    targets.save_sample_count(&cli.sample_count)?;

    if cli.preview {
        eprintln!();
        targets.preview();
    }

    eprintln!();
    eprintln!("  Rendered with prism v{}", env!("CARGO_PKG_VERSION"));
    Ok(())
}
