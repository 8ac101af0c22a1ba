use crate::camera::CameraFrame;
use crate::integrator::{radiance_path, radiance_whitted};
use crate::sampling::{rotate, unit_disk, HaltonSeq, PixelEstimator};
use crate::scene::Scene;
use anyhow::{Context, Result};
use crossterm::style::{self, Stylize};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

// ─── Render Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegratorKind {
    /// Iterative path tracing with next-event estimation.
    Path,
    /// Recursive analytic shading with reflection and refraction.
    Whitted,
}

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// Adaptive sampling bounds per pixel.
    pub min_samples: u32,
    pub max_samples: u32,
    /// Confidence half-width below which a pixel stops sampling.
    pub delta_max: f32,
    pub max_bounces: u32,
    pub tile_size: u32,
    /// Worker count; zero selects hardware concurrency.
    pub threads: usize,
    /// Zero draws from entropy; any other value seeds each pixel
    /// deterministically, making output independent of the worker count.
    pub seed: u64,
    pub srgb: bool,
    pub integrator: IntegratorKind,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            min_samples: 16,
            max_samples: 64,
            delta_max: 0.01,
            max_bounces: 5,
            tile_size: 16,
            threads: 0,
            seed: 0,
            srgb: true,
            integrator: IntegratorKind::Path,
        }
    }
}

// ─── Output Targets ─────────────────────────────────────────────────────────

/// The three per-pixel output buffers of a render: packed RGB8 color, the
/// depth of the jitter-free center ray (infinite on a miss), and the number
/// of samples the adaptive estimator spent. Every pixel is written exactly
/// once, by the worker that owns its tile.
pub struct RenderTargets {
    pub width: u32,
    pub height: u32,
    pub color: Vec<u8>,
    pub depth: Vec<f32>,
    pub samples: Vec<u16>,
}

impl RenderTargets {
    pub fn new(width: u32, height: u32) -> Self {
        let n = (width * height) as usize;
        Self {
            width,
            height,
            color: vec![0; n * 3],
            depth: vec![f32::INFINITY; n],
            samples: vec![0; n],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = ((y * self.width + x) * 3) as usize;
        [self.color[i], self.color[i + 1], self.color[i + 2]]
    }

    pub fn save_color(&self, path: &Path) -> Result<()> {
        let img = image::RgbImage::from_raw(self.width, self.height, self.color.clone())
            .context("color buffer does not match image dimensions")?;
        img.save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote {}", path.display());
        Ok(())
    }

    /// Depth normalized over the finite range, near surfaces bright;
    /// misses map to black.
    pub fn save_zbuffer(&self, path: &Path) -> Result<()> {
        let mut z_min = f32::INFINITY;
        let mut z_max = f32::NEG_INFINITY;
        for &z in &self.depth {
            if z.is_finite() {
                z_min = z_min.min(z);
                z_max = z_max.max(z);
            }
        }
        let span = z_max - z_min;
        let img = image::GrayImage::from_fn(self.width, self.height, |x, y| {
            let z = self.depth[(y * self.width + x) as usize];
            if !z.is_finite() {
                image::Luma([0u8])
            } else if span <= 0.0 {
                image::Luma([255u8])
            } else {
                image::Luma([(255.0 * (z_max - z) / span) as u8])
            }
        });
        img.save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote {}", path.display());
        Ok(())
    }

    /// Sample counts normalized over the observed range, heavy pixels
    /// bright.
    pub fn save_sample_count(&self, path: &Path) -> Result<()> {
        let lo = self.samples.iter().copied().min().unwrap_or(0);
        let hi = self.samples.iter().copied().max().unwrap_or(0);
        let span = (hi - lo) as f32;
        let img = image::GrayImage::from_fn(self.width, self.height, |x, y| {
            let n = self.samples[(y * self.width + x) as usize];
            if span <= 0.0 {
                image::Luma([255u8])
            } else {
                image::Luma([(255.0 * (n - lo) as f32 / span) as u8])
            }
        });
        img.save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("wrote {}", path.display());
        Ok(())
    }

    /// Prints the color buffer to the terminal with half-block glyphs —
    /// two vertical pixels per character cell.
    pub fn preview(&self) {
        let stdout = io::stdout();
        let mut out = io::BufWriter::new(stdout.lock());
        let rows = self.height / 2;
        for row in 0..rows {
            for x in 0..self.width {
                let [tr, tg, tb] = self.pixel(x, row * 2);
                let [br, bg, bb] = self.pixel(x, row * 2 + 1);
                let _ = write!(
                    out,
                    "{}",
                    "▀".with(style::Color::Rgb {
                        r: tr,
                        g: tg,
                        b: tb
                    })
                    .on(style::Color::Rgb {
                        r: br,
                        g: bg,
                        b: bb
                    })
                );
            }
            let _ = writeln!(out);
        }
        let _ = out.flush();
    }
}

/// Raw per-pixel write access shared across workers. The tile scheduler
/// hands each worker disjoint pixel rectangles, so concurrent writes never
/// alias; that partition is the entire safety argument.
#[derive(Clone, Copy)]
struct PixelWriter {
    color: *mut u8,
    depth: *mut f32,
    samples: *mut u16,
    width: u32,
}

unsafe impl Send for PixelWriter {}
unsafe impl Sync for PixelWriter {}

impl PixelWriter {
    fn new(targets: &mut RenderTargets) -> Self {
        Self {
            color: targets.color.as_mut_ptr(),
            depth: targets.depth.as_mut_ptr(),
            samples: targets.samples.as_mut_ptr(),
            width: targets.width,
        }
    }

    /// Safety: (x, y) must lie inside the caller's own tile.
    unsafe fn write(&self, x: u32, y: u32, rgb: [u8; 3], depth: f32, samples: u16) {
        let idx = (y * self.width + x) as usize;
        let c = self.color.add(idx * 3);
        c.write(rgb[0]);
        c.add(1).write(rgb[1]);
        c.add(2).write(rgb[2]);
        self.depth.add(idx).write(depth);
        self.samples.add(idx).write(samples);
    }
}

// ─── Render Statistics ──────────────────────────────────────────────────────

/// Aggregate statistics collected during the rendering pass.
pub struct RenderStats {
    pub total_samples: u64,
    pub elapsed_secs: f64,
    pub width: u32,
    pub height: u32,
    pub threads: usize,
}

impl RenderStats {
    pub fn average_spp(&self) -> f64 {
        self.total_samples as f64 / (self.width as f64 * self.height as f64)
    }

    pub fn msamples_per_sec(&self) -> f64 {
        self.total_samples as f64 / self.elapsed_secs / 1e6
    }

    pub fn print_summary(&self) {
        let bar_width = 30;
        let fill = "━".repeat(bar_width);
        eprintln!("  {fill}");
        eprintln!("  Time:     {:.2}s", self.elapsed_secs);
        eprintln!(
            "  Samples:  {:.2}M total ({:.1} avg spp)",
            self.total_samples as f64 / 1e6,
            self.average_spp()
        );
        eprintln!("  Speed:    {:.2} Msamples/s", self.msamples_per_sec());
        eprintln!(
            "  Image:    {}×{} on {} threads",
            self.width, self.height, self.threads
        );
        eprintln!("  {fill}");
    }
}

// ─── Progress Reporter ──────────────────────────────────────────────────────

/// A Unicode progress bar on stderr, ticked once per completed tile.
struct ProgressBar {
    total: u32,
    done: u32,
    last_pct: u32,
    start: Instant,
}

impl ProgressBar {
    fn new(total: u32) -> Self {
        Self {
            total,
            done: 0,
            last_pct: 0,
            start: Instant::now(),
        }
    }

    fn tick(&mut self) {
        self.done += 1;
        let pct = self.done * 100 / self.total;
        if pct != self.last_pct {
            let elapsed = self.start.elapsed().as_secs_f64();
            let rate = self.done as f64 / elapsed;
            let remaining = (self.total - self.done) as f64 / rate;
            let bar_width = 24;
            let filled = (pct as usize * bar_width) / 100;
            let empty = bar_width - filled;
            let bar = format!("{}{}", "█".repeat(filled), "░".repeat(empty));
            eprint!("\r  Rendering: │{bar}│ {pct:3}%  ETA {remaining:.0}s   ");
            self.last_pct = pct;
        }
    }

    fn finish(&self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        let bar = "█".repeat(24);
        eprintln!("\r  Rendering: │{bar}│ 100%  {elapsed:.2}s       ");
    }
}

// ─── Tile-Scheduled Render Driver ───────────────────────────────────────────

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

fn pixel_seed(seed: u64, x: u32, y: u32, width: u32) -> u64 {
    splitmix64(seed ^ splitmix64(y as u64 * width as u64 + x as u64 + 1))
}

/// Renders the scene into fresh output targets. Work is dealt in
/// `tile_size`² pixel tiles through a single shared atomic counter; each
/// worker owns the pixels of the tiles it pulls, writes them without
/// locking, and the main thread joins everyone before reading the buffers.
pub fn render(scene: &Scene, config: &RenderConfig) -> (RenderTargets, RenderStats) {
    let width = config.width;
    let height = config.height;
    let frame = CameraFrame::new(&scene.camera);

    let mut targets = RenderTargets::new(width, height);
    let writer = PixelWriter::new(&mut targets);

    let halton_x = HaltonSeq::new(2, config.max_samples as usize);
    let halton_y = HaltonSeq::new(3, config.max_samples as usize);
    let halton_theta = HaltonSeq::new(5, config.max_samples as usize);
    let halton_radius = HaltonSeq::new(7, config.max_samples as usize);

    let tile_size = config.tile_size.max(1);
    let tiles_x = (width + tile_size - 1) / tile_size;
    let tiles_y = (height + tile_size - 1) / tile_size;
    let total_tiles = tiles_x * tiles_y;

    let tile_counter = AtomicU32::new(0);
    let sample_counter = AtomicU64::new(0);
    let progress = Mutex::new(ProgressBar::new(total_tiles));

    let threads = if config.threads > 0 {
        config.threads
    } else {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    };
    log::info!(
        "rendering {width}×{height}, {total_tiles} tiles of {tile_size}², {threads} workers"
    );

    let start = Instant::now();
    std::thread::scope(|scope| {
        for _ in 0..threads {
            let frame = &frame;
            let halton_x = &halton_x;
            let halton_y = &halton_y;
            let halton_theta = &halton_theta;
            let halton_radius = &halton_radius;
            let tile_counter = &tile_counter;
            let sample_counter = &sample_counter;
            let progress = &progress;
            scope.spawn(move || {
                let mut rng = SmallRng::from_entropy();
                loop {
                    let tile = tile_counter.fetch_add(1, Ordering::Relaxed);
                    if tile >= total_tiles {
                        break;
                    }
                    let x0 = (tile % tiles_x) * tile_size;
                    let y0 = (tile / tiles_x) * tile_size;
                    let x1 = (x0 + tile_size).min(width);
                    let y1 = (y0 + tile_size).min(height);

                    let mut tile_samples = 0u64;
                    for y in y0..y1 {
                        for x in x0..x1 {
                            if config.seed != 0 {
                                rng = SmallRng::seed_from_u64(pixel_seed(
                                    config.seed,
                                    x,
                                    y,
                                    width,
                                ));
                            }

                            let mut estimator = PixelEstimator::new();
                            let aa_x: f32 = rng.gen();
                            let aa_y: f32 = rng.gen();
                            let lens_theta: f32 = rng.gen();
                            let lens_radius: f32 = rng.gen();

                            for k in 0..config.max_samples as usize {
                                let px = x as f32 + rotate(halton_x[k], aa_x);
                                let py = y as f32 + rotate(halton_y[k], aa_y);
                                let lens = unit_disk(
                                    rotate(halton_theta[k], lens_theta),
                                    rotate(halton_radius[k], lens_radius),
                                );
                                let ray = frame.primary_ray(&scene.camera, px, py, lens);
                                let radiance = match config.integrator {
                                    IntegratorKind::Path => radiance_path(
                                        scene,
                                        &ray,
                                        config.max_bounces,
                                        &mut rng,
                                    ),
                                    IntegratorKind::Whitted => radiance_whitted(
                                        scene,
                                        &ray,
                                        config.max_bounces,
                                        &mut rng,
                                    ),
                                };
                                estimator.add(radiance);
                                tile_samples += 1;

                                if estimator.count() >= config.min_samples
                                    && estimator.converged(config.delta_max)
                                {
                                    break;
                                }
                            }

                            let mut color = estimator.mean();
                            if config.srgb {
                                color = color.linear_to_srgb();
                            }

                            // Depth of the jitter-free center ray; its
                            // direction is unit length, so t is world
                            // distance.
                            let center = frame.center_ray(&scene.camera, x, y);
                            let depth =
                                scene.trace(&center).map_or(f32::INFINITY, |h| h.t);

                            // Safety: this worker pulled the tile, so no
                            // other worker touches these pixels.
                            unsafe {
                                writer.write(
                                    x,
                                    y,
                                    color.to_rgb8(),
                                    depth,
                                    estimator.count() as u16,
                                );
                            }
                        }
                    }
                    sample_counter.fetch_add(tile_samples, Ordering::Relaxed);
                    progress.lock().unwrap().tick();
                }
            });
        }
    });
    progress.lock().unwrap().finish();

    let stats = RenderStats {
        total_samples: sample_counter.load(Ordering::Relaxed),
        elapsed_secs: start.elapsed().as_secs_f64(),
        width,
        height,
        threads,
    };
    (targets, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::geometry::Shape;
    use crate::light::Light;
    use crate::material::{Material, TexturedColor};
    use crate::math::{Color, Point3, Transform, Vec3};
    use crate::scene::{Environment, Node, Scene};

    fn small_scene() -> Scene {
        let sphere = Node::new(Transform::identity()).with_shape(Shape::Sphere, 0);
        Scene {
            root: Node::new(Transform::identity()).add_child(sphere),
            lights: vec![Light::Directional {
                intensity: Color::ones(),
                direction: Vec3::new(0.0, 0.0, -1.0),
            }],
            environment: Environment::Solid(Color::splat(0.1)),
            camera: Camera {
                position: Point3::new(0.0, 0.0, 5.0),
                direction: Vec3::new(0.0, 0.0, -1.0),
                up: Vec3::unit_y(),
                fov_degrees: 40.0,
                focal_dist: 5.0,
                dof: 0.0,
                width: 24,
                height: 16,
            },
            materials: vec![Material {
                diffuse: TexturedColor::constant(Color::new(0.8, 0.2, 0.2)),
                specular: Color::zero(),
                reflection: Color::zero(),
                refraction: Color::zero(),
                ..Material::default()
            }],
            textures: Vec::new(),
        }
    }

    fn small_config(threads: usize) -> RenderConfig {
        RenderConfig {
            width: 24,
            height: 16,
            min_samples: 2,
            max_samples: 4,
            delta_max: 0.01,
            max_bounces: 3,
            tile_size: 8,
            threads,
            seed: 7,
            srgb: true,
            integrator: IntegratorKind::Whitted,
        }
    }

    #[test]
    fn every_pixel_is_written_within_sample_bounds() {
        let scene = small_scene();
        let config = small_config(2);
        let (targets, stats) = render(&scene, &config);
        for &n in &targets.samples {
            assert!(n as u32 >= config.min_samples);
            assert!(n as u32 <= config.max_samples);
        }
        assert!(stats.total_samples >= (24 * 16 * 2) as u64);
        // The sphere fills part of the frame; its depth must be finite and
        // start near t = 4.
        let center = targets.depth[(8 * 24 + 12) as usize];
        assert!((center - 4.0).abs() < 0.05);
        assert!(targets.depth[0].is_infinite());
    }

    #[test]
    fn seeded_renders_are_identical_across_worker_counts() {
        let scene = small_scene();
        let (a, _) = render(&scene, &small_config(1));
        let (b, _) = render(&scene, &small_config(4));
        assert_eq!(a.color, b.color);
        assert_eq!(a.samples, b.samples);
        assert_eq!(a.depth, b.depth);
    }

    #[test]
    fn seeded_renders_are_reproducible() {
        let scene = small_scene();
        let (a, _) = render(&scene, &small_config(3));
        let (b, _) = render(&scene, &small_config(3));
        assert_eq!(a.color, b.color);
    }
}
