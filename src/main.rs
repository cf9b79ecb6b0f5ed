//! Headless driver for a scroll-linked frame sequence.
//!
//! Mounts the sequence from a YAML config, then either sweeps the scroll
//! position and writes one PNG per step, or takes commands on stdin.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail, ensure};
use clap::{ArgAction, Parser};
use image::RgbaImage;
use tokio::select;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use scroll_sequence::ScrollSequence;
use scroll_sequence::config::{Configuration, PresentationOptions};
use scroll_sequence::processing::color::apply_contrast_brightness;
use scroll_sequence::processing::mapping::map_progress_to_frame;
use scroll_sequence::tasks::loader::FsFrameSource;
use scroll_sequence::tasks::surface::{ElementMetrics, SharedViewport};

const REPORT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(
    name = "scroll-sequence",
    version,
    about = "Scroll-linked frame sequence renderer"
)]
struct Args {
    /// Path to YAML config
    #[arg(value_name = "CONFIG")]
    config: PathBuf,
    /// Directory for PNGs written by --sweep
    #[arg(long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,
    /// Sweep scroll progress from 0 to 1 in STEPS steps, write one PNG per step, then exit
    #[arg(long, value_name = "STEPS")]
    sweep: Option<u32>,
    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Scroll(f32),
    Resize(ElementMetrics),
    Snapshot(PathBuf),
    Reload,
    Quit,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or_else(|| anyhow!("empty command"))?;
        let args: Vec<&str> = parts.collect();
        match (verb, args.as_slice()) {
            ("scroll", [p]) => Ok(Command::Scroll(parse_number(p, "progress")?)),
            ("resize", [w, h]) => Ok(Command::Resize(ElementMetrics {
                css_width: parse_number(w, "width")?,
                css_height: parse_number(h, "height")?,
                device_pixel_ratio: 1.0,
            })),
            ("resize", [w, h, ratio]) => Ok(Command::Resize(ElementMetrics {
                css_width: parse_number(w, "width")?,
                css_height: parse_number(h, "height")?,
                device_pixel_ratio: parse_number(ratio, "device pixel ratio")?,
            })),
            ("snapshot", [path]) => Ok(Command::Snapshot(PathBuf::from(path))),
            ("reload", []) => Ok(Command::Reload),
            ("quit", []) | ("exit", []) => Ok(Command::Quit),
            _ => bail!("unrecognised command {line:?}"),
        }
    }
}

fn parse_number(raw: &str, what: &str) -> Result<f32> {
    raw.parse::<f32>()
        .with_context(|| format!("invalid {what} {raw:?}"))
}

fn init_tracing(verbosity: u8) -> Result<()> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if verbosity > 0 {
        let level = if verbosity == 1 {
            Level::DEBUG
        } else {
            Level::TRACE
        };
        filter = filter.add_directive(format!("scroll_sequence={level}").parse()?);
    }
    fmt().with_env_filter(filter).with_target(false).compact().init();
    Ok(())
}

fn load_config(path: &Path) -> Result<Configuration> {
    Configuration::from_yaml_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?
        .validated()
        .context("invalid configuration values")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let cfg = load_config(&args.config)?;
    info!(
        frames = cfg.frame_count,
        path = %cfg.path,
        zoom = cfg.zoom,
        paint_interval = %humantime::format_duration(cfg.paint_interval),
        "loaded configuration from {}",
        args.config.display()
    );

    let viewport = SharedViewport::new(Some(cfg.surface.metrics()));
    let (progress_tx, progress_rx) = watch::channel(0.0f32);
    let mut sequence = ScrollSequence::mount(
        cfg,
        Arc::new(FsFrameSource),
        Arc::new(viewport.clone()),
        progress_rx,
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let res = match args.sweep {
        Some(steps) => run_sweep(&sequence, &progress_tx, steps, &args.output_dir, &cancel).await,
        None => run_commands(&mut sequence, &progress_tx, &viewport, &args.config, &cancel).await,
    };

    sequence.teardown().await;
    res
}

async fn run_sweep(
    sequence: &ScrollSequence,
    progress_tx: &watch::Sender<f32>,
    steps: u32,
    output_dir: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let ready = select! {
        _ = cancel.cancelled() => return Ok(()),
        r = sequence.wait_ready() => r,
    };
    if ready.is_offline() {
        warn!(total = ready.total, "no frame loaded; sweep output will be blank");
    } else {
        info!(
            loaded = ready.loaded,
            errors = ready.error_count(),
            "frames ready; starting sweep"
        );
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let frame_count = sequence.config().frame_count;
    let presentation = sequence.config().presentation;
    let mut reports = sequence.reports();
    let mut last_generation = reports.borrow().as_ref().map_or(0, |r| r.generation);

    for step in 0..=steps {
        if cancel.is_cancelled() {
            break;
        }
        let progress = if steps == 0 {
            0.0
        } else {
            step as f32 / steps as f32
        };
        let expected = map_progress_to_frame(progress, frame_count);
        progress_tx.send_replace(progress);

        let report = tokio::time::timeout(
            REPORT_TIMEOUT,
            reports.wait_for(|r| {
                r.as_ref()
                    .is_some_and(|r| r.generation > last_generation && r.requested == expected)
            }),
        )
        .await
        .with_context(|| format!("timed out waiting for frame {expected}"))??
        .clone()
        .context("render report missing")?;
        last_generation = report.generation;

        let path = output_dir.join(format!("step-{step:04}-frame-{:03}.png", report.requested));
        match export_snapshot(&report.surface, &presentation, &path) {
            Ok(()) => debug!(step, frame = report.requested, outcome = ?report.outcome, "wrote {}", path.display()),
            Err(err) => warn!(step, "skipping snapshot: {err:#}"),
        }
    }

    info!(steps, dir = %output_dir.display(), "sweep complete");
    Ok(())
}

async fn run_commands(
    sequence: &mut ScrollSequence,
    progress_tx: &watch::Sender<f32>,
    viewport: &SharedViewport,
    config_path: &Path,
    cancel: &CancellationToken,
) -> Result<()> {
    let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
    // Plain thread: a blocked stdin read must not hold up runtime shutdown.
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut announced = false;

    loop {
        select! {
            _ = cancel.cancelled() => break,

            r = sequence.wait_ready(), if !announced => {
                announced = true;
                if r.is_offline() {
                    warn!(total = r.total, "every frame failed to load");
                } else {
                    info!(loaded = r.loaded, errors = r.error_count(), "frames ready");
                }
            }

            line = line_rx.recv() => {
                let Some(line) = line else {
                    info!("stdin closed; initiating shutdown");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match line.parse::<Command>() {
                    Ok(command) => command,
                    Err(err) => {
                        warn!("{err:#}");
                        continue;
                    }
                };
                match command {
                    Command::Scroll(p) => {
                        progress_tx.send_replace(p);
                    }
                    Command::Resize(metrics) => {
                        viewport.set(Some(metrics));
                        sequence.notify_resize();
                    }
                    Command::Snapshot(path) => {
                        let report = sequence.reports().borrow().clone();
                        let Some(report) = report else {
                            warn!("nothing rendered yet");
                            continue;
                        };
                        match export_snapshot(&report.surface, &sequence.config().presentation, &path) {
                            Ok(()) => info!(frame = report.requested, "wrote {}", path.display()),
                            Err(err) => warn!("snapshot failed: {err:#}"),
                        }
                    }
                    Command::Reload => match load_config(config_path) {
                        Ok(cfg) => {
                            if sequence.reconfigure(cfg).await {
                                announced = false;
                            }
                        }
                        Err(err) => warn!("reload rejected: {err:#}"),
                    },
                    Command::Quit => break,
                }
            }
        }
    }
    Ok(())
}

fn export_snapshot(
    surface: &RgbaImage,
    presentation: &PresentationOptions,
    path: &Path,
) -> Result<()> {
    ensure!(
        surface.width() > 0 && surface.height() > 0,
        "surface has zero area"
    );
    let mut img = surface.clone();
    apply_contrast_brightness(&mut img, presentation.contrast, presentation.brightness);
    img.save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!("scroll 0.25".parse::<Command>().unwrap(), Command::Scroll(0.25));
        assert_eq!(
            "resize 300 500 2".parse::<Command>().unwrap(),
            Command::Resize(ElementMetrics {
                css_width: 300.0,
                css_height: 500.0,
                device_pixel_ratio: 2.0,
            })
        );
        assert_eq!(
            "  resize 10 20 ".parse::<Command>().unwrap(),
            Command::Resize(ElementMetrics {
                css_width: 10.0,
                css_height: 20.0,
                device_pixel_ratio: 1.0,
            })
        );
        assert_eq!(
            "snapshot out/a.png".parse::<Command>().unwrap(),
            Command::Snapshot(PathBuf::from("out/a.png"))
        );
        assert_eq!("reload".parse::<Command>().unwrap(), Command::Reload);
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_malformed_commands() {
        for line in ["", "scroll", "scroll abc", "resize 1", "resize a b", "jump 3", "quit now"] {
            assert!(line.parse::<Command>().is_err(), "accepted {line:?}");
        }
    }

    #[test]
    fn snapshot_applies_presentation_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.png");
        let surface = RgbaImage::from_pixel(2, 2, image::Rgba([100, 100, 100, 128]));
        let presentation = PresentationOptions {
            contrast: 1.0,
            brightness: 1.1,
        };
        export_snapshot(&surface, &presentation, &path).unwrap();
        let written = image::open(&path).unwrap().to_rgba8();
        assert_eq!(written.get_pixel(0, 0).0, [110, 110, 110, 128]);
    }

    #[test]
    fn empty_surface_is_not_exported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.png");
        let err = export_snapshot(&RgbaImage::new(0, 0), &PresentationOptions::default(), &path);
        assert!(err.is_err());
        assert!(!path.exists());
    }
}
