use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::capture::FrameContext;
use crate::config::AppConfig;
use crate::contour::adaptive_resolution;
use crate::interpreter::Interpreter;
use crate::plot_target::find_contour_points_expr;
use crate::render::{PixmapCanvas, RenderReport, SvgCanvas};
use crate::scene::SceneSpec;
use crate::script_runner::{RunOptions, RunRequest, ScriptRunner};
use crate::workspace::Workspace;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file (runner limits, render constants, palette)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every frame's script in a scene and render it
    Render {
        /// Scene JSON file
        #[arg(long)]
        scene: PathBuf,

        /// Output image (.svg or .png)
        #[arg(long)]
        out: PathBuf,

        /// Output width (overrides the scene)
        #[arg(long)]
        width: Option<u32>,

        /// Output height (overrides the scene)
        #[arg(long)]
        height: Option<u32>,

        /// Frame id to draw as selected
        #[arg(long)]
        select: Option<u64>,
    },
    /// Run one script in an identity frame and print the result as JSON
    Run {
        /// Rhai script file
        #[arg(long)]
        script: PathBuf,

        /// Frame parameters as name=value
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, f64)>,
    },
    /// Trace the zero set of an expression in x and y and print polylines as JSON
    Contour {
        /// Rhai expression, e.g. "x**2 + y**2 - 16"
        #[arg(long)]
        expr: String,

        #[arg(long, default_value_t = -10.0, allow_negative_numbers = true)]
        x_min: f64,

        #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
        x_max: f64,

        #[arg(long, default_value_t = -10.0, allow_negative_numbers = true)]
        y_min: f64,

        #[arg(long, default_value_t = 10.0, allow_negative_numbers = true)]
        y_max: f64,

        /// Grid resolution (default: adaptive to a 40 px/unit canvas)
        #[arg(long)]
        resolution: Option<usize>,
    },
}

fn parse_param(text: &str) -> Result<(String, f64), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", text))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|e| format!("invalid value for '{}': {}", name, e))?;
    if !value.is_finite() {
        return Err(format!("value for '{}' must be finite", name));
    }
    Ok((name.trim().to_string(), value))
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path).map_err(anyhow::Error::msg)?,
        None => AppConfig::default(),
    };

    match cli.command {
        Commands::Render { scene, out, width, height, select } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(render_scene(config, &scene, &out, width, height, select))?;
        }
        Commands::Run { script, params } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(run_script(config, &script, params))?;
        }
        Commands::Contour { expr, x_min, x_max, y_min, y_max, resolution } => {
            let resolution = resolution.unwrap_or_else(|| adaptive_resolution((x_max - x_min).max(y_max - y_min), 40.0));
            let polylines = find_contour_points_expr(&expr, x_min, x_max, y_min, y_max, resolution)
                .map_err(anyhow::Error::msg)?;
            let lines: Vec<Vec<[f64; 2]>> = polylines
                .iter()
                .map(|line| line.iter().map(|p| [p.x, p.y]).collect())
                .collect();
            println!("{}", serde_json::to_string_pretty(&lines)?);
        }
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderSummary<'a> {
    output: &'a Path,
    frames: usize,
    scripts_run: usize,
    scripts_failed: usize,
    report: &'a RenderReport,
}

async fn render_scene(
    config: AppConfig,
    scene_path: &Path,
    out: &Path,
    width: Option<u32>,
    height: Option<u32>,
    select: Option<u64>,
) -> Result<()> {
    let mut spec = SceneSpec::from_file(scene_path).map_err(anyhow::Error::msg)?;
    if let Some(w) = width {
        spec.width = w;
    }
    if let Some(h) = height {
        spec.height = h;
    }
    spec.validate().map_err(anyhow::Error::msg)?;

    let mut workspace = Workspace::new(config);
    workspace.initialize().await.map_err(|e| anyhow::anyhow!("{}", e))?;
    let scripts = spec.build(&mut workspace)?;
    log::info!("Loaded scene {:?}: {} frames, {} scripts", scene_path, spec.frame_count(), scripts.len());

    let mut failed = 0;
    for (id, code) in &scripts {
        let result = workspace.run_frame_code(*id, code, RunOptions::default()).await;
        if let Some(error) = &result.error {
            failed += 1;
            log::warn!("Script for {} failed: {}", id, error);
        }
    }
    if let Some(id) = select {
        workspace.select(Some(crate::frame::FrameId(id)))?;
    }

    let extension = out.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
    let report = match extension.as_deref() {
        Some("svg") => {
            let mut canvas = SvgCanvas::new(spec.width as f64, spec.height as f64);
            let report = workspace.render(&mut canvas);
            std::fs::write(out, canvas.finish()).with_context(|| format!("writing {:?}", out))?;
            report
        }
        Some("png") => {
            let mut canvas = PixmapCanvas::new(spec.width, spec.height)
                .ok_or_else(|| anyhow::anyhow!("cannot allocate a {}x{} canvas", spec.width, spec.height))?;
            let report = workspace.render(&mut canvas);
            canvas.write_image(out).map_err(anyhow::Error::msg)?;
            report
        }
        _ => bail!("unsupported output format {:?} (use .svg or .png)", out),
    };

    let summary = RenderSummary {
        output: out,
        frames: workspace.registry().len(),
        scripts_run: scripts.len(),
        scripts_failed: failed,
        report: &report,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run_script(config: AppConfig, script: &Path, params: Vec<(String, f64)>) -> Result<()> {
    let code = std::fs::read_to_string(script).with_context(|| format!("reading {:?}", script))?;

    let interpreter = Interpreter::with_rhai(config.runner.clone());
    interpreter.initialize().await?;
    let runner = ScriptRunner::spawn(interpreter, config.runner);

    let context = FrameContext {
        parameters: params.into_iter().collect(),
        ..Default::default()
    };
    let result = runner.run(RunRequest::new(code, context)).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.success {
        bail!("script failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("k=2.5"), Ok(("k".to_string(), 2.5)));
        assert!(parse_param("k").is_err());
        assert!(parse_param("k=abc").is_err());
        assert!(parse_param("k=inf").is_err());
    }

    #[test]
    fn test_contour_args() {
        let cli = Cli::try_parse_from(["frameboard", "contour", "--expr", "x*y - 1", "--x-min", "-4"]).unwrap();
        match cli.command {
            Commands::Contour { expr, x_min, resolution, .. } => {
                assert_eq!(expr, "x*y - 1");
                assert_eq!(x_min, -4.0);
                assert_eq!(resolution, None);
            }
            _ => panic!("expected contour"),
        }
    }
}
