//! stereogram-bench: time how fast the pipeline regenerates after each
//! kind of parameter change.
//!
//! Each scenario resets the pipeline, then repeatedly changes one
//! parameter and pulls the output, so it measures only the stages that
//! parameter invalidates:
//!
//! - `rescale`: cycle the maximum depth
//! - `offset-zero` / `offset-centre`: reselect an offset strategy
//! - `texture`: reselect the texture source (resize + rings)
//! - `map`: reselect the depth-map source (everything past decoding)
//!
//! Both sources are wrapped in a [`CachedSource`], so reselecting one
//! reuses its decoded image rather than reading the file again.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin stereogram-bench -- [OPTIONS] <DEPTH> <TEXTURE>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use serde::Serialize;
use stereogram::FileSource;
use stereogram_pipeline::{
    CachedSource, OffsetStrategyKind, RecomputeCounts, SourceRef, StereogramConfig,
    StereogramPipeline,
};

/// Maximum depth every scenario starts from.
const BENCH_MAX_DEPTH: i32 = 30;

/// Regeneration timings for the incremental stereogram pipeline.
#[derive(Parser)]
#[command(name = "stereogram-bench", version)]
struct Cli {
    /// Depth-map image path.
    depth: PathBuf,

    /// Texture image path.
    texture: PathBuf,

    /// Scenarios to run (default: all, in order).
    #[arg(long, value_enum, value_delimiter = ',')]
    scenario: Vec<Scenario>,

    /// Renders per scenario.
    #[arg(long, default_value_t = 200, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    iterations: usize,

    /// Full renders before timing starts.
    #[arg(long, default_value_t = 20)]
    warmup: usize,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output results as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,

    /// Full pipeline config as a JSON string.
    ///
    /// Applied on every reset in place of the defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Log each stage as it recomputes (very noisy).
    #[arg(short, long)]
    verbose: bool,
}

/// Regeneration scenario.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
enum Scenario {
    /// Change the maximum depth.
    Rescale,
    /// Reselect the zero offset strategy.
    OffsetZero,
    /// Reselect the centre-align offset strategy.
    OffsetCentre,
    /// Reselect the texture source.
    Texture,
    /// Reselect the depth-map source.
    Map,
}

impl Scenario {
    const ALL: [Self; 5] = [
        Self::Rescale,
        Self::OffsetZero,
        Self::OffsetCentre,
        Self::Texture,
        Self::Map,
    ];

    const fn title(self) -> &'static str {
        match self {
            Self::Rescale => "Rescale",
            Self::OffsetZero => "Texture offset zero",
            Self::OffsetCentre => "Texture offset centre",
            Self::Texture => "Raw texture",
            Self::Map => "Depth map update",
        }
    }
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Serialize, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }
}

/// Timing for one scenario in one run.
#[derive(Debug, Clone, Serialize)]
struct ScenarioReport {
    scenario: Scenario,
    iterations: usize,
    /// Wall-clock time for all iterations (seconds).
    #[serde(with = "duration_serde")]
    total: Duration,
    /// Stage recomputes during the timed loop.
    recomputes: RecomputeCounts,
}

impl ScenarioReport {
    #[allow(clippy::cast_precision_loss)]
    fn per_render_ms(&self) -> f64 {
        self.total.as_secs_f64() * 1000.0 / self.iterations as f64
    }

    #[allow(clippy::cast_precision_loss)]
    fn renders_per_second(&self) -> f64 {
        let secs = self.total.as_secs_f64();
        if secs > 0.0 {
            self.iterations as f64 / secs
        } else {
            f64::INFINITY
        }
    }

    fn report(&self) -> String {
        let r = &self.recomputes;
        format!(
            "{}\n  Took: {:.3} s\n  Took: {:.3} ms per stereogram\n  Rate: {:.1} stereograms per second\n  \
             Recomputes: depth_map={} rescaled={} texture_image={} texture_data={} texture_grid={} buffer={} stereogram={}",
            self.scenario.title(),
            self.total.as_secs_f64(),
            self.per_render_ms(),
            self.renders_per_second(),
            r.depth_map,
            r.rescaled,
            r.texture_image,
            r.texture_data,
            r.texture_grid,
            r.buffer,
            r.stereogram,
        )
    }
}

/// Everything needed to reset and drive one pipeline.
struct Bench {
    pipeline: StereogramPipeline,
    depth: SourceRef,
    texture: SourceRef,
    config: StereogramConfig,
}

impl Bench {
    fn reset(&self) -> Result<(), stereogram_pipeline::PipelineError> {
        self.pipeline.set_depth_source(Rc::clone(&self.depth));
        self.pipeline.set_texture_source(Rc::clone(&self.texture));
        self.pipeline.apply_config(&self.config)?;
        self.pipeline.set_offset_strategy(OffsetStrategyKind::Zero);
        self.pipeline.output()?;
        Ok(())
    }

    fn warmup(&self, renders: usize) -> Result<(), stereogram_pipeline::PipelineError> {
        self.reset()?;
        for _ in 0..renders {
            self.pipeline.set_texture_source(Rc::clone(&self.texture));
            self.pipeline.set_depth_source(Rc::clone(&self.depth));
            self.pipeline.output()?;
        }
        Ok(())
    }

    fn run(
        &self,
        scenario: Scenario,
        iterations: usize,
    ) -> Result<ScenarioReport, stereogram_pipeline::PipelineError> {
        self.reset()?;
        let before = self.pipeline.recompute_counts();
        let start = Instant::now();
        for i in 0..iterations {
            match scenario {
                Scenario::Rescale => {
                    // 0..40 covers the whole range a viewer would pick from.
                    self.pipeline
                        .set_max_depth(i32::try_from(i % 40).unwrap_or_default());
                }
                Scenario::OffsetZero => self.pipeline.set_offset_strategy(OffsetStrategyKind::Zero),
                Scenario::OffsetCentre => self
                    .pipeline
                    .set_offset_strategy(OffsetStrategyKind::CentreAlign),
                Scenario::Texture => self.pipeline.set_texture_source(Rc::clone(&self.texture)),
                Scenario::Map => self.pipeline.set_depth_source(Rc::clone(&self.depth)),
            }
            self.pipeline.output()?;
        }
        let total = start.elapsed();
        Ok(ScenarioReport {
            scenario,
            iterations,
            total,
            recomputes: self.pipeline.recompute_counts().since(&before),
        })
    }
}

/// Build the [`StereogramConfig`] every scenario resets to.
fn config_from_cli(cli: &Cli) -> Result<StereogramConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    Ok(StereogramConfig {
        max_depth: BENCH_MAX_DEPTH,
        ..StereogramConfig::default()
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    stereogram::init_logging(cli.verbose);

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let scenarios = if cli.scenario.is_empty() {
        Scenario::ALL.to_vec()
    } else {
        cli.scenario.clone()
    };

    let bench = Bench {
        pipeline: StereogramPipeline::new(),
        depth: Rc::new(CachedSource::new(Rc::new(FileSource::new(&cli.depth)))),
        texture: Rc::new(CachedSource::new(Rc::new(FileSource::new(&cli.texture)))),
        config,
    };

    eprintln!("Depth map: {}", cli.depth.display());
    eprintln!("Texture: {}", cli.texture.display());
    eprintln!("Config: {:#?}", bench.config);
    eprintln!("Iterations: {}, runs: {}", cli.iterations, cli.runs);
    eprintln!();

    eprintln!("Warming up ({} renders)...", cli.warmup);
    if let Err(e) = bench.warmup(cli.warmup) {
        eprintln!("Pipeline error: {e}");
        return ExitCode::FAILURE;
    }

    let mut all_reports = Vec::with_capacity(cli.runs * scenarios.len());

    for run in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, cli.runs);
        }
        for &scenario in &scenarios {
            match bench.run(scenario, cli.iterations) {
                Ok(report) => {
                    if !cli.json {
                        println!("{}", report.report());
                        println!();
                    }
                    all_reports.push(report);
                }
                Err(e) => {
                    eprintln!("Pipeline error: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    if cli.json {
        match serde_json::to_string_pretty(&all_reports) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing results: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else if cli.runs > 1 {
        print_multi_run_summary(&scenarios, &all_reports);
    }

    ExitCode::SUCCESS
}

/// Print the mean per-render time of each scenario across runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(scenarios: &[Scenario], reports: &[ScenarioReport]) {
    println!(
        "Summary ({} runs)\n{}",
        reports.len() / scenarios.len().max(1),
        "=".repeat(60),
    );
    println!("{:<28} {:>10} {:>10} {:>10}", "Scenario", "Min (ms)", "Mean (ms)", "Max (ms)");
    println!("{}", "-".repeat(60));

    for &scenario in scenarios {
        let times: Vec<f64> = reports
            .iter()
            .filter(|r| r.scenario == scenario)
            .map(ScenarioReport::per_render_ms)
            .collect();
        if times.is_empty() {
            continue;
        }
        let min = times.iter().copied().reduce(f64::min).unwrap_or(0.0);
        let max = times.iter().copied().reduce(f64::max).unwrap_or(0.0);
        let mean = times.iter().sum::<f64>() / times.len() as f64;
        println!(
            "{:<28} {min:>10.3} {mean:>10.3} {max:>10.3}",
            scenario.title()
        );
    }
}
