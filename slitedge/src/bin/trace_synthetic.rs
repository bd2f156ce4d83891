//! Trace a synthetic multi-slit frame and print the slits found.
//!
//! Usage: `trace_synthetic [config.yaml] [slit_count]`

use anyhow::Context;

use slitedge::synthetic::multi_slit_frame;
use slitedge::{SlitTraceConfig, SlitTracer, TraceFrame, TraceOutcome};

const WIDTH: usize = 600;
const HEIGHT: usize = 400;
const PLATE_SCALE: f64 = 0.2;

fn main() -> anyhow::Result<()> {
    common::log_setup::setup_logging("info", "trace_synthetic", None)?;

    let mut args = std::env::args().skip(1);
    let config: SlitTraceConfig = match args.next() {
        Some(path) => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            serde_yml::from_str(&text).with_context(|| format!("parsing {path}"))?
        }
        None => SlitTraceConfig::multi_slit(),
    };
    let count = args
        .next()
        .map(|s| s.parse::<usize>())
        .transpose()
        .context("slit count must be an integer")?
        .unwrap_or(6);

    let image = multi_slit_frame(WIDTH, HEIGHT, count).render();
    let tracer = SlitTracer::from_config(config)?;

    match tracer.trace(&TraceFrame::new(image), PLATE_SCALE)? {
        TraceOutcome::Traced(result) => {
            let at = result.slits.ref_spectral();
            for (i, slit) in result.slits.iter().enumerate() {
                tracing::info!(
                    slit = i + 1,
                    left = slit.left.eval(at),
                    right = slit.right.eval(at),
                    extrapolated = slit.extrapolated,
                    "traced"
                );
            }
            tracing::info!(run = %result.run_log, "pipeline");
            println!("{}", serde_json::to_string_pretty(&result.diagnostics)?);
        }
        TraceOutcome::NoSlits { stage, run_log } => {
            tracing::warn!(%stage, run = %run_log, "no slits found");
        }
    }
    Ok(())
}
