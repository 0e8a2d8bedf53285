//! # msindex
//!
//! Command line front end of the deconvolution pipeline and the peak indexes.
//!
//! ```bash
//! # deconvolute the MS1 scans of a run into features, one JSON line each
//! msindex deconvolute --scans run.json --out features.jsonl
//!
//! # build a DIA fragment index and extract fragment chromatograms from it
//! msindex index --scans run.json --out run.msdi --dia
//! msindex extract --index run.msdi --queries queries.json
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use log::{error, info};

use msdecon::algorithm::averagine::{AverageResidueModel, DEFAULT_NUM_TEMPLATES};
use msindex::config::EngineConfig;
use msindex::error::Result;
use msindex::extract::cpu::CpuFragmentExtractor;
use msindex::extract::fragment::FragmentQuery;
use msindex::extract::gpu::GpuFragmentExtractor;
use msindex::extract::orchestrator::{ExtractionOrchestrator, ExtractionResult};
use msindex::index::dia::{DiaScanIndex, DiaScanIndexBuilder};
use msindex::index::peak_index::PeakIndex;
use msindex::index::xic::ExtractedIonChromatogram;
use msindex::persist::{read_blob, read_scans_json, write_blob};
use msindex::pipeline::{DeconvolutionRun, FeatureRow};

#[derive(Parser)]
#[command(name = "msindex")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// JSON config, absent fields keep their defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deconvolute scans and aggregate the envelopes into features
    Deconvolute {
        /// JSON array of scans
        #[arg(long)]
        scans: PathBuf,

        /// Output file of JSON lines, stdout if absent
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// MS level of the deconvoluted scans
        #[arg(long, default_value = "1")]
        ms_level: u8,

        /// First one based scan number
        #[arg(long)]
        min_scan: Option<usize>,

        /// Last one based scan number
        #[arg(long)]
        max_scan: Option<usize>,

        /// Number of averagine templates
        #[arg(long, default_value_t = DEFAULT_NUM_TEMPLATES)]
        templates: usize,

        /// Write every envelope of a feature instead of the summary row
        #[arg(long)]
        full: bool,
    },

    /// Build a peak index over MS1 scans, or a DIA index over fragment scans
    Index {
        /// JSON array of scans
        #[arg(long)]
        scans: PathBuf,

        /// Output index file
        #[arg(short, long)]
        out: PathBuf,

        /// Build a DIA fragment index
        #[arg(long)]
        dia: bool,
    },

    /// Extract one ion chromatogram, or all of them, from a peak index
    Xic {
        /// Peak index file
        #[arg(long)]
        index: PathBuf,

        /// Target m/z, all traces are extracted if absent
        #[arg(long, requires = "rt")]
        mz: Option<f64>,

        /// Retention time to start the trace at
        #[arg(long)]
        rt: Option<f64>,
    },

    /// Extract fragment chromatograms from a DIA index
    Extract {
        /// DIA index file
        #[arg(long)]
        index: PathBuf,

        /// JSON array of fragment queries
        #[arg(long)]
        queries: PathBuf,

        /// Output file of JSON lines, stdout if absent
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Use the batched kernel extractor
        #[arg(long)]
        gpu: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Err(e) = run(cli) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Deconvolute { scans, out, ms_level, min_scan, max_scan, templates, full } => {
            run_deconvolute(&config, &scans, out.as_deref(), ms_level, min_scan, max_scan, templates, full)
        }
        Commands::Index { scans, out, dia } => run_index(&config, &scans, &out, dia),
        Commands::Xic { index, mz, rt } => run_xic(&config, &index, mz.zip(rt)),
        Commands::Extract { index, queries, out, gpu } => run_extract(&config, &index, &queries, out.as_deref(), gpu),
    }
}

fn output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

#[allow(clippy::too_many_arguments)]
fn run_deconvolute(
    config: &EngineConfig,
    scans: &Path,
    out: Option<&Path>,
    ms_level: u8,
    min_scan: Option<usize>,
    max_scan: Option<usize>,
    templates: usize,
    full: bool,
) -> Result<()> {
    let scans = read_scans_json(scans)?;
    let model = AverageResidueModel::new(templates);

    let features = DeconvolutionRun::new(&model, &config.deconvolution, config.aggregation.clone())?
        .with_scan_filter(move |scan| scan.ms_level == ms_level)
        .with_scan_range(min_scan, max_scan)
        .run(&scans)?;

    let mut writer = output(out)?;
    for feature in &features {
        if full {
            serde_json::to_writer(&mut writer, feature)?;
        } else {
            serde_json::to_writer(&mut writer, &FeatureRow::from(feature))?;
        }
        writeln!(writer)?;
    }
    writer.flush()?;

    info!("wrote {} features", features.len());
    Ok(())
}

fn run_index(config: &EngineConfig, scans: &Path, out: &Path, dia: bool) -> Result<()> {
    let scans = read_scans_json(scans)?;

    let blob = if dia {
        let index = DiaScanIndexBuilder::new(config.dia.isolation_window_tolerance_ppm).build(&scans)?;
        info!("DIA index: {} scans in {} windows, {} peaks", index.scan_count(), index.window_count(), index.peak_count());
        index.serialize_index()?
    } else {
        let index = PeakIndex::build_filtered(&scans, |scan| scan.ms_level == 1);
        info!("peak index: {} scans, {} peaks", index.scan_count(), index.peak_count());
        index.serialize_index()?
    };

    write_blob(out, &blob)?;
    info!("wrote {} bytes to {}", blob.len(), out.display());
    Ok(())
}

fn run_xic(config: &EngineConfig, index: &Path, target: Option<(f64, f64)>) -> Result<()> {
    let index = PeakIndex::deserialize_index(&read_blob(index)?)?;
    let trace = &config.trace;

    let traces = match target {
        Some((mz, rt)) => {
            let peaks = index.extract_trace(mz, rt, trace.tolerance_ppm, trace.max_missed_scans, trace.half_width_limit());
            vec![ExtractedIonChromatogram::new(peaks)]
        }
        None => index.all_traces(trace.tolerance_ppm, trace.max_missed_scans, trace.half_width_limit(), trace.min_peaks),
    };

    let mut writer = output(None)?;
    for xic in &traces {
        serde_json::to_writer(&mut writer, xic)?;
        writeln!(writer)?;
    }
    writer.flush()?;

    info!("wrote {} traces", traces.len());
    Ok(())
}

fn run_extract(config: &EngineConfig, index: &Path, queries: &Path, out: Option<&Path>, gpu: bool) -> Result<()> {
    let index = DiaScanIndex::deserialize_index(&read_blob(index)?)?;
    let mut queries: Vec<FragmentQuery> = serde_json::from_reader(BufReader::new(File::open(queries)?))?;
    // queries without a tolerance use the configured one
    for query in queries.iter_mut().filter(|q| q.tolerance_ppm <= 0.0) {
        query.tolerance_ppm = config.dia.fragment_tolerance_ppm as f32;
    }
    let parallelism = config.dia.max_parallelism;

    let extracted = if gpu {
        ExtractionOrchestrator::new(&index, GpuFragmentExtractor::new).extract_all(&queries, parallelism)?
    } else {
        ExtractionOrchestrator::new(&index, CpuFragmentExtractor::new).extract_all(&queries, parallelism)?
    };

    write_extraction(&extracted, output(out)?)?;
    info!("extracted {} data points for {} queries", extracted.rt_buffer.len(), queries.len());
    Ok(())
}

fn write_extraction(extracted: &ExtractionResult, mut writer: Box<dyn Write>) -> Result<()> {
    for result in &extracted.results {
        let (rt, intensity) = extracted.data_points(result);
        let line = serde_json::json!({
            "query_id": result.query_id,
            "total_intensity": result.total_intensity,
            "retention_time": rt,
            "intensity": intensity,
        });
        serde_json::to_writer(&mut writer, &line)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}
