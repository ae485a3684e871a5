use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use ise_monitor::analysis::{self, CurveSource, LiveReport};
use ise_monitor::analyte::Analyte;
use ise_monitor::backend::AnyBackend;
use ise_monitor::calibration::{fit, CalibrationCurve, CalibrationPoint, MeasurementOutcome};
use ise_monitor::config::AppConfig;
use ise_monitor::context::AppContext;
use ise_monitor::liveness::SystemClock;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "ise_cli",
    about = "Water-quality monitor: concentrations, calibration and device status"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// JSON configuration file (defaults apply when missing)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Use an in-process simulated device instead of the configured database
    #[arg(long, global = true)]
    simulate: bool,
    /// Seed for the simulated device
    #[arg(long, global = true, default_value_t = 0)]
    seed: u64,
    /// Override the fetch and measurement delays, in seconds
    #[arg(long, global = true)]
    delay_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert one electrode voltage to a concentration
    Compute {
        #[arg(long)]
        analyte: Analyte,
        #[arg(long, allow_hyphen_values = true)]
        voltage: f64,
        /// Calibration intercept; requires --slope
        #[arg(long, requires = "slope", allow_hyphen_values = true)]
        e0: Option<f64>,
        #[arg(long, requires = "e0", allow_hyphen_values = true)]
        slope: Option<f64>,
    },
    /// Fit a calibration curve to concentration:voltage pairs
    Fit {
        /// Point as `<concentration µM>:<voltage V>`, repeat at least three times
        #[arg(long = "point", required = true, allow_hyphen_values = true)]
        points: Vec<String>,
    },
    /// Request readings and print live reports
    Monitor {
        /// Number of refreshes
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Follow the live snapshot instead of requesting readings
        #[arg(long)]
        watch: bool,
    },
    /// Print recent history as reports
    History {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Evaluate the device heartbeat
    Status,
    /// Measure every standard solution of an analyte and fit a curve
    Calibrate {
        #[arg(long)]
        analyte: Analyte,
    },
}

fn main() -> ExitCode {
    ise_monitor::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Compute {
            analyte,
            voltage,
            e0,
            slope,
        } => run_compute(analyte, voltage, e0.zip(slope)),
        Commands::Fit { points } => run_fit(&points),
        command => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("starting tokio runtime")?;
            runtime.block_on(run_connected(&cli.global, command))
        }
    }
}

fn load_config(global: &GlobalArgs) -> AppConfig {
    let mut config = match &global.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::default(),
    };
    if let Some(delay) = global.delay_secs {
        config.calibration.measurement_delay_secs = delay;
        config.monitoring.fetch_delay_secs = delay;
    }
    config
}

async fn run_connected(global: &GlobalArgs, command: Commands) -> Result<ExitCode> {
    let config = load_config(global);
    let backend = if global.simulate {
        AnyBackend::simulated(global.seed)
    } else {
        AnyBackend::from_config(&config.database)
    };
    let ctx = AppContext::new(backend, &config, Arc::new(SystemClock));
    ctx.load_calibration()
        .await
        .context("loading stored calibration curves")?;

    match command {
        Commands::Monitor { count, watch } => run_monitor(&ctx, count, watch).await,
        Commands::History { limit } => run_history(&ctx, limit).await,
        Commands::Status => run_status(&ctx).await,
        Commands::Calibrate { analyte } => run_calibrate(&ctx, analyte).await,
        Commands::Compute { .. } | Commands::Fit { .. } => {
            bail!("offline command routed to a connected session")
        }
    }
}

#[derive(Serialize)]
struct ComputePayload {
    analyte: Analyte,
    voltage: f64,
    concentration_um: Option<f64>,
    source: CurveSource,
    safe: bool,
}

fn run_compute(
    analyte: Analyte,
    voltage: f64,
    curve: Option<(f64, f64)>,
) -> Result<ExitCode> {
    let curve = curve
        .map(|(e0, slope)| CalibrationCurve::new(e0, slope))
        .filter(CalibrationCurve::is_usable);
    let (concentration_um, source) =
        analysis::compute_with_source(analyte, voltage, curve, curve.is_some());
    print_json(&ComputePayload {
        analyte,
        voltage,
        // JSON has no NaN
        concentration_um: concentration_um.is_finite().then_some(concentration_um),
        source,
        safe: analysis::is_safe(analyte, concentration_um),
    })?;
    Ok(ExitCode::SUCCESS)
}

fn parse_point(raw: &str) -> Result<CalibrationPoint> {
    let (concentration, voltage) = raw
        .split_once(':')
        .ok_or_else(|| anyhow!("point '{}' is not <concentration>:<voltage>", raw))?;
    let concentration: f64 = concentration
        .trim()
        .parse()
        .with_context(|| format!("concentration in '{}'", raw))?;
    let voltage: f64 = voltage
        .trim()
        .parse()
        .with_context(|| format!("voltage in '{}'", raw))?;
    if concentration <= 0.0 {
        bail!("concentration in '{}' must be positive", raw);
    }
    Ok(CalibrationPoint::from_concentration(concentration, voltage))
}

fn run_fit(raw_points: &[String]) -> Result<ExitCode> {
    let points = raw_points
        .iter()
        .map(|raw| parse_point(raw))
        .collect::<Result<Vec<_>>>()?;
    match fit(&points) {
        Ok(curve) => {
            print_json(&curve)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("Regression failed: {err}");
            Ok(ExitCode::from(2))
        }
    }
}

async fn run_monitor(
    ctx: &AppContext<AnyBackend>,
    count: usize,
    watch: bool,
) -> Result<ExitCode> {
    let mut all_safe = true;
    if watch {
        let reports = ctx.monitor().subscribe_reports();
        let mut reports = reports.take(count);
        while let Some(report) = reports.next().await {
            all_safe &= report.all_safe();
            print_report(&report)?;
        }
    } else {
        for _ in 0..count {
            let report = ctx.monitor().refresh().await.context("refreshing readings")?;
            all_safe &= report.all_safe();
            print_report(&report)?;
        }
    }

    if let Some(text) = ctx.monitor().share_text() {
        eprintln!("{text}");
    }
    Ok(if all_safe {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

async fn run_history(ctx: &AppContext<AnyBackend>, limit: Option<usize>) -> Result<ExitCode> {
    let mut reports = ctx.monitor().history().await.context("reading history")?;
    if let Some(limit) = limit {
        reports.truncate(limit);
    }
    for report in &reports {
        print_report(report)?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_status(ctx: &AppContext<AnyBackend>) -> Result<ExitCode> {
    let status = ctx
        .connection()
        .check_now()
        .await
        .context("reading device heartbeat")?;
    print_json(&status)?;
    Ok(if status.connected {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

async fn run_calibrate(ctx: &AppContext<AnyBackend>, analyte: Analyte) -> Result<ExitCode> {
    let calibration = ctx.calibration();
    calibration.select_analyte(analyte)?;

    let mut fitted = None;
    for &concentration_um in analyte.calibration_concentrations_um() {
        calibration.select_concentration(concentration_um)?;
        if let Some(memory) = ctx.backend().as_memory() {
            memory.set_simulated_level(analyte, concentration_um);
        }
        eprintln!(
            "Measuring {} at {} µM (waiting {:?})",
            analyte,
            concentration_um,
            calibration.measurement_delay()
        );
        match calibration.measure().await? {
            MeasurementOutcome::Fitted(curve) => fitted = Some(curve),
            MeasurementOutcome::RegressionFailed(err) => eprintln!("Regression failed: {err}"),
            MeasurementOutcome::BufferNotFull { .. } | MeasurementOutcome::Discarded => {}
        }
        print_json(&calibration.progress()?)?;
    }

    match fitted {
        Some(curve) => {
            print_json(&curve)?;
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::from(2)),
    }
}

#[derive(Serialize)]
struct ReadingPayload {
    analyte: Analyte,
    voltage: f64,
    concentration_um: Option<f64>,
    source: CurveSource,
    safe: bool,
}

#[derive(Serialize)]
struct ReportPayload<'a> {
    key: Option<&'a str>,
    temperature: f64,
    readings: Vec<ReadingPayload>,
}

fn print_report(report: &LiveReport) -> Result<()> {
    let payload = ReportPayload {
        key: report.key.as_deref(),
        temperature: report.temperature,
        readings: report
            .readings
            .iter()
            .map(|reading| ReadingPayload {
                analyte: reading.analyte,
                voltage: reading.voltage,
                concentration_um: reading
                    .concentration_um
                    .is_finite()
                    .then_some(reading.concentration_um),
                source: reading.source,
                safe: reading.safe,
            })
            .collect(),
    };
    println!("{}", serde_json::to_string(&payload)?);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
