//! Digit Inference CLI
//!
//! Entry point for serving the digit classifier over HTTP, classifying single
//! images from the command line, benchmarking latency and converting checkpoints.

use std::io::{Cursor, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use colored::Colorize;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use tracing::{info, warn};

use digit_infer::backend::{backend_name, default_device, DefaultBackend};
use digit_infer::config::{ServiceConfig, DEFAULT_MODEL_PATH};
use digit_infer::inference::{decode_bytes, run_benchmark, BenchmarkConfig, InferenceService};
use digit_infer::model::{load_classifier, save_classifier, DigitClassifier, DigitClassifierConfig};
use digit_infer::server::{create_router, AppState, InferencePool};
use digit_infer::utils::logging::{init_logging, LogConfig, LogLevel};
use digit_infer::utils::format_latency;

/// Handwritten digit classification with Burn
#[derive(Parser, Debug)]
#[command(name = "digit_infer")]
#[command(version)]
#[command(about = "Serve and run an MNIST digit classifier", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP prediction service
    Serve {
        /// TOML configuration file
        #[arg(short, long, env = "DIGIT_CONFIG")]
        config: Option<PathBuf>,

        /// Checkpoint to serve (overrides the config file)
        #[arg(short, long, env = "DIGIT_MODEL_PATH")]
        model: Option<PathBuf>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Number of inference worker threads
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Classify a single image file
    Predict {
        /// Path to the checkpoint
        #[arg(short, long, env = "DIGIT_MODEL_PATH", default_value = DEFAULT_MODEL_PATH)]
        model: PathBuf,

        /// Image file (or a text file holding a base64 payload with --base64)
        #[arg(short, long)]
        input: PathBuf,

        /// Treat the input file as base64 text instead of raw image bytes
        #[arg(long, default_value = "false")]
        base64: bool,
    },

    /// Benchmark end-to-end classification latency
    Benchmark {
        /// Path to the checkpoint (random weights if not specified)
        #[arg(short, long, env = "DIGIT_MODEL_PATH")]
        model: Option<PathBuf>,

        /// Image to classify (a blank 28x28 image if not specified)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Number of timed iterations
        #[arg(short, long, default_value = "100")]
        iterations: usize,

        /// Number of warmup iterations
        #[arg(long, default_value = "10")]
        warmup: usize,

        /// Output JSON file for benchmark results
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a PyTorch checkpoint into a Burn MessagePack record
    Convert {
        /// PyTorch checkpoint (.pt/.pth)
        #[arg(short, long)]
        input: PathBuf,

        /// Destination (.mpk is appended if missing)
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn log_config(verbose: bool, level: LogLevel) -> LogConfig {
    if verbose {
        LogConfig::verbose()
    } else if std::io::stdout().is_terminal() {
        LogConfig::default().with_level(level)
    } else {
        // Redirected to a file or a container log: no ANSI escapes
        LogConfig::production().with_level(level)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            model,
            host,
            port,
            workers,
        } => {
            let mut service_config = match config {
                Some(path) => ServiceConfig::from_file(&path)?,
                None => ServiceConfig::default(),
            };
            if let Some(model) = model {
                service_config.model.path = model;
            }
            if let Some(host) = host {
                service_config.server.host = host;
            }
            if let Some(port) = port {
                service_config.server.port = port;
            }
            if let Some(workers) = workers {
                service_config.server.workers = workers;
            }
            service_config.validate()?;

            init_logging(&log_config(cli.verbose, service_config.logging.level))?;

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(cmd_serve(service_config))
        }
        Commands::Predict {
            model,
            input,
            base64,
        } => {
            init_logging(&log_config(cli.verbose, LogLevel::Info))?;
            cmd_predict(&model, &input, base64)
        }
        Commands::Benchmark {
            model,
            input,
            iterations,
            warmup,
            output,
        } => {
            init_logging(&log_config(cli.verbose, LogLevel::Info))?;
            cmd_benchmark(
                model.as_deref(),
                input.as_deref(),
                iterations,
                warmup,
                output.as_deref(),
                cli.verbose,
            )
        }
        Commands::Convert { input, output } => {
            init_logging(&log_config(cli.verbose, LogLevel::Info))?;
            cmd_convert(&input, &output)
        }
    }
}

async fn cmd_serve(config: ServiceConfig) -> Result<()> {
    info!("Digit inference server v{}", digit_infer::VERSION);
    info!("Configuration:");
    info!("  Model:   {:?}", config.model.path);
    info!("  Workers: {}", config.server.workers);
    info!("  Backend: {}", backend_name());

    // The model must be loaded before the listener binds
    let service = InferenceService::<DefaultBackend>::from_checkpoint(
        &config.model.path,
        default_device(),
    )
    .with_context(|| format!("Cannot start: failed to load {:?}", config.model.path))?;

    let pool = InferencePool::new(service, config.server.workers)?;
    let state = Arc::new(AppState::new(pool, backend_name()));
    let app = create_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn cmd_predict(model: &Path, input: &Path, as_base64: bool) -> Result<()> {
    println!("{}", "Inference Configuration:".cyan().bold());
    println!("  Input:   {}", input.display());
    println!("  Model:   {}", model.display());
    println!("  Backend: {}", backend_name());
    println!();

    let service = InferenceService::<DefaultBackend>::from_checkpoint(model, default_device())?;

    let start = std::time::Instant::now();
    let prediction = if as_base64 {
        let text = std::fs::read_to_string(input)
            .with_context(|| format!("Failed to read {}", input.display()))?;
        service.predict(&text)?
    } else {
        let bytes =
            std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
        let image = decode_bytes(&bytes)?;
        service.predict_image(&image)?
    };
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    println!(
        "{} {}",
        "Prediction:".green().bold(),
        prediction.label.to_string().bold()
    );
    println!("  Confidence: {:.1}%", prediction.confidence * 100.0);
    println!("  Time:       {}", format_latency(elapsed_ms));
    println!("  Logits:");
    for (digit, (logit, prob)) in prediction
        .logits
        .iter()
        .zip(prediction.probabilities())
        .enumerate()
    {
        let line = format!("    {}: {:>9.4}  ({:5.1}%)", digit, logit, prob * 100.0);
        if digit == prediction.label {
            println!("{}", line.yellow());
        } else {
            println!("{}", line);
        }
    }

    Ok(())
}

fn blank_payload() -> Result<String> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(GrayImage::from_pixel(28, 28, Luma([0])))
        .write_to(&mut buf, ImageFormat::Png)?;
    Ok(STANDARD.encode(buf.into_inner()))
}

fn cmd_benchmark(
    model: Option<&Path>,
    input: Option<&Path>,
    iterations: usize,
    warmup: usize,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    info!("Running benchmark");
    info!("  Iterations: {}", iterations);
    info!("  Warmup: {}", warmup);

    let device = default_device();
    let service = match model {
        Some(path) => {
            info!("  Model: {:?}", path);
            InferenceService::<DefaultBackend>::from_checkpoint(path, device)?
        }
        None => {
            warn!("No model given, benchmarking randomly initialized weights");
            let model = DigitClassifier::<DefaultBackend>::new(&DigitClassifierConfig::new(), &device);
            InferenceService::new(model, device)
        }
    };

    let payload = match input {
        Some(path) => STANDARD.encode(
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        None => blank_payload()?,
    };

    let config = BenchmarkConfig {
        warmup_iterations: warmup,
        iterations,
        verbose,
    };
    let result = run_benchmark(&service, &payload, config)?;

    let stats = &result.latency;
    println!();
    println!("{}", "Benchmark Results:".cyan().bold());
    println!("  Backend:    {}", result.backend);
    println!("  Label:      {}", result.label);
    println!("  Iterations: {} (+{} warmup)", iterations, warmup);
    println!(
        "  Latency:    mean {}, std {}",
        format_latency(stats.mean_ms),
        format_latency(stats.std_ms)
    );
    println!(
        "              min {}, p50 {}, p95 {}, p99 {}, max {}",
        format_latency(stats.min_ms),
        format_latency(stats.p50_ms),
        format_latency(stats.p95_ms),
        format_latency(stats.p99_ms),
        format_latency(stats.max_ms)
    );
    println!(
        "  {} {:.1} images/second",
        "Throughput:".green().bold(),
        result.throughput
    );

    if let Some(path) = output {
        result.save(path)?;
        println!("{} {}", "Results saved to".green(), path.display());
    }

    Ok(())
}

fn cmd_convert(input: &Path, output: &Path) -> Result<()> {
    println!("{}", "Converting checkpoint".cyan().bold());
    println!("  From: {}", input.display());

    let device = default_device();
    let model = load_classifier::<DefaultBackend>(input, &device)?;
    let written = save_classifier(&model, output)?;

    println!("  To:   {}", written.display());
    println!("{}", "Conversion complete!".green().bold());
    Ok(())
}
