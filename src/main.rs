//! wbem-dump - WBEM/CIM Service Exporter
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wbem_dump::config::{CliArgs, DumpConfig};
use wbem_dump::progress::{print_header, print_summary, ProgressReporter};
use wbem_dump::wbem::CimXmlClientBuilder;
use wbem_dump::Exporter;

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("Export failed!");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the dump had any namespace to export
fn run() -> Result<bool> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = DumpConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &config.service.to_display_string(),
            config.namespace.as_deref(),
            &config.output_dir.display().to_string(),
        );
    }

    let mut builder = CimXmlClientBuilder::new(config.service.clone())
        .timeout(config.timeout)
        .credentials(&config.username, &config.password)
        .accept_invalid_certs(!config.strict_tls);
    if config.debug {
        builder = builder.debug_dir(config.output_dir.join("debug"));
    }
    let client = builder.build().context("Connection failed")?;

    let progress = if config.show_progress && !config.only_class_names {
        Some(ProgressReporter::new())
    } else {
        None
    };

    let mut exporter = Exporter::new(&client, &config);
    if let Some(p) = progress.as_ref() {
        p.set_status("Connecting to CIM service...");
        exporter = exporter.with_progress(move |snapshot| p.update(snapshot));
    }

    // Setup signal handler for graceful shutdown
    let shutdown_flag = exporter.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let result = exporter.run();

    if let Some(p) = progress.as_ref() {
        match &result {
            Ok(r) if r.stats.completed => p.finish("Dump completed"),
            Ok(_) => p.finish("Dump interrupted"),
            Err(_) => p.finish("Dump failed"),
        }
    }

    let result = result.context("Dump failed")?;

    if config.show_progress && !config.only_class_names {
        print_summary(
            result.namespaces.len(),
            &result.stats,
            &config.output_dir.display().to_string(),
        );
    }

    if !result.is_success() {
        return Ok(false);
    }

    if result.stats.errors() > 0 {
        info!(errors = result.stats.errors(), "Dump completed with errors");
    }
    info!("Successfully exported");
    Ok(true)
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("wbem_dump=debug,warn")
    } else {
        EnvFilter::new("wbem_dump=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
