use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use sysinfo::{MINIMUM_CPU_UPDATE_INTERVAL, System};

use hwscope_agent::collectors::cpu::SysinfoCpuSource;
use hwscope_agent::collectors::gpu::NvmlSource;
use hwscope_agent::collectors::process::SysinfoProcessSource;
use hwscope_agent::config::{AgentConfig, Cli, Output, OutputFormat};
use hwscope_agent::sinks::{self, FlatSink, JsonLinesSink, Sink};
use hwscope_agent::{SamplingLoop, StatusAggregator};

type Aggregator = StatusAggregator<NvmlSource, SysinfoProcessSource, SysinfoCpuSource>;

fn main() -> Result<()> {
    let config = AgentConfig::try_from(Cli::parse())?;
    hwscope_agent::init_logging(config.log_level);

    let aggregator = StatusAggregator::new(
        NvmlSource::new(),
        SysinfoProcessSource::new(),
        SysinfoCpuSource::new(),
    )
    .with_fallback_process(config.fallback_process.clone());

    if config.continuous {
        run_continuous(aggregator, &config)
    } else {
        take_single_snapshot(aggregator, &config)
    }
}

fn take_single_snapshot(mut aggregator: Aggregator, config: &AgentConfig) -> Result<()> {
    // CPU usage needs two refreshes some time apart
    aggregator.sample_once();
    std::thread::sleep(MINIMUM_CPU_UPDATE_INTERVAL);

    let info = aggregator.system_info();
    let snapshot = aggregator.sample_once();
    aggregator.shutdown();

    match &config.output {
        Output::Folder(folder) => {
            let filepath = sinks::write_snapshot_file(folder, &info, &snapshot)
                .context("Error taking snapshot")?;
            println!("Snapshot saved to: {}", filepath.display());
        }
        Output::Stdout => {
            let mut sink = feed_sink(io::stdout(), config.format);
            sink.emit_header(&info)?;
            sink.emit(&snapshot, true)?;
        }
    }
    Ok(())
}

fn run_continuous(aggregator: Aggregator, config: &AgentConfig) -> Result<()> {
    let writer: Box<dyn Write + Send> = match &config.output {
        Output::Stdout => Box::new(io::stdout()),
        Output::Folder(folder) => Box::new(BufWriter::new(open_feed_file(folder, config.format)?)),
    };

    let sampling = SamplingLoop::new(aggregator, feed_sink(writer, config.format), config.interval);
    let stop = sampling.stop_handle();
    ctrlc::set_handler(move || {
        if stop.stop() {
            log::info!("Stop requested, finishing current tick");
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    sampling.run_until_stopped()?;
    Ok(())
}

fn feed_sink<W: Write + Send + 'static>(writer: W, format: OutputFormat) -> Box<dyn Sink + Send> {
    match format {
        OutputFormat::Json => Box::new(JsonLinesSink::new(writer)),
        OutputFormat::Csv => Box::new(FlatSink::new(writer)),
    }
}

fn open_feed_file(folder: &Path, format: OutputFormat) -> Result<File> {
    fs::create_dir_all(folder)
        .with_context(|| format!("Failed to create output folder {}", folder.display()))?;

    let hostname = System::host_name().unwrap_or_else(|| "unknown".to_string());
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs();
    let filepath = folder.join(format!("status_{}_{}.{}", hostname, timestamp, format.extension()));

    let file = File::options()
        .create(true)
        .append(true)
        .open(&filepath)
        .with_context(|| format!("Failed to open {}", filepath.display()))?;
    println!("Writing status feed to: {}", filepath.display());
    Ok(file)
}
