//! OS simulator - Main Entry Point
//!
//! Usage:
//!   os-sim run [OPTIONS] <config>     - run a multi-core simulation
//!   os-sim run-proc <descriptor>      - execute one process and dump memory

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use os_sim::config::SimConfig;
use os_sim::cpu::execute;
use os_sim::log::{self, LogLevel};
use os_sim::{loader, kdebug, kerror, kinfo, kwarn};
use os_sim::{DEFAULT_MAX_TICKS, PhysicalMemory, PidAllocator, SimOptions, Simulation, Strategy};

/// Multi-core operating system simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Only print warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Also print failed instructions
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the processes listed in a configuration file
    Run {
        /// Configuration file; descriptors are read from `proc/` beside it
        config: PathBuf,

        /// Ready queue implementation (naive, indexed)
        #[arg(short, long, default_value = "indexed")]
        strategy: Strategy,

        /// Stop the simulation after this many ticks
        #[arg(long, default_value_t = DEFAULT_MAX_TICKS)]
        max_ticks: u64,

        /// Print the frame table when the simulation ends
        #[arg(short, long)]
        dump: bool,
    },
    /// Execute a single process descriptor and dump memory
    RunProc {
        descriptor: PathBuf,
    },
}

fn main() {
    // Run the simulator and handle any errors
    if let Err(e) = run() {
        kerror!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    if args.quiet {
        log::set_level(LogLevel::Warn);
    } else if args.verbose {
        log::set_level(LogLevel::Debug);
    }

    match args.command {
        Command::Run {
            config,
            strategy,
            max_ticks,
            dump,
        } => run_simulation(config, strategy, max_ticks, dump),
        Command::RunProc { descriptor } => run_process(descriptor),
    }
}

fn run_simulation(path: PathBuf, strategy: Strategy, max_ticks: u64, dump: bool) -> Result<()> {
    let config = SimConfig::from_file(&path)
        .with_context(|| format!("Failed to load configuration {}", path.display()))?;
    let pids = PidAllocator::new();
    let arrivals = config
        .load_arrivals(&pids)
        .context("Failed to load process descriptors")?;

    let options = SimOptions {
        time_slot: config.time_slot,
        num_cpus: config.num_cpus,
        strategy,
        max_ticks: Some(max_ticks),
    };
    let report = Simulation::new(options, arrivals).run();

    if report.deadline_hit {
        kwarn!("Simulation stopped by deadline at tick {}", report.ticks);
    }
    kinfo!(
        "Simulation finished at tick {}: {} finished, {} dropped",
        report.ticks,
        report.finished().len(),
        report.dropped().len()
    );

    if dump {
        print!("{}", report.dump);
    }
    Ok(())
}

fn run_process(path: PathBuf) -> Result<()> {
    let pids = PidAllocator::new();
    let mut proc = loader::load(&path, &pids)
        .with_context(|| format!("Failed to load process descriptor {}", path.display()))?;
    let mem = PhysicalMemory::new();

    while !proc.is_finished() {
        let pc = proc.pc;
        if let Err(e) = execute(&mut proc, &mem) {
            kdebug!("Process {}: instruction {} failed: {}", proc.pid, pc, e);
        }
    }

    print!("{}", mem.dump());
    Ok(())
}
