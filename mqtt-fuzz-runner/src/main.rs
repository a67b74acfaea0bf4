use crate::runner::RunOptions;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};
use mqtt_fuzz::{
    corpus::Corpus,
    decoder,
    fuzzer::{fuzz_attempt, FuzzConfig},
    params::{FuzzParameters, Intensity},
    session::ConstructIntensity,
    types::ProtocolVersion,
};
use std::{
    path::PathBuf,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

mod runner;
mod transport;

#[derive(Parser, Debug)]
#[command(name = "mqtt-fuzz", version, about = "Mutation based fuzzer for MQTT brokers")]
struct Cli {
    #[command(flatten)]
    fuzz: FuzzArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug)]
struct FuzzArgs {
    /// Broker host
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,

    /// Broker port
    #[arg(short = 'P', long, default_value_t = 1883)]
    port: u16,

    /// Base seed. Defaults to the current unix time in seconds.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Seconds to wait between attempts
    #[arg(long, default_value_t = 0.1)]
    fuzz_delay: f64,

    /// Seconds to wait for broker responses after each session
    #[arg(long, default_value_t = 0.1)]
    response_delay: f64,

    /// Stop after this many attempts
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    max_runs: Option<u64>,

    /// Mutation intensity from 0 to 10, clamped
    #[arg(long, default_value_t = 3, allow_negative_numbers = true)]
    fuzz_intensity: i64,

    /// Session construct intensity from 0 to 3, clamped
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    construct_intensity: i64,

    /// Step the fuzz intensity every 1000 runs and the construct intensity
    /// every 250 runs
    #[arg(short, long)]
    autonomous_intensity: bool,

    /// Output verbosity from 0 (silent) to 5, clamped
    #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
    verbosity: i64,

    /// Directory holding one seed file per packet type
    #[arg(long, default_value = "mqtt_corpus")]
    corpus: PathBuf,

    /// Print the parameters for the seed and exit
    #[arg(long)]
    params_only: bool,

    /// Print the session before and after fuzzing and exit
    #[arg(long)]
    payload_only: bool,

    /// Protocol version used to decode packets, in trace output and by `decode`
    #[arg(
        long,
        global = true,
        default_value_t = 5,
        value_parser = clap::value_parser!(u8).range(4..=5)
    )]
    protocol_version: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the fields of one hex encoded packet
    Decode { hex: String },
}

fn init_logging(verbosity: i64) {
    let level = match verbosity.clamp(0, 5) {
        0 => LevelFilter::Off,
        1 => LevelFilter::Info,
        2 | 3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn protocol_version(value: u8) -> Result<ProtocolVersion> {
    ProtocolVersion::try_from(value).context("unsupported protocol version")
}

fn seconds(value: f64, name: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("invalid {}: {}", name, value))
}

fn decode(hex: &str, version: u8) -> Result<()> {
    let fields = decoder::decode_hex(hex, protocol_version(version)?)
        .context("failed to decode packet")?;

    print!("{}", fields);
    Ok(())
}

fn fuzz(args: FuzzArgs) -> Result<()> {
    let seed = match args.seed {
        Some(seed) => seed,
        None => SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs(),
    };

    let config = FuzzConfig::new(
        Intensity::new(args.fuzz_intensity),
        ConstructIntensity::new(args.construct_intensity),
    );

    info!("Host: {}, port: {}", args.host, args.port);
    info!("Base seed: {}", seed);
    info!("Fuzz intensity: {}", config.fuzz_intensity);

    if args.params_only {
        println!("{}", FuzzParameters::for_seed(seed, config.fuzz_intensity));

        if !args.payload_only {
            return Ok(());
        }
    }

    let corpus = Corpus::from_dir(&args.corpus)
        .with_context(|| format!("failed to load corpus from {}", args.corpus.display()))?;

    if args.payload_only {
        let attempt = fuzz_attempt(&corpus, &config, seed)?;
        println!("Payload before fuzzing:\n{}", hex::encode(&attempt.unfuzzed));
        println!("Payload after fuzzing:\n{}", hex::encode(&attempt.fuzzed));
        return Ok(());
    }

    let options = RunOptions {
        host: args.host,
        port: args.port,
        seed,
        config,
        autonomous_intensity: args.autonomous_intensity,
        fuzz_delay: seconds(args.fuzz_delay, "fuzz delay")?,
        response_delay: seconds(args.response_delay, "response delay")?,
        max_runs: args.max_runs,
        protocol_version: protocol_version(args.protocol_version)?,
    };

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(runner::run(&corpus, &options))?;

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.fuzz.verbosity);

    match cli.command {
        Some(Command::Decode { hex }) => decode(&hex, cli.fuzz.protocol_version),
        None => fuzz(cli.fuzz),
    }
}
