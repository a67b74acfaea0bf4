use crate::transport::{BrokerTransport, Exchange};
use log::{debug, info, log_enabled, trace, warn, Level};
use mqtt_fuzz::{
    corpus::Corpus,
    decoder::decode_packet,
    fuzzer::{fuzz_attempt, FuzzAttempt, FuzzConfig},
    types::{FuzzError, ProtocolVersion},
};
use std::time::Duration;
use tokio::time;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub host: String,
    pub port: u16,
    pub seed: u64,
    pub config: FuzzConfig,
    pub autonomous_intensity: bool,
    pub fuzz_delay: Duration,
    pub response_delay: Duration,
    pub max_runs: Option<u64>,
    /// Version used to decode fuzzed packets and responses for trace output.
    pub protocol_version: ProtocolVersion,
}

fn log_attempt(attempt: &FuzzAttempt, protocol_version: ProtocolVersion) {
    debug!("Unfuzzed payload: {}", hex::encode(&attempt.unfuzzed));
    info!("Fuzzed payload: {}", hex::encode(&attempt.fuzzed));

    if !log_enabled!(Level::Trace) {
        return;
    }

    for (packet_type, packet) in &attempt.mutated {
        match decode_packet(packet, protocol_version) {
            Ok(fields) => trace!("Fuzzed {}", fields),
            Err(e) => trace!("Fuzzed {} no longer decodes: {}", packet_type, e),
        }
    }
}

fn log_exchange(exchange: &Exchange, protocol_version: ProtocolVersion) {
    if exchange.responses.is_empty() && exchange.partial.is_none() && !exchange.reset {
        trace!("Broker was not ready for reading");
    }

    for response in &exchange.responses {
        trace!("Broker response: {}", hex::encode(response));

        match decode_packet(response, protocol_version) {
            Ok(fields) => trace!("{}", fields),
            Err(e) => trace!("Broker response does not decode: {}", e),
        }
    }

    if let Some(partial) = &exchange.partial {
        debug!("Broker closed connection inside a packet: {}", hex::encode(partial));
    }

    if exchange.reset {
        debug!("Broker reset connection");
    }
}

/// Sends one attempt per seed, starting at `options.seed`, until `max_runs`
/// attempts have been made. Only corpus exhaustion stops the loop early.
pub async fn run(corpus: &Corpus, options: &RunOptions) -> Result<(), FuzzError> {
    let transport = BrokerTransport::new(&options.host, options.port, options.response_delay);
    let mut config = options.config;
    let mut seed = options.seed;
    let mut total_runs: u64 = 1;

    loop {
        info!("Run {}", total_runs);
        debug!("Seed {}", seed);
        debug!(
            "Fuzz intensity {}, construct intensity {}",
            config.fuzz_intensity, config.construct_intensity
        );

        match fuzz_attempt(corpus, &config, seed) {
            Ok(attempt) => {
                log_attempt(&attempt, options.protocol_version);

                match transport.send_session(attempt.fuzzed.clone()).await {
                    Ok(exchange) => log_exchange(&exchange, options.protocol_version),
                    Err(e) => warn!("Seed {} against {}: {}", seed, transport.addr(), e),
                }
            },
            Err(e @ FuzzError::MalformedMutationInput) => warn!("Skipping seed {}: {}", seed, e),
            Err(e) => return Err(e),
        }

        if options.max_runs.map_or(false, |max_runs| total_runs >= max_runs) {
            break;
        }

        time::sleep(options.fuzz_delay).await;
        total_runs += 1;
        seed = seed.wrapping_add(1);

        if options.autonomous_intensity {
            config = config.drift(total_runs);
        }
    }

    Ok(())
}
