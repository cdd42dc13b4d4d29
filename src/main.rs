use std::io::BufRead;
use std::process::ExitCode;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;

use shift_relay::clock::{ConfiguredTimeSource, ProcessUptime, Uptime, WallTimeSource};
use shift_relay::config::RelayConfig;
use shift_relay::connectivity::{ConnectivitySource, TcpReachability};
use shift_relay::delivery::{DeliveryTransport, HttpTransport};
use shift_relay::identity;
use shift_relay::relay::Relay;
use shift_relay::types::MonotonicMs;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A line from the reader front end, stamped with the uptime at which it arrived.
struct Scan {
    line: Vec<u8>,
    at: MonotonicMs,
}

/// Reads one badge per line from stdin (the reader front end writes the name
/// blocks separated by tabs) and relays each as a shift event.
fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shift_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let reachability = match TcpReachability::for_url(&config.endpoints.primary, config.request_timeout) {
        Ok(reachability) => reachability,
        Err(e) => {
            error!(error = %e, "Cannot check delivery endpoint");
            return ExitCode::FAILURE;
        }
    };

    let transport = HttpTransport::new(config.request_timeout);
    let time_source = ConfiguredTimeSource::from_setting(&config.time_url, config.request_timeout);
    let uptime = ProcessUptime::start();
    let mut relay = Relay::new(&config, transport, uptime, time_source);

    if let Err(e) = relay.start() {
        // Not fatal: admissions still try the network, and appends may succeed later.
        warn!(error = %e, "Startup store cleanup failed");
    }

    // The reader thread stamps each scan, so time spent in a drain pass is
    // not attributed to scans waiting behind it.
    let (scans_tx, scans) = mpsc::channel::<Scan>();
    thread::spawn(move || {
        for line in std::io::stdin().lock().split(b'\n') {
            let Ok(line) = line else { break };
            let scan = Scan {
                line,
                at: uptime.now_ms(),
            };
            if scans_tx.send(scan).is_err() {
                break;
            }
        }
    });

    info!(
        endpoint = %config.endpoints.primary,
        location = %config.location,
        tick = ?config.tick,
        "Relay running"
    );

    loop {
        relay.tick(reachability.is_connected());

        match scans.recv_timeout(config.tick) {
            Ok(scan) => {
                handle_scan(&relay, &scan);
                for scan in scans.try_iter() {
                    handle_scan(&relay, &scan);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!(pending = relay.store().count().unwrap_or(0), "Input closed, stopping");
                return ExitCode::SUCCESS;
            }
        }
    }
}

fn handle_scan<T, U, W>(relay: &Relay<T, U, W>, scan: &Scan)
where
    T: DeliveryTransport,
    U: Uptime,
    W: WallTimeSource,
{
    if scan.line.iter().all(u8::is_ascii_whitespace) {
        return;
    }

    let Some(subject) = identity::resolve_line(&scan.line) else {
        warn!(at = %scan.at, "Unreadable badge");
        println!("Invalid card");
        return;
    };

    match relay.admit_at(&subject, scan.at) {
        Ok(outcome) => println!("{}", outcome.status_line()),
        Err(e) => {
            warn!(error = %e, "Scan rejected");
            println!("Invalid card");
        }
    }
}
