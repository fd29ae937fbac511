//! Tail an event stream
//!
//! Prints every event received from a Server-Sent Events endpoint,
//! reconnecting on failure, for a fixed number of seconds.
//!
//! Run with: `cargo run -p hpx-eventsource --example tail -- <url> [seconds]`
//!
//! Set `RUST_LOG=hpx_eventsource=debug` to see connection logs.

use std::time::Duration;

use hpx_eventsource::{EventSource, EventSourceConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "http://127.0.0.1:8080/stream".to_string());
    let seconds: u64 = match args.next() {
        Some(s) => s.parse()?,
        None => 30,
    };

    let config = EventSourceConfig::new(url)
        .connect_timeout(Duration::from_secs(10))
        .read_timeout(Some(Duration::from_secs(90)));
    let source = EventSource::new(config)?;

    source.on_open(|_| println!("-- open"));
    source.on_message(|event| {
        println!(
            "[{}] id={} data={}",
            event.event_type(),
            event.id().unwrap_or("-"),
            event.data().unwrap_or(""),
        );
    });
    source.on_error(|event| {
        if let Some(error) = &event.error {
            println!("-- error: {error}");
        }
    });
    source.on_close(|_| println!("-- closed"));

    source.open();
    tokio::time::sleep(Duration::from_secs(seconds)).await;
    source.close();

    // Let the close event reach its observer.
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("last event id: {:?}", source.last_event_id());
    Ok(())
}
