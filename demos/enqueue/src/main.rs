//! Queue function invocations from the command line.
//!
//! Connection settings come from the queue-worker environment variables
//! (`faas_nats_address`, `faas_nats_port`, ...) or from a TOML file:
//!
//!   faas-enqueue figlet --body "hello"
//!   echo '{"width":64}' | faas-enqueue resize --queue gpu-queue
//!   faas-enqueue nodeinfo --config queue.toml --count 10 -H X-Callback-Url=http://sink:8080

use anyhow::Context;
use clap::Parser;
use faasq_client::{NatsBackend, QueueConfig, QueuePublisher};
use faasq_core::InvocationRequest;
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "faas-enqueue", about = "Queue asynchronous function invocations")]
struct Args {
    /// Function to invoke, optionally `name.namespace`.
    function: String,

    /// Request body. Read from stdin when omitted and stdin is not a terminal.
    #[arg(long)]
    body: Option<String>,

    /// Queue to publish to instead of the configured topic.
    #[arg(long, short)]
    queue: Option<String>,

    /// TOML connection config; overrides the environment.
    #[arg(long, env = "FAASQ_CONFIG")]
    config: Option<PathBuf>,

    /// Backend URL, e.g. `ws://nats:8080`.
    #[arg(long)]
    url: Option<String>,

    /// Request header as `Name=value`. Repeatable.
    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    headers: Vec<(String, String)>,

    #[arg(long)]
    callback_url: Option<String>,

    /// How many copies of the request to queue.
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Connect timeout in milliseconds.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected Name=value, got {raw:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("faasq_client=info".parse()?))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            QueueConfig::from_toml(&text)?
        }
        None => QueueConfig::from_env()?,
    };
    if let Some(url) = args.url.clone() {
        config = config.with_url(url);
    }

    let body = match args.body.clone() {
        Some(body) => body.into_bytes(),
        None if !std::io::stdin().is_terminal() => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("reading body from stdin")?;
            buf
        }
        None => Vec::new(),
    };

    let mut req = InvocationRequest::new(&args.function, body);
    if let Some(queue) = &args.queue {
        req = req.with_queue_name(queue);
    }
    for (name, value) in &args.headers {
        req = req.with_header(name, value);
    }
    if let Some(url) = &args.callback_url {
        req = req.with_callback_url(url);
    }

    let backend = NatsBackend::new().with_connect_timeout(Duration::from_millis(args.timeout_ms));
    let publisher = QueuePublisher::connect(config, backend)
        .await
        .context("connecting to the queue")?;
    let subject = publisher.route(&req).to_string();

    let mut failed = 0u32;
    for i in 0..args.count {
        if let Err(e) = publisher.queue(&req).await {
            tracing::warn!(attempt = i + 1, error = %e, "Publish failed");
            failed += 1;
        }
    }

    let queued = args.count - failed;
    tracing::info!(
        "Queued {} of {} request(s) for {} on {}",
        queued,
        args.count,
        req.function,
        subject
    );
    if failed > 0 {
        anyhow::bail!("{failed} publish(es) failed");
    }
    Ok(())
}
