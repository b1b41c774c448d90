//! rule-advisor - Direct/proxy rule advisor
//!
//! This is the composition root that wires together all the components.
//!
//! Usage:
//!   rule-advisor [DOMAIN...]              suggest a rule for each domain
//!   rule-advisor direct|proxy DOMAIN...   check a rule request
//!   rule-advisor stats                    print index and rule counts
//!
//! With no domains, one domain per line is read from stdin.

use rule_advisor::adapters::outbound::{DohProvider, FileRuleStore, HttpDatasetSource};
use rule_advisor::config::{load_config, DohServer};
use rule_advisor::domain::ports::DnsProvider;
use rule_advisor::infrastructure::{shutdown_signal, GeoIndexSlot, ShutdownController};
use rule_advisor::{AdvisorService, DatasetRefresher, MultiProviderResolver, RuleKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::fmt::format::FmtSpan;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

enum Command {
    Suggest(Vec<String>),
    Request(RuleKind, Vec<String>),
    Stats,
}

impl Command {
    fn from_args(mut args: Vec<String>) -> Self {
        match args.first().map(String::as_str) {
            Some("stats") => Command::Stats,
            Some("direct") => Command::Request(RuleKind::Direct, args.split_off(1)),
            Some("proxy") => Command::Request(RuleKind::Proxy, args.split_off(1)),
            _ => Command::Suggest(args),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration from environment
    let cfg = load_config()?;

    // Setup logging
    let log_level = if cfg.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(
        "starting rule-advisor doh_servers={} ns_servers={} subnet={}",
        cfg.doh_servers.len(),
        cfg.ns_doh_servers.len(),
        cfg.client_subnet
    );

    // ===== COMPOSITION ROOT =====

    // 1. Geo index and its refresher
    let slot = Arc::new(GeoIndexSlot::empty());
    let source = Arc::new(HttpDatasetSource::new(&cfg.geoip_url, &cfg.geosite_url)?);
    let refresher = Arc::new(
        DatasetRefresher::new(source, slot.clone())
            .with_interval(Duration::from_secs(cfg.refresh_secs)),
    );

    if !refresher.refresh_and_swap().await {
        tracing::warn!("initial dataset refresh failed, serving an empty geo index");
    }

    // 2. Resolver over the configured DoH providers
    let timeout = Duration::from_secs(cfg.dns_timeout_secs);
    let resolver = MultiProviderResolver::new(
        build_providers(&cfg.doh_servers, timeout)?,
        build_providers(&cfg.ns_doh_servers, timeout)?,
        Some(cfg.client_subnet),
    )
    .with_timeout(timeout);

    // 3. Rule lists
    let rules = FileRuleStore::new(
        PathBuf::from(&cfg.direct_rule_file),
        cfg.proxy_rule_file.as_ref().map(PathBuf::from),
    );

    // 4. Application service
    let service = Arc::new(AdvisorService::new(
        Arc::new(rules),
        slot,
        Arc::new(resolver),
    ));

    // 5. Background jobs and shutdown
    let shutdown = ShutdownController::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));
    let refresher_task = refresher.clone().start(shutdown.subscribe());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match Command::from_args(args) {
        Command::Stats => {
            println!("{}", serde_json::to_string(&service.stats().await)?);
        }
        Command::Suggest(domains) if !domains.is_empty() => {
            run_batch(&service, &shutdown, None, domains).await;
        }
        Command::Request(kind, domains) if !domains.is_empty() => {
            run_batch(&service, &shutdown, Some(kind), domains).await;
        }
        Command::Suggest(_) => run_stdin(&service, &shutdown, None).await?,
        Command::Request(kind, _) => run_stdin(&service, &shutdown, Some(kind)).await?,
    }

    shutdown.shutdown();
    shutdown.wait_for_drain(DRAIN_TIMEOUT).await;
    refresher_task.await?;
    tracing::info!("rule-advisor stopped");
    Ok(())
}

fn build_providers(servers: &[DohServer], timeout: Duration) -> anyhow::Result<Vec<Arc<dyn DnsProvider>>> {
    servers
        .iter()
        .map(|s| {
            let provider = DohProvider::new(&s.name, &s.url, timeout)?;
            tracing::debug!(name = %s.name, url = %s.url, "DoH provider configured");
            Ok(Arc::new(provider) as Arc<dyn DnsProvider>)
        })
        .collect()
}

async fn run_batch(
    service: &Arc<AdvisorService>,
    shutdown: &ShutdownController,
    kind: Option<RuleKind>,
    domains: Vec<String>,
) {
    let tasks: Vec<_> = domains
        .into_iter()
        .filter_map(|domain| spawn_classification(service, shutdown, kind, domain))
        .collect();
    futures::future::join_all(tasks).await;
}

async fn run_stdin(
    service: &Arc<AdvisorService>,
    shutdown: &ShutdownController,
    kind: Option<RuleKind>,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let domain = line.trim();
                if domain.is_empty() {
                    continue;
                }
                if spawn_classification(service, shutdown, kind, domain.to_string()).is_none() {
                    break;
                }
            }
            _ = stop.changed() => break,
        }
    }
    Ok(())
}

/// Classify `domain` on its own task and print the outcome as one JSON line.
///
/// Returns `None` once shutdown has started.
fn spawn_classification(
    service: &Arc<AdvisorService>,
    shutdown: &ShutdownController,
    kind: Option<RuleKind>,
    domain: String,
) -> Option<tokio::task::JoinHandle<()>> {
    let guard = shutdown.begin_request()?;
    let service = service.clone();

    Some(tokio::spawn(async move {
        let _guard = guard;
        let outcome = match kind {
            None => service.check(&domain).await,
            Some(kind) => service.request(&domain, kind).await,
        };
        let line = match outcome {
            Ok(verdict) => {
                let rationale = verdict.rationale();
                serde_json::json!({
                    "input": domain,
                    "verdict": verdict,
                    "rationale": rationale,
                })
            }
            Err(e) => serde_json::json!({
                "input": domain,
                "error": e.to_string(),
            }),
        };
        println!("{}", line);
    }))
}
