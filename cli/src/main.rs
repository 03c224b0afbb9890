//! attest — audit chain command-line tool
//!
//! Appends entries to a JSON-lines audit store, verifies its integrity, and
//! runs a self-contained tamper drill.
//!
//! Usage:
//!   attest record --action login --actor user-42
//!   attest record --action delete --subject-type gauge --subject-id G-7
//!   attest verify --from 1 --to 100 --json
//!   attest tip
//!   attest demo
//!
//! The store path and the signing-secret variable come from `--config`
//! (see `AuditConfig`) unless overridden with `--store`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use attest_audit::{InMemoryAuditStore, IntegrityVerifier, JsonlAuditStore};
use attest_contracts::{
    entry::{ActionData, RequestContext},
    error::{AttestError, AttestResult},
    report::VerificationReport,
};
use attest_core::{
    traits::{AuditStore, CriticalityClassifier, SecretProvider},
    AuditLogService, EnvSecretProvider, StaticSecret,
};
use attest_policy::{ActionClassifier, AuditConfig};

// ── CLI definition ────────────────────────────────────────────────────────────

/// attest — tamper-evident audit log.
#[derive(Parser)]
#[command(
    name = "attest",
    about = "Tamper-evident, hash-chained audit log",
    long_about = "Records audit entries into a SHA-256 hash chain, signs critical actions\n\
                  with HMAC-SHA256, and verifies that nothing was altered after the fact."
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON-lines store path; overrides the configuration file.
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append one entry and print its sequence number.
    Record(RecordArgs),
    /// Verify a range of the chain (the whole chain by default).
    Verify(VerifyArgs),
    /// Print the current chain tip.
    Tip,
    /// Run an in-memory tamper and outage drill.
    Demo,
}

#[derive(Args)]
struct RecordArgs {
    #[arg(long)]
    action: String,
    #[arg(long)]
    actor: Option<String>,
    #[arg(long)]
    subject_type: Option<String>,
    #[arg(long)]
    subject_id: Option<String>,
    /// State before the change, as JSON.
    #[arg(long)]
    before: Option<String>,
    /// State after the change, as JSON.
    #[arg(long)]
    after: Option<String>,
    #[arg(long)]
    ip: Option<String>,
    #[arg(long)]
    user_agent: Option<String>,
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(long)]
    from: Option<u64>,
    #[arg(long)]
    to: Option<u64>,
    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
    /// Skip the signature audit.
    #[arg(long)]
    no_signatures: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Initialize structured logging.  Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = load_config(&cli).and_then(|config| match cli.command {
        Command::Record(args) => run_record(&config, args).map(|()| true),
        Command::Verify(args) => run_verify(&config, args),
        Command::Tip => run_tip(&config).map(|()| true),
        Command::Demo => run_demo().map(|()| true),
    });

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("attest error: {}", e);
            std::process::exit(2);
        }
    }
}

fn load_config(cli: &Cli) -> AttestResult<AuditConfig> {
    let mut config = match &cli.config {
        Some(path) => AuditConfig::from_file(path)?,
        None => AuditConfig::default(),
    };
    if let Some(store) = &cli.store {
        config.store.path = store.clone();
    }
    Ok(config)
}

// ── Wiring ────────────────────────────────────────────────────────────────────

struct Wiring {
    store: Arc<JsonlAuditStore>,
    classifier: Arc<dyn CriticalityClassifier>,
    secrets: Arc<dyn SecretProvider>,
}

fn wire(config: &AuditConfig) -> AttestResult<Wiring> {
    let store = JsonlAuditStore::open(&config.store.path)?;
    debug!(
        store = %config.store.path.display(),
        secret_env = %config.signing.secret_env,
        critical_actions = config.classifier.critical_actions.len(),
        "audit log opened"
    );
    Ok(Wiring {
        store: Arc::new(store),
        classifier: Arc::new(ActionClassifier::from_config(&config.classifier)),
        secrets: Arc::new(EnvSecretProvider::new(config.signing.secret_env.as_str())),
    })
}

// ── Subcommands ───────────────────────────────────────────────────────────────

fn run_record(config: &AuditConfig, args: RecordArgs) -> AttestResult<()> {
    let wiring = wire(config)?;
    let service = AuditLogService::new(wiring.store, wiring.classifier, wiring.secrets)
        .with_rebootstrap_interval(config.sequencer.rebootstrap_interval());
    service.bootstrap()?;

    let context = RequestContext {
        actor_id: args.actor,
        source_ip: args.ip,
        user_agent: args.user_agent,
    };
    let data = ActionData {
        subject_type: args.subject_type,
        subject_id: args.subject_id,
        before_state: args.before.as_deref().map(parse_state).transpose()?,
        after_state: args.after.as_deref().map(parse_state).transpose()?,
        ..ActionData::new(args.action)
    }
    .with_context(&context);

    match service.append(data)? {
        Some(entry) => {
            println!("recorded sequence {}", entry.sequence);
            println!("  hash:      {}", entry.current_hash);
            if let Some(signature) = &entry.signature {
                println!("  signature: {}", signature);
            }
            Ok(())
        }
        None => {
            warn!(store = %config.store.path.display(), "audit store unavailable, entry not written");
            Err(AttestError::PersistenceUnavailable {
                reason: format!("entry not written to {}", config.store.path.display()),
            })
        }
    }
}

fn run_verify(config: &AuditConfig, args: VerifyArgs) -> AttestResult<bool> {
    let wiring = wire(config)?;
    let mut verifier = IntegrityVerifier::new(wiring.store.clone());
    if !args.no_signatures {
        verifier = verifier.with_signature_checks(wiring.classifier, wiring.secrets.signing_secret());
    }

    let report = verify_range(&verifier, wiring.store.as_ref(), args.from, args.to)?;
    if !report.valid {
        warn!(
            store = %config.store.path.display(),
            first_broken_at = ?report.first_broken_at,
            "audit log failed verification"
        );
    }

    if args.json {
        let out = serde_json::to_string_pretty(&report).map_err(|e| AttestError::Serialization {
            reason: e.to_string(),
        })?;
        println!("{}", out);
    } else {
        print_report(&report);
    }
    Ok(report.valid)
}

fn run_tip(config: &AuditConfig) -> AttestResult<()> {
    let wiring = wire(config)?;
    let service = AuditLogService::new(wiring.store, wiring.classifier, wiring.secrets);
    let tip = service.bootstrap()?;
    let out = serde_json::to_string_pretty(&tip).map_err(|e| AttestError::Serialization {
        reason: e.to_string(),
    })?;
    println!("{}", out);
    Ok(())
}

/// Resolve the CLI range against the store. An open end means the highest
/// persisted sequence; an empty store verifies as an empty, valid chain.
fn verify_range(
    verifier: &IntegrityVerifier,
    store: &dyn AuditStore,
    from: Option<u64>,
    to: Option<u64>,
) -> AttestResult<VerificationReport> {
    let end = match to {
        Some(end) => Some(end),
        None => store.latest()?.map(|e| e.sequence),
    };
    match (from, end) {
        (_, None) => verifier.verify_all(),
        (from, Some(end)) => verifier.verify(from.unwrap_or(1), end),
    }
}

// ── Demo ──────────────────────────────────────────────────────────────────────

fn run_demo() -> AttestResult<()> {
    println!();
    println!("attest — tamper drill");
    println!("=====================");
    println!();

    let store = Arc::new(InMemoryAuditStore::new());
    let classifier: Arc<dyn CriticalityClassifier> =
        Arc::new(ActionClassifier::from_config(&Default::default()));
    let secrets: Arc<dyn SecretProvider> = Arc::new(StaticSecret::new(b"demo-signing-secret".to_vec()));
    let service = AuditLogService::new(store.clone(), classifier.clone(), secrets.clone());
    service.bootstrap()?;

    let context = RequestContext::for_actor("inspector-7")
        .with_source_ip("10.0.0.12")
        .with_user_agent("attest-demo/0.1");
    let gauge = Uuid::new_v4().to_string();

    println!("  [1] Writing five entries");
    let writes = [
        ActionData::new("login"),
        ActionData::new("create").subject("gauge", gauge.as_str()).after(json!({ "range_mm": 25 })),
        ActionData::new("calibrate")
            .subject("gauge", gauge.as_str())
            .before(json!({ "offset": 0.0 }))
            .after(json!({ "offset": 0.012 })),
        ActionData::new("update")
            .subject("gauge", gauge.as_str())
            .after(json!({ "location": "bay-3" })),
        ActionData::new("delete").subject("gauge", gauge.as_str()),
    ];
    for data in writes {
        if let Some(entry) = service.append(data.with_context(&context))? {
            println!(
                "      #{} {:<10} signed={}",
                entry.sequence,
                entry.action,
                entry.signature.is_some()
            );
        }
    }
    println!();

    let verifier =
        IntegrityVerifier::new(store.clone()).with_signature_checks(classifier, secrets.signing_secret());

    println!("  [2] Verifying the untouched chain");
    print_report(&verifier.verify_all()?);

    println!("  [3] Editing entry 3's after_state directly in the store");
    store.tamper(3, |e| e.after_state = Some(json!({ "offset": 0.5 })));
    print_report(&verifier.verify_all()?);

    println!("  [4] Taking the store offline and recording a login");
    store.set_offline(true);
    let outcome = service.record(ActionData::new("login").with_context(&context))?;
    println!("      record returned {:?} (caller not blocked)", outcome);
    store.set_offline(false);
    let outcome = service.record(ActionData::new("logout").with_context(&context))?;
    println!("      after recovery: {:?}", outcome);
    println!();

    Ok(())
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_report(report: &VerificationReport) {
    println!(
        "      range {}..={}: {} entries, {}",
        report.start_sequence,
        report.end_sequence,
        report.total_entries,
        if report.valid { "VALID" } else { "INVALID" }
    );
    for finding in &report.findings {
        println!(
            "      {:<6} {:<20} {}",
            finding.sequence,
            finding.kind.as_str(),
            if finding.propagated { "(propagated)" } else { "(origin)" }
        );
    }
    if let Some(first) = report.first_broken_at {
        println!("      first broken at sequence {}", first);
    }
    println!();
}

fn parse_state(raw: &str) -> AttestResult<Value> {
    serde_json::from_str(raw).map_err(|e| AttestError::Serialization {
        reason: format!("invalid JSON state '{}': {}", raw, e),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
