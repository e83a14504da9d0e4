//! aml-runner: headless driver for the compliance engine.
//!
//! Usage:
//!   aml-runner --seed 12345 --count 500 --db audit.db
//!   aml-runner --config aml.json --ipc-mode

use aml_core::{
    command::AdminCommand,
    compliance_reporting_subsystem::ExportFormat,
    config::AmlConfig,
    engine::ComplianceOrchestrator,
    model::{Customer, Recommendation, Transaction},
    stage::CheckOptions,
    store::AuditStore,
    synthetic::{PopulationConfig, SyntheticPopulation},
    AmlError,
};
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcRequest {
    Check {
        transaction: Transaction,
        customer:    Customer,
        #[serde(default)]
        history:     Option<Vec<Transaction>>,
        #[serde(default)]
        deadline_ms: Option<u64>,
    },
    Admin {
        command: AdminCommand,
    },
    Report {
        start:  DateTime<Utc>,
        end:    DateTime<Utc>,
        #[serde(default = "default_format")]
        format: ExportFormat,
    },
    Summary,
    ExportCatalogs,
    Quit,
}

fn default_format() -> ExportFormat {
    ExportFormat::Json
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let count = parse_arg(&args, "--count", 200usize);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let config = match string_arg(&args, "--config") {
        Some(path) => AmlConfig::load(path)?,
        None => AmlConfig::default(),
    };

    if !ipc_mode {
        println!("aml-runner");
        println!("  seed:   {seed}");
        println!("  count:  {count}");
        println!("  db:     {db}");
        println!();
    }

    let store = if db == ":memory:" {
        AuditStore::in_memory()?
    } else {
        AuditStore::open(db)?
    };
    store.migrate()?;

    let orchestrator = ComplianceOrchestrator::new(config);

    if ipc_mode {
        run_ipc_loop(&orchestrator, &store)?;
    } else {
        run_batch(&orchestrator, &store, seed, count)?;
    }
    Ok(())
}

fn run_batch(orchestrator: &ComplianceOrchestrator, store: &AuditStore, seed: u64, count: usize) -> Result<()> {
    let started = Utc::now() - Duration::seconds(1);
    let mut population = SyntheticPopulation::new(
        seed,
        PopulationConfig {
            high_risk_countries: orchestrator.config().high_risk_countries.clone(),
            ..PopulationConfig::default()
        },
    );

    let mut failures = 0usize;
    for case in population.generate_cases(count) {
        match orchestrator.perform_compliance_check(&case.transaction, &case.customer, Some(&case.history)) {
            Ok(assessment) => {
                store.insert_assessment(&assessment)?;
            }
            Err(e) => {
                failures += 1;
                log::error!("tx={} could not be assessed: {e}", case.transaction.id);
            }
        }
    }

    let report = orchestrator.generate_compliance_report(started, Utc::now() + Duration::seconds(1))?;
    let stats = &report.statistics;
    println!("=== RUN SUMMARY ===");
    println!("  assessed:        {}", stats.total_transactions);
    println!("  failed:          {failures}");
    println!("  approved:        {}", stats.approved_transactions);
    println!("  pending review:  {}", stats.flagged_transactions);
    println!("  rejected:        {}", stats.rejected_transactions);
    println!("  avg risk score:  {}", stats.average_risk_score);
    println!("  sanction hits:   {}", report.sanction_matches);
    println!("  stored rows:     {}", store.assessment_count()?);
    println!();
    println!("=== TOP RISK FACTORS ===");
    for f in &report.top_risk_factors {
        println!("  {:<18} {}", f.factor, f.count);
    }
    Ok(())
}

fn run_ipc_loop(orchestrator: &ComplianceOrchestrator, store: &AuditStore) -> Result<()> {
    let stdin = io::stdin();
    serve(orchestrator, store, stdin.lock(), io::stdout())
}

/// One JSON request per line in, one JSON reply per line out, until EOF
/// or a `quit` request. Per-request failures become error replies.
fn serve<R: BufRead, W: Write>(
    orchestrator: &ComplianceOrchestrator,
    store: &AuditStore,
    mut input: R,
    mut output: W,
) -> Result<()> {
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = input.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let request: IpcRequest = match serde_json::from_str(&buffer) {
            Ok(r) => r,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(output, "{}", err_json)?;
                output.flush()?;
                continue;
            }
        };

        let Some(reply) = handle_request(orchestrator, store, request) else {
            break;
        };
        writeln!(output, "{}", reply)?;
        output.flush()?;
    }
    Ok(())
}

/// `None` means the client asked to quit.
fn handle_request(
    orchestrator: &ComplianceOrchestrator,
    store: &AuditStore,
    request: IpcRequest,
) -> Option<serde_json::Value> {
    let reply = match request {
        IpcRequest::Quit => return None,
        IpcRequest::Check { transaction, customer, history, deadline_ms } => {
            let mut options = CheckOptions::default();
            if let Some(ms) = deadline_ms {
                options = options.with_deadline(std::time::Duration::from_millis(ms));
            }
            match orchestrator.perform_compliance_check_with(
                &transaction,
                &customer,
                history.as_deref(),
                &options,
            ) {
                Ok(assessment) => match store.insert_assessment(&assessment) {
                    Ok(_) => serde_json::json!({ "assessment": assessment }),
                    Err(e) => {
                        log::error!("tx={} assessment not persisted: {e}", transaction.id);
                        failure_reply(&e, Some(Recommendation::PendingReview))
                    }
                },
                Err(e) => failure_reply(&e, Some(Recommendation::PendingReview)),
            }
        }
        IpcRequest::Admin { command } => match orchestrator.apply_command(command) {
            Ok(outcome) => serde_json::json!({ "outcome": outcome }),
            Err(e) => failure_reply(&e, None),
        },
        IpcRequest::Report { start, end, format } => {
            match orchestrator
                .generate_compliance_report(start, end)
                .and_then(|r| orchestrator.export_report(&r, format))
            {
                Ok(body) => serde_json::json!({ "format": format, "body": body }),
                Err(e) => failure_reply(&e, None),
            }
        }
        IpcRequest::Summary => serde_json::json!({ "summary": orchestrator.compliance_summary() }),
        IpcRequest::ExportCatalogs => serde_json::json!({ "catalogs": orchestrator.export_catalogs() }),
    };
    Some(reply)
}

/// A failed check is never reported as approved; callers get the
/// fallback recommendation alongside the error.
fn failure_reply(e: &AmlError, fallback: Option<Recommendation>) -> serde_json::Value {
    serde_json::json!({
        "error": e.to_string(),
        "stage": e.stage().map(|s| s.name()),
        "fallback": fallback,
    })
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check_line(id: &str) -> String {
        let now = Utc::now();
        serde_json::json!({
            "type": "check",
            "transaction": {
                "id": id,
                "amount": "1200",
                "currency": "USD",
                "sender": { "name": "Alice Smith", "account_id": "acct-alice", "country": "US" },
                "receiver": { "name": "Bob Jones", "account_id": "acct-bob", "country": "US" },
                "timestamp": now,
                "transfer_type": "transfer",
            },
            "customer": {
                "id": "cust-alice",
                "name": "Alice Smith",
                "account_created_at": now - Duration::days(400),
            },
        })
        .to_string()
    }

    fn replies(store: &AuditStore, lines: &[String]) -> Vec<serde_json::Value> {
        let orchestrator = ComplianceOrchestrator::new(AmlConfig::default());
        let input = lines.join("\n");
        let mut output = Vec::new();
        serve(&orchestrator, store, input.as_bytes(), &mut output).unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn store_failure_replies_with_error_and_keeps_serving() {
        // No migration, so the assessment table is missing.
        let store = AuditStore::in_memory().unwrap();
        let lines = vec![
            check_line("tx-1"),
            r#"{"type":"summary"}"#.to_string(),
            check_line("tx-2"),
        ];
        let out = replies(&store, &lines);

        assert_eq!(out.len(), 3);
        assert!(out[0]["error"].is_string());
        assert_eq!(out[0]["fallback"], "pending_review");
        assert!(out[1]["summary"].is_object());
        assert!(out[2]["error"].is_string());
    }

    #[test]
    fn checks_are_persisted_when_the_store_is_ready() {
        let store = AuditStore::in_memory().unwrap();
        store.migrate().unwrap();
        let lines = vec![check_line("tx-1"), r#"{"type":"quit"}"#.to_string(), check_line("tx-2")];
        let out = replies(&store, &lines);

        assert_eq!(out.len(), 1);
        assert!(out[0]["assessment"].is_object());
        assert_eq!(store.assessment_count().unwrap(), 1);
    }
}
