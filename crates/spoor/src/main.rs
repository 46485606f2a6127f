//! # spoor
//!
//! CLI for the stigmergic coordination core — wires the event store, the
//! phase engine, the journal, and the sentinel together over one shared
//! `SQLite` file. Every command prints a single JSON object; exit status is
//! zero for any protocol outcome (including blocked calls) and non-zero
//! only for internal errors.

#![deny(unsafe_code)]

mod session_file;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use spoor_core::AgentRegistry;
use spoor_events::{
    ConnectionConfig, EventStore, ImmunizationStatus, JournalStore, SbeContract,
};
use spoor_protocol::{
    ExecuteRequest, PerceiveRequest, PhaseReply, ProtocolEngine, ReactRequest, SessionStore,
    YieldRequest,
};
use spoor_sentinel::{DaemonConfig, ExclusiveLock, Reaper, Thresholds, Watchdog};
use spoor_settings::SpoorSettings;

use crate::session_file::FileSessionStore;

/// Stigmergic coordination core.
#[derive(Parser, Debug)]
#[command(name = "spoor", about = "Stigmergic coordination core", version)]
struct Cli {
    /// Path to the shared `SQLite` database (overrides settings).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Path to the settings file (default: `~/.spoor/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a session: record observations and receive a nonce.
    Perceive {
        /// Acting agent ID.
        #[arg(long)]
        agent: String,
        /// What the agent set out to investigate.
        #[arg(long)]
        probe: String,
        /// Observation (repeatable).
        #[arg(long = "observation")]
        observations: Vec<String>,
        /// Reference to a prior signal or journal entry (repeatable).
        #[arg(long = "memory-ref")]
        memory_refs: Vec<String>,
    },
    /// Commit to an analysis and plan; consumes the perceive nonce.
    React {
        /// Acting agent ID.
        #[arg(long)]
        agent: String,
        /// Nonce from the perceive receipt.
        #[arg(long)]
        nonce: String,
        /// Analysis of the observations.
        #[arg(long)]
        analysis: String,
        /// Where the agent intends to steer the system.
        #[arg(long)]
        intent: String,
        /// Leverage level of the intervention (1–13).
        #[arg(long, default_value_t = 6)]
        meadows_level: u8,
        /// Plan step (repeatable, in order).
        #[arg(long = "plan-step")]
        plan: Vec<String>,
    },
    /// Record one execution step; repeatable within a session.
    Execute {
        /// Acting agent ID.
        #[arg(long)]
        agent: String,
        /// Token from the react receipt.
        #[arg(long)]
        token: String,
        /// What was done in this step.
        #[arg(long)]
        summary: String,
        /// Contract precondition.
        #[arg(long)]
        given: String,
        /// Contract action.
        #[arg(long)]
        when: String,
        /// Contract outcome.
        #[arg(long)]
        then: String,
        /// Artifact produced (repeatable).
        #[arg(long = "artifact")]
        artifacts: Vec<String>,
    },
    /// Close the session with a delivery summary.
    Yield {
        /// Acting agent ID.
        #[arg(long)]
        agent: String,
        /// Token from the react receipt.
        #[arg(long)]
        token: String,
        /// Delivery summary.
        #[arg(long)]
        summary: String,
        /// Outcome: `passed` or `failed`.
        #[arg(long, default_value = "passed")]
        status: String,
        /// Confidence the work landed (0–100).
        #[arg(long, default_value_t = 50)]
        confidence: u8,
    },
    /// Hash-chained identity journal.
    Journal {
        #[command(subcommand)]
        action: JournalCommand,
    },
    /// Scan the log for anomalies.
    Watchdog {
        /// Scan window in seconds (default from settings).
        #[arg(long)]
        window_secs: Option<u64>,
        /// Append findings to the log instead of only printing them.
        #[arg(long)]
        report: bool,
    },
    /// Close orphaned sessions with synthetic failure yields.
    Reap {
        /// Age limit in hours (default from settings).
        #[arg(long)]
        max_age_hours: Option<f64>,
        /// Scan and print orphans without writing yields.
        #[arg(long)]
        dry_run: bool,
    },
    /// Log and session overview.
    Status,
    /// Run watchdog and reaper loops until interrupted.
    Daemon,
}

#[derive(Subcommand, Debug)]
enum JournalCommand {
    /// Append an entry to an identity's chain.
    Write {
        /// Chain identity.
        #[arg(long)]
        identity: String,
        /// Entry type (memory, insight, decision, artifact, attack, delivery, note).
        #[arg(long)]
        entry_type: String,
        /// Entry content.
        #[arg(long)]
        content: String,
    },
    /// Recompute every link of an identity's chain.
    Verify {
        /// Chain identity.
        #[arg(long)]
        identity: String,
    },
    /// Show the chain head.
    Head {
        /// Chain identity.
        #[arg(long)]
        identity: String,
    },
    /// Bucket entries into recency tiers.
    Ladder {
        /// Chain identity.
        #[arg(long)]
        identity: String,
    },
}

fn load_settings(cli: &Cli) -> Result<SpoorSettings> {
    let settings = match &cli.settings {
        Some(path) => spoor_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => spoor_settings::load_settings().context("failed to load settings")?,
    };
    Ok(settings)
}

struct App {
    settings: SpoorSettings,
    store: Arc<EventStore>,
    pool: spoor_events::ConnectionPool,
}

impl App {
    fn open(cli: &Cli) -> Result<Self> {
        let settings = load_settings(cli)?;
        let db_path = cli
            .db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&settings.database.path));
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        let config = ConnectionConfig {
            pool_size: settings.database.pool_size,
            busy_timeout_ms: settings.database.busy_timeout_ms,
            ..ConnectionConfig::default()
        };
        let pool = spoor_events::new_file(&db_path.to_string_lossy(), &config)
            .context("failed to open database")?;
        {
            let conn = pool.get().context("failed to get a connection")?;
            let _ = spoor_events::run_migrations(&conn).context("failed to run migrations")?;
        }

        Ok(Self {
            settings,
            store: Arc::new(EventStore::new(pool.clone())),
            pool,
        })
    }

    fn source(&self) -> &str {
        if self.settings.source.is_empty() {
            "spoor_cli"
        } else {
            &self.settings.source
        }
    }

    fn engine(&self) -> ProtocolEngine {
        let registry = AgentRegistry::new(self.settings.registry.agents.clone());
        let sessions: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(
            spoor_settings::spoor_dir().join("sessions.json"),
        ));
        ProtocolEngine::new(Arc::clone(&self.store), registry, sessions, self.source())
    }

    fn watchdog(&self) -> Watchdog {
        let registry = AgentRegistry::new(self.settings.registry.agents.clone());
        let thresholds = Thresholds {
            gate_block_storm: self.settings.watchdog.gate_block_storm_threshold,
            tamper_cluster: self.settings.watchdog.tamper_cluster_threshold,
            orphan_ratio: self.settings.watchdog.orphan_ratio_threshold,
            rapid_perceive: self.settings.watchdog.rapid_perceive_threshold,
        };
        Watchdog::new(Arc::clone(&self.store), registry, thresholds, "spoor_watchdog")
    }

    fn reaper(&self) -> Reaper {
        Reaper::new(
            Arc::clone(&self.store),
            "spoor_reaper",
            self.settings.reaper.health_prefixes.clone(),
        )
    }

    fn journal(&self) -> JournalStore {
        JournalStore::new(self.pool.clone())
    }
}

fn reply_json(reply: &PhaseReply) -> serde_json::Value {
    match reply {
        PhaseReply::Advanced(receipt) => serde_json::json!({
            "outcome": "advanced",
            "session_id": receipt.session_id,
            "phase": receipt.phase,
            "credential": receipt.credential,
            "step": receipt.step,
            "seq": receipt.seq,
            "content_hash": receipt.content_hash,
        }),
        PhaseReply::Blocked(receipt) => serde_json::json!({
            "outcome": "blocked",
            "reason": receipt.reason,
            "tampered": receipt.tampered,
        }),
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    spoor_core::logging::init_subscriber("warn");
    let cli = Cli::parse();
    let app = App::open(&cli)?;

    match cli.command {
        Command::Perceive {
            agent,
            probe,
            observations,
            memory_refs,
        } => {
            let reply = app.engine().perceive(
                &agent,
                PerceiveRequest {
                    probe,
                    observations,
                    memory_refs,
                },
            )?;
            print_json(&reply_json(&reply))?;
        }
        Command::React {
            agent,
            nonce,
            analysis,
            intent,
            meadows_level,
            plan,
        } => {
            let reply = app.engine().react(
                &agent,
                ReactRequest {
                    perceive_nonce: nonce,
                    analysis,
                    navigation_intent: intent,
                    meadows_level,
                    sequential_plan: plan,
                },
            )?;
            print_json(&reply_json(&reply))?;
        }
        Command::Execute {
            agent,
            token,
            summary,
            given,
            when,
            then,
            artifacts,
        } => {
            let reply = app.engine().execute(
                &agent,
                ExecuteRequest {
                    token,
                    action_summary: summary,
                    sbe: SbeContract { given, when, then },
                    artifacts,
                    fail_closed_gate: true,
                },
            )?;
            print_json(&reply_json(&reply))?;
        }
        Command::Yield {
            agent,
            token,
            summary,
            status,
            confidence,
        } => {
            let immunization_status = match status.to_lowercase().as_str() {
                "passed" => ImmunizationStatus::Passed,
                "failed" => ImmunizationStatus::Failed,
                other => bail!("unknown status '{other}': expected passed or failed"),
            };
            let reply = app.engine().yield_phase(
                &agent,
                YieldRequest {
                    token,
                    summary,
                    immunization_status,
                    mutation_confidence: confidence,
                    completion: None,
                },
            )?;
            print_json(&reply_json(&reply))?;
        }
        Command::Journal { action } => run_journal(&app, action)?,
        Command::Watchdog {
            window_secs,
            report,
        } => {
            let window = window_secs.unwrap_or(app.settings.watchdog.window_secs);
            let watchdog = app.watchdog();
            let findings = if report {
                watchdog.report(window)?
            } else {
                watchdog.scan(window)?
            };
            print_json(&serde_json::json!({
                "window_secs": window,
                "finding_count": findings.len(),
                "findings": findings,
            }))?;
        }
        Command::Reap {
            max_age_hours,
            dry_run,
        } => {
            let max_age = max_age_hours.unwrap_or(app.settings.reaper.max_age_hours);
            let reaper = app.reaper();
            if dry_run {
                let orphans = reaper.scan_orphans(max_age)?;
                print_json(&serde_json::json!({
                    "max_age_hours": max_age,
                    "total_orphans": orphans.len(),
                    "orphans": orphans,
                }))?;
            } else {
                let report = reaper.reap(max_age)?;
                print_json(&serde_json::to_value(&report)?)?;
            }
        }
        Command::Status => {
            let store = &app.store;
            let sessions = FileSessionStore::new(spoor_settings::spoor_dir().join("sessions.json"));
            print_json(&serde_json::json!({
                "signals": store.max_seq()?,
                "perceives": store.count_by_type("prey8.perceive")?,
                "yields": store.count_by_type("prey8.yield")?,
                "gate_blocked": store.count_by_type("prey8.gate_blocked")?,
                "tamper_alerts": store.count_by_type("prey8.tamper_alert")?,
                "findings": store.count_by_type_prefix("watchdog.")?,
                "health_ratio": app.reaper().health_ratio()?,
                "live_sessions": sessions.live().len(),
            }))?;
        }
        Command::Daemon => {
            let lock_path = spoor_settings::spoor_dir().join("daemon.lock");
            if let Some(parent) = lock_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let _lock = ExclusiveLock::acquire(&lock_path)
                .context("another spoor daemon is already running")?;

            let config = DaemonConfig {
                watchdog_interval_secs: app.settings.watchdog.interval_secs,
                watchdog_window_secs: app.settings.watchdog.window_secs,
                reaper_interval_secs: app.settings.reaper.interval_secs,
                reaper_max_age_hours: app.settings.reaper.max_age_hours,
            };
            tokio::select! {
                () = spoor_sentinel::run(app.watchdog(), app.reaper(), config) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                }
            }
        }
    }

    Ok(())
}

fn run_journal(app: &App, action: JournalCommand) -> Result<()> {
    let journal = app.journal();
    match action {
        JournalCommand::Write {
            identity,
            entry_type,
            content,
        } => {
            let entry = journal.write(&identity, &entry_type, &content)?;
            print_json(&serde_json::to_value(&entry)?)?;
        }
        JournalCommand::Verify { identity } => {
            let report = journal.verify(&identity)?;
            print_json(&serde_json::json!({
                "identity": identity,
                "valid": report.valid,
                "total": report.total,
                "broken_at": report.broken_at,
            }))?;
        }
        JournalCommand::Head { identity } => {
            let head = journal.head(&identity)?;
            print_json(&serde_json::to_value(&head)?)?;
        }
        JournalCommand::Ladder { identity } => {
            let tiers = journal.ladder(&identity)?;
            let value: Vec<serde_json::Value> = tiers
                .iter()
                .map(|tier| {
                    serde_json::json!({
                        "tier": tier.label,
                        "count": tier.entries.len(),
                        "entries": tier.entries,
                    })
                })
                .collect();
            print_json(&serde_json::json!({ "identity": identity, "tiers": value }))?;
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn blocked_reply_serializes_reason() {
        let reply = PhaseReply::Blocked(spoor_protocol::BlockReceipt {
            reason: "unknown agent".into(),
            tampered: false,
        });
        let value = reply_json(&reply);
        assert_eq!(value["outcome"], "blocked");
        assert_eq!(value["reason"], "unknown agent");
        assert_eq!(value["tampered"], false);
    }

    #[test]
    fn advanced_reply_serializes_receipt() {
        let reply = PhaseReply::Advanced(spoor_protocol::PhaseReceipt {
            session_id: "a1b2c3d4e5f60718".into(),
            phase: spoor_core::Phase::Perceived,
            credential: Some("0AF3C9".into()),
            step: 0,
            content_hash: "00".repeat(32),
            seq: 1,
        });
        let value = reply_json(&reply);
        assert_eq!(value["outcome"], "advanced");
        assert_eq!(value["phase"], "PERCEIVED");
        assert_eq!(value["credential"], "0AF3C9");
    }
}
