use crate::config::{ConfigError, ConfigOverrides, IndexerConfig, SupportPolicy};
use crate::governance::{
    EventEnvelope, HandleOutcome, IndexerError, Proposal, ProposalEventKind, ProposalId,
    ProposalTracker, Provenance,
};
use crate::report::{report_format, Report, ReportFormat};
use crate::storage::errors::StorageError;
use crate::storage::traits::Storage;
use crate::storage::{FileStorage, InMemoryStorage};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use log::{debug, info};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Indexer(#[from] IndexerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Feed line {line}: {details}")]
    Feed { line: usize, details: String },

    #[error("Event at feed line {line} failed: {source}")]
    Event {
        line: usize,
        #[source]
        source: IndexerError,
    },

    #[error("Proposal {0} not found")]
    ProposalNotFound(ProposalId),
}

pub fn build_cli() -> Command {
    Command::new("governor-indexer")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Indexes governor contract events into proposal, vote and audit records")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory of the file store (default: $GOVERNOR_INDEXER_DATA_DIR or ./governor-data)")
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("JSON file with config overrides")
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print output as JSON lines")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("FILE")
                .help("Also append replay reports to this file")
                .global(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging (RUST_LOG takes precedence)")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("replay")
                .about("Apply a JSON Lines event feed in order")
                .arg(
                    Arg::new("feed")
                        .value_name("FILE")
                        .help("Event feed, one JSON envelope per line")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("memory")
                        .long("memory")
                        .help("Replay into a throwaway in-memory store and print the result")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("skip-errors")
                        .long("skip-errors")
                        .help("Report failing events and keep going")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("strict-support")
                        .long("strict-support")
                        .help("Reject support codes above 2 instead of counting them as abstain")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("cancel-sets-state")
                        .long("cancel-sets-state")
                        .help("Move proposals to Canceled on ProposalCanceled")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-dedup")
                        .long("no-dedup")
                        .help("Do not skip redelivered events")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-ordering")
                        .long("no-ordering")
                        .help("Do not reject events behind the cursor")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("proposal")
                .about("Show one proposal")
                .arg(proposal_id_arg()),
        )
        .subcommand(Command::new("proposals").about("List all proposals"))
        .subcommand(
            Command::new("votes")
                .about("List the votes cast on a proposal")
                .arg(proposal_id_arg()),
        )
        .subcommand(
            Command::new("history")
                .about("List the lifecycle events recorded for a proposal")
                .arg(proposal_id_arg()),
        )
}

fn proposal_id_arg() -> Arg {
    Arg::new("id")
        .value_name("PROPOSAL_ID")
        .help("Proposal id, hex (0x...) or decimal")
        .required(true)
}

/// Resolves config: defaults, environment, `--config` file, then flags
pub fn resolve_config(matches: &ArgMatches) -> Result<IndexerConfig, CliError> {
    let mut config = IndexerConfig::from_env()?;
    if let Some(path) = matches.get_one::<PathBuf>("config") {
        ConfigOverrides::from_file(path)?.apply_to(&mut config);
    }

    let mut flags = ConfigOverrides {
        data_dir: matches.get_one::<PathBuf>("data-dir").cloned(),
        ..Default::default()
    };
    if let Some(("replay", sub)) = matches.subcommand() {
        if sub.get_flag("strict-support") {
            flags.support_policy = Some(SupportPolicy::Strict);
        }
        if sub.get_flag("cancel-sets-state") {
            flags.cancel_sets_state = Some(true);
        }
        if sub.get_flag("no-dedup") {
            flags.dedup_redeliveries = Some(false);
        }
        if sub.get_flag("no-ordering") {
            flags.enforce_ordering = Some(false);
        }
    }
    flags.apply_to(&mut config);
    debug!("Resolved config: {:?}", config);
    Ok(config)
}

pub fn run(matches: &ArgMatches) -> Result<(), CliError> {
    let config = resolve_config(matches)?;

    match matches.subcommand() {
        Some(("replay", sub)) => {
            let feed = sub
                .get_one::<PathBuf>("feed")
                .ok_or_else(|| CliError::Feed {
                    line: 0,
                    details: "no feed file given".to_string(),
                })?;
            let skip_errors = sub.get_flag("skip-errors");

            if sub.get_flag("memory") {
                let mut tracker = ProposalTracker::new(InMemoryStorage::new(), config);
                replay_feed(&mut tracker, feed, skip_errors)?;
                for proposal in tracker.proposals()? {
                    print_proposal(&proposal)?;
                }
            } else {
                let storage = FileStorage::new(&config.data_dir)?;
                let mut tracker = ProposalTracker::new(storage, config);
                replay_feed(&mut tracker, feed, skip_errors)?;
            }
            Ok(())
        }
        Some((command, sub)) => {
            let storage = FileStorage::new(&config.data_dir)?;
            let tracker = ProposalTracker::new(storage, config);
            match command {
                "proposals" => {
                    for proposal in tracker.proposals()? {
                        print_proposal(&proposal)?;
                    }
                    Ok(())
                }
                "proposal" => {
                    let id = parse_id(sub)?;
                    let proposal = tracker
                        .proposal(&id)?
                        .ok_or(CliError::ProposalNotFound(id))?;
                    print_proposal(&proposal)
                }
                "votes" => {
                    let id = parse_id(sub)?;
                    require_proposal(&tracker, &id)?;
                    for vote in tracker.votes(&id)? {
                        match report_format() {
                            ReportFormat::Json => println!("{}", serde_json::to_string(&vote)?),
                            ReportFormat::Pretty => println!(
                                "{} {} support={} weight={} block={} at {} {}",
                                vote.id,
                                vote.voter,
                                vote.support,
                                vote.weight,
                                vote.provenance.block_number,
                                block_time(&vote.provenance),
                                vote.reason
                            ),
                        }
                    }
                    Ok(())
                }
                "history" => {
                    let id = parse_id(sub)?;
                    require_proposal(&tracker, &id)?;
                    for record in tracker.proposal_events(&id)? {
                        match report_format() {
                            ReportFormat::Json => println!("{}", serde_json::to_string(&record)?),
                            ReportFormat::Pretty => {
                                let kind = match &record.kind {
                                    ProposalEventKind::Created => "Created".to_string(),
                                    ProposalEventKind::Queued { eta_seconds } => {
                                        format!("Queued eta={}", eta_seconds)
                                    }
                                    ProposalEventKind::Executed => "Executed".to_string(),
                                    ProposalEventKind::Canceled => "Canceled".to_string(),
                                };
                                println!(
                                    "{} {} at {} tx={}",
                                    record.id,
                                    kind,
                                    block_time(&record.provenance),
                                    record.provenance.transaction_hash
                                );
                            }
                        }
                    }
                    Ok(())
                }
                other => Err(CliError::Feed {
                    line: 0,
                    details: format!("unknown command '{}'", other),
                }),
            }
        }
        None => Ok(()),
    }
}

fn parse_id(sub: &ArgMatches) -> Result<ProposalId, CliError> {
    let raw = sub.get_one::<String>("id").map(String::as_str).unwrap_or("");
    Ok(raw.parse::<ProposalId>()?)
}

fn require_proposal<S: Storage>(
    tracker: &ProposalTracker<S>,
    id: &ProposalId,
) -> Result<(), CliError> {
    match tracker.proposal(id)? {
        Some(_) => Ok(()),
        None => Err(CliError::ProposalNotFound(id.clone())),
    }
}

/// Counts from one replay
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub applied: usize,
    pub redelivered: usize,
    pub failed: usize,
}

/// Feeds every envelope in `path` through the tracker.
///
/// Blank lines and lines starting with `#` are ignored. Without
/// `skip_errors` the first malformed line or rejected event ends the replay.
pub fn replay_feed<S: Storage>(
    tracker: &mut ProposalTracker<S>,
    path: &Path,
    skip_errors: bool,
) -> Result<ReplaySummary, CliError> {
    let reader = BufReader::new(File::open(path)?);
    let mut summary = ReplaySummary::default();
    info!("Replaying {}", path.display());

    for (index, line) in reader.lines().enumerate() {
        let line_no = index + 1;
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let envelope: EventEnvelope = match serde_json::from_str(trimmed) {
            Ok(envelope) => envelope,
            Err(e) => {
                let err = CliError::Feed {
                    line: line_no,
                    details: e.to_string(),
                };
                if !skip_errors {
                    return Err(err);
                }
                summary.failed += 1;
                Report::error("feed", err.to_string()).emit()?;
                continue;
            }
        };

        let name = envelope.event.name();
        let position = envelope.provenance.event_id();
        match tracker.handle(&envelope) {
            Ok(HandleOutcome::Applied) => {
                summary.applied += 1;
                let verb = if envelope.event.is_informational() {
                    "mirrored"
                } else {
                    "applied"
                };
                Report::info(name, format!("{} at {}", verb, position)).emit()?;
            }
            Ok(HandleOutcome::Redelivered) => {
                summary.redelivered += 1;
                Report::warn(name, format!("redelivery at {} skipped", position)).emit()?;
            }
            Err(e) => {
                if !skip_errors {
                    return Err(CliError::Event {
                        line: line_no,
                        source: e,
                    });
                }
                summary.failed += 1;
                Report::error(name, format!("line {} at {}: {}", line_no, position, e)).emit()?;
            }
        }
    }

    Report::info(
        "replay",
        format!(
            "{} applied, {} redelivered, {} failed",
            summary.applied, summary.redelivered, summary.failed
        ),
    )
    .with_data(serde_json::to_value(summary)?)
    .emit()?;
    Ok(summary)
}

fn block_time(provenance: &Provenance) -> String {
    match provenance.timestamp_utc() {
        Some(time) => time.to_rfc3339(),
        None => format!("ts={}", provenance.block_timestamp),
    }
}

fn print_proposal(proposal: &Proposal) -> Result<(), CliError> {
    match report_format() {
        ReportFormat::Json => println!("{}", serde_json::to_string(proposal)?),
        ReportFormat::Pretty => {
            println!("{} {}", "Proposal".bold(), proposal.id);
            println!("  State:       {}", proposal.state.to_string().cyan());
            println!("  Proposer:    {}", proposal.proposer);
            println!("  Voting:      {}..{}", proposal.vote_start, proposal.vote_end);
            println!("  Votes for:   {}", proposal.votes_for.to_string().green());
            println!("  Against:     {}", proposal.votes_against.to_string().red());
            println!("  Abstain:     {}", proposal.votes_abstain);
            match proposal.total_weight() {
                Some(total) => println!("  Total:       {}", total),
                None => println!("  Total:       {}", "exceeds uint256".yellow()),
            }
            println!("  Vote count:  {}", proposal.votes_total);
            println!("  Actions:     {}", proposal.targets.len());
            println!("  Description: {}", proposal.description);
        }
    }
    Ok(())
}
