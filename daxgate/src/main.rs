//! Operator tooling for the daxgate trust-boundary subsystem.
//!
//! This binary exposes the audit subsystem's operational surface: segment
//! integrity verification and sanitizer dry-runs. It never collects user
//! intent and never talks to an LLM backend.

use anyhow::{Context, bail};
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use daxgate_core::{BoundaryConfig, DaxGateError, Schema, SchemaSanitizer, verify_segment};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "daxgate")]
#[command(about = "Audit verification and boundary dry-run tooling")]
#[command(version)]
#[command(long_about = "
daxgate - operator tooling for the trust-boundary subsystem

COMMANDS:
- verify:   replay an audit segment, recomputing its hash chain and
            (with a key) its HMAC signatures, to detect tampering
- sanitize: dry-run a schema JSON file through the boundary sanitizer
            and print the canonical prompt plus any violations

SECURITY NOTES:
- Verification is read-only; segments are never modified
- The sanitize dry-run performs no network activity
- Signing keys are accepted base64-encoded via flag or environment and
  are never written anywhere by this tool
")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    verbose: u8,

    /// Suppress output
    #[arg(short, long, help = "Suppress all output except errors")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Verify the integrity of an audit log segment
    Verify(VerifyArgs),
    /// Dry-run a schema file through the boundary sanitizer
    Sanitize(SanitizeArgs),
}

#[derive(Args)]
struct VerifyArgs {
    /// Audit segment file (.jsonl)
    segment: PathBuf,

    /// HMAC signing key, base64-encoded; omit for chain-only verification
    #[arg(long, env = "DAXGATE_SIGNING_KEY")]
    signing_key: Option<String>,

    /// Emit the full report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct SanitizeArgs {
    /// Schema JSON file
    schema: PathBuf,

    /// Disable strict mode: redact findings instead of failing
    #[arg(long)]
    lax: bool,

    /// Exclude measure expressions
    #[arg(long)]
    no_measures: bool,

    /// Exclude free-text descriptions
    #[arg(long)]
    no_descriptions: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    daxgate_core::init_logging(cli.global.verbose, cli.global.quiet)?;

    match cli.command {
        Command::Verify(args) => verify(&args),
        Command::Sanitize(args) => sanitize(&args),
    }
}

fn verify(args: &VerifyArgs) -> anyhow::Result<()> {
    let key = args
        .signing_key
        .as_deref()
        .map(|encoded| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .context("signing key is not valid base64")
        })
        .transpose()?;

    let report = verify_segment(&args.segment, key.as_deref())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("segment:  {}", report.file.display());
        println!("events:   {}", report.events_checked);
        println!(
            "chain:    {}",
            if report.chain_failures.is_empty() {
                "intact".to_string()
            } else {
                format!("BROKEN at lines {:?}", report.chain_failures)
            }
        );
        println!(
            "signatures: {}",
            match (key.is_some(), report.signature_failures.is_empty()) {
                (false, _) => "not checked (no key)".to_string(),
                (true, true) => "valid".to_string(),
                (true, false) => format!("INVALID at lines {:?}", report.signature_failures),
            }
        );
        if let Some(error) = &report.error {
            println!("error:    {error}");
        }
    }

    if !report.valid {
        bail!("segment failed verification");
    }
    info!("segment verified");
    Ok(())
}

fn sanitize(args: &SanitizeArgs) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(&args.schema)
        .with_context(|| format!("cannot read {}", args.schema.display()))?;
    let schema: Schema = serde_json::from_str(&raw).context("schema file is not valid JSON")?;

    let sanitizer = SchemaSanitizer::new(BoundaryConfig {
        strict_mode: !args.lax,
        allow_measures: !args.no_measures,
        allow_descriptions: !args.no_descriptions,
        ..BoundaryConfig::default()
    });

    match sanitizer.sanitize(&schema) {
        Ok(result) => {
            println!("{}", result.schema.to_prompt_string());
            if !result.violations.is_empty() {
                eprintln!("\n{} violation(s):", result.violations.len());
                for violation in &result.violations {
                    eprintln!("  - {}", violation.message);
                }
            }
            Ok(())
        }
        Err(DaxGateError::BoundaryViolation { violations }) => {
            eprintln!("schema rejected by data boundary:");
            for violation in &violations {
                eprintln!("  - {}", violation.message);
            }
            bail!("{} violation(s) detected", violations.len());
        }
        Err(other) => Err(other.into()),
    }
}
