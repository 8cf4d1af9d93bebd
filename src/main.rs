use beads_rust::cli::commands;
use beads_rust::cli::{Cli, Commands};
use beads_rust::config;
use beads_rust::logging::init_logging;
use beads_rust::output::OutputContext;
use beads_rust::sync::auto_flush;
use beads_rust::{BeadsError, StructuredError};
use clap::Parser;
use std::io::{self, IsTerminal};
use std::path::Path;
use tracing::debug;

fn main() {
    // The hook installer writes scripts that invoke this binary as
    // `br --sync-now <pre-commit|post-merge|pre-push|post-checkout>`. This
    // sentinel is handled before clap's normal subcommand parsing (the
    // `Commands` enum has no slot for it) and always exits the process.
    let mut raw_args = std::env::args().skip(1);
    if let Some(flag) = raw_args.next() {
        if flag == "--sync-now" {
            let action = raw_args.next().unwrap_or_default();
            run_sync_now(&action);
        }
    }

    let cli = Cli::parse();

    // Initialize logging
    if let Err(e) = init_logging(cli.verbose, cli.quiet, None) {
        eprintln!("Failed to initialize logging: {e}");
        // Don't exit, just continue without logging or with basic stderr
    }

    let overrides = build_cli_overrides(&cli);
    let ctx = OutputContext::from_args(&cli);

    // Track if this command potentially mutates data (for auto-flush)
    let is_mutating = is_mutating_command(&cli.command);
    let json = cli.json;

    let result = match cli.command {
        Commands::Init {
            prefix,
            force,
            backend: _,
        } => commands::init::execute(prefix, force, None, &ctx),
        Commands::Create(args) => commands::create::execute(&args, &overrides),
        Commands::Update(args) => commands::update::execute(&args, &overrides),
        Commands::Delete(args) => commands::delete::execute(&args, &overrides),
        Commands::List(args) => commands::list::execute(&args, json),
        Commands::Comments(args) => commands::comments::execute(&args, json, &overrides, &ctx),
        Commands::Search(args) => commands::search::execute(&args, json, &overrides, &ctx),
        Commands::Show(args) => commands::show::execute(&args, json, &overrides, &ctx),
        Commands::Close(args) => {
            commands::close::execute_cli(&args, json || args.robot, &overrides)
        }
        Commands::Reopen(args) => {
            commands::reopen::execute(&args, json || args.robot, &overrides, &ctx)
        }
        Commands::Q(args) => commands::q::execute(args, &overrides),
        Commands::Dep { command } => commands::dep::execute(&command, json, &overrides, &ctx),
        Commands::Label { command } => commands::label::execute(&command, json, &overrides),
        Commands::Ready(args) => commands::ready::execute(&args, json, &overrides, &ctx),
        Commands::Blocked(args) => {
            commands::blocked::execute(&args, json || args.robot, &overrides)
        }
        Commands::Sync(args) => commands::sync::execute(&args, json, &overrides, &ctx),
        Commands::Doctor => commands::doctor::execute(json, &overrides),
        Commands::Hooks { command } => match command {
            beads_rust::cli::HooksCommands::Install => commands::hooks::execute(json, &overrides),
        },
        Commands::Daemons { command } => commands::daemons::execute(&command, json, &overrides),
        Commands::Version(_args) => commands::version::execute(json),
        Commands::Completions(args) => commands::completions::execute(&args),
        Commands::Config(args) => commands::config::execute(&args, json, &overrides),
        Commands::History(args) => commands::history::execute(args, &overrides, &ctx),
        Commands::Defer(args) => {
            let update_args = beads_rust::cli::UpdateArgs {
                ids: args.ids,
                defer: args.until,
                status: Some("deferred".to_string()),
                ..Default::default()
            };
            commands::update::execute(&update_args, &overrides)
        }
        Commands::Undefer(args) => {
            let update_args = beads_rust::cli::UpdateArgs {
                ids: args.ids,
                defer: Some(String::new()),       // Clear defer date
                status: Some("open".to_string()), // Reset to open
                ..Default::default()
            };
            commands::update::execute(&update_args, &overrides)
        }
    };

    // Handle command result
    if let Err(e) = result {
        handle_error(&e, cli.json);
    }

    // Auto-flush after successful mutating commands (unless --no-auto-flush)
    if is_mutating && !cli.no_auto_flush {
        run_auto_flush(&overrides);
    }
}

/// Handle the `--sync-now <action>` sentinel invoked by installed git hooks.
///
/// `pre-commit` / `pre-push` force a synchronous export so the journal never
/// reaches git stale; `post-merge` / `post-checkout` force a synchronous
/// import so the database picks up whatever the working tree just gained.
/// Exits the process with a hook-friendly status: 0 on success, non-zero
/// only when the action name itself is unrecognized (sync failures are
/// logged and swallowed -- a hook that aborts the commit/checkout it's
/// attached to would be far more disruptive than a stale journal).
fn run_sync_now(action: &str) -> ! {
    if let Err(e) = init_logging(0, true, None) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let beads_dir = match config::discover_beads_dir(Some(Path::new("."))) {
        Ok(dir) => dir,
        Err(e) => {
            debug!(?e, "sync-now: no .beads directory found, nothing to do");
            std::process::exit(0);
        }
    };

    let (mut storage, paths) = match config::open_storage(&beads_dir, None, None) {
        Ok(result) => result,
        Err(e) => {
            debug!(?e, "sync-now: could not open storage");
            std::process::exit(0);
        }
    };

    match action {
        "pre-commit" | "pre-push" => match auto_flush(&mut storage, &beads_dir) {
            Ok(result) => debug!(
                exported = result.exported_count,
                flushed = result.flushed,
                action,
                "sync-now: export complete"
            ),
            Err(e) => debug!(?e, action, "sync-now: export failed"),
        },
        "post-merge" | "post-checkout" => {
            let import_config = beads_rust::sync::ImportConfig {
                skip_prefix_validation: false,
                rename_on_import: false,
                clear_duplicate_external_refs: false,
                orphan_mode: beads_rust::sync::OrphanMode::Skip,
                force_upsert: false,
                beads_dir: Some(beads_dir.clone()),
                allow_external_jsonl: false,
                show_progress: false,
            };
            let prefix = storage.get_config("issue_prefix").ok().flatten();
            match beads_rust::sync::import_from_jsonl(
                &mut storage,
                &paths.jsonl_path,
                &import_config,
                prefix.as_deref(),
            ) {
                Ok(result) => debug!(
                    imported = result.imported_count,
                    action, "sync-now: import complete"
                ),
                Err(e) => debug!(?e, action, "sync-now: import failed"),
            }
        }
        other => {
            eprintln!("br --sync-now: unrecognized action '{other}'");
            std::process::exit(1);
        }
    }

    std::process::exit(0);
}

/// Determine if a command potentially mutates data.
const fn is_mutating_command(cmd: &Commands) -> bool {
    matches!(
        cmd,
        Commands::Create(_)
            | Commands::Update(_)
            | Commands::Delete(_)
            | Commands::Close(_)
            | Commands::Reopen(_)
            | Commands::Q(_)
            | Commands::Dep { .. }
            | Commands::Label { .. }
            | Commands::Comments(_)
            | Commands::Defer(_)
            | Commands::Undefer(_)
    )
}

/// Run auto-flush after mutating commands.
///
/// This discovers the beads directory, opens a fresh storage connection,
/// and exports any dirty issues to JSONL.
fn run_auto_flush(overrides: &config::CliOverrides) {
    // Try to discover beads directory
    let beads_dir = match config::discover_beads_dir(Some(Path::new("."))) {
        Ok(dir) => dir,
        Err(e) => {
            debug!(
                ?e,
                "Auto-flush skipped: could not discover .beads directory"
            );
            return;
        }
    };

    // Open storage with fresh connection
    let (mut storage, _paths) =
        match config::open_storage(&beads_dir, overrides.db.as_ref(), overrides.lock_timeout) {
            Ok(result) => result,
            Err(e) => {
                debug!(?e, "Auto-flush skipped: could not open storage");
                return;
            }
        };

    // Run auto-flush
    match auto_flush(&mut storage, &beads_dir) {
        Ok(result) => {
            if result.flushed {
                debug!(
                    exported = result.exported_count,
                    hash = %result.content_hash,
                    "Auto-flush completed"
                );
            }
        }
        Err(e) => {
            // Log but don't fail - auto-flush errors shouldn't break the command
            debug!(?e, "Auto-flush failed (non-fatal)");
        }
    }
}

/// Handle errors with structured output support.
///
/// When --json is set or stdout is not a TTY, outputs structured JSON to stderr.
/// Otherwise, outputs human-readable error with optional color.
fn handle_error(err: &BeadsError, json_mode: bool) -> ! {
    let structured = StructuredError::from_error(err);
    let exit_code = structured.code.exit_code();

    // Determine output mode: JSON if --json flag or stdout is not a terminal
    let use_json = json_mode || !io::stdout().is_terminal();

    if use_json {
        // Output structured JSON to stderr
        let json = structured.to_json();
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&json).unwrap_or_else(|_| json.to_string())
        );
    } else {
        // Human-readable output with color if stderr is a terminal
        let use_color = io::stderr().is_terminal();
        eprintln!("{}", structured.to_human(use_color));
    }

    std::process::exit(exit_code);
}

fn build_cli_overrides(cli: &Cli) -> config::CliOverrides {
    config::CliOverrides {
        db: cli.db.clone(),
        actor: cli.actor.clone(),
        identity: None,
        json: Some(cli.json),
        display_color: if cli.no_color { Some(false) } else { None },
        no_db: Some(cli.no_db),
        no_daemon: Some(cli.no_daemon),
        no_auto_flush: Some(cli.no_auto_flush),
        no_auto_import: Some(cli.no_auto_import),
        lock_timeout: cli.lock_timeout,
    }
}
