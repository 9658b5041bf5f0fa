//! `nimbus apply` - converge resources to the manifest

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::{ExecuteOptions, ExecuteReport, ExecuteSummary, Outcome, ResourceOutcome};

use super::{Session, plan};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::config::Settings;
use crate::progress::BarProgress;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let settings = Settings::load()?;
    let state = settings.state_file(args.plan.state.as_deref())?;
    let session = Session::open(
        &args.plan.manifest.manifest,
        Some(&state),
        args.plan.target.as_deref(),
    )?;

    ui::header("Applying Manifest");
    if args.dry_run {
        ui::warn("Dry run - no changes will be made");
    }

    let planned = plan::compute(&session);
    let counts = plan::display(&session, &planned, ctx);
    if counts.changes() == 0 && counts.errors == 0 {
        plan::print_counts(&counts);
        return check_outcome(&ExecuteSummary::default(), counts.rejected);
    }

    if !args.yes && !args.dry_run && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(());
    }

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        jobs: settings.jobs(args.jobs),
    };
    let report = execute(&session, &opts, ctx)?;

    print_problems(&report);
    print_summary(&report.summary, args.dry_run);
    check_outcome(&report.summary, counts.rejected)
}

/// Fail the command if anything did not converge or was rejected up front.
fn check_outcome(summary: &ExecuteSummary, rejected: usize) -> Result<()> {
    if !summary.is_success() {
        bail!(
            "{} did not converge",
            ui::plural(summary.failed, "operation")
        );
    }
    if rejected > 0 {
        bail!("{} rejected", ui::plural(rejected, "declaration"));
    }
    Ok(())
}

/// Run the executor behind a progress bar.
pub fn execute(session: &Session, opts: &ExecuteOptions, ctx: &Context) -> Result<ExecuteReport> {
    println!();
    println!(
        "  {} Converging {} with {} job(s)...",
        "→".cyan(),
        ui::plural(session.resources.len(), "resource"),
        opts.jobs
    );

    let mut progress = BarProgress::new(session.resources.len(), ctx.verbose > 0);
    let report = session
        .reconciler
        .execute(&session.resources, opts, &mut progress)
        .context("Failed to converge resources");
    progress.finish();
    report
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()
        .context("Failed to read confirmation")?;

    Ok(confirmed)
}

/// Print every failed or skipped resource and operation
fn print_problems(report: &ExecuteReport) {
    for resource in &report.reports {
        match &resource.outcome {
            ResourceOutcome::Failed { error } => {
                println!("  {} {} - {}", "✗".red(), resource.resource, error.dimmed());
            }
            ResourceOutcome::Skipped { reason } => {
                println!("  {} {} - {}", "⊘".yellow(), resource.resource, reason.dimmed());
            }
            ResourceOutcome::Converged(results) => {
                for result in results {
                    if let Outcome::Failed { error } = &result.outcome {
                        let what = match &result.property {
                            Some(property) => format!("{} {property}", result.operation),
                            None => result.operation.to_string(),
                        };
                        println!(
                            "  {} {} {} - {}",
                            "✗".red(),
                            resource.resource,
                            what,
                            error.dimmed()
                        );
                    }
                }
            }
            ResourceOutcome::Unchanged => {}
        }
    }
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary, dry_run: bool) {
    println!();
    if dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else if summary.is_success() {
        println!("  {} Manifest applied successfully!", "✓".green().bold());
    } else {
        println!("  {} Manifest applied with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} created", ui::plural(summary.created, "resource"));
    }
    if summary.updated > 0 {
        println!("    • {} applied", ui::plural(summary.updated, "update"));
    }
    if summary.destroyed > 0 {
        println!("    • {} destroyed", ui::plural(summary.destroyed, "resource"));
    }
    if summary.unchanged > 0 {
        println!("    • {} unchanged", ui::plural(summary.unchanged, "resource"));
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{SITE, manifest};
    use super::*;
    use cloudkit::FileProvider;
    use declarative::{ListHint, Provider};

    fn quiet() -> Context {
        Context {
            verbose: 0,
            quiet: true,
        }
    }

    #[test]
    fn test_apply_persists_to_state_file() {
        let (dir, path) = manifest(SITE);
        let state = dir.path().join("state.json");
        let session = Session::open(&path, Some(&state), None).unwrap();

        let report = execute(&session, &ExecuteOptions::default(), &quiet()).unwrap();
        assert!(report.summary.is_success());
        assert_eq!(report.summary.created, 3);

        let stored = FileProvider::open(&state).unwrap();
        let groups = stored.list("ec2_securitygroup", &ListHint::default()).unwrap();
        assert_eq!(groups[0].get_str("group_name"), Some("db-sg"));
    }

    #[test]
    fn test_dry_run_leaves_state_untouched() {
        let (dir, path) = manifest(SITE);
        let state = dir.path().join("state.json");
        let session = Session::open(&path, Some(&state), None).unwrap();

        let opts = ExecuteOptions {
            dry_run: true,
            jobs: 2,
        };
        let report = execute(&session, &opts, &quiet()).unwrap();
        assert_eq!(report.summary.total_changes(), 0);
        assert!(!state.exists());
    }

    #[test]
    fn test_valid_resources_converge_beside_rejected_ones() {
        let content = format!(
            "{SITE}\n[[resource]]\nkind = \"rds_instance\"\ntitle = \"db2\"\n\
             [resource.properties]\nstorage_type = \"floppy\"\n"
        );
        let (dir, path) = manifest(&content);
        let state = dir.path().join("state.json");
        let session = Session::open(&path, Some(&state), None).unwrap();
        assert_eq!(session.rejected.len(), 1);

        let report = execute(&session, &ExecuteOptions::default(), &quiet()).unwrap();
        assert_eq!(report.summary.created, 3);

        let err = check_outcome(&report.summary, session.rejected.len()).unwrap_err();
        assert_eq!(err.to_string(), "1 declaration rejected");
        assert!(check_outcome(&report.summary, 0).is_ok());
    }

    #[test]
    fn test_targeted_apply_only_touches_target() {
        let (dir, path) = manifest(SITE);
        let state = dir.path().join("state.json");
        let session = Session::open(&path, Some(&state), Some("s3_bucket.logs")).unwrap();

        let report = execute(&session, &ExecuteOptions::default(), &quiet()).unwrap();
        assert_eq!(report.summary.created, 1);

        let stored = FileProvider::open(&state).unwrap();
        assert!(stored.list("rds_instance", &ListHint::default()).unwrap().is_empty());
    }
}
