//! `nimbus plan` - preview what apply would change

use anyhow::Result;
use colored::Colorize;
use declarative::{ConvergencePlan, Operation, ResourceHandle, ResourceStatus};
use serde_json::Value;

use super::Session;
use crate::Context;
use crate::cli::PlanArgs;
use crate::config::Settings;
use crate::ui;

/// Longest value shown inline
const VALUE_WIDTH: usize = 60;

/// A resource and the plan computed for it
pub struct Planned<'a> {
    pub resource: &'a ResourceHandle,
    pub plan: declarative::Result<ConvergencePlan>,
}

/// What a set of plans adds up to, counted per resource
///
/// A plan is a single create, a single destroy, one or more updates, or
/// nothing, so its first operation classifies the whole resource.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PlanCounts {
    pub create: usize,
    pub update: usize,
    pub destroy: usize,
    pub unchanged: usize,
    /// Resources whose observed state could not be fetched
    pub errors: usize,
    /// Declarations that failed validation
    pub rejected: usize,
}

impl PlanCounts {
    pub fn changes(&self) -> usize {
        self.create + self.update + self.destroy
    }

    fn add(&mut self, plan: &ConvergencePlan) {
        match plan.operations.first() {
            None => self.unchanged += 1,
            Some(Operation::Create(_)) => self.create += 1,
            Some(Operation::Update { .. }) => self.update += 1,
            Some(Operation::Destroy) => self.destroy += 1,
        }
    }
}

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let settings = Settings::load()?;
    let state = settings.state_file(args.state.as_deref())?;
    let session = Session::open(&args.manifest.manifest, Some(&state), args.target.as_deref())?;

    ui::header("Nimbus Plan");
    ui::kv("State", &state.display().to_string());

    let planned = compute(&session);
    let counts = display(&session, &planned, ctx);
    print_counts(&counts);
    Ok(())
}

/// Plan every resource of the session, fetching each kind once.
pub fn compute(session: &Session) -> Vec<Planned<'_>> {
    session.reconciler.prefetch(&session.resources);
    session
        .resources
        .iter()
        .map(|resource| Planned {
            resource,
            plan: session.reconciler.plan(resource),
        })
        .collect()
}

/// Print the plans and count them.
pub fn display(session: &Session, planned: &[Planned<'_>], ctx: &Context) -> PlanCounts {
    let mut counts = PlanCounts {
        rejected: session.rejected.len(),
        ..PlanCounts::default()
    };
    println!();
    session.print_rejected();

    for entry in planned {
        let plan = match &entry.plan {
            Ok(plan) => plan,
            Err(e) => {
                counts.errors += 1;
                println!(
                    "  {} {} {}",
                    "✗".red(),
                    entry.resource,
                    e.to_string().red()
                );
                continue;
            }
        };
        counts.add(plan);

        match plan.operations.first() {
            None => {
                if ctx.verbose > 0 {
                    println!("  {} {}", "○".dimmed(), entry.resource.to_string().dimmed());
                }
            }
            Some(Operation::Create(desired)) => {
                println!("  {} {}", "+".green().bold(), entry.resource.to_string().bold());
                if !ctx.quiet {
                    for (property, value) in &desired.properties {
                        let shown = shown_value(session, entry.resource, property, value);
                        ui::dim(&format!("    {property} = {shown}"));
                    }
                }
            }
            Some(Operation::Update { .. }) => {
                println!(
                    "  {} {}",
                    "~".yellow().bold(),
                    entry.resource.to_string().bold()
                );
                if !ctx.quiet
                    && let ResourceStatus::Drifted(diff) = &plan.status
                {
                    for drift in diff.iter() {
                        let line = ui::truncate(&drift.to_string(), VALUE_WIDTH * 2);
                        ui::dim(&format!("    {line}"));
                    }
                }
            }
            Some(Operation::Destroy) => {
                println!("  {} {}", "-".red().bold(), entry.resource.to_string().bold());
            }
        }
    }

    counts
}

/// Value as shown in a plan; write-only values are masked.
fn shown_value(
    session: &Session,
    resource: &ResourceHandle,
    property: &str,
    value: &Value,
) -> String {
    let write_only = session
        .reconciler
        .registry()
        .get(&resource.kind)
        .ok()
        .and_then(|kind| kind.schema().property_spec(property))
        .is_some_and(|spec| spec.write_only);
    if write_only {
        "(sensitive)".to_string()
    } else {
        ui::truncate(&value.to_string(), VALUE_WIDTH)
    }
}

pub fn print_counts(counts: &PlanCounts) {
    println!();
    if counts.changes() == 0 && counts.errors == 0 && counts.rejected == 0 {
        ui::success(&format!(
            "No changes: {} in sync",
            ui::plural(counts.unchanged, "resource")
        ));
        return;
    }

    ui::info(&format!(
        "Plan: {} to create, {} to update, {} to destroy, {} unchanged",
        counts.create, counts.update, counts.destroy, counts.unchanged
    ));
    if counts.errors > 0 {
        ui::warn(&format!(
            "{} could not be planned",
            ui::plural(counts.errors, "resource")
        ));
    }
    if counts.rejected > 0 {
        ui::warn(&format!(
            "{} rejected",
            ui::plural(counts.rejected, "declaration")
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{SITE, manifest};
    use super::*;

    #[test]
    fn test_fresh_state_plans_creates() {
        let (_dir, path) = manifest(SITE);
        let session = Session::offline(&path).unwrap();
        let ctx = Context {
            verbose: 0,
            quiet: true,
        };

        let planned = compute(&session);
        let counts = display(&session, &planned, &ctx);
        assert_eq!(
            counts,
            PlanCounts {
                create: 3,
                ..PlanCounts::default()
            }
        );
    }

    #[test]
    fn test_applied_state_plans_nothing() {
        let (dir, path) = manifest(SITE);
        let state = dir.path().join("state.json");
        let opts = declarative::ExecuteOptions::default();

        let session = Session::open(&path, Some(&state), None).unwrap();
        let report = session
            .reconciler
            .execute(&session.resources, &opts, &mut declarative::NoProgress)
            .unwrap();
        assert_eq!(report.summary.created, 3);

        let session = Session::open(&path, Some(&state), None).unwrap();
        let ctx = Context {
            verbose: 1,
            quiet: false,
        };
        let counts = display(&session, &compute(&session), &ctx);
        assert_eq!(counts.changes(), 0);
        assert_eq!(counts.unchanged, 3);
    }

    #[test]
    fn test_rejected_declarations_are_counted() {
        let content = format!(
            "{SITE}\n[[resource]]\nkind = \"rds_instance\"\ntitle = \"db2\"\n\
             [resource.properties]\nstorage_type = \"floppy\"\n"
        );
        let (_dir, path) = manifest(&content);
        let session = Session::offline(&path).unwrap();
        let ctx = Context {
            verbose: 0,
            quiet: true,
        };

        let counts = display(&session, &compute(&session), &ctx);
        assert_eq!(
            counts,
            PlanCounts {
                create: 3,
                rejected: 1,
                ..PlanCounts::default()
            }
        );
    }

    #[test]
    fn test_updates_count_once_per_resource() {
        let (dir, path) = manifest(SITE);
        let state = dir.path().join("state.json");
        let session = Session::open(&path, Some(&state), Some("s3")).unwrap();
        session
            .reconciler
            .execute(
                &session.resources,
                &declarative::ExecuteOptions::default(),
                &mut declarative::NoProgress,
            )
            .unwrap();

        let drifted = SITE.replace(
            "title = \"logs\"\n[resource.properties]\nregion = \"us-east-1\"",
            "title = \"logs\"\n[resource.properties]\nregion = \"eu-west-1\"\n\
             policy = [{ Effect = \"Deny\" }]",
        );
        let (_other, drifted_path) = manifest(&drifted);
        let session = Session::open(&drifted_path, Some(&state), Some("s3")).unwrap();
        let ctx = Context {
            verbose: 0,
            quiet: true,
        };
        let planned = compute(&session);
        let plan = planned[0].plan.as_ref().unwrap();
        assert_eq!(plan.operations.len(), 2);
        assert_eq!(
            display(&session, &planned, &ctx),
            PlanCounts {
                update: 1,
                ..PlanCounts::default()
            }
        );
    }

    #[test]
    fn test_password_is_masked() {
        let (_dir, path) = manifest(SITE);
        let session = Session::offline(&path).unwrap();
        let db = &session.resources[0];
        assert_eq!(
            shown_value(&session, db, "master_user_password", &Value::from("secret")),
            "(sensitive)"
        );
        assert_eq!(
            shown_value(&session, db, "engine", &Value::from("mysql")),
            "\"mysql\""
        );
    }
}
