//! `nimbus validate` - check a manifest without contacting the provider

use anyhow::{Result, bail};
use colored::Colorize;

use super::{Session, graph};
use crate::Context;
use crate::cli::ManifestArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ManifestArgs) -> Result<()> {
    let session = Session::offline(&args.manifest)?;
    // Cycles only show up once references are resolved
    graph::order(&session)?;

    ui::header("Manifest");
    session.print_rejected();
    for resource in &session.resources {
        println!(
            "  {} {} {}",
            "✓".green(),
            resource.to_string().bold(),
            format!("({})", resource.desired.ensure).dimmed()
        );
        if ctx.verbose > 0 {
            ui::dim(&format!("    identity: {}", resource.identity));
        }
    }

    println!();
    if !session.rejected.is_empty() {
        bail!(
            "{} rejected, {} valid",
            ui::plural(session.rejected.len(), "declaration"),
            ui::plural(session.resources.len(), "resource")
        );
    }
    ui::success(&format!(
        "{} valid",
        ui::plural(session.resources.len(), "resource")
    ));
    Ok(())
}
