//! `nimbus graph` - show dependency edges and convergence order

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::graph::waves;
use declarative::{DependencyEdge, ResourceRef};
use std::collections::HashSet;

use super::Session;
use crate::Context;
use crate::cli::ManifestArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ManifestArgs) -> Result<()> {
    let session = Session::offline(&args.manifest)?;
    let (edges, order) = order(&session)?;

    ui::header("Dependency Graph");

    let declared: HashSet<ResourceRef> = session.resources.iter().map(|r| r.reference()).collect();
    ui::section("Edges");
    if edges.is_empty() {
        ui::dim("none");
    }
    for edge in &edges {
        let note = if declared.contains(&edge.to) {
            String::new()
        } else {
            " (not declared)".to_string()
        };
        println!(
            "  {} {} {}{}",
            edge.from,
            "→".cyan(),
            edge.to,
            note.yellow()
        );
        if ctx.verbose > 0 {
            ui::dim(&format!("    via {}", edge.via));
        }
    }

    ui::section("Order");
    for (number, wave) in order.iter().enumerate() {
        println!(
            "  {} {}",
            format!("[{}]", number + 1).blue().bold(),
            wave.join(", ")
        );
    }
    Ok(())
}

/// Dependency edges and the resources of each wave, in convergence order.
pub fn order(session: &Session) -> Result<(Vec<DependencyEdge>, Vec<Vec<String>>)> {
    let edges = session
        .reconciler
        .edges(&session.resources)
        .context("Failed to resolve references")?;
    let order = waves(&session.resources, &edges)
        .context("Resources cannot be ordered")?
        .into_iter()
        .map(|wave| {
            wave.into_iter()
                .map(|i| session.resources[i].to_string())
                .collect()
        })
        .collect();
    Ok((edges, order))
}

#[cfg(test)]
mod tests {
    use super::super::testing::{SITE, manifest};
    use super::*;

    #[test]
    fn test_database_waits_for_security_group() {
        let (_dir, path) = manifest(SITE);
        let session = Session::offline(&path).unwrap();
        let (edges, order) = order(&session).unwrap();

        assert!(edges.iter().any(|e| e.to_string()
            == "rds_instance[db1] -> ec2_securitygroup[db-sg] (via vpc_security_groups)"));
        assert_eq!(
            order,
            vec![
                vec!["ec2_securitygroup[db-sg]".to_string(), "s3_bucket[logs]".to_string()],
                vec!["rds_instance[db1]".to_string()],
            ]
        );
    }

    #[test]
    fn test_cycle_is_reported() {
        let (_dir, path) = manifest(
            r#"
[[resource]]
kind = "ec2_securitygroup"
title = "a"
[resource.properties]
ingress = [{ security_group = "b" }]

[[resource]]
kind = "ec2_securitygroup"
title = "b"
[resource.properties]
ingress = [{ security_group = "a" }]
"#,
        );
        let session = Session::offline(&path).unwrap();
        let err = order(&session).unwrap_err();
        assert!(err.to_string().contains("cannot be ordered"));
    }
}
