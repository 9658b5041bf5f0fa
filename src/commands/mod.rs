//! Command implementations

pub mod apply;
pub mod graph;
pub mod plan;
pub mod validate;

use anyhow::{Context, Result};
use colored::Colorize;
use declarative::planner::filter_by_target;
use declarative::{Reconciler, ResourceHandle};
use std::path::Path;
use std::sync::Arc;

use crate::config::{Manifest, Rejected};

/// Declared resources bound to a provider for one command
pub struct Session {
    pub reconciler: Reconciler,
    pub resources: Vec<ResourceHandle>,
    /// Declarations that failed validation; the rest of the run goes on
    pub rejected: Vec<Rejected>,
}

impl Session {
    /// Open a manifest against the state file at `state`, or against an
    /// empty in-memory provider when `state` is `None`.
    ///
    /// Every declaration is validated before the target filter applies, so
    /// rejected declarations are reported whatever the target.
    pub fn open(manifest: &Path, state: Option<&Path>, target: Option<&str>) -> Result<Self> {
        let registry = cloudkit::registry().context("Failed to register resource kinds")?;
        let provider = cloudkit::backend::open(state).context("Failed to open provider state")?;
        let reconciler = Reconciler::new(Arc::new(registry), provider);

        let declared = Manifest::load(manifest)?.declare(&reconciler)?;
        let resources = filter_by_target(declared.handles, target);
        if let Some(target) = target {
            log::debug!(
                "Target '{}' selected {} resource(s)",
                target,
                resources.len()
            );
        }

        Ok(Self {
            reconciler,
            resources,
            rejected: declared.rejected,
        })
    }

    /// Print every rejected declaration.
    pub fn print_rejected(&self) {
        for rejected in &self.rejected {
            println!(
                "  {} {} - {}",
                "✗".red(),
                rejected.label,
                rejected.error.to_string().dimmed()
            );
        }
    }

    /// Open a manifest without touching any provider state.
    pub fn offline(manifest: &Path) -> Result<Self> {
        Self::open(manifest, None, None)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// A database behind a security group, plus a bucket.
    pub const SITE: &str = r#"
[[resource]]
kind = "rds_instance"
title = "db1"
[resource.properties]
region = "us-east-1"
engine = "mysql"
allocated_storage = 5
master_user_password = "pullth3stringz"
vpc_security_groups = ["db-sg"]

[[resource]]
kind = "ec2_securitygroup"
title = "db-sg"
[resource.properties]
region = "us-east-1"
description = "database access"
ingress = [{ port = 3306, security_group = "web-sg" }]

[[resource]]
kind = "s3_bucket"
title = "logs"
[resource.properties]
region = "us-east-1"
"#;

    /// Write `content` as a manifest in a fresh directory.
    pub fn manifest(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("site.toml");
        fs::write(&path, content).unwrap();
        (dir, path)
    }
}
