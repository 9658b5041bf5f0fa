use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nimbus")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Converge cloud resources to a declared manifest", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a manifest without contacting the provider
    Validate(ManifestArgs),

    /// Show what apply would change
    Plan(PlanArgs),

    /// Converge resources to the manifest
    Apply(ApplyArgs),

    /// Show dependency edges and the order resources converge in
    Graph(ManifestArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct ManifestArgs {
    /// Manifest file (TOML or JSON)
    #[arg(short, long, env = "NIMBUS_MANIFEST")]
    pub manifest: PathBuf,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub manifest: ManifestArgs,

    /// Provider state file
    #[arg(long, env = "NIMBUS_STATE")]
    pub state: Option<PathBuf>,

    /// Only resources matching `kind` or `kind.name`
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Number of resources converged in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Plan and report without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::parse_from([
            "nimbus", "-vv", "apply", "-m", "site.toml", "--target", "ec2", "--jobs", "8", "--yes",
        ]);
        assert_eq!(cli.verbose, 2);
        let Command::Apply(args) = cli.command else {
            panic!("expected apply");
        };
        assert_eq!(args.plan.manifest.manifest, PathBuf::from("site.toml"));
        assert_eq!(args.plan.target.as_deref(), Some("ec2"));
        assert_eq!(args.jobs, Some(8));
        assert!(args.yes);
        assert!(!args.dry_run);
    }

    #[test]
    fn test_parse_plan_with_state() {
        let cli = Cli::parse_from(["nimbus", "plan", "-m", "site.json", "--state", "/tmp/s.json"]);
        let Command::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.state, Some(PathBuf::from("/tmp/s.json")));
    }
}
