//! # cloudkit
//!
//! Cloud resource kinds and provider backends for the `declarative` engine.
//!
//! This crate provides:
//! - `ec2_securitygroup`, `rds_instance` and `s3_bucket` kinds with their
//!   schemas, title patterns and comparison rules
//! - An in-memory provider and a provider persisted to a JSON state file
//!
//! ## Example
//!
//! ```
//! use cloudkit::MemoryProvider;
//! use declarative::{DesiredState, ExecuteOptions, NoProgress, Reconciler};
//! use std::sync::Arc;
//!
//! let registry = Arc::new(cloudkit::registry().unwrap());
//! let reconciler = Reconciler::new(registry, Arc::new(MemoryProvider::new()));
//!
//! let desired = DesiredState::present().with("region", "us-east-1");
//! let bucket = reconciler
//!     .validate_and_register("s3_bucket", "logs", desired)
//!     .unwrap();
//! let report = reconciler
//!     .execute(&[bucket], &ExecuteOptions::default(), &mut NoProgress)
//!     .unwrap();
//! assert_eq!(report.summary.created, 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod kinds;

pub use backend::{FileProvider, MemoryProvider};
pub use error::{Error, Result};
pub use kinds::registry;

#[cfg(test)]
mod tests {
    use super::*;
    use backend::CallKind;
    use declarative::{
        DesiredState, ExecuteOptions, NoProgress, OperationKind, Outcome,
        ProviderError, RawRecord, Reconciler, ResourceOutcome, ResourceStatus,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn reconciler(provider: &Arc<MemoryProvider>) -> Reconciler {
        let registry = Arc::new(registry().unwrap());
        Reconciler::new(registry, provider.clone())
    }

    fn web_sg() -> DesiredState {
        DesiredState::present()
            .with("region", "us-east-1")
            .with("description", "web tier")
            .with("ingress", json!([{"port": [80, 443], "security_group": "other"}]))
    }

    #[test]
    fn test_security_group_create_then_idempotent() {
        let provider = Arc::new(MemoryProvider::new());
        let first = reconciler(&provider);
        let sg = first
            .validate_and_register("ec2_securitygroup", "web-sg", web_sg())
            .unwrap();

        let report = first
            .execute(&[sg.clone()], &ExecuteOptions::default(), &mut NoProgress)
            .unwrap();
        assert_eq!(report.summary.created, 1);
        assert_eq!(provider.mutation_count(), 1);

        // Same manifest expressed differently, against a fresh cache
        let second = reconciler(&provider);
        let reordered = DesiredState::present()
            .with("region", "us-east-1")
            .with("description", "web tier")
            .with("ingress", json!({"security_group": "other", "port": ["443", 80]}));
        let sg = second
            .validate_and_register("ec2_securitygroup", "web-sg", reordered)
            .unwrap();
        second.prefetch(std::slice::from_ref(&sg));
        let plan = second.plan(&sg).unwrap();
        assert_eq!(plan.status, ResourceStatus::InSync);
        assert!(plan.is_noop());
        assert_eq!(provider.mutation_count(), 1);
    }

    #[test]
    fn test_drift_updates_only_changed_property() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed(
            "ec2_securitygroup",
            RawRecord::default()
                .with("group_name", "web-sg")
                .with("region", "us-east-1")
                .with("description", "old")
                .with("ingress", json!([{"security_group": "other", "port": ["443", "80"]}])),
        );

        let reconciler = reconciler(&provider);
        let sg = reconciler
            .validate_and_register("ec2_securitygroup", "web-sg", web_sg())
            .unwrap();
        let report = reconciler
            .execute(&[sg], &ExecuteOptions::default(), &mut NoProgress)
            .unwrap();

        assert_eq!(report.summary.updated, 1);
        let updates: Vec<_> = provider
            .calls()
            .into_iter()
            .filter(|c| c.operation == CallKind::Mutate(OperationKind::Update))
            .filter_map(|c| c.property)
            .collect();
        assert_eq!(updates, vec!["description"]);
    }

    #[test]
    fn test_default_group_is_found_by_composite_title() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed(
            "ec2_securitygroup",
            RawRecord::default()
                .with("group_name", "default")
                .with("vpc", "prod")
                .with("region", "us-east-1"),
        );

        let reconciler = reconciler(&provider);
        let sg = reconciler
            .validate_and_register(
                "ec2_securitygroup",
                "prod::default",
                DesiredState::present().with("region", "us-east-1"),
            )
            .unwrap();
        assert_eq!(reconciler.plan(&sg).unwrap().status, ResourceStatus::InSync);
    }

    #[test]
    fn test_destroy_present_and_absent() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed("s3_bucket", RawRecord::default().with("name", "old-logs"));

        let reconciler = reconciler(&provider);
        let present = reconciler
            .validate_and_register("s3_bucket", "old-logs", DesiredState::absent())
            .unwrap();
        let missing = reconciler
            .validate_and_register("s3_bucket", "never-was", DesiredState::absent())
            .unwrap();

        let report = reconciler
            .execute(&[present, missing], &ExecuteOptions::default(), &mut NoProgress)
            .unwrap();
        assert_eq!(report.summary.destroyed, 1);
        assert_eq!(report.summary.unchanged, 1);
        assert!(provider.records("s3_bucket").is_empty());
    }

    #[test]
    fn test_absent_policy_removes_bucket_policy() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed(
            "s3_bucket",
            RawRecord::default()
                .with("name", "logs")
                .with("policy", json!([{"Effect": "Allow", "Principal": "*"}])),
        );

        let reconciler = reconciler(&provider);
        let bucket = reconciler
            .validate_and_register(
                "s3_bucket",
                "logs",
                DesiredState::present().with("policy", "absent"),
            )
            .unwrap();
        let report = reconciler
            .execute(
                std::slice::from_ref(&bucket),
                &ExecuteOptions::default(),
                &mut NoProgress,
            )
            .unwrap();

        assert_eq!(report.summary.updated, 1);
        assert_eq!(provider.records("s3_bucket")[0].get("policy"), None);
        assert_eq!(reconciler.plan(&bucket).unwrap().status, ResourceStatus::InSync);
    }

    #[test]
    fn test_rds_password_is_never_diffed() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed(
            "rds_instance",
            RawRecord::default()
                .with("name", "db1")
                .with("engine", "mysql")
                .with("allocated_storage", "5"),
        );

        let reconciler = reconciler(&provider);
        let db = reconciler
            .validate_and_register(
                "rds_instance",
                "db1",
                DesiredState::present()
                    .with("engine", "mysql")
                    .with("allocated_storage", 5)
                    .with("master_user_password", "changed"),
            )
            .unwrap();
        assert!(reconciler.plan(&db).unwrap().is_noop());
    }

    #[test]
    fn test_dependent_waits_for_its_security_group() {
        let provider = Arc::new(MemoryProvider::new());
        provider.fail_next(
            CallKind::Mutate(OperationKind::Create),
            "ec2_securitygroup",
            ProviderError::transport("connection reset"),
        );

        let reconciler = reconciler(&provider);
        let sg = reconciler
            .validate_and_register("ec2_securitygroup", "db-sg", DesiredState::present())
            .unwrap();
        let db = reconciler
            .validate_and_register(
                "rds_instance",
                "db1",
                DesiredState::present().with("vpc_security_groups", json!(["db-sg"])),
            )
            .unwrap();

        let report = reconciler
            .execute(&[db, sg], &ExecuteOptions::default(), &mut NoProgress)
            .unwrap();
        assert_eq!(report.summary.failed, 1);
        assert_eq!(report.summary.skipped, 1);

        let db_report = report
            .reports
            .iter()
            .find(|r| r.resource.kind == "rds_instance")
            .unwrap();
        assert!(matches!(db_report.outcome, ResourceOutcome::Skipped { .. }));
        assert!(provider.records("rds_instance").is_empty());
    }

    #[test]
    fn test_create_conflict_is_reverified() {
        let provider = Arc::new(MemoryProvider::new());
        let reconciler = reconciler(&provider);
        let bucket = reconciler
            .validate_and_register(
                "s3_bucket",
                "logs",
                DesiredState::present().with("region", "us-east-1"),
            )
            .unwrap();

        // Someone else creates the bucket, in another region, after we planned
        reconciler.prefetch(std::slice::from_ref(&bucket));
        let plan = reconciler.plan(&bucket).unwrap();
        provider.seed(
            "s3_bucket",
            RawRecord::default().with("name", "logs").with("region", "eu-west-1"),
        );

        let results = reconciler.apply(&plan, false).unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0].outcome, Outcome::Skipped { .. }));
        assert_eq!(results[1].property.as_deref(), Some("region"));
        assert_eq!(results[1].outcome, Outcome::Applied);
        assert_eq!(provider.records("s3_bucket").len(), 1);
        assert_eq!(
            provider.records("s3_bucket")[0].get_str("region"),
            Some("us-east-1")
        );
    }

    #[test]
    fn test_region_drift_is_updated_not_created() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed(
            "s3_bucket",
            RawRecord::default().with("name", "logs").with("region", "eu-west-1"),
        );

        let reconciler = reconciler(&provider);
        let bucket = reconciler
            .validate_and_register(
                "s3_bucket",
                "logs",
                DesiredState::present().with("region", "us-east-1"),
            )
            .unwrap();
        let report = reconciler
            .execute(&[bucket], &ExecuteOptions::default(), &mut NoProgress)
            .unwrap();

        assert_eq!(report.summary.created, 0);
        assert_eq!(report.summary.updated, 1);
        assert_eq!(report.summary.failed, 0);
        assert_eq!(
            provider.records("s3_bucket")[0].get_str("region"),
            Some("us-east-1")
        );
    }

    #[test]
    fn test_default_group_recorded_by_vpc_is_destroyed() {
        let provider = Arc::new(MemoryProvider::new());
        provider.seed(
            "ec2_securitygroup",
            RawRecord::default()
                .with("group_name", "default")
                .with("vpc", "prod")
                .with("region", "us-east-1"),
        );

        let reconciler = reconciler(&provider);
        let sg = reconciler
            .validate_and_register("ec2_securitygroup", "prod::default", DesiredState::absent())
            .unwrap();
        let report = reconciler
            .execute(&[sg], &ExecuteOptions::default(), &mut NoProgress)
            .unwrap();

        assert_eq!(report.summary.destroyed, 1);
        assert!(provider.records("ec2_securitygroup").is_empty());
    }

    #[test]
    fn test_failed_list_is_reported_per_resource() {
        let provider = Arc::new(MemoryProvider::new());
        provider.fail_next(CallKind::List, "s3_bucket", ProviderError::transport("timed out"));
        provider.fail_next(CallKind::List, "s3_bucket", ProviderError::transport("timed out"));

        let reconciler = reconciler(&provider);
        let bucket = reconciler
            .validate_and_register("s3_bucket", "logs", DesiredState::present())
            .unwrap();
        let report = reconciler
            .execute(&[bucket], &ExecuteOptions::default(), &mut NoProgress)
            .unwrap();
        assert_eq!(report.summary.failed, 1);
        assert!(matches!(report.reports[0].outcome, ResourceOutcome::Failed { .. }));
    }

    #[test]
    fn test_dry_run_sends_nothing() {
        let provider = Arc::new(MemoryProvider::new());
        let reconciler = reconciler(&provider);
        let sg = reconciler
            .validate_and_register("ec2_securitygroup", "web-sg", web_sg())
            .unwrap();
        let opts = ExecuteOptions {
            dry_run: true,
            ..ExecuteOptions::default()
        };
        let report = reconciler.execute(&[sg], &opts, &mut NoProgress).unwrap();
        assert_eq!(report.summary.total_changes(), 0);
        assert_eq!(provider.mutation_count(), 0);
    }
}
