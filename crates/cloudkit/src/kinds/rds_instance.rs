//! RDS database instances.

use super::security_group;
use declarative::resource::{Reference, ResourceKind};
use declarative::schema::{KindSchema, PropertySpec, Validator};
use declarative::{Normalization, ResourceHandle};
use serde_json::Value;

/// Kind name
pub const KIND: &str = "rds_instance";

/// Storage types RDS accepts
const STORAGE_TYPES: &[&str] = &["standard", "gp2", "gp3", "io1"];

/// The `rds_instance` kind
pub struct RdsInstance {
    schema: KindSchema,
}

impl RdsInstance {
    /// Build the kind.
    pub fn new() -> Self {
        let text = |name: &str, doc: &'static str| {
            PropertySpec::one(name).doc(doc).validate(Validator::NonEmpty)
        };

        let schema = KindSchema::new(KIND)
            .identity(
                PropertySpec::one("name")
                    .doc("the name of the RDS instance")
                    .validate(Validator::NonEmpty)
                    .validate(Validator::NoWhitespace),
            )
            .property(
                PropertySpec::one("region")
                    .doc("the region in which to launch the database")
                    .validate(Validator::NoWhitespace),
            )
            .property(text("db_name", "the name of the database to create"))
            .property(text("engine", "the database engine, e.g. mysql"))
            .property(text("engine_version", "the version of the database engine"))
            .property(
                PropertySpec::one("allocated_storage")
                    .doc("the size of the database in gigabytes")
                    .validate(Validator::PositiveInteger)
                    .normalize(Normalization::Scalar),
            )
            .property(text("db_instance_class", "the instance class, e.g. db.m3.medium"))
            .property(text("license_model", "the license of the database engine"))
            .property(
                PropertySpec::one("storage_type")
                    .doc("the storage backing the database")
                    .validate(Validator::OneOf(STORAGE_TYPES.to_vec())),
            )
            .property(text("master_username", "the name of the master user"))
            .property(
                PropertySpec::one("master_user_password")
                    .doc("the password of the master user")
                    .validate(Validator::NonEmpty)
                    .write_only(),
            )
            .property(
                PropertySpec::one("multi_az")
                    .doc("whether the database spans availability zones")
                    .validate(Validator::Boolean)
                    .normalize(Normalization::Scalar),
            )
            .property(
                PropertySpec::one("skip_final_snapshot")
                    .doc("whether to skip the final snapshot on deletion")
                    .validate(Validator::Boolean)
                    .write_only(),
            )
            .property(
                PropertySpec::many("vpc_security_groups")
                    .doc("security groups the database belongs to")
                    .validate(Validator::NonEmpty),
            )
            .property(text("db_subnet_group", "the subnet group to launch into"));

        Self { schema }
    }
}

impl Default for RdsInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceKind for RdsInstance {
    fn schema(&self) -> &KindSchema {
        &self.schema
    }

    fn references(&self, resource: &ResourceHandle) -> Vec<Reference> {
        let groups: Vec<&str> = match resource.desired.get("vpc_security_groups") {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(Value::String(group)) => vec![group.as_str()],
            _ => Vec::new(),
        };
        groups
            .into_iter()
            .map(|group| Reference::new(security_group::KIND, group, "vpc_security_groups"))
            .collect()
    }
}
