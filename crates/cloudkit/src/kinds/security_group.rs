//! EC2 security groups.
//!
//! A VPC always comes with a group called `default`, so group names alone
//! are not unique. Default groups are addressed with the composite title
//! `<vpc>::default`, which keeps the full title as `name` and binds `vpc`
//! and `group_name` separately. Any other title is the group name.

use declarative::resource::{Reference, ResourceKind, observe_record, parent_reference};
use declarative::schema::{KindSchema, PropertySpec, Validator};
use declarative::title::{TitlePattern, verbatim};
use declarative::{Normalization, ObservedState, RawRecord, ResourceHandle, Result};
use serde_json::Value;

/// Kind name
pub const KIND: &str = "ec2_securitygroup";

/// Rule fields holding port specifiers
const PORT_FIELDS: &[&str] = &["port"];

/// The `ec2_securitygroup` kind
pub struct SecurityGroup {
    schema: KindSchema,
}

impl SecurityGroup {
    /// Build the kind. Fails only if a title pattern does not compile.
    pub fn new() -> Result<Self> {
        let schema = KindSchema::new(KIND)
            .identity(
                PropertySpec::one("name")
                    .doc("the name of the security group resource")
                    .validate(Validator::NonEmpty),
            )
            .identity(
                PropertySpec::one("group_name")
                    .doc("the name of the security group")
                    .validate(Validator::NonEmpty),
            )
            .identity(
                PropertySpec::one("vpc")
                    .doc("the VPC the group is associated with")
                    .validate(Validator::String),
            )
            .property(
                PropertySpec::one("region")
                    .doc("the region in which to launch the security group")
                    .validate(Validator::NoWhitespace),
            )
            .property(
                PropertySpec::many("ingress")
                    .doc("rules for ingress traffic")
                    .validate(Validator::Object)
                    .validate(Validator::Custom(check_rule))
                    .normalize(Normalization::rule(PORT_FIELDS)),
            )
            .property(
                PropertySpec::one("tags")
                    .doc("the tags for the security group")
                    .validate(Validator::StringMap)
                    .normalize(Normalization::StringMap),
            )
            .property(
                PropertySpec::one("description")
                    .doc("a short description of the group")
                    .validate(Validator::NonEmpty),
            )
            .parent("vpc", "ec2_vpc")
            .titles(vec![
                TitlePattern::new(
                    r"(([\w\-]+)::(default))",
                    &[("name", verbatim), ("vpc", verbatim), ("group_name", verbatim)],
                )?,
                TitlePattern::new(r"((.*))", &[("name", verbatim), ("group_name", verbatim)])?,
            ]);

        Ok(Self { schema })
    }
}

/// Port entries must be numbers, strings or null.
fn check_rule(rule: &Value) -> std::result::Result<(), String> {
    let Some(port) = rule.get("port") else {
        return Ok(());
    };
    let entries: Vec<&Value> = match port {
        Value::Array(items) => items.iter().collect(),
        single => vec![single],
    };
    if entries
        .iter()
        .all(|p| matches!(p, Value::Number(_) | Value::String(_) | Value::Null))
    {
        Ok(())
    } else {
        Err("port must be a number, a string or a list of them".to_string())
    }
}

/// Ingress rules as a list; a bare rule counts as a list of one.
fn rules(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    }
}

impl ResourceKind for SecurityGroup {
    fn schema(&self) -> &KindSchema {
        &self.schema
    }

    /// Providers report groups by `group_name` and `vpc`; the default group
    /// of a VPC gets the composite `<vpc>::default` name.
    fn observe(&self, record: &RawRecord) -> Option<ObservedState> {
        if record.get_str("name").is_some() {
            return observe_record(&self.schema, record);
        }

        let group_name = record.get_str("group_name")?;
        let name = match record.get_str("vpc") {
            Some(vpc) if group_name == "default" => format!("{vpc}::default"),
            _ => group_name.to_string(),
        };
        observe_record(&self.schema, &record.clone().with("name", name))
    }

    fn references(&self, resource: &ResourceHandle) -> Vec<Reference> {
        let mut references: Vec<Reference> = rules(resource.desired.get("ingress"))
            .into_iter()
            .filter_map(|rule| rule.get("security_group").and_then(Value::as_str))
            .filter(|group| *group != resource.name)
            .map(|group| Reference::new(KIND, group, "ingress"))
            .collect();
        references.extend(parent_reference(&self.schema, resource));
        references
    }
}
