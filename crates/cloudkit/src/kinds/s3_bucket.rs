//! S3 buckets.
//!
//! The bucket policy is managed as a set of statements. Setting `policy` to
//! the string `"absent"` removes whatever policy the bucket has.

use declarative::resource::ResourceKind;
use declarative::schema::{KindSchema, PropertySpec, Validator};
use serde_json::Value;

/// Kind name
pub const KIND: &str = "s3_bucket";

/// Policy value that asks for the policy to be removed
const ABSENT: &str = "absent";

/// The `s3_bucket` kind
pub struct S3Bucket {
    schema: KindSchema,
}

impl S3Bucket {
    /// Build the kind.
    pub fn new() -> Self {
        let schema = KindSchema::new(KIND)
            .identity(
                PropertySpec::one("name")
                    .doc("the name of the bucket")
                    .validate(Validator::NonEmpty)
                    .validate(Validator::NoWhitespace),
            )
            .property(
                PropertySpec::one("region")
                    .doc("the region the bucket lives in")
                    .validate(Validator::NoWhitespace),
            )
            .property(
                PropertySpec::many("policy")
                    .doc("statements of the bucket policy, or \"absent\"")
                    .validate(Validator::Custom(check_statement)),
            );

        Self { schema }
    }
}

impl Default for S3Bucket {
    fn default() -> Self {
        Self::new()
    }
}

fn check_statement(value: &Value) -> std::result::Result<(), String> {
    match value {
        Value::Object(_) => Ok(()),
        Value::String(s) if s == ABSENT => Ok(()),
        _ => Err(format!("must be a policy statement or \"{ABSENT}\"")),
    }
}

fn is_absent(value: &Value) -> bool {
    value.as_str() == Some(ABSENT)
}

impl ResourceKind for S3Bucket {
    fn schema(&self) -> &KindSchema {
        &self.schema
    }

    fn in_sync(&self, property: &str, desired: &Value, observed: Option<&Value>) -> bool {
        if property == "policy" && is_absent(desired) {
            return match observed {
                None | Some(Value::Null) => true,
                Some(Value::Array(statements)) => statements.is_empty(),
                Some(other) => is_absent(other),
            };
        }
        match self.schema.property_spec(property) {
            Some(spec) => declarative::diff::in_sync(spec, desired, observed),
            None => false,
        }
    }

    fn provider_value(&self, property: &str, value: &Value) -> Value {
        if property == "policy" && is_absent(value) {
            Value::Null
        } else {
            value.clone()
        }
    }
}
