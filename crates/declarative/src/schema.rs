//! Kind schemas - identity attributes, properties and validation rules
//!
//! A [`KindSchema`] is the static description of one resource kind. It is
//! built once at startup, checked by [`KindSchema::check`] when registered,
//! and read-only afterwards.

use crate::error::{Error, Result};
use crate::normalize::Normalization;
use crate::title::TitleParser;
use crate::types::{DesiredState, Identity};
use serde_json::Value;
use std::collections::HashSet;

/// A single validation rule
///
/// Validators are data so schemas stay inspectable. [`Validator::Custom`]
/// covers kind-specific rules.
#[derive(Debug, Clone)]
pub enum Validator {
    /// Must be a string
    String,
    /// Must be a non-empty string
    NonEmpty,
    /// Must be a string without whitespace
    NoWhitespace,
    /// Must be an object
    Object,
    /// Must be a boolean (or "true"/"false")
    Boolean,
    /// Must be an integer (or an integer-like string)
    Integer,
    /// Must be an integer greater than zero
    PositiveInteger,
    /// Must be one of the listed strings
    OneOf(Vec<&'static str>),
    /// Must be an object whose values are all strings
    StringMap,
    /// Kind-specific rule; returns the failure reason
    Custom(fn(&Value) -> std::result::Result<(), String>),
}

impl Validator {
    /// Check a value, returning the failure reason.
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        match self {
            Self::String => match value {
                Value::String(_) => Ok(()),
                _ => Err("must be a string".to_string()),
            },
            Self::NonEmpty => match value {
                Value::String(s) if !s.is_empty() => Ok(()),
                _ => Err("must be a non-empty string".to_string()),
            },
            Self::NoWhitespace => match value {
                Value::String(s) if s.chars().any(char::is_whitespace) => {
                    Err("must not contain whitespace".to_string())
                }
                Value::String(_) => Ok(()),
                _ => Err("must be a string".to_string()),
            },
            Self::Object => match value {
                Value::Object(_) => Ok(()),
                _ => Err("must be a hash".to_string()),
            },
            Self::Boolean => match value {
                Value::Bool(_) => Ok(()),
                Value::String(s) if s == "true" || s == "false" => Ok(()),
                _ => Err("must be a boolean".to_string()),
            },
            Self::Integer => as_integer(value)
                .map(|_| ())
                .ok_or_else(|| "must be an integer".to_string()),
            Self::PositiveInteger => match as_integer(value) {
                Some(i) if i > 0 => Ok(()),
                _ => Err("must be a positive integer".to_string()),
            },
            Self::OneOf(allowed) => match value {
                Value::String(s) if allowed.contains(&s.as_str()) => Ok(()),
                _ => Err(format!("must be one of: {}", allowed.join(", "))),
            },
            Self::StringMap => match value {
                Value::Object(map) if map.values().all(Value::is_string) => Ok(()),
                Value::Object(_) => Err("must only contain string values".to_string()),
                _ => Err("must be a hash".to_string()),
            },
            Self::Custom(check) => check(value),
        }
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whether a property holds one value or an unordered set of values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    #[default]
    One,
    /// Compared with set semantics; validators apply per element
    Many,
}

/// Declaration of one attribute or property
#[derive(Debug, Clone)]
pub struct PropertySpec {
    pub name: String,
    pub doc: &'static str,
    pub cardinality: Cardinality,
    pub validators: Vec<Validator>,
    pub normalization: Normalization,
    /// Sent on create but never compared (passwords, create-time flags)
    pub write_only: bool,
}

impl PropertySpec {
    /// Single-valued property
    pub fn one(name: &str) -> Self {
        Self {
            name: name.to_string(),
            doc: "",
            cardinality: Cardinality::One,
            validators: Vec::new(),
            normalization: Normalization::Exact,
            write_only: false,
        }
    }

    /// Set-valued property
    pub fn many(name: &str) -> Self {
        Self {
            cardinality: Cardinality::Many,
            ..Self::one(name)
        }
    }

    pub fn doc(mut self, doc: &'static str) -> Self {
        self.doc = doc;
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn normalize(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    /// Run every validator; set-valued properties are checked per element.
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        match (self.cardinality, value) {
            (Cardinality::Many, Value::Array(items)) => {
                for item in items {
                    self.check_one(item)?;
                }
                Ok(())
            }
            _ => self.check_one(value),
        }
    }

    fn check_one(&self, value: &Value) -> std::result::Result<(), String> {
        self.validators.iter().try_for_each(|v| v.check(value))
    }
}

/// Association to a containing resource, e.g. a security group's VPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parent {
    /// Identity attribute or property holding the parent's name
    pub attribute: String,
    /// Kind of the parent resource
    pub kind: String,
}

/// Static schema of one resource kind
#[derive(Debug, Clone)]
pub struct KindSchema {
    name: String,
    identity: Vec<PropertySpec>,
    properties: Vec<PropertySpec>,
    parent: Option<Parent>,
    titles: TitleParser,
}

impl KindSchema {
    /// Start a schema. The first identity attribute added becomes primary.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            identity: Vec::new(),
            properties: Vec::new(),
            parent: None,
            titles: TitleParser::catch_all("name"),
        }
    }

    pub fn identity(mut self, attribute: PropertySpec) -> Self {
        if self.identity.is_empty() {
            self.titles = TitleParser::new(&attribute.name, self.titles.patterns().to_vec());
        }
        self.identity.push(attribute);
        self
    }

    pub fn property(mut self, property: PropertySpec) -> Self {
        self.properties.push(property);
        self
    }

    pub fn parent(mut self, attribute: &str, kind: &str) -> Self {
        self.parent = Some(Parent {
            attribute: attribute.to_string(),
            kind: kind.to_string(),
        });
        self
    }

    /// Set title rules. The catch-all binds the primary identity attribute.
    pub fn titles(mut self, patterns: Vec<crate::title::TitlePattern>) -> Self {
        let primary = self.primary().unwrap_or("name").to_string();
        self.titles = TitleParser::new(primary, patterns);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary identity attribute, the one a bare title binds to
    pub fn primary(&self) -> Option<&str> {
        self.identity.first().map(|a| a.name.as_str())
    }

    pub fn identity_attributes(&self) -> &[PropertySpec] {
        &self.identity
    }

    pub fn properties(&self) -> &[PropertySpec] {
        &self.properties
    }

    pub fn property_spec(&self, name: &str) -> Option<&PropertySpec> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn identity_spec(&self, name: &str) -> Option<&PropertySpec> {
        self.identity.iter().find(|p| p.name == name)
    }

    pub fn is_identity(&self, name: &str) -> bool {
        self.identity_spec(name).is_some()
    }

    pub fn parent_spec(&self) -> Option<&Parent> {
        self.parent.as_ref()
    }

    pub fn title_parser(&self) -> &TitleParser {
        &self.titles
    }

    /// Check the schema definition itself.
    pub fn check(&self) -> Result<()> {
        let fail = |message: String| Error::Schema {
            kind: self.name.clone(),
            message,
        };

        if self.identity.is_empty() {
            return Err(fail("at least one identity attribute is required".into()));
        }

        let mut seen = HashSet::new();
        for attribute in &self.identity {
            if !seen.insert(attribute.name.as_str()) {
                return Err(fail(format!(
                    "identity attribute '{}' declared twice",
                    attribute.name
                )));
            }
        }
        for property in &self.properties {
            if self.is_identity(&property.name) {
                return Err(fail(format!(
                    "property '{}' collides with an identity attribute",
                    property.name
                )));
            }
            if !seen.insert(property.name.as_str()) {
                return Err(fail(format!("property '{}' declared twice", property.name)));
            }
        }

        if let Some(parent) = &self.parent
            && !seen.contains(parent.attribute.as_str())
        {
            return Err(fail(format!(
                "parent attribute '{}' is not declared",
                parent.attribute
            )));
        }

        for pattern in self.titles.patterns() {
            for attribute in pattern.attributes() {
                if !self.is_identity(attribute) {
                    return Err(fail(format!(
                        "title pattern binds '{attribute}', which is not an identity attribute"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Validate a resource's identity bindings and desired properties.
    ///
    /// Pure: never contacts a provider.
    pub fn validate(
        &self,
        resource: &str,
        identity: &Identity,
        desired: &DesiredState,
    ) -> Result<()> {
        let fail = |property: &str, reason: String| Error::Validation {
            resource: resource.to_string(),
            property: property.to_string(),
            reason,
        };

        for (attribute, value) in identity.iter() {
            let spec = self
                .identity_spec(attribute)
                .ok_or_else(|| fail(attribute, "is not an identity attribute".into()))?;
            spec.check(&Value::String(value.to_string()))
                .map_err(|reason| fail(attribute, reason))?;
        }

        for (property, value) in &desired.properties {
            let spec = self
                .property_spec(property)
                .ok_or_else(|| fail(property, "is not a property of this kind".into()))?;
            spec.check(value).map_err(|reason| fail(property, reason))?;
        }

        Ok(())
    }
}
