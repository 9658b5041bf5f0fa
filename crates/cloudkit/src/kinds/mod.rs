//! Concrete resource kinds.

pub mod rds_instance;
pub mod s3_bucket;
pub mod security_group;

pub use rds_instance::RdsInstance;
pub use s3_bucket::S3Bucket;
pub use security_group::SecurityGroup;

use declarative::{KindRegistry, Result};

/// Registry with every kind this crate provides.
pub fn registry() -> Result<KindRegistry> {
    let mut registry = KindRegistry::new();
    registry.register(SecurityGroup::new()?)?;
    registry.register(RdsInstance::new())?;
    registry.register(S3Bucket::new())?;
    Ok(registry)
}
