mod application;

pub use application::*;
use serde::Deserialize;

/// Deserialize a non-negative size where zero means "not set".
pub fn deserialize_non_zero<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = usize::deserialize(deserializer)?;
    if value == 0 {
        Ok(None)
    } else {
        Ok(Some(value))
    }
}
