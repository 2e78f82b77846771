//! Named engine configuration sections
//!
//! An [`EngineSection`] names the engine to run and carries its options as
//! loose JSON values. Each engine's typed config reads the keys it knows
//! through the accessors here, so a wrong type or an unknown enumerated
//! value is reported against the offending key before the run starts.

use std::str::FromStr;

use ferry_core::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Configuration section for one routing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSection {
    /// Registry name of the engine
    pub engine: String,
    /// Engine-specific options, keyed by their camelCase names
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

impl EngineSection {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            options: Map::new(),
        }
    }

    /// Set an option
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn f64(&self, key: &str) -> ConfigResult<Option<f64>> {
        self.typed(key, "a number", Value::as_f64)
    }

    pub fn u64(&self, key: &str) -> ConfigResult<Option<u64>> {
        self.typed(key, "a non-negative integer", Value::as_u64)
    }

    pub fn bool(&self, key: &str) -> ConfigResult<Option<bool>> {
        self.typed(key, "a boolean", Value::as_bool)
    }

    pub fn str(&self, key: &str) -> ConfigResult<Option<&str>> {
        self.typed(key, "a string", Value::as_str)
    }

    /// Read a string option and parse it into an enumerated value
    pub fn parsed<T>(&self, key: &str) -> ConfigResult<Option<T>>
    where
        T: FromStr<Err = ConfigError>,
    {
        self.str(key)?.map(str::parse).transpose()
    }

    fn typed<'a, T>(
        &'a self,
        key: &str,
        expected: &str,
        read: impl FnOnce(&'a Value) -> Option<T>,
    ) -> ConfigResult<Option<T>> {
        match self.options.get(key) {
            None => Ok(None),
            Some(value) => read(value)
                .map(Some)
                .ok_or_else(|| ConfigError::invalid(key, format!("expected {expected}, got {value}"))),
        }
    }
}

/// Check that `value` lies in `[min, max]`
pub(crate) fn ensure_range(key: &str, value: f64, min: f64, max: f64) -> ConfigResult<()> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, format!("{value} is outside [{min}, {max}]")))
    }
}

/// Check that `value` is strictly positive
pub(crate) fn ensure_positive(key: &str, value: f64) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, format!("{value} must be positive")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::QueueingPolicy;

    #[test]
    fn test_typed_accessors() {
        let section = EngineSection::new("prophet")
            .with("beta", 0.3)
            .with("secondsInTimeUnit", 30)
            .with("binaryMode", true)
            .with("queueingPolicy", "MOFO");

        assert_eq!(section.f64("beta").unwrap(), Some(0.3));
        assert_eq!(section.u64("secondsInTimeUnit").unwrap(), Some(30));
        assert_eq!(section.f64("secondsInTimeUnit").unwrap(), Some(30.0));
        assert_eq!(section.bool("binaryMode").unwrap(), Some(true));
        assert_eq!(
            section.parsed::<QueueingPolicy>("queueingPolicy").unwrap(),
            Some(QueueingPolicy::Mofo)
        );
        assert_eq!(section.f64("missing").unwrap(), None);
    }

    #[test]
    fn test_wrong_type_names_key() {
        let section = EngineSection::new("prophet").with("beta", "high");
        let err = section.f64("beta").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("beta"));
        assert!(msg.contains("a number"));
    }

    #[test]
    fn test_unknown_enum_value_is_typed_error() {
        let section = EngineSection::new("prophet").with("queueingPolicy", "LIFO");
        assert!(matches!(
            section.parsed::<QueueingPolicy>("queueingPolicy"),
            Err(ConfigError::UnknownQueueingPolicy(_))
        ));
    }

    #[test]
    fn test_section_from_json() {
        let json = r#"{"engine": "social-rank", "dampingFactor": 0.85}"#;
        let section: EngineSection = serde_json::from_str(json).unwrap();
        assert_eq!(section.engine, "social-rank");
        assert_eq!(section.f64("dampingFactor").unwrap(), Some(0.85));
    }

    #[test]
    fn test_range_checks() {
        assert!(ensure_range("beta", 0.25, 0.0, 1.0).is_ok());
        assert!(ensure_range("beta", 1.5, 0.0, 1.0).is_err());
        assert!(ensure_range("beta", f64::NAN, 0.0, 1.0).is_err());
        assert!(ensure_positive("secondsInTimeUnit", 30.0).is_ok());
        assert!(ensure_positive("secondsInTimeUnit", 0.0).is_err());
    }
}
