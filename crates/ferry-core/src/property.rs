//! Typed message properties
//!
//! Routing algorithms attach side-channel data to messages, such as spray
//! copy counts. Each algorithm owns its keys, which are namespaced as
//! `"<Algorithm>.<name>"`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PropertyError;

/// A property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
        }
    }
}

/// Key-value side channel carried by every [`Message`](crate::Message)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyBag {
    entries: BTreeMap<String, PropertyValue>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new property. Fails if the key is already present.
    pub fn add(&mut self, key: &str, value: PropertyValue) -> Result<(), PropertyError> {
        if self.entries.contains_key(key) {
            return Err(PropertyError::AlreadyExists(key.to_string()));
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    /// Replace an existing property. Fails if the key is missing.
    pub fn update(&mut self, key: &str, value: PropertyValue) -> Result<(), PropertyError> {
        match self.entries.get_mut(key) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(PropertyError::Missing(key.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Read an integer property
    ///
    /// `Ok(None)` when absent, an error when present with another type.
    pub fn get_int(&self, key: &str) -> Result<Option<i64>, PropertyError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(PropertyValue::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(PropertyError::TypeMismatch {
                key: key.to_string(),
                expected: "int",
                found: other.kind(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_rejects_existing_key() {
        let mut bag = PropertyBag::new();
        bag.add("SprayAndWait.copies", PropertyValue::Int(4)).unwrap();
        let err = bag
            .add("SprayAndWait.copies", PropertyValue::Int(2))
            .unwrap_err();
        assert!(matches!(err, PropertyError::AlreadyExists(_)));
        assert_eq!(bag.get_int("SprayAndWait.copies").unwrap(), Some(4));
    }

    #[test]
    fn test_update_requires_existing_key() {
        let mut bag = PropertyBag::new();
        assert!(bag.update("x", PropertyValue::Int(1)).is_err());
        bag.add("x", PropertyValue::Int(1)).unwrap();
        bag.update("x", PropertyValue::Int(3)).unwrap();
        assert_eq!(bag.get_int("x").unwrap(), Some(3));
    }

    #[test]
    fn test_get_int_type_mismatch() {
        let mut bag = PropertyBag::new();
        bag.add("note", PropertyValue::Text("hi".into())).unwrap();
        let err = bag.get_int("note").unwrap_err();
        assert!(err.to_string().contains("text"));
        assert_eq!(bag.get_int("absent").unwrap(), None);
    }
}
