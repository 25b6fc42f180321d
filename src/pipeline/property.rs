//! Node property values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of a node property.
///
/// Serializes untagged so the descriptor reads as plain JSON. Maps are
/// ordered so serialization is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Floats, or integers widened to float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            PropertyValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[PropertyValue]> {
        match self {
            PropertyValue::List(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        PropertyValue::Int(v as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(v as f64)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(v: Vec<T>) -> Self {
        PropertyValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, PropertyValue>> for PropertyValue {
    fn from(v: BTreeMap<String, PropertyValue>) -> Self {
        PropertyValue::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untagged_json() {
        let mut map = BTreeMap::new();
        map.insert("side26".to_string(), PropertyValue::from(vec![1i64, 2, 3]));
        let value = PropertyValue::Map(map);
        assert_eq!(
            serde_json::to_string(&value).unwrap(),
            r#"{"side26":[1,2,3]}"#
        );
        let back: PropertyValue = serde_json::from_str(r#"{"side26":[1,2,3]}"#).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_accessors() {
        assert_eq!(PropertyValue::from(5i64).as_float(), Some(5.0));
        assert_eq!(PropertyValue::from("rgb").as_str(), Some("rgb"));
        assert_eq!(PropertyValue::from(true).as_int(), None);
    }
}
