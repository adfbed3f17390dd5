//! Hierarchical, syntax-independent metadata tree.
//!
//! Renderers need to know whether a node is a list, a set, a map or a fixed-arity array
//! to reproduce the right container syntax, so the arity is part of every node.

use indexmap::IndexMap;

/// Leaf or group value carried by a property.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Rational { numerator: u32, denominator: u32 },
    Text(String),
    Group(Vec<Property>),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::Uint(v.into())
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Value::Uint(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint(v.into())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

/// Container shape of a property node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum PropertyKind {
    Scalar,
    List,
    Set,
    Map,
    Array,
    Nested,
}

/// Value of a property node together with its arity.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "value", rename_all = "lowercase"))]
pub enum PropertyValue {
    Scalar(Value),
    /// Ordered, duplicates allowed.
    List(Vec<Value>),
    /// Unique members in first-insertion order.
    Set(Vec<Value>),
    Map(IndexMap<String, Value>),
    /// Fixed arity, ordered.
    Array(Vec<Value>),
    Nested(Vec<Property>),
}

/// One named node of the property tree.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Property {
    pub name: String,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub value: PropertyValue,
}

impl Property {
    pub fn scalar(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Scalar(value.into()),
        }
    }

    pub fn rational(name: impl Into<String>, numerator: u32, denominator: u32) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Scalar(Value::Rational {
                numerator,
                denominator,
            }),
        }
    }

    pub fn list(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::List(values),
        }
    }

    /// Build a set; later duplicates of an earlier member are dropped.
    pub fn set(name: impl Into<String>, values: impl IntoIterator<Item = Value>) -> Self {
        let mut members: Vec<Value> = Vec::new();
        for v in values {
            if !members.contains(&v) {
                members.push(v);
            }
        }
        Self {
            name: name.into(),
            value: PropertyValue::Set(members),
        }
    }

    pub fn map(name: impl Into<String>, entries: IndexMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Map(entries),
        }
    }

    pub fn array(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Array(values),
        }
    }

    pub fn nested(name: impl Into<String>, children: Vec<Property>) -> Self {
        Self {
            name: name.into(),
            value: PropertyValue::Nested(children),
        }
    }

    /// A list whose members are property groups (e.g. one group per block).
    pub fn group_list(name: impl Into<String>, groups: Vec<Vec<Property>>) -> Self {
        Self::list(name, groups.into_iter().map(Value::Group).collect())
    }

    pub fn kind(&self) -> PropertyKind {
        match self.value {
            PropertyValue::Scalar(_) => PropertyKind::Scalar,
            PropertyValue::List(_) => PropertyKind::List,
            PropertyValue::Set(_) => PropertyKind::Set,
            PropertyValue::Map(_) => PropertyKind::Map,
            PropertyValue::Array(_) => PropertyKind::Array,
            PropertyValue::Nested(_) => PropertyKind::Nested,
        }
    }

    /// Direct child of a nested property, by name.
    pub fn child(&self, name: &str) -> Option<&Property> {
        match &self.value {
            PropertyValue::Nested(children) => children.iter().find(|p| p.name == name),
            _ => None,
        }
    }

    /// Names of the direct children of a nested property, in order.
    pub fn child_names(&self) -> Vec<&str> {
        match &self.value {
            PropertyValue::Nested(children) => children.iter().map(|p| p.name.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// Scalar value, if this node is a scalar.
    pub fn as_scalar(&self) -> Option<&Value> {
        match &self.value {
            PropertyValue::Scalar(v) => Some(v),
            _ => None,
        }
    }
}
