// Teaches serde-based writers how to render the namespace types: namespaces
// become plain ordered mappings, paths become plain string scalars.

use serde::ser::{Error as _, Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::{
  config::Config,
  namespace::{Namespace, Value},
};

impl Serialize for Config {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.namespace().serialize(serializer)
  }
}

impl Serialize for Namespace {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.len()))?;
    for (key, value) in self {
      map.serialize_entry(key, value)?;
    }
    map.end()
  }
}

impl Serialize for Value {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Value::Null => serializer.serialize_unit(),
      Value::Bool(b) => serializer.serialize_bool(*b),
      Value::Number(n) => n.serialize(serializer),
      Value::String(s) => serializer.serialize_str(s),
      Value::Path(p) => {
        let s = p
          .to_str()
          .ok_or_else(|| S::Error::custom(format!("path {:?} is not valid UTF-8", p)))?;
        serializer.serialize_str(s)
      }
      Value::Seq(items) => {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
          seq.serialize_element(item)?;
        }
        seq.end()
      }
      Value::Map(ns) => ns.serialize(serializer),
    }
  }
}

/// Renders any namespace-like value as a YAML document.
pub fn to_yaml_string<T: Serialize + ?Sized>(value: &T) -> crate::Result<String> {
  serde_yaml::to_string(value).map_err(|e| crate::Error::ConfigSerialize(e.to_string()))
}
