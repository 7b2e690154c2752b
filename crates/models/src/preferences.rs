use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::ModelError;

/// A single stored preference value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PreferenceValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    StringSet(BTreeSet<String>),
}

impl PreferenceValue {
    /// Short type name used in logs and errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            PreferenceValue::Bool(_) => "bool",
            PreferenceValue::Int(_) => "int",
            PreferenceValue::Long(_) => "long",
            PreferenceValue::Float(_) => "float",
            PreferenceValue::Double(_) => "double",
            PreferenceValue::String(_) => "string",
            PreferenceValue::StringSet(_) => "string_set",
        }
    }

    /// NaN and infinities have no JSON encoding.
    pub fn is_finite(&self) -> bool {
        match self {
            PreferenceValue::Float(v) => v.is_finite(),
            PreferenceValue::Double(v) => v.is_finite(),
            _ => true,
        }
    }
}

/// Rust types that can be stored under a [`PreferenceKey`].
pub trait PreferenceType: Sized {
    const TYPE_NAME: &'static str;

    fn into_value(self) -> PreferenceValue;
    fn from_value(value: &PreferenceValue) -> Option<Self>;
}

macro_rules! preference_type {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl PreferenceType for $ty {
            const TYPE_NAME: &'static str = $name;

            fn into_value(self) -> PreferenceValue {
                PreferenceValue::$variant(self)
            }

            fn from_value(value: &PreferenceValue) -> Option<Self> {
                match value {
                    PreferenceValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

preference_type!(bool, Bool, "bool");
preference_type!(i32, Int, "int");
preference_type!(i64, Long, "long");
preference_type!(f32, Float, "float");
preference_type!(f64, Double, "double");
preference_type!(String, String, "string");
preference_type!(BTreeSet<String>, StringSet, "string_set");

/// Name of a preference plus the type its value is expected to have.
pub struct PreferenceKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PreferenceKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self { name, _marker: PhantomData }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for PreferenceKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for PreferenceKey<T> {}

impl<T: PreferenceType> fmt::Debug for PreferenceKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PreferenceKey<{}>({})", T::TYPE_NAME, self.name)
    }
}

/// Immutable snapshot of every preference in a store at one instant.
///
/// Snapshots are only produced by committing a [`MutablePreferences`]; there is
/// no way to change one in place, so a subscriber can never observe a
/// half-applied edit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences {
    entries: BTreeMap<String, PreferenceValue>,
}

impl Preferences {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Typed lookup. A value stored with another type resolves to `None` and is logged.
    pub fn get<T: PreferenceType>(&self, key: &PreferenceKey<T>) -> Option<T> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key.name(), error = %e, "preference has unexpected type; using default");
                None
            }
        }
    }

    /// Typed lookup that reports a type mismatch instead of hiding it.
    pub fn try_get<T: PreferenceType>(&self, key: &PreferenceKey<T>) -> Result<Option<T>, ModelError> {
        match self.entries.get(key.name()) {
            None => Ok(None),
            Some(raw) => T::from_value(raw).map(Some).ok_or_else(|| ModelError::TypeMismatch {
                key: key.name().to_string(),
                expected: T::TYPE_NAME,
                found: raw.type_name(),
            }),
        }
    }

    pub fn get_or<T: PreferenceType>(&self, key: &PreferenceKey<T>, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    pub fn contains<T>(&self, key: &PreferenceKey<T>) -> bool {
        self.entries.contains_key(key.name())
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PreferenceValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Name of the first entry holding a NaN or infinite float.
    pub fn first_non_finite(&self) -> Option<&str> {
        self.iter().find(|(_, v)| !v.is_finite()).map(|(name, _)| name)
    }

    /// Working copy for a write transaction.
    pub fn to_mutable(&self) -> MutablePreferences {
        MutablePreferences { entries: self.entries.clone() }
    }
}

impl FromIterator<(String, PreferenceValue)> for Preferences {
    fn from_iter<I: IntoIterator<Item = (String, PreferenceValue)>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

/// Mutable working copy handed to an edit transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutablePreferences {
    entries: BTreeMap<String, PreferenceValue>,
}

impl MutablePreferences {
    pub fn get<T: PreferenceType>(&self, key: &PreferenceKey<T>) -> Option<T> {
        self.entries.get(key.name()).and_then(T::from_value)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Replace the whole value stored under `key`.
    pub fn set<T: PreferenceType>(&mut self, key: &PreferenceKey<T>, value: T) {
        self.entries.insert(key.name().to_string(), value.into_value());
    }

    /// Untyped insert used when importing entries whose names are only known at runtime.
    pub fn insert_raw(&mut self, name: impl Into<String>, value: PreferenceValue) {
        self.entries.insert(name.into(), value);
    }

    pub fn remove<T>(&mut self, key: &PreferenceKey<T>) -> Option<PreferenceValue> {
        self.entries.remove(key.name())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn freeze(self) -> Preferences {
        Preferences { entries: self.entries }
    }
}
