//! Host-side values exchanged with the guest.

use crate::host_error::HostError;
use indexmap::IndexMap;
use num_bigint::BigInt;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;
use std::rc::Rc;

/// A value on the host side of the bridge.
///
/// `Undefined` and `NaN` are sentinels: the guest distinguishes "never assigned" from `null`, and
/// NaN never compares equal to itself as an `f64`, so both get a variant of their own.
#[derive(Clone, Debug)]
pub enum Val {
    Null,
    Undefined,
    NaN,
    Bool(bool),
    Int(i64),
    Float(f64),
    BigInt(BigInt),
    String(String),
    Array(Vec<Val>),
    /// Keys keep the order the guest produced them in.
    Object(IndexMap<String, Val>),
    Error(HostError),
    /// A host value with no guest counterpart; the guest sees its debug representation.
    Opaque(Rc<dyn fmt::Debug>),
}

impl Val {
    pub fn opaque<T: fmt::Debug + 'static>(value: T) -> Val {
        Val::Opaque(Rc::new(value))
    }

    pub fn object<K, I>(entries: I) -> Val
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Val)>,
    {
        Val::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Val::Null)
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Val::Undefined)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Val::NaN)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Val::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Val::Int(i) => Some(*i),
            Val::Float(f) if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Val::Int(i) => Some(*i as f64),
            Val::Float(f) => Some(*f),
            Val::NaN => Some(f64::NAN),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Val]> {
        match self {
            Val::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Val>> {
        match self {
            Val::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&HostError> {
        match self {
            Val::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Val> {
        self.as_object().and_then(|map| map.get(key))
    }
}

/// Numbers compare by value across `Int` and `Float`; errors and opaque values compare by
/// identity.
impl PartialEq for Val {
    fn eq(&self, other: &Val) -> bool {
        match (self, other) {
            (Val::Null, Val::Null) | (Val::Undefined, Val::Undefined) | (Val::NaN, Val::NaN) => {
                true
            }
            (Val::Bool(a), Val::Bool(b)) => a == b,
            (Val::Int(a), Val::Int(b)) => a == b,
            (Val::Float(a), Val::Float(b)) => a == b,
            (Val::Int(i), Val::Float(f)) | (Val::Float(f), Val::Int(i)) => *i as f64 == *f,
            (Val::BigInt(a), Val::BigInt(b)) => a == b,
            (Val::String(a), Val::String(b)) => a == b,
            (Val::Array(a), Val::Array(b)) => a == b,
            (Val::Object(a), Val::Object(b)) => a == b,
            (Val::Error(a), Val::Error(b)) => a.ptr_eq(b),
            (Val::Opaque(a), Val::Opaque(b)) => {
                Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
            }
            _ => false,
        }
    }
}

macro_rules! impl_from_scalars {
    ( { $( $ctor:ident : $ty:ty => $conv:ty ),* } ) => {
        $(
            impl From<$ty> for Val {
                fn from(x: $ty) -> Val {
                    Val::$ctor(<$conv>::from(x))
                }
            }
        )*
    };
}

impl_from_scalars!({
    Bool: bool => bool,
    Int: i8 => i64,
    Int: i16 => i64,
    Int: i32 => i64,
    Int: i64 => i64,
    Int: u8 => i64,
    Int: u16 => i64,
    Int: u32 => i64,
    Float: f32 => f64,
    Float: f64 => f64,
    String: String => String,
    String: &str => String,
    BigInt: BigInt => BigInt,
    Error: HostError => HostError
});

impl From<()> for Val {
    fn from(_: ()) -> Val {
        Val::Null
    }
}

impl<T: Into<Val>> From<Option<T>> for Val {
    fn from(x: Option<T>) -> Val {
        x.map_or(Val::Null, Into::into)
    }
}

impl<T: Into<Val>> From<Vec<T>> for Val {
    fn from(items: Vec<T>) -> Val {
        Val::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<IndexMap<String, Val>> for Val {
    fn from(map: IndexMap<String, Val>) -> Val {
        Val::Object(map)
    }
}

impl From<serde_json::Value> for Val {
    fn from(json: serde_json::Value) -> Val {
        use serde_json::Value as Json;
        match json {
            Json::Null => Val::Null,
            Json::Bool(b) => Val::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Val::Int(i),
                None => Val::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Val::String(s),
            Json::Array(items) => Val::Array(items.into_iter().map(Val::from).collect()),
            Json::Object(map) => Val::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

/// The canonical serialization used to copy sequences and mappings into the guest.
///
/// Values JSON cannot carry degrade the way the guest's own `JSON.stringify` degrades them:
/// sentinels and non-finite numbers become `null`. Big integers are written as decimal text, and
/// errors and opaque values as their textual form.
impl Serialize for Val {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Val::Null | Val::Undefined | Val::NaN => serializer.serialize_unit(),
            Val::Bool(b) => serializer.serialize_bool(*b),
            Val::Int(i) => serializer.serialize_i64(*i),
            Val::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Val::Float(_) => serializer.serialize_unit(),
            Val::BigInt(b) => serializer.serialize_str(&b.to_string()),
            Val::String(s) => serializer.serialize_str(s),
            Val::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Val::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            Val::Error(e) => serializer.serialize_str(&e.message()),
            Val::Opaque(d) => serializer.serialize_str(&format!("{:?}", d)),
        }
    }
}
