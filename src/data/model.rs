use std::fmt;

use indexmap::IndexMap;
use serde_pickle::{HashableValue, Value as PickleValue};

// ---------------------------------------------------------------------------
// NdArray – one numeric array from an .npz archive
// ---------------------------------------------------------------------------

/// A dense numeric array in C order, widened to `f64`.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    /// Extent of each axis; an empty shape is a scalar.
    pub shape: Vec<u64>,
    /// Row-major values; `data.len()` is the product of `shape`.
    pub data: Vec<f64>,
    /// numpy type descriptor of the stored data, e.g. `<f8`.
    pub dtype: String,
}

impl NdArray {
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ---------------------------------------------------------------------------
// FeatureValue – the payload returned for one feature
// ---------------------------------------------------------------------------

/// A loaded feature: either an arbitrary pickled object or a numeric array.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Record(PickleValue),
    Array(NdArray),
}

/// Loaded features keyed by exposed name, in resolution order.
pub type FeatureMap = IndexMap<String, FeatureValue>;

impl FeatureValue {
    /// Short human-readable kind, e.g. `list[1200]` or `array<f8>[40, 40]`.
    pub fn describe(&self) -> String {
        match self {
            FeatureValue::Array(arr) => {
                let dims: Vec<String> = arr.shape.iter().map(|d| d.to_string()).collect();
                format!("array<{}>[{}]", arr.dtype.trim_start_matches(['<', '|', '>', '=']), dims.join(", "))
            }
            FeatureValue::Record(v) => describe_pickle(v),
        }
    }

    /// Interpret the value as a 1-D sequence of category labels.
    ///
    /// Returns `None` for anything that is not one-dimensional.
    pub fn labels(&self) -> Option<Vec<String>> {
        match self {
            FeatureValue::Array(arr) if arr.ndim() == 1 => {
                Some(arr.data.iter().map(|v| format_number(*v)).collect())
            }
            FeatureValue::Array(_) => None,
            FeatureValue::Record(PickleValue::List(items))
            | FeatureValue::Record(PickleValue::Tuple(items)) => {
                items.iter().map(scalar_label).collect()
            }
            FeatureValue::Record(_) => None,
        }
    }

    /// Interpret the value as a sequence of 2-D points (`[n, 2]`).
    pub fn points_2d(&self) -> Option<Vec<[f64; 2]>> {
        match self {
            FeatureValue::Array(arr) if arr.shape.len() == 2 && arr.shape[1] == 2 => {
                Some(arr.data.chunks_exact(2).map(|c| [c[0], c[1]]).collect())
            }
            FeatureValue::Array(_) => None,
            FeatureValue::Record(PickleValue::List(items))
            | FeatureValue::Record(PickleValue::Tuple(items)) => {
                items.iter().map(pair_of_numbers).collect()
            }
            FeatureValue::Record(_) => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

// -- pickle helpers --

fn describe_pickle(v: &PickleValue) -> String {
    match v {
        PickleValue::None => "None".to_string(),
        PickleValue::Bool(b) => format!("bool({b})"),
        PickleValue::I64(i) => format!("int({i})"),
        PickleValue::Int(i) => format!("int({i})"),
        PickleValue::F64(x) => format!("float({x})"),
        PickleValue::Bytes(b) => format!("bytes[{}]", b.len()),
        PickleValue::String(s) => format!("str[{}]", s.chars().count()),
        PickleValue::List(items) => format!("list[{}]", items.len()),
        PickleValue::Tuple(items) => format!("tuple[{}]", items.len()),
        PickleValue::Set(items) => format!("set[{}]", items.len()),
        PickleValue::FrozenSet(items) => format!("frozenset[{}]", items.len()),
        PickleValue::Dict(map) => format!("dict[{}]", map.len()),
    }
}

fn scalar_label(v: &PickleValue) -> Option<String> {
    match v {
        PickleValue::String(s) => Some(s.clone()),
        PickleValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        PickleValue::I64(i) => Some(i.to_string()),
        PickleValue::Int(i) => Some(i.to_string()),
        PickleValue::F64(x) => Some(format_number(*x)),
        PickleValue::Bool(b) => Some(b.to_string()),
        PickleValue::None => Some("None".to_string()),
        _ => None,
    }
}

fn pair_of_numbers(v: &PickleValue) -> Option<[f64; 2]> {
    match v {
        PickleValue::List(xy) | PickleValue::Tuple(xy) if xy.len() == 2 => {
            Some([pickle_f64(&xy[0])?, pickle_f64(&xy[1])?])
        }
        _ => None,
    }
}

fn pickle_f64(v: &PickleValue) -> Option<f64> {
    match v {
        PickleValue::F64(x) => Some(*x),
        PickleValue::I64(i) => Some(*i as f64),
        _ => None,
    }
}

/// Integral floats print without a fractional part so `3.0` and `3` share a label.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// Look up a string key in a pickled dict.
pub fn dict_get<'a>(
    map: &'a std::collections::BTreeMap<HashableValue, PickleValue>,
    key: &str,
) -> Option<&'a PickleValue> {
    map.get(&HashableValue::String(key.to_string()))
        .or_else(|| map.get(&HashableValue::Bytes(key.as_bytes().to_vec())))
}
