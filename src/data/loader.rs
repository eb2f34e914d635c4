use std::collections::BTreeMap;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

use npyz::{Order, TypeChar};
use serde_pickle::{DeOptions, HashableValue, Value as PickleValue};
use thiserror::Error;

use super::model::NdArray;

// ---------------------------------------------------------------------------
// FileSource – where backing files come from
// ---------------------------------------------------------------------------

pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Opens backing files by their registry-relative path.
///
/// Handles are plain owned values: dropping one releases it. Sources are
/// shared across threads, so one resolver can serve concurrent callers.
pub trait FileSource: Send + Sync {
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek + '_>>;
}

/// Backing files on the local disk, resolved against a data root.
#[derive(Debug, Clone)]
pub struct LocalFiles {
    root: PathBuf,
}

impl LocalFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for LocalFiles {
    fn default() -> Self {
        Self::new(".")
    }
}

impl FileSource for LocalFiles {
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek + '_>> {
        let file = std::fs::File::open(self.root.join(path))?;
        Ok(Box::new(io::BufReader::new(file)))
    }
}

// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

/// A backing file that exists but cannot be read with its group's strategy.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("pickle error: {0}")]
    Pickle(#[from] serde_pickle::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("top-level pickle object is {0}, expected a dict")]
    NotADict(&'static str),

    #[error("array '{key}': {source}")]
    Npy {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("array '{key}': unsupported dtype {dtype}")]
    UnsupportedDtype { key: String, dtype: String },
}

// ---------------------------------------------------------------------------
// Pickle records
// ---------------------------------------------------------------------------

/// Deserialize a pickled dict.
///
/// Unknown globals decode to `None` rather than failing the whole record.
/// numpy arrays come back as their restore state; see [`pickled_ndarray_shape`].
pub fn read_record<R: Read>(reader: R) -> Result<BTreeMap<HashableValue, PickleValue>, DecodeError> {
    let value = serde_pickle::value_from_reader(reader, DeOptions::new().replace_unresolved_globals())?;
    match value {
        PickleValue::Dict(map) => Ok(map),
        other => Err(DecodeError::NotADict(pickle_kind(&other))),
    }
}

fn pickle_kind(v: &PickleValue) -> &'static str {
    match v {
        PickleValue::None => "None",
        PickleValue::Bool(_) => "bool",
        PickleValue::I64(_) | PickleValue::Int(_) => "int",
        PickleValue::F64(_) => "float",
        PickleValue::Bytes(_) => "bytes",
        PickleValue::String(_) => "str",
        PickleValue::List(_) => "list",
        PickleValue::Tuple(_) => "tuple",
        PickleValue::Set(_) => "set",
        PickleValue::FrozenSet(_) => "frozenset",
        PickleValue::Dict(_) => "dict",
    }
}

// ---------------------------------------------------------------------------
// .npz archives
// ---------------------------------------------------------------------------

/// An opened `.npz` archive. Members are stored as `<key>.npy`.
pub struct NpzArchive<R: Read + Seek> {
    zip: zip::ZipArchive<R>,
}

impl<R: Read + Seek> NpzArchive<R> {
    pub fn new(reader: R) -> Result<Self, DecodeError> {
        Ok(Self {
            zip: zip::ZipArchive::new(reader)?,
        })
    }

    /// Array names in the archive, without the `.npy` suffix.
    pub fn keys(&self) -> Vec<String> {
        self.zip
            .file_names()
            .map(|n| n.strip_suffix(".npy").unwrap_or(n).to_string())
            .collect()
    }

    /// Read one array. `Ok(None)` when the archive has no such member.
    pub fn read(&mut self, key: &str) -> Result<Option<NdArray>, DecodeError> {
        let member = match self.zip.by_name(&format!("{key}.npy")) {
            Ok(member) => member,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        read_npy(key, member).map(Some)
    }
}

/// Decode a single `.npy` stream, widening its values to `f64`.
///
/// Every plain numeric dtype npyz reads is accepted, in either byte order.
/// Fortran-ordered payloads are rearranged so `data` is always row-major.
pub fn read_npy<R: Read>(key: &str, reader: R) -> Result<NdArray, DecodeError> {
    let npy_err = |source: io::Error| DecodeError::Npy {
        key: key.to_string(),
        source,
    };
    let unsupported = |dtype: String| DecodeError::UnsupportedDtype {
        key: key.to_string(),
        dtype,
    };

    let npy = npyz::NpyFile::new(reader).map_err(npy_err)?;
    let shape = npy.shape().to_vec();
    let order = npy.order();
    let ts = match npy.dtype() {
        npyz::DType::Plain(ts) => ts,
        other => return Err(unsupported(format!("{other:?}"))),
    };
    let dtype = ts.to_string();

    let data: Vec<f64> = match (ts.type_char(), ts.size_field()) {
        (TypeChar::Float, 8) => npy.into_vec::<f64>().map_err(npy_err)?,
        (TypeChar::Float, 4) => widen(npy.into_vec::<f32>().map_err(npy_err)?),
        (TypeChar::Int, 8) => npy
            .into_vec::<i64>()
            .map_err(npy_err)?
            .into_iter()
            .map(|v| v as f64)
            .collect(),
        (TypeChar::Int, 4) => widen(npy.into_vec::<i32>().map_err(npy_err)?),
        (TypeChar::Int, 2) => widen(npy.into_vec::<i16>().map_err(npy_err)?),
        (TypeChar::Int, 1) => widen(npy.into_vec::<i8>().map_err(npy_err)?),
        (TypeChar::Uint, 8) => npy
            .into_vec::<u64>()
            .map_err(npy_err)?
            .into_iter()
            .map(|v| v as f64)
            .collect(),
        (TypeChar::Uint, 4) => widen(npy.into_vec::<u32>().map_err(npy_err)?),
        (TypeChar::Uint, 2) => widen(npy.into_vec::<u16>().map_err(npy_err)?),
        (TypeChar::Uint, 1) => widen(npy.into_vec::<u8>().map_err(npy_err)?),
        (TypeChar::Bool, 1) => npy
            .into_vec::<bool>()
            .map_err(npy_err)?
            .into_iter()
            .map(|b| f64::from(u8::from(b)))
            .collect(),
        _ => return Err(unsupported(dtype)),
    };

    let data = match order {
        Order::Fortran if shape.len() > 1 => fortran_to_c(&data, &shape),
        _ => data,
    };

    Ok(NdArray { shape, data, dtype })
}

fn widen<T: Into<f64>>(values: Vec<T>) -> Vec<f64> {
    values.into_iter().map(Into::into).collect()
}

/// Rearrange column-major values into row-major order.
fn fortran_to_c(data: &[f64], shape: &[u64]) -> Vec<f64> {
    let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
    let mut strides = Vec::with_capacity(dims.len());
    let mut step = 1;
    for &d in &dims {
        strides.push(step);
        step *= d;
    }

    let mut index = vec![0usize; dims.len()];
    let mut out = Vec::with_capacity(data.len());
    for _ in 0..data.len() {
        let offset: usize = index.iter().zip(&strides).map(|(i, s)| i * s).sum();
        out.push(data[offset]);
        // Last axis moves fastest.
        for axis in (0..dims.len()).rev() {
            index[axis] += 1;
            if index[axis] < dims[axis] {
                break;
            }
            index[axis] = 0;
        }
    }
    out
}

// ---------------------------------------------------------------------------
// numpy arrays inside pickles
// ---------------------------------------------------------------------------

/// Shape of a numpy array pickled inside a record, if `value` is one.
///
/// Without numpy's globals the decoder keeps only the array's restore state
/// `(version, shape, dtype_state, fortran_order, raw)`. The dtype state has
/// lost its type name, so the raw bytes cannot be read back as numbers.
pub fn pickled_ndarray_shape(value: &PickleValue) -> Option<Vec<u64>> {
    let PickleValue::Tuple(state) = value else {
        return None;
    };
    let [
        PickleValue::I64(_),
        PickleValue::Tuple(shape),
        PickleValue::Tuple(_),
        PickleValue::Bool(_),
        PickleValue::Bytes(_) | PickleValue::List(_),
    ] = state.as_slice()
    else {
        return None;
    };
    shape
        .iter()
        .map(|d| match d {
            PickleValue::I64(n) => u64::try_from(*n).ok(),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::data::testutil::{
        npy_bytes, npy_with_header, pickle_bytes, NpzBuilder, NUMPY_RECORD_PICKLE,
    };

    fn le_f64(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn record_must_be_a_dict() {
        let bytes = pickle_bytes(&PickleValue::List(vec![PickleValue::I64(1)]));
        let err = read_record(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, DecodeError::NotADict("list")));
    }

    #[test]
    fn record_roundtrip_keeps_string_keys() {
        let dict = BTreeMap::from([(
            HashableValue::String("tone".into()),
            PickleValue::List(vec![PickleValue::String("55".into())]),
        )]);
        let map = read_record(Cursor::new(pickle_bytes(&PickleValue::Dict(dict)))).unwrap();
        assert!(map.contains_key(&HashableValue::String("tone".into())));
    }

    #[test]
    fn garbage_is_not_a_pickle() {
        let err = read_record(Cursor::new(b"definitely not a pickle".to_vec())).unwrap_err();
        assert!(matches!(err, DecodeError::Pickle(_)));
    }

    #[test]
    fn npz_members_are_listed_and_read() {
        let bytes = NpzBuilder::new()
            .array("initials", &[2, 2], &[0.0, 1.5, 1.5, 0.0])
            .array("tones", &[1], &[7.0])
            .finish();
        let mut npz = NpzArchive::new(Cursor::new(bytes)).unwrap();
        let mut keys = npz.keys();
        keys.sort();
        assert_eq!(keys, vec!["initials", "tones"]);

        let arr = npz.read("initials").unwrap().unwrap();
        assert_eq!(arr.shape, vec![2, 2]);
        assert_eq!(arr.data, vec![0.0, 1.5, 1.5, 0.0]);
        assert_eq!(arr.dtype, "<f8");

        assert!(npz.read("finals").unwrap().is_none());
    }

    #[test]
    fn npy_integer_arrays_widen_to_f64() {
        let bytes = npy_bytes::<i32>(&[3], &[1, -2, 3]);
        let arr = read_npy("counts", Cursor::new(bytes)).unwrap();
        assert_eq!(arr.data, vec![1.0, -2.0, 3.0]);
        assert_eq!(arr.dtype, "<i4");
    }

    #[test]
    fn every_plain_numeric_dtype_widens() {
        let cases: [(&str, Vec<u8>, Vec<f64>); 5] = [
            ("'>u2'", vec![0x00, 0x01, 0xff, 0xff], vec![1.0, 65535.0]),
            ("'<i2'", vec![0xfe, 0xff, 0x2c, 0x01], vec![-2.0, 300.0]),
            ("'|b1'", vec![1, 0], vec![1.0, 0.0]),
            ("'>f8'", [1.5f64.to_be_bytes(), (-0.25f64).to_be_bytes()].concat(), vec![1.5, -0.25]),
            ("'<u8'", [7u64.to_le_bytes(), 9u64.to_le_bytes()].concat(), vec![7.0, 9.0]),
        ];
        for (descr, payload, expected) in cases {
            let header = format!("{{'descr': {descr}, 'fortran_order': False, 'shape': (2,), }}");
            let arr = read_npy("x", Cursor::new(npy_with_header(&header, &payload)))
                .unwrap_or_else(|e| panic!("{descr}: {e}"));
            assert_eq!(arr.data, expected, "{descr}");
            assert_eq!(arr.shape, vec![2]);
        }
    }

    #[test]
    fn fortran_order_is_rearranged_to_rows() {
        let header = "{'descr': '<f8', 'fortran_order': True, 'shape': (2, 3), }";
        let bytes = npy_with_header(header, &le_f64(&[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]));
        let arr = read_npy("m", Cursor::new(bytes)).unwrap();
        assert_eq!(arr.shape, vec![2, 3]);
        assert_eq!(arr.data, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let header = "{'descr': '<f8', 'fortran_order': True, 'shape': (2, 2, 2), }";
        let bytes = npy_with_header(header, &le_f64(&[0.0, 4.0, 2.0, 6.0, 1.0, 5.0, 3.0, 7.0]));
        let arr = read_npy("cube", Cursor::new(bytes)).unwrap();
        assert_eq!(arr.data, (0..8).map(f64::from).collect::<Vec<_>>());
    }

    #[test]
    fn text_arrays_are_unsupported() {
        let header = "{'descr': '<U1', 'fortran_order': False, 'shape': (1,), }";
        let bytes = npy_with_header(header, &[b'a', 0, 0, 0]);
        let err = read_npy("finals", Cursor::new(bytes)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnsupportedDtype { key, dtype } if key == "finals" && dtype == "<U1"
        ));
    }

    #[test]
    fn pickled_numpy_array_is_recognised() {
        let record = read_record(Cursor::new(NUMPY_RECORD_PICKLE)).unwrap();
        let coords = crate::data::model::dict_get(&record, "coords").unwrap();
        let tone = crate::data::model::dict_get(&record, "tone").unwrap();
        assert_eq!(pickled_ndarray_shape(coords), Some(vec![2, 2]));
        assert_eq!(pickled_ndarray_shape(tone), None);
    }

    #[test]
    fn truncated_npy_is_an_error() {
        let mut bytes = npy_bytes::<f64>(&[4], &[1.0, 2.0, 3.0, 4.0]);
        bytes.truncate(bytes.len() - 8);
        let err = read_npy("x", Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, DecodeError::Npy { key, .. } if key == "x"));
    }

    #[test]
    fn non_zip_is_rejected() {
        let err = NpzArchive::new(Cursor::new(b"PK but not really".to_vec())).err();
        assert!(matches!(err, Some(DecodeError::Zip(_))));
    }

    #[test]
    fn local_files_resolve_against_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("Data4")).unwrap();
        std::fs::write(dir.path().join("Data4/a.bin"), b"abc").unwrap();

        let files = LocalFiles::new(dir.path());
        let mut buf = String::new();
        files
            .open(Path::new("Data4/a.bin"))
            .unwrap()
            .read_to_string(&mut buf)
            .unwrap();
        assert_eq!(buf, "abc");

        let err = files.open(Path::new("Data4/missing.bin")).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
