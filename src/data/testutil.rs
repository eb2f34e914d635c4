//! Fixture writers and an in-memory [`FileSource`] for tests.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use npyz::WriterBuilder;
use serde_pickle::{HashableValue, SerOptions, Value as PickleValue};

use super::loader::{FileSource, ReadSeek};

pub fn pickle_bytes(value: &PickleValue) -> Vec<u8> {
    serde_pickle::value_to_vec(value, SerOptions::new()).expect("pickle fixture")
}

/// A pickled dict with string keys.
pub fn pickle_dict(entries: Vec<(&str, PickleValue)>) -> Vec<u8> {
    let map: BTreeMap<HashableValue, PickleValue> = entries
        .into_iter()
        .map(|(k, v)| (HashableValue::String(k.to_string()), v))
        .collect();
    pickle_bytes(&PickleValue::Dict(map))
}

pub fn strings(items: &[&str]) -> PickleValue {
    PickleValue::List(items.iter().map(|s| PickleValue::String(s.to_string())).collect())
}

/// A protocol-4 pickle of
/// `{'coords': np.array([[1.5, 2.5], [3.5, 4.5]]), 'tone': ['55', '35']}`.
pub const NUMPY_RECORD_PICKLE: &[u8] = b"\x80\x04\x95\xcc\x00\x00\x00\x00\x00\x00\x00}\x94(\x8c\x06coords\x94\x8c\x15\
      numpy.core.multiarray\x94\x8c\x0c_reconstruct\x94\x93\x94h\x02\x8c\x07ndarra\
      y\x94\x93\x94K\x00\x85\x94C\x01b\x94\x87\x94R\x94(K\x01K\x02K\x02\x86\x94\
      \x8c\x05numpy\x94\x8c\x05dtype\x94\x93\x94\x8c\x02f8\x94\x89\x88\x87\x94R\
      \x94(K\x03\x8c\x01<\x94NNNJ\xff\xff\xff\xffJ\xff\xff\xff\xffK\x00t\x94b\x89C\
      \x20\x00\x00\x00\x00\x00\x00\xf8?\x00\x00\x00\x00\x00\x00\x04@\x00\x00\x00\
      \x00\x00\x00\x0c@\x00\x00\x00\x00\x00\x00\x12@\x94t\x94b\x8c\x04tone\x94]\
      \x94(\x8c\x0255\x94\x8c\x0235\x94eu.";

pub fn npy_bytes<T>(shape: &[u64], data: &[T]) -> Vec<u8>
where
    T: npyz::AutoSerialize + Copy,
{
    let mut buf = Vec::new();
    {
        let mut writer = npyz::WriteOptions::new()
            .default_dtype()
            .shape(shape)
            .writer(&mut buf)
            .begin_nd()
            .expect("npy header");
        writer.extend(data.iter().copied()).expect("npy data");
        writer.finish().expect("npy finish");
    }
    buf
}

/// An `.npy` stream with a literal header dict, e.g.
/// `{'descr': '>u2', 'fortran_order': False, 'shape': (3,), }`.
pub fn npy_with_header(header: &str, payload: &[u8]) -> Vec<u8> {
    let mut dict = header.to_string();
    let unpadded = 10 + dict.len() + 1;
    dict.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    dict.push('\n');

    let mut out = b"\x93NUMPY\x01\x00".to_vec();
    out.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Builds an `.npz` archive in memory.
#[derive(Default)]
pub struct NpzBuilder {
    members: Vec<(String, Vec<u8>)>,
}

impl NpzBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn array(self, key: &str, shape: &[u64], data: &[f64]) -> Self {
        self.member(key, npy_bytes(shape, data))
    }

    /// Add a pre-encoded `.npy` member.
    pub fn member(mut self, key: &str, npy: Vec<u8>) -> Self {
        self.members.push((format!("{key}.npy"), npy));
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, bytes) in self.members {
            zip.start_file(name, options).expect("zip entry");
            zip.write_all(&bytes).expect("zip write");
        }
        zip.finish().expect("zip finish").into_inner()
    }
}

// ---------------------------------------------------------------------------
// MemoryFiles – counts opens and tracks live handles
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryFiles {
    files: HashMap<PathBuf, Vec<u8>>,
    opens: AtomicUsize,
    live: Arc<AtomicUsize>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, bytes: Vec<u8>) -> Self {
        self.files.insert(PathBuf::from(path), bytes);
        self
    }

    /// Number of `open` calls, successful or not.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Handles handed out and not yet dropped.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

impl FileSource for MemoryFiles {
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek + '_>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .files
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))?;
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TrackedHandle {
            inner: Cursor::new(bytes.as_slice()),
            live: Arc::clone(&self.live),
        }))
    }
}

struct TrackedHandle<'a> {
    inner: Cursor<&'a [u8]>,
    live: Arc<AtomicUsize>,
}

impl Read for TrackedHandle<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for TrackedHandle<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Drop for TrackedHandle<'_> {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
