//! File I/O: safetensors tensors and tab-separated tables.
//!
//! Tensors (training labels, masked volumes, model evaluations) use the
//! safetensors layout: an 8-byte little-endian header length, a JSON header
//! mapping names to `{dtype, shape, data_offsets}`, then the raw bytes.
//!
//! Tables are tab-separated with a header row; a `.gz` extension selects gzip
//! compression on both read and write.
use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::{Array, Array2, Array3, ArrayD, Dimension, IxDyn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::PipelineError;

// ── Header ────────────────────────────────────────────────────────────────────

/// Key of the optional free-form metadata block in a header.
const METADATA_KEY: &str = "__metadata__";

/// One tensor's header entry.  Offsets are relative to the end of the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TensorEntry {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

/// Split a file into its tensor entries and the byte slice they index into.
fn split_header(bytes: &[u8]) -> Result<(BTreeMap<String, TensorEntry>, &[u8])> {
    let Some((len, rest)) = bytes.split_first_chunk::<8>() else {
        bail!("safetensors file too small");
    };
    let n = u64::from_le_bytes(*len) as usize;
    if rest.len() < n {
        bail!("safetensors header length {n} exceeds file size {}", bytes.len());
    }
    let (header, body) = rest.split_at(n);
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_slice(header).context("failed to parse safetensors header")?;
    let mut entries = BTreeMap::new();
    for (name, value) in raw {
        if name == METADATA_KEY {
            continue;
        }
        let entry: TensorEntry = serde_json::from_value(value)
            .with_context(|| format!("malformed header entry for '{name}'"))?;
        entries.insert(name, entry);
    }
    Ok((entries, body))
}

fn decode(dtype: &str, raw: &[u8]) -> Result<Vec<f64>> {
    let vals = match dtype {
        "F32" => raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        "F64" => raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        "I32" => raw
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        "U8" => raw.iter().map(|&b| b as f64).collect(),
        other => bail!("unsupported dtype {other}"),
    };
    Ok(vals)
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// One decoded tensor (values widened to `f64`).
#[derive(Debug, Clone)]
pub struct Tensor {
    pub dtype: String,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Tensor {
    pub fn into_dyn(self) -> Result<ArrayD<f64>> {
        Ok(ArrayD::from_shape_vec(IxDyn(&self.shape), self.data)?)
    }
}

/// All tensors of one safetensors file.
pub struct SafeTensors {
    tensors: HashMap<String, Tensor>,
}

impl SafeTensors {
    /// Load a file.  A missing file is reported as
    /// [`PipelineError::MissingInput`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::MissingInput(path.to_path_buf()).into());
        }
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let (entries, body) = split_header(&bytes)?;

        let mut tensors = HashMap::with_capacity(entries.len());
        for (name, entry) in entries {
            let [start, end] = entry.data_offsets;
            let raw = body
                .get(start..end)
                .with_context(|| format!("tensor '{name}' lies outside {}", path.display()))?;
            let data = decode(&entry.dtype, raw)?;
            if entry.shape.iter().product::<usize>() != data.len() {
                bail!("tensor '{name}': shape {:?} does not match {} values", entry.shape, data.len());
            }
            tensors.insert(name, Tensor { dtype: entry.dtype, shape: entry.shape, data });
        }
        Ok(SafeTensors { tensors })
    }

    pub fn get(&self, name: &str) -> Result<&Tensor> {
        self.tensors.get(name).with_context(|| format!("missing '{name}' tensor"))
    }

    pub fn array2(&self, name: &str) -> Result<Array2<f64>> {
        let t = self.get(name)?;
        if t.shape.len() != 2 {
            bail!("'{name}' has shape {:?}, expected 2-D", t.shape);
        }
        Ok(Array2::from_shape_vec((t.shape[0], t.shape[1]), t.data.clone())?)
    }

    pub fn array3(&self, name: &str) -> Result<Array3<f64>> {
        let t = self.get(name)?;
        if t.shape.len() != 3 {
            bail!("'{name}' has shape {:?}, expected 3-D", t.shape);
        }
        Ok(Array3::from_shape_vec((t.shape[0], t.shape[1], t.shape[2]), t.data.clone())?)
    }

    pub fn array_dyn(&self, name: &str) -> Result<ArrayD<f64>> {
        self.get(name)?.clone().into_dyn()
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Element types a [`TensorWriter`] can store.
pub trait TensorElement: Copy {
    const DTYPE: &'static str;
    fn push_le(self, out: &mut Vec<u8>);
}

impl TensorElement for f32 {
    const DTYPE: &'static str = "F32";
    fn push_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl TensorElement for f64 {
    const DTYPE: &'static str = "F64";
    fn push_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// Collects named tensors and writes them as one safetensors file.
///
/// Tensors are laid out back to back in insertion order; the header is padded
/// with spaces to an 8-byte boundary.
///
/// ```rust,no_run
/// use gazecal::io::TensorWriter;
/// use ndarray::Array3;
/// use std::path::Path;
///
/// let label = Array3::<f32>::zeros((16, 10, 2));
/// let mut w = TensorWriter::new();
/// w.add_array("labels", &label);
/// w.add("euc_pred", &[0.5_f64; 4], &[2, 2]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct TensorWriter {
    header: BTreeMap<String, TensorEntry>,
    body: Vec<u8>,
}

impl TensorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `data` as a row-major tensor of `shape`.  Re-adding a name
    /// replaces its header entry; the earlier bytes stay unreferenced.
    pub fn add<T: TensorElement>(&mut self, name: &str, data: &[T], shape: &[usize]) {
        let start = self.body.len();
        self.body.reserve(std::mem::size_of_val(data));
        for &v in data {
            v.push_le(&mut self.body);
        }
        let entry = TensorEntry {
            dtype: T::DTYPE.to_string(),
            shape: shape.to_vec(),
            data_offsets: [start, self.body.len()],
        };
        self.header.insert(name.to_string(), entry);
    }

    /// Append an ndarray in logical (row-major) order.
    pub fn add_array<T: TensorElement, D: Dimension>(&mut self, name: &str, arr: &Array<T, D>) {
        let data: Vec<T> = arr.iter().copied().collect();
        self.add(name, &data, arr.shape());
    }

    pub fn len(&self) -> usize {
        self.header.len()
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_empty()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut header = serde_json::to_vec(&self.header)?;
        header.resize(header.len().next_multiple_of(8), b' ');

        let file = std::fs::File::create(path)
            .with_context(|| format!("creating {}", path.display()))?;
        let mut out = BufWriter::new(file);
        out.write_all(&(header.len() as u64).to_le_bytes())?;
        out.write_all(&header)?;
        out.write_all(&self.body)?;
        out.flush().with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

// ── Training labels ───────────────────────────────────────────────────────────

/// Write a `(num_TR, points_per_TR, 2)` label tensor under the key `labels`.
pub fn write_label(path: &Path, label: &Array3<f32>) -> Result<()> {
    let mut w = TensorWriter::new();
    w.add_array("labels", label);
    w.write(path)
}

/// Read a label tensor written by [`write_label`].
pub fn read_label(path: &Path) -> Result<Array3<f32>> {
    Ok(SafeTensors::load(path)?.array3("labels")?.mapv(|v| v as f32))
}

// ── Tab-separated tables ──────────────────────────────────────────────────────

fn is_gz(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "gz")
}

fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
    if !path.exists() {
        return Err(PipelineError::MissingInput(path.to_path_buf()).into());
    }
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    Ok(if is_gz(path) { Box::new(GzDecoder::new(file)) } else { Box::new(file) })
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    if is_gz(path) {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(bytes)?;
        encoder.finish()?;
    } else {
        let mut file = file;
        file.write_all(bytes)?;
    }
    Ok(())
}

/// Parse a table cell as a number.  `n/a`, `NaN` and empty cells become NaN.
pub fn parse_number(field: &str) -> Result<f64> {
    let f = field.trim();
    if f.is_empty() || f.eq_ignore_ascii_case("n/a") || f.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    f.parse::<f64>().with_context(|| format!("not a number: '{f}'"))
}

/// Read every record of a tab-separated file as strings.
pub fn read_records(path: &Path, has_headers: bool) -> Result<Vec<csv::StringRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_headers)
        .flexible(true)
        .from_reader(open_reader(path)?);
    let mut out = Vec::new();
    for rec in reader.records() {
        out.push(rec.with_context(|| format!("reading {}", path.display()))?);
    }
    Ok(out)
}

/// Column-oriented numeric table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TsvTable {
    pub headers: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

impl TsvTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.headers.push(name.into());
        self.columns.push(values);
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.headers
            .iter()
            .position(|h| h == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// Write with a header row.  All columns must have the same length.
    pub fn write(&self, path: &Path) -> Result<()> {
        let n = self.n_rows();
        if let Some(i) = self.columns.iter().position(|c| c.len() != n) {
            return Err(PipelineError::Alignment(format!(
                "column '{}' has {} rows, expected {n}",
                self.headers[i],
                self.columns[i].len()
            ))
            .into());
        }
        let mut w = csv::WriterBuilder::new().delimiter(b'\t').from_writer(Vec::new());
        w.write_record(&self.headers)?;
        for r in 0..n {
            w.write_record(self.columns.iter().map(|c| c[r].to_string()))?;
        }
        let bytes = w.into_inner().map_err(|e| anyhow::anyhow!("flushing table: {e}"))?;
        write_bytes(path, &bytes)
    }

    /// Read a table with a header row.
    pub fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_reader(open_reader(path)?);
        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut columns = vec![Vec::new(); headers.len()];
        for rec in reader.records() {
            let rec = rec.with_context(|| format!("reading {}", path.display()))?;
            for (col, field) in columns.iter_mut().zip(rec.iter()) {
                col.push(parse_number(field)?);
            }
        }
        Ok(Self { headers, columns })
    }
}
