// MAT container — MATLAB Level 5 MAT-file parser and writer
//
// SAT-4 and SAT-6 ship as a single .mat file holding four arrays:
//   train_x [H, W, C, N_train]   uint8 images
//   train_y [K, N_train]         one-hot labels
//   test_x  [H, W, C, N_test]
//   test_y  [K, N_test]
//
// Level 5 format (all values in the byte order named by the header):
//   header:        text(116) | subsys offset(8) | version(u16 = 0x0100) | endian("IM" or "MI")
//   data element:  type(u32) | nbytes(u32) | payload | padding to 8 bytes
//   small element: nbytes(u16) | type(u16) | payload(<= 4 bytes)   (one 8-byte word)
//   miCOMPRESSED:  zlib stream that inflates to exactly one data element (no padding)
//   miMATRIX:      array flags | dimensions | name | real part [| imaginary part]
//
// Only numeric and logical arrays are materialised. Cell, struct, char,
// sparse, object and complex arrays are skipped.

use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::{debug, info};

use satml_core::{bail, DType, Error, NdArray, Result, Storage, WithDType};

const HEADER_LEN: usize = 128;
const HEADER_TEXT_LEN: usize = 116;
const VERSION: u16 = 0x0100;

// Data element types
const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_SINGLE: u32 = 7;
const MI_DOUBLE: u32 = 9;
const MI_INT64: u32 = 12;
const MI_UINT64: u32 = 13;
const MI_MATRIX: u32 = 14;
const MI_COMPRESSED: u32 = 15;

// Array classes
const MX_DOUBLE: u32 = 6;
const MX_SINGLE: u32 = 7;
const MX_UINT8: u32 = 9;
const MX_UINT64: u32 = 15;

const FLAG_COMPLEX: u32 = 0x08;
const FLAG_LOGICAL: u32 = 0x02;

/// Byte order of a MAT-file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, b: &[u8]) -> u16 {
        let a = [b[0], b[1]];
        match self {
            Endian::Little => u16::from_le_bytes(a),
            Endian::Big => u16::from_be_bytes(a),
        }
    }

    fn u32(self, b: &[u8]) -> u32 {
        let a = [b[0], b[1], b[2], b[3]];
        match self {
            Endian::Little => u32::from_le_bytes(a),
            Endian::Big => u32::from_be_bytes(a),
        }
    }

    fn u64(self, b: &[u8]) -> u64 {
        let mut a = [0u8; 8];
        a.copy_from_slice(&b[..8]);
        match self {
            Endian::Little => u64::from_le_bytes(a),
            Endian::Big => u64::from_be_bytes(a),
        }
    }

    fn put_u16(self, buf: &mut Vec<u8>, v: u16) {
        match self {
            Endian::Little => buf.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => buf.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn put_u32(self, buf: &mut Vec<u8>, v: u32) {
        match self {
            Endian::Little => buf.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => buf.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn put_u64(self, buf: &mut Vec<u8>, v: u64) {
        match self {
            Endian::Little => buf.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => buf.extend_from_slice(&v.to_be_bytes()),
        }
    }
}

/// Load failure raised before the caller's path is known.
fn malformed(reason: impl ToString) -> Error {
    Error::data_load("", reason)
}

/// An in-memory MAT container: named arrays, loaded eagerly.
#[derive(Debug, Clone, Default)]
pub struct MatFile {
    header_text: String,
    arrays: BTreeMap<String, NdArray>,
}

impl MatFile {
    /// An empty container, for building fixtures in memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a MAT-file from disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| Error::data_load(path, e))?;
        let mat = Self::from_bytes(&bytes).map_err(|e| e.at_path(path))?;
        info!(
            path = %path.display(),
            bytes = bytes.len(),
            arrays = mat.len(),
            "loaded MAT container"
        );
        Ok(mat)
    }

    /// Parse a MAT-file already held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(malformed(format!(
                "file too short for a MAT header: {} bytes",
                bytes.len()
            )));
        }

        let endian = match &bytes[126..128] {
            b"IM" => Endian::Little,
            b"MI" => Endian::Big,
            other => {
                return Err(malformed(format!(
                    "not a Level 5 MAT-file (endian indicator {other:?})"
                )))
            }
        };
        let version = endian.u16(&bytes[124..126]);
        if version != VERSION {
            return Err(malformed(format!(
                "unsupported MAT version {version:#06x}"
            )));
        }

        let header_text = String::from_utf8_lossy(&bytes[..HEADER_TEXT_LEN])
            .trim_end_matches(|c: char| c == ' ' || c == '\0')
            .to_string();

        let mut mat = MatFile {
            header_text,
            arrays: BTreeMap::new(),
        };
        mat.parse_elements(&bytes[HEADER_LEN..], endian)?;
        Ok(mat)
    }

    fn parse_elements(&mut self, mut buf: &[u8], endian: Endian) -> Result<()> {
        // Trailing bytes shorter than a tag are padding.
        while buf.len() >= 8 {
            let (tag, rest) = read_element(buf, endian)?;
            buf = rest;
            match tag.ty {
                MI_COMPRESSED => {
                    let mut inflated = Vec::new();
                    ZlibDecoder::new(tag.payload)
                        .read_to_end(&mut inflated)
                        .map_err(|e| malformed(format!("corrupt compressed element: {e}")))?;
                    self.parse_elements(&inflated, endian)?;
                }
                MI_MATRIX => {
                    if let Some((name, array)) = parse_matrix(tag.payload, endian)? {
                        self.arrays.insert(name, array);
                    }
                }
                other => debug!(ty = other, "skipping top-level MAT element"),
            }
        }
        Ok(())
    }

    /// Descriptive text from the file header.
    pub fn header_text(&self) -> &str {
        &self.header_text
    }

    /// Look up an array by variable name.
    pub fn get(&self, name: &str) -> Option<&NdArray> {
        self.arrays.get(name)
    }

    /// Look up an array that must be present.
    pub fn require(&self, name: &str) -> Result<&NdArray> {
        self.get(name)
            .ok_or_else(|| malformed(format!("container has no array named `{name}`")))
    }

    /// Remove and return an array.
    pub fn take(&mut self, name: &str) -> Option<NdArray> {
        self.arrays.remove(name)
    }

    /// Add or replace an array.
    pub fn insert(&mut self, name: impl Into<String>, array: NdArray) {
        self.arrays.insert(name.into(), array);
    }

    /// Variable names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.arrays.keys().map(String::as_str)
    }

    /// Number of arrays held.
    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

// Element parsing

struct Element<'a> {
    ty: u32,
    payload: &'a [u8],
}

/// Split one data element off the front of `buf`.
fn read_element(buf: &[u8], endian: Endian) -> Result<(Element<'_>, &[u8])> {
    if buf.len() < 8 {
        return Err(malformed("truncated element tag"));
    }
    let word = endian.u32(&buf[0..4]);

    // Small data element: type and size packed into one word, payload inline.
    if word >> 16 != 0 {
        let ty = word & 0xFFFF;
        let nbytes = (word >> 16) as usize;
        if nbytes > 4 {
            return Err(malformed(format!("small element claims {nbytes} bytes")));
        }
        let elem = Element {
            ty,
            payload: &buf[4..4 + nbytes],
        };
        return Ok((elem, &buf[8..]));
    }

    let ty = word;
    let nbytes = endian.u32(&buf[4..8]) as usize;
    let end = 8 + nbytes;
    if buf.len() < end {
        return Err(malformed(format!(
            "truncated element: type {ty} needs {nbytes} bytes, {} left",
            buf.len() - 8
        )));
    }
    let next = if ty == MI_COMPRESSED {
        end
    } else {
        (end + 7) / 8 * 8
    };
    let elem = Element {
        ty,
        payload: &buf[8..end],
    };
    Ok((elem, &buf[next.min(buf.len())..]))
}

/// Parse an miMATRIX payload. Returns `None` for arrays that are skipped.
fn parse_matrix(payload: &[u8], endian: Endian) -> Result<Option<(String, NdArray)>> {
    // An empty miMATRIX stands for an empty array with no name.
    if payload.is_empty() {
        return Ok(None);
    }

    let (flags, rest) = read_element(payload, endian)?;
    if flags.ty != MI_UINT32 || flags.payload.len() < 4 {
        return Err(malformed("array flags sub-element missing"));
    }
    let flag_word = endian.u32(flags.payload);
    let class = flag_word & 0xFF;
    let bits = (flag_word >> 8) & 0xFF;

    let (dims_el, rest) = read_element(rest, endian)?;
    if dims_el.ty != MI_INT32 {
        return Err(malformed("dimensions sub-element missing"));
    }
    let mut dims = Vec::with_capacity(dims_el.payload.len() / 4);
    for chunk in dims_el.payload.chunks_exact(4) {
        let d = endian.u32(chunk) as i32;
        if d < 0 {
            return Err(malformed(format!("negative dimension {d}")));
        }
        dims.push(d as usize);
    }
    if dims.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d)).is_none() {
        return Err(malformed(format!(
            "dimensions {dims:?} describe more elements than fit in memory"
        )));
    }

    let (name_el, rest) = read_element(rest, endian)?;
    let name = String::from_utf8_lossy(name_el.payload).to_string();

    if !(MX_DOUBLE..=MX_UINT64).contains(&class) {
        debug!(name = %name, class, "skipping non-numeric MAT array");
        return Ok(None);
    }
    if bits & FLAG_COMPLEX != 0 {
        debug!(name = %name, "skipping complex MAT array");
        return Ok(None);
    }

    let (real, _) = read_element(rest, endian)?;
    let logical = bits & FLAG_LOGICAL != 0;
    let target = if class == MX_UINT8 || logical {
        DType::U8
    } else if class == MX_SINGLE {
        DType::F32
    } else {
        DType::F64
    };

    let storage = decode_storage(real.payload, real.ty, target, endian)
        .map_err(|e| malformed(format!("array `{name}`: {e}")))?;
    let array = NdArray::new(dims, storage).map_err(|e| malformed(format!("array `{name}`: {e}")))?;
    Ok(Some((name, array)))
}

/// Size in bytes of one element of a numeric data type.
fn element_size(ty: u32) -> Option<usize> {
    match ty {
        MI_INT8 | MI_UINT8 => Some(1),
        MI_INT16 | MI_UINT16 => Some(2),
        MI_INT32 | MI_UINT32 | MI_SINGLE => Some(4),
        MI_DOUBLE | MI_INT64 | MI_UINT64 => Some(8),
        _ => None,
    }
}

/// Decode one stored element as f64.
fn decode_one(b: &[u8], ty: u32, endian: Endian) -> f64 {
    match ty {
        MI_INT8 => b[0] as i8 as f64,
        MI_UINT8 => b[0] as f64,
        MI_INT16 => endian.u16(b) as i16 as f64,
        MI_UINT16 => endian.u16(b) as f64,
        MI_INT32 => endian.u32(b) as i32 as f64,
        MI_UINT32 => endian.u32(b) as f64,
        MI_SINGLE => f32::from_bits(endian.u32(b)) as f64,
        MI_DOUBLE => f64::from_bits(endian.u64(b)),
        MI_INT64 => endian.u64(b) as i64 as f64,
        MI_UINT64 => endian.u64(b) as f64,
        _ => unreachable!("element_size rejects other types"),
    }
}

fn decode_vec<T: WithDType>(payload: &[u8], ty: u32, size: usize, endian: Endian) -> Vec<T> {
    payload
        .chunks_exact(size)
        .map(|c| T::from_f64(decode_one(c, ty, endian)))
        .collect()
}

/// Convert the stored element type into the in-memory dtype for the class.
///
/// MATLAB compacts storage (a double array of small integers may be written
/// as miUINT8), so the stored type and the class often differ.
fn decode_storage(payload: &[u8], ty: u32, target: DType, endian: Endian) -> Result<Storage> {
    let size = element_size(ty)
        .ok_or_else(|| Error::msg(format!("unsupported element type {ty}")))?;
    if payload.len() % size != 0 {
        bail!(
            "{} bytes is not a whole number of {size}-byte elements",
            payload.len()
        );
    }
    let storage = match target {
        DType::U8 if ty == MI_UINT8 => Storage::U8(payload.to_vec()),
        DType::U8 => Storage::U8(decode_vec(payload, ty, size, endian)),
        DType::F32 => Storage::F32(decode_vec(payload, ty, size, endian)),
        DType::F64 => Storage::F64(decode_vec(payload, ty, size, endian)),
    };
    Ok(storage)
}

// Writer

/// Builds Level 5 MAT-files from [`NdArray`]s.
///
/// Used for fixtures and for exporting windows; arrays are written with
/// their in-memory class (U8 → uint8, F32 → single, F64 → double).
#[derive(Debug, Clone)]
pub struct MatWriter {
    endian: Endian,
    arrays: Vec<(String, NdArray)>,
}

impl Default for MatWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MatWriter {
    /// A little-endian writer, the byte order MATLAB uses on every current platform.
    pub fn new() -> Self {
        Self {
            endian: Endian::Little,
            arrays: Vec::new(),
        }
    }

    pub fn endian(mut self, endian: Endian) -> Self {
        self.endian = endian;
        self
    }

    /// Append a named array.
    pub fn add(mut self, name: &str, array: &NdArray) -> Self {
        self.arrays.push((name.to_string(), array.clone()));
        self
    }

    /// Serialize with every array stored uncompressed.
    ///
    /// Fails when an array is too large for the format's 32-bit sizes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = self.header();
        for (name, array) in &self.arrays {
            buf.extend_from_slice(&self.matrix_element(name, array)?);
        }
        Ok(buf)
    }

    /// Serialize with every array wrapped in an miCOMPRESSED element.
    pub fn to_compressed_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = self.header();
        for (name, array) in &self.arrays {
            let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
            enc.write_all(&self.matrix_element(name, array)?)
                .map_err(|e| Error::msg(format!("compressing `{name}`: {e}")))?;
            let z = enc
                .finish()
                .map_err(|e| Error::msg(format!("compressing `{name}`: {e}")))?;
            self.endian.put_u32(&mut buf, MI_COMPRESSED);
            self.endian.put_u32(&mut buf, size_u32(z.len(), name)?);
            buf.extend_from_slice(&z);
        }
        Ok(buf)
    }

    /// Write an uncompressed MAT-file to disk.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_bytes()?).map_err(|e| Error::data_load(path, e))
    }

    fn header(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN);
        let text = "MATLAB 5.0 MAT-file, written by satml";
        buf.extend_from_slice(text.as_bytes());
        buf.resize(HEADER_TEXT_LEN, b' ');
        buf.extend_from_slice(&[0u8; 8]);
        self.endian.put_u16(&mut buf, VERSION);
        buf.extend_from_slice(match self.endian {
            Endian::Little => b"IM",
            Endian::Big => b"MI",
        });
        buf
    }

    fn sub_element(&self, buf: &mut Vec<u8>, ty: u32, payload: &[u8], name: &str) -> Result<()> {
        self.endian.put_u32(buf, ty);
        self.endian.put_u32(buf, size_u32(payload.len(), name)?);
        buf.extend_from_slice(payload);
        pad8(buf);
        Ok(())
    }

    fn matrix_element(&self, name: &str, array: &NdArray) -> Result<Vec<u8>> {
        let e = self.endian;
        let (class, ty) = match array.dtype() {
            DType::U8 => (MX_UINT8, MI_UINT8),
            DType::F32 => (MX_SINGLE, MI_SINGLE),
            DType::F64 => (MX_DOUBLE, MI_DOUBLE),
        };

        let mut body = Vec::new();

        let mut flags = Vec::with_capacity(8);
        e.put_u32(&mut flags, class);
        e.put_u32(&mut flags, 0);
        self.sub_element(&mut body, MI_UINT32, &flags, name)?;

        // MATLAB arrays have at least two dimensions.
        let mut dims = array.dims().to_vec();
        while dims.len() < 2 {
            dims.push(1);
        }
        let mut dim_bytes = Vec::with_capacity(dims.len() * 4);
        for d in dims {
            // Dimensions are stored as miINT32.
            let Ok(d) = i32::try_from(d) else {
                bail!("array `{name}`: dimension {d} does not fit a MAT-file");
            };
            e.put_u32(&mut dim_bytes, d as u32);
        }
        self.sub_element(&mut body, MI_INT32, &dim_bytes, name)?;

        self.sub_element(&mut body, MI_INT8, name.as_bytes(), name)?;

        let mut data = Vec::with_capacity(array.elem_count() * array.dtype().size_in_bytes());
        match array.storage() {
            Storage::U8(v) => data.extend_from_slice(v),
            Storage::F32(v) => v.iter().for_each(|x| e.put_u32(&mut data, x.to_bits())),
            Storage::F64(v) => v.iter().for_each(|x| e.put_u64(&mut data, x.to_bits())),
        }
        self.sub_element(&mut body, ty, &data, name)?;

        let mut out = Vec::with_capacity(body.len() + 8);
        e.put_u32(&mut out, MI_MATRIX);
        e.put_u32(&mut out, size_u32(body.len(), name)?);
        out.extend_from_slice(&body);
        Ok(out)
    }
}

/// Byte count of an element tag; the format has no room for more than `u32::MAX`.
fn size_u32(len: usize, name: &str) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        Error::msg(format!(
            "array `{name}`: {len} bytes exceed the 4 GiB element limit"
        ))
    })
}

fn pad8(buf: &mut Vec<u8>) {
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
}
