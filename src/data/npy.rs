//! A reader for the `.npy` arrays the datasets are stored as, and a writer for `f32` ones.
//!
//! Every array is read as a matrix of `f32` rows: the leading axis indexes the samples and
//! the remaining axes are flattened, row-major, into the features.

use std::{
    error::Error,
    fmt::{self, Display},
    io::{self, Write},
};

use ndarray::{Array2, ArrayD, ArrayView, Dimension, IxDyn, ShapeBuilder};

const MAGIC: &[u8] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

#[derive(Debug)]
pub enum NpyError {
    BadMagic,
    UnsupportedVersion(u8, u8),
    BadHeader(String),
    UnsupportedDtype(String),
    /// The data is shorter than the header says.
    Truncated { expected: usize, got: usize },
}

impl Display for NpyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic => write!(f, "not an npy file"),
            Self::UnsupportedVersion(major, minor) => {
                write!(f, "unsupported npy version {major}.{minor}")
            }
            Self::BadHeader(msg) => write!(f, "bad npy header: {msg}"),
            Self::UnsupportedDtype(descr) => write!(f, "unsupported dtype `{descr}`"),
            Self::Truncated { expected, got } => {
                write!(f, "expected {expected} bytes of data, found {got}")
            }
        }
    }
}

impl Error for NpyError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F4,
    F8,
    I4,
    I8,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, NpyError> {
        let unsupported = || NpyError::UnsupportedDtype(descr.to_string());

        let kind = match descr.as_bytes().first() {
            Some(b'<' | b'|') => &descr[1..],
            Some(b'=') if cfg!(target_endian = "little") => &descr[1..],
            _ => return Err(unsupported()),
        };

        match kind {
            "f4" => Ok(Self::F4),
            "f8" => Ok(Self::F8),
            "i4" => Ok(Self::I4),
            "i8" => Ok(Self::I8),
            _ => Err(unsupported()),
        }
    }

    fn size(self) -> usize {
        match self {
            Self::F4 | Self::I4 => 4,
            Self::F8 | Self::I8 => 8,
        }
    }

    fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            Self::F4 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::I4 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::F8 => f64::from_le_bytes(le8(bytes)) as f32,
            Self::I8 => i64::from_le_bytes(le8(bytes)) as f32,
        }
    }
}

fn le8(bytes: &[u8]) -> [u8; 8] {
    let mut buf = [0; 8];
    buf.copy_from_slice(&bytes[..8]);
    buf
}

#[derive(Debug, PartialEq, Eq)]
struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// Finds the raw value of `key` in the header's Python dict literal.
fn dict_value<'h>(dict: &'h str, key: &str) -> Result<&'h str, NpyError> {
    let missing = || NpyError::BadHeader(format!("missing key `{key}`"));

    let start = ["'", "\""]
        .iter()
        .find_map(|quote| dict.find(&format!("{quote}{key}{quote}")))
        .ok_or_else(missing)?;

    let rest = &dict[start + key.len() + 2..];
    let colon = rest.find(':').ok_or_else(missing)?;
    Ok(rest[colon + 1..].trim_start())
}

fn parse_header(dict: &str) -> Result<Header, NpyError> {
    let descr = dict_value(dict, "descr")?;
    let quote = descr
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| NpyError::BadHeader("descr is not a string".into()))?;
    let descr = descr[1..]
        .split(quote)
        .next()
        .ok_or_else(|| NpyError::BadHeader("unterminated descr".into()))?;

    let fortran_order = dict_value(dict, "fortran_order")?;
    let fortran_order = if fortran_order.starts_with("True") {
        true
    } else if fortran_order.starts_with("False") {
        false
    } else {
        return Err(NpyError::BadHeader("fortran_order is not a bool".into()));
    };

    let shape = dict_value(dict, "shape")?;
    let shape = shape
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .ok_or_else(|| NpyError::BadHeader("shape is not a tuple".into()))?
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| {
            dim.trim_end_matches('L')
                .parse()
                .map_err(|_| NpyError::BadHeader(format!("bad dimension `{dim}`")))
        })
        .collect::<Result<_, _>>()?;

    Ok(Header {
        dtype: Dtype::parse(descr)?,
        fortran_order,
        shape,
    })
}

fn checked_product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Decodes an `.npy` file into `(samples, features)` rows of `f32`.
///
/// # Arguments
/// * `bytes` - The whole file.
///
/// # Returns
/// The rows, a one dimensional array becoming a single feature column.
pub fn decode(bytes: &[u8]) -> Result<Array2<f32>, NpyError> {
    let rest = bytes.strip_prefix(MAGIC).ok_or(NpyError::BadMagic)?;
    let truncated = |expected| NpyError::Truncated {
        expected,
        got: bytes.len(),
    };

    let (&[major, minor], rest) = rest.split_first_chunk::<2>().ok_or_else(|| truncated(8))?;
    let (header_len, rest) = match major {
        1 => {
            let (len, rest) = rest.split_first_chunk::<2>().ok_or_else(|| truncated(10))?;
            (u16::from_le_bytes(*len) as usize, rest)
        }
        2 | 3 => {
            let (len, rest) = rest.split_first_chunk::<4>().ok_or_else(|| truncated(12))?;
            (u32::from_le_bytes(*len) as usize, rest)
        }
        _ => return Err(NpyError::UnsupportedVersion(major, minor)),
    };

    if rest.len() < header_len {
        return Err(truncated(bytes.len() - rest.len() + header_len));
    }

    let (dict, data) = rest.split_at(header_len);
    let dict = std::str::from_utf8(dict)
        .map_err(|_| NpyError::BadHeader("the header is not text".into()))?;
    let header = parse_header(dict)?;

    let Some((&samples, features)) = header.shape.split_first() else {
        return Err(NpyError::BadHeader("scalars are not datasets".into()));
    };

    let too_large = || NpyError::BadHeader(format!("shape {:?} is too large", header.shape));
    let features = checked_product(features).ok_or_else(too_large)?;
    let bytes_len = samples
        .checked_mul(features)
        .and_then(|len| len.checked_mul(header.dtype.size()))
        .ok_or_else(too_large)?;

    if data.len() < bytes_len {
        return Err(NpyError::Truncated {
            expected: bytes_len,
            got: data.len(),
        });
    }

    let size = header.dtype.size();
    let values: Vec<f32> = data[..bytes_len]
        .chunks_exact(size)
        .map(|bytes| header.dtype.decode(bytes))
        .collect();

    let shape = IxDyn(&header.shape);
    let array = ArrayD::from_shape_vec(shape.set_f(header.fortran_order), values)
        .map_err(|e| NpyError::BadHeader(e.to_string()))?;

    array
        .as_standard_layout()
        .into_owned()
        .into_shape_with_order((samples, features))
        .map_err(|e| NpyError::BadHeader(e.to_string()))
}

/// Encodes an `f32` array as a version 1.0, little endian, C ordered `.npy` file.
pub fn write<W: Write, D: Dimension>(mut writer: W, array: ArrayView<f32, D>) -> io::Result<()> {
    let shape = match array.shape() {
        [len] => format!("({len},)"),
        dims => {
            let dims: Vec<_> = dims.iter().map(usize::to_string).collect();
            format!("({})", dims.join(", "))
        }
    };

    let mut header = format!("{{'descr': '<f4', 'fortran_order': False, 'shape': {shape}, }}");
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    header.extend(std::iter::repeat_n(' ', unpadded.next_multiple_of(HEADER_ALIGN) - unpadded));
    header.push('\n');

    let header_len = u16::try_from(header.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "npy header too long"))?;

    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(header.as_bytes())?;

    for value in array.as_standard_layout().iter() {
        writer.write_all(&value.to_le_bytes())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use ndarray::{Array3, array};

    use super::*;

    fn raw_npy(descr: &str, fortran_order: bool, shape: &str, data: &[u8]) -> Vec<u8> {
        let order = if fortran_order { "True" } else { "False" };
        let header = format!("{{'descr': '{descr}', 'fortran_order': {order}, 'shape': {shape}, }}\n");
        let mut bytes = MAGIC.to_vec();
        bytes.extend([1, 0]);
        bytes.extend((header.len() as u16).to_le_bytes());
        bytes.extend(header.as_bytes());
        bytes.extend(data);
        bytes
    }

    #[test]
    fn written_arrays_are_aligned_and_decode_back() {
        let x = Array3::from_shape_fn((2, 3, 2), |(i, j, k)| (i * 6 + j * 2 + k) as f32);
        let mut bytes = Vec::new();
        write(&mut bytes, x.view()).unwrap();

        let data_start = bytes.len() - x.len() * 4;
        assert_eq!(data_start % HEADER_ALIGN, 0);

        let rows = decode(&bytes).unwrap();
        assert_eq!(rows.dim(), (2, 6));
        assert_eq!(rows.row(1).to_vec(), [6., 7., 8., 9., 10., 11.]);
    }

    #[test]
    fn decodes_doubles_and_integers() {
        let doubles: Vec<u8> = [1.5f64, -2.25].iter().flat_map(|v| v.to_le_bytes()).collect();
        let rows = decode(&raw_npy("<f8", false, "(2,)", &doubles)).unwrap();
        assert_eq!(rows, array![[1.5], [-2.25]]);

        let ints: Vec<u8> = [3i32, -4, 5, 6].iter().flat_map(|v| v.to_le_bytes()).collect();
        let rows = decode(&raw_npy("<i4", false, "(2, 2)", &ints)).unwrap();
        assert_eq!(rows, array![[3., -4.], [5., 6.]]);

        let longs: Vec<u8> = [7i64, 8].iter().flat_map(|v| v.to_le_bytes()).collect();
        let rows = decode(&raw_npy("<i8", false, "(1, 2)", &longs)).unwrap();
        assert_eq!(rows, array![[7., 8.]]);
    }

    #[test]
    fn decodes_fortran_order() {
        // The column major layout of [[1, 2, 3], [4, 5, 6]].
        let data: Vec<u8> = [1f32, 4., 2., 5., 3., 6.]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();

        let rows = decode(&raw_npy("<f4", true, "(2, 3)", &data)).unwrap();
        assert_eq!(rows, array![[1., 2., 3.], [4., 5., 6.]]);
    }

    #[test]
    fn rejects_malformed_files() {
        assert!(matches!(decode(b"PK\x03\x04"), Err(NpyError::BadMagic)));

        let big_endian = raw_npy(">f4", false, "(1,)", &[0; 4]);
        assert!(matches!(decode(&big_endian), Err(NpyError::UnsupportedDtype(_))));

        let short = raw_npy("<f4", false, "(2, 2)", &[0; 12]);
        assert!(matches!(
            decode(&short),
            Err(NpyError::Truncated {
                expected: 16,
                got: 12
            })
        ));

        let huge = raw_npy("<f4", false, "(4611686018427387904, 8)", &[0; 4]);
        assert!(matches!(decode(&huge), Err(NpyError::BadHeader(_))));

        let scalar = raw_npy("<f4", false, "()", &[0; 4]);
        assert!(matches!(decode(&scalar), Err(NpyError::BadHeader(_))));
    }
}
