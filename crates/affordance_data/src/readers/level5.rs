//! src/readers/level5.rs
//!
//! Minimal reader for `int32`-class arrays in uncompressed level-5 MAT-files.
//!
//! `matfile` handles every other numeric class. For `mxINT32_CLASS` it
//! expects the wrong element type and fails to parse the whole file, so
//! label masks saved as `int32` (MATLAB `int32(...)`, `scipy.io.savemat` of
//! an `np.int32` array) are read here instead.
//!
//! ```text
//! header (128 bytes, "IM" / "MI" endian marker at 126)
//! miMATRIX element
//!   ├── array flags   miUINT32   class in the low byte, complex bit 0x0800
//!   ├── dimensions    miINT32
//!   ├── array name    miINT8
//!   └── real part     miINT8 .. miUINT32 (MATLAB may narrow the storage type)
//! ```

const HEADER_LEN: usize = 128;

const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT16: u32 = 3;
const MI_UINT16: u32 = 4;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_MATRIX: u32 = 14;

const MX_INT32_CLASS: u32 = 12;
const COMPLEX_FLAG: u32 = 0x0800;

/// A 2-D array as stored on disk (column-major).
#[derive(Debug, PartialEq)]
pub(crate) struct Int32Array {
    pub height: usize,
    pub width: usize,
    pub values: Vec<i64>,
}

#[derive(Clone, Copy)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u32(self, bytes: &[u8]) -> Option<u32> {
        let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(match self {
            Self::Little => u32::from_le_bytes(raw),
            Self::Big => u32::from_be_bytes(raw),
        })
    }

    fn u16(self, bytes: &[u8]) -> Option<u16> {
        let raw: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
        Some(match self {
            Self::Little => u16::from_le_bytes(raw),
            Self::Big => u16::from_be_bytes(raw),
        })
    }
}

/// One data element: its type, payload and the offset just past it.
struct Element<'a> {
    data_type: u32,
    data: &'a [u8],
    next: usize,
}

fn padded(len: usize) -> usize {
    len.div_ceil(8) * 8
}

fn read_element(bytes: &[u8], offset: usize, endian: Endian) -> Result<Element<'_>, String> {
    let truncated = || format!("truncated MAT element at byte {offset}");
    let tag = bytes.get(offset..offset + 8).ok_or_else(truncated)?;
    let first = endian.u32(tag).ok_or_else(truncated)?;

    // Small element: type and size share the first word, data fits in the tag.
    if first >> 16 != 0 {
        let size = (first >> 16) as usize;
        if size > 4 {
            return Err(format!("small MAT element at byte {offset} claims {size} bytes"));
        }
        return Ok(Element {
            data_type: first & 0xFFFF,
            data: &tag[4..4 + size],
            next: offset + 8,
        });
    }

    let size = endian.u32(&tag[4..]).ok_or_else(truncated)? as usize;
    let start = offset + 8;
    let data = bytes.get(start..start + size).ok_or_else(truncated)?;
    Ok(Element {
        data_type: first,
        data,
        next: start + padded(size),
    })
}

fn widen(data_type: u32, data: &[u8], endian: Endian) -> Result<Vec<i64>, String> {
    let values = match data_type {
        MI_INT8 => data.iter().map(|&b| b as i8 as i64).collect(),
        MI_UINT8 => data.iter().map(|&b| b as i64).collect(),
        MI_INT16 | MI_UINT16 => data
            .chunks_exact(2)
            .filter_map(|c| endian.u16(c))
            .map(|v| match data_type {
                MI_INT16 => v as i16 as i64,
                _ => v as i64,
            })
            .collect(),
        MI_INT32 | MI_UINT32 => data
            .chunks_exact(4)
            .filter_map(|c| endian.u32(c))
            .map(|v| match data_type {
                MI_INT32 => v as i32 as i64,
                _ => v as i64,
            })
            .collect(),
        other => return Err(format!("int32 array stored with unsupported element type {other}")),
    };
    Ok(values)
}

/// Searches the top-level arrays of a MAT-file for an `int32`-class array
/// named `key`. Returns `Ok(None)` when the file holds no such array.
pub(crate) fn find_int32_array(bytes: &[u8], key: &str) -> Result<Option<Int32Array>, String> {
    let marker = bytes
        .get(HEADER_LEN - 2..HEADER_LEN)
        .ok_or("file is shorter than a MAT-file header")?;
    let endian = match marker {
        b"IM" => Endian::Little,
        b"MI" => Endian::Big,
        _ => return Err("missing MAT-file endian marker".to_string()),
    };

    let mut offset = HEADER_LEN;
    while offset < bytes.len() {
        let element = read_element(bytes, offset, endian)?;
        offset = element.next;
        if element.data_type != MI_MATRIX {
            // Compressed and other top-level elements are not searched.
            continue;
        }

        let matrix = element.data;
        let flags = read_element(matrix, 0, endian)?;
        let class_word = endian.u32(flags.data).ok_or("truncated array flags")?;
        if class_word & 0xFF != MX_INT32_CLASS {
            continue;
        }
        let dims = read_element(matrix, flags.next, endian)?;
        let name = read_element(matrix, dims.next, endian)?;
        if name.data != key.as_bytes() {
            continue;
        }

        if class_word & COMPLEX_FLAG != 0 {
            return Err(format!("`{key}` must be a real numeric array"));
        }
        let shape: Vec<usize> = dims
            .data
            .chunks_exact(4)
            .filter_map(|c| endian.u32(c))
            .map(|d| d as usize)
            .collect();
        let (height, width) = match shape.as_slice() {
            &[height, width] => (height, width),
            other => return Err(format!("`{key}` must be 2-D, got shape {other:?}")),
        };
        let real = read_element(matrix, name.next, endian)?;
        let values = widen(real.data_type, real.data, endian)?;
        return Ok(Some(Int32Array {
            height,
            width,
            values,
        }));
    }
    Ok(None)
}
