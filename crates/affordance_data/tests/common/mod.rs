#![allow(dead_code)]

use affordance_data::readers::ManifestEntry;
use anyhow::Result;
use image::{Rgb, RgbImage};
use safetensors::tensor::{Dtype, TensorView};
use std::fs;
use std::path::{Path, PathBuf};

/// Writes a `width` x `height` PNG filled with `pixel`.
pub fn write_png(path: &Path, height: u32, width: u32, pixel: [u8; 3]) -> Result<()> {
    RgbImage::from_pixel(width, height, Rgb(pixel)).save(path)?;
    Ok(())
}

/// Writes row-major `u8` labels to a safetensors file under `key`.
pub fn write_safetensors_mask(
    path: &Path,
    key: &str,
    height: usize,
    width: usize,
    labels: &[u8],
) -> Result<()> {
    let view = TensorView::new(Dtype::U8, vec![height, width], labels)?;
    fs::write(path, safetensors::serialize([(key, view)], &None)?)?;
    Ok(())
}

/// Label array element types understood by [`write_mat_mask`].
pub enum MatLabels<'a> {
    UInt8(&'a [u8]),
    Int32(&'a [i32]),
    Double(&'a [f64]),
}

// Level-5 MAT-file data types and array classes.
const MI_INT8: u32 = 1;
const MI_UINT8: u32 = 2;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;
const MX_DOUBLE_CLASS: u32 = 6;
const MX_UINT8_CLASS: u32 = 9;
const MX_INT32_CLASS: u32 = 12;

fn push_element(out: &mut Vec<u8>, data_type: u32, data: &[u8]) {
    out.extend_from_slice(&data_type.to_le_bytes());
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    let padding = (8 - data.len() % 8) % 8;
    out.extend(std::iter::repeat(0u8).take(padding));
}

/// Writes a little-endian level-5 MAT-file holding one 2-D array named
/// `key`. `labels` are row-major and are stored column-major, as MATLAB
/// and scipy do.
pub fn write_mat_mask(
    path: &Path,
    key: &str,
    height: usize,
    width: usize,
    labels: MatLabels<'_>,
) -> Result<()> {
    let order = (0..width).flat_map(|x| (0..height).map(move |y| y * width + x));
    let (class, data_type, data): (u32, u32, Vec<u8>) = match labels {
        MatLabels::UInt8(values) => (MX_UINT8_CLASS, MI_UINT8, order.map(|i| values[i]).collect()),
        MatLabels::Int32(values) => (
            MX_INT32_CLASS,
            MI_INT32,
            order.flat_map(|i| values[i].to_le_bytes()).collect(),
        ),
        MatLabels::Double(values) => (
            MX_DOUBLE_CLASS,
            MI_DOUBLE,
            order.flat_map(|i| values[i].to_le_bytes()).collect(),
        ),
    };

    let mut matrix = Vec::new();
    let flags: Vec<u8> = [class, 0u32].iter().flat_map(|v| v.to_le_bytes()).collect();
    push_element(&mut matrix, MI_UINT32, &flags);
    let dims: Vec<u8> = [height as i32, width as i32]
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    push_element(&mut matrix, MI_INT32, &dims);
    push_element(&mut matrix, MI_INT8, key.as_bytes());
    push_element(&mut matrix, data_type, &data);

    let mut header = b"MATLAB 5.0 MAT-file, written by affordance_data tests".to_vec();
    header.resize(116, b' ');
    header.extend_from_slice(&[0u8; 8]);
    header.extend_from_slice(&0x0100u16.to_le_bytes());
    header.extend_from_slice(b"IM");

    let mut bytes = header;
    push_element(&mut bytes, MI_MATRIX, &matrix);
    fs::write(path, bytes)?;
    Ok(())
}

/// Writes a manifest CSV with a header row.
pub fn write_manifest(path: &Path, rows: &[(PathBuf, PathBuf)]) -> Result<()> {
    let mut text = String::from("image_path,mask_path\n");
    for (image, mask) in rows {
        text.push_str(&format!("{},{}\n", image.display(), mask.display()));
    }
    fs::write(path, text)?;
    Ok(())
}

/// Writes a uniform image / uniform label pair and returns its manifest row.
pub fn write_uniform_pair(
    dir: &Path,
    name: &str,
    (height, width): (u32, u32),
    pixel: u8,
    label: u8,
) -> Result<ManifestEntry> {
    let image_path = dir.join(format!("{name}.png"));
    write_png(&image_path, height, width, [pixel; 3])?;
    let mask_path = dir.join(format!("{name}_label.safetensors"));
    let labels = vec![label; (height * width) as usize];
    write_safetensors_mask(&mask_path, "gt_label", height as usize, width as usize, &labels)?;
    Ok(ManifestEntry {
        image_path,
        mask_path,
    })
}
