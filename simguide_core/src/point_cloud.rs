//! Point Cloud I/O - PCD v0.7 reader and writer.
//!
//! A cloud keeps the record layout it was read with: `x y z` become
//! `Vector3` points and every other field (intensity, rgb, ring, ...)
//! rides along as raw little-endian bytes per point. Reads `ascii` and
//! `binary` data sections; writes `binary` with the original
//! FIELDS/SIZE/TYPE/COUNT.

use crate::error::{CoreError, Result};
use nalgebra::Vector3;
use std::fs;
use std::path::Path;

const AXES: [&str; 3] = ["x", "y", "z"];

const DEFAULT_VIEWPOINT: &str = "0 0 0 1 0 0 0";

/// One declared PCD field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcdField {
    pub name: String,

    /// Bytes per element
    pub size: usize,

    /// `F`, `U` or `I`
    pub kind: char,

    /// Elements per point
    pub count: usize,
}

impl PcdField {
    pub fn new(name: impl Into<String>, size: usize, kind: char, count: usize) -> Self {
        Self {
            name: name.into(),
            size,
            kind,
            count,
        }
    }

    fn axis(&self) -> Option<usize> {
        AXES.iter().position(|a| *a == self.name)
    }

    fn bytes(&self) -> usize {
        self.size * self.count
    }
}

/// Ordered points plus the per-point attributes stored with them.
#[derive(Debug, Clone, PartialEq)]
pub struct PointCloud {
    /// Point positions, in file order
    pub points: Vec<Vector3<f64>>,

    /// Record layout, in file order (includes x, y and z)
    fields: Vec<PcdField>,

    /// Non-axis field bytes, `attribute_stride()` per point
    attributes: Vec<u8>,

    width: usize,
    height: usize,
    viewpoint: String,
}

impl Default for PointCloud {
    fn default() -> Self {
        Self::from_points(Vec::new())
    }
}

impl PointCloud {
    /// A bare `x y z` cloud, stored as `f32`.
    pub fn from_points(points: Vec<Vector3<f64>>) -> Self {
        Self {
            width: points.len(),
            height: 1,
            points,
            fields: AXES.iter().map(|axis| PcdField::new(*axis, 4, 'F', 1)).collect(),
            attributes: Vec::new(),
            viewpoint: DEFAULT_VIEWPOINT.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn fields(&self) -> &[PcdField] {
        &self.fields
    }

    /// Bytes of non-axis fields per point.
    pub fn attribute_stride(&self) -> usize {
        self.fields.iter().filter(|f| f.axis().is_none()).map(PcdField::bytes).sum()
    }

    /// First element of a field for every point.
    pub fn field_values(&self, name: &str) -> Option<Vec<f64>> {
        if let Some(axis) = AXES.iter().position(|a| *a == name) {
            return Some(self.points.iter().map(|p| p[axis]).collect());
        }

        let mut offset = 0;
        let mut target = None;
        for field in self.fields.iter().filter(|f| f.axis().is_none()) {
            if field.name == name {
                target = Some(field);
                break;
            }
            offset += field.bytes();
        }
        let field = target?;

        let stride = self.attribute_stride();
        self.attributes
            .chunks_exact(stride)
            .map(|record| decode_scalar(&record[offset..offset + field.size], field.kind))
            .collect()
    }
}

/// Reads and writes point clouds.
pub trait PointCloudStore {
    /// File extension of point-cloud artifacts (without the dot).
    fn extension(&self) -> &str;

    fn read(&self, path: &Path) -> Result<PointCloud>;

    /// Writes a cloud, creating parent directories.
    fn write(&self, cloud: &PointCloud, path: &Path) -> Result<()>;
}

fn valid_scalar(kind: char, size: usize) -> bool {
    matches!((kind, size), ('F', 4 | 8) | ('U' | 'I', 1 | 2 | 4 | 8))
}

fn decode_scalar(bytes: &[u8], kind: char) -> Option<f64> {
    Some(match (kind, bytes.len()) {
        ('F', 4) => f32::from_le_bytes(bytes.try_into().ok()?) as f64,
        ('F', 8) => f64::from_le_bytes(bytes.try_into().ok()?),
        ('U', 1) => bytes[0] as f64,
        ('U', 2) => u16::from_le_bytes(bytes.try_into().ok()?) as f64,
        ('U', 4) => u32::from_le_bytes(bytes.try_into().ok()?) as f64,
        ('U', 8) => u64::from_le_bytes(bytes.try_into().ok()?) as f64,
        ('I', 1) => bytes[0] as i8 as f64,
        ('I', 2) => i16::from_le_bytes(bytes.try_into().ok()?) as f64,
        ('I', 4) => i32::from_le_bytes(bytes.try_into().ok()?) as f64,
        ('I', 8) => i64::from_le_bytes(bytes.try_into().ok()?) as f64,
        _ => return None,
    })
}

/// Encodes one ascii token in the binary form of its field.
fn encode_scalar(token: &str, kind: char, size: usize) -> Option<Vec<u8>> {
    Some(match (kind, size) {
        ('F', 4) => token.parse::<f32>().ok()?.to_le_bytes().to_vec(),
        ('F', 8) => token.parse::<f64>().ok()?.to_le_bytes().to_vec(),
        ('U', 1) => token.parse::<u8>().ok()?.to_le_bytes().to_vec(),
        ('U', 2) => token.parse::<u16>().ok()?.to_le_bytes().to_vec(),
        ('U', 4) => token.parse::<u32>().ok()?.to_le_bytes().to_vec(),
        ('U', 8) => token.parse::<u64>().ok()?.to_le_bytes().to_vec(),
        ('I', 1) => token.parse::<i8>().ok()?.to_le_bytes().to_vec(),
        ('I', 2) => token.parse::<i16>().ok()?.to_le_bytes().to_vec(),
        ('I', 4) => token.parse::<i32>().ok()?.to_le_bytes().to_vec(),
        ('I', 8) => token.parse::<i64>().ok()?.to_le_bytes().to_vec(),
        _ => return None,
    })
}

/// Validated record layout.
#[derive(Debug, Clone)]
struct RecordLayout {
    fields: Vec<PcdField>,

    /// Byte offset of each field within a binary record
    byte_offsets: Vec<usize>,

    /// Token offset of each field within an ascii record
    token_offsets: Vec<usize>,

    record_size: usize,
    token_count: usize,

    /// Field index of x, y and z
    axes: [usize; 3],
}

impl RecordLayout {
    fn new(path: &Path, fields: Vec<PcdField>) -> Result<Self> {
        let mut byte_offsets = Vec::with_capacity(fields.len());
        let mut token_offsets = Vec::with_capacity(fields.len());
        let mut record_size = 0usize;
        let mut token_count = 0usize;
        let mut axes = [None; 3];

        for (i, field) in fields.iter().enumerate() {
            if field.count == 0 {
                return Err(CoreError::pcd(path, format!("field '{}' has COUNT 0", field.name)));
            }
            if !valid_scalar(field.kind, field.size) {
                return Err(CoreError::pcd(
                    path,
                    format!("unsupported type {}{} for '{}'", field.kind, field.size, field.name),
                ));
            }
            if let Some(axis) = field.axis() {
                if field.kind != 'F' || field.count != 1 {
                    return Err(CoreError::pcd(
                        path,
                        format!("'{}' must be a single float, got {}{} x{}", field.name, field.kind, field.size, field.count),
                    ));
                }
                axes[axis] = Some(i);
            }

            byte_offsets.push(record_size);
            token_offsets.push(token_count);
            record_size = field
                .size
                .checked_mul(field.count)
                .and_then(|bytes| record_size.checked_add(bytes))
                .ok_or_else(|| CoreError::pcd(path, "record size overflows"))?;
            token_count = token_count
                .checked_add(field.count)
                .ok_or_else(|| CoreError::pcd(path, "record size overflows"))?;
        }

        let mut resolved = [0usize; 3];
        for (slot, axis) in axes.iter().enumerate() {
            resolved[slot] = axis.ok_or_else(|| CoreError::pcd(path, format!("missing field '{}'", AXES[slot])))?;
        }

        Ok(Self {
            fields,
            byte_offsets,
            token_offsets,
            record_size,
            token_count,
            axes: resolved,
        })
    }

    fn attribute_stride(&self) -> usize {
        self.fields.iter().filter(|f| f.axis().is_none()).map(PcdField::bytes).sum()
    }
}

/// Parsed PCD header.
#[derive(Debug, Clone)]
struct PcdHeader {
    layout: RecordLayout,
    width: usize,
    height: usize,
    points: usize,
    viewpoint: String,
    data: String,
}

/// PCD file store.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcdStore;

impl PcdStore {
    /// Splits the file into header and data section.
    fn parse_header(path: &Path, bytes: &[u8]) -> Result<(PcdHeader, usize)> {
        let mut names: Vec<String> = Vec::new();
        let mut sizes: Vec<usize> = Vec::new();
        let mut kinds: Vec<char> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();
        let mut width = 0usize;
        let mut height = 1usize;
        let mut points: Option<usize> = None;
        let mut viewpoint = DEFAULT_VIEWPOINT.to_string();

        let mut cursor = 0;
        while cursor < bytes.len() {
            let end = bytes[cursor..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|p| cursor + p + 1)
                .unwrap_or(bytes.len());
            let line = String::from_utf8_lossy(&bytes[cursor..end]);
            let line = line.trim();
            cursor = end;

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let key = tokens.next().unwrap_or_default().to_ascii_uppercase();
            let values: Vec<&str> = tokens.collect();
            let parse_usize = |v: &str| {
                v.parse::<usize>()
                    .map_err(|_| CoreError::pcd(path, format!("bad {} value '{}'", key, v)))
            };

            match key.as_str() {
                "FIELDS" => names = values.iter().map(|s| s.to_string()).collect(),
                "SIZE" => sizes = values.iter().map(|&v| parse_usize(v)).collect::<Result<_>>()?,
                "TYPE" => kinds = values.iter().map(|v| v.chars().next().unwrap_or('?').to_ascii_uppercase()).collect(),
                "COUNT" => counts = values.iter().map(|&v| parse_usize(v)).collect::<Result<_>>()?,
                "WIDTH" => width = parse_usize(values.first().copied().unwrap_or(""))?,
                "HEIGHT" => height = parse_usize(values.first().copied().unwrap_or(""))?,
                "POINTS" => points = Some(parse_usize(values.first().copied().unwrap_or(""))?),
                "VIEWPOINT" => viewpoint = values.join(" "),
                "DATA" => {
                    let data = values.first().copied().unwrap_or("").to_ascii_lowercase();
                    if counts.is_empty() {
                        counts = vec![1; names.len()];
                    }
                    if sizes.len() != names.len() || kinds.len() != names.len() || counts.len() != names.len() {
                        return Err(CoreError::pcd(path, "FIELDS/SIZE/TYPE/COUNT length mismatch"));
                    }

                    let fields = names
                        .iter()
                        .enumerate()
                        .map(|(i, name)| PcdField::new(name.clone(), sizes[i], kinds[i], counts[i]))
                        .collect();
                    let points = match points {
                        Some(points) => points,
                        None => width
                            .checked_mul(height)
                            .ok_or_else(|| CoreError::pcd(path, "WIDTH x HEIGHT overflows"))?,
                    };

                    let header = PcdHeader {
                        layout: RecordLayout::new(path, fields)?,
                        width,
                        height,
                        points,
                        viewpoint,
                        data,
                    };
                    return Ok((header, cursor));
                }
                // VERSION
                _ => {}
            }
        }

        Err(CoreError::pcd(path, "missing DATA line"))
    }

    fn read_binary(path: &Path, header: &PcdHeader, body: &[u8]) -> Result<(Vec<Vector3<f64>>, Vec<u8>)> {
        let layout = &header.layout;
        let step = layout.record_size;
        let expected = step
            .checked_mul(header.points)
            .ok_or_else(|| CoreError::pcd(path, format!("{} points of {} bytes overflow", header.points, step)))?;
        if body.len() < expected {
            return Err(CoreError::pcd(
                path,
                format!("data section holds {} bytes, expected {}", body.len(), expected),
            ));
        }

        let axis_slots = layout.axes.map(|i| (layout.byte_offsets[i], layout.fields[i].size));
        if axis_slots.iter().any(|&(offset, size)| offset + size > step) {
            return Err(CoreError::pcd(path, "axis field lies outside the record"));
        }
        let extras: Vec<(usize, usize)> = layout
            .fields
            .iter()
            .zip(&layout.byte_offsets)
            .filter(|(field, _)| field.axis().is_none())
            .map(|(field, &offset)| (offset, field.bytes()))
            .collect();

        let mut points = Vec::with_capacity(header.points);
        let mut attributes = Vec::with_capacity(layout.attribute_stride() * header.points);

        for record in body[..expected].chunks_exact(step) {
            let mut coords = [0.0f64; 3];
            for (slot, &(offset, size)) in axis_slots.iter().enumerate() {
                coords[slot] = decode_scalar(&record[offset..offset + size], 'F')
                    .ok_or_else(|| CoreError::pcd(path, format!("unreadable '{}'", AXES[slot])))?;
            }
            points.push(Vector3::new(coords[0], coords[1], coords[2]));

            for &(offset, len) in &extras {
                attributes.extend_from_slice(&record[offset..offset + len]);
            }
        }

        Ok((points, attributes))
    }

    fn read_ascii(path: &Path, header: &PcdHeader, body: &[u8]) -> Result<(Vec<Vector3<f64>>, Vec<u8>)> {
        let layout = &header.layout;
        let text = String::from_utf8_lossy(body);
        let mut points = Vec::with_capacity(header.points.min(body.len()));
        let mut attributes = Vec::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if points.len() == header.points {
                break;
            }

            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < layout.token_count {
                return Err(CoreError::pcd(path, format!("short record '{}'", line)));
            }

            let mut coords = [0.0f64; 3];
            for (slot, &field) in layout.axes.iter().enumerate() {
                let token = tokens[layout.token_offsets[field]];
                coords[slot] = token
                    .parse()
                    .map_err(|_| CoreError::pcd(path, format!("bad number '{}'", token)))?;
            }
            points.push(Vector3::new(coords[0], coords[1], coords[2]));

            for (field, &start) in layout.fields.iter().zip(&layout.token_offsets) {
                if field.axis().is_some() {
                    continue;
                }
                for token in &tokens[start..start + field.count] {
                    let bytes = encode_scalar(token, field.kind, field.size).ok_or_else(|| {
                        CoreError::pcd(path, format!("bad {} value '{}'", field.name, token))
                    })?;
                    attributes.extend_from_slice(&bytes);
                }
            }
        }

        Ok((points, attributes))
    }
}

impl PointCloudStore for PcdStore {
    fn extension(&self) -> &str {
        "pcd"
    }

    fn read(&self, path: &Path) -> Result<PointCloud> {
        let bytes = fs::read(path).map_err(|e| CoreError::io(path, e))?;
        let (header, data_start) = Self::parse_header(path, &bytes)?;
        let body = &bytes[data_start..];

        let (points, attributes) = match header.data.as_str() {
            "ascii" => Self::read_ascii(path, &header, body)?,
            "binary" => Self::read_binary(path, &header, body)?,
            other => return Err(CoreError::pcd(path, format!("unsupported DATA '{}'", other))),
        };

        Ok(PointCloud {
            points,
            fields: header.layout.fields,
            attributes,
            width: header.width,
            height: header.height,
            viewpoint: header.viewpoint,
        })
    }

    fn write(&self, cloud: &PointCloud, path: &Path) -> Result<()> {
        let n = cloud.points.len();
        let stride = cloud.attribute_stride();
        if cloud.attributes.len() != stride * n {
            return Err(CoreError::pcd(
                path,
                format!("{} attribute bytes for {} points of stride {}", cloud.attributes.len(), n, stride),
            ));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }

        // An organized cloud keeps its shape only while the point count fits it
        let (width, height) = if cloud.width.checked_mul(cloud.height) == Some(n) {
            (cloud.width, cloud.height)
        } else {
            (n, 1)
        };
        let column = |f: fn(&PcdField) -> String| cloud.fields.iter().map(f).collect::<Vec<_>>().join(" ");

        let header = format!(
            "# .PCD v0.7 - Point Cloud Data file format\n\
             VERSION 0.7\n\
             FIELDS {fields}\n\
             SIZE {sizes}\n\
             TYPE {kinds}\n\
             COUNT {counts}\n\
             WIDTH {width}\n\
             HEIGHT {height}\n\
             VIEWPOINT {viewpoint}\n\
             POINTS {n}\n\
             DATA binary\n",
            fields = column(|f| f.name.clone()),
            sizes = column(|f| f.size.to_string()),
            kinds = column(|f| f.kind.to_string()),
            counts = column(|f| f.count.to_string()),
            viewpoint = cloud.viewpoint,
        );

        let record_size: usize = cloud.fields.iter().map(PcdField::bytes).sum();
        let mut out = Vec::with_capacity(header.len() + n * record_size);
        out.extend_from_slice(header.as_bytes());

        for (i, p) in cloud.points.iter().enumerate() {
            let attributes = &cloud.attributes[i * stride..(i + 1) * stride];
            let mut cursor = 0;
            for field in &cloud.fields {
                match field.axis() {
                    Some(axis) if field.size == 8 => out.extend_from_slice(&p[axis].to_le_bytes()),
                    Some(axis) => out.extend_from_slice(&(p[axis] as f32).to_le_bytes()),
                    None => {
                        let len = field.bytes();
                        out.extend_from_slice(&attributes[cursor..cursor + len]);
                        cursor += len;
                    }
                }
            }
        }

        fs::write(path, out).map_err(|e| CoreError::io(path, e))
    }
}
