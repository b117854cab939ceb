use dicom::pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder};
use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::Array3;
use nifti::NiftiType;
use rayon::prelude::*;
use snafu::ResultExt;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::dicom::{PixelDataSnafu, ReadSnafu, UnsupportedPixelLayoutSnafu};
use crate::errors::DicomError;
use crate::file::DicomFileOperations;
use crate::metadata::SliceMetadata;
use crate::series::SeriesInfo;

/// Physical layout of a voxel grid in patient (LPS) coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// Number of voxels along (x, y, z)
    pub size: [usize; 3],
    /// Voxel spacing along (x, y, z) in mm
    pub spacing: [f64; 3],
    /// Physical position of the centre of voxel (0, 0, 0)
    pub origin: [f64; 3],
    /// Columns are the unit directions of the x, y and z index axes
    pub direction: Matrix3<f64>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            size: [0, 0, 0],
            spacing: [1.0, 1.0, 1.0],
            origin: [0.0, 0.0, 0.0],
            direction: Matrix3::identity(),
        }
    }
}

impl Geometry {
    pub fn new(size: [usize; 3], spacing: [f64; 3], origin: [f64; 3]) -> Self {
        Self {
            size,
            spacing,
            origin,
            direction: Matrix3::identity(),
        }
    }

    pub fn with_direction(self, direction: Matrix3<f64>) -> Self {
        Self { direction, ..self }
    }

    pub fn numel(&self) -> usize {
        self.size.iter().product()
    }

    /// Array shape in `[z, y, x]` order.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.size[2], self.size[1], self.size[0])
    }

    /// Maps continuous index coordinates to physical space.
    pub fn index_to_physical(&self, index: [f64; 3]) -> Point3<f64> {
        let scaled = Vector3::new(
            index[0] * self.spacing[0],
            index[1] * self.spacing[1],
            index[2] * self.spacing[2],
        );
        Point3::from(Vector3::from(self.origin) + self.direction * scaled)
    }

    /// Inverse of [`Geometry::index_to_physical`]. Returns `None` for a degenerate direction matrix.
    pub fn physical_to_index(&self, point: &Point3<f64>) -> Option<[f64; 3]> {
        let inverse = self.direction.try_inverse()?;
        let local = inverse * (point.coords - Vector3::from(self.origin));
        Some([
            local.x / self.spacing[0],
            local.y / self.spacing[1],
            local.z / self.spacing[2],
        ])
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.direction;
        writeln!(f, "Size: \t\t{:?}", self.size)?;
        writeln!(f, "Spacing: \t{:?}", self.spacing)?;
        writeln!(f, "Origin: \t{:?}", self.origin)?;
        write!(
            f,
            "Direction: \t[{}, {}, {}, {}, {}, {}, {}, {}, {}]",
            d[(0, 0)],
            d[(0, 1)],
            d[(0, 2)],
            d[(1, 0)],
            d[(1, 1)],
            d[(1, 2)],
            d[(2, 0)],
            d[(2, 1)],
            d[(2, 2)]
        )
    }
}

/// Voxel type of a volume on disk. Voxels are always `f32` in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PixelType {
    Uint8,
    Int8,
    Uint16,
    Int16,
    Uint32,
    Int32,
    Uint64,
    Int64,
    #[default]
    Float32,
    Float64,
}

impl PixelType {
    /// `None` for NIfTI types that are not scalar or not representable here.
    pub fn from_nifti(datatype: NiftiType) -> Option<Self> {
        match datatype {
            NiftiType::Uint8 => Some(PixelType::Uint8),
            NiftiType::Int8 => Some(PixelType::Int8),
            NiftiType::Uint16 => Some(PixelType::Uint16),
            NiftiType::Int16 => Some(PixelType::Int16),
            NiftiType::Uint32 => Some(PixelType::Uint32),
            NiftiType::Int32 => Some(PixelType::Int32),
            NiftiType::Uint64 => Some(PixelType::Uint64),
            NiftiType::Int64 => Some(PixelType::Int64),
            NiftiType::Float32 => Some(PixelType::Float32),
            NiftiType::Float64 => Some(PixelType::Float64),
            _ => None,
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelType::Uint8 => "8-bit unsigned integer",
            PixelType::Int8 => "8-bit signed integer",
            PixelType::Uint16 => "16-bit unsigned integer",
            PixelType::Int16 => "16-bit signed integer",
            PixelType::Uint32 => "32-bit unsigned integer",
            PixelType::Int32 => "32-bit signed integer",
            PixelType::Uint64 => "64-bit unsigned integer",
            PixelType::Int64 => "64-bit signed integer",
            PixelType::Float32 => "32-bit float",
            PixelType::Float64 => "64-bit float",
        };
        write!(f, "{}", name)
    }
}

/// A scalar volume with voxels stored as `data[[z, y, x]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    pub data: Array3<f32>,
    pub geometry: Geometry,
    /// Type the voxels are read from or written as
    pub pixel_type: PixelType,
}

impl Volume {
    pub fn new(data: Array3<f32>, geometry: Geometry) -> Self {
        debug_assert_eq!(data.dim(), geometry.shape());
        Self {
            data,
            geometry,
            pixel_type: PixelType::default(),
        }
    }

    /// A volume of the given geometry filled with a constant.
    pub fn filled(geometry: Geometry, value: f32) -> Self {
        Self {
            data: Array3::from_elem(geometry.shape(), value),
            geometry,
            pixel_type: PixelType::default(),
        }
    }

    pub fn with_pixel_type(self, pixel_type: PixelType) -> Self {
        Self { pixel_type, ..self }
    }

    /// Value range as `(min, max)`, or `None` for an empty volume.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data.iter().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Load a DICOM series into a volume, ordering slices along the slice normal.
    pub fn load_series(series: &SeriesInfo) -> Result<Self, DicomError> {
        let headers = series
            .files
            .par_iter()
            .map(|path| Ok((path.clone(), crate::series::read_header(path)?)))
            .collect::<Result<Vec<_>, DicomError>>()?;
        let first = headers
            .first()
            .ok_or(DicomError::MissingPropertyError {
                name: "Pixel Data",
            })?
            .1
            .clone();

        let normal = first.normal();
        let (row_dir, col_dir) = first
            .orientation
            .unwrap_or((Vector3::x(), Vector3::y()));
        let slices = sort_slices(headers, &normal);

        let (rows, columns) = (first.rows, first.columns);
        for (path, header) in slices.iter() {
            if header.rows != rows || header.columns != columns {
                return Err(DicomError::InconsistentSlices {
                    path: path.clone(),
                    rows: header.rows,
                    columns: header.columns,
                    expected_rows: rows,
                    expected_columns: columns,
                });
            }
        }

        let (dy, dx) = slices[0].1.pixel_spacing.unwrap_or((1.0, 1.0));
        let dz = slice_spacing(&slices, &normal);
        let origin = slices[0]
            .1
            .position
            .map(|p| [p.x, p.y, p.z])
            .unwrap_or([0.0, 0.0, 0.0]);

        let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::Default);
        let frames = slices
            .par_iter()
            .map(|(path, _)| decode_slice(path, &options))
            .collect::<Result<Vec<_>, DicomError>>()?;

        let num_slices = frames.len();
        let mut data = Vec::with_capacity(num_slices * rows * columns);
        for (frame, (path, _)) in frames.into_iter().zip(slices.iter()) {
            if frame.len() != rows * columns {
                return Err(DicomError::InvalidValueError {
                    name: "Pixel Data",
                    value: format!(
                        "{} values in {}, expected {}",
                        frame.len(),
                        path.display(),
                        rows * columns
                    ),
                });
            }
            data.extend(frame);
        }
        let data = Array3::from_shape_vec((num_slices, rows, columns), data).map_err(|e| {
            DicomError::Other {
                message: e.to_string(),
            }
        })?;

        let direction = Matrix3::from_columns(&[row_dir, col_dir, normal]);
        let geometry = Geometry::new([columns, rows, num_slices], [dx, dy, dz], origin)
            .with_direction(direction);
        tracing::debug!(
            "Loaded series {} with {} slices\n{}",
            series.series_instance_uid,
            num_slices,
            geometry
        );
        Ok(Volume::new(data, geometry))
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.geometry)?;
        write!(f, "PixelType: \t{}", self.pixel_type)
    }
}

/// Orders slices by position along the normal, falling back to Instance Number
/// when any slice lacks a position.
fn sort_slices(
    mut headers: Vec<(PathBuf, SliceMetadata)>,
    normal: &Vector3<f64>,
) -> Vec<(PathBuf, SliceMetadata)> {
    if headers.iter().all(|(_, h)| h.position.is_some()) {
        headers.sort_by(|(_, a), (_, b)| {
            a.location(normal)
                .partial_cmp(&b.location(normal))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    } else {
        headers.sort_by_key(|(path, h)| (h.instance_number.unwrap_or(i32::MAX), path.clone()));
    }
    headers
}

/// Mean distance between consecutive slices along the normal, falling back to
/// Spacing Between Slices, then Slice Thickness, then 1 mm.
fn slice_spacing(slices: &[(PathBuf, SliceMetadata)], normal: &Vector3<f64>) -> f64 {
    let locations = slices
        .iter()
        .filter_map(|(_, h)| h.location(normal))
        .collect::<Vec<_>>();
    if locations.len() == slices.len() && locations.len() > 1 {
        let span = locations[locations.len() - 1] - locations[0];
        let spacing = span / (locations.len() - 1) as f64;
        if spacing > 0.0 {
            return spacing;
        }
    }
    let first = &slices[0].1;
    first
        .spacing_between_slices
        .or(first.slice_thickness)
        .filter(|s| *s > 0.0)
        .unwrap_or(1.0)
}

fn decode_slice(path: &Path, options: &ConvertOptions) -> Result<Vec<f32>, DicomError> {
    let file = path.dcmread().context(ReadSnafu { path })?;
    let decoded = file.decode_pixel_data().context(PixelDataSnafu)?;
    // Enhanced multi-frame objects carry per-frame positions that are not read here
    let (frames, samples) = (decoded.number_of_frames(), decoded.samples_per_pixel());
    if frames != 1 || samples != 1 {
        return UnsupportedPixelLayoutSnafu {
            path,
            frames,
            samples,
        }
        .fail();
    }
    decoded
        .to_vec_with_options::<f32>(options)
        .context(PixelDataSnafu)
}
