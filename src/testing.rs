//! Synthetic DICOM series for unit tests.

use dicom::core::{dicom_value, DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::tags;
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

static INSTANCE_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn decimal_strings(values: &[f64]) -> PrimitiveValue {
    PrimitiveValue::Strs(values.iter().map(|v| format!("{v}")).collect())
}

pub struct SliceBuilder {
    series_instance_uid: String,
    rows: u16,
    columns: u16,
    spacing: Option<(f64, f64)>,
    position: Option<[f64; 3]>,
    orientation: Option<[f64; 6]>,
    instance_number: Option<i32>,
    slice_thickness: Option<f64>,
    rescale: Option<(f64, f64)>,
    pixels: Option<Vec<u16>>,
    frames: u32,
    samples: u16,
    pixel_data: bool,
}

impl SliceBuilder {
    pub fn new(series_instance_uid: &str, rows: u16, columns: u16) -> Self {
        Self {
            series_instance_uid: series_instance_uid.to_string(),
            rows,
            columns,
            spacing: Some((1.0, 1.0)),
            position: Some([0.0, 0.0, 0.0]),
            orientation: Some([1.0, 0.0, 0.0, 0.0, 1.0, 0.0]),
            instance_number: None,
            slice_thickness: None,
            rescale: None,
            pixels: None,
            frames: 1,
            samples: 1,
            pixel_data: true,
        }
    }

    /// Drop all geometry attributes.
    pub fn bare(self) -> Self {
        Self {
            spacing: None,
            position: None,
            orientation: None,
            ..self
        }
    }

    pub fn spacing(self, row: f64, column: f64) -> Self {
        Self {
            spacing: Some((row, column)),
            ..self
        }
    }

    pub fn position(self, position: [f64; 3]) -> Self {
        Self {
            position: Some(position),
            ..self
        }
    }

    pub fn orientation(self, orientation: [f64; 6]) -> Self {
        Self {
            orientation: Some(orientation),
            ..self
        }
    }

    pub fn instance_number(self, number: i32) -> Self {
        Self {
            instance_number: Some(number),
            ..self
        }
    }

    pub fn slice_thickness(self, thickness: f64) -> Self {
        Self {
            slice_thickness: Some(thickness),
            ..self
        }
    }

    pub fn rescale(self, slope: f64, intercept: f64) -> Self {
        Self {
            rescale: Some((slope, intercept)),
            ..self
        }
    }

    /// Stored pixel values in row-major order.
    pub fn pixels(self, pixels: Vec<u16>) -> Self {
        assert_eq!(pixels.len(), self.rows as usize * self.columns as usize);
        Self {
            pixels: Some(pixels),
            ..self
        }
    }

    pub fn frames(self, frames: u32) -> Self {
        Self { frames, ..self }
    }

    /// Interleaved RGB samples.
    pub fn rgb(self) -> Self {
        Self { samples: 3, ..self }
    }

    /// Header only, as left behind by an interrupted transfer.
    pub fn without_pixel_data(self) -> Self {
        Self {
            pixel_data: false,
            ..self
        }
    }

    pub fn build(self) -> FileDicomObject<InMemDicomObject> {
        let instance = INSTANCE_COUNTER.fetch_add(1, Ordering::SeqCst);
        let sop_instance_uid = format!("{}.{}", self.series_instance_uid, instance);

        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            dicom_value!(Str, CT_IMAGE_STORAGE),
        ));
        obj.put(DataElement::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            dicom_value!(Str, sop_instance_uid.as_str()),
        ));
        obj.put(DataElement::new(tags::MODALITY, VR::CS, dicom_value!(Str, "CT")));
        obj.put(DataElement::new(
            tags::SERIES_INSTANCE_UID,
            VR::UI,
            dicom_value!(Str, self.series_instance_uid.as_str()),
        ));
        obj.put(DataElement::new(tags::ROWS, VR::US, dicom_value!(U16, [self.rows])));
        obj.put(DataElement::new(
            tags::COLUMNS,
            VR::US,
            dicom_value!(U16, [self.columns]),
        ));
        obj.put(DataElement::new(
            tags::SAMPLES_PER_PIXEL,
            VR::US,
            dicom_value!(U16, [self.samples]),
        ));
        let photometric = if self.samples == 3 { "RGB" } else { "MONOCHROME2" };
        obj.put(DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            dicom_value!(Str, photometric),
        ));
        if self.samples > 1 {
            obj.put(DataElement::new(
                tags::PLANAR_CONFIGURATION,
                VR::US,
                dicom_value!(U16, [0]),
            ));
        }
        if self.frames > 1 {
            obj.put(DataElement::new(
                tags::NUMBER_OF_FRAMES,
                VR::IS,
                dicom_value!(Str, self.frames.to_string()),
            ));
        }
        obj.put(DataElement::new(
            tags::BITS_ALLOCATED,
            VR::US,
            dicom_value!(U16, [16]),
        ));
        obj.put(DataElement::new(tags::BITS_STORED, VR::US, dicom_value!(U16, [16])));
        obj.put(DataElement::new(tags::HIGH_BIT, VR::US, dicom_value!(U16, [15])));
        obj.put(DataElement::new(
            tags::PIXEL_REPRESENTATION,
            VR::US,
            dicom_value!(U16, [0]),
        ));
        if let Some((row, column)) = self.spacing {
            obj.put(DataElement::new(
                tags::PIXEL_SPACING,
                VR::DS,
                decimal_strings(&[row, column]),
            ));
        }
        if let Some(position) = self.position {
            obj.put(DataElement::new(
                tags::IMAGE_POSITION_PATIENT,
                VR::DS,
                decimal_strings(&position),
            ));
        }
        if let Some(orientation) = self.orientation {
            obj.put(DataElement::new(
                tags::IMAGE_ORIENTATION_PATIENT,
                VR::DS,
                decimal_strings(&orientation),
            ));
        }
        if let Some(number) = self.instance_number {
            obj.put(DataElement::new(
                tags::INSTANCE_NUMBER,
                VR::IS,
                dicom_value!(Str, number.to_string()),
            ));
        }
        if let Some(thickness) = self.slice_thickness {
            obj.put(DataElement::new(
                tags::SLICE_THICKNESS,
                VR::DS,
                decimal_strings(&[thickness]),
            ));
        }
        if let Some((slope, intercept)) = self.rescale {
            obj.put(DataElement::new(
                tags::RESCALE_SLOPE,
                VR::DS,
                decimal_strings(&[slope]),
            ));
            obj.put(DataElement::new(
                tags::RESCALE_INTERCEPT,
                VR::DS,
                decimal_strings(&[intercept]),
            ));
        }
        if self.pixel_data {
            let values = self.rows as usize
                * self.columns as usize
                * self.frames as usize
                * self.samples as usize;
            let pixels = match self.pixels {
                Some(pixels) if pixels.len() == values => pixels,
                // Repeat the single-frame values over every frame and sample
                Some(pixels) => pixels.iter().cycle().take(values).copied().collect(),
                None => vec![0; values],
            };
            obj.put(DataElement::new(
                tags::PIXEL_DATA,
                VR::OW,
                PrimitiveValue::U16(pixels.into()),
            ));
        }

        obj.with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(sop_instance_uid),
        )
        .unwrap()
    }

    pub fn write<P: AsRef<Path>>(self, path: P) -> PathBuf {
        let path = path.as_ref().to_path_buf();
        self.build().write_to_file(&path).unwrap();
        path
    }
}

/// Writes an axial series of `num_slices` slices, `z_spacing` mm apart starting at
/// `origin`. Pixel values come from `value(x, y, z)` as stored values.
pub fn write_series<F>(
    dir: &Path,
    series_instance_uid: &str,
    size: (u16, u16, usize),
    spacing: (f64, f64, f64),
    origin: [f64; 3],
    value: F,
) -> Vec<PathBuf>
where
    F: Fn(usize, usize, usize) -> u16,
{
    std::fs::create_dir_all(dir).unwrap();
    let (columns, rows, num_slices) = size;
    let (dx, dy, dz) = spacing;
    (0..num_slices)
        .map(|z| {
            let pixels = (0..rows as usize)
                .flat_map(|y| (0..columns as usize).map(move |x| (x, y)))
                .map(|(x, y)| value(x, y, z))
                .collect();
            // Reverse instance numbers so position sorting is actually exercised
            SliceBuilder::new(series_instance_uid, rows, columns)
                .spacing(dy, dx)
                .position([origin[0], origin[1], origin[2] + z as f64 * dz])
                .instance_number((num_slices - z) as i32)
                .pixels(pixels)
                .write(dir.join(format!("{series_instance_uid}_{z:03}.dcm")))
        })
        .collect()
}
