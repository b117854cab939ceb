use dicom::dictionary_std::tags;
use dicom::object::{FileDicomObject, InMemDicomObject};
use dicom::core::Tag;
use nalgebra::{Point3, Vector3};
use snafu::ResultExt;

use crate::errors::dicom::ConvertValueSnafu;
use crate::errors::DicomError;

/// Geometry-relevant attributes of a single DICOM slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceMetadata {
    pub series_instance_uid: String,
    pub rows: usize,
    pub columns: usize,
    /// (row spacing, column spacing) in mm, i.e. (y, x)
    pub pixel_spacing: Option<(f64, f64)>,
    pub position: Option<Point3<f64>>,
    /// Row and column direction cosines
    pub orientation: Option<(Vector3<f64>, Vector3<f64>)>,
    pub instance_number: Option<i32>,
    pub slice_thickness: Option<f64>,
    pub spacing_between_slices: Option<f64>,
}

impl SliceMetadata {
    /// Unit normal of the slice plane, defaulting to the z axis.
    pub fn normal(&self) -> Vector3<f64> {
        match self.orientation {
            Some((row, col)) => row.cross(&col).normalize(),
            None => Vector3::z(),
        }
    }

    /// Distance of the slice along a given normal.
    pub fn location(&self, normal: &Vector3<f64>) -> Option<f64> {
        self.position.map(|p| p.coords.dot(normal))
    }
}

fn get_floats(
    file: &FileDicomObject<InMemDicomObject>,
    tag: Tag,
    name: &'static str,
) -> Result<Option<Vec<f64>>, DicomError> {
    match file.get(tag) {
        Some(elem) if elem.value().multiplicity() > 0 => {
            let values = elem
                .value()
                .to_multi_float64()
                .context(ConvertValueSnafu { name })?;
            Ok(Some(values))
        }
        _ => Ok(None),
    }
}

fn get_float(
    file: &FileDicomObject<InMemDicomObject>,
    tag: Tag,
    name: &'static str,
) -> Result<Option<f64>, DicomError> {
    Ok(get_floats(file, tag, name)?.and_then(|v| v.first().copied()))
}

fn get_int(
    file: &FileDicomObject<InMemDicomObject>,
    tag: Tag,
    name: &'static str,
) -> Result<Option<i32>, DicomError> {
    match file.get(tag) {
        Some(elem) if elem.value().multiplicity() > 0 => Ok(Some(
            elem.value()
                .to_int::<i32>()
                .context(ConvertValueSnafu { name })?,
        )),
        _ => Ok(None),
    }
}

fn expect_len(values: Vec<f64>, len: usize, name: &'static str) -> Result<Vec<f64>, DicomError> {
    if values.len() == len {
        Ok(values)
    } else {
        Err(DicomError::InvalidValueError {
            name,
            value: format!("{values:?}"),
        })
    }
}

impl TryFrom<&FileDicomObject<InMemDicomObject>> for SliceMetadata {
    type Error = DicomError;

    fn try_from(file: &FileDicomObject<InMemDicomObject>) -> Result<Self, Self::Error> {
        let series_instance_uid = match file.get(tags::SERIES_INSTANCE_UID) {
            Some(elem) => elem
                .value()
                .to_str()
                .context(ConvertValueSnafu {
                    name: "Series Instance UID",
                })?
                .trim_end_matches('\0')
                .trim()
                .to_string(),
            None => String::new(),
        };

        let rows = get_int(file, tags::ROWS, "Rows")?
            .ok_or(DicomError::MissingPropertyError { name: "Rows" })? as usize;
        let columns = get_int(file, tags::COLUMNS, "Columns")?
            .ok_or(DicomError::MissingPropertyError { name: "Columns" })? as usize;

        // First value is row spacing (y)
        let pixel_spacing = get_floats(file, tags::PIXEL_SPACING, "Pixel Spacing")?
            .map(|v| expect_len(v, 2, "Pixel Spacing"))
            .transpose()?
            .map(|v| (v[0], v[1]));

        let position = get_floats(file, tags::IMAGE_POSITION_PATIENT, "Image Position Patient")?
            .map(|v| expect_len(v, 3, "Image Position Patient"))
            .transpose()?
            .map(|v| Point3::new(v[0], v[1], v[2]));

        let orientation = get_floats(
            file,
            tags::IMAGE_ORIENTATION_PATIENT,
            "Image Orientation Patient",
        )?
        .map(|v| expect_len(v, 6, "Image Orientation Patient"))
        .transpose()?
        .map(|v| {
            (
                Vector3::new(v[0], v[1], v[2]).normalize(),
                Vector3::new(v[3], v[4], v[5]).normalize(),
            )
        });

        Ok(SliceMetadata {
            series_instance_uid,
            rows,
            columns,
            pixel_spacing,
            position,
            orientation,
            instance_number: get_int(file, tags::INSTANCE_NUMBER, "Instance Number")?,
            slice_thickness: get_float(file, tags::SLICE_THICKNESS, "Slice Thickness")?,
            spacing_between_slices: get_float(
                file,
                tags::SPACING_BETWEEN_SLICES,
                "Spacing Between Slices",
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SliceBuilder;
    use rstest::rstest;

    #[test]
    fn test_try_from() {
        let file = SliceBuilder::new("1.2.3", 4, 3)
            .spacing(0.5, 0.7)
            .position([10.0, -20.0, 30.0])
            .instance_number(7)
            .slice_thickness(1.25)
            .build();
        let metadata = SliceMetadata::try_from(&file).unwrap();

        assert_eq!(metadata.series_instance_uid, "1.2.3");
        assert_eq!(metadata.rows, 4);
        assert_eq!(metadata.columns, 3);
        assert_eq!(metadata.pixel_spacing, Some((0.5, 0.7)));
        assert_eq!(metadata.position, Some(Point3::new(10.0, -20.0, 30.0)));
        assert_eq!(metadata.instance_number, Some(7));
        assert_eq!(metadata.slice_thickness, Some(1.25));
        assert_eq!(metadata.spacing_between_slices, None);
        assert_eq!(metadata.normal(), Vector3::z());
    }

    #[test]
    fn test_missing_geometry_is_optional() {
        let file = SliceBuilder::new("1.2.3", 2, 2).bare().build();
        let metadata = SliceMetadata::try_from(&file).unwrap();
        assert_eq!(metadata.pixel_spacing, None);
        assert_eq!(metadata.position, None);
        assert_eq!(metadata.orientation, None);
        assert_eq!(metadata.location(&Vector3::z()), None);
    }

    #[rstest]
    #[case([1.0, 0.0, 0.0, 0.0, 1.0, 0.0], Vector3::new(0.0, 0.0, 1.0))]
    #[case([1.0, 0.0, 0.0, 0.0, 0.0, -1.0], Vector3::new(0.0, 1.0, 0.0))]
    fn test_normal(#[case] orientation: [f64; 6], #[case] expected: Vector3<f64>) {
        let file = SliceBuilder::new("1.2.3", 2, 2)
            .orientation(orientation)
            .build();
        let metadata = SliceMetadata::try_from(&file).unwrap();
        assert!((metadata.normal() - expected).norm() < 1e-9);
    }
}
