//! Serializing captures to CSV and PNG.
//!
//! Vector captures go through a polars [`DataFrame`], one column per
//! channel plus an optional leading time column; bitmap captures encode
//! their RGB buffer as a PNG. Each encoder accepts exactly one capture
//! kind and refuses the other.

use std::io::{Seek, Write};

use image::{ImageBuffer, Rgb};
use polars::prelude::*;

use crate::frame::{BitmapCapture, Capture, CaptureKind, ChannelTrace, VectorCapture};

const TIME_COLUMN_NAME: &str = "time";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{requested} export is not supported for a {kind} capture")]
    UnsupportedCapture {
        requested: &'static str,
        kind: CaptureKind,
    },

    #[error("bitmap buffer does not match {width}x{height}")]
    MismatchedBitmap { width: u32, height: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV encoding error: {0}")]
    Csv(#[from] PolarsError),

    #[error("PNG encoding error: {0}")]
    Png(#[from] image::ImageError),
}

/// CSV layout switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvOptions {
    /// Prepend a time column derived from the first channel's sample rate.
    pub include_time: bool,
    /// Prepend the device name and channel count before the sample rows.
    pub verbose: bool,
}

impl VectorCapture {
    /// Collect the capture into a [`DataFrame`].
    ///
    /// Channels shorter than the longest one are padded with nulls so
    /// every column has the same height.
    pub fn to_dataframe(&self, include_time: bool) -> Result<DataFrame, PolarsError> {
        let height = self
            .channels
            .iter()
            .map(ChannelTrace::samples)
            .max()
            .unwrap_or(0);

        let mut columns: Vec<Column> = Vec::with_capacity(self.channels.len() + 1);
        if include_time {
            let rate = self.channels.first().map_or(1.0, |c| c.sample_rate);
            let time: Vec<f64> = (0..height).map(|index| index as f64 / rate).collect();
            columns.push(Series::new(TIME_COLUMN_NAME.into(), time).into());
        }
        for (index, channel) in self.channels.iter().enumerate() {
            let name = if channel.name.is_empty() {
                format!("CH{}", index + 1)
            } else {
                channel.name.clone()
            };
            let mut values: Vec<Option<f64>> =
                channel.vector.iter().copied().map(Some).collect();
            values.resize(height, None);
            columns.push(Series::new(name.into(), values).into());
        }

        DataFrame::new(columns)
    }

    /// Write sample rows as CSV, one row per sample index.
    pub fn write_csv<W: Write>(&self, mut writer: W, options: CsvOptions) -> Result<(), ExportError> {
        if options.verbose {
            writeln!(writer, "Device, {}", self.name)?;
            writeln!(writer, "Active Channels, {}", self.channels.len())?;
        }

        let mut frame = self.to_dataframe(options.include_time)?;
        CsvWriter::new(&mut writer)
            .include_header(false)
            .finish(&mut frame)?;
        Ok(())
    }
}

impl BitmapCapture {
    /// Encode the bitmap as a PNG image.
    pub fn write_png<W: Write + Seek>(&self, mut writer: W) -> Result<(), ExportError> {
        let buffer = ImageBuffer::<Rgb<u8>, _>::from_raw(
            self.width,
            self.height,
            self.pixels.as_slice(),
        )
        .ok_or(ExportError::MismatchedBitmap {
            width: self.width,
            height: self.height,
        })?;
        buffer.write_to(&mut writer, image::ImageOutputFormat::Png)?;
        Ok(())
    }
}

impl Capture {
    /// CSV export; only defined for vector captures.
    pub fn write_csv<W: Write>(&self, writer: W, options: CsvOptions) -> Result<(), ExportError> {
        match self {
            Self::Vector(vector) => vector.write_csv(writer, options),
            Self::Bitmap(_) => Err(ExportError::UnsupportedCapture {
                requested: "CSV",
                kind: CaptureKind::Bitmap,
            }),
        }
    }

    /// PNG export; only defined for bitmap captures.
    pub fn write_png<W: Write + Seek>(&self, writer: W) -> Result<(), ExportError> {
        match self {
            Self::Bitmap(bitmap) => bitmap.write_png(writer),
            Self::Vector(_) => Err(ExportError::UnsupportedCapture {
                requested: "PNG",
                kind: CaptureKind::Vector,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::frame::ChannelTrace;

    fn trace(name: &str, vector: Vec<f64>) -> ChannelTrace {
        let sample_rate = vector.len() as f64 / 0.001;
        ChannelTrace {
            name: name.to_string(),
            timebase: 0.0001,
            slow: 0.0,
            sample_rate,
            offset: 0.0,
            sensitivity: 1.0,
            attenuation: 1,
            vector,
        }
    }

    fn single_channel() -> VectorCapture {
        VectorCapture {
            name: "SPBV62".to_string(),
            channels: vec![trace("CH1", vec![1.0, 2.0, 3.0])],
        }
    }

    #[test]
    fn csv_has_one_row_per_sample() {
        let mut output = Vec::new();
        single_channel()
            .write_csv(&mut output, CsvOptions::default())
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 3);
        for (row, expected) in rows.iter().zip([1.0, 2.0, 3.0]) {
            assert_eq!(row.parse::<f64>().unwrap(), expected);
        }
    }

    #[test]
    fn csv_time_column_leads_each_row() {
        let mut output = Vec::new();
        single_channel()
            .write_csv(
                &mut output,
                CsvOptions {
                    include_time: true,
                    verbose: false,
                },
            )
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        let rate = 3.0 / 0.001;
        for (index, row) in text.lines().enumerate() {
            let mut fields = row.split(',');
            let time: f64 = fields.next().unwrap().parse().unwrap();
            assert_eq!(time, index as f64 / rate);
            assert!(fields.next().is_some());
        }
    }

    #[test]
    fn verbose_csv_carries_device_preamble() {
        let mut output = Vec::new();
        single_channel()
            .write_csv(
                &mut output,
                CsvOptions {
                    include_time: false,
                    verbose: true,
                },
            )
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows[0], "Device, SPBV62");
        assert_eq!(rows[1], "Active Channels, 1");
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn ragged_channels_pad_with_nulls() {
        let capture = VectorCapture {
            name: "SPBV62".to_string(),
            channels: vec![
                trace("CH1", vec![1.0, 2.0, 3.0]),
                trace("CH2", vec![9.0]),
            ],
        };
        let frame = capture.to_dataframe(false).unwrap();
        assert_eq!(frame.shape(), (3, 2));
        assert_eq!(frame.column("CH2").unwrap().null_count(), 2);
    }

    #[test]
    fn csv_of_bitmap_is_unsupported() {
        let capture = Capture::Bitmap(BitmapCapture {
            width: 1,
            height: 1,
            depth: 3,
            pixels: vec![0, 0, 0],
        });
        let error = capture
            .write_csv(Vec::new(), CsvOptions::default())
            .unwrap_err();
        assert!(matches!(
            error,
            ExportError::UnsupportedCapture {
                requested: "CSV",
                kind: CaptureKind::Bitmap,
            }
        ));
    }

    #[test]
    fn png_round_trips_pixels() {
        let bitmap = BitmapCapture {
            width: 2,
            height: 1,
            depth: 3,
            pixels: vec![255, 0, 0, 0, 255, 0],
        };
        let mut output = Cursor::new(Vec::new());
        bitmap.write_png(&mut output).unwrap();

        let decoded = image::load_from_memory(output.get_ref()).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(decoded.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(decoded.get_pixel(1, 0), &Rgb([0, 255, 0]));
    }

    #[test]
    fn png_of_vector_is_unsupported() {
        let capture = Capture::Vector(single_channel());
        let error = capture.write_png(Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(
            error,
            ExportError::UnsupportedCapture {
                requested: "PNG",
                kind: CaptureKind::Vector,
            }
        ));
    }
}
