//! Decoding of raw Owon PDS capture payloads.
//!
//! The scope answers a capture request with a 12 byte transfer header
//! followed by one payload. The payload is either a vector file (magic
//! `SPB`, one block per captured channel with 16 bit samples) or a screen
//! dump (magic `BM`, a 24 bit BMP-style image). All multi-byte fields are
//! little endian. Decoding is pure: bytes in, [`Capture`] out, no state
//! kept between calls.

/// Most channels a vector file may carry.
pub const MAX_CHANNELS: usize = 6;

pub(crate) const TRANSFER_HEADER_LEN: usize = 12;
pub(crate) const SCOPE_NAME_LEN: usize = 6;

const FILE_HEADER_LEN: usize = 10;
const CHANNEL_NAME_LEN: usize = 3;
const CHANNEL_HEADER_LEN: usize = 51;
const BITMAP_HEADER_LEN: usize = 54;

const MAGIC_VECTOR: &[u8] = b"SPB";
const MAGIC_BITMAP: &[u8] = b"BM";

// Horizontal divisions on screen and vertical sensitivity steps per
// division. Sample rates and voltage scaling are derived from these.
const HORIZONTAL_DIVISIONS: f64 = 10.0;
const VERTICAL_STEPS: f64 = 25.0;

// Timebase lookup in milliseconds per division, indexed by the byte the
// scope stores in each channel block.
const TIMEBASE_MS: [f64; 32] = [
    0.000_005, 0.000_01, 0.000_025, 0.000_05, 0.000_1, 0.000_25, 0.000_5,
    0.001, 0.002_5, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
    10000.0, 25000.0, 50000.0, 100000.0,
];

// Sensitivity lookup in volts per division.
const SENSITIVITY_V: [f64; 21] = [
    0.002, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0,
    20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0, 10000.0,
];

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("{field} needs {needed} bytes but only {available} are available")]
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("unknown capture type tag {tag:02x?}")]
    UnknownFormat { tag: Vec<u8> },

    #[error("unknown vector type character {0:?}")]
    UnknownVectorType(char),

    #[error("timebase index {0} outside the timebase table")]
    TimebaseIndex(u8),

    #[error("sensitivity index {0} outside the sensitivity table")]
    SensitivityIndex(u8),

    #[error("attenuation exponent {0} out of range")]
    AttenuationExponent(u32),

    #[error("channel block length {declared} is shorter than its own header and samples")]
    BadBlockLength { declared: u32 },

    #[error("vector file carries more than {MAX_CHANNELS} channels")]
    TooManyChannels,

    #[error("bitmap is {width}x{height} at {bits} bits per pixel; expected 24 bit pixels")]
    UnsupportedBitmap { width: i32, height: i32, bits: u16 },
}

/// The 12 byte header the scope sends ahead of every payload.
///
/// Used by the transport to size the payload read; the payload itself is
/// decoded with [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferHeader {
    declared: u32,
    bitmap: bool,
}

impl TransferHeader {
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < TRANSFER_HEADER_LEN {
            return Err(FrameError::Truncated {
                field: "transfer header",
                needed: TRANSFER_HEADER_LEN,
                available: data.len(),
            });
        }

        // Payload length is an unsigned 24 bit value; byte 8 flags a
        // bitmap payload, whose declared length excludes the BMP header.
        Ok(Self {
            declared: u32::from_le_bytes([data[0], data[1], data[2], 0]),
            bitmap: data[8] == 1,
        })
    }

    pub fn is_bitmap(&self) -> bool {
        self.bitmap
    }

    /// Number of payload bytes to read after the header.
    pub fn payload_len(&self) -> usize {
        let mut length = self.declared as usize;
        if self.bitmap {
            length += BITMAP_HEADER_LEN;
        }
        length
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    Vector,
    Bitmap,
}

impl std::fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Bitmap => write!(f, "bitmap"),
        }
    }
}

/// One complete read result from the scope.
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    Vector(VectorCapture),
    Bitmap(BitmapCapture),
}

impl Capture {
    pub fn kind(&self) -> CaptureKind {
        match self {
            Self::Vector(_) => CaptureKind::Vector,
            Self::Bitmap(_) => CaptureKind::Bitmap,
        }
    }

    pub fn as_vector(&self) -> Option<&VectorCapture> {
        match self {
            Self::Vector(vector) => Some(vector),
            Self::Bitmap(_) => None,
        }
    }

    pub fn as_bitmap(&self) -> Option<&BitmapCapture> {
        match self {
            Self::Bitmap(bitmap) => Some(bitmap),
            Self::Vector(_) => None,
        }
    }
}

/// Sampled waveform channels from one capture.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorCapture {
    /// Name the scope stamps into the file header.
    pub name: String,
    pub channels: Vec<ChannelTrace>,
}

/// Metadata and decoded sample values of one waveform trace.
///
/// Samples are immutable once captured; a new read produces a new trace.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTrace {
    pub name: String,
    /// Timebase in seconds per division.
    pub timebase: f64,
    /// Most recent time in slow mode (>= 100ms timebase), in seconds.
    pub slow: f64,
    /// Sample rate in Hz.
    pub sample_rate: f64,
    /// Vertical offset in volts.
    pub offset: f64,
    /// Sensitivity in volts per division, attenuation applied.
    pub sensitivity: f64,
    /// Probe attenuation factor (1, 10, 100, ...).
    pub attenuation: u32,
    /// Sample values in volts.
    pub vector: Vec<f64>,
}

impl ChannelTrace {
    pub fn samples(&self) -> usize {
        self.vector.len()
    }
}

/// A screen dump, held as a top-down RGB pixel buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapCapture {
    pub width: u32,
    pub height: u32,
    /// Bytes per pixel; 3 for RGB.
    pub depth: u32,
    /// `width * height * depth` bytes, row-major from the top-left pixel.
    pub pixels: Vec<u8>,
}

/// Decode one capture payload.
///
/// Purely functional; every declared length is checked against the buffer
/// before it is read.
pub fn decode(data: &[u8]) -> Result<Capture, FrameError> {
    if data.starts_with(MAGIC_VECTOR) {
        decode_vector(data).map(Capture::Vector)
    } else if data.starts_with(MAGIC_BITMAP) {
        decode_bitmap(data).map(Capture::Bitmap)
    } else {
        Err(FrameError::UnknownFormat {
            tag: data.iter().take(4).copied().collect(),
        })
    }
}

fn decode_vector(data: &[u8]) -> Result<VectorCapture, FrameError> {
    if data.len() < FILE_HEADER_LEN {
        return Err(FrameError::Truncated {
            field: "vector file header",
            needed: FILE_HEADER_LEN,
            available: data.len(),
        });
    }

    // Byte 3 of the scope name selects the file flavour. 'W' and 'X'
    // files store sensitivities shifted by half a microvolt.
    let type_char = data[3] as char;
    if !matches!(type_char, 'V' | 'W' | 'X') {
        return Err(FrameError::UnknownVectorType(type_char));
    }
    let deep_format = type_char == 'W' || type_char == 'X';

    let name = text_field(&data[..SCOPE_NAME_LEN]);

    let mut channels = Vec::new();
    let mut offset = FILE_HEADER_LEN;
    while offset < data.len() {
        if channels.len() == MAX_CHANNELS {
            return Err(FrameError::TooManyChannels);
        }
        let (trace, advance) = decode_channel(&data[offset..], deep_format)?;
        channels.push(trace);
        offset += advance;
    }

    Ok(VectorCapture { name, channels })
}

// Decode one channel block, returning the trace and the distance to the
// next block.
fn decode_channel(block: &[u8], deep_format: bool) -> Result<(ChannelTrace, usize), FrameError> {
    if block.len() < CHANNEL_HEADER_LEN {
        return Err(FrameError::Truncated {
            field: "channel header",
            needed: CHANNEL_HEADER_LEN,
            available: block.len(),
        });
    }

    let name = text_field(&block[..CHANNEL_NAME_LEN]);
    let block_length = read_u32(block, 3);
    let samples = read_u32(block, 11) as usize;
    let slow_raw = read_u32(block, 15);
    let timebase_index = block[19];
    let offset_raw = read_i32(block, 23);
    let sensitivity_index = block[27];
    let attenuation_exponent = read_u32(block, 31);

    let needed = CHANNEL_HEADER_LEN + samples * 2;
    if needed > block.len() {
        return Err(FrameError::Truncated {
            field: "sample data",
            needed,
            available: block.len(),
        });
    }

    // The block length field counts from the end of the channel name; it
    // must at least cover the header and samples just validated.
    let advance = CHANNEL_NAME_LEN + block_length as usize;
    if advance < needed {
        return Err(FrameError::BadBlockLength {
            declared: block_length,
        });
    }
    if advance > block.len() {
        return Err(FrameError::Truncated {
            field: "channel block",
            needed: advance,
            available: block.len(),
        });
    }

    let timebase = TIMEBASE_MS
        .get(timebase_index as usize)
        .ok_or(FrameError::TimebaseIndex(timebase_index))?
        / 1000.0;

    let mut sensitivity = *SENSITIVITY_V
        .get(sensitivity_index as usize)
        .ok_or(FrameError::SensitivityIndex(sensitivity_index))?;
    if deep_format {
        sensitivity -= 0.000_000_5;
    }

    let attenuation = 10u32
        .checked_pow(attenuation_exponent)
        .ok_or(FrameError::AttenuationExponent(attenuation_exponent))?;
    let sensitivity = sensitivity * f64::from(attenuation);

    let sample_rate = samples as f64 / timebase / HORIZONTAL_DIVISIONS;
    let slow = if sample_rate > 0.0 {
        f64::from(slow_raw) / sample_rate
    } else {
        0.0
    };
    let offset = f64::from(offset_raw) * sensitivity / VERTICAL_STEPS;

    let vector = block[CHANNEL_HEADER_LEN..needed]
        .chunks_exact(2)
        .map(|pair| f64::from(i16::from_le_bytes([pair[0], pair[1]])) * sensitivity / VERTICAL_STEPS)
        .collect();

    let trace = ChannelTrace {
        name,
        timebase,
        slow,
        sample_rate,
        offset,
        sensitivity,
        attenuation,
        vector,
    };
    Ok((trace, advance))
}

fn decode_bitmap(data: &[u8]) -> Result<BitmapCapture, FrameError> {
    if data.len() < BITMAP_HEADER_LEN {
        return Err(FrameError::Truncated {
            field: "bitmap header",
            needed: BITMAP_HEADER_LEN,
            available: data.len(),
        });
    }

    let width = read_i32(data, 18);
    let raw_height = read_i32(data, 22);
    let bits = u16::from_le_bytes([data[28], data[29]]);

    // A negative BMP height means the rows are already stored top-down.
    if width <= 0 || raw_height == 0 || bits != 24 {
        return Err(FrameError::UnsupportedBitmap {
            width,
            height: raw_height,
            bits,
        });
    }
    let top_down = raw_height < 0;
    let width = width as u32;
    let height = raw_height.unsigned_abs();
    let depth = u32::from(bits) / 8;

    let row_size = width as usize * depth as usize;
    let pixel_len = row_size * height as usize;
    let needed = BITMAP_HEADER_LEN + pixel_len;
    if needed > data.len() {
        return Err(FrameError::Truncated {
            field: "pixel data",
            needed,
            available: data.len(),
        });
    }

    // Normalize BGR rows (bottom-up unless flagged otherwise) into a
    // top-down RGB buffer.
    let image = &data[BITMAP_HEADER_LEN..needed];
    let mut pixels = vec![0u8; pixel_len];
    for row in 0..height as usize {
        let source_row = if top_down {
            row
        } else {
            height as usize - 1 - row
        };
        let destination = &mut pixels[row * row_size..(row + 1) * row_size];
        destination.copy_from_slice(&image[source_row * row_size..(source_row + 1) * row_size]);
        for pixel in destination.chunks_exact_mut(depth as usize) {
            pixel.swap(0, 2);
        }
    }

    Ok(BitmapCapture {
        width,
        height,
        depth,
        pixels,
    })
}

// Fixed-width name fields are NUL padded.
fn text_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
        .to_string()
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn read_i32(data: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}
