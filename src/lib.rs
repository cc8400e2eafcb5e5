//! # OwonPds RS
//!
//! A Rust library for capturing waveform and screen data from Owon PDS
//! oscilloscopes over USB.
//!
//! The scope is polled synchronously: every read sends one capture
//! request and decodes the answer into either sampled waveform channels
//! or a screen bitmap, with typed metadata (timebase, sensitivity,
//! offset, attenuation, sample rate) per channel.
//!
//! ## Features
//!
//! - **Device discovery**: enumerate connected scopes and open them by
//!   index using `rusb`
//! - **Typed captures**: waveform channels as owned `f64` sample vectors,
//!   screen dumps as owned RGB buffers, all lengths checked at decode time
//! - **DataFrame output**: vector captures collect into `polars`
//!   DataFrames with an optional time column
//! - **Exports**: CSV for waveform captures, PNG for screen captures
//! - **Testable core**: the frame decoder is pure and the session runs
//!   over a transport trait, so no hardware is needed in tests
//!
//! ## Examples
//!
//! ### Capture and inspect
//!
//! ```rust,no_run
//! use owonpds_rs::{Capture, PdsScope};
//!
//! let mut scope = PdsScope::open(0)?;
//! println!("Connected to {}", scope.identity().product);
//!
//! match scope.read()? {
//!     Capture::Vector(vector) => {
//!         for channel in &vector.channels {
//!             println!(
//!                 "{}: {} samples at {} S/s",
//!                 channel.name,
//!                 channel.samples(),
//!                 channel.sample_rate
//!             );
//!         }
//!     }
//!     Capture::Bitmap(bitmap) => {
//!         println!("Screen dump {}x{}", bitmap.width, bitmap.height);
//!     }
//! }
//! # Ok::<(), owonpds_rs::ScopeError>(())
//! ```
//!
//! ### Export to CSV
//!
//! ```rust,no_run
//! use owonpds_rs::{CsvOptions, PdsScope};
//!
//! let mut scope = PdsScope::open(0)?;
//! let capture = scope.read()?.clone();
//!
//! let file = std::fs::File::create("capture.csv")?;
//! capture.write_csv(file, CsvOptions { include_time: true, verbose: false })?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Device discovery
//!
//! ```rust,no_run
//! use owonpds_rs::PdsConnector;
//!
//! for device in PdsConnector::available_devices()? {
//!     println!(
//!         "scope {} on bus {} address {}",
//!         device.index, device.bus, device.address
//!     );
//! }
//! # Ok::<(), owonpds_rs::PdsConnectorError>(())
//! ```

pub mod export;
pub mod frame;
pub mod pds_connector;
pub mod pds_scope;
pub mod usb_transport;

// Re-export the main types for convenience
pub use frame::{
    BitmapCapture, Capture, CaptureKind, ChannelTrace, FrameError, TransferHeader, VectorCapture,
    MAX_CHANNELS,
};

pub use export::{CsvOptions, ExportError};

pub use pds_connector::{DeviceIdentity, PdsConnector, PdsConnectorError, PdsDevice};

pub use pds_scope::{PdsScope, ScopeError};

pub use usb_transport::{ScopeTransport, TransportError, UsbTransport};

/// Library version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
