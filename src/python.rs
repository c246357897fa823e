//! Python bindings (`python` feature).

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::config::{Board, DecoderConfig, DEFAULT_MAX_BYTES_TO_SKIP};
use crate::decoder::{CytonDecoder, DecodeBatch, GanglionDecoder};
use crate::errors::DecodeError;
use crate::logging::{init_python_logging, reset_python_logging_cache, set_python_log_level};
use crate::sample::{AuxData, Sample};

fn to_py_err(e: DecodeError) -> PyErr {
    match e {
        DecodeError::InvalidConfig(msg) => PyValueError::new_err(msg),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

// ============================================================================
// Data classes
// ============================================================================

/// One decoded sample (dataclass-like).
///
/// Attributes:
///     sample_number: Board sample counter.
///     channel_data: Channel values in volts (or micro-volts, or raw counts).
///     accel_data: [x, y, z] in g, or None when the packet carries no reading.
///     aux_data: Uninterpreted aux bytes (lower half for daisy samples).
///     aux_data_upper: Aux bytes of the upper daisy half, None otherwise.
///     impedance: Impedance per channel plus reference, on impedance samples.
///     board_time: Board clock of time-synced packets.
///     timestamp_us: Receive time passed to the decoder.
///     packet_type: Packet variant name, e.g. "standard_accel".
#[pyclass(name = "Sample", frozen)]
#[derive(Clone)]
struct PySample {
    #[pyo3(get)]
    sample_number: u8,
    #[pyo3(get)]
    channel_data: Vec<f64>,
    #[pyo3(get)]
    accel_data: Option<Vec<f64>>,
    #[pyo3(get)]
    aux_data: Vec<u8>,
    #[pyo3(get)]
    aux_data_upper: Option<Vec<u8>>,
    #[pyo3(get)]
    impedance: Option<Vec<f64>>,
    #[pyo3(get)]
    board_time: Option<u32>,
    #[pyo3(get)]
    timestamp_us: Option<u64>,
    #[pyo3(get)]
    packet_type: String,
    #[pyo3(get)]
    valid: bool,
}

#[pymethods]
impl PySample {
    fn __repr__(&self) -> String {
        format!(
            "Sample(sample_number={}, packet_type={}, channel_data={:?})",
            self.sample_number, self.packet_type, self.channel_data
        )
    }

    fn __len__(&self) -> usize {
        self.channel_data.len()
    }

    #[getter]
    fn n_channels(&self) -> usize {
        self.channel_data.len()
    }

    /// Convert to dictionary for easy serialization.
    fn to_dict<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let dict = PyDict::new(py);
        dict.set_item("sample_number", self.sample_number)?;
        dict.set_item("channel_data", self.channel_data.clone())?;
        dict.set_item("accel_data", self.accel_data.clone())?;
        dict.set_item("aux_data", self.aux_data.clone())?;
        dict.set_item("aux_data_upper", self.aux_data_upper.clone())?;
        dict.set_item("impedance", self.impedance.clone())?;
        dict.set_item("board_time", self.board_time)?;
        dict.set_item("timestamp_us", self.timestamp_us)?;
        dict.set_item("packet_type", self.packet_type.clone())?;
        dict.set_item("valid", self.valid)?;
        Ok(dict)
    }
}

impl From<Sample> for PySample {
    fn from(s: Sample) -> Self {
        let packet_type = serde_json::to_value(s.packet_type)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{:?}", s.packet_type));
        let (aux_data, aux_data_upper) = match s.aux_data {
            AuxData::None => (Vec::new(), None),
            AuxData::Raw(bytes) => (bytes, None),
            AuxData::Daisy { lower, upper } => (lower, Some(upper)),
        };
        PySample {
            sample_number: s.sample_number,
            channel_data: s.channel_data,
            accel_data: s.accel_data.map(|a| a.to_vec()),
            aux_data,
            aux_data_upper,
            impedance: s.impedance,
            board_time: s.board_time,
            timestamp_us: s.timestamp_us,
            packet_type,
            valid: s.valid,
        }
    }
}

/// Result of one decode call.
///
/// Attributes:
///     samples: List of Sample objects.
///     sequence_gaps: Packets missing according to the sequence counter.
///     desync_events: Frames rejected for a bad stop byte.
///     skipped_bytes: Bytes discarded while searching for a start byte.
///     dropped_packets: Sequence gaps plus unpaired daisy halves.
///     daisy_halves_dropped: Daisy halves that never found their partner.
///     messages: ASCII messages sent by the board.
///     errors: Per-frame error descriptions.
///     stalled: True when no frame was found within the scan budget.
#[pyclass(name = "DecodeBatch", frozen)]
#[derive(Clone)]
struct PyDecodeBatch {
    #[pyo3(get)]
    samples: Vec<PySample>,
    #[pyo3(get)]
    sequence_gaps: usize,
    #[pyo3(get)]
    desync_events: usize,
    #[pyo3(get)]
    skipped_bytes: usize,
    #[pyo3(get)]
    dropped_packets: usize,
    #[pyo3(get)]
    daisy_halves_dropped: usize,
    #[pyo3(get)]
    messages: Vec<String>,
    #[pyo3(get)]
    errors: Vec<String>,
    #[pyo3(get)]
    stalled: bool,
}

#[pymethods]
impl PyDecodeBatch {
    fn __repr__(&self) -> String {
        format!(
            "DecodeBatch(samples={}, sequence_gaps={}, desync_events={}, skipped_bytes={}, daisy_halves_dropped={}, stalled={})",
            self.samples.len(),
            self.sequence_gaps,
            self.desync_events,
            self.skipped_bytes,
            self.daisy_halves_dropped,
            self.stalled
        )
    }

    fn __len__(&self) -> usize {
        self.samples.len()
    }

    /// Check if anything was lost or rejected in this batch.
    #[getter]
    fn has_errors(&self) -> bool {
        !self.errors.is_empty() || self.dropped_packets > 0
    }
}

impl From<DecodeBatch> for PyDecodeBatch {
    fn from(b: DecodeBatch) -> Self {
        PyDecodeBatch {
            samples: b.samples.into_iter().map(PySample::from).collect(),
            sequence_gaps: b.sequence_gaps,
            desync_events: b.desync_events,
            skipped_bytes: b.skipped_bytes,
            dropped_packets: b.dropped_packets,
            daisy_halves_dropped: b.daisy_halves_dropped,
            messages: b.messages,
            errors: b.errors.iter().map(ToString::to_string).collect(),
            stalled: b.stalled,
        }
    }
}

// ============================================================================
// Decoders
// ============================================================================

fn build_config(
    board: Board,
    daisy: bool,
    gains: Option<Vec<f64>>,
    micro_volts: bool,
    scaled: bool,
    max_bytes_to_skip: usize,
) -> DecoderConfig {
    DecoderConfig {
        board,
        daisy,
        gains: gains.unwrap_or_default(),
        micro_volts,
        scaled_output: scaled,
        max_bytes_to_skip,
    }
}

/// Decoder for Cyton raw frames (serial dongle, WiFi shield).
///
/// Example:
///     >>> decoder = CytonDecoder(daisy=False, micro_volts=True)
///     >>> batch = decoder.feed(port.read(4096))
///     >>> for sample in batch.samples:
///     ...     print(sample.channel_data)
#[pyclass(name = "CytonDecoder")]
struct PyCytonDecoder {
    inner: CytonDecoder,
}

#[pymethods]
impl PyCytonDecoder {
    #[new]
    #[pyo3(signature = (daisy=false, gains=None, micro_volts=false, scaled=true, max_bytes_to_skip=DEFAULT_MAX_BYTES_TO_SKIP))]
    fn new(
        daisy: bool,
        gains: Option<Vec<f64>>,
        micro_volts: bool,
        scaled: bool,
        max_bytes_to_skip: usize,
    ) -> PyResult<Self> {
        let config = build_config(Board::Cyton, daisy, gains, micro_volts, scaled, max_bytes_to_skip);
        CytonDecoder::new(config)
            .map(|inner| PyCytonDecoder { inner })
            .map_err(to_py_err)
    }

    /// Create a decoder from a JSON configuration string.
    #[staticmethod]
    fn from_json(config: &str) -> PyResult<Self> {
        let config: DecoderConfig =
            serde_json::from_str(config).map_err(|e| PyValueError::new_err(e.to_string()))?;
        CytonDecoder::new(config)
            .map(|inner| PyCytonDecoder { inner })
            .map_err(to_py_err)
    }

    /// Feed a chunk of the raw byte stream.
    ///
    /// Args:
    ///     data: Bytes as read from the transport, any length.
    ///     timestamp_us: Receive time stamped onto every completed sample.
    #[pyo3(signature = (data, timestamp_us=None))]
    fn feed(&mut self, data: &[u8], timestamp_us: Option<u64>) -> PyDecodeBatch {
        let batch = match timestamp_us {
            Some(ts) => self.inner.feed_at(data, ts),
            None => self.inner.feed(data),
        };
        batch.into()
    }

    /// Decode back-to-back 33-byte packets (WiFi shield high-speed mode).
    #[pyo3(signature = (data, timestamp_us=None))]
    fn decode_packets(&mut self, data: &[u8], timestamp_us: Option<u64>) -> PyDecodeBatch {
        let batch = match timestamp_us {
            Some(ts) => self.inner.decode_packets_at(data, ts),
            None => self.inner.decode_packets(data),
        };
        batch.into()
    }

    /// Drop any partial frame and pending daisy half.
    fn reset(&mut self) {
        self.inner.reset_stream();
    }

    #[getter]
    fn channel_count(&self) -> usize {
        self.inner.config().channel_count()
    }

    /// Packets lost since the decoder was created.
    #[getter]
    fn dropped_packets(&self) -> usize {
        self.inner.dropped_packets()
    }

    fn __repr__(&self) -> String {
        format!(
            "CytonDecoder(channels={}, daisy={})",
            self.inner.config().channel_count(),
            self.inner.config().daisy
        )
    }
}

/// Decoder for Ganglion BLE notifications.
#[pyclass(name = "GanglionDecoder")]
struct PyGanglionDecoder {
    inner: GanglionDecoder,
}

#[pymethods]
impl PyGanglionDecoder {
    #[new]
    #[pyo3(signature = (gains=None, micro_volts=false, scaled=true))]
    fn new(gains: Option<Vec<f64>>, micro_volts: bool, scaled: bool) -> PyResult<Self> {
        let config = build_config(
            Board::Ganglion,
            false,
            gains,
            micro_volts,
            scaled,
            DEFAULT_MAX_BYTES_TO_SKIP,
        );
        GanglionDecoder::new(config)
            .map(|inner| PyGanglionDecoder { inner })
            .map_err(to_py_err)
    }

    /// Decode one notification payload (tag byte first).
    #[pyo3(signature = (data, timestamp_us=None))]
    fn decode(&mut self, data: &[u8], timestamp_us: Option<u64>) -> PyDecodeBatch {
        let batch = match timestamp_us {
            Some(ts) => self.inner.decode_notification_at(data, ts),
            None => self.inner.decode_notification(data),
        };
        batch.into()
    }

    /// Impedance per channel plus reference, in ohms.
    #[getter]
    fn impedance(&self) -> Vec<f64> {
        self.inner.state().impedance.clone()
    }

    #[getter]
    fn dropped_packets(&self) -> usize {
        self.inner.dropped_packets()
    }

    fn __repr__(&self) -> String {
        format!("GanglionDecoder(channels={})", self.inner.config().channel_count())
    }
}

// ============================================================================
// Module
// ============================================================================

/// Set the minimum level forwarded to Python's `logging` ("debug", "info", ...).
/// Falls back to `OPENBCI_LOG` / `RUST_LOG` when `level` is None.
#[pyfunction]
#[pyo3(signature = (level=None))]
fn set_log_level(py: Python<'_>, level: Option<&str>) -> PyResult<()> {
    let level = match level {
        Some(name) => crate::logging::parse_level(Some(name))
            .ok_or_else(|| PyValueError::new_err(format!("unknown log level: {name}")))?,
        None => crate::logging::env_level(),
    };
    set_python_log_level(py, level)
}

/// Forget cached Python loggers after changing Python's logging configuration.
#[pyfunction]
fn reset_log_cache() {
    reset_python_logging_cache();
}

#[pymodule]
fn openbci_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    init_python_logging(m.py())?;

    m.add_class::<PySample>()?;
    m.add_class::<PyDecodeBatch>()?;
    m.add_class::<PyCytonDecoder>()?;
    m.add_class::<PyGanglionDecoder>()?;
    m.add_function(wrap_pyfunction!(set_log_level, m)?)?;
    m.add_function(wrap_pyfunction!(reset_log_cache, m)?)?;

    m.add("DEFAULT_MAX_BYTES_TO_SKIP", DEFAULT_MAX_BYTES_TO_SKIP)?;
    m.add("CYTON_PACKET_SIZE", crate::packet::RAW_PACKET_SIZE)?;
    m.add("GANGLION_PACKET_SIZE", crate::packet::BLE_PACKET_SIZE)?;

    Ok(())
}
