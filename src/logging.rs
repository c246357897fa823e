//! Log setup for the binary and, with the `python` feature, a bridge that
//! forwards `log` records into Python's `logging` module.
//!
//! The level comes from `OPENBCI_LOG`, then `RUST_LOG`, then `info`.

use std::sync::Once;

use env_logger::Env;
use log::LevelFilter;

pub const LOG_ENV_VAR: &str = "OPENBCI_LOG";

static RUST_LOG_ONCE: Once = Once::new();

/// Parse a level name such as `"debug"` or `"WARN"`.
pub fn parse_level(input: Option<&str>) -> Option<LevelFilter> {
    input.and_then(|s| s.trim().parse::<LevelFilter>().ok())
}

/// Level requested through the environment, `info` when unset or invalid.
pub fn env_level() -> LevelFilter {
    let from_env = std::env::var(LOG_ENV_VAR).or_else(|_| std::env::var("RUST_LOG"));
    parse_level(from_env.ok().as_deref()).unwrap_or(LevelFilter::Info)
}

fn level_name(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}

/// Initialize stderr logging for the binary. Later calls are no-ops.
pub fn init_rust_logging() {
    init_rust_logging_with(env_level());
}

/// Same as [`init_rust_logging`] with an explicit level (e.g. from `--verbose`).
pub fn init_rust_logging_with(level: LevelFilter) {
    RUST_LOG_ONCE.call_once(|| {
        let env = Env::default().default_filter_or(level_name(level));
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .format_module_path(true)
            .format_target(false)
            .try_init();
    });
}

#[cfg(feature = "python")]
pub use self::python_bridge::{
    init_python_logging, reset_python_logging_cache, set_python_log_level,
};

#[cfg(feature = "python")]
mod python_bridge {
    use std::collections::HashMap;
    use std::sync::{Mutex, Once};

    use log::{Level, LevelFilter, Log, Metadata, Record};
    use once_cell::sync::OnceCell;
    use pyo3::prelude::*;
    use pyo3::types::{PyModule, PyTuple};

    use super::env_level;

    static PY_LOG_ONCE: Once = Once::new();
    static BRIDGE: OnceCell<&'static PyLogBridge> = OnceCell::new();

    /// Python logger per Rust target, with the lowest level it accepts.
    type TargetCache = HashMap<String, (LevelFilter, Py<PyAny>)>;

    struct PyLogBridge {
        max_level: Mutex<LevelFilter>,
        logging: Py<PyModule>,
        targets: Mutex<TargetCache>,
    }

    fn python_level(level: Level) -> u32 {
        match level {
            Level::Error => 40,
            Level::Warn => 30,
            Level::Info => 20,
            Level::Debug => 10,
            Level::Trace => 5,
        }
    }

    impl PyLogBridge {
        fn new(py: Python<'_>, max_level: LevelFilter) -> PyResult<Self> {
            Ok(Self {
                max_level: Mutex::new(max_level),
                logging: py.import("logging")?.unbind(),
                targets: Mutex::new(HashMap::new()),
            })
        }

        fn current_max(&self) -> LevelFilter {
            self.max_level
                .lock()
                .map(|guard| *guard)
                .unwrap_or(LevelFilter::Info)
        }

        /// `openbci_rs::decoder` logs to the Python logger `openbci_rs.decoder`.
        fn logger_for(&self, py: Python<'_>, target: &str) -> PyResult<(LevelFilter, Py<PyAny>)> {
            if let Ok(targets) = self.targets.lock() {
                if let Some((level, logger)) = targets.get(target) {
                    return Ok((*level, logger.clone_ref(py)));
                }
            }

            let logger = self.logging.bind(py).call_method1("getLogger", (target,))?;
            let mut enabled = LevelFilter::Off;
            for level in [Level::Trace, Level::Debug, Level::Info, Level::Warn, Level::Error] {
                if logger
                    .call_method1("isEnabledFor", (python_level(level),))?
                    .is_truthy()?
                {
                    enabled = level.to_level_filter();
                    break;
                }
            }

            let logger = logger.unbind();
            if let Ok(mut targets) = self.targets.lock() {
                targets.insert(target.to_string(), (enabled, logger.clone_ref(py)));
            }
            Ok((enabled, logger))
        }

        fn forward(&self, py: Python<'_>, record: &Record) -> PyResult<()> {
            let target = record.target().replace("::", ".");
            let (enabled, logger) = self.logger_for(py, &target)?;
            if record.level().to_level_filter() > enabled {
                return Ok(());
            }

            let logger = logger.bind(py);
            let none = py.None();
            let py_record = logger.call_method1(
                "makeRecord",
                (
                    &target,
                    python_level(record.level()),
                    record.file(),
                    record.line().unwrap_or_default(),
                    record.args().to_string(),
                    PyTuple::empty(py),
                    &none,
                    &none,
                    &none,
                ),
            )?;
            logger.call_method1("handle", (py_record,))?;
            Ok(())
        }
    }

    impl Log for PyLogBridge {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level().to_level_filter() <= self.current_max()
        }

        fn log(&self, record: &Record) {
            if !self.enabled(record.metadata()) {
                return;
            }
            Python::attach(|py| {
                if let Err(e) = self.forward(py, record) {
                    e.restore(py);
                }
            });
        }

        fn flush(&self) {}
    }

    fn install(py: Python<'_>, level: LevelFilter) {
        PY_LOG_ONCE.call_once(|| match PyLogBridge::new(py, level) {
            Ok(bridge) => {
                let bridge: &'static PyLogBridge = Box::leak(Box::new(bridge));
                if log::set_logger(bridge).is_ok() {
                    log::set_max_level(level);
                    let _ = BRIDGE.set(bridge);
                }
            }
            Err(e) => e.restore(py),
        });
    }

    /// Route Rust logs into Python's `logging`. Only the first call installs.
    pub fn init_python_logging(py: Python<'_>) -> PyResult<()> {
        install(py, env_level());
        Ok(())
    }

    /// Forget cached Python loggers, e.g. after `logging.basicConfig`.
    pub fn reset_python_logging_cache() {
        if let Some(bridge) = BRIDGE.get() {
            if let Ok(mut targets) = bridge.targets.lock() {
                targets.clear();
            }
        }
    }

    pub fn set_python_log_level(py: Python<'_>, level: LevelFilter) -> PyResult<()> {
        install(py, level);
        if let Some(bridge) = BRIDGE.get() {
            if let Ok(mut max_level) = bridge.max_level.lock() {
                *max_level = level;
            }
        }
        reset_python_logging_cache();
        log::set_max_level(level);
        Ok(())
    }
}
