// ISE Monitor Core - water-quality monitoring for ion-selective electrodes
// Voltage-to-concentration conversion, calibration and device liveness

// Module declarations
pub mod analysis;
pub mod analyte;
pub mod api;
pub mod backend;
pub mod calibration;
pub mod config;
pub mod context;
pub mod error;
pub mod liveness;
pub mod managers;
pub mod reading;
pub mod telemetry;

// Re-exports for convenience
pub use api::*;

use once_cell::sync::OnceCell;
use tracing_subscriber::util::TryInitError;

static LOGGING: OnceCell<()> = OnceCell::new();

cfg_if::cfg_if! {
    if #[cfg(target_os = "android")] {
        fn install_subscriber() -> Result<(), TryInitError> {
            use tracing_subscriber::layer::SubscriberExt;
            use tracing_subscriber::util::SubscriberInitExt;

            tracing_subscriber::registry()
                .with(tracing_android::layer("IseMonitor").ok())
                .try_init()
        }
    } else {
        fn install_subscriber() -> Result<(), TryInitError> {
            use tracing_subscriber::util::SubscriberInitExt;

            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_max_level(tracing::Level::INFO)
                .finish()
                .try_init()
        }
    }
}

/// Initialize logging once per process
///
/// `log` records are bridged into `tracing`; Android routes them to logcat,
/// other targets to stderr.
pub fn init_logging() {
    LOGGING.get_or_init(|| {
        if let Err(err) = install_subscriber() {
            // Another subscriber was installed first; keep it
            eprintln!("logging already initialized: {err}");
        }
        log::info!("Logging initialized");
    });
}
