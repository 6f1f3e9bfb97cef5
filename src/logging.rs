// 📝 Logging - flexi_logger bootstrap for the CLI
// Library code only uses the `log` macros; the binary decides where they go

use anyhow::{anyhow, Result};
use flexi_logger::{Logger, LoggerHandle};
use std::sync::OnceLock;

static LOGGER: OnceLock<LoggerHandle> = OnceLock::new();

/// Start logging to stderr with the given level spec (e.g. `info`, `debug`,
/// `agenda_tributaria=debug`). `RUST_LOG` overrides the spec when set.
///
/// Calling it again after a successful start is a no-op.
pub fn init_logging(level: &str) -> Result<()> {
    if LOGGER.get().is_some() {
        return Ok(());
    }

    let handle = Logger::try_with_env_or_str(level)
        .map_err(|e| anyhow!("invalid log level `{}`: {}", level, e))?
        .format(flexi_logger::default_format)
        .start()
        .map_err(|e| anyhow!("failed to start logger: {}", e))?;

    // A concurrent winner keeps its handle; ours is dropped.
    let _ = LOGGER.set(handle);

    log::debug!("event=logging_init level={}", level);
    Ok(())
}
