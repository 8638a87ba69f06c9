use std::io::{BufWriter, Write};

use log::{debug, warn};

use crate::{
    ReplayError,
    replay::{ReplayEvent, Viewer},
};

/// Writes every event a viewer receives as one JSON line. Blocks until the
/// end-of-replay marker arrives or the session goes away, so run it on its own
/// thread. Returns the number of events written.
pub fn write_events(mut viewer: Viewer, out: impl Write) -> Result<usize, ReplayError> {
    let mut writer = BufWriter::new(out);
    let mut written = 0usize;

    while let Some(event) = viewer.blocking_recv() {
        match serde_json::to_string(&event) {
            Ok(line) => {
                writeln!(writer, "{}", line).map_err(|e| ReplayError::WriterError { source: e })?;
                written += 1;
            }
            Err(e) => warn!("Error while serializing replay event: {}", e),
        }
        if event == ReplayEvent::EndOfReplay {
            debug!("End of replay reached after {} events", written);
            break;
        }
    }

    writer
        .flush()
        .map_err(|e| ReplayError::WriterError { source: e })?;
    Ok(written)
}
