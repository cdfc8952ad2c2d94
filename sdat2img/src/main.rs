// SPDX-FileCopyrightText: 2025 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    process::ExitCode,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::error;

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Ctrl-C only sets a flag. The conversion loop checks it between blocks and
/// bails out, which drops the temporary output file.
fn cancel_signal() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let signal = Arc::new(AtomicBool::new(false));
    let handler_signal = signal.clone();

    ctrlc::set_handler(move || handler_signal.store(true, Ordering::SeqCst))?;

    Ok(signal)
}

fn main() -> ExitCode {
    let cancel_signal = match cancel_signal() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to set signal handler: {e}");
            return ExitCode::FAILURE;
        }
    };

    let Err(e) = sdat2img::cli::args::main(&LOGGING_INITIALIZED, &cancel_signal) else {
        return ExitCode::SUCCESS;
    };

    if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
        error!("{e:?}");
    } else {
        eprintln!("{e:?}");
    }

    ExitCode::FAILURE
}
