#![cfg(not(target_arch = "wasm32"))]

use std::backtrace::Backtrace;
use std::fs::File;
use std::io::Write;
use std::panic;

use log::{error, info};

const CRASH_LOG: &str = "yard_crash.log";

fn main() {
    yard_gfx::init_logging();
    install_panic_hook();

    info!("starting yard viewer (native)");

    if let Err(e) = panic::catch_unwind(yard_gfx::run_native) {
        error!("viewer terminated abruptly: {:?}", e);
        std::process::exit(1);
    }
}

/// Prints the panic with a backtrace and keeps a copy on disk.
fn install_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        let backtrace = Backtrace::force_capture();

        let msg = match panic_info.payload().downcast_ref::<&'static str>() {
            Some(s) => *s,
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => &s[..],
                None => "Box<dyn Any>",
            },
        };

        let location = panic_info
            .location()
            .map_or("unknown location".to_string(), |loc| format!("{}:{}", loc.file(), loc.line()));

        let crash_msg = format!(
            "=== VIEWER CRASH ===\nReason: {msg}\nLocation: {location}\n\nStack Trace:\n{backtrace}"
        );

        eprintln!("\x1b[31;1m{crash_msg}\x1b[0m");

        if let Ok(mut file) = File::create(CRASH_LOG) {
            let _ = file.write_all(crash_msg.as_bytes());
            eprintln!("crash report saved to {CRASH_LOG}");
        }
    }));
}
