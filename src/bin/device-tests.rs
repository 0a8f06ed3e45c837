//! Runs every `#[tap_test]` and prints TAP to the console.
//!
//! ```bash
//! # Host, against the simulated chip
//! cargo run --bin device-tests --features tap-tests
//!
//! # ESP32, output over the USB serial console
//! cargo espflash flash --bin device-tests --features tap-tests,esp32 --release --monitor
//! ```
//!
//! Exit status on the host is 0 when every test passed. On the ESP32 the
//! runner parks after the summary so the console stays readable.

use cc110x_rs::testing;

#[cfg(feature = "esp32")]
fn init_logging() {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
}

#[cfg(not(feature = "esp32"))]
fn init_logging() {
    // Quiet by default: log lines would interleave with TAP output.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();
}

fn main() {
    init_logging();
    let success = testing::run_all_tests();

    #[cfg(feature = "esp32")]
    {
        log::info!("device tests finished: {}", if success { "PASS" } else { "FAIL" });
        loop {
            std::thread::park();
        }
    }

    #[cfg(not(feature = "esp32"))]
    std::process::exit(i32::from(!success));
}
