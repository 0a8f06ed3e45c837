fn main() {
    println!("cargo:rerun-if-env-changed=TARGET");

    // ESP-IDF link arguments are only emitted for the Xtensa firmware build;
    // host builds (simulator, unit tests) skip the IDF toolchain entirely.
    let target = std::env::var("TARGET").unwrap_or_default();
    if target.starts_with("xtensa-esp32") {
        embuild::espidf::sysenv::output();
    }
}
