fn main() {
    // ESP-IDF link arguments are only needed for firmware builds; host test
    // builds of the same crate skip them.
    let espidf_target = std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf");
    let esp32_feature = std::env::var_os("CARGO_FEATURE_ESP32").is_some();

    if espidf_target && esp32_feature {
        embuild::espidf::sysenv::output();
    }
}
