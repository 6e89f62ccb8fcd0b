fn main() {
    // ESP-IDF link/sysenv only matters for the device binary; host builds
    // (tests, fuzzing) compile without the toolchain.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
