fn main() {
    println!("cargo:rerun-if-changed=components/bindings.h");
    println!("cargo:rerun-if-changed=sdkconfig.defaults");

    // Host builds (tests, simulation) carry no ESP-IDF environment.
    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
