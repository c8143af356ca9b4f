pub fn run() {
    println!(
        "{} {} (core {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        tickwatch_core::VERSION
    );
}
