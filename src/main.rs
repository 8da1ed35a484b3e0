fn main() {
    if let Err(err) = pajgps_home::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
