fn main() {
    env_logger::init();
    if let Err(e) = cc_driver::run_cli() {
        eprintln!("occ: {e}");
        std::process::exit(1);
    }
}
