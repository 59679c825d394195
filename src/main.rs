fn main() {
    if let Err(err) = report_intake::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
