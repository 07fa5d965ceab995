fn main() {
    if let Err(err) = qrc_loader::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
