fn main() {
    if let Err(err) = tabledesk::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
