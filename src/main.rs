fn main() {
    if let Err(e) = talkback_lib::run() {
        log::error!("{:#}", e);
        eprintln!("talkback: {:#}", e);
        std::process::exit(1);
    }
}
