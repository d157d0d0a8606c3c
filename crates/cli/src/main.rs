fn main() {
    leafview_cli::init_tracing();

    if let Err(error) = leafview_cli::run(std::env::args_os()) {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}
