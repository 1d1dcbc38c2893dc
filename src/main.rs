fn main() {
    if let Err(err) = demand_summaries::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
