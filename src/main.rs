mod cli;
mod style;

fn main() {
    std::process::exit(cli::run_cli());
}
