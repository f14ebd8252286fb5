use clap::Parser;
use pipelog::Args;

fn main() {
    let args = Args::parse();
    std::process::exit(pipelog::run(&args));
}
