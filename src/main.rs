use schemalift::cli;

fn main() -> anyhow::Result<()> {
    // Default to warnings; RUST_LOG overrides.
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    let command_line_interface = cli::CommandLineInterface::load();
    command_line_interface.run()
}
