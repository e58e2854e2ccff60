use clap::Parser;
use odbc_probe::{Cli, init_logging, run};
use odbc_typestate::{OdbcContext, config};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs);

    // Precedence: env > file > defaults
    let builder = if let Some(ref path) = cli.config {
        config::load_config_from_path(path)?
    } else {
        config::load_config()?
    };
    let ctx = OdbcContext::native(builder.build()?);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run(&ctx, &cli.command, &mut out)
}
