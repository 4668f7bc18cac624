use clap::Parser;
use inventory_admin::{cli::Cli, run};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // The runtime size comes from config, so it is read before the runtime exists.
    let config = cli.load_config()?;

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all().thread_name("inventory-worker");

    match config.general.worker_threads {
        0 => {}
        n => {
            builder.worker_threads(n);
        }
    }

    builder.build()?.block_on(run(cli, config))
}
