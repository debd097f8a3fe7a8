use std::{io::stdout, path::PathBuf};

use clap::{Parser, Subcommand};
use eyre::Result;
use tracing_subscriber::{
    EnvFilter,
    fmt::{layer, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

mod plot;

#[derive(Parser)]
#[command(about = "Plot storage engine throughput results")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    /// Yaml config, the put/get/scan memtable workload is used if omitted
    #[arg(short, long)]
    config_file: Option<PathBuf>,
    /// Directory the result files are read from
    #[arg(long)]
    input_dir: Option<PathBuf>,
    /// Directory the images are written to
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(short, long)]
    log: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one chart per operation type (default)
    Plot {
        /// Stop at the first operation that fails
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
    },
    /// List operations, their variants and result files
    Ls,
    /// Print the chart specifications as json without rendering
    Print,
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or("warn".to_owned());
    let args = Cli::parse();
    let file_appender = tracing_appender::rolling::never(".", "plot.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let mut env_filter = EnvFilter::new(format!("throughput_plots={log_level}"));
    for module in ["common", "throughput_plot"] {
        if !args.log.iter().any(|x| x.starts_with(module)) {
            env_filter = env_filter.add_directive(format!("{module}={log_level}").parse()?);
        }
    }
    for log in &args.log {
        env_filter = env_filter.add_directive(log.parse()?);
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            layer()
                .with_writer(std::io::stderr)
                .with_timer(ChronoLocal::new("%v %k:%M:%S %z".to_owned()))
                .compact(),
        )
        .with(layer().with_writer(non_blocking))
        .init();

    let config =
        plot::load_config(args.config_file.as_deref(), args.input_dir, args.output_dir).await?;

    let mut out = stdout();
    match args.command.unwrap_or(Commands::Plot { fail_fast: false }) {
        Commands::Plot { fail_fast } => plot::plot_all(config, fail_fast, &mut out).await?,
        Commands::Ls => plot::list_operations(&config, &mut out)?,
        Commands::Print => plot::print_charts(&config, &mut out)?,
    };

    Ok(())
}
