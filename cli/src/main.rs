use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use pdc_cli::logging::init_logging;
use pdc_cli::request::{request, RequestKind};
use pdc_cli::serve::{serve, DeviceSource, ServeConfig, DEFAULT_SETTINGS};
use pdc_core::concentrator::ConcentratorSettings;

#[derive(Debug, Parser)]
#[command(name = "pdc", version, about = "IEEE C37.118 phasor data concentrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Publish a concentrator output stream
    Serve {
        /// Address of the command channel listener
        #[arg(long, default_value = "127.0.0.1:4712")]
        bind: String,

        /// Connection string of concentrator settings
        #[arg(long, env = "PDC_SETTINGS", default_value = DEFAULT_SETTINGS)]
        settings: String,

        /// JSON file of device descriptors
        #[arg(long, conflicts_with = "random_devices")]
        devices: Option<PathBuf>,

        /// Number of simulated stations when no device file is given
        #[arg(long, default_value_t = 4)]
        random_devices: usize,

        /// Write hourly log files here instead of stderr
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },
    /// Send one command to a concentrator and print the reply
    Request {
        /// Address of the concentrator's command channel
        #[arg(long, default_value = "127.0.0.1:4712")]
        address: String,

        /// Stream ID code of the concentrator
        #[arg(long, default_value_t = 235)]
        id_code: u16,

        #[arg(value_enum)]
        kind: RequestKind,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            bind,
            settings,
            devices,
            random_devices,
            log_dir,
        } => {
            let _guard = init_logging(log_dir.as_deref(), None)?;
            let settings = ConcentratorSettings::from_connection_string(&settings)?;
            let devices = match devices {
                Some(path) => DeviceSource::File(path),
                None => DeviceSource::Random(random_devices),
            };
            serve(ServeConfig {
                bind,
                settings,
                devices,
            })
            .await
        }
        Command::Request {
            address,
            id_code,
            kind,
        } => {
            let _guard = init_logging(None, Some("warn"))?;
            let reply = request(&address, id_code, kind).await?;
            println!("{}", reply);
            Ok(())
        }
    }
}
