//! Inspect the bundled device definitions.
//!
//! Usage:
//!   zigbee-definitions list --vendor Gledopto
//!   zigbee-definitions show GL-C-008P
//!   zigbee-definitions resolve device.json
//!   zigbee-definitions configure SMRZB-143 --endpoint 2
//!   zigbee-definitions check

use clap::{Parser, Subcommand};
use log::{error, info};
use serde_json::json;
use std::path::PathBuf;
use zigbee_definitions::config::load_dotenv;
use zigbee_definitions::radio::{DeviceInfo, EndpointInfo, RecordingDevice, RecordingEndpoint};
use zigbee_definitions::{Cluster, Config, Context, MatchPolicy, Registry, devices};

/// Clusters given to every endpoint of a dry-run device.
const DRY_RUN_CLUSTERS: &[Cluster] = &[
    Cluster::GenBasic,
    Cluster::GenOnOff,
    Cluster::GenLevelCtrl,
    Cluster::GenDeviceTempCfg,
    Cluster::LightingColorCtrl,
    Cluster::HaElectricalMeasurement,
    Cluster::SeMetering,
];

#[derive(Parser)]
#[command(name = "zigbee-definitions")]
#[command(about = "Inspect and dry-run the bundled Zigbee device definitions")]
struct Cli {
    /// How overlapping fingerprints are resolved
    #[arg(long, env = "ZIGBEE_DEFINITIONS_MATCH_POLICY")]
    policy: Option<MatchPolicy>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every bundled definition
    List {
        /// Only list definitions of this vendor
        #[arg(long)]
        vendor: Option<String>,
    },
    /// Print the exposes and converters of a model
    Show {
        model: String,
    },
    /// Match an interviewed device (JSON) against the registry
    Resolve {
        device: PathBuf,
    },
    /// Run a model's configure against a recording device and print the radio calls
    Configure {
        model: String,

        /// Endpoints of the simulated device
        #[arg(long = "endpoint", default_values_t = [1u8])]
        endpoints: Vec<u8>,
    },
    /// Validate every bundled definition
    Check,
}

fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();
    init_logger();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    if let Some(policy) = cli.policy {
        config.registry.match_policy = policy;
    }

    match cli.command {
        Commands::List { vendor } => {
            let registry = Registry::with_bundled(config.registry.match_policy)?;
            for definition in registry.iter() {
                if vendor
                    .as_deref()
                    .is_some_and(|v| !definition.vendor.eq_ignore_ascii_case(v))
                {
                    continue;
                }
                println!("{}\t{}\t{}", definition.model, definition.vendor, definition.description);
            }
        }
        Commands::Show { model } => {
            let registry = Registry::with_bundled(config.registry.match_policy)?;
            let Some(resolved) = registry.find_by_name(&model) else {
                error!("Unknown model '{}'", model);
                std::process::exit(1);
            };
            let definition = &resolved.definition;
            let summary = json!({
                "model": resolved.model(),
                "vendor": resolved.vendor(),
                "description": resolved.description(),
                "zigbeeModel": definition.zigbee_model,
                "fingerprint": definition.fingerprint,
                "exposes": definition.exposes,
                "fromZigbee": definition.from_zigbee.ids(),
                "toZigbee": definition.to_zigbee.ids(),
                "configure": definition.configure.is_some(),
                "onEvent": definition.on_event.is_some(),
                "meta": definition.meta,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Resolve { device } => {
            let registry = Registry::with_bundled(config.registry.match_policy)?;
            let content = std::fs::read_to_string(&device)?;
            let info: DeviceInfo = serde_json::from_str(&content)?;
            match registry.find_by_device(&info) {
                Some(resolved) => println!("{} ({})", resolved.model(), resolved.vendor()),
                None => {
                    error!("No definition matches {}", device.display());
                    std::process::exit(1);
                }
            }
        }
        Commands::Configure { model, endpoints } => {
            let registry = Registry::with_bundled(config.registry.match_policy)?;
            let Some(resolved) = registry.find_by_name(&model) else {
                error!("Unknown model '{}'", model);
                std::process::exit(1);
            };

            let mut info = DeviceInfo::new("0x0000000000000001");
            if let Some(model_id) = resolved.definition.zigbee_model.first() {
                info = info.with_model_id(model_id.clone());
            }
            for id in endpoints {
                info = info.with_endpoint(EndpointInfo::new(id).with_input_clusters(DRY_RUN_CLUSTERS));
            }
            let device = RecordingDevice::new(info);
            let coordinator = RecordingEndpoint::coordinator();
            let context = Context::new(config);

            info!("Configuring {} against a recording device", resolved.model());
            resolved
                .definition
                .run_configure(&device, &coordinator, &context)
                .await?;

            let calls: Vec<_> = device
                .calls()
                .into_iter()
                .map(|(endpoint, call)| json!({"endpoint": endpoint, "call": call}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&calls)?);
        }
        Commands::Check => {
            let mut registry = Registry::new(config.registry.match_policy);
            let mut failures = 0;
            for definition in devices::all_definitions()? {
                let model = definition.model.clone();
                if let Err(e) = registry.add(definition) {
                    error!("{}: {}", model, e);
                    failures += 1;
                }
            }
            info!("{} definitions valid, {} invalid", registry.len(), failures);
            if failures > 0 {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
