use clap::{Args, Parser, Subcommand};
use tfinstance::shared::logging;
use tfinstance::{DestroyContext, InstanceSpec, TagMap, TfInstance};
use tracing::error;

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(
    name = "tfinstance",
    about = "Turn instance requests into Terraform .tf.json documents and keep shared resources attached.",
    version = APP_VERSION,
    disable_version_flag(true)
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[arg(
        long,
        short = 'c',
        value_name = "PATH",
        help = "Path to the configuration file"
    )]
    pub config: Option<String>,

    #[arg(
        long,
        short = 'd',
        value_name = "PATH",
        help = "Directory holding the .tf.json documents"
    )]
    pub dir: Option<String>,

    #[arg(long, short = 'V', help = "Print version")]
    pub version: bool,
}

#[derive(Args)]
struct SpecArgs {
    #[arg(long, value_name = "FILE", help = "Resource document (JSON)")]
    spec: String,

    #[arg(long = "tag", value_name = "KEY=VALUE", help = "Tag to apply, repeatable")]
    tags: Vec<String>,

    #[arg(long, value_name = "FILE", help = "Init script merged into user data")]
    init: Option<String>,

    #[arg(long, value_name = "ID", help = "Logical ID of the instance")]
    logical_id: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Check a resource document")]
    Validate {
        #[arg(long, value_name = "FILE")]
        spec: String,
    },

    #[command(about = "Stage documents for a new instance and print its ID")]
    Provision(SpecArgs),

    #[command(about = "Remove an instance")]
    Destroy {
        id: String,

        #[arg(long, help = "Keep dedicated and global companions")]
        rolling_update: bool,
    },

    #[command(about = "Merge tags into an instance")]
    Label {
        id: String,

        #[arg(long = "tag", value_name = "KEY=VALUE")]
        tags: Vec<String>,
    },

    #[command(about = "List instances matching all given tags")]
    Describe {
        #[arg(long = "tag", value_name = "KEY=VALUE")]
        tags: Vec<String>,
    },

    #[command(about = "Adopt an existing resource")]
    Import {
        external_id: String,

        #[command(flatten)]
        spec: SpecArgs,
    },

    #[command(about = "Promote staged documents and run terraform apply")]
    Apply,
}

fn parse_tags(raw: &[String]) -> anyhow::Result<TagMap> {
    raw.iter()
        .map(|tag| {
            tag.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow::anyhow!("Invalid tag '{}', expected KEY=VALUE", tag))
        })
        .collect()
}

fn read_spec(args: &SpecArgs) -> anyhow::Result<InstanceSpec> {
    let properties = std::fs::read_to_string(&args.spec)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", args.spec, e))?;
    let init = match &args.init {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path, e))?,
        None => String::new(),
    };
    Ok(InstanceSpec {
        properties,
        tags: parse_tags(&args.tags)?,
        init,
        attachments: Vec::new(),
        logical_id: args.logical_id.clone(),
    })
}

async fn run(cli: &Cli, command: &Commands) -> anyhow::Result<()> {
    let app = TfInstance::new(cli.config.clone(), cli.dir.clone())?;
    match command {
        Commands::Validate { spec } => {
            let properties = std::fs::read_to_string(spec)?;
            app.validate(&properties)?;
            println!("ok");
        }
        Commands::Provision(args) => {
            let spec = read_spec(args)?;
            println!("{}", app.provision(&spec)?);
        }
        Commands::Destroy { id, rolling_update } => {
            let context = if *rolling_update {
                DestroyContext::RollingUpdate
            } else {
                DestroyContext::Termination
            };
            app.destroy(id, context)?;
        }
        Commands::Label { id, tags } => {
            app.label(id, &parse_tags(tags)?)?;
        }
        Commands::Describe { tags } => {
            let found = app.describe(&parse_tags(tags)?)?;
            println!("{}", serde_json::to_string_pretty(&found)?);
        }
        Commands::Import { external_id, spec } => {
            let spec = read_spec(spec)?;
            println!("{}", app.import(external_id, &spec).await?);
        }
        Commands::Apply => {
            print!("{}", app.apply().await?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    logging::init_logging();

    let cli = Cli::parse();

    if cli.version {
        println!("{}", APP_VERSION);
        std::process::exit(0);
    }

    match &cli.command {
        Some(command) => {
            if let Err(e) = run(&cli, command).await {
                error!("{:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("No command specified. Use --help for usage information.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        let tags = parse_tags(&["a=b".to_string(), "c=d=e".to_string()]).unwrap();
        assert_eq!(tags["a"], "b");
        assert_eq!(tags["c"], "d=e");
        assert!(parse_tags(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_cli_parses_destroy() {
        let cli = Cli::parse_from([
            "tfinstance",
            "-d",
            "/tmp/x",
            "destroy",
            "instance-1",
            "--rolling-update",
        ]);
        assert!(matches!(
            cli.command,
            Some(Commands::Destroy { rolling_update: true, .. })
        ));
    }
}
