mod cli;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use vc_av::encoder::{AttemptPaths, EncoderBackend, Vp9Encoder};
use vc_av::ToolRegistry;
use vc_core::config::Config;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults from --verbose.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidconvert=trace,vc_server=trace,vc_av=trace,vc_core=debug,tower_http=debug".to_string()
        } else {
            "vidconvert=info,vc_server=debug,vc_av=debug,vc_core=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt().with_env_filter(&env_filter).init();

    match cli.command {
        Commands::Serve { host, port } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            tracing::info!("Starting vidconvert {}", env!("CARGO_PKG_VERSION"));
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(vc_server::start(config))?;
            Ok(())
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => validate_config(config_path.or(cli.config)),
        Commands::Plan { settings } => show_plan(&settings),
        Commands::Version => {
            println!("vidconvert {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in tools.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Conversions will fail until they are installed.");
    }
    Ok(())
}

fn validate_config(path: Option<PathBuf>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(&p)
                .with_context(|| format!("reading {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Uploads: {}", config.storage.upload_dir.display());
    println!("  Outputs: {}", config.storage.output_dir.display());
    println!("  Fallback encoder: {}", config.conversion.fallback_enabled);
    match config.storage.retention_secs {
        Some(secs) => println!("  Retention: {secs}s"),
        None => println!("  Retention: keep until restart"),
    }
    for warning in config.validate() {
        println!("  ⚠ {warning}");
    }
    Ok(())
}

fn show_plan(settings: &str) -> Result<()> {
    let plan = vc_core::settings::resolve_json(settings)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);

    let paths = AttemptPaths {
        input: Path::new("<input>"),
        output: Path::new("<output>.webm"),
        passlog_prefix: Path::new("<passlog>"),
    };
    let backend = Vp9Encoder;
    println!("\n{}:", backend.name());
    for inv in backend.invocations(&plan, paths) {
        println!("  [{}] {} {}", inv.label, backend.tool(), inv.args.join(" "));
    }
    Ok(())
}
