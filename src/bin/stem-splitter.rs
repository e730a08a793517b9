use clap::{Args, Parser, Subcommand};
use stem_splitter_ui::{
    ensure_model, model::registry::registry, serve, set_download_progress_callback, AppState,
    AudioSource, Device, ModelCache, OnnxBackend, Separator, Settings, SplitProgress, StemConfig,
    YtDlp,
};
use std::{
    path::{Path, PathBuf},
    process,
    sync::Arc,
};
use tracing::error;

#[derive(Parser)]
#[command(name = "stem-splitter")]
#[command(about = "AI-powered audio stem separation with a local web UI", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true, env = "STEM_SPLITTER_CONFIG", default_value = "stem-splitter.toml")]
    config: PathBuf,

    /// Inference device (auto, cpu or cuda)
    #[arg(long, global = true)]
    device: Option<Device>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the web UI
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },

    /// Split one file or URL from the command line
    Split(SplitArgs),

    /// Download and verify model weights
    Prepare {
        #[arg(short, long, default_value = "htdemucs")]
        model: String,

        #[arg(long)]
        manifest_url: Option<String>,

        #[arg(short, long)]
        quiet: bool,
    },

    /// List available models
    List,
}

#[derive(Args)]
struct SplitArgs {
    #[arg(short, long, conflicts_with = "url", required_unless_present = "url")]
    input: Option<PathBuf>,

    #[arg(short, long)]
    url: Option<String>,

    /// Number of stems: 2, 4 or 6
    #[arg(short, long, default_value_t = 4)]
    stems: usize,

    /// Copy the stems here instead of leaving them in the temp dir
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut settings = Settings::load_or_default(&cli.config);
    if let Some(device) = cli.device {
        settings.device = device;
    }

    let result = match cli.command {
        Commands::Serve { host, port } => handle_serve(settings, host, port),
        Commands::Split(args) => handle_split(settings, args),
        Commands::Prepare {
            model,
            manifest_url,
            quiet,
        } => handle_prepare(&settings, model, manifest_url, quiet),
        Commands::List => handle_list(),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn separator(settings: &Settings) -> Separator {
    let backend = OnnxBackend::new(settings.models.clone(), settings.device);
    Separator::new(ModelCache::new(Arc::new(backend)))
}

fn handle_serve(
    mut settings: Settings,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    setup_download_progress();
    let downloader = Arc::new(YtDlp::new(settings.ytdlp.clone()));
    let state = AppState::new(separator(&settings), downloader, settings);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(state))?;
    Ok(())
}

fn handle_split(settings: Settings, args: SplitArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = StemConfig::from_count(args.stems)?;
    let source = match (args.input, args.url) {
        (Some(input), _) => {
            if !input.exists() {
                return Err(format!("Input file not found: {}", input.display()).into());
            }
            AudioSource::Upload(input)
        }
        (None, Some(url)) => AudioSource::Remote(url),
        (None, None) => return Err("either --input or --url is required".into()),
    };

    if !args.quiet {
        setup_download_progress();
        eprintln!("🎵 Stem Splitter");
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        eprintln!("Stems:  {}", config.label);
        eprintln!("Model:  {}", config.model);
        eprintln!("Device: {}", settings.device);
        eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let downloader = YtDlp::new(settings.ytdlp.clone());
    let path = source.resolve(&downloader, &settings.download_dir)?;

    let quiet = args.quiet;
    let report = move |p: SplitProgress| {
        if !quiet {
            print_progress(p);
        }
    };
    let mut stems = separator(&settings).separate(Some(&path), config, &report)?;

    if let Some(out) = &args.output {
        std::fs::create_dir_all(out)?;
        let base = path.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
        for stem in &mut stems {
            let dst = out.join(format!("{base}_{}.wav", stem.name));
            copy_to(&stem.path, &dst)?;
            stem.path = dst;
        }
    }

    if !args.quiet {
        eprintln!();
        eprintln!("✅ Split completed successfully!");
        eprintln!();
        eprintln!("Output files:");
        for stem in &stems {
            eprintln!("  {:<13} {}", format!("{}:", stem.name), stem.path.display());
        }
    } else {
        for stem in &stems {
            println!("{}", stem.path.display());
        }
    }

    Ok(())
}

fn handle_prepare(
    settings: &Settings,
    model: String,
    manifest_url: Option<String>,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if !quiet {
        eprintln!("📦 Preparing model: {}", model);
        eprintln!();
        setup_download_progress();
    }

    let manifest_url = manifest_url.or_else(|| settings.models.get(&model).cloned());
    let files = ensure_model(&model, manifest_url.as_deref())?;

    if !quiet {
        eprintln!("✅ Model prepared successfully!");
        eprintln!("   {} ({} stems: {})", files.local_path.display(), files.manifest.stems.len(), files.manifest.stems.join(", "));
    }

    Ok(())
}

fn handle_list() -> Result<(), Box<dyn std::error::Error>> {
    let registry = registry()?;

    eprintln!("📋 Available Models");
    eprintln!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    for model in &registry.models {
        let marker = if model.name == registry.default { " (default)" } else { "" };
        eprintln!("  • {}{}", model.name, marker);
    }

    eprintln!();
    eprintln!("Stem configurations:");
    for config in StemConfig::all() {
        eprintln!("  • {} → {}", config.label, config.model);
    }

    Ok(())
}

fn copy_to(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::copy(src, dst).map(|_| ())
}

fn setup_download_progress() {
    set_download_progress_callback(|downloaded, total| {
        if total > 0 {
            let percent = (downloaded as f64 / total as f64 * 100.0).round() as u64;
            let downloaded_mb = downloaded as f64 / 1_000_000.0;
            let total_mb = total as f64 / 1_000_000.0;
            eprint!(
                "\r📥 Downloading model: {:>3}% ({:.2} MB / {:.2} MB)",
                percent, downloaded_mb, total_mb
            );
            if downloaded >= total {
                eprintln!();
            }
        } else {
            eprint!("\r📥 Downloading model: {:.2} MB", downloaded as f64 / 1_000_000.0);
        }
    });
}

fn print_progress(progress: SplitProgress) {
    match progress {
        SplitProgress::Stage(stage) => {
            let stage_name = match stage {
                "resolve_model" => "Loading model",
                "read_audio" => "Reading audio file",
                "infer" => "Processing audio",
                "write_stems" => "Writing stems",
                _ => stage,
            };
            eprintln!("⏳ {}", stage_name);
        }
        SplitProgress::Chunks {
            done,
            total,
            percent,
        } => {
            eprint!("\r🔄 Processing: {}/{} chunks ({:.0}%)", done, total, percent);
            if done >= total {
                eprintln!();
            }
        }
        SplitProgress::Writing { stem, done, total } => {
            eprintln!("💾 Wrote {} ({}/{})", stem, done, total);
        }
        SplitProgress::Finished => {}
    }
}
