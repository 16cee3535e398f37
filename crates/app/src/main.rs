use std::{path::PathBuf, process::ExitCode};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use showloop_core::{
    Category, FilePin, IoPins, MemoryPin, Orchestrator, PlaybackEngine, RunOutcome, SelectionMode,
    ShowConfig, SimClock, SimulatedEngine, TickClock,
};
use tracing_subscriber::EnvFilter;

/// Duration reported by the simulated player for every video.
const SIMULATED_DURATION: f64 = 30.0;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => run_show(&args),
        Commands::Config(args) => print_config(&args).map(|()| ExitCode::SUCCESS),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(%err, "showloop failed");
            ExitCode::from(2)
        }
    }
}

fn run_show(args: &RunArgs) -> showloop_core::Result<ExitCode> {
    let config = load_config(args)?;
    tracing::info!(
        idle = config.playlists.idle.videos.len(),
        countdown = config.playlists.countdown.videos.len(),
        applause = config.playlists.applause.videos.len(),
        simulate = args.simulate,
        "starting show"
    );

    let pins = build_pins(&config, args)?;
    let mut clock = TickClock::from_secs(config.tick_period);
    let outcome = if args.simulate {
        let engine = SimulatedEngine::new(SimClock::wall(), SIMULATED_DURATION);
        drive(config, engine, pins, &mut clock)
    } else {
        drive(config, mpv_engine(args)?, pins, &mut clock)
    };

    Ok(match outcome {
        RunOutcome::Clean => ExitCode::SUCCESS,
        RunOutcome::IdleFailure | RunOutcome::StateFault => ExitCode::from(1),
    })
}

fn drive<E: PlaybackEngine>(config: ShowConfig, engine: E, pins: IoPins, clock: &mut TickClock) -> RunOutcome {
    let mut show = Orchestrator::new(config, engine, pins);
    show.run(clock)
}

#[cfg(unix)]
fn mpv_engine(args: &RunArgs) -> showloop_core::Result<showloop_core::MpvEngine> {
    Ok(showloop_core::MpvEngine::new(args.mpv.clone(), std::env::temp_dir())
        .with_args(args.mpv_args.clone()))
}

#[cfg(not(unix))]
fn mpv_engine(_args: &RunArgs) -> showloop_core::Result<SimulatedEngine> {
    Err(showloop_core::ShowloopError::msg("the mpv backend needs a unix platform, use --simulate"))
}

fn build_pins(config: &ShowConfig, args: &RunArgs) -> showloop_core::Result<IoPins> {
    let root = match (&args.gpio_root, args.simulate) {
        (Some(root), _) => root.clone(),
        (None, true) => {
            tracing::warn!("simulating without --gpio-root, buttons are inert");
            return Ok(IoPins::new(MemoryPin::new(), MemoryPin::new(), MemoryPin::new()));
        }
        (None, false) => config.gpio.sysfs_root.clone(),
    };
    let gpio = &config.gpio;
    Ok(IoPins::new(
        FilePin::sysfs(&root, gpio.trigger_pin, false, gpio.active_low_inputs)?,
        FilePin::sysfs(&root, gpio.exit_pin, false, gpio.active_low_inputs)?,
        FilePin::sysfs(&root, gpio.signal_pin, true, false)?,
    ))
}

fn print_config(args: &RunArgs) -> showloop_core::Result<()> {
    let config = load_config(args)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Defaults, then the configuration file, then command line flags.
fn load_config(args: &RunArgs) -> showloop_core::Result<ShowConfig> {
    let mut config = match &args.config {
        Some(path) => ShowConfig::load(path)?,
        None => match ShowConfig::user_config_path().filter(|path| path.is_file()) {
            Some(path) => {
                tracing::info!(path = %path.display(), "using user configuration");
                ShowConfig::load(&path)?
            }
            None => ShowConfig::default(),
        },
    };

    for (category, videos) in [
        (Category::Idle, &args.idle),
        (Category::Countdown, &args.countdown),
        (Category::Applause, &args.applause),
    ] {
        if !videos.is_empty() {
            config.playlists.get_mut(category).videos = resolve_paths(videos);
        }
    }
    for category in &args.random {
        config.playlists.get_mut(Category::from(*category)).mode = SelectionMode::Random;
    }
    if let Some(seconds) = args.fade {
        config.set_all_fade_times(seconds);
    }
    if let Some(period) = args.tick_period {
        config.tick_period = period;
    }
    if let Some(offset) = args.signal_on {
        config.signal.on_offset = offset;
    }
    if let Some(offset) = args.signal_off {
        config.signal.off_offset = offset;
    }

    config.validate()?;
    Ok(config)
}

/// Follows symbolic links; paths that do not resolve are kept as given so
/// the slot reports them when they come up.
fn resolve_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .map(|path| std::fs::canonicalize(path).unwrap_or_else(|_| path.clone()))
        .collect()
}

fn init_tracing(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Dual-slot video installation player", long_about = None)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the show until the exit button is pressed.
    Run(RunArgs),
    /// Print the effective configuration as JSON and exit.
    Config(RunArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// JSON configuration file; defaults to ~/.config/showloop.json.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Idle videos, played in a loop.
    #[arg(long, num_args = 1.., value_name = "VIDEO")]
    idle: Vec<PathBuf>,
    /// Countdown videos, started by the trigger button.
    #[arg(long, num_args = 1.., value_name = "VIDEO")]
    countdown: Vec<PathBuf>,
    /// Applause videos, played after a countdown.
    #[arg(long, num_args = 1.., value_name = "VIDEO")]
    applause: Vec<PathBuf>,
    /// Pick videos of this category at random (repeatable).
    #[arg(long, value_enum)]
    random: Vec<CategoryArg>,
    /// Fade in and fade out time for every category, in seconds.
    #[arg(long)]
    fade: Option<f64>,
    /// Poll loop period in seconds.
    #[arg(long)]
    tick_period: Option<f64>,
    /// Seconds before the countdown ends at which the signal output turns on.
    #[arg(long)]
    signal_on: Option<f64>,
    /// Seconds before the countdown ends at which the signal output turns off.
    #[arg(long)]
    signal_off: Option<f64>,
    /// Use the in-process simulated player instead of mpv.
    #[arg(long)]
    simulate: bool,
    /// Path of the mpv binary.
    #[arg(long, default_value = "mpv")]
    mpv: PathBuf,
    /// Extra argument passed to every mpv player (repeatable).
    #[arg(long = "mpv-arg", value_name = "ARG", allow_hyphen_values = true)]
    mpv_args: Vec<String>,
    /// Root of the sysfs GPIO tree, overriding the configuration.
    #[arg(long)]
    gpio_root: Option<PathBuf>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CategoryArg {
    Idle,
    Countdown,
    Applause,
}

impl From<CategoryArg> for Category {
    fn from(value: CategoryArg) -> Self {
        match value {
            CategoryArg::Idle => Category::Idle,
            CategoryArg::Countdown => Category::Countdown,
            CategoryArg::Applause => Category::Applause,
        }
    }
}
