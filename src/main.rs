use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn, Level};

use typist::capture::{self, Recorder, DEFAULT_STOP_KEY};
use typist::playback::{self, sleep_interruptible, StopSignal};
use typist::predictor::{
    samples_from_error_history, samples_from_keystrokes, DelayPredictor, SharedDelayModel,
};
use typist::model::ErrorRecord;
use typist::profile::{select_profile, DelayProfile, ProfileMap, ProfileStore, DEFAULT_PROFILE};
use typist::sim::{RealtimePacer, Simulator};
use typist::stats::{estimated_end_time, SessionStats};

/// Line that ends interactive text entry.
const END_OF_TEXT: &str = "END";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PlaybackBackendArg {
    Auto,
    X11,
    DryRun,
}

impl PlaybackBackendArg {
    fn to_library(self) -> playback::PlaybackBackend {
        match self {
            PlaybackBackendArg::Auto => playback::PlaybackBackend::Auto,
            PlaybackBackendArg::X11 => playback::PlaybackBackend::X11,
            PlaybackBackendArg::DryRun => playback::PlaybackBackend::DryRun,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "typist")]
#[command(about = "Human-like typing simulator that learns from your keystrokes", long_about = None)]
struct Cli {
    /// Profile store (JSON). Defaults to the platform config directory.
    #[arg(long, global = true, value_name = "PATH")]
    profiles: Option<PathBuf>,

    /// Recorded keystroke file (JSON). Defaults to the platform data directory.
    #[arg(long, global = true, value_name = "PATH")]
    keystrokes: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Without a subcommand, ask which mode to run.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Type text into the focused window like a human would
    Simulate {
        /// Typing style (profile name). Prompted for when omitted.
        #[arg(long, value_name = "NAME")]
        style: Option<String>,

        /// Input text file, or '-' for stdin. Prompted for when omitted.
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Countdown seconds before typing starts
        #[arg(long, default_value_t = 5)]
        countdown: u64,

        /// Playback backend.
        ///
        /// - auto: X11 when DISPLAY is set
        /// - x11: force X11 playback (XTEST)
        /// - dry-run: type into memory and print the result
        #[arg(long, value_enum, default_value_t = PlaybackBackendArg::Auto)]
        backend: PlaybackBackendArg,

        /// Optional RNG seed (for debugging)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Record your own typing and train the delay model on it
    Train {
        /// Key that ends the recording (not recorded)
        #[arg(long, default_value = DEFAULT_STOP_KEY)]
        stop_key: String,
    },

    /// Inspect or edit typing profiles
    Profiles {
        #[command(subcommand)]
        action: ProfilesAction,
    },
}

#[derive(Debug, Subcommand)]
enum ProfilesAction {
    /// List profiles and the size of the error history
    List,

    /// Create or replace a profile
    Set {
        name: String,

        /// Minimum delay between characters, in seconds
        #[arg(long)]
        min: f64,

        /// Maximum delay between characters, in seconds
        #[arg(long)]
        max: f64,

        /// Chance of a typo per character (0.0-1.0)
        #[arg(long)]
        typo_probability: f64,
    },

    /// Delete a profile
    Remove { name: String },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn prompt(message: &str) -> Result<String> {
    print!("{message}");
    io::stdout().flush().context("failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read stdin")?;
    Ok(line.trim().to_string())
}

/// Read lines until one equal to `END` (or end of input).
fn prompt_text() -> Result<String> {
    println!("Enter the text to type. Finish with a line containing only {END_OF_TEXT}:");
    let mut lines = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim() == END_OF_TEXT {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == std::ffi::OsStr::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }

    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn choose_style(profiles: &ProfileMap, requested: Option<String>) -> Result<DelayProfile> {
    let name = match requested {
        Some(name) => name,
        None => {
            let names: Vec<&str> = profiles.keys().map(String::as_str).collect();
            prompt(&format!("Choose a typing style ({}): ", names.join("/")))?
        }
    };

    if !profiles.contains_key(&name) {
        warn!(style = %name, "unknown typing style, falling back to {DEFAULT_PROFILE}");
        eprintln!("Unknown style {name:?}; using {DEFAULT_PROFILE}.");
    }
    select_profile(profiles, &name)
        .cloned()
        .ok_or_else(|| anyhow!("no typing profiles configured"))
}

fn countdown(secs: u64, stop: &StopSignal) -> bool {
    for remaining in (1..=secs).rev() {
        eprintln!("Starting in {remaining}...");
        if !sleep_interruptible(stop, Duration::from_secs(1)) {
            return false;
        }
    }
    true
}

/// Bring the model up to date with everything learned in earlier runs.
fn warm_up_model(
    model: &SharedDelayModel,
    keystrokes: &Path,
    history: &[ErrorRecord],
    profile: &DelayProfile,
    rng: &mut StdRng,
) -> Result<()> {
    if let Some(events) = capture::load_keystrokes(keystrokes)? {
        model.train(&samples_from_keystrokes(&events));
    }
    model.train(&samples_from_error_history(history, profile, rng));
    info!(observed = model.observed(), "delay model ready");
    Ok(())
}

struct Paths {
    store: ProfileStore,
    keystrokes: PathBuf,
}

fn run_simulate(
    paths: &Paths,
    stop: &StopSignal,
    style: Option<String>,
    input: Option<PathBuf>,
    countdown_secs: u64,
    backend: PlaybackBackendArg,
    seed: Option<u64>,
) -> Result<()> {
    // Fail fast on unsupported environments/backends.
    playback::resolve_backend(backend.to_library())?;

    let (profiles, mut history) = paths.store.load()?;
    let profile = choose_style(&profiles, style)?;

    let text = match input {
        Some(path) => read_input(&path)?,
        None => prompt_text()?,
    };
    if text.trim().is_empty() {
        bail!("nothing to type");
    }

    let mut train_rng = rng_from_seed(seed.map(|s| s.wrapping_add(1)));
    let model = SharedDelayModel::default();
    warm_up_model(&model, &paths.keystrokes, &history, &profile, &mut train_rng)?;

    eprintln!(
        "Typing with style {} (delay {:.2}-{:.2}s, typo rate {:.0}%). Estimated end: {}",
        profile.name,
        profile.min_delay(),
        profile.max_delay(),
        profile.typo_probability * 100.0,
        estimated_end_time(&text, &profile).format("%H:%M:%S")
    );
    eprintln!("Focus the target window now. Press Ctrl+C to stop.");
    stop.raise_on_ctrlc()?;
    if !countdown(countdown_secs, stop) {
        eprintln!("Cancelled before typing started.");
        return Ok(());
    }

    let injector = playback::open_injector(backend.to_library())?;
    let mut simulator = Simulator::new(
        injector,
        RealtimePacer::new(stop.clone()),
        model.clone(),
        rng_from_seed(seed),
    );
    let session = simulator.simulate(&text, &profile)?;
    drop(simulator);

    if backend == PlaybackBackendArg::DryRun {
        println!("{}", session.typed_text());
    }
    eprintln!("{}", SessionStats::from_session(&session));

    model.train(&samples_from_error_history(
        session.error_history(),
        &profile,
        &mut train_rng,
    ));
    history.extend_from_slice(session.error_history());
    paths.store.save(&profiles, &history)?;
    Ok(())
}

fn run_train(paths: &Paths, stop: &StopSignal, stop_key: String) -> Result<()> {
    let source = capture::open_key_source()?;
    let recorder = Recorder::new(stop_key, stop.clone());
    stop.raise_on_ctrlc()?;
    eprintln!(
        "Recording keystrokes. Type naturally; press {} to finish.",
        recorder.stop_key()
    );

    let events = recorder.record(source)?;
    if events.is_empty() {
        eprintln!("No keystrokes recorded.");
        return Ok(());
    }
    capture::save_keystrokes(&paths.keystrokes, &events)?;

    // Later `simulate` runs train on the saved file.
    let samples = samples_from_keystrokes(&events);
    eprintln!(
        "Recorded {} keystrokes ({} training samples), saved to {}.",
        events.len(),
        samples.len(),
        paths.keystrokes.display()
    );
    Ok(())
}

fn run_profiles(paths: &Paths, action: ProfilesAction) -> Result<()> {
    let (mut profiles, history) = paths.store.load()?;

    match action {
        ProfilesAction::List => {
            for p in profiles.values() {
                println!(
                    "{:<12} delay {:.3}-{:.3}s  typo {:.3}",
                    p.name,
                    p.min_delay(),
                    p.max_delay(),
                    p.typo_probability
                );
            }
            println!("{} recorded typos in history", history.len());
            return Ok(());
        }
        ProfilesAction::Set {
            name,
            min,
            max,
            typo_probability,
        } => {
            let profile = DelayProfile::new(name.clone(), min, max, typo_probability)?;
            profiles.insert(name, profile);
        }
        ProfilesAction::Remove { name } => {
            if profiles.remove(&name).is_none() {
                bail!("no profile named {name:?}");
            }
            if profiles.is_empty() {
                bail!("refusing to remove the last profile");
            }
        }
    }

    paths.store.save(&profiles, &history)
}

fn choose_mode() -> Result<Command> {
    println!("Choose a mode:");
    println!("  1. Simulate typing");
    println!("  2. Train from your typing");
    match prompt("> ")?.as_str() {
        "1" => Ok(Command::Simulate {
            style: None,
            input: None,
            countdown: 5,
            backend: PlaybackBackendArg::Auto,
            seed: None,
        }),
        "2" => Ok(Command::Train {
            stop_key: DEFAULT_STOP_KEY.to_string(),
        }),
        other => Err(anyhow!("invalid mode {other:?}; expected 1 or 2")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = Paths {
        store: cli
            .profiles
            .map(ProfileStore::with_path)
            .unwrap_or_else(ProfileStore::default_location),
        keystrokes: cli
            .keystrokes
            .unwrap_or_else(capture::default_keystroke_path),
    };

    // Commands install the Ctrl+C handler themselves, after any prompts.
    let stop = StopSignal::new();

    let command = match cli.command {
        Some(command) => command,
        None => choose_mode()?,
    };

    match command {
        Command::Simulate {
            style,
            input,
            countdown,
            backend,
            seed,
        } => run_simulate(&paths, &stop, style, input, countdown, backend, seed),
        Command::Train { stop_key } => run_train(&paths, &stop, stop_key),
        Command::Profiles { action } => run_profiles(&paths, action),
    }
}
