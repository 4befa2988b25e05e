use std::{
    path::{Path, PathBuf},
    sync::mpsc,
    thread,
    time::Duration,
};

use clap::{Parser, Subcommand};
use log::{error, info, warn};
use pitwall::{
    PitwallError, SessionState, StreamEvent, WindowMode,
    live::{LiveTelemetryView, config::AppConfig},
    telemetry::{FrameSource, Pacing, ReplayFileSource, collect_frames},
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recording and follow one driver as a live chart would
    Live {
        #[arg(short, long)]
        input: PathBuf,

        /// Length of the rolling time window in seconds
        #[arg(short, long)]
        window: Option<f64>,

        #[arg(short, long)]
        driver: Option<String>,

        #[arg(short, long, value_enum)]
        mode: Option<WindowMode>,

        /// Playback speed multiplier
        #[arg(short, long)]
        speed: Option<f64>,

        /// Ignore the session clock and replay as fast as possible
        #[arg(long)]
        fast: bool,

        /// Remember driver, mode and window for the next run
        #[arg(long)]
        save_config: bool,
    },
    /// Ingest a whole recording and print the buffered windows of every driver
    Summary {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, value_enum, default_value_t = WindowMode::Lap)]
        mode: WindowMode,

        #[arg(short, long)]
        window: Option<f64>,
    },
}

fn load_config() -> AppConfig {
    match AppConfig::from_local_file() {
        Ok(Some(config)) => config,
        Ok(None) => AppConfig::default(),
        Err(e) => {
            warn!("Ignoring unreadable config file: {}", e);
            AppConfig::default()
        }
    }
}

fn live(
    input: &Path,
    window: Option<f64>,
    driver: Option<String>,
    mode: Option<WindowMode>,
    speed: Option<f64>,
    fast: bool,
    save_config: bool,
) -> Result<(), PitwallError> {
    let mut app_config = load_config();
    if let Some(window) = window {
        app_config.time_window_s = window;
    }
    if driver.is_some() {
        app_config.selected_driver = driver;
    }
    if let Some(mode) = mode {
        app_config.x_mode = mode;
    }
    if let Some(speed) = speed {
        app_config.playback_speed = speed;
    }
    app_config.validate()?;

    let pacing = if fast {
        Pacing::AsFastAsPossible
    } else {
        Pacing::Realtime {
            speed: app_config.playback_speed,
        }
    };

    let (event_tx, event_rx) = mpsc::channel::<StreamEvent>();
    let source = ReplayFileSource::new(input.to_path_buf());
    let producer = thread::spawn(move || collect_frames(source, event_tx, pacing));

    let mut view = LiveTelemetryView::new(event_rx, &app_config);
    let refresh = Duration::from_millis(app_config.refresh_rate_ms);
    let mut last_line = String::new();
    while !view.is_stream_closed() {
        view.update();
        let line = view.status_line();
        if line != last_line {
            info!("{}", line);
            last_line = line;
        }
        thread::sleep(refresh);
    }

    match producer.join() {
        Ok(result) => result?,
        Err(_) => error!("Replay thread panicked"),
    }

    if save_config {
        app_config.selected_driver = view.selector().selected().map(str::to_string);
        app_config.x_mode = view.mode();
        app_config.save()?;
    }
    Ok(())
}

fn summary(input: &Path, mode: WindowMode, window: Option<f64>) -> Result<(), PitwallError> {
    let mut session = SessionState::new(load_config().resolve_time_window(window)?);
    let mut source = ReplayFileSource::new(input.to_path_buf());
    source.start()?;

    let mut frames = 0;
    while let Some(event) = source.next_event()? {
        if let StreamEvent::Message(message) = event
            && let Some(frame) = message.to_frame()
        {
            session.ingest(&frame);
            frames += 1;
        }
    }

    println!(
        "{} frames, {} drivers, circuit length {}",
        frames,
        session.competitor_codes().len(),
        session
            .circuit_length_m()
            .map_or("unknown".to_string(), |len| format!("{:.1}m", len))
    );
    for code in session.competitor_codes() {
        let snapshot = session.query(code, mode);
        let last_lap = session
            .competitor(code)
            .and_then(|c| c.last_completed_lap_length_m)
            .map_or("-".to_string(), |len| format!("{:.1}m", len));
        println!(
            "{:>4}: {:>5} samples, x {:.1}..{:.1}, last lap {}",
            code,
            snapshot.trace.len(),
            snapshot.extent.min,
            snapshot.extent.max,
            last_lap
        );
    }
    if source.skipped_lines() > 0 {
        warn!("Skipped {} malformed lines", source.skipped_lines());
    }
    Ok(())
}

fn main() {
    colog::init();

    let cli = Args::parse();
    ctrlc::set_handler(move || {
        println!("Exiting...");
        std::process::exit(0);
    })
    .expect("Could not set Ctrl-C handler");
    match cli.command {
        Commands::Live {
            input,
            window,
            driver,
            mode,
            speed,
            fast,
            save_config,
        } => live(&input, window, driver, mode, speed, fast, save_config)
            .expect("Error while replaying telemetry"),
        Commands::Summary {
            input,
            mode,
            window,
        } => summary(&input, mode, window).expect("Error while summarizing telemetry"),
    };
}
