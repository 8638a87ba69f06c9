use std::{
    fs::File,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    thread,
};

use clap::{Parser, Subcommand};
use gridcast::{
    Command, IdleReaper, JsonlTelemetryProducer, ReplayConfig, ReplayError, ReplayEvent,
    ReplaySession, SessionKey, TelemetryProducer, writer,
};
use log::{error, info, warn};
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Args {
    /// Replay config file, defaults to the one in the user's config directory
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a recorded session, streaming events as JSON lines. Transport
    /// commands are read as JSON lines from stdin.
    Replay {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        year: u16,
        #[arg(short, long)]
        round: u16,
        #[arg(short, long, default_value = "R")]
        session: String,
        /// Replay this driver's qualifying lap instead of the whole session
        #[arg(short, long)]
        driver: Option<String>,
        #[arg(long, default_value = "Q3")]
        segment: String,
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        #[arg(long, default_value_t = 0)]
        start_frame: i64,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print what a recorded session contains without replaying it
    Inspect {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        year: u16,
        #[arg(short, long)]
        round: u16,
        #[arg(short, long, default_value = "R")]
        session: String,
    },
    /// List the rounds a recording holds for one season
    Schedule {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        year: u16,
    },
    /// Write the effective replay config, to the user's config directory by default
    Config {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn read_config(path: Option<&Path>) -> Result<ReplayConfig, ReplayError> {
    match path {
        Some(path) => ReplayConfig::from_file(path),
        None => Ok(ReplayConfig::from_local_file()?.unwrap_or_default()),
    }
}

/// Forwards JSON command lines from stdin to the session
fn spawn_command_reader(session: ReplaySession, handle: &tokio::runtime::Handle) {
    let (tx, mut rx) = mpsc::channel::<Command>(16);

    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Command>(&line) {
                Ok(command) => {
                    if tx.blocking_send(command).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Ignoring invalid command {:?}: {}", line, e),
            }
        }
    });

    handle.spawn(async move {
        while let Some(command) = rx.recv().await {
            // Rejections are already reported to viewers
            let _ = session.handle_command(command).await;
        }
    });
}

/// Which replay to load into the session
enum Source<'a> {
    Race,
    QualifyingLap { driver: &'a str, segment: &'a str },
}

async fn load_session(
    session: &ReplaySession,
    input: &Path,
    key: &SessionKey,
    source: Source<'_>,
) -> Result<(), ReplayError> {
    let mut producer = JsonlTelemetryProducer::from_file(input)?;
    match source {
        Source::Race => session.load_race(&mut producer, key).await,
        Source::QualifyingLap { driver, segment } => {
            session
                .load_qualifying_lap(&mut producer, key, driver, segment)
                .await
        }
    }
}

async fn replay(
    config: ReplayConfig,
    input: &Path,
    key: &SessionKey,
    source: Source<'_>,
    speed: f64,
    start_frame: i64,
    output: Option<PathBuf>,
) -> Result<(), ReplayError> {
    let session = ReplaySession::new(config);
    load_session(&session, input, key, source).await?;
    let reaper = IdleReaper::spawn(session.clone());

    let viewer = session.connect().await;
    session.set_speed(speed).await?;
    if start_frame != 0 {
        session.seek(start_frame).await?;
    }
    spawn_command_reader(session.clone(), &tokio::runtime::Handle::current());

    let out: Box<dyn Write + Send> = match output {
        Some(path) => {
            Box::new(File::create(&path).map_err(|e| ReplayError::WriterError { source: e })?)
        }
        None => Box::new(io::stdout()),
    };
    let writer_thread = thread::spawn(move || writer::write_events(viewer, out));

    session.play().await?;
    let written = match tokio::task::spawn_blocking(move || writer_thread.join()).await {
        Ok(Ok(result)) => result?,
        _ => {
            error!("Event writer stopped unexpectedly");
            0
        }
    };
    info!("Wrote {} replay events", written);

    reaper.stop().await;
    Ok(())
}

fn print_qualifying_results(input: &Path, key: &SessionKey) -> Result<(), ReplayError> {
    let mut producer = JsonlTelemetryProducer::from_file(input)?;
    let (meta, _) = producer.session_info(key)?;
    println!("{} qualifying, {} round {}", meta.event_name, meta.year, meta.round);

    let format_time = |time: Option<f64>| time.map_or("-".to_string(), |t| format!("{:.3}", t));
    for result in producer.qualifying_results(key.year, key.round)? {
        println!(
            "{:>2} {:<4} {:>9} {:>9} {:>9}",
            result.position,
            result.driver,
            format_time(result.q1),
            format_time(result.q2),
            format_time(result.q3)
        );
    }
    Ok(())
}

async fn inspect(config: ReplayConfig, input: &Path, key: &SessionKey) -> Result<(), ReplayError> {
    let session = ReplaySession::new(config);
    load_session(&session, input, key, Source::Race).await?;

    let mut viewer = session.connect().await;
    if let Some(ReplayEvent::InitialState(state)) = viewer.try_recv() {
        println!("{} ({}, {})", state.event_name, state.circuit_name, state.country);
        println!("{} round {}, {} laps", state.year, state.round, state.total_laps);
        println!(
            "{} frames stored ({} recorded)",
            state.total_frames, state.original_total
        );
        match &state.track_data {
            Some(track) => println!("Track outline: {} points", track.len()),
            None => println!("Track outline: unavailable"),
        }
        let status = session.status().await;
        println!(
            "Downsampled: {}, speed {}x",
            status.original_total != status.total_frames,
            status.speed
        );
        for event in &state.race_events {
            match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Error while serializing timeline event: {}", e),
            }
        }
    }
    Ok(())
}

fn schedule(input: &Path, year: u16) -> Result<(), ReplayError> {
    let mut producer = JsonlTelemetryProducer::from_file(input)?;
    let rounds = producer.schedule(year)?;
    if rounds.is_empty() {
        println!("No rounds recorded for {}", year);
    }
    for entry in rounds {
        println!(
            "{:>2} {} ({}) [{}]",
            entry.round,
            entry.event_name,
            entry.location,
            entry.sessions.join(", ")
        );
    }
    Ok(())
}

fn write_config(config: &ReplayConfig, output: Option<&Path>) -> Result<(), ReplayError> {
    match output {
        Some(path) => config.save_to(path)?,
        None => config.save()?,
    }
    info!("Replay config written");
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

    let config = read_config(cli.config.as_deref()).unwrap_or_else(|e| {
        error!("Could not read replay config: {}", e);
        std::process::exit(1);
    });
    let runtime = tokio::runtime::Runtime::new().expect("Could not start async runtime");

    let result = match &cli.command {
        Commands::Replay {
            input,
            year,
            round,
            session,
            driver,
            segment,
            speed,
            start_frame,
            output,
        } => {
            let key = SessionKey::new(*year, *round, session);
            let source = match driver {
                Some(driver) => Source::QualifyingLap { driver, segment },
                None => Source::Race,
            };
            runtime.block_on(replay(
                config,
                input,
                &key,
                source,
                *speed,
                *start_frame,
                output.clone(),
            ))
        }
        Commands::Inspect {
            input,
            year,
            round,
            session,
        } => {
            let key = SessionKey::new(*year, *round, session);
            if key.session_type == "Q" {
                print_qualifying_results(input, &key)
            } else {
                runtime.block_on(inspect(config, input, &key))
            }
        }
        Commands::Schedule { input, year } => schedule(input, *year),
        Commands::Config { output } => write_config(&config, output.as_deref()),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
