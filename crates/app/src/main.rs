use std::{path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use lipsync_rig_core::{
    AppConfig, CommandRecognizer, DriverDescription, LipSyncSession, MarkRequest, RecognitionOutput,
};
use tracing_subscriber::EnvFilter;

fn main() -> lipsync_rig_core::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Mark {
            config,
            wave,
            transcript,
            start_frame,
            length,
            output,
        } => {
            let mut request = MarkRequest::new(wave, transcript, start_frame);
            request.length = length;
            run_mark(&config, &request, &output)
        }
        Commands::Replay {
            config,
            phonemes,
            wave,
            start_frame,
            length,
            output,
        } => {
            let wave = wave.unwrap_or_else(|| phonemes.clone());
            let mut request = MarkRequest::new(wave, &phonemes, start_frame);
            request.length = length;
            run_replay(&config, &phonemes, &request, &output)
        }
        Commands::CheckRig { drivers } => run_check_rig(&drivers),
    }
}

fn run_mark(
    config: &PathBuf,
    request: &MarkRequest,
    output: &PathBuf,
) -> lipsync_rig_core::Result<()> {
    tracing::info!(?config, wave = ?request.wave, "marking audio");

    let config = AppConfig::load(config)?;
    let recognizer = Arc::new(CommandRecognizer::from_config(&config.recognizer)?);
    let mut session = LipSyncSession::from_config(&config)?;

    session.mark_audio(recognizer, request, config.recognizer.timeout())?;
    write_keys(session, output)
}

fn run_replay(
    config: &PathBuf,
    phonemes: &PathBuf,
    request: &MarkRequest,
    output: &PathBuf,
) -> lipsync_rig_core::Result<()> {
    tracing::info!(?config, ?phonemes, "replaying recognizer output");

    let config = AppConfig::load(config)?;
    let raw = std::fs::read_to_string(phonemes)?;
    let recognized = RecognitionOutput::parse(&raw)?;
    let mut session = LipSyncSession::from_config(&config)?;

    session.mark_from_output(request, &recognized)?;
    write_keys(session, output)
}

fn write_keys(mut session: LipSyncSession, output: &PathBuf) -> lipsync_rig_core::Result<()> {
    let report = session.animate_all_active()?;
    if report.skipped > 0 {
        tracing::warn!(skipped = report.skipped, "some phonemes had no pose");
    }

    let keys = session.close();
    std::fs::write(output, keys.to_json_pretty()?)?;
    tracing::info!(?output, keys = keys.key_count(), "wrote keyframes");
    Ok(())
}

fn run_check_rig(drivers: &PathBuf) -> lipsync_rig_core::Result<()> {
    let description = DriverDescription::load(drivers)?;
    tracing::info!(
        drivers = description.len(),
        targets = ?description.target_objects(),
        "driver description is valid"
    );
    for shape in description.shape_keys() {
        println!("{shape}");
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Phoneme lip-sync for facial rigs", long_about = None)]
struct Cli {
    /// Log every keyframe written.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the recognizer on an audio file and key the phoneme rig.
    Mark {
        /// Session configuration file.
        #[arg(short, long)]
        config: PathBuf,
        /// Wave file to recognize.
        #[arg(long)]
        wave: PathBuf,
        /// Transcript of the spoken text.
        #[arg(long)]
        transcript: PathBuf,
        /// Frame the audio starts on.
        #[arg(long, default_value_t = 1)]
        start_frame: i64,
        /// Clip length in frames.
        #[arg(long)]
        length: Option<i64>,
        /// Where to write the keyframes as JSON.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Key the phoneme rig from recognizer output saved earlier.
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        /// Recognizer JSON document.
        #[arg(long)]
        phonemes: PathBuf,
        /// Audio the phonemes came from; names the clip. Defaults to the
        /// phonemes file.
        #[arg(long)]
        wave: Option<PathBuf>,
        #[arg(long, default_value_t = 1)]
        start_frame: i64,
        #[arg(long)]
        length: Option<i64>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Validate a facial rig driver description and list its shape keys.
    CheckRig {
        /// Driver description JSON.
        #[arg(long)]
        drivers: PathBuf,
    },
}
