use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use sparky_voice::live::{SessionEvent, SessionManager, SessionState, caption_tail};
use sparky_voice::translate::{GeminiTranslator, Language};
use sparky_voice::voice::{
    AudioBuffer, AudioCapture, AudioPlayback, CpalDevices, FRAME_SIZE, InputContext,
    PLAYBACK_SAMPLE_RATE, SAMPLE_RATE, SpeakOutcome, SpeechPlayer, TextToSpeech, play_to_end,
    samples_to_wav,
};
use sparky_voice::Config;

/// Sparky - a friendly voice buddy for kids
#[derive(Parser)]
#[command(name = "sparky", version, about)]
struct Cli {
    /// Persona to use (e.g., "sparky")
    #[arg(short, long, env = "SPARKY_PERSONA")]
    persona: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Talk with Sparky live until Ctrl-C
    Talk,
    /// Say one sentence out loud
    Say {
        /// Text to speak
        text: String,
        /// Display language to translate into first
        #[arg(short, long)]
        language: Option<Language>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the recording as a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,sparky_voice=info",
        1 => "info,sparky_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let persona = cli.persona.as_deref();

    match cli.command {
        Command::Talk => talk(persona).await,
        Command::Say { text, language } => say(persona, &text, language).await,
        Command::TestMic { duration, output } => test_mic(duration, output).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

/// Live conversation until Ctrl-C or the session ends
#[allow(clippy::future_not_send)]
async fn talk(persona: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load(persona)?;
    let transport = config.live_transport()?;

    let (mut manager, mut events) =
        SessionManager::new(CpalDevices, transport, config.session_options());

    let stop = manager.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    let name = config.persona.name().to_string();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::StateChanged(SessionState::Connecting) => {
                    println!("Waking up {name}...");
                }
                SessionEvent::StateChanged(SessionState::Active) => {
                    println!("{name} is listening! Press Ctrl-C to stop.");
                }
                SessionEvent::Transcript(text) => {
                    println!("{name}: {}", caption_tail(&text, 60));
                }
                SessionEvent::Error { message } => println!("{message}"),
                SessionEvent::Closed => println!("Bye for now!"),
                SessionEvent::StateChanged(SessionState::Idle)
                | SessionEvent::AgentSpeaking(_)
                | SessionEvent::Listening(_) => {}
            }
        }
    });

    let started = manager
        .start(&config.live.system_prompt, &config.live.voice)
        .await;
    if started.is_ok() {
        manager.run().await;
    }
    drop(manager);
    printer.await?;

    started?;
    Ok(())
}

/// One-shot speech of a single sentence
#[allow(clippy::future_not_send)]
async fn say(persona: Option<&str>, text: &str, language: Option<Language>) -> anyhow::Result<()> {
    let config = Config::load(persona)?;
    let client = config.genai_client()?;

    let translator = GeminiTranslator::new(client.clone(), config.speech.translate_model.clone());
    let tts = TextToSpeech::new(
        client,
        config.speech.tts_model.clone(),
        config.speech.instruction.clone(),
    );

    let player = SpeechPlayer::new(
        CpalDevices,
        Arc::new(translator),
        Arc::new(tts),
        config.speech.tts_voice.clone(),
    )
    .with_language(language.unwrap_or(config.speech.language));

    match player.speak(text).await {
        SpeakOutcome::Spoken => Ok(()),
        SpeakOutcome::Silent => {
            println!("(nothing to say)");
            Ok(())
        }
        SpeakOutcome::Busy => anyhow::bail!("already speaking"),
        SpeakOutcome::Failed(e) => {
            println!("{}", e.user_message());
            Err(e.into())
        }
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, output: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    // Quarter frames give a livelier meter
    let (frames_tx, mut frames) = mpsc::channel(32);
    let mut capture = AudioCapture::open(SAMPLE_RATE, FRAME_SIZE / 4, frames_tx)?;
    capture.resume()?;

    println!(
        "Sample rate: {} Hz, channels: {}",
        capture.sample_rate(),
        capture.channels()
    );
    println!("---");

    let mut recording = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(duration);

    while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, frames.recv()).await {
        let energy = calculate_rms(&frame.samples);
        let peak = frame.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);
        println!("RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]");

        recording.extend_from_slice(&frame.samples);
    }

    capture.close();

    if let Some(path) = output {
        let wav = samples_to_wav(&recording, SAMPLE_RATE)?;
        std::fs::write(&path, wav)?;
        println!("\nSaved {} samples to {}", recording.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let (ended_tx, mut ended) = mpsc::unbounded_channel();
    let mut playback = AudioPlayback::open(PLAYBACK_SAMPLE_RATE, ended_tx)?;

    let frequency = 440.0_f32;
    let num_samples = PLAYBACK_SAMPLE_RATE as usize * 2;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!(
        "Playing {} samples at {} Hz...",
        samples.len(),
        PLAYBACK_SAMPLE_RATE
    );

    play_to_end(
        &mut playback,
        &mut ended,
        AudioBuffer::new(samples, PLAYBACK_SAMPLE_RATE),
    )
    .await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}
