use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voice_interview::api::{Answer, ApiClient, NewUser, Quiz};
use voice_interview::audio::{AudioBackendFactory, AudioSource};
use voice_interview::playback::{AudioSink, DiscardSink, WavSink};
use voice_interview::session::MicrophoneAccess;
use voice_interview::{Config, ControlEvent, SessionConfig, VoiceSession};

#[derive(Parser)]
#[command(name = "voice-interview")]
#[command(about = "Personality assessment client: quiz, text and voice interview")]
struct Cli {
    /// Config file (without extension)
    #[arg(long, default_value = "config/voice-interview")]
    config: String,

    /// Override backend.api_base_url
    #[arg(long)]
    api_url: Option<String>,

    /// Override backend.ws_base_url
    #[arg(long)]
    ws_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one realtime voice interview
    Voice {
        #[arg(long)]
        user: String,

        /// Speak this 24kHz WAV file as a single turn
        #[arg(long, conflicts_with = "mic")]
        input: Option<PathBuf>,

        /// Use the default microphone; Enter toggles talking, `q` quits
        #[arg(long)]
        mic: bool,

        /// Write the interviewer's replies to this WAV file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pace file input and WAV output in real time
        #[arg(long)]
        realtime: bool,

        /// Seconds of silence after a turn before a file session ends
        #[arg(long, default_value = "5")]
        reply_timeout: u64,
    },
    /// List users and their progress
    Users,
    /// Register a user
    CreateUser { name: String, gender: String },
    /// Show a user
    User { id: String },
    /// List quiz questions
    Questions,
    /// Take the quiz interactively, resuming where the user stopped
    Quiz { user: String },
    /// Submit a quiz answer
    Answer {
        user: String,
        question: i64,
        key: String,
    },
    /// Show quiz scores and type
    Result { user: String },
    /// Show the text interview so far
    History { user: String },
    /// Send one text interview message, or open the interview when omitted
    Chat { user: String, message: Option<String> },
    /// Show the combined report, or save it as PDF with --output
    Report {
        user: String,

        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut cfg = Config::load(&cli.config)?;
    if let Some(url) = cli.api_url {
        cfg.backend.api_base_url = url;
    }
    if let Some(url) = cli.ws_url {
        cfg.backend.ws_base_url = Some(url);
    }
    info!("Loaded config: {}", cfg.service.name);

    match cli.command {
        Command::Voice {
            user,
            input,
            mic,
            output,
            realtime,
            reply_timeout,
        } => {
            let source = match (input, mic) {
                (Some(path), _) => AudioSource::File(path),
                (None, true) => AudioSource::Microphone,
                (None, false) => bail!("Pass --input <file.wav> or --mic"),
            };
            run_voice(&cfg, user, source, output, realtime, Duration::from_secs(reply_timeout)).await
        }
        command => run_rest(&cfg, command).await,
    }
}

async fn run_voice(
    cfg: &Config,
    user: String,
    source: AudioSource,
    output: Option<PathBuf>,
    realtime: bool,
    reply_timeout: Duration,
) -> Result<()> {
    let from_file = matches!(source, AudioSource::File(_));

    let mut session_config = SessionConfig::from_config(cfg, user);
    if from_file {
        session_config.reply_timeout = Some(reply_timeout);
    }

    let backend = AudioBackendFactory::create(source, session_config.backend_config(realtime || !from_file))?;
    info!("Backend created: {}", backend.name());

    let sink = open_sink(cfg, output, realtime || !from_file).await?;
    info!("Playback sink: {}", sink.name());

    let mut session = VoiceSession::new(session_config, backend, sink)?;

    if session.request_permission().await != MicrophoneAccess::Authorized {
        warn!("Status: {}", session.status());
        if from_file {
            let stats = session.shutdown().await;
            print_json(&stats)?;
            bail!("Audio input is not available");
        }
    }

    let (controls_tx, controls_rx) = mpsc::channel(16);

    if from_file {
        session.wait_until_open().await?;
        controls_tx.send(ControlEvent::Press).await?;
    } else {
        spawn_keyboard(controls_tx.clone());
    }
    spawn_ctrl_c(controls_tx.clone());

    let stats = session.run(controls_rx).await?;
    drop(controls_tx);

    print_json(&stats)
}

async fn open_sink(cfg: &Config, output: Option<PathBuf>, realtime: bool) -> Result<Box<dyn AudioSink>> {
    if let Some(path) = output {
        return Ok(Box::new(WavSink::create(path, cfg.audio.sample_rate, realtime)?));
    }

    #[cfg(feature = "cpal")]
    {
        match voice_interview::playback::speaker::SpeakerSink::open(cfg.audio.sample_rate).await {
            Ok(sink) => return Ok(Box::new(sink)),
            Err(e) => warn!("No output device, replies will be discarded: {:#}", e),
        }
    }

    Ok(Box::new(DiscardSink))
}

/// Enter toggles the talk control, `r` retries permission, `q` quits
fn spawn_keyboard(controls: mpsc::Sender<ControlEvent>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        info!("Press Enter to talk, Enter again to send; `r` retries microphone access, `q` quits");

        while let Ok(Some(line)) = lines.next_line().await {
            let event = match line.trim() {
                "q" => ControlEvent::Quit,
                "r" => ControlEvent::RetryPermission,
                _ => ControlEvent::Toggle,
            };

            if controls.send(event).await.is_err() || event == ControlEvent::Quit {
                break;
            }
        }
    });
}

fn spawn_ctrl_c(controls: mpsc::Sender<ControlEvent>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = controls.send(ControlEvent::Quit).await;
        }
    });
}

async fn run_rest(cfg: &Config, command: Command) -> Result<()> {
    let mut client = ApiClient::new(cfg.backend.api_base_url.clone(), Duration::from_secs(60))?;

    match command {
        Command::Users => print_json(&client.users().await?),
        Command::CreateUser { name, gender } => {
            let user = client.create_user(&NewUser { name, gender }).await?;
            print_json(&user)
        }
        Command::User { id } => {
            let user = client
                .get_user(&id)
                .await?
                .with_context(|| format!("User {} not found", id))?;
            print_json(&user)
        }
        Command::Questions => print_json(&client.questions().await?),
        Command::Quiz { user } => run_quiz(&client, &user).await,
        Command::Answer { user, question, key } => {
            let answer = Answer {
                user_id: user,
                question_id: question,
                selected_key: key,
            };
            client.submit_answer(&answer).await?;
            print_json(&answer)
        }
        Command::Result { user } => print_json(&client.result(&user).await?),
        Command::History { user } => print_json(&client.chat_history(&user).await?),
        Command::Chat { user, message: None } => print_json(&client.open_chat(&user).await?),
        Command::Chat {
            user,
            message: Some(message),
        } => {
            let reply = client.send_chat(&user, &message).await?;
            print_json(&reply)?;
            let usage = client.usage().total();
            info!(
                "Usage: input={} output={} cached={} cost=${:.5}",
                usage.input, usage.output, usage.cached, usage.cost
            );
            Ok(())
        }
        Command::Report { user, output: None } => print_json(&client.report(&user).await?),
        Command::Report {
            user,
            output: Some(path),
        } => {
            let pdf = client.report_pdf(&user).await?;
            tokio::fs::write(&path, &pdf)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Saved report to {} ({})", path.display(), client.report_pdf_url(&user));
            Ok(())
        }
        Command::Voice { .. } => bail!("voice is not a REST command"),
    }
}

/// Ask the remaining questions on stdin; `a`/`b` or the letter key answers
async fn run_quiz(client: &ApiClient, user: &str) -> Result<()> {
    let mut quiz = Quiz::start(client, user).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(question) = quiz.current() {
        let (number, total) = quiz.progress();
        println!("\n[{}/{}] {}", number, total, question.situation);
        println!("{}", question.text);
        println!("  a) {}", question.option_a);
        println!("  b) {}", question.option_b);

        let Some(line) = lines.next_line().await? else {
            bail!("Quiz stopped at question {} of {}", number, total);
        };
        if !quiz.answer(client, &line).await? {
            warn!("Answer with a or b");
        }
    }

    print_json(&quiz.finish(client).await?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
