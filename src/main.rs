//! midi-session - inspect MIDI ports and send messages from the command line

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use midi_session::midi::format_event;
use midi_session::platform::name_matches;
use midi_session::{
    CcParams, MidiAccessProvider, MidiMessage, MidiPort, MidiSession, NoteOffParams, NoteOnParams,
    OutputHandle, SendOutcome, SessionConfig, Target, VirtualAccess, VirtualInput, VirtualOutput,
    VirtualProvider,
};

/// MIDI session tool - list ports, monitor inputs and send messages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Report every failed delivery
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List available MIDI ports
    List,

    /// Print incoming messages until Ctrl+C
    Monitor {
        /// Only open inputs whose name contains this pattern
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Send a control change
    Cc {
        #[arg(short, long)]
        output: String,
        #[arg(long, default_value = "0")]
        channel: u8,
        #[arg(long)]
        controller: u8,
        #[arg(long)]
        value: u8,
    },

    /// Send a note on
    NoteOn {
        #[arg(short, long)]
        output: String,
        #[arg(long, default_value = "0")]
        channel: u8,
        #[arg(long)]
        pitch: u8,
        #[arg(long, default_value = "100")]
        velocity: u8,
    },

    /// Send a note off
    NoteOff {
        #[arg(short, long)]
        output: String,
        #[arg(long, default_value = "0")]
        channel: u8,
        #[arg(long)]
        pitch: u8,
    },

    /// Run a short session against virtual devices
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    let mut config = match &args.config {
        Some(path) => {
            info!("Configuration file: {}", path);
            SessionConfig::load(path).await?
        }
        None => SessionConfig::default(),
    };
    config.verbose |= args.verbose;

    if let Command::Demo = args.command {
        return run_demo(config).await;
    }

    let session = MidiSession::new(config);
    let provider = hardware_provider(&session.config().client_name)?;
    session
        .initialize(provider.as_ref())
        .await
        .context("Failed to initialize MIDI")?;

    match args.command {
        Command::List => print_ports(&session),
        Command::Monitor { input } => monitor(&session, input.as_deref()).await?,
        Command::Cc {
            output,
            channel,
            controller,
            value,
        } => {
            let target = select_outputs(&session, &output).await?;
            print_outcome(&session.send_cc(CcParams::new(channel, controller, value, target))?);
        }
        Command::NoteOn {
            output,
            channel,
            pitch,
            velocity,
        } => {
            let target = select_outputs(&session, &output).await?;
            print_outcome(&session.send_note_on(NoteOnParams::new(channel, pitch, velocity, target))?);
        }
        Command::NoteOff {
            output,
            channel,
            pitch,
        } => {
            let target = select_outputs(&session, &output).await?;
            print_outcome(&session.send_note_off(NoteOffParams::new(channel, pitch, target))?);
        }
        Command::Demo => {}
    }

    session.shutdown().await;
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

#[cfg(feature = "hardware")]
fn hardware_provider(client_name: &str) -> Result<Box<dyn MidiAccessProvider>> {
    Ok(Box::new(midi_session::MidirProvider::new(client_name)))
}

#[cfg(not(feature = "hardware"))]
fn hardware_provider(_client_name: &str) -> Result<Box<dyn MidiAccessProvider>> {
    bail!("built without the `hardware` feature; only `demo` is available")
}

fn print_ports(session: &MidiSession) {
    println!("\n{}", "=== Available MIDI Ports ===".bold().cyan());

    println!("\n{}", "Input Ports:".bold());
    let inputs = session.inputs();
    if inputs.is_empty() {
        println!("  {}", "No input ports found".dimmed());
    }
    for input in &inputs {
        println!("  {} {} {}", "•".green(), input.name(), input.id().dimmed());
    }

    println!("\n{}", "Output Ports:".bold());
    let outputs = session.outputs();
    if outputs.is_empty() {
        println!("  {}", "No output ports found".dimmed());
    }
    for output in &outputs {
        println!("  {} {} {}", "•".green(), output.name(), output.id().dimmed());
    }
    println!();
}

/// Open every output matching the pattern
async fn select_outputs(session: &MidiSession, pattern: &str) -> Result<Target> {
    let mut selected: Vec<OutputHandle> = Vec::new();
    for output in session.outputs() {
        if name_matches(output.name(), Some(pattern)) && session.add_output(output.clone()).await {
            selected.push(output);
        }
    }

    if selected.is_empty() {
        bail!("no output port matches '{}'", pattern);
    }
    Ok(Target::List(selected))
}

fn print_outcome(outcome: &SendOutcome) {
    if outcome.is_success() {
        println!("{}", outcome.to_string().green());
    } else {
        println!("{}", outcome.to_string().red());
    }
}

async fn monitor(session: &MidiSession, pattern: Option<&str>) -> Result<()> {
    let mut events = session
        .take_event_receiver()
        .context("Event receiver already taken")?;

    let mut opened = 0;
    for input in session.inputs() {
        if name_matches(input.name(), pattern) && session.open_input(input, None).await {
            opened += 1;
        }
    }
    if opened == 0 {
        bail!("no input port could be opened");
    }

    println!("{}", "=== MIDI Monitor ===".bold().cyan());
    println!("Press Ctrl+C to exit\n");

    let start = Instant::now();
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                let elapsed = event.timestamp.duration_since(start).as_millis() as u64;
                let line = format_event(elapsed, &event.device_id, &event.bytes);
                let line = match event.message {
                    Some(MidiMessage::NoteOn { .. }) => line.bright_green(),
                    Some(MidiMessage::NoteOff { .. }) => line.bright_red(),
                    Some(MidiMessage::ControlChange { .. }) => line.bright_yellow(),
                    Some(MidiMessage::PitchWheel { .. }) => line.bright_cyan(),
                    Some(_) => line.normal(),
                    None => line.bright_black(),
                };
                println!("{}", line);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    println!("\n{}", "Monitor stopped".yellow());
    session.shutdown().await;
    Ok(())
}

/// Wire a virtual keyboard and synth, play a note and move a fader
async fn run_demo(config: SessionConfig) -> Result<()> {
    let access = Arc::new(VirtualAccess::new());
    let keys = access.add_input(VirtualInput::new("virtual-keys", "Virtual Keys"));
    let synth = access.add_output(VirtualOutput::new("virtual-synth", "Virtual Synth"));

    let session = MidiSession::new(config);
    session
        .initialize(&VirtualProvider::new(access))
        .await
        .context("Failed to initialize virtual MIDI")?;
    print_ports(&session);

    let mut events = session
        .take_event_receiver()
        .context("Event receiver already taken")?;
    let _subscription = session.subscribe(|record| {
        println!(
            "  {} ch:{} cc:{} = {} ({})",
            "store".dimmed(),
            record.channel,
            record.controller,
            record.value,
            record.device_id
        );
    });

    for input in session.inputs() {
        session.open_input(input, None).await;
    }
    session.add_output(synth.clone()).await;

    let target = synth.clone() as OutputHandle;
    print_outcome(&session.send_note_on(NoteOnParams::new(1, 60, 100, target.clone()))?);
    print_outcome(&session.send_note_off(NoteOffParams::new(1, 60, target.clone()))?);
    print_outcome(&session.send_cc(CcParams::new(1, 64, 0, target))?);

    keys.inject(&[0x90, 64, 90]);
    if let Some(event) = events.recv().await {
        println!("{}", format_event(0, &event.device_id, &event.bytes).bright_green());
    }

    println!("\n{}", "Stored values:".bold());
    println!(
        "{}",
        serde_json::to_string_pretty(&session.store().snapshot())
            .context("Failed to serialize store")?
    );

    session.shutdown().await;
    Ok(())
}
