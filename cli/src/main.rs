use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ArgAction::{Set, SetTrue};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{event, span, Level};
use tracing_subscriber::prelude::*;

use base::prelude::*;
use bus::bridge::{set_up_devices, DeviceManager};
use bus::clockgen::FrequencyTable;
use bus::pins::MemIoPolarity;
use bus::sim::ScriptedProcessor;
use bus::{BasicClock, BusEngine, EngineConfig, Session, Workspace, DEFAULT_RAM_SIZE};
use transfer::TransferConfig;

mod display;
mod stdio_console;
mod stdio_link;
mod stimulus;

use stdio_console::StreamConsole;
use stdio_link::StdioLink;

/// Host-side tools for the V30 bus monitor
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bus engine against a scripted processor and list the
    /// bus cycles it logged.
    Replay(ReplayArgs),

    /// Boot the HIDOS guest, with this terminal as its console.
    Hidos(HidosArgs),

    /// Decode an event log as received from the monitor.
    Decode {
        #[clap(action = Set)]
        file: PathBuf,

        /// Print JSON instead of a table.
        #[clap(action = SetTrue, long)]
        json: bool,
    },

    /// Send a file with XMODEM-CRC over standard input and output.
    Send {
        #[clap(action = Set)]
        file: PathBuf,
    },

    /// Receive a file with XMODEM-CRC over standard input and output.
    Receive {
        #[clap(action = Set)]
        file: PathBuf,

        /// Refuse transfers longer than this.
        #[clap(action = Set, long, default_value_t = DEFAULT_RAM_SIZE)]
        max_len: usize,
    },

    /// List the supported processor clock frequencies.
    Clocks,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogChoice {
    None,
    Full,
    Io,
    Com,
}

impl From<LogChoice> for RunMode {
    fn from(choice: LogChoice) -> RunMode {
        match choice {
            LogChoice::None => RunMode::NoLog,
            LogChoice::Full => RunMode::FullLog,
            LogChoice::Io => RunMode::IoLog,
            LogChoice::Com => RunMode::ComLog,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum PolarityChoice {
    LowIo,
    HighIo,
}

impl From<PolarityChoice> for MemIoPolarity {
    fn from(choice: PolarityChoice) -> MemIoPolarity {
        match choice {
            PolarityChoice::LowIo => MemIoPolarity::LowMeansIo,
            PolarityChoice::HighIo => MemIoPolarity::HighMeansIo,
        }
    }
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// JSON file listing the bus cycles the processor performs.
    #[clap(action = Set, long)]
    stimulus: PathBuf,

    /// Image loaded at address 0 before the run.
    #[clap(action = Set, long)]
    image: Option<PathBuf>,

    #[clap(value_enum, long, default_value_t = LogChoice::Full)]
    mode: LogChoice,

    /// Stop after this many bus cycles (0 means no limit).
    #[clap(action = Set, long)]
    cycles: Option<u64>,

    /// Which level of M/IO# means an I/O cycle.
    #[clap(value_enum, long, default_value_t = PolarityChoice::LowIo)]
    polarity: PolarityChoice,

    /// Processor clock in kHz; see the clocks command.
    #[clap(action = Set, long, default_value_t = 125)]
    clock_khz: u32,

    /// Also write the raw event log (8 bytes per entry) to this file.
    #[clap(action = Set, long)]
    log_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct HidosArgs {
    /// JSON file listing the bus cycles the processor performs.
    #[clap(action = Set, long)]
    stimulus: PathBuf,

    /// Boot image, loaded at address 0.
    #[clap(action = Set, long)]
    boot: PathBuf,

    /// Read-only disk image served to the guest as drive 0.
    #[clap(action = Set, long)]
    disk: Option<PathBuf>,

    /// 0 logs every request the guest makes; higher values log them
    /// only at debug level.
    #[clap(action = Set, long, default_value_t = 9)]
    log_level: u8,

    /// Which level of M/IO# means an I/O cycle.
    #[clap(value_enum, long, default_value_t = PolarityChoice::LowIo)]
    polarity: PolarityChoice,
}

fn scripted_session(stimulus: &Path, polarity: MemIoPolarity) -> Result<Session, Box<dyn Error>> {
    let script = stimulus::load_stimulus(stimulus)?;
    event!(Level::DEBUG, "stimulus has {} bus cycles", script.len());
    let engine = BusEngine::new(
        ScriptedProcessor::with_polarity(script, polarity),
        BasicClock::new(),
        EngineConfig {
            polarity,
            ..EngineConfig::default()
        },
    );
    Ok(Session::new(engine, Workspace::default())?)
}

fn replay(args: &ReplayArgs) -> Result<(), Box<dyn Error>> {
    let span = span!(Level::ERROR, "replay", stimulus = ?args.stimulus);
    let _enter = span.enter();

    let clock = FrequencyTable::standard().lookup_khz(args.clock_khz)?;
    event!(
        Level::INFO,
        "processor clock {clock} (PWM wrap {}, divider {})",
        clock.wrap,
        clock.divider
    );
    let mut session = scripted_session(&args.stimulus, args.polarity.into())?;
    if let Some(path) = &args.image {
        let image = fs::read(path)?;
        session.load_fixed_image(&image)?;
    }

    let result = session.run_with_log(args.mode.into(), CycleLimit::from(args.cycles))?;
    println!("{result}");
    display::print_events(session.event_log()?)?;
    if let Some(path) = &args.log_out {
        fs::write(path, session.workspace()?.log.wire_bytes())?;
        event!(Level::INFO, "wrote event log to {}", path.display());
    }
    Ok(())
}

fn hidos(args: &HidosArgs) -> Result<(), Box<dyn Error>> {
    let span = span!(Level::ERROR, "hidos", boot = ?args.boot);
    let _enter = span.enter();

    let mut session = scripted_session(&args.stimulus, args.polarity.into())?;
    let boot = fs::read(&args.boot)?;
    session.load_fixed_image(&boot)?;
    let disk = match &args.disk {
        Some(path) => fs::read(path)?,
        None => Vec::new(),
    };
    event!(Level::INFO, "disk image is {} bytes", disk.len());

    let mut devices = DeviceManager::new();
    set_up_devices(
        &mut devices,
        session.workspace()?.ram.size(),
        disk,
        StreamConsole::stdio()?,
        BasicClock::new(),
    );
    eprintln!("Starting the HIDOS machine");
    let result = session.start_hidos(devices, args.log_level)?;
    eprintln!("{result}");
    Ok(())
}

fn decode(file: &Path, json: bool) -> Result<(), Box<dyn Error>> {
    let raw = fs::read(file)?;
    let events = decode_log(&raw)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&events)?);
    } else {
        display::print_events(&events)?;
    }
    Ok(())
}

fn send_file(file: &Path) -> Result<(), Box<dyn Error>> {
    let payload = fs::read(file)?;
    let mut link = StdioLink::new()?;
    transfer::send(&mut link, &payload, &TransferConfig::default())?;
    event!(Level::INFO, "sent {} bytes", payload.len());
    Ok(())
}

fn receive_file(file: &Path, max_len: usize) -> Result<(), Box<dyn Error>> {
    let mut buffer = vec![0_u8; max_len];
    let mut link = StdioLink::new()?;
    let len = transfer::receive(&mut link, &mut buffer, &TransferConfig::default())?;
    fs::write(file, &buffer[..len])?;
    event!(Level::INFO, "received {len} bytes into {}", file.display());
    Ok(())
}

fn run_monitor_tool() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    // See
    // https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables
    // for instructions on how to select which trace messages get
    // printed.  Standard output may be carrying a transfer, so
    // tracing goes to standard error.
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
    {
        Err(e) => {
            return Err(Box::new(e));
        }
        Ok(layer) => layer,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    match &cli.command {
        Command::Replay(args) => replay(args),
        Command::Hidos(args) => hidos(args),
        Command::Decode { file, json } => decode(file, *json),
        Command::Send { file } => send_file(file),
        Command::Receive { file, max_len } => receive_file(file, *max_len),
        Command::Clocks => Ok(display::print_clocks(&FrequencyTable::standard())?),
    }
}

fn main() {
    match run_monitor_tool() {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}
