use clap::{Args, Parser, Subcommand};
use feeder_tuner::angle::AngleValue;
use feeder_tuner::board::Address;
use feeder_tuner::config::{get_default_config_path, Config, ConfigError, ConfigLoader};
use feeder_tuner::error::{AppError, AppResult};
use feeder_tuner::feeder::Feeder;
use feeder_tuner::port::PortConfiguration;
use feeder_tuner::protocol::{FeederController, ResponseKind};
use feeder_tuner::registry::FeederRegistry;
use feeder_tuner::service::TuningSession;
use feeder_tuner::topology::ControllerTopology;
use feeder_tuner::{logging, BoardDump};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};

// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "feeder-tuner",
    version,
    about = "Tune and manage pick-and-place slot feeders over a serial M-code link.",
    long_about = "Drives a chain of feeder boards through their controller: jog servo angles, store advance/retract positions, push position configuration, and keep the feeder catalog and controller topology files in sync."
)]
struct Cli {
    /// Configuration file (overrides FEEDER_TUNER_CONFIG and the default search)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial port or alias (overrides config and controller file)
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Feeder catalog file
    #[arg(long, global = true)]
    feeders: Option<PathBuf>,

    /// Controller topology file
    #[arg(long = "controller", global = true)]
    controller_file: Option<PathBuf>,

    /// Reply deadline in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage the feeder catalog (no controller needed)
    #[command(subcommand)]
    Feeders(FeederCommand),

    /// Manage the controller topology file
    #[command(subcommand)]
    Topology(TopologyCommand),

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Show firmware, hardware and mounted feeders
    Info,

    /// Enable all feeders (M611 S1)
    Enable,

    /// Disable all feeders (M611 S0)
    Disable,

    /// Check that a feeder responds (M602)
    Check { address: Address },

    /// Move a servo: absolute ("90") or relative ("+5", "-1")
    Angle {
        address: Address,
        #[arg(allow_hyphen_values = true)]
        instruction: String,
    },

    /// Read back position configuration (M621)
    Dump {
        #[arg(long)]
        board: Option<u8>,
    },

    /// Send a raw command line and print the reply
    Raw {
        command: String,
        /// Wait for this many ok/error lines instead of a single line
        #[arg(long)]
        until_ok: Option<usize>,
    },

    /// Query (no argument) or set the controller baud rate (M575)
    Baud { rate: Option<u32> },

    /// Record which feeder is mounted at a position
    Assign { address: Address, feeder: String },

    /// Clear the feeder mounted at a position
    Unassign { address: Address },

    /// Push the mounted feeder's configuration to its position (M620)
    Apply { address: Address },

    /// Interactive keyboard jog for one position
    #[cfg(feature = "terminal")]
    Jog { address: Address },
}

#[derive(Subcommand, Debug)]
enum FeederCommand {
    /// List feeders
    List {
        /// Include session state (current angle, enabled)
        #[arg(long)]
        full: bool,
    },
    /// Create a feeder, optionally copying another's settings
    Create {
        id: String,
        #[arg(long = "from")]
        template: Option<String>,
    },
    /// Copy a feeder under a new id
    Clone { source: String, new_id: String },
    /// Delete a feeder
    Delete { id: String },
    /// Change a feeder's settings
    Set(FeederEdit),
}

#[derive(Args, Debug)]
struct FeederEdit {
    id: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    advance: Option<i64>,
    #[arg(long, allow_hyphen_values = true)]
    half_advance: Option<i64>,
    #[arg(long, allow_hyphen_values = true)]
    retract: Option<i64>,
    #[arg(long)]
    feed_length: Option<u32>,
    #[arg(long)]
    settle_time: Option<u32>,
    #[arg(long)]
    min_pulsewidth: Option<u32>,
    #[arg(long)]
    max_pulsewidth: Option<u32>,
    #[arg(long)]
    feedback_monitored: Option<bool>,
    #[arg(long)]
    body_width: Option<f32>,
    #[arg(long)]
    tape_width: Option<f32>,
    #[arg(long)]
    min_pitch: Option<f32>,
}

impl FeederEdit {
    fn apply(&self, feeder: &mut Feeder) {
        if let Some(model) = &self.model {
            feeder.model = Some(model.clone());
        }
        if let Some(angle) = self.advance {
            feeder.set_advance_angle(angle);
        }
        if let Some(angle) = self.half_advance {
            feeder.set_half_advance_angle(angle);
        }
        if let Some(angle) = self.retract {
            feeder.set_retract_angle(angle);
        }
        feeder.default_feed_length = self.feed_length.or(feeder.default_feed_length);
        feeder.settle_time = self.settle_time.or(feeder.settle_time);
        feeder.min_pulsewidth = self.min_pulsewidth.or(feeder.min_pulsewidth);
        feeder.max_pulsewidth = self.max_pulsewidth.or(feeder.max_pulsewidth);
        feeder.body_width = self.body_width.or(feeder.body_width);
        feeder.tape_width = self.tape_width.or(feeder.tape_width);
        feeder.min_pitch = self.min_pitch.or(feeder.min_pitch);
        if let Some(monitored) = self.feedback_monitored {
            feeder.feedback_monitored = monitored;
        }
    }
}

#[derive(Subcommand, Debug)]
enum TopologyCommand {
    /// Write a controller file with empty boards
    Init {
        #[arg(long, default_value_t = 1)]
        boards: u8,
        #[arg(long)]
        positions: Option<u8>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the controller file after validation
    Show,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration (file, environment and defaults)
    Show,
    /// Print which config file was loaded
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Settings after config file, environment and flags have been merged.
struct Resolved {
    config: Config,
    feeders_file: PathBuf,
    controller_file: PathBuf,
    read_timeout: Duration,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error [{}]: {}", e.kind(), e);
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: Cli) -> AppResult<()> {
    let loader = match &cli.config {
        Some(path) => ConfigLoader::load_from(path)?,
        None => ConfigLoader::load()?,
    };
    let config = loader.config().clone();
    logging::init(&config.logging, cli.verbose)?;

    let resolved = Resolved {
        feeders_file: cli.feeders.clone().unwrap_or_else(|| config.storage.feeders_file.clone()),
        controller_file: cli
            .controller_file
            .clone()
            .unwrap_or_else(|| config.storage.controller_file.clone()),
        read_timeout: cli
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| config.serial.read_timeout()),
        config,
    };

    match cli.command {
        Commands::Feeders(command) => run_feeders(command, &resolved, cli.json),
        Commands::Topology(command) => run_topology(command, &resolved, cli.port.as_deref()),
        Commands::Config(command) => run_config(command, &loader, cli.config.as_deref()),
        command => {
            let mut session = connect(&resolved, cli.port.as_deref())?;
            run_controller(command, &mut session, &resolved, cli.json)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn fmt_angle(angle: Option<AngleValue>) -> String {
    angle.map_or_else(|| "-".to_string(), |a| a.to_string())
}

// ========== Catalog commands ==========

fn run_feeders(command: FeederCommand, resolved: &Resolved, json: bool) -> AppResult<()> {
    let path = &resolved.feeders_file;
    let mut registry = FeederRegistry::load(path);

    match command {
        FeederCommand::List { full: true } => print_json(&registry.list_full()),
        FeederCommand::List { full: false } if json => print_json(&registry.list()),
        FeederCommand::List { full: false } => {
            if registry.is_empty() {
                println!("No feeders in {}", path.display());
            }
            for feeder in registry.iter() {
                println!(
                    "{:<16} {:<20} adv {:>3}  half {:>3}  ret {:>3}",
                    feeder.id(),
                    feeder.model.as_deref().unwrap_or("-"),
                    fmt_angle(feeder.advance_angle()),
                    fmt_angle(feeder.half_advance_angle()),
                    fmt_angle(feeder.retract_angle()),
                );
            }
            Ok(())
        }
        FeederCommand::Create { id, template } => {
            registry.create(&id, template.as_deref())?;
            registry.save(path)?;
            println!("Created feeder {}", id);
            Ok(())
        }
        FeederCommand::Clone { source, new_id } => {
            registry.clone_feeder(&source, &new_id)?;
            registry.save(path)?;
            println!("Cloned {} as {}", source, new_id);
            Ok(())
        }
        FeederCommand::Delete { id } => {
            registry.delete(&id)?;
            registry.write(path)?;
            println!("Deleted feeder {}", id);
            Ok(())
        }
        FeederCommand::Set(edit) => {
            let feeder = registry
                .get_mut(&edit.id)
                .ok_or_else(|| AppError::UnknownFeeder(edit.id.clone()))?;
            edit.apply(feeder);
            let record = feeder.to_record();
            registry.save(path)?;
            print_json(&record)
        }
    }
}

// ========== Config commands ==========

fn refuse_overwrite(path: &Path, force: bool) -> AppResult<()> {
    if path.exists() && !force {
        return Err(AppError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists (use --force to overwrite)", path.display()),
        )));
    }
    Ok(())
}

fn run_config(command: ConfigCommand, loader: &ConfigLoader, explicit: Option<&Path>) -> AppResult<()> {
    match command {
        ConfigCommand::Show => {
            print!("{}", loader.render()?);
            Ok(())
        }
        ConfigCommand::Path => {
            match &loader.config_path {
                Some(path) => println!("{}", path.display()),
                None => println!("(none; using built-in defaults)"),
            }
            Ok(())
        }
        ConfigCommand::Init { force } => {
            let path = explicit
                .map(Path::to_path_buf)
                .or_else(get_default_config_path)
                .ok_or_else(|| ConfigError::invalid("config", "no config directory on this platform; pass --config"))?;
            refuse_overwrite(&path, force)?;
            ConfigLoader::with_defaults().save_to(&path)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

// ========== Topology commands ==========

fn run_topology(command: TopologyCommand, resolved: &Resolved, port: Option<&str>) -> AppResult<()> {
    let path = &resolved.controller_file;
    match command {
        TopologyCommand::Init { boards, positions, force } => {
            refuse_overwrite(path, force)?;
            let port_name = port
                .map(str::to_string)
                .or_else(|| resolved.config.serial.port.clone());
            let topology = ControllerTopology::new(
                resolved.config.controller.model.clone(),
                port_name,
                boards,
                positions.unwrap_or(resolved.config.controller.positions_per_board),
            );
            topology.validate()?;
            topology.save(path)?;
            println!("Wrote {} with {} board(s)", path.display(), boards);
            Ok(())
        }
        TopologyCommand::Show => {
            let topology = ControllerTopology::load(path, resolved.config.controller.positions_per_board)?;
            print_json(&topology)
        }
    }
}

// ========== Controller commands ==========

fn connect(resolved: &Resolved, port: Option<&str>) -> AppResult<TuningSession> {
    let topology = ControllerTopology::load(
        &resolved.controller_file,
        resolved.config.controller.positions_per_board,
    )?;

    let port_name = port
        .map(str::to_string)
        .or_else(|| resolved.config.serial.port.clone())
        .or_else(|| topology.port_name.clone())
        .ok_or(AppError::NoPort)?;
    let port_name = resolved.config.serial.resolve_port(&port_name);
    debug!("Using port {} at {} baud", port_name, resolved.config.serial.baud_rate);

    let port_config = PortConfiguration::default().with_baud_rate(resolved.config.serial.baud_rate);
    let controller = FeederController::connect(&port_name, port_config, topology.settings(resolved.read_timeout))?;
    Ok(TuningSession::open(controller, resolved.feeders_file.clone()))
}

fn run_controller(command: Commands, session: &mut TuningSession, resolved: &Resolved, json: bool) -> AppResult<()> {
    match command {
        Commands::Info => show_info(session, json),
        Commands::Enable => {
            session.enable_all(true)?;
            println!("Feeders enabled");
            Ok(())
        }
        Commands::Disable => {
            session.enable_all(false)?;
            println!("Feeders disabled");
            Ok(())
        }
        Commands::Check { address } => {
            session
                .controller_mut()
                .check_position(address.board, address.position)?;
            println!("{}: ok", address);
            Ok(())
        }
        Commands::Angle { address, instruction } => {
            session.select(address)?;
            let angle = session.adjust(&instruction)?;
            println!("{} -> {}", address, angle);
            Ok(())
        }
        Commands::Dump { board } => {
            let dumps = session.dump(board)?;
            if json {
                print_json(&dumps)
            } else {
                print_dumps(&dumps);
                Ok(())
            }
        }
        Commands::Raw { command, until_ok } => {
            let expect = until_ok.map_or(ResponseKind::Line, ResponseKind::UntilTerminal);
            let reply = session.controller_mut().send_raw(&command, expect)?;
            println!("{}", reply.trim_end());
            Ok(())
        }
        Commands::Baud { rate: None } => {
            match session.controller_mut().query_baud_rate()? {
                Some(rate) => println!("{}", rate),
                None => println!("Controller did not report a baud rate"),
            }
            Ok(())
        }
        Commands::Baud { rate: Some(rate) } => {
            session.controller_mut().set_baud_rate(rate)?;
            println!("Baud rate set to {}", rate);
            Ok(())
        }
        Commands::Assign { address, feeder } => {
            if let Some(previous) = session.assign_feeder(address, &feeder)? {
                println!("Replaced {} at {}", previous, address);
            }
            session.save_topology(&resolved.controller_file)?;
            println!("Mounted {} at {}", feeder, address);
            Ok(())
        }
        Commands::Unassign { address } => {
            match session.unassign_feeder(address)? {
                Some(previous) => println!("Removed {} from {}", previous, address),
                None => println!("Nothing mounted at {}", address),
            }
            session.save_topology(&resolved.controller_file)
        }
        Commands::Apply { address } => {
            let id = session.push_feeder_config(address)?;
            session.save_topology(&resolved.controller_file)?;
            println!("Configured {} from feeder {}", address, id);
            Ok(())
        }
        #[cfg(feature = "terminal")]
        Commands::Jog { address } => {
            jog::run(session, address)?;
            session.save_topology(&resolved.controller_file)
        }
        Commands::Feeders(_) | Commands::Topology(_) | Commands::Config(_) => Ok(()),
    }
}

#[derive(Serialize)]
struct InfoReport<'a> {
    port: &'a str,
    model: &'a str,
    firmware: &'a [feeder_tuner::FirmwareVersion],
    boards: usize,
    mounted: Vec<(String, String)>,
}

fn show_info(session: &mut TuningSession, json: bool) -> AppResult<()> {
    if session.controller().firmware_versions().is_empty() {
        info!("No cached firmware info; asking again");
        session.controller_mut().request_firmware_info()?;
    }
    let controller = session.controller();
    let mounted = controller
        .boards()
        .iter()
        .enumerate()
        .flat_map(|(board, positions)| {
            positions.positions().filter_map(move |(index, position)| {
                let address = Address::new(board as u8, index).ok()?;
                Some((address.to_string(), position.feeder_id()?.to_string()))
            })
        })
        .collect();
    let report = InfoReport {
        port: controller.port_name(),
        model: controller.model(),
        firmware: controller.firmware_versions(),
        boards: controller.boards().len(),
        mounted,
    };
    if json {
        return print_json(&report);
    }

    println!("Port:     {}", report.port);
    println!("Model:    {}", report.model);
    for version in report.firmware {
        println!("Firmware: {} (hardware {})", version.firmware, version.hardware);
    }
    println!("Boards:   {}", report.boards);
    for (address, feeder) in &report.mounted {
        println!("  {} {}", address, feeder);
    }
    Ok(())
}

fn print_dumps(dumps: &[BoardDump]) {
    for dump in dumps {
        println!("Board {}", dump.board_id);
        for (position, c) in &dump.positions {
            println!(
                "  {:02}  adv {:>3}  half {:>3}  ret {:>3}  feed {}  settle {}  pw {}-{}  feedback {}",
                position,
                c.advance_angle,
                c.half_advance_angle,
                c.retract_angle,
                c.feed_length,
                c.settle_time,
                c.pulsewidth_at_0,
                c.pulsewidth_at_180,
                if c.ignore_feedback_pin { "ignored" } else { "monitored" },
            );
        }
        for anomaly in &dump.anomalies {
            println!("  warning: {:?}", anomaly);
        }
    }
}

#[cfg(feature = "terminal")]
mod jog {
    //! Raw-mode keyboard loop around the jog state machine.

    use crossterm::event::{self, Event};
    use crossterm::terminal;
    use feeder_tuner::board::Address;
    use feeder_tuner::error::{AppError, AppResult};
    use feeder_tuner::jog::{InputEvent, JogMachine, HELP};
    use feeder_tuner::service::{JogOutcome, TuningSession};
    use std::io::Write;

    /// Print a line in raw mode, where `\n` alone does not return the cursor.
    fn say(message: impl std::fmt::Display) {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "{}\r\n", message.to_string().replace('\n', "\r\n"));
        let _ = stdout.flush();
    }

    pub fn run(session: &mut TuningSession, address: Address) -> AppResult<()> {
        session.select(address)?;
        println!("Jogging {} ('?' for help, 'e' to exit)", address);

        terminal::enable_raw_mode()?;
        let result = jog_loop(session);
        terminal::disable_raw_mode()?;
        result
    }

    fn recoverable(error: &AppError) -> bool {
        matches!(
            error,
            AppError::Protocol(_) | AppError::Angle(_) | AppError::UnknownAngle(_) | AppError::UnknownFeeder(_)
        )
    }

    fn jog_loop(session: &mut TuningSession) -> AppResult<()> {
        let mut machine = JogMachine::new();
        loop {
            let Event::Key(key) = event::read()? else {
                continue;
            };
            let Some(input) = InputEvent::from_key_event(key) else {
                continue;
            };

            match session.handle(machine.handle(input)) {
                Ok(JogOutcome::Exit) => return Ok(()),
                Ok(JogOutcome::Moved(angle)) => say(format!("angle {}", angle)),
                Ok(JogOutcome::Captured(slot, angle)) => say(format!("stored {} as {}", angle, slot)),
                Ok(JogOutcome::Help) => say(HELP),
                Ok(JogOutcome::Entry(buffer)) => {
                    let mut stdout = std::io::stdout();
                    let _ = write!(stdout, "\rangle input: {:<8}", buffer);
                    let _ = stdout.flush();
                }
                Ok(JogOutcome::Invalid(key)) => say(format!("\ninvalid key {:?}; entry cleared", key)),
                Ok(JogOutcome::Idle) => {}
                Err(e) if recoverable(&e) => say(format!("error [{}]: {}", e.kind(), e)),
                Err(e) => return Err(e),
            }
        }
    }
}
