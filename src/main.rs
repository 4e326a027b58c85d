use clap::{Args, Parser, Subcommand};
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::error::Error;
use std::io::stdout;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use mobile_vision::artifacts::{ActionRecorder, ArtifactDir, list_sessions};
use mobile_vision::config::{self, DeviceSettings};
use mobile_vision::device::{AppiumConfig, AppiumDevice, DeviceDriver, MockDevice};
use mobile_vision::grounding::{GroundingService, VlmGrounder};
use mobile_vision::operator::ConsoleOperator;
use mobile_vision::orchestrator::Orchestrator;
use mobile_vision::proposal::VlmProposer;
use mobile_vision::screen::Screenshot;
use mobile_vision::session::Session;

/// Mobile Vision - human-supervised exploratory testing of mobile apps
#[derive(Parser, Debug)]
#[command(
    name = "mobile-vision",
    about = "Vision-model driven, operator-approved exploratory testing on Appium devices",
    after_help = "ENVIRONMENT VARIABLES:\n\
        MOBILE_VISION_PROPOSAL_ENDPOINT   Proposal model endpoint URL\n\
        MOBILE_VISION_PROPOSAL_MODEL      Proposal model name\n\
        OPENAI_API_KEY                    Proposal model API key\n\
        MOBILE_VISION_GROUNDING_ENDPOINT  Grounding model endpoint URL\n\
        HUGGINGFACE_API_KEY               Grounding model API key\n\
        MOBILE_VISION_SESSION_DIR         Base directory for sessions\n\
        RUST_LOG                          Log filter (default: info)"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where actions are sent
#[derive(Args, Debug)]
struct DeviceArgs {
    /// Use an in-memory device of the given size (e.g., 1080x2400) instead of Appium
    #[arg(long, value_name = "WxH")]
    mock_device: Option<String>,

    /// Appium server URL
    #[arg(long, env = "MOBILE_VISION_APPIUM_SERVER")]
    appium_server: Option<String>,

    /// Device name capability
    #[arg(long, env = "MOBILE_VISION_DEVICE_NAME")]
    device_name: Option<String>,

    /// Platform name capability
    #[arg(long, env = "MOBILE_VISION_PLATFORM")]
    platform: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run an interactive test session
    Run {
        /// Test goal (prompted for when omitted)
        #[arg(short, long)]
        goal: Option<String>,

        #[command(flatten)]
        device: DeviceArgs,

        /// Session directory (default: auto-generated under the session dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the session summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Save one screenshot of the device
    Screenshot {
        /// Output file path
        #[arg(short, long, default_value = "./screenshot.png")]
        output: PathBuf,

        #[command(flatten)]
        device: DeviceArgs,
    },

    /// Ask the grounding model for an element's coordinate in a PNG
    Ground {
        /// Screenshot to search
        #[arg(short, long)]
        image: PathBuf,

        /// Element description, e.g. "click on settings icon"
        #[arg(short, long)]
        query: String,
    },

    /// List recorded sessions
    Sessions {
        /// Base directory (default: the session dir)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Check that the Appium server is reachable
    Status {
        /// Appium server URL
        #[arg(long, env = "MOBILE_VISION_APPIUM_SERVER")]
        appium_server: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            goal,
            device,
            output,
            json,
        } => {
            let mut operator = ConsoleOperator::stdio();
            let goal = match goal {
                Some(goal) => goal,
                None => operator.ask("Enter the test goal: ")?.unwrap_or_default(),
            };
            let goal = goal.trim().to_string();
            if goal.is_empty() {
                println!("No test goal given, nothing to do.");
                return Ok(());
            }

            let mut driver = open_device(&device)?;
            let artifacts = match output {
                Some(dir) => ArtifactDir::in_dir(dir, &goal),
                None => ArtifactDir::for_goal(config::session_base_dir(), &goal),
            };
            let session_dir = artifacts.dir.clone();
            let mut recorder = ActionRecorder::create(artifacts)?;

            let mut proposer = VlmProposer::default();
            let mut grounder = VlmGrounder::default();
            let session = Orchestrator::new(&mut proposer, &mut grounder, driver.as_mut(), &mut operator)
                .with_log(&mut recorder)
                .run(&goal)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                print_summary(&session, &session_dir)?;
            }
        }

        Commands::Screenshot { output, device } => {
            let mut driver = open_device(&device)?;
            let screenshot = driver.screenshot()?;
            std::fs::write(&output, screenshot.as_bytes())?;
            let (width, height) = screenshot.dimensions()?;
            println!("Saved screenshot: {}", output.display());
            println!("  Size: {}x{} ({} bytes)", width, height, screenshot.len());
        }

        Commands::Ground { image, query } => {
            let screenshot = Screenshot::from_png(std::fs::read(&image)?);
            let mut grounder = VlmGrounder::default();
            match grounder.locate(&screenshot, &query) {
                Some(point) => println!("{}", point),
                None => return Err(format!("'{}' not found in {}", query, image.display()).into()),
            }
        }

        Commands::Sessions { dir } => {
            let base = dir.unwrap_or_else(|| PathBuf::from(config::session_base_dir()));
            let sessions = list_sessions(&base)?;
            if sessions.is_empty() {
                println!("No sessions under {}", base.display());
            }
            for path in sessions {
                let goal = std::fs::read_to_string(path.join(".session.json"))
                    .ok()
                    .and_then(|text| serde_json::from_str::<serde_json::Value>(&text).ok())
                    .and_then(|meta| meta["goal"].as_str().map(str::to_string))
                    .unwrap_or_default();
                println!("{}  {}", path.display(), goal);
            }
        }

        Commands::Status { appium_server } => {
            let server = appium_server.unwrap_or_else(|| config::get().device.appium_server.clone());
            let status = AppiumDevice::status(&server, Duration::from_secs(5))?;
            let ready = status.get("ready").and_then(|r| r.as_bool()).unwrap_or(false);
            println!("Appium server {}: {}", server, if ready { "ready" } else { "not ready" });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

/// Connect to the device selected on the command line
fn open_device(args: &DeviceArgs) -> Result<Box<dyn DeviceDriver>, Box<dyn Error>> {
    if let Some(size) = &args.mock_device {
        let (width, height) = config::parse_screen_size(size)
            .ok_or_else(|| format!("Invalid screen size '{}'. Use WxH, e.g. 1080x2400", size))?;
        return Ok(Box::new(MockDevice::new(width, height)));
    }

    let mut settings: DeviceSettings = config::get().device.clone();
    if let Some(server) = &args.appium_server {
        settings.appium_server = server.clone();
    }
    if let Some(name) = &args.device_name {
        settings.device_name = name.clone();
    }
    if let Some(platform) = &args.platform {
        settings.platform_name = platform.clone();
    }

    let appium = AppiumConfig::from_settings(&settings, config::get().timing.tap_duration());
    Ok(Box::new(AppiumDevice::connect(appium)?))
}

fn print_summary(session: &Session, dir: &std::path::Path) -> std::io::Result<()> {
    let mut out = stdout();
    execute!(
        out,
        Print("\n"),
        SetForegroundColor(Color::Green),
        Print("Session finished"),
        ResetColor,
        Print(format!(
            ": {}\n",
            session.termination.map(|r| r.to_string()).unwrap_or_default()
        ))
    )?;
    println!("  Goal: {}", session.goal);
    println!("  Proposals: {}", session.iterations);
    println!("  Steps executed: {}", session.history.steps().len());
    let rejected = session.history.feedback().iter().filter(|f| !f.approved).count();
    println!("  Rejected: {}", rejected);
    for (i, step) in session.history.steps().iter().enumerate() {
        println!("  {}. {}", i + 1, step.describe());
    }
    println!("  Artifacts: {}", dir.display());
    Ok(())
}
