use clap::Parser;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use eoka_vision::{Agent, ChatCompletionsOracle, ChromeDriver, Config, Executor};

#[derive(Parser)]
#[command(name = "eoka-vision")]
#[command(about = "Vision-driven browser agent")]
#[command(version)]
struct Cli {
    /// Config file to run (optional when --url and --task are given)
    config: Option<PathBuf>,

    /// Starting URL (overrides config)
    #[arg(long)]
    url: Option<String>,

    /// Task instruction (overrides config)
    #[arg(long)]
    task: Option<String>,

    /// Run in headless mode (overrides config)
    #[arg(long, conflicts_with = "headed")]
    headless: bool,

    /// Show the browser window (overrides config)
    #[arg(long)]
    headed: bool,

    /// Save raw, annotated and cropped screenshots here
    #[arg(long, value_name = "DIR")]
    debug_dir: Option<PathBuf>,

    /// Stop after this many oracle decisions
    #[arg(long)]
    max_steps: Option<usize>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate config without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn load_config(&self) -> eoka_vision::Result<Config> {
        let mut config = match (&self.config, &self.url, &self.task) {
            (Some(path), _, _) => Config::load(path)?,
            (None, Some(url), Some(task)) => Config::for_task(task.clone(), url.clone())?,
            (None, _, _) => {
                return Err(eoka_vision::Error::Config(
                    "pass a config file, or both --url and --task".into(),
                ))
            }
        };

        if let Some(ref url) = self.url {
            config.task.url = url.clone();
        }
        if let Some(ref task) = self.task {
            config.task.instruction = task.clone();
        }
        if self.headless {
            config.browser.headless = true;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if let Some(ref dir) = self.debug_dir {
            config.debug.dir = Some(dir.clone());
        }
        if let Some(max) = self.max_steps {
            config.agent.max_steps = Some(max);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> eoka_vision::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    let builder = FmtSubscriber::builder()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact();
    if std::env::var_os("RUST_LOG").is_some() {
        builder.with_env_filter(EnvFilter::from_default_env()).init();
    } else {
        builder.with_max_level(level).init();
    }

    let config = cli.load_config()?;

    if cli.check {
        println!("Config valid");
        println!("  Task: {}", config.task.instruction);
        println!("  URL: {}", config.task.url);
        println!("  Model: {} ({})", config.oracle.model, config.oracle.base_url);
        if let Some(max) = config.agent.max_steps {
            println!("  Max steps: {}", max);
        }
        return Ok(());
    }

    let oracle = ChatCompletionsOracle::from_config(&config.oracle)?;
    let driver = ChromeDriver::new(&config.browser);
    let executor = Executor::new(driver, config.capture_options()).with_delays(config.settle_delays());
    let mut agent = Agent::new(executor, oracle, config.agent_config());

    println!("Running: {}", config.task.instruction);
    let result = agent.run(&config.task).await;
    if let Err(e) = agent.close().await {
        tracing::warn!("Failed to close browser: {}", e);
    }

    println!();
    match result {
        Ok(information) => {
            println!("✓ Done");
            for line in &information {
                println!("{}", line);
            }
            Ok(())
        }
        Err(failure) => {
            println!("✗ Failed");
            println!("  Error: {}", failure.error);
            println!("  Actions: {}", failure.history_len);
            for line in &failure.information {
                println!("{}", line);
            }
            std::process::exit(1);
        }
    }
}
