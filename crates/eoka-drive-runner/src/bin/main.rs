use clap::Parser;
use eoka_drive_runner::{Params, RunResult, Runner, Scenario};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "eoka-drive-runner")]
#[command(about = "Run locator-based browser scenarios from YAML")]
#[command(version)]
struct Cli {
    /// Scenario file
    scenario: PathBuf,

    /// Force headless, whatever the scenario says
    #[arg(long)]
    headless: bool,

    /// Bind a scenario parameter; repeatable
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// More logging: -v info, -vv debug
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Parse and validate, then print a summary instead of running
    #[arg(long)]
    check: bool,

    /// Log errors only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> Level {
        match (self.quiet, self.verbose) {
            (true, _) => Level::ERROR,
            (false, 0) => Level::WARN,
            (false, 1) => Level::INFO,
            (false, _) => Level::DEBUG,
        }
    }
}

#[tokio::main]
async fn main() -> eoka_drive_runner::Result<ExitCode> {
    let cli = Cli::parse();

    FmtSubscriber::builder()
        .with_max_level(cli.log_level())
        .with_target(false)
        .compact()
        .init();

    let params = Params::from_args(&cli.params)?;
    let mut scenario = Scenario::load_with_params(&cli.scenario, &params)?;

    if cli.check {
        print_summary(&scenario);
        return Ok(ExitCode::SUCCESS);
    }

    scenario.browser.headless |= cli.headless;
    let base_path = cli.scenario.parent().unwrap_or(Path::new("."));

    println!("Running: {}", scenario.name);
    let mut runner = Runner::new(&scenario.browser).await?;
    let outcome = runner.run_with_base_path(&scenario, base_path).await;
    let closed = runner.close().await;
    let result = outcome?;
    closed?;

    report(&result);
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_summary(scenario: &Scenario) {
    println!("Scenario valid: {}", scenario.name);
    println!("  Target: {}", scenario.target.url);
    println!("  Steps: {}", scenario.steps.len());
    println!("  On error: {:?}", scenario.on_error);

    if !scenario.params.is_empty() {
        let mut names: Vec<_> = scenario.params.keys().collect();
        names.sort();
        println!("  Parameters:");
        for name in names {
            let def = &scenario.params[name];
            let flag = if def.required { " (required)" } else { "" };
            match def.description.as_deref() {
                Some(desc) => println!("    - {name}{flag}: {desc}"),
                None => println!("    - {name}{flag}"),
            }
        }
    }
    if let Some(success) = &scenario.success {
        println!("  Success conditions: {}", success.len());
    }
    if let Some(retry) = scenario.on_failure.as_ref().and_then(|f| f.retry.as_ref()) {
        println!("  Attempts: {} ({}ms apart)", retry.attempts, retry.delay_ms);
    }
    println!("  Chrome args: {}", scenario.browser.chrome_args().join(" "));
}

fn report(result: &RunResult) {
    println!();
    for step in &result.steps {
        println!("{step}");
    }
    println!();

    match (&result.error, result.success) {
        (_, true) => println!("✓ Success"),
        (Some(error), false) => println!("✗ Failed: {error}"),
        (None, false) => println!("✗ Failed"),
    }
    println!(
        "  Steps: {} ({} failed)",
        result.actions_executed,
        result.failed_steps()
    );
    println!("  Duration: {}ms", result.duration_ms);
    if result.retries > 0 {
        println!("  Retries: {}", result.retries);
    }
}
