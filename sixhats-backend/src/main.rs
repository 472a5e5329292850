use clap::Parser;
use dotenv::dotenv;
use sixhats_backend::{Config, Orchestrator, PipelineMode};
use std::io::{IsTerminal, Read};

/// Six-hats multi-agent requirement analysis
#[derive(Parser, Debug)]
#[command(name = "sixhats-backend")]
#[command(about = "Analyze a requirement with six thinking-hat agents and print a report")]
#[command(version)]
struct Cli {
    /// Single pass: framing, search, fan-out, report
    #[arg(long, conflicts_with = "extended")]
    basic: bool,

    /// Refine loop with reviewer feedback, then report scoring
    #[arg(long)]
    extended: bool,

    /// Log every agent message at info level
    #[arg(short, long)]
    verbose: bool,

    /// Print the whole outcome as JSON instead of the bare report
    #[arg(long)]
    json: bool,

    /// The requirement; read from stdin when omitted
    #[arg(trailing_var_arg = true)]
    requirement: Vec<String>,
}

impl Cli {
    fn mode(&self) -> Option<PipelineMode> {
        if self.basic {
            Some(PipelineMode::Basic)
        } else if self.extended {
            Some(PipelineMode::Extended)
        } else {
            None
        }
    }
}

fn read_stdin() -> String {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return String::new();
    }
    let mut input = String::new();
    if let Err(e) = stdin.lock().read_to_string(&mut input) {
        log::warn!("Could not read stdin: {}", e);
    }
    input
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let requirement = if cli.requirement.is_empty() {
        read_stdin()
    } else {
        cli.requirement.join(" ")
    };
    let requirement = requirement.trim();
    if requirement.is_empty() {
        eprintln!("No requirement given. Pass it as arguments or pipe it on stdin.");
        std::process::exit(1);
    }

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(mode) = cli.mode() {
        config.mode = mode;
    }
    config.verbose |= cli.verbose;

    log::info!("Starting six-hats analysis ({} backend)", config.backend.label());
    let mut orchestrator = match Orchestrator::new(&config) {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("Failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = orchestrator.analyze_detailed(requirement).await;
    if cli.json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Could not encode outcome: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    println!("{}", outcome.report);
    if let Some(scores) = outcome.scores {
        println!("\n---\nScores: {} ({} round(s))", scores, outcome.rounds);
    }
}
