use std::{path::PathBuf, process::ExitCode};

use anyhow::Context;
use clap::{Args, Parser};
use clap_repl::{
    ClapEditor,
    reedline::{DefaultPrompt, DefaultPromptSegment},
};
use envconfig::Envconfig;
use log::{LevelFilter, debug};
use maphunt_core::{
    parse_report,
    proc_maps::ProcMemoryMaps,
    watch::{WatchKind, WatchRecipe},
};
use nix::unistd::Pid;

#[derive(Envconfig)]
struct EnvvarConfig {
    #[envconfig(from = "RUST_LOG", default = "INFO")]
    pub log_level: LevelFilter,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct ProgramArgs {
    #[command(flatten)]
    source: ReportSource,
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct ReportSource {
    /// File containing the output of `info proc mappings`
    #[arg(short, long)]
    report: Option<PathBuf>,
    /// Build the report from /proc/<PID>/maps of a running process
    #[arg(short, long)]
    pid: Option<i32>,
}

impl ReportSource {
    fn load(&self) -> anyhow::Result<String> {
        if let Some(pid) = self.pid {
            let maps = ProcMemoryMaps::from_pid(Pid::from_raw(pid))
                .with_context(|| format!("Failed to read memory maps of process {pid}"))?;
            return Ok(maps.render_report());
        }

        match self.report.as_deref() {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read report file {}", path.display())),
            None => anyhow::bail!("Either a report file or a pid is required"),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "")]
enum ReplCommand {
    /// Print every mapping of the loaded report
    #[clap(alias = "m")]
    Maps,
    /// Print the mapping containing an address
    #[clap(alias = "f")]
    Find {
        /// A decimal (123) or hexadecimal (0x123) address
        #[clap(value_parser=clap_num::maybe_hex::<u64>)]
        address: u64,
    },
    /// Print the commands watching the preview2 adapter's reference counts
    #[clap(alias = "h")]
    Hunt {
        /// Number the debugger will give the first new watchpoint
        #[clap(long, default_value_t = 1)]
        first: u32,
    },
    /// Print the commands for watching a single expression
    #[clap(alias = "w")]
    Watch {
        expression: String,
        #[clap(long, default_value = "watch", value_parser = parse_watch_kind)]
        kind: WatchKind,
        /// Hits to let pass before stopping
        #[clap(long, default_value_t = 0)]
        ignore: u32,
        #[clap(long, default_value_t = 1)]
        first: u32,
    },
    /// Read the report source again
    #[clap(alias = "r")]
    Reload,
    #[clap(alias = "q")]
    Quit,
}

fn parse_watch_kind(s: &str) -> Result<WatchKind, String> {
    WatchKind::try_from(s)
}

fn print_commands(recipe: &WatchRecipe, first: u32) {
    match recipe.to_commands(first) {
        Ok(commands) => {
            for command in commands {
                if command.starts_with("print &") {
                    if let Some(label) = recipe.location_label() {
                        println!("{label}");
                    }
                }
                println!("{command}");
            }
        }
        Err(err) => println!("Failed to build watch commands: {err}"),
    }
}

fn main() -> std::process::ExitCode {
    // For development/testing only
    let _ = dotenvy::dotenv();

    let config = match EnvvarConfig::init_from_env() {
        Ok(config) => config,
        Err(error) => {
            println!("Got error while parsing environment variables: {error}");
            return ExitCode::FAILURE;
        }
    };
    env_logger::builder().filter_level(config.log_level).init();

    let args = ProgramArgs::parse();

    let mut report_text = match args.source.load() {
        Ok(text) => text,
        Err(err) => {
            println!("Failed to load memory-map report: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    debug!("Loaded {} bytes of report text", report_text.len());

    let prompt = DefaultPrompt {
        left_prompt: DefaultPromptSegment::Empty,
        right_prompt: DefaultPromptSegment::Empty,
    };
    let rl = ClapEditor::<ReplCommand>::builder()
        .with_prompt(Box::new(prompt))
        .build();

    rl.repl(|command| match command {
        ReplCommand::Maps => match parse_report(&report_text) {
            Ok(report) if report.is_empty() => println!("No mappings in report"),
            Ok(report) => print!("{report}"),
            Err(err) => println!("Failed to parse report: {err}"),
        },
        ReplCommand::Find { address } => {
            let found = parse_report(&report_text)
                .map_err(maphunt_core::Error::from)
                .and_then(|report| report.find_containing(address).map(|record| record.cloned()));
            match found {
                Ok(Some(record)) => println!("{address:#x} is in {record}"),
                Ok(None) => println!("{address:#x} is not mapped"),
                Err(err) => println!("Failed to look up address: {err}"),
            }
        }
        ReplCommand::Hunt { first } => {
            print_commands(&WatchRecipe::preview2_adapter(), first);
            println!("Continue to go to offending write");
        }
        ReplCommand::Watch {
            expression,
            kind,
            ignore,
            first,
        } => print_commands(&WatchRecipe::new().watch(expression, kind, ignore), first),
        ReplCommand::Reload => match args.source.load() {
            Ok(text) => report_text = text,
            Err(err) => println!("Failed to reload memory-map report: {err:#}"),
        },
        ReplCommand::Quit => {
            std::process::exit(0);
        }
    });

    ExitCode::SUCCESS
}
