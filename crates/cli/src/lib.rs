pub mod commands;
pub mod handlers;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "parley",
    about = "Parley Slack bot runtime",
    long_about = "Run the demo coffee bot, post messages, ask users questions, and inspect readiness.",
    after_help = "Examples:\n  parley run --seconds 60\n  parley post --channel C123 --text hello --reaction coffee\n  parley ask --channel C123 --user U456 --question 'Deploy?' --answer yes --answer no\n  parley doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Poll for mentions and answer them with the coffee demo handler")]
    Run {
        #[arg(long, help = "Stop polling after this many seconds (overrides bot.non_stop)")]
        seconds: Option<u64>,
    },
    #[command(about = "Post a message to a channel, optionally reacting to it")]
    Post {
        #[arg(long)]
        channel: String,
        #[arg(long)]
        text: String,
        #[arg(long, help = "Emoji name to add as a reaction, with or without colons")]
        reaction: Option<String>,
    },
    #[command(about = "Ask a user a question and wait for one of the allowed answers")]
    Ask {
        #[arg(long)]
        channel: String,
        #[arg(long, help = "Slack user id expected to answer")]
        user: String,
        #[arg(long)]
        question: String,
        #[arg(long = "answer", required = true, help = "Allowed answer; repeat for more")]
        answers: Vec<String>,
        #[arg(long, help = "Ticks to wait before giving up (defaults to bot.answer_wait_ticks)")]
        ticks: Option<u32>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Slack token readiness, and Slack authentication")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run { seconds } => commands::run::run(seconds),
        Command::Post { channel, text, reaction } => {
            commands::post::run(&channel, &text, reaction.as_deref())
        }
        Command::Ask { channel, user, question, answers, ticks } => {
            commands::ask::run(commands::ask::AskArgs {
                channel: &channel,
                user: &user,
                question: &question,
                answers: &answers,
                ticks,
            })
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
