use clap::{Parser, Subcommand};

use self::{evaluate::EvaluateArg, train::TrainArg};

mod evaluate;
mod train;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Train a policy with CMA-ES
    Train(#[clap(flatten)] TrainArg),
    /// Play episodes with the best parameters of a checkpoint
    Evaluate(#[clap(flatten)] EvaluateArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Evaluate(arg) => evaluate::run(&arg)?,
    }
    Ok(())
}
