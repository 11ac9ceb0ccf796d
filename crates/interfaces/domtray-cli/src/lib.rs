pub mod commands;
pub mod script;

use clap::ValueEnum;

#[derive(ValueEnum, Clone, Debug, Copy, PartialEq, Eq, Default)]
pub enum CliOutput {
    #[default]
    Text,
    Json,
}
