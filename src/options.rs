// Copyright 2024 Cornell University
// released under MIT License

use std::path::PathBuf;

use clap::Args;

pub const DEFAULT_OUTPUT: &str = "MoverChecker.bpl";

/// Options of the mover-checking pass, meant to be flattened into the
/// command line of the surrounding verifier
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct MoverCheckOptions {
    /// Where to write the generated checker program
    #[arg(long = "mover-output", value_name = "FILE", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Start the checker program with a comment naming the tool version and
    /// the command line it was invoked with
    #[arg(long)]
    pub show_env: bool,
}

impl Default for MoverCheckOptions {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            show_env: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        mover: MoverCheckOptions,
    }

    #[test]
    fn defaults_match_parsed_defaults() {
        let cli = Cli::parse_from(["verifier"]);
        assert_eq!(cli.mover, MoverCheckOptions::default());
        assert_eq!(cli.mover.output, PathBuf::from("MoverChecker.bpl"));
    }

    #[test]
    fn parse_flags() {
        let cli = Cli::parse_from([
            "verifier",
            "--mover-output",
            "out/checks.bpl",
            "--show-env",
        ]);
        assert_eq!(cli.mover.output, PathBuf::from("out/checks.bpl"));
        assert!(cli.mover.show_env);
    }
}
