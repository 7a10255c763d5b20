use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use tracing::Level;

pub const ARG_VERBOSITY: &str = "verbosity";

/// Level names accepted by `TESSERA_LOG_LEVEL`, indexed by verbosity count.
const LEVEL_NAMES: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

fn parse_level(value: &str) -> Result<u8, String> {
    if let Ok(count) = value.parse::<u8>() {
        return Ok(count);
    }
    LEVEL_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(value.trim()))
        .and_then(|index| u8::try_from(index).ok())
        .ok_or_else(|| format!("invalid log level {value:?}, expected one of {LEVEL_NAMES:?}"))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Repeat to raise verbosity (-v warn, -vv info, -vvv debug, -vvvv trace)")
            .long_help("Verbosity level, as a -v count or as a name in TESSERA_LOG_LEVEL. RUST_LOG overrides it.")
            .env("TESSERA_LOG_LEVEL")
            .global(true)
            .action(ArgAction::Count)
            .value_parser(ValueParser::new(parse_level)),
    )
}

/// Level requested on the command line; `None` keeps the errors-only default.
#[must_use]
pub fn level(matches: &ArgMatches) -> Option<Level> {
    match matches.get_one::<u8>(ARG_VERBOSITY).copied().unwrap_or(0) {
        0 => None,
        1 => Some(Level::WARN),
        2 => Some(Level::INFO),
        3 => Some(Level::DEBUG),
        _ => Some(Level::TRACE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_and_counts_parse() {
        assert_eq!(parse_level("DEBUG"), Ok(3));
        assert_eq!(parse_level("2"), Ok(2));
        assert!(parse_level("verbose").is_err());
    }

    #[test]
    fn counts_map_to_levels() {
        temp_env::with_var_unset("TESSERA_LOG_LEVEL", || {
            let command = with_args(Command::new("tessera"));
            let quiet = command.clone().get_matches_from(["tessera"]);
            assert_eq!(level(&quiet), None);

            let loud = command.get_matches_from(["tessera", "-vvvvv"]);
            assert_eq!(level(&loud), Some(Level::TRACE));
        });
    }
}
