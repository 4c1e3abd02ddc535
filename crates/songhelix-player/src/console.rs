//! Textual remote-control commands.

use crate::error::PlayerError;
use crate::scheduler::SkipTarget;

/// A parsed remote-control command.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCommand {
    /// Set the tempo, in thousandths of BPM.
    Bpm(u32),
    /// Set the global melodic transposition.
    Transposition(i32),
    /// Replace the groove weights.
    Groove(Vec<u32>),
    /// Skip within the running song.
    Skip(SkipTarget),
    Quit,
    Help,
}

/// The help text listing all commands.
pub fn help_text() -> &'static str {
    "commands:\n  bpm <x>             set tempo in BPM (fractional allowed)\n  transposition <n>   set melodic transposition in semitones\n  groove <csv>        set groove weights, e.g. 5,3\n  skip <target>       skip to tick, #section, percent% or next\n  quit                stop playback and exit\n  help                show this text"
}

/// Parse one command line.
pub fn parse_command(line: &str) -> Result<RemoteCommand, PlayerError> {
    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default();
    let argument = words.next();
    let invalid = |message: String| PlayerError::Config { message };
    if words.next().is_some() {
        return Err(invalid(format!("too many arguments in '{}'", line.trim())));
    }
    match (command, argument) {
        ("bpm", Some(value)) => {
            let bpm: f64 = value
                .parse()
                .map_err(|_| invalid(format!("invalid BPM '{}'", value)))?;
            if bpm <= 0.0 {
                return Err(invalid(format!("BPM must be positive, got {}", bpm)));
            }
            Ok(RemoteCommand::Bpm((bpm * 1000.0).round() as u32))
        }
        ("transposition", Some(value)) => {
            let semitones: i32 = value
                .parse()
                .map_err(|_| invalid(format!("invalid transposition '{}'", value)))?;
            Ok(RemoteCommand::Transposition(semitones))
        }
        ("groove", Some(value)) => {
            let weights: Vec<u32> = value
                .split(',')
                .map(|w| w.trim().parse::<u32>())
                .collect::<Result<_, _>>()
                .map_err(|_| invalid(format!("invalid groove '{}'", value)))?;
            if weights.is_empty() || weights.contains(&0) {
                return Err(invalid("groove weights must be positive".to_string()));
            }
            Ok(RemoteCommand::Groove(weights))
        }
        ("skip", Some(value)) => Ok(RemoteCommand::Skip(parse_skip(value)?)),
        ("quit", None) => Ok(RemoteCommand::Quit),
        ("help", None) => Ok(RemoteCommand::Help),
        _ => Err(invalid(format!("unknown command '{}'", line.trim()))),
    }
}

/// Parse a skip target: absolute tick, `#section[.frac]`, `p%`, or `next`.
pub fn parse_skip(target: &str) -> Result<SkipTarget, PlayerError> {
    let invalid = |message: String| PlayerError::InvalidSkip {
        target: target.to_string(),
        message,
    };
    if target == "next" {
        return Ok(SkipTarget::Next);
    }
    if let Some(section) = target.strip_prefix('#') {
        let section: f64 = section
            .parse()
            .map_err(|_| invalid("expected a section number".to_string()))?;
        if section < 0.0 {
            return Err(invalid("section must be non-negative".to_string()));
        }
        return Ok(SkipTarget::Section(section));
    }
    if let Some(percent) = target.strip_suffix('%') {
        let percent: f64 = percent
            .parse()
            .map_err(|_| invalid("expected a percentage".to_string()))?;
        if !(0.0..=100.0).contains(&percent) {
            return Err(invalid("percentage out of range".to_string()));
        }
        return Ok(SkipTarget::Percent(percent));
    }
    let tick: u64 = target
        .parse()
        .map_err(|_| invalid("expected a tick number".to_string()))?;
    Ok(SkipTarget::Tick(tick))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_all_commands() {
        assert_eq!(parse_command("bpm 132.5").unwrap(), RemoteCommand::Bpm(132_500));
        assert_eq!(
            parse_command("transposition -12").unwrap(),
            RemoteCommand::Transposition(-12)
        );
        assert_eq!(
            parse_command("groove 5,3").unwrap(),
            RemoteCommand::Groove(vec![5, 3])
        );
        assert_eq!(parse_command("quit").unwrap(), RemoteCommand::Quit);
        assert_eq!(parse_command("help").unwrap(), RemoteCommand::Help);
    }

    #[test]
    fn parses_skip_targets() {
        assert_eq!(
            parse_command("skip 128").unwrap(),
            RemoteCommand::Skip(SkipTarget::Tick(128))
        );
        assert_eq!(
            parse_command("skip #3").unwrap(),
            RemoteCommand::Skip(SkipTarget::Section(3.0))
        );
        assert_eq!(
            parse_command("skip #2.5").unwrap(),
            RemoteCommand::Skip(SkipTarget::Section(2.5))
        );
        assert_eq!(
            parse_command("skip 50%").unwrap(),
            RemoteCommand::Skip(SkipTarget::Percent(50.0))
        );
        assert_eq!(
            parse_command("skip next").unwrap(),
            RemoteCommand::Skip(SkipTarget::Next)
        );
    }

    #[test]
    fn rejects_malformed_commands() {
        assert!(parse_command("bpm").is_err());
        assert!(parse_command("bpm -3").is_err());
        assert!(parse_command("groove 5,0").is_err());
        assert!(parse_command("skip 120%").is_err());
        assert!(parse_command("skip #-1").is_err());
        assert!(parse_command("warp 9").is_err());
        assert!(parse_command("quit now").is_err());
    }
}
