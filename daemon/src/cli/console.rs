//! Admin console on stdin while the daemon runs.

use chrono::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::dispatch::{AdminOp, MAX_BAN_DAYS};
use crate::model::{Coordinates, PlayerId};
use crate::monitor::{Reply, Request};

const HELP: &str = "\
commands:
  roster                          players online
  status                          counters and RCON state
  kick <player> <reason...>
  ban <player> [--days N] <reason...>
  teleport <player> <x> <y> <z>
  exec <command...>               raw RCON command
  quit";

#[derive(Debug, PartialEq)]
enum Input {
    Send(Request),
    Help,
    Quit,
}

/// Read commands until `quit` or end of input.
///
/// `quit` fires `on_quit`; end of input just stops reading so a daemon with a
/// closed stdin keeps running.
pub async fn run(
    requests: mpsc::Sender<(Request, Reply)>,
    on_quit: oneshot::Sender<()>,
    to_stderr: bool,
) {
    let say = |text: &str| {
        if to_stderr {
            eprintln!("{text}");
        } else {
            println!("{text}");
        }
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Console input closed");
                return;
            }
            Err(e) => {
                debug!(error = %e, "Console read failed");
                return;
            }
        };

        let request = match parse(&line) {
            Ok(Some(Input::Send(request))) => request,
            Ok(Some(Input::Help)) => {
                say(HELP);
                continue;
            }
            Ok(Some(Input::Quit)) => {
                let _ = on_quit.send(());
                return;
            }
            Ok(None) => continue,
            Err(message) => {
                say(&format!("{message}\n(type 'help' for commands)"));
                continue;
            }
        };

        let (reply, answer) = oneshot::channel();
        if requests.send((request, reply)).await.is_err() {
            return;
        }
        match answer.await {
            Ok(text) => say(&text),
            Err(_) => say("no answer (monitor stopped)"),
        }
    }
}

fn parse(line: &str) -> Result<Option<Input>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let input = match verb {
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        "roster" | "who" => Input::Send(Request::Roster),
        "status" => Input::Send(Request::Status),
        "exec" => {
            if rest.is_empty() {
                return Err("usage: exec <command...>".into());
            }
            Input::Send(Request::Raw(rest.join(" ")))
        }
        "kick" => {
            let [player, reason @ ..] = rest.as_slice() else {
                return Err("usage: kick <player> <reason...>".into());
            };
            Input::Send(Request::Admin(AdminOp::Kick {
                player: PlayerId::from(*player),
                reason: reason_text(reason)?,
            }))
        }
        "ban" => {
            let [player, tail @ ..] = rest.as_slice() else {
                return Err("usage: ban <player> [--days N] <reason...>".into());
            };
            let (duration, reason) = match tail {
                ["--days", days, reason @ ..] => {
                    let duration = days
                        .parse::<i64>()
                        .ok()
                        .filter(|d| (1..=MAX_BAN_DAYS).contains(d))
                        .and_then(Duration::try_days)
                        .ok_or_else(|| {
                            format!("invalid day count: {days} (1 to {MAX_BAN_DAYS})")
                        })?;
                    (Some(duration), reason)
                }
                reason => (None, reason),
            };
            Input::Send(Request::Admin(AdminOp::Ban {
                player: PlayerId::from(*player),
                reason: reason_text(reason)?,
                duration,
            }))
        }
        "teleport" | "tp" => {
            let [player, x, y, z] = rest.as_slice() else {
                return Err("usage: teleport <player> <x> <y> <z>".into());
            };
            let coord = |v: &str| v.parse::<f64>().map_err(|_| format!("invalid coordinate: {v}"));
            Input::Send(Request::Admin(AdminOp::Teleport {
                player: PlayerId::from(*player),
                to: Coordinates {
                    x: coord(*x)?,
                    y: coord(*y)?,
                    z: coord(*z)?,
                },
            }))
        }
        other => return Err(format!("unknown command: {other}")),
    };
    Ok(Some(input))
}

fn reason_text(words: &[&str]) -> Result<String, String> {
    if words.is_empty() {
        return Err("a reason is required".into());
    }
    Ok(words.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin(line: &str) -> AdminOp {
        match parse(line) {
            Ok(Some(Input::Send(Request::Admin(op)))) => op,
            other => panic!("expected admin op from {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn parses_kick_with_multi_word_reason() {
        assert_eq!(
            admin("kick P1 spawn camping again"),
            AdminOp::Kick {
                player: PlayerId::from("P1"),
                reason: "spawn camping again".into(),
            }
        );
    }

    #[test]
    fn parses_timed_and_permanent_bans() {
        assert_eq!(
            admin("ban P1 --days 7 cheating"),
            AdminOp::Ban {
                player: PlayerId::from("P1"),
                reason: "cheating".into(),
                duration: Some(Duration::days(7)),
            }
        );
        assert!(matches!(admin("ban P1 cheating"), AdminOp::Ban { duration: None, .. }));
        assert!(parse("ban P1 --days 0 cheating").is_err());
        assert!(parse("ban P1 --days 9223372036854775807 cheating").is_err());
        assert!(parse("ban P1 --days 36501 cheating").is_err());
    }

    #[test]
    fn parses_teleport_coordinates() {
        let AdminOp::Teleport { to, .. } = admin("tp P1 100 -2.5 30") else {
            panic!("not a teleport");
        };
        assert_eq!((to.x, to.y, to.z), (100.0, -2.5, 30.0));
        assert!(parse("teleport P1 1 2").is_err());
    }

    #[test]
    fn rejects_missing_reason_and_unknown_verbs() {
        assert!(parse("kick P1").is_err());
        assert!(parse("smite P1").is_err());
        assert_eq!(parse("   "), Ok(None));
        assert_eq!(parse("quit"), Ok(Some(Input::Quit)));
        assert_eq!(
            parse("exec #ListPlayers"),
            Ok(Some(Input::Send(Request::Raw("#ListPlayers".into()))))
        );
    }
}
