//! Line matchers, tried in priority order by the log parser.
//!
//! Each matcher recognizes one line grammar. New grammars are added by
//! appending a matcher, never by widening an existing pattern.

use std::net::{IpAddr, SocketAddr};
use std::sync::LazyLock;

use regex::Regex;

use super::timestamp::Stamped;
use crate::model::{Event, PlayerId, WorldEventKind};

pub trait LineMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return an event if the stamped line belongs to this grammar.
    fn try_parse(&self, line: &Stamped<'_>) -> Option<Event>;
}

/// The built-in matchers, most specific first.
pub fn default_matchers() -> Vec<Box<dyn LineMatcher>> {
    vec![
        Box::new(ScumLogin),
        Box::new(ScumLogout),
        Box::new(PlayerLogin),
        Box::new(PlayerLogout),
        Box::new(ScumChat),
        Box::new(KillFeed),
        Box::new(EngineCategory),
    ]
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
}

fn clean_name(raw: &str) -> String {
    raw.trim().chars().filter(|c| !c.is_control()).collect()
}

// 2024.01.15-12.00.01: '1.2.3.4 76561198000000001:Alice(12)' logged in at: X=… Y=… Z=…
static SCUM_LOGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^'(?:(?P<ip>[0-9A-Fa-f.:\[\]]+)\s+)?(?P<id>\d+):(?P<name>.*)\(\d+\)'\s+logged in\b")
        .expect("scum login regex")
});

pub struct ScumLogin;

impl LineMatcher for ScumLogin {
    fn name(&self) -> &'static str {
        "scum_login"
    }

    fn try_parse(&self, line: &Stamped<'_>) -> Option<Event> {
        let caps = SCUM_LOGIN.captures(line.body)?;
        Some(Event::Connected {
            player_id: PlayerId::new(&caps["id"]),
            display_name: clean_name(&caps["name"]),
            ip: caps.name("ip").and_then(|m| parse_ip(m.as_str())),
            time: line.time,
        })
    }
}

// '76561198000000001:Alice(12)' logged out at: X=… Y=… Z=…
static SCUM_LOGOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^'(?:[0-9A-Fa-f.:\[\]]+\s+)?(?P<id>\d+):(?P<name>.*)\(\d+\)'\s+logged out\b")
        .expect("scum logout regex")
});

pub struct ScumLogout;

impl LineMatcher for ScumLogout {
    fn name(&self) -> &'static str {
        "scum_logout"
    }

    fn try_parse(&self, line: &Stamped<'_>) -> Option<Event> {
        let caps = SCUM_LOGOUT.captures(line.body)?;
        Some(Event::Disconnected {
            player_id: PlayerId::new(&caps["id"]),
            display_name: Some(clean_name(&caps["name"])),
            time: line.time,
        })
    }
}

// Player 'Alice' (P1) logged in from 1.2.3.4
static PLAYER_LOGIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Player '(?P<name>.*)' \((?P<id>[^()\s]+)\) logged in(?: from (?P<ip>\S+))?")
        .expect("player login regex")
});

pub struct PlayerLogin;

impl LineMatcher for PlayerLogin {
    fn name(&self) -> &'static str {
        "player_login"
    }

    fn try_parse(&self, line: &Stamped<'_>) -> Option<Event> {
        let caps = PLAYER_LOGIN.captures(line.body)?;
        Some(Event::Connected {
            player_id: PlayerId::new(&caps["id"]),
            display_name: clean_name(&caps["name"]),
            ip: caps.name("ip").and_then(|m| parse_ip(m.as_str())),
            time: line.time,
        })
    }
}

// Player 'Alice' (P1) logged out
static PLAYER_LOGOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Player '(?P<name>.*)' \((?P<id>[^()\s]+)\) logged out")
        .expect("player logout regex")
});

pub struct PlayerLogout;

impl LineMatcher for PlayerLogout {
    fn name(&self) -> &'static str {
        "player_logout"
    }

    fn try_parse(&self, line: &Stamped<'_>) -> Option<Event> {
        let caps = PLAYER_LOGOUT.captures(line.body)?;
        Some(Event::Disconnected {
            player_id: PlayerId::new(&caps["id"]),
            display_name: Some(clean_name(&caps["name"])),
            time: line.time,
        })
    }
}

// '76561198000000001:Alice(12)' 'Global: hello there'
static SCUM_CHAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^'(?P<id>\d+):(?P<name>.*?)\(\d+\)'\s+'(?P<channel>[A-Za-z]+):\s?(?P<text>.*?)'?$")
        .expect("scum chat regex")
});

pub struct ScumChat;

impl LineMatcher for ScumChat {
    fn name(&self) -> &'static str {
        "scum_chat"
    }

    fn try_parse(&self, line: &Stamped<'_>) -> Option<Event> {
        let caps = SCUM_CHAT.captures(line.body)?;
        Some(Event::ChatMessage {
            player_id: PlayerId::new(&caps["id"]),
            display_name: clean_name(&caps["name"]),
            channel: caps["channel"].to_string(),
            text: caps["text"].to_string(),
            time: line.time,
        })
    }
}

// Died: Bob (76561198000000002), Killer: Alice (76561198000000001) Weapon: AK-47
static KILL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^Died:\s*(?P<victim>.+?)(?:\s*\([^)]*\))?(?:,\s*Killer:\s*(?P<killer>.+?)(?:\s*\([^)]*\))?)?(?:\s+Weapon:.*)?$",
    )
    .expect("kill regex")
});

pub struct KillFeed;

impl LineMatcher for KillFeed {
    fn name(&self) -> &'static str {
        "kill_feed"
    }

    fn try_parse(&self, line: &Stamped<'_>) -> Option<Event> {
        let caps = KILL.captures(line.body)?;
        Some(Event::WorldEvent {
            kind: WorldEventKind::Kill {
                victim: clean_name(&caps["victim"]),
                killer: caps.name("killer").map(|m| clean_name(m.as_str())),
            },
            detail: line.body.to_string(),
            time: line.time,
        })
    }
}

// LogSCUM: Server is ready
static ENGINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Log(?P<category>[A-Za-z][A-Za-z0-9_]*):\s*(?P<detail>.*)$")
        .expect("engine category regex")
});

pub struct EngineCategory;

impl LineMatcher for EngineCategory {
    fn name(&self) -> &'static str {
        "engine_category"
    }

    fn try_parse(&self, line: &Stamped<'_>) -> Option<Event> {
        let caps = ENGINE.captures(line.body)?;
        Some(Event::WorldEvent {
            kind: WorldEventKind::Engine {
                category: caps["category"].to_string(),
            },
            detail: caps["detail"].to_string(),
            time: line.time,
        })
    }
}
