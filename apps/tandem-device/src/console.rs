//! Line-oriented stdin console.

use tandem_core::{PlayerCommand, RepeatMode, SessionCommand, SessionSnapshot};

pub const HELP: &str = "\
commands:
  play | pause | toggle | next | prev
  seek <seconds> | vol <0..1> | mute | unmute
  shuffle on|off | repeat off|one|all
  track <id> | load <id>... | add <id>... | remove <index> | clear | skip <index>
  take | release | status | devices | help | quit";

#[derive(Debug, PartialEq)]
pub enum ConsoleAction {
    Session(SessionCommand),
    Status,
    Devices,
    Help,
    Quit,
}

fn number<T: std::str::FromStr>(arg: Option<&str>, what: &str) -> Result<T, String> {
    arg.ok_or_else(|| format!("missing {what}"))?
        .parse()
        .map_err(|_| format!("invalid {what}"))
}

fn ids(args: &[&str]) -> Result<Vec<String>, String> {
    if args.is_empty() {
        return Err("missing track id".to_string());
    }
    Ok(args.iter().map(|s| s.to_string()).collect())
}

/// Parses one console line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleAction>, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        return Ok(None);
    };
    let arg = args.first().copied();

    let player = match verb.to_ascii_lowercase().as_str() {
        "play" => PlayerCommand::Play,
        "pause" => PlayerCommand::Pause,
        "toggle" => PlayerCommand::TogglePlayPause,
        "next" => PlayerCommand::Next,
        "prev" | "previous" => PlayerCommand::Previous,
        "seek" => PlayerCommand::Seek {
            position: number(arg, "position")?,
        },
        "vol" | "volume" => PlayerCommand::SetVolume {
            volume: number(arg, "volume")?,
        },
        "mute" => PlayerCommand::SetMuted { muted: true },
        "unmute" => PlayerCommand::SetMuted { muted: false },
        "shuffle" => PlayerCommand::SetShuffle {
            shuffle: match arg {
                Some("on") => true,
                Some("off") => false,
                _ => return Err("usage: shuffle on|off".to_string()),
            },
        },
        "repeat" => PlayerCommand::SetRepeat {
            repeat: arg
                .ok_or("usage: repeat off|one|all")?
                .parse::<RepeatMode>()?,
        },
        "track" => PlayerCommand::PlayTrack {
            track_id: arg.ok_or("missing track id")?.to_string(),
        },
        "load" => PlayerCommand::LoadQueue {
            track_ids: ids(args)?,
            start_index: 0,
        },
        "add" => PlayerCommand::AddToQueue {
            track_ids: ids(args)?,
        },
        "remove" => PlayerCommand::RemoveFromQueue {
            index: number(arg, "index")?,
        },
        "clear" => PlayerCommand::ClearQueue,
        "skip" => PlayerCommand::SkipTo {
            index: number(arg, "index")?,
        },
        "take" => return Ok(Some(ConsoleAction::Session(SessionCommand::BecomeOutput))),
        "release" => return Ok(Some(ConsoleAction::Session(SessionCommand::ReleaseOutput))),
        "status" => return Ok(Some(ConsoleAction::Status)),
        "devices" => return Ok(Some(ConsoleAction::Devices)),
        "help" | "?" => return Ok(Some(ConsoleAction::Help)),
        "quit" | "exit" => return Ok(Some(ConsoleAction::Quit)),
        other => return Err(format!("unknown command '{other}' (try 'help')")),
    };
    Ok(Some(ConsoleAction::Session(player.into())))
}

fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn format_status(snapshot: &SessionSnapshot) -> String {
    let mut line = format!("[{}] {:?}", snapshot.role, snapshot.connection);
    if let Some(output) = snapshot.output_device() {
        line.push_str(&format!(" | output: {}", output.name));
    }
    match snapshot
        .playback
        .as_ref()
        .and_then(|p| p.current_track.as_ref())
    {
        Some(track) => {
            let position = snapshot.estimated_position.unwrap_or(0.0);
            let state = if snapshot.is_playing() { "playing" } else { "paused" };
            let title = if track.title.is_empty() {
                track.id.as_str()
            } else {
                track.title.as_str()
            };
            line.push_str(&format!(
                " | {} {} {}/{}",
                state,
                title,
                clock(position),
                clock(track.duration)
            ));
        }
        None => line.push_str(" | nothing playing"),
    }
    if let Some(transfer) = &snapshot.transfer {
        line.push_str(&format!(" | transfer {} ({:?})", transfer.transfer_id, transfer.role));
    }
    line
}

pub fn format_devices(snapshot: &SessionSnapshot) -> String {
    if snapshot.devices.is_empty() {
        return "no devices".to_string();
    }
    snapshot
        .devices
        .iter()
        .map(|d| {
            let me = if Some(d.id) == snapshot.my_device_id { " (this)" } else { "" };
            let output = if d.is_output_device { " *output*" } else { "" };
            format!("  #{} {} [{}]{}{}", d.id, d.name, d.device_type, output, me)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
