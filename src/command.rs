//! Script-line parsing.
//!
//! One command per line, fields whitespace-separated:
//!
//! ```text
//! <nodeId> start <arg> <port>
//! <nodeId> msg <text> <msgId>
//! <nodeId> crash[<suffix>]
//! <nodeId> get chatLog
//! exit
//! ```
//!
//! Malformed lines (wrong field count, non-numeric id or port, unknown verb)
//! are skipped rather than rejected — scripts may contain blank or comment
//! lines and the harness must not die on them.

/// One parsed script command. Constructed, dispatched, discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Launch the node process and connect to it.
    Start {
        node: u32,
        config_arg: String,
        port: u16,
    },
    /// Forward a chat message, fire-and-forget. `rest` is the raw remainder
    /// after the node id, delivered verbatim.
    Msg { node: u32, rest: String },
    /// Forward a crash directive (any verb beginning with `crash`),
    /// fire-and-forget.
    Crash { node: u32, rest: String },
    /// Request the node's chat log; subject to the single-flight gate.
    Get { node: u32, rest: String },
    /// Begin the non-forced shutdown sequence.
    Exit,
}

impl Command {
    /// Parse one script line. Returns `None` for lines to skip.
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        if line == "exit" {
            return Some(Command::Exit);
        }

        let (id_field, rest) = line.split_once(char::is_whitespace)?;
        let node: u32 = id_field.parse().ok()?;
        let rest = rest.trim_start();

        let mut fields = rest.split_whitespace();
        let verb = fields.next()?;

        match verb {
            "start" => {
                let config_arg = fields.next()?.to_string();
                let port: u16 = fields.next()?.parse().ok()?;
                Some(Command::Start {
                    node,
                    config_arg,
                    port,
                })
            }
            "msg" => Some(Command::Msg {
                node,
                rest: rest.to_string(),
            }),
            "get" => Some(Command::Get {
                node,
                rest: rest.to_string(),
            }),
            v if v.starts_with("crash") => Some(Command::Crash {
                node,
                rest: rest.to_string(),
            }),
            _ => None,
        }
    }
}
