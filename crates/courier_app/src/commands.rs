//! Line-oriented input: slash commands for settings and queue control, anything else is chat.

use courier_core::{AiConfigState, ConfigKind, ConfigMsg, ConfigValue, Msg};

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Dispatch(Vec<Msg>),
    Status,
    Help,
    Quit,
    Unknown(String),
    Ignore,
}

pub const HELP: &str = "\
commands:
  /clear                    drop every queued message
  /flush                    write processed messages to the chat history
  /status                   show queue and settings state
  /provider <name> [url]    switch provider (optionally with base url)
  /model <model>            switch model
  /persona <name>           rename the assistant
  /tone <tone>              change the response tone
  /instruct <text>          add a standing instruction (empty clears them)
  /theme <theme>            change the theme
  /timestamps on|off        show message timestamps
  /compact on|off           compact output
  /sync                     retry every unsynced settings slice
  /revert                   drop unsynced settings edits
  /quit                     exit
anything else is sent as a chat message";

pub fn parse_command(line: &str, config: &AiConfigState, now_ms: i64) -> Command {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Command::Ignore;
    }
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Command::Dispatch(vec![Msg::EnqueueRequested {
            content: line.to_string(),
            timestamp_ms: now_ms,
        }]);
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "clear" => Command::Dispatch(vec![Msg::ClearRequested]),
        "flush" => Command::Dispatch(vec![Msg::FlushBufferRequested]),
        "status" => Command::Status,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        "sync" => Command::Dispatch(for_dirty(config, ConfigMsg::RetrySync)),
        "revert" => Command::Dispatch(for_dirty(config, ConfigMsg::Revert)),
        "provider" => {
            let mut parts = arg.split_whitespace();
            let Some(provider) = parts.next() else {
                return Command::Unknown(line.to_string());
            };
            let mut value = config.provider.value().clone();
            value.provider = provider.to_string();
            if let Some(url) = parts.next() {
                value.base_url = url.to_string();
            }
            set(ConfigValue::Provider(value))
        }
        "model" if !arg.is_empty() => {
            let mut value = config.provider.value().clone();
            value.model = arg.to_string();
            set(ConfigValue::Provider(value))
        }
        "persona" if !arg.is_empty() => {
            let mut value = config.personality.value().clone();
            value.name = arg.to_string();
            set(ConfigValue::Personality(value))
        }
        "tone" if !arg.is_empty() => {
            let mut value = config.personality.value().clone();
            value.tone = arg.to_string();
            set(ConfigValue::Personality(value))
        }
        "instruct" => {
            let mut value = config.personality.value().clone();
            if arg.is_empty() {
                value.instructions.clear();
            } else {
                value.instructions.push(arg.to_string());
            }
            set(ConfigValue::Personality(value))
        }
        "theme" if !arg.is_empty() => {
            let mut value = config.interface.value().clone();
            value.theme = arg.to_string();
            set(ConfigValue::Interface(value))
        }
        "timestamps" | "compact" => match parse_switch(arg) {
            Some(on) => {
                let mut value = config.interface.value().clone();
                if name == "timestamps" {
                    value.show_timestamps = on;
                } else {
                    value.compact = on;
                }
                set(ConfigValue::Interface(value))
            }
            None => Command::Unknown(line.to_string()),
        },
        _ => Command::Unknown(line.to_string()),
    }
}

fn set(value: ConfigValue) -> Command {
    Command::Dispatch(vec![Msg::Config(ConfigMsg::Set(value))])
}

fn for_dirty(config: &AiConfigState, make: fn(ConfigKind) -> ConfigMsg) -> Vec<Msg> {
    ConfigKind::ALL
        .into_iter()
        .filter(|kind| config.is_dirty(*kind))
        .map(|kind| Msg::Config(make(kind)))
        .collect()
}

fn parse_switch(arg: &str) -> Option<bool> {
    match arg {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}
