// src/core/help.rs

use crate::models::{Command, MetaAbout};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// The file-level help: name, version, free text and the visible commands
/// grouped by tag, each group sorted by command name.
pub fn render_overview<'a>(
    name: &str,
    about: &MetaAbout,
    commands: impl Iterator<Item = &'a Command>,
) -> String {
    let mut groups: BTreeMap<String, Vec<&Command>> = BTreeMap::new();
    for command in commands {
        for tag in command.head().tags() {
            groups.entry(tag).or_default().push(command);
        }
    }
    let width = groups
        .values()
        .flatten()
        .map(|command| command.name().len())
        .max()
        .unwrap_or(0);

    let mut text = String::new();
    let _ = writeln!(text, "{} ({})", name, about.version);
    if !about.help.is_empty() {
        let _ = writeln!(text, "\n{}", about.help.trim());
    }
    if !about.usage.is_empty() {
        let _ = writeln!(text, "\nusage: {}", about.usage.trim());
    }
    for (tag, mut commands) in groups {
        commands.sort_by(|a, b| a.name().cmp(b.name()));
        let _ = writeln!(text, "\n{}:", tag);
        for command in commands {
            let _ = writeln!(
                text,
                "  {:<width$}  {}",
                command.name(),
                command.head().short,
                width = width
            );
        }
    }
    if !about.author.is_empty() {
        let contact = if about.email.is_empty() {
            about.author.clone()
        } else {
            format!("{} <{}>", about.author, about.email)
        };
        let _ = writeln!(text, "\nauthor: {}", contact);
    }
    text.trim_end().to_string()
}

/// Help of a single command.
pub fn render_command(command: &Command) -> String {
    let head = command.head();
    let mut text = String::new();
    let _ = writeln!(text, "{}", head.name);
    if !head.short.is_empty() {
        let _ = writeln!(text, "\n{}", head.short);
    }
    if !head.desc.is_empty() {
        let _ = writeln!(text, "\n{}", head.desc.trim());
    }
    let _ = writeln!(text, "\nusage: {}", head.usage());
    if !head.alias.is_empty() {
        let _ = writeln!(text, "alias: {}", head.alias.join(", "));
    }
    let _ = writeln!(text, "tags: {}", head.tags().join(", "));
    if head.retry > 0 {
        let _ = writeln!(text, "retry: {}", head.retry);
    }
    if !head.options.is_empty() {
        let _ = writeln!(text, "\noptions:");
        for option in &head.options {
            let _ = writeln!(text, "  {:<24}  {}", option.usage(), option.help);
        }
    }
    let hosts = command.targets();
    if !hosts.is_empty() {
        let names: Vec<String> = hosts.iter().map(ToString::to_string).collect();
        let _ = writeln!(text, "\nhosts: {}", names.join(", "));
    }
    text.trim_end().to_string()
}
