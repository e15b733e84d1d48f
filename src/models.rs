// src/models.rs

use crate::constants::{DEFAULT_HTTP_ADDR, DEFAULT_SSH_PORT, DEFAULT_TAG, DEFAULT_VERSION};
use crate::core::env::Scope;
use crate::core::validate::Rule;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// --- COMMAND DEFINITIONS ---

/// One edge of the dependency graph as written in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandDep {
    pub name: String,
    pub args: Vec<String>,
    /// Runs concurrently with its siblings.
    pub background: bool,
    /// A missing or failing target does not abort the parent.
    pub optional: bool,
}

/// A named option accepted by a command (`-s value`, `--long value`, `--flag`).
#[derive(Debug, Clone, Default)]
pub struct CommandOption {
    pub short: Option<String>,
    pub long: Option<String>,
    pub help: String,
    pub required: bool,
    pub flag: bool,
    pub default: Option<String>,
    pub valid: Option<Rule>,
}

impl CommandOption {
    /// The name the option is bound under: the long name when present.
    pub fn name(&self) -> &str {
        self.long
            .as_deref()
            .or(self.short.as_deref())
            .unwrap_or_default()
    }

    /// True when `name` is either spelling of this option.
    pub fn matches(&self, name: &str) -> bool {
        self.long.as_deref() == Some(name) || self.short.as_deref() == Some(name)
    }

    /// Usage fragment, e.g. `-v|--verbose` or `--out <out>`.
    pub fn usage(&self) -> String {
        let mut names = Vec::new();
        if let Some(short) = &self.short {
            names.push(format!("-{}", short));
        }
        if let Some(long) = &self.long {
            names.push(format!("--{}", long));
        }
        let spelled = names.join("|");
        let body = if self.flag {
            spelled
        } else {
            format!("{} <{}>", spelled, self.name())
        };
        if self.required {
            body
        } else {
            format!("[{}]", body)
        }
    }
}

/// A declared positional argument.
#[derive(Debug, Clone)]
pub struct CommandArg {
    pub name: String,
    pub valid: Option<Rule>,
}

/// A remote host a command is dispatched to, written `[user@]host[:port]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandTarget {
    pub user: Option<String>,
    pub host: String,
    pub port: u16,
}

impl CommandTarget {
    /// Parses a host specification. Returns `None` for an empty host or a bad port.
    pub fn parse(spec: &str) -> Option<Self> {
        let (user, rest) = match spec.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some((_, rest)) => (None, rest),
            None => (None, spec),
        };
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().ok()?),
            None => (rest, DEFAULT_SSH_PORT),
        };
        if host.is_empty() {
            return None;
        }
        Some(Self {
            user,
            host: host.to_string(),
            port,
        })
    }

    /// `host:port`, the key used to deduplicate targets.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.user {
            Some(user) => write!(f, "{}@{}", user, self.address()),
            None => write!(f, "{}", self.address()),
        }
    }
}

/// Everything the decoder records about one declared command.
#[derive(Debug, Clone)]
pub struct CommandSettings {
    pub name: String,
    pub visible: bool,
    /// Kept sorted for binary search.
    pub alias: Vec<String>,
    pub short: String,
    pub desc: String,
    pub categories: Vec<String>,
    /// Declared for documentation purposes; never applied.
    pub retry: u32,
    pub workdir: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub hosts: Vec<CommandTarget>,
    pub deps: Vec<CommandDep>,
    pub options: Vec<CommandOption>,
    pub args: Vec<CommandArg>,
    pub lines: Vec<String>,
    /// Exported environment variables visible when the command was declared.
    pub exports: BTreeMap<String, String>,
    /// Shell aliases visible when the command was declared.
    pub aliases: BTreeMap<String, String>,
    /// Flattened variable scope captured at declaration time.
    pub locals: Scope,
}

impl CommandSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            alias: Vec::new(),
            short: String::new(),
            desc: String::new(),
            categories: Vec::new(),
            retry: 0,
            workdir: None,
            timeout: None,
            hosts: Vec::new(),
            deps: Vec::new(),
            options: Vec::new(),
            args: Vec::new(),
            lines: Vec::new(),
            exports: BTreeMap::new(),
            aliases: BTreeMap::new(),
            locals: Scope::new(),
        }
    }

    /// The declared tags, or the default tag when none were given.
    pub fn tags(&self) -> Vec<String> {
        if self.categories.is_empty() {
            vec![DEFAULT_TAG.to_string()]
        } else {
            self.categories.clone()
        }
    }

    pub fn has_alias(&self, name: &str) -> bool {
        self.alias
            .binary_search_by(|alias| alias.as_str().cmp(name))
            .is_ok()
    }

    /// One-line usage string built from the declared options and arguments.
    pub fn usage(&self) -> String {
        let mut parts = vec![self.name.clone()];
        parts.extend(self.options.iter().map(CommandOption::usage));
        parts.extend(self.args.iter().map(|arg| format!("<{}>", arg.name)));
        parts.join(" ")
    }
}

/// A registered command: one definition, or several combined under one name.
#[derive(Debug, Clone)]
pub enum Command {
    Single(Arc<CommandSettings>),
    /// Definitions appended under the same name, in declaration order.
    Combined(Arc<CommandSettings>, Vec<Arc<CommandSettings>>),
}

impl Command {
    /// The first definition; it supplies the name, visibility and help.
    pub fn head(&self) -> &Arc<CommandSettings> {
        match self {
            Self::Single(settings) | Self::Combined(settings, _) => settings,
        }
    }

    pub fn name(&self) -> &str {
        &self.head().name
    }

    pub fn is_visible(&self) -> bool {
        self.head().visible
    }

    /// Every definition in execution order.
    pub fn parts(&self) -> Vec<Arc<CommandSettings>> {
        match self {
            Self::Single(settings) => vec![Arc::clone(settings)],
            Self::Combined(head, rest) => std::iter::once(head)
                .chain(rest.iter())
                .map(Arc::clone)
                .collect(),
        }
    }

    /// The dependency edges of every part, in order.
    pub fn deps(&self) -> Vec<CommandDep> {
        self.parts()
            .iter()
            .flat_map(|part| part.deps.iter().cloned())
            .collect()
    }

    /// Distinct remote targets of every part, in first-seen order.
    pub fn targets(&self) -> Vec<CommandTarget> {
        let mut targets: Vec<CommandTarget> = Vec::new();
        for part in self.parts() {
            for target in &part.hosts {
                if !targets.contains(target) {
                    targets.push(target.clone());
                }
            }
        }
        targets
    }

    pub fn is_remote(&self) -> bool {
        !self.targets().is_empty()
    }

    pub fn has_alias(&self, name: &str) -> bool {
        self.parts().iter().any(|part| part.has_alias(name))
    }

    /// Adds `settings` after the existing definitions.
    pub fn append(self, settings: Arc<CommandSettings>) -> Self {
        match self {
            Self::Single(head) => Self::Combined(head, vec![settings]),
            Self::Combined(head, mut rest) => {
                rest.push(settings);
                Self::Combined(head, rest)
            }
        }
    }
}

// --- REGISTRY POLICY ---

/// What happens when a command name is declared twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DuplicatePolicy {
    /// Loading fails.
    Error,
    /// The later definition wins.
    #[default]
    Replace,
    /// Both definitions run under one name, in declaration order.
    Append,
}

// --- META CONFIGURATION ---

/// Execution behaviour, from meta directives and command line flags.
#[derive(Debug, Clone, Default)]
pub struct MetaExec {
    pub workdir: Option<PathBuf>,
    pub dry: bool,
    pub ignore: bool,
    pub trace: bool,
    pub echo: bool,
    pub prefix: bool,
    pub nodeps: bool,
    pub remote: bool,
    pub all: Vec<String>,
    pub default: Option<String>,
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub error: Vec<String>,
    pub success: Vec<String>,
}

/// Descriptive information shown by `help` and `version`.
#[derive(Debug, Clone)]
pub struct MetaAbout {
    pub file: PathBuf,
    pub author: String,
    pub email: String,
    pub version: String,
    pub usage: String,
    pub help: String,
}

impl Default for MetaAbout {
    fn default() -> Self {
        Self {
            file: PathBuf::new(),
            author: String::new(),
            email: String::new(),
            version: DEFAULT_VERSION.to_string(),
            usage: String::new(),
            help: String::new(),
        }
    }
}

/// Connection settings shared by every remote target.
#[derive(Debug, Clone, Default)]
pub struct MetaSsh {
    pub user: Option<String>,
    pub password: Option<String>,
    pub key: Option<PathBuf>,
    pub known_hosts: Option<PathBuf>,
    /// Maximum number of hosts contacted at once; defaults to all of them.
    pub parallel: Option<usize>,
}

/// Settings of the HTTP front-end.
#[derive(Debug, Clone)]
pub struct MetaHttp {
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub addr: String,
}

impl Default for MetaHttp {
    fn default() -> Self {
        Self {
            cert_file: None,
            key_file: None,
            addr: DEFAULT_HTTP_ADDR.to_string(),
        }
    }
}
