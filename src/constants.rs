// src/constants.rs

/// The file loaded when no `-f` flag is given.
pub const DEFAULT_FILE: &str = "maestro.mf";

/// The version reported when the file does not declare `.VERSION`.
pub const DEFAULT_VERSION: &str = "0.1.0";

/// The address the HTTP front-end listens on by default.
pub const DEFAULT_HTTP_ADDR: &str = ":9090";

/// The port used for remote targets that do not declare one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// The tag assigned to commands that do not declare any.
pub const DEFAULT_TAG: &str = "default";

/// Prefix used by trace lines and by prefixed output without a command name.
pub const TRACE_PREFIX: &str = "maestro";

/// Name of the invocation binding holding every positional argument.
pub const ARGS_VARIABLE: &str = "args";

// --- Built-in entry points ---

pub const CMD_HELP: &str = "help";
pub const CMD_VERSION: &str = "version";
pub const CMD_ALL: &str = "all";
pub const CMD_DEFAULT: &str = "default";
pub const CMD_GRAPH: &str = "graph";

// --- Meta directives ---

pub const META_WORKDIR: &str = "WORKDIR";
pub const META_TRACE: &str = "TRACE";
pub const META_ALL: &str = "ALL";
pub const META_DEFAULT: &str = "DEFAULT";
pub const META_BEFORE: &str = "BEFORE";
pub const META_AFTER: &str = "AFTER";
pub const META_ERROR: &str = "ERROR";
pub const META_SUCCESS: &str = "SUCCESS";
pub const META_AUTHOR: &str = "AUTHOR";
pub const META_EMAIL: &str = "EMAIL";
pub const META_VERSION: &str = "VERSION";
pub const META_USAGE: &str = "USAGE";
pub const META_HELP: &str = "HELP";
pub const META_SSH_USER: &str = "SSH_USER";
pub const META_SSH_PASSWORD: &str = "SSH_PASSWORD";
pub const META_SSH_PUBKEY: &str = "SSH_PUBKEY";
pub const META_SSH_KNOWN_HOSTS: &str = "SSH_KNOWN_HOSTS";
pub const META_SSH_PARALLEL: &str = "SSH_PARALLEL";
pub const META_HTTP_CERT_FILE: &str = "HTTP_CERT_FILE";
pub const META_HTTP_CERT_KEY: &str = "HTTP_CERT_KEY";

// --- Command properties ---

pub const PROP_SHORT: &str = "short";
pub const PROP_HELP: &str = "help";
pub const PROP_TAG: &str = "tag";
pub const PROP_RETRY: &str = "retry";
pub const PROP_WORKDIR: &str = "workdir";
pub const PROP_TIMEOUT: &str = "timeout";
pub const PROP_HOSTS: &str = "hosts";
pub const PROP_OPTIONS: &str = "options";
pub const PROP_ARGS: &str = "args";
pub const PROP_ALIAS: &str = "alias";

// --- Option properties ---

pub const OPT_SHORT: &str = "short";
pub const OPT_LONG: &str = "long";
pub const OPT_REQUIRED: &str = "required";
pub const OPT_DEFAULT: &str = "default";
pub const OPT_FLAG: &str = "flag";
pub const OPT_HELP: &str = "help";
pub const OPT_CHECK: &str = "check";
