// src/core/decoder.rs

//! # Decoder
//!
//! A recursive-descent parser over the [`Scanner`]'s token stream. It fills
//! the meta configuration, maintains the variable scope chain (one scope per
//! included file) and registers one [`CommandSettings`] per declared command.
//!
//! Top-level statements:
//!
//! - `NAME = values` / `NAME += values`: variable definition.
//! - `.META = values`: meta directive.
//! - `include`, `export`, `alias`, `delete`: keyword statements.
//! - `[!]name[(properties)]: dependencies` followed by an indented script.

use crate::constants::*;
use crate::core::env::{Env, EnvError, Scope};
use crate::core::interpolator::{self, InterpolationError};
use crate::core::lexer::{Keyword, Position, Token, TokenKind};
use crate::core::registry::{Registry, RegistryError};
use crate::core::scanner::{FrameChange, Scanner};
use crate::core::validate::{self, Rule, RuleError};
use crate::models::{
    CommandArg, CommandDep, CommandOption, CommandSettings, CommandTarget, DuplicatePolicy,
    MetaAbout, MetaExec, MetaHttp, MetaSsh,
};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Where in which file an error was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    pub position: Position,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.file, self.position)
    }
}

/// Errors raised while loading a maestro file.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("{location}: unexpected {found}, expected {expected}\n  | {line}")]
    Syntax {
        location: Location,
        found: String,
        expected: String,
        line: String,
    },
    #[error("{location}: {name}: undefined variable")]
    Undefined { location: Location, name: String },
    #[error("{location}: {name}: unknown meta directive")]
    UnknownMeta { location: Location, name: String },
    #[error("{location}: {name}: unknown {context} property")]
    UnknownProperty {
        location: Location,
        name: String,
        context: &'static str,
    },
    #[error("{location}: {reason}")]
    InvalidValue { location: Location, reason: String },
    #[error("{location}: {source}")]
    Rule {
        location: Location,
        #[source]
        source: RuleError,
    },
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: file is already being included", .0.display())]
    IncludeCycle(PathBuf),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Everything a maestro file declares.
#[derive(Debug, Default)]
pub struct Decoded {
    pub exec: MetaExec,
    pub about: MetaAbout,
    pub ssh: MetaSsh,
    pub http: MetaHttp,
    pub registry: Registry,
}

/// Loads and decodes the file at `path`. `defines` seeds the outermost scope.
pub fn decode_file(
    path: &Path,
    policy: DuplicatePolicy,
    defines: Scope,
) -> Result<Decoded, DecodeError> {
    log::debug!("Decoding {}", path.display());
    let scanner = Scanner::open(path)?;
    let mut decoder = Decoder::new(scanner, policy, defines);
    decoder.decoded.about.file = path.to_path_buf();
    decoder.decode()
}

/// Decodes an in-memory source. Includes resolve against the working directory.
pub fn decode_str(source: &str, policy: DuplicatePolicy) -> Result<Decoded, DecodeError> {
    let scanner = Scanner::new("", source.as_bytes());
    Decoder::new(scanner, policy, Scope::new()).decode()
}

/// The parser state for one decoding pass.
#[derive(Debug)]
pub struct Decoder {
    scanner: Scanner,
    env: Env,
    exports: BTreeMap<String, String>,
    aliases: BTreeMap<String, String>,
    decoded: Decoded,
}

impl Decoder {
    pub fn new(scanner: Scanner, policy: DuplicatePolicy, defines: Scope) -> Self {
        Self {
            scanner,
            env: Env::with_scope(defines),
            exports: BTreeMap::new(),
            aliases: BTreeMap::new(),
            decoded: Decoded {
                registry: Registry::new(policy),
                ..Decoded::default()
            },
        }
    }

    /// Consumes every statement of the file and its includes.
    pub fn decode(mut self) -> Result<Decoded, DecodeError> {
        loop {
            let token = self.scanner.curr().clone();
            match token.kind {
                TokenKind::Eof => {
                    let env = &mut self.env;
                    if !self
                        .scanner
                        .finish_file(&mut |change| track_scope(env, change))?
                    {
                        break;
                    }
                }
                TokenKind::Eol | TokenKind::Comment => self.next(),
                TokenKind::Meta => self.decode_meta()?,
                TokenKind::Keyword(keyword) => self.decode_keyword(keyword)?,
                TokenKind::Ident
                    if matches!(
                        self.scanner.peek().kind,
                        TokenKind::Assign | TokenKind::Append
                    ) =>
                {
                    self.decode_variable()?;
                }
                TokenKind::Ident | TokenKind::Hidden => self.decode_command()?,
                _ => {
                    return Err(self.unexpected(
                        &token,
                        "a variable, a command, a meta directive or a keyword",
                    ));
                }
            }
        }
        log::debug!(
            "Decoded {} command(s) from {}",
            self.decoded.registry.len(),
            self.decoded.about.file.display()
        );
        Ok(self.decoded)
    }

    // --- Statements ---

    fn decode_variable(&mut self) -> Result<(), DecodeError> {
        let ident = self.take();
        let operator = self.take();
        let values = self.read_values()?;
        self.end_statement()?;
        if operator.kind == TokenKind::Append {
            log::trace!("{} += {:?}", ident.literal, values);
            self.env.append(&ident.literal, values);
        } else {
            log::trace!("{} = {:?}", ident.literal, values);
            self.env.define(ident.literal, values);
        }
        Ok(())
    }

    fn decode_meta(&mut self) -> Result<(), DecodeError> {
        let meta = self.take();
        self.expect(TokenKind::Assign, "'='")?;
        let values = self.read_values()?;
        self.end_statement()?;
        self.apply_meta(&meta, values)
    }

    fn apply_meta(&mut self, meta: &Token, values: Vec<String>) -> Result<(), DecodeError> {
        let at = &self.location(meta);
        let exec = &mut self.decoded.exec;
        let about = &mut self.decoded.about;
        let ssh = &mut self.decoded.ssh;
        let http = &mut self.decoded.http;
        match meta.literal.as_str() {
            META_WORKDIR => exec.workdir = Some(expand_path(&single(at, &values)?)),
            META_TRACE => exec.trace = parse_flag(at, &values)?,
            META_ALL => exec.all = values,
            META_DEFAULT => exec.default = Some(single(at, &values)?),
            META_BEFORE => exec.before = values,
            META_AFTER => exec.after = values,
            META_ERROR => exec.error = values,
            META_SUCCESS => exec.success = values,
            META_AUTHOR => about.author = values.join(" "),
            META_EMAIL => about.email = values.join(" "),
            META_VERSION => about.version = single(at, &values)?,
            META_USAGE => about.usage = values.join(" "),
            META_HELP => about.help = values.join(" "),
            META_SSH_USER => ssh.user = Some(single(at, &values)?),
            META_SSH_PASSWORD => ssh.password = Some(single(at, &values)?),
            META_SSH_PUBKEY => ssh.key = Some(expand_path(&single(at, &values)?)),
            META_SSH_KNOWN_HOSTS => {
                ssh.known_hosts = Some(expand_path(&single(at, &values)?));
            }
            META_SSH_PARALLEL => {
                let value = single(at, &values)?;
                let parallel = value
                    .parse::<usize>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| invalid(at, format!("'{}' is not a positive number", value)))?;
                ssh.parallel = Some(parallel);
            }
            META_HTTP_CERT_FILE => http.cert_file = Some(expand_path(&single(at, &values)?)),
            META_HTTP_CERT_KEY => http.key_file = Some(expand_path(&single(at, &values)?)),
            _ => {
                return Err(DecodeError::UnknownMeta {
                    location: at.clone(),
                    name: meta.literal.clone(),
                });
            }
        }
        log::trace!("Meta .{} applied", meta.literal);
        Ok(())
    }

    fn decode_keyword(&mut self, keyword: Keyword) -> Result<(), DecodeError> {
        let token = self.take();
        match keyword {
            Keyword::Include => self.decode_include(&token),
            Keyword::Delete => {
                let names = self.read_values()?;
                self.end_statement()?;
                for name in names {
                    if !self.env.delete(&name) {
                        log::debug!("delete: '{}' is not defined in the current scope", name);
                    }
                }
                Ok(())
            }
            Keyword::Export => {
                let pairs = self.decode_assignments()?;
                self.exports.extend(pairs);
                Ok(())
            }
            Keyword::Alias => {
                let pairs = self.decode_assignments()?;
                self.aliases.extend(pairs);
                Ok(())
            }
        }
    }

    fn decode_include(&mut self, keyword: &Token) -> Result<(), DecodeError> {
        self.skip_blanks();
        let files = if self.scanner.is(TokenKind::LParen) {
            self.read_group()?
        } else {
            self.read_values()?
        };
        self.skip_blanks();
        if !self.scanner.curr().is_eol() {
            let token = self.scanner.curr().clone();
            return Err(self.unexpected(&token, "end of line"));
        }
        if files.is_empty() {
            return Err(self.invalid_at(keyword, "include expects at least one file".to_string()));
        }
        let env = &mut self.env;
        self.scanner
            .include(&files, &mut |change| track_scope(env, change))
    }

    /// `NAME = value` or a parenthesized list of such assignments.
    fn decode_assignments(&mut self) -> Result<Vec<(String, String)>, DecodeError> {
        let mut pairs = Vec::new();
        if self.scanner.is(TokenKind::LParen) {
            self.next();
            loop {
                self.skip_separators();
                if self.scanner.is(TokenKind::RParen) {
                    self.next();
                    break;
                }
                pairs.push(self.decode_assignment()?);
            }
        } else {
            pairs.push(self.decode_assignment()?);
        }
        self.end_statement()?;
        Ok(pairs)
    }

    fn decode_assignment(&mut self) -> Result<(String, String), DecodeError> {
        let name = self.expect(TokenKind::Ident, "a name")?;
        self.expect(TokenKind::Assign, "'='")?;
        let values = self.read_values()?;
        Ok((name.literal, values.join(" ")))
    }

    // --- Commands ---

    fn decode_command(&mut self) -> Result<(), DecodeError> {
        let hidden = self.scanner.is(TokenKind::Hidden);
        if hidden {
            self.next();
        }
        let name = self.expect(TokenKind::Ident, "a command name")?;
        let mut cmd = CommandSettings::new(name.literal.clone());
        cmd.visible = !hidden;

        if self.scanner.is(TokenKind::LParen) {
            self.decode_properties(&mut cmd)?;
        }
        self.expect(TokenKind::Colon, "':'")?;
        self.decode_dependencies(&mut cmd)?;
        self.decode_script(&mut cmd)?;

        cmd.alias.sort();
        cmd.alias.dedup();
        cmd.exports = self.exports.clone();
        cmd.aliases = self.aliases.clone();
        cmd.locals = self.env.snapshot();
        log::debug!(
            "Command '{}': {} dep(s), {} line(s)",
            cmd.name,
            cmd.deps.len(),
            cmd.lines.len()
        );
        self.decoded.registry.register(cmd)?;
        Ok(())
    }

    fn decode_properties(&mut self, cmd: &mut CommandSettings) -> Result<(), DecodeError> {
        self.expect(TokenKind::LParen, "'('")?;
        loop {
            self.skip_separators();
            let token = self.scanner.curr().clone();
            match token.kind {
                TokenKind::RParen => {
                    self.next();
                    return Ok(());
                }
                TokenKind::Ident => {
                    self.next();
                    if self.scanner.is(TokenKind::Assign) {
                        self.next();
                        self.decode_property(cmd, &token)?;
                    } else {
                        let valid = self.decode_optional_rules()?;
                        cmd.args.push(CommandArg {
                            name: token.literal,
                            valid,
                        });
                    }
                }
                _ => return Err(self.unexpected(&token, "a property name or ')'")),
            }
        }
    }

    fn decode_property(&mut self, cmd: &mut CommandSettings, prop: &Token) -> Result<(), DecodeError> {
        let at = &self.location(prop);
        match prop.literal.as_str() {
            PROP_SHORT => cmd.short = self.read_values()?.join(" "),
            PROP_HELP => cmd.desc = self.read_values()?.join(" "),
            PROP_TAG => cmd.categories = self.read_values()?,
            PROP_ALIAS => cmd.alias.extend(self.read_values()?),
            PROP_RETRY => {
                let value = single(at, &self.read_values()?)?;
                cmd.retry = value
                    .parse()
                    .map_err(|_| invalid(at, format!("'{}' is not a valid retry count", value)))?;
            }
            PROP_WORKDIR => cmd.workdir = Some(expand_path(&single(at, &self.read_values()?)?)),
            PROP_TIMEOUT => {
                let value = single(at, &self.read_values()?)?;
                let timeout = parse_duration(&value)
                    .ok_or_else(|| invalid(at, format!("'{}' is not a valid duration", value)))?;
                cmd.timeout = Some(timeout);
            }
            PROP_HOSTS => {
                for spec in self.read_values()? {
                    let target = CommandTarget::parse(&spec)
                        .ok_or_else(|| invalid(at, format!("'{}' is not a valid host", spec)))?;
                    cmd.hosts.push(target);
                }
            }
            PROP_ARGS => loop {
                self.skip_blanks();
                if !self.scanner.curr().is_value() {
                    break;
                }
                let name = self.take();
                let valid = self.decode_optional_rules()?;
                cmd.args.push(CommandArg {
                    name: name.literal,
                    valid,
                });
            },
            PROP_OPTIONS => loop {
                self.skip_blanks();
                if !self.scanner.is(TokenKind::LParen) {
                    break;
                }
                let option = self.decode_option()?;
                cmd.options.push(option);
            },
            _ => {
                return Err(DecodeError::UnknownProperty {
                    location: at.clone(),
                    name: prop.literal.clone(),
                    context: "command",
                });
            }
        }
        Ok(())
    }

    fn decode_option(&mut self) -> Result<CommandOption, DecodeError> {
        let open = self.expect(TokenKind::LParen, "'('")?;
        let mut option = CommandOption::default();
        loop {
            self.skip_separators();
            let token = self.scanner.curr().clone();
            match token.kind {
                TokenKind::RParen => {
                    self.next();
                    break;
                }
                TokenKind::Ident => {
                    self.next();
                    self.expect(TokenKind::Assign, "'='")?;
                    self.decode_option_property(&mut option, &token)?;
                }
                _ => return Err(self.unexpected(&token, "an option property or ')'")),
            }
        }
        if option.short.is_none() && option.long.is_none() {
            return Err(self.invalid_at(&open, "option needs a short or a long name".to_string()));
        }
        Ok(option)
    }

    fn decode_option_property(&mut self, option: &mut CommandOption, prop: &Token) -> Result<(), DecodeError> {
        let at = &self.location(prop);
        match prop.literal.as_str() {
            OPT_SHORT => option.short = Some(single(at, &self.read_values()?)?),
            OPT_LONG => option.long = Some(single(at, &self.read_values()?)?),
            OPT_HELP => option.help = self.read_values()?.join(" "),
            OPT_DEFAULT => option.default = Some(self.read_values()?.join(" ")),
            OPT_REQUIRED => option.required = parse_flag(at, &self.read_values()?)?,
            OPT_FLAG => option.flag = parse_flag(at, &self.read_values()?)?,
            OPT_CHECK => {
                let mut rules = Vec::new();
                loop {
                    self.skip_blanks();
                    if !self.scanner.curr().is_value() {
                        break;
                    }
                    let name = self.take();
                    rules.push(self.decode_rule(&name)?);
                }
                option.valid = Rule::from_list(rules);
            }
            _ => {
                return Err(DecodeError::UnknownProperty {
                    location: at.clone(),
                    name: prop.literal.clone(),
                    context: "option",
                });
            }
        }
        Ok(())
    }

    // --- Validation rules ---

    /// Parses `(rule ...)` when present right after an argument name.
    fn decode_optional_rules(&mut self) -> Result<Option<Rule>, DecodeError> {
        if !self.scanner.is(TokenKind::LParen) {
            return Ok(None);
        }
        let rules = self.decode_rule_list()?;
        Ok(Rule::from_list(rules))
    }

    fn decode_rule_list(&mut self) -> Result<Vec<Rule>, DecodeError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut rules = Vec::new();
        loop {
            self.skip_separators();
            let token = self.scanner.curr().clone();
            match token.kind {
                TokenKind::RParen => {
                    self.next();
                    return Ok(rules);
                }
                TokenKind::Ident | TokenKind::Value => {
                    self.next();
                    rules.push(self.decode_rule(&token)?);
                }
                _ => return Err(self.unexpected(&token, "a validation rule or ')'")),
            }
        }
    }

    fn decode_rule(&mut self, name: &Token) -> Result<Rule, DecodeError> {
        let rule = if Rule::is_combinator(&name.literal) {
            let rules = self.decode_rule_list()?;
            Rule::combine(&name.literal, rules)
        } else {
            let args = if self.scanner.is(TokenKind::LParen) {
                self.read_group()?
            } else {
                Vec::new()
            };
            Rule::primitive(&name.literal, &args)
        };
        rule.map_err(|source| DecodeError::Rule {
            location: self.location(name),
            source,
        })
    }

    // --- Dependencies and script ---

    fn decode_dependencies(&mut self, cmd: &mut CommandSettings) -> Result<(), DecodeError> {
        loop {
            let mut dep = CommandDep::default();
            let mut marked = false;
            loop {
                match self.scanner.curr().kind {
                    TokenKind::Optional => dep.optional = true,
                    TokenKind::Background => dep.background = true,
                    _ => break,
                }
                marked = true;
                self.next();
            }
            let token = self.scanner.curr().clone();
            if token.kind != TokenKind::Dependency {
                if marked || !cmd.deps.is_empty() {
                    return Err(self.unexpected(&token, "a dependency name"));
                }
                break;
            }
            self.next();
            dep.name = token.literal;
            if self.scanner.is(TokenKind::LParen) {
                dep.args = self.read_group()?;
            }
            cmd.deps.push(dep);
            if !self.scanner.is(TokenKind::Plus) {
                break;
            }
            self.next();
        }
        if self.scanner.is(TokenKind::Comment) {
            self.next();
        }
        match self.scanner.curr().kind {
            TokenKind::Eol => {
                self.next();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => {
                let token = self.scanner.curr().clone();
                Err(self.unexpected(&token, "'+' or end of line"))
            }
        }
    }

    fn decode_script(&mut self, cmd: &mut CommandSettings) -> Result<(), DecodeError> {
        let mut help = Vec::new();
        loop {
            let token = self.scanner.curr().clone();
            match token.kind {
                TokenKind::Comment => {
                    if cmd.lines.is_empty() {
                        help.push(token.literal);
                    }
                    self.next();
                }
                TokenKind::Script => {
                    cmd.lines.push(token.literal);
                    self.next();
                }
                TokenKind::EndScript => {
                    self.next();
                    break;
                }
                TokenKind::Eof => break,
                _ => return Err(self.unexpected(&token, "a script line")),
            }
        }
        if cmd.desc.is_empty() {
            cmd.desc = help.join("\n");
        }
        Ok(())
    }

    // --- Values ---

    /// Reads blank separated words up to the end of the value list.
    fn read_values(&mut self) -> Result<Vec<String>, DecodeError> {
        let mut values = Vec::new();
        loop {
            self.skip_blanks();
            if !self.scanner.curr().is_value() {
                return Ok(values);
            }
            values.extend(self.read_word()?);
        }
    }

    /// Reads adjacent value parts as one word. A list-valued part yields one
    /// word per element, each joined with the surrounding parts.
    fn read_word(&mut self) -> Result<Vec<String>, DecodeError> {
        let mut words = vec![String::new()];
        while self.scanner.curr().is_value() {
            let token = self.take();
            let parts = self.token_values(&token)?;
            words = words
                .iter()
                .flat_map(|prefix| parts.iter().map(move |part| format!("{}{}", prefix, part)))
                .collect();
        }
        Ok(words)
    }

    /// Reads a parenthesized list where every token is its own value.
    fn read_group(&mut self) -> Result<Vec<String>, DecodeError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut values = Vec::new();
        loop {
            self.skip_separators();
            let token = self.scanner.curr().clone();
            if token.kind == TokenKind::RParen {
                self.next();
                return Ok(values);
            }
            if !token.is_value() {
                return Err(self.unexpected(&token, "a value or ')'"));
            }
            self.next();
            values.extend(self.token_values(&token)?);
        }
    }

    fn token_values(&self, token: &Token) -> Result<Vec<String>, DecodeError> {
        match token.kind {
            TokenKind::Variable => self
                .env
                .resolve(&token.literal)
                .map(<[String]>::to_vec)
                .map_err(|EnvError::Undefined(name)| DecodeError::Undefined {
                    location: self.location(token),
                    name,
                }),
            TokenKind::Quoted => interpolator::expand_quoted(&token.literal, &self.env)
                .map(|value| vec![value])
                .map_err(|e| match e {
                    InterpolationError::Env(EnvError::Undefined(name)) => DecodeError::Undefined {
                        location: self.location(token),
                        name,
                    },
                    other => self.invalid_at(token, other.to_string()),
                }),
            _ => Ok(vec![token.literal.clone()]),
        }
    }

    // --- Token plumbing ---

    fn next(&mut self) {
        self.scanner.advance();
    }

    /// Returns the current token and moves past it.
    fn take(&mut self) -> Token {
        let token = self.scanner.curr().clone();
        self.next();
        token
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token, DecodeError> {
        let token = self.scanner.curr().clone();
        if token.kind != kind {
            return Err(self.unexpected(&token, expected));
        }
        self.next();
        Ok(token)
    }

    fn skip_blanks(&mut self) {
        while self.scanner.is(TokenKind::Blank) {
            self.next();
        }
    }

    /// Skips whatever may separate items inside parentheses.
    fn skip_separators(&mut self) {
        while matches!(
            self.scanner.curr().kind,
            TokenKind::Blank | TokenKind::Comma | TokenKind::Eol | TokenKind::Comment
        ) {
            self.next();
        }
    }

    /// Consumes an optional trailing comment and the end of the line.
    fn end_statement(&mut self) -> Result<(), DecodeError> {
        self.skip_blanks();
        if self.scanner.is(TokenKind::Comment) {
            self.next();
        }
        match self.scanner.curr().kind {
            TokenKind::Eol => {
                self.next();
                Ok(())
            }
            TokenKind::Eof => Ok(()),
            _ => {
                let token = self.scanner.curr().clone();
                Err(self.unexpected(&token, "end of line"))
            }
        }
    }

    // --- Errors ---

    fn location(&self, token: &Token) -> Location {
        Location {
            file: self.scanner.path().display().to_string(),
            position: token.position,
        }
    }

    fn unexpected(&self, token: &Token, expected: &str) -> DecodeError {
        DecodeError::Syntax {
            location: self.location(token),
            found: token.to_string(),
            expected: expected.to_string(),
            line: self.scanner.line_text(token.position.line),
        }
    }

    fn invalid_at(&self, token: &Token, reason: String) -> DecodeError {
        DecodeError::InvalidValue {
            location: self.location(token),
            reason,
        }
    }
}

fn track_scope(env: &mut Env, change: FrameChange) {
    match change {
        FrameChange::Pushed => env.push(),
        FrameChange::Popped => {
            env.pop();
        }
    }
}

fn invalid(location: &Location, reason: String) -> DecodeError {
    DecodeError::InvalidValue {
        location: location.clone(),
        reason,
    }
}

fn single(location: &Location, values: &[String]) -> Result<String, DecodeError> {
    match values {
        [value] => Ok(value.clone()),
        _ => Err(invalid(
            location,
            format!("expected exactly one value, found {}", values.len()),
        )),
    }
}

/// A missing value means `true`.
fn parse_flag(location: &Location, values: &[String]) -> Result<bool, DecodeError> {
    match values {
        [] => Ok(true),
        [value] => validate::parse_bool(value)
            .ok_or_else(|| invalid(location, format!("'{}' is not a boolean", value))),
        _ => Err(invalid(
            location,
            format!("expected a single boolean, found {} values", values.len()),
        )),
    }
}

fn expand_path(value: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(value).into_owned())
}

/// Parses `500ms`, `10s`, `5m`, `1h`, or a bare number of seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let (number, scale) = if let Some(n) = value.strip_suffix("ms") {
        (n, 0.001)
    } else if let Some(n) = value.strip_suffix('s') {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix('m') {
        (n, 60.0)
    } else if let Some(n) = value.strip_suffix('h') {
        (n, 3600.0)
    } else {
        (value, 1.0)
    };
    let seconds = number.trim().parse::<f64>().ok()? * scale;
    Duration::try_from_secs_f64(seconds).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Command;
    use std::fs;
    use tempfile::tempdir;

    fn decode(source: &str) -> Decoded {
        decode_str(source, DuplicatePolicy::Replace).unwrap()
    }

    fn single_cmd<'a>(decoded: &'a Decoded, name: &str) -> &'a CommandSettings {
        match decoded.registry.lookup(name).unwrap() {
            Command::Single(settings) => settings,
            Command::Combined(..) => panic!("{} is combined", name),
        }
    }

    fn var(cmd: &CommandSettings, name: &str) -> Vec<String> {
        cmd.locals.get(name).unwrap().to_vec()
    }

    #[test]
    fn test_simple_command() {
        let decoded = decode("greet:\n  echo hi\n");
        let greet = single_cmd(&decoded, "greet");
        assert_eq!(greet.lines, vec!["echo hi"]);
        assert!(greet.deps.is_empty());
        assert!(greet.visible);
    }

    #[test]
    fn test_dependency_with_args_and_positional_shorthand() {
        let decoded = decode("a: b(x)\n\n  echo a\nb(args):\n\n  echo %(args)\n");
        let a = single_cmd(&decoded, "a");
        assert_eq!(
            a.deps,
            vec![CommandDep {
                name: "b".to_string(),
                args: vec!["x".to_string()],
                ..Default::default()
            }]
        );
        assert_eq!(a.lines, vec!["echo a"]);
        let b = single_cmd(&decoded, "b");
        assert_eq!(b.args.len(), 1);
        assert_eq!(b.args[0].name, "args");
        assert_eq!(b.lines, vec!["echo %(args)"]);
    }

    #[test]
    fn test_dependency_markers() {
        let decoded = decode("all: clean + ?lint + &docs + ?&bench\n  true\n");
        let deps = &single_cmd(&decoded, "all").deps;
        let flags: Vec<(&str, bool, bool)> = deps
            .iter()
            .map(|d| (d.name.as_str(), d.optional, d.background))
            .collect();
        assert_eq!(
            flags,
            vec![
                ("clean", false, false),
                ("lint", true, false),
                ("docs", false, true),
                ("bench", true, true)
            ]
        );
    }

    #[test]
    fn test_variables_and_concatenation() {
        let decoded = decode(
            "NAME = world\nLIST = a b\nLIST += c\nPRE = x-%(LIST)\nMSG = \"hello %(NAME)\"\ncmd:\n  true\n",
        );
        let cmd = single_cmd(&decoded, "cmd");
        assert_eq!(var(cmd, "LIST"), vec!["a", "b", "c"]);
        assert_eq!(var(cmd, "PRE"), vec!["x-a", "x-b", "x-c"]);
        assert_eq!(var(cmd, "MSG"), vec!["hello world"]);
    }

    #[test]
    fn test_snapshot_is_taken_at_definition_time() {
        let decoded = decode("V = 1\nfirst:\n  echo %(V)\nV = 2\nsecond:\n  echo %(V)\n");
        assert_eq!(var(single_cmd(&decoded, "first"), "V"), vec!["1"]);
        assert_eq!(var(single_cmd(&decoded, "second"), "V"), vec!["2"]);
    }

    #[test]
    fn test_undefined_variable_is_a_distinct_error() {
        let err = decode_str("A = %(missing)\n", DuplicatePolicy::Replace).unwrap_err();
        assert!(matches!(err, DecodeError::Undefined { ref name, .. } if name == "missing"));
        let err = decode_str("A = \"%(missing)\"\n", DuplicatePolicy::Replace).unwrap_err();
        assert!(matches!(err, DecodeError::Undefined { .. }));
    }

    #[test]
    fn test_multi_valued_variable_in_quotes_is_rejected() {
        let err = decode_str("L = a b\nA = \"%(L)\"\n", DuplicatePolicy::Replace).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidValue { .. }));
    }

    #[test]
    fn test_meta_directives() {
        let decoded = decode(
            ".DEFAULT = build\n.ALL = a, b\n.TRACE = true\n.VERSION = 1.2.3\n.SSH_PARALLEL = 4\n.BEFORE = setup\n",
        );
        assert_eq!(decoded.exec.default.as_deref(), Some("build"));
        assert_eq!(decoded.exec.all, vec!["a", "b"]);
        assert!(decoded.exec.trace);
        assert_eq!(decoded.about.version, "1.2.3");
        assert_eq!(decoded.ssh.parallel, Some(4));
        assert_eq!(decoded.exec.before, vec!["setup"]);
    }

    #[test]
    fn test_unknown_meta_and_property_are_errors() {
        let err = decode_str(".NOPE = x\n", DuplicatePolicy::Replace).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownMeta { ref name, .. } if name == "NOPE"));
        let err = decode_str("a(color = red):\n  true\n", DuplicatePolicy::Replace).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnknownProperty { ref name, context: "command", .. } if name == "color"
        ));
    }

    #[test]
    fn test_properties() {
        let source = "deploy(\n  short = \"Ship it\",\n  tag = ops release,\n  retry: 3,\n  timeout = 30s,\n  hosts = root@web1 web2:2222,\n  alias = ship dep\n): build\n  # Deploys the application.\n  # Twice as fast.\n  ./deploy.sh\n";
        let decoded = decode(source);
        let cmd = single_cmd(&decoded, "deploy");
        assert_eq!(cmd.short, "Ship it");
        assert_eq!(cmd.categories, vec!["ops", "release"]);
        assert_eq!(cmd.retry, 3);
        assert_eq!(cmd.timeout, Some(Duration::from_secs(30)));
        assert_eq!(cmd.hosts.len(), 2);
        assert_eq!(cmd.hosts[0].user.as_deref(), Some("root"));
        assert_eq!(cmd.hosts[1].port, 2222);
        assert_eq!(cmd.alias, vec!["dep", "ship"]);
        assert_eq!(cmd.desc, "Deploys the application.\nTwice as fast.");
        assert_eq!(cmd.lines, vec!["./deploy.sh"]);
        assert_eq!(decoded.registry.lookup("ship").unwrap().name(), "deploy");
    }

    #[test]
    fn test_options_and_rules() {
        let source = "run(\n  options = (short = e, long = env, required = true, check = oneof(dev prod)) (long = dry, flag = true),\n  args = count(int min(1)) name\n):\n  echo %(env)\n";
        let decoded = decode(source);
        let cmd = single_cmd(&decoded, "run");
        assert_eq!(cmd.options.len(), 2);
        let env = &cmd.options[0];
        assert_eq!(env.short.as_deref(), Some("e"));
        assert!(env.required);
        let rule = env.valid.as_ref().unwrap();
        assert!(rule.validate("prod").is_ok());
        assert!(rule.validate("qa").is_err());
        assert!(cmd.options[1].flag);
        assert_eq!(cmd.args.len(), 2);
        let count = cmd.args[0].valid.as_ref().unwrap();
        assert!(count.validate("3").is_ok());
        assert!(count.validate("0").is_err());
        assert!(cmd.args[1].valid.is_none());
    }

    #[test]
    fn test_combinator_rules() {
        let source = "a(args = mode(some(oneof(auto) int)) user(not(oneof(root)))):\n  true\n";
        let decoded = decode(source);
        let cmd = single_cmd(&decoded, "a");
        let mode = cmd.args[0].valid.as_ref().unwrap();
        assert!(mode.validate("auto").is_ok());
        assert!(mode.validate("7").is_ok());
        assert!(mode.validate("manual").is_err());
        let user = cmd.args[1].valid.as_ref().unwrap();
        assert!(user.validate("root").is_err());
        assert!(user.validate("guest").is_ok());
    }

    #[test]
    fn test_unknown_rule_is_an_error() {
        let err = decode_str("a(args = x(bogus)):\n  true\n", DuplicatePolicy::Replace).unwrap_err();
        assert!(matches!(err, DecodeError::Rule { .. }));
    }

    #[test]
    fn test_hidden_command() {
        let decoded = decode("!secret:\n  true\n");
        assert!(!single_cmd(&decoded, "secret").visible);
    }

    #[test]
    fn test_export_alias_and_delete() {
        let decoded = decode(
            "export GREETING = hello\nexport (\n  A = 1\n  B = 2\n)\nalias ll = \"ls -l\"\nV = 1\ndelete V\ncmd:\n  ll\n",
        );
        let cmd = single_cmd(&decoded, "cmd");
        assert_eq!(cmd.exports.get("GREETING").map(String::as_str), Some("hello"));
        assert_eq!(cmd.exports.get("B").map(String::as_str), Some("2"));
        assert_eq!(cmd.aliases.get("ll").map(String::as_str), Some("ls -l"));
        assert!(cmd.locals.get("V").is_none());
    }

    #[test]
    fn test_script_continuation_and_termination() {
        let decoded = decode("a:\n  echo one \\\n    two\n\n  echo three\nb:\n  echo b\n");
        assert_eq!(single_cmd(&decoded, "a").lines, vec!["echo one two", "echo three"]);
        assert_eq!(single_cmd(&decoded, "b").lines, vec!["echo b"]);
    }

    #[test]
    fn test_syntax_error_reports_position_and_line() {
        let err = decode_str("a: b +\n  true\n", DuplicatePolicy::Replace).unwrap_err();
        let DecodeError::Syntax { location, line, .. } = &err else {
            panic!("unexpected error: {}", err);
        };
        assert_eq!(location.position.line, 1);
        assert_eq!(line, "a: b +");
        let err = decode_str("A = \"open\n", DuplicatePolicy::Replace).unwrap_err();
        assert!(matches!(err, DecodeError::Syntax { .. }));
    }

    #[test]
    fn test_duplicate_policy_error() {
        let err = decode_str("a:\n  true\na:\n  false\n", DuplicatePolicy::Error).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Registry(RegistryError::Duplicate(ref name)) if name == "a"
        ));
    }

    #[test]
    fn test_include_scoping() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("inner.mf"),
            "LOCAL = inner\nSHARED = shadow\nlib:\n  echo %(LOCAL) %(SHARED)\n",
        )
        .unwrap();
        let main = dir.path().join("maestro.mf");
        fs::write(
            &main,
            "SHARED = outer\ninclude inner.mf\nafter:\n  echo %(SHARED)\n",
        )
        .unwrap();
        let decoded = decode_file(&main, DuplicatePolicy::Replace, Scope::new()).unwrap();

        let lib = single_cmd(&decoded, "lib");
        assert_eq!(var(lib, "LOCAL"), vec!["inner"]);
        assert_eq!(var(lib, "SHARED"), vec!["shadow"]);

        let after = single_cmd(&decoded, "after");
        assert!(after.locals.get("LOCAL").is_none());
        assert_eq!(var(after, "SHARED"), vec!["outer"]);
    }

    #[test]
    fn test_last_assignment_of_included_file_stays_inside() {
        let dir = tempdir().unwrap();
        let main = dir.path().join("maestro.mf");
        fs::write(&main, "include \"lib.mf\"\nUSE = %(SECRET)\n").unwrap();
        for lib in ["SECRET = inner\n", "SECRET = inner"] {
            fs::write(dir.path().join("lib.mf"), lib).unwrap();
            let err = decode_file(&main, DuplicatePolicy::Replace, Scope::new()).unwrap_err();
            assert!(matches!(
                err,
                DecodeError::Undefined { ref name, .. } if name == "SECRET"
            ));
        }
    }

    #[test]
    fn test_last_command_of_included_file_keeps_its_scope() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("lib.mf"),
            "MODE = inner\ntail:\n  echo %(MODE)",
        )
        .unwrap();
        let main = dir.path().join("maestro.mf");
        fs::write(&main, "MODE = outer\ninclude lib.mf\n").unwrap();
        let decoded = decode_file(&main, DuplicatePolicy::Replace, Scope::new()).unwrap();
        assert_eq!(var(single_cmd(&decoded, "tail"), "MODE"), vec!["inner"]);
    }

    #[test]
    fn test_defines_seed_outer_scope() {
        let dir = tempdir().unwrap();
        let main = dir.path().join("maestro.mf");
        fs::write(&main, "cmd:\n  echo %(TARGET)\n").unwrap();
        let mut defines = Scope::new();
        defines.define("TARGET", vec!["release".to_string()]);
        let decoded = decode_file(&main, DuplicatePolicy::Replace, defines).unwrap();
        assert_eq!(var(single_cmd(&decoded, "cmd"), "TARGET"), vec!["release"]);
        assert_eq!(decoded.about.file, main);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("5"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("soon"), None);
    }
}
