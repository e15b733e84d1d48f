// src/core/lexer.rs

//! # Lexer
//!
//! Turns the raw bytes of a maestro file into a lazy stream of [`Token`]s.
//!
//! The lexer is a small state machine. Its state is a [`Mode`] (how the next
//! characters are read) paired with a [`SubMode`] (which context the mode was
//! entered from). Every emitted token drives a transition computed by
//! [`transition`], a pure function of the current state and the token kind.
//! Parenthesized blocks push the current state and restore it on the matching
//! close, so nested property blocks, option objects and rule arguments all
//! return to the mode that opened them.

use std::collections::VecDeque;
use std::fmt;

/// The top-level keywords recognized by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    /// `include file...`
    Include,
    /// `export NAME = value`
    Export,
    /// `delete NAME...`
    Delete,
    /// `alias NAME = value`
    Alias,
}

impl Keyword {
    /// Re-tags an identifier as a keyword when it matches one.
    pub fn from_ident(ident: &str) -> Option<Self> {
        match ident {
            "include" => Some(Self::Include),
            "export" => Some(Self::Export),
            "delete" => Some(Self::Delete),
            "alias" => Some(Self::Alias),
            _ => None,
        }
    }

    /// The literal spelling of the keyword.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Export => "export",
            Self::Delete => "delete",
            Self::Alias => "alias",
        }
    }
}

/// The kind of a lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Keyword(Keyword),
    /// A `.NAME` directive; the literal holds `NAME`.
    Meta,
    /// The `!` marker in front of a hidden command.
    Hidden,
    /// A `%(name)` reference; the literal holds `name`.
    Variable,
    /// A bare word.
    Value,
    /// A double-quoted string, escapes already processed.
    Quoted,
    /// A backtick string.
    Raw,
    Assign,
    Append,
    Colon,
    Comma,
    LParen,
    RParen,
    Plus,
    /// The `?` marker of an optional dependency.
    Optional,
    /// The `&` marker of a background dependency.
    Background,
    Dependency,
    Script,
    Comment,
    /// A run of spaces or tabs between two values.
    Blank,
    Eol,
    EndScript,
    Eof,
    Invalid,
}

impl TokenKind {
    /// Short, human readable name used in syntax errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ident => "identifier",
            Self::Keyword(_) => "keyword",
            Self::Meta => "meta",
            Self::Hidden => "hidden marker",
            Self::Variable => "variable",
            Self::Value => "value",
            Self::Quoted => "string",
            Self::Raw => "raw string",
            Self::Assign => "assignment",
            Self::Append => "append",
            Self::Colon => "colon",
            Self::Comma => "comma",
            Self::LParen => "left paren",
            Self::RParen => "right paren",
            Self::Plus => "plus",
            Self::Optional => "optional marker",
            Self::Background => "background marker",
            Self::Dependency => "dependency",
            Self::Script => "script",
            Self::Comment => "comment",
            Self::Blank => "blank",
            Self::Eol => "end of line",
            Self::EndScript => "end of script",
            Self::Eof => "end of input",
            Self::Invalid => "invalid",
        }
    }
}

/// A 1-based line/column location in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.line, self.column)
    }
}

/// A single lexed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub literal: String,
    pub position: Position,
}

impl Token {
    fn new(kind: TokenKind, literal: impl Into<String>, position: Position) -> Self {
        Self {
            kind,
            literal: literal.into(),
            position,
        }
    }

    /// True for tokens that can start or continue a value list.
    pub fn is_value(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Value
                | TokenKind::Quoted
                | TokenKind::Raw
                | TokenKind::Variable
                | TokenKind::Ident
        )
    }

    /// True for tokens that can close a statement.
    pub fn is_eol(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::Eol | TokenKind::Comment | TokenKind::Eof
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Eol => write!(f, "<NL>"),
            TokenKind::Eof => write!(f, "<EOF>"),
            TokenKind::EndScript => write!(f, "<END SCRIPT>"),
            TokenKind::Blank => write!(f, "<BLANK>"),
            kind if self.literal.is_empty() => write!(f, "<{}>", kind.name()),
            kind => write!(f, "<{} '{}'>", kind.name(), self.literal),
        }
    }
}

/// How the next characters are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Identifiers, meta directives, strings, comments and punctuation.
    Default,
    /// Values after `=` or a keyword, up to a comma, newline or paren.
    Value,
    /// Dependency names after `:`, up to the end of the line.
    Dependency,
    /// The indented script body of a command.
    Script,
}

/// The context a [`Mode`] was entered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubMode {
    None,
    /// Inside a parenthesized block: `:` assigns and newlines do not close it.
    Property,
    /// After a meta directive: commas separate values like blanks.
    Meta,
}

/// The complete lexer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexState {
    pub mode: Mode,
    pub sub: SubMode,
}

impl LexState {
    const fn new(mode: Mode, sub: SubMode) -> Self {
        Self { mode, sub }
    }
}

impl Default for LexState {
    fn default() -> Self {
        Self::new(Mode::Default, SubMode::None)
    }
}

/// The effect a token has on the lexer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    Set(LexState),
    /// Save the current state and switch to the given one.
    Push(LexState),
    /// Restore the state saved by the matching [`Transition::Push`].
    Pop,
}

/// Computes the state change caused by emitting a token of `kind` in `state`.
pub fn transition(state: LexState, kind: TokenKind) -> Transition {
    use Mode as M;
    use SubMode as S;
    match kind {
        TokenKind::Colon => Transition::Set(LexState::new(M::Dependency, S::None)),
        TokenKind::Assign | TokenKind::Append => {
            Transition::Set(LexState::new(M::Value, state.sub))
        }
        TokenKind::Meta => Transition::Set(LexState::new(M::Default, S::Meta)),
        TokenKind::Keyword(Keyword::Include | Keyword::Delete) => {
            Transition::Set(LexState::new(M::Value, S::None))
        }
        TokenKind::Keyword(Keyword::Export | Keyword::Alias) => {
            Transition::Set(LexState::new(M::Default, S::None))
        }
        TokenKind::LParen => Transition::Push(LexState::new(M::Default, S::Property)),
        TokenKind::RParen => Transition::Pop,
        TokenKind::Comma if state.sub == S::Property => {
            Transition::Set(LexState::new(M::Default, S::Property))
        }
        TokenKind::Eol => match (state.mode, state.sub) {
            (M::Dependency, _) => Transition::Set(LexState::new(M::Script, S::None)),
            (_, S::Property) => Transition::Set(LexState::new(M::Default, S::Property)),
            (M::Default, S::None) => Transition::Stay,
            _ => Transition::Set(LexState::default()),
        },
        TokenKind::EndScript => Transition::Set(LexState::default()),
        _ => Transition::Stay,
    }
}

/// Lazily tokenizes one source buffer.
#[derive(Debug)]
pub struct Lexer {
    source: String,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    state: LexState,
    saved: Vec<LexState>,
    pending: VecDeque<Token>,
    malformed: bool,
    failed: bool,
}

impl Lexer {
    /// Creates a lexer over raw bytes. Bytes after the first malformed UTF-8
    /// sequence are dropped and surface as an [`TokenKind::Invalid`] token.
    pub fn new(bytes: &[u8]) -> Self {
        let (source, malformed) = match std::str::from_utf8(bytes) {
            Ok(text) => (text.to_string(), false),
            Err(e) => {
                let valid = bytes
                    .get(..e.valid_up_to())
                    .map(String::from_utf8_lossy)
                    .unwrap_or_default();
                (valid.into_owned(), true)
            }
        };
        let chars = source.chars().collect();
        Self {
            source,
            chars,
            pos: 0,
            line: 1,
            column: 1,
            state: LexState::default(),
            saved: Vec::new(),
            pending: VecDeque::new(),
            malformed,
            failed: false,
        }
    }

    /// The current lexer state.
    pub fn state(&self) -> LexState {
        self.state
    }

    /// Returns the text of a 1-based source line, used in error messages.
    pub fn line_text(&self, line: usize) -> String {
        self.source
            .lines()
            .nth(line.saturating_sub(1))
            .unwrap_or_default()
            .to_string()
    }

    /// Produces the next token and advances the state machine.
    pub fn next_token(&mut self) -> Token {
        if let Some(token) = self.pending.pop_front() {
            return token;
        }
        if self.failed {
            return Token::new(TokenKind::Invalid, "", self.position());
        }
        let token = match self.state.mode {
            Mode::Default => self.lex_default(),
            Mode::Value => self.lex_value(),
            Mode::Dependency => self.lex_dependency(),
            Mode::Script => self.lex_script(),
        };
        if token.kind == TokenKind::Invalid {
            self.failed = true;
        }
        self.apply(transition(self.state, token.kind), token.kind);
        token
    }

    fn apply(&mut self, change: Transition, kind: TokenKind) {
        match change {
            Transition::Stay => {}
            Transition::Set(state) => self.state = state,
            Transition::Push(state) => {
                self.saved.push(self.state);
                self.state = state;
            }
            Transition::Pop => self.state = self.saved.pop().unwrap_or_default(),
        }
        if matches!(kind, TokenKind::LParen | TokenKind::Comma)
            && self.state.sub == SubMode::Property
        {
            self.skip_whitespace();
        }
    }

    // --- Mode readers ---

    fn lex_default(&mut self) -> Token {
        self.skip_blank();
        let position = self.position();
        let Some(c) = self.peek() else {
            return self.end_of_input(position);
        };
        match c {
            '\n' => {
                self.bump();
                Token::new(TokenKind::Eol, "", position)
            }
            '#' => self.read_comment(position),
            '.' if self.peek_at(1).is_some_and(is_letter) => {
                self.bump();
                let name = self.take_ident();
                Token::new(TokenKind::Meta, name, position)
            }
            '!' => self.punct(TokenKind::Hidden, position),
            '%' => self.read_variable(position),
            '"' | '`' => self.read_string(position),
            '=' => self.punct(TokenKind::Assign, position),
            '+' if self.peek_at(1) == Some('=') => {
                self.bump();
                self.punct(TokenKind::Append, position)
            }
            '+' => self.punct(TokenKind::Plus, position),
            ':' if self.state.sub == SubMode::Property => {
                self.punct(TokenKind::Assign, position)
            }
            ':' => self.punct(TokenKind::Colon, position),
            ',' => self.punct(TokenKind::Comma, position),
            '(' => self.punct(TokenKind::LParen, position),
            ')' => self.punct(TokenKind::RParen, position),
            c if is_letter(c) => {
                let ident = self.take_ident();
                let kind = match Keyword::from_ident(&ident) {
                    Some(keyword) if self.state.sub != SubMode::Property => {
                        TokenKind::Keyword(keyword)
                    }
                    _ => TokenKind::Ident,
                };
                Token::new(kind, ident, position)
            }
            c if c.is_control() => {
                self.bump();
                Token::new(TokenKind::Invalid, c.to_string(), position)
            }
            _ => {
                let word = self.take_while(|c| !is_space(c) && !"\n,()=\"`#".contains(c));
                Token::new(TokenKind::Value, word, position)
            }
        }
    }

    fn lex_value(&mut self) -> Token {
        let position = self.position();
        let Some(c) = self.peek() else {
            return self.end_of_input(position);
        };
        match c {
            c if is_space(c) => {
                self.skip_blank();
                Token::new(TokenKind::Blank, "", position)
            }
            ',' if self.state.sub == SubMode::Meta => {
                self.bump();
                self.skip_blank();
                Token::new(TokenKind::Blank, "", position)
            }
            '\n' => {
                self.bump();
                Token::new(TokenKind::Eol, "", position)
            }
            ',' => self.punct(TokenKind::Comma, position),
            '(' => self.punct(TokenKind::LParen, position),
            ')' => self.punct(TokenKind::RParen, position),
            '#' => self.read_comment(position),
            '"' | '`' => self.read_string(position),
            '%' => self.read_variable(position),
            _ => self.read_bare_value(position),
        }
    }

    fn lex_dependency(&mut self) -> Token {
        self.skip_blank();
        let position = self.position();
        let Some(c) = self.peek() else {
            return self.end_of_input(position);
        };
        match c {
            '\n' => {
                self.bump();
                Token::new(TokenKind::Eol, "", position)
            }
            '+' => self.punct(TokenKind::Plus, position),
            '?' => self.punct(TokenKind::Optional, position),
            '&' => self.punct(TokenKind::Background, position),
            '(' => self.punct(TokenKind::LParen, position),
            '#' => self.read_comment(position),
            c if is_letter(c) => {
                let name = self.take_ident();
                Token::new(TokenKind::Dependency, name, position)
            }
            c => {
                self.bump();
                Token::new(TokenKind::Invalid, c.to_string(), position)
            }
        }
    }

    /// Reads a whole script body at once. Leading indented comments and the
    /// script lines are queued, followed by an [`TokenKind::EndScript`].
    fn lex_script(&mut self) -> Token {
        loop {
            let position = self.position();
            match self.peek() {
                None => break,
                Some(c) if !is_space(c) && c != '\n' => break,
                Some(_) => {}
            }
            let mut line = self.take_line();
            if line.trim().is_empty() {
                continue;
            }
            while line.trim_end().ends_with('\\') && self.peek().is_some() {
                let head = line.trim_end().trim_end_matches('\\').trim_end().to_string();
                let next = self.take_line();
                line = format!("{} {}", head, next.trim_start());
            }
            let line = line.trim();
            let token = match line.strip_prefix('#') {
                Some(comment) => Token::new(TokenKind::Comment, comment.trim(), position),
                None => Token::new(TokenKind::Script, line, position),
            };
            self.pending.push_back(token);
        }
        self.pending
            .push_back(Token::new(TokenKind::EndScript, "", self.position()));
        self.state = LexState::default();
        self.pending
            .pop_front()
            .unwrap_or_else(|| Token::new(TokenKind::EndScript, "", self.position()))
    }

    // --- Token readers ---

    fn punct(&mut self, kind: TokenKind, position: Position) -> Token {
        let literal = self.bump().map(String::from).unwrap_or_default();
        Token::new(kind, literal, position)
    }

    fn end_of_input(&self, position: Position) -> Token {
        let kind = if self.malformed {
            TokenKind::Invalid
        } else {
            TokenKind::Eof
        };
        Token::new(kind, "", position)
    }

    fn read_comment(&mut self, position: Position) -> Token {
        self.bump();
        let text = self.take_while(|c| c != '\n');
        Token::new(TokenKind::Comment, text.trim(), position)
    }

    fn read_variable(&mut self, position: Position) -> Token {
        self.bump();
        if self.peek() != Some('(') {
            return Token::new(TokenKind::Invalid, "%", position);
        }
        self.bump();
        let mut name = String::new();
        loop {
            match self.peek() {
                Some(')') => {
                    self.bump();
                    break;
                }
                Some(c) if !is_space(c) && c != '\n' => {
                    name.push(c);
                    self.bump();
                }
                _ => return Token::new(TokenKind::Invalid, format!("%({}", name), position),
            }
        }
        if name.is_empty() {
            return Token::new(TokenKind::Invalid, "%()", position);
        }
        Token::new(TokenKind::Variable, name, position)
    }

    fn read_string(&mut self, position: Position) -> Token {
        let raw = self.bump() == Some('`');
        let end = if raw { '`' } else { '"' };
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Token::new(TokenKind::Invalid, text, position),
                Some(c) if c == end => break,
                Some('\\') if !raw && self.peek() == Some('"') => {
                    self.bump();
                    text.push('"');
                }
                Some(c) => text.push(c),
            }
        }
        if raw {
            let trimmed = text.trim_start_matches(['\n', '\t', ' ']);
            Token::new(TokenKind::Raw, trimmed, position)
        } else {
            Token::new(TokenKind::Quoted, text, position)
        }
    }

    fn read_bare_value(&mut self, position: Position) -> Token {
        let mut word = String::new();
        while let Some(c) = self.peek() {
            if is_space(c) || "\n,()\"`%".contains(c) {
                break;
            }
            word.push(c);
            self.bump();
        }
        Token::new(TokenKind::Value, word, position)
    }

    // --- Character primitives ---

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn take_while(&mut self, keep: impl Fn(char) -> bool) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !keep(c) {
                break;
            }
            text.push(c);
            self.bump();
        }
        text
    }

    /// Letters and digits, plus `_` and `-` for names such as `SSH_USER`
    /// or `build-docs`.
    fn take_ident(&mut self) -> String {
        self.take_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    /// Consumes the rest of the current line including its newline.
    fn take_line(&mut self) -> String {
        let line = self.take_while(|c| c != '\n');
        self.bump();
        line.trim_end_matches('\r').to_string()
    }

    fn skip_blank(&mut self) {
        while self.peek().is_some_and(is_space) {
            self.bump();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|c| is_space(c) || c == '\n') {
            self.bump();
        }
    }
}

fn is_letter(c: char) -> bool {
    c.is_ascii_alphabetic()
}

fn is_space(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\r'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(source.as_bytes());
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            let kind = token.kind;
            out.push(kind);
            if matches!(kind, TokenKind::Eof | TokenKind::Invalid) {
                return out;
            }
        }
    }

    fn tokens(source: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(source.as_bytes());
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = matches!(token.kind, TokenKind::Eof | TokenKind::Invalid);
            out.push(token);
            if done {
                return out;
            }
        }
    }

    #[test]
    fn test_variable_assignment() {
        use TokenKind::*;
        assert_eq!(
            kinds("NAME = foo \"bar\"\n"),
            vec![Ident, Assign, Blank, Value, Blank, Quoted, Eol, Eof]
        );
        assert_eq!(kinds("NAME += foo\n"), vec![Ident, Append, Blank, Value, Eol, Eof]);
    }

    #[test]
    fn test_meta_directive() {
        let toks = tokens(".DEFAULT = build\n");
        assert_eq!(toks[0].kind, TokenKind::Meta);
        assert_eq!(toks[0].literal, "DEFAULT");
        assert_eq!(toks[3].literal, "build");
    }

    #[test]
    fn test_identifiers_accept_underscore_and_dash() {
        let toks = tokens(".SSH_USER = deploy\nbuild-docs:\n  make docs\n");
        assert_eq!(toks[0].kind, TokenKind::Meta);
        assert_eq!(toks[0].literal, "SSH_USER");
        let cmd = toks.iter().find(|t| t.kind == TokenKind::Ident).unwrap();
        assert_eq!(cmd.literal, "build-docs");
    }

    #[test]
    fn test_meta_commas_are_blanks() {
        use TokenKind::*;
        assert_eq!(
            kinds(".ALL = a, b\n"),
            vec![Meta, Assign, Blank, Value, Blank, Value, Eol, Eof]
        );
    }

    #[test]
    fn test_keywords_are_retagged() {
        let toks = tokens("include \"other.mf\"\n");
        assert_eq!(toks[0].kind, TokenKind::Keyword(Keyword::Include));
        assert_eq!(toks[2].kind, TokenKind::Quoted);
        assert_eq!(toks[2].literal, "other.mf");
    }

    #[test]
    fn test_command_with_dependencies_and_script() {
        use TokenKind::*;
        let source = "build: clean + ?lint + &docs(html)\n  echo one\n  echo two\n";
        assert_eq!(
            kinds(source),
            vec![
                Ident, Colon, Dependency, Plus, Optional, Dependency, Plus, Background,
                Dependency, LParen, Ident, RParen, Eol, Script, Script, EndScript, Eof
            ]
        );
    }

    #[test]
    fn test_script_ends_at_unindented_line() {
        let toks = tokens("a:\n  echo a\nb:\n  echo b\n");
        let scripts: Vec<_> = toks
            .iter()
            .filter(|t| t.kind == TokenKind::Script)
            .map(|t| t.literal.as_str())
            .collect();
        assert_eq!(scripts, vec!["echo a", "echo b"]);
        assert_eq!(toks[4].kind, TokenKind::EndScript);
        assert_eq!(toks[5].literal, "b");
    }

    #[test]
    fn test_script_skips_blank_lines_and_reads_help() {
        let toks = tokens("a:\n\n  # Long help\n  echo a\n\n  echo b\n");
        assert_eq!(toks[3].kind, TokenKind::Comment);
        assert_eq!(toks[3].literal, "Long help");
        assert_eq!(toks[4].literal, "echo a");
        assert_eq!(toks[5].literal, "echo b");
    }

    #[test]
    fn test_script_line_continuation() {
        let toks = tokens("a:\n  echo one \\\n    two\n");
        assert_eq!(toks[3].kind, TokenKind::Script);
        assert_eq!(toks[3].literal, "echo one two");
    }

    #[test]
    fn test_property_block_accepts_colon_assignment() {
        use TokenKind::*;
        assert_eq!(
            kinds("a(short: \"x\", retry = 2):\n  true\n"),
            vec![
                Ident, LParen, Ident, Assign, Blank, Quoted, Comma, Ident, Assign, Blank,
                Value, RParen, Colon, Eol, Script, EndScript, Eof
            ]
        );
    }

    #[test]
    fn test_nested_parens_restore_value_mode() {
        use TokenKind::*;
        assert_eq!(
            kinds("a(args = x(notempty) y)\n"),
            vec![
                Ident, LParen, Ident, Assign, Blank, Value, LParen, Ident, RParen, Blank,
                Value, RParen, Eol, Eof
            ]
        );
    }

    #[test]
    fn test_double_quote_escape_and_raw_trim() {
        let toks = tokens("A = \"say \\\"hi\\\"\" `\n  raw %(x)`\n");
        assert_eq!(toks[3].literal, "say \"hi\"");
        assert_eq!(toks[5].kind, TokenKind::Raw);
        assert_eq!(toks[5].literal, "raw %(x)");
    }

    #[test]
    fn test_variable_reference() {
        let toks = tokens("A = pre%(name)\n");
        assert_eq!(toks[3].kind, TokenKind::Value);
        assert_eq!(toks[3].literal, "pre");
        assert_eq!(toks[4].kind, TokenKind::Variable);
        assert_eq!(toks[4].literal, "name");
    }

    #[test]
    fn test_invalid_variable_reference() {
        assert_eq!(kinds("A = %(na me)\n").last(), Some(&TokenKind::Invalid));
        assert_eq!(kinds("A = %name\n").last(), Some(&TokenKind::Invalid));
    }

    #[test]
    fn test_unterminated_string_is_invalid() {
        assert_eq!(kinds("A = \"open\n").last(), Some(&TokenKind::Invalid));
    }

    #[test]
    fn test_malformed_utf8_is_invalid() {
        let mut lexer = Lexer::new(b"A = x\n\xff\xfe");
        let mut last = lexer.next_token();
        while !matches!(last.kind, TokenKind::Eof | TokenKind::Invalid) {
            last = lexer.next_token();
        }
        assert_eq!(last.kind, TokenKind::Invalid);
    }

    #[test]
    fn test_positions_track_lines() {
        let toks = tokens("A = x\nB = y\n");
        let b = toks.iter().find(|t| t.literal == "B").unwrap();
        assert_eq!(b.position, Position { line: 2, column: 1 });
    }

    #[test]
    fn test_transition_table() {
        let deps = LexState::new(Mode::Dependency, SubMode::None);
        assert_eq!(
            transition(deps, TokenKind::Eol),
            Transition::Set(LexState::new(Mode::Script, SubMode::None))
        );
        assert_eq!(
            transition(LexState::default(), TokenKind::Colon),
            Transition::Set(deps)
        );
        assert_eq!(transition(deps, TokenKind::RParen), Transition::Pop);
        assert_eq!(
            transition(LexState::default(), TokenKind::Keyword(Keyword::Include)),
            Transition::Set(LexState::new(Mode::Value, SubMode::None))
        );
    }
}
