//! Hand-rolled lexer producing a token stream for the parser.
//!
//! Grown from Nova's own abandoned `nova_parser` prototype: same `Token`
//! enum shape, `phf` keyword table and `lbp` (left binding power) scheme,
//! generalized to cover numeric literal varieties, full string/template
//! escaping, regex-literal disambiguation and private names.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Eof,
    Ident,
    PrivateIdent,
    Number,
    BigInt,
    Semi,
    Equal,
    LBrack,
    RBrack,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Inc,
    Dec,
    Sub,
    Colon,
    Comma,
    Pow,
    Mul,
    Not,
    Gte,
    Gt,
    ShiftRight,
    ShiftRightAssign,
    UShiftRight,
    UShiftRightAssign,
    ShiftLeft,
    ShiftLeftAssign,
    Lt,
    Lte,
    BOrAssign,
    BOr,
    OrAssign,
    Or,
    AndAssign,
    And,
    BAndAssign,
    BAnd,
    Xor,
    XorAssign,
    BNot,
    Nullish,
    NullishAssign,
    Ternary,
    Div,
    DivAssign,
    Mod,
    ModAssign,
    AddAssign,
    Add,
    SubAssign,
    PowAssign,
    MulAssign,
    Equality,
    StrictEquality,
    StrictInequality,
    Inequality,
    OptionalChain,
    Dot,
    Spread,
    QuestionDot,
    String,
    Template,
    TemplateEnd,
    TemplatePart,
    TemplateStart,
    NoSubstitutionTemplate,
    Regex,
    Arrow,
    Invalid,
    InvalidString,
    InvalidComment,
    InvalidNumber,

    KeywordAwait,
    KeywordAsync,
    KeywordBreak,
    KeywordCase,
    KeywordCatch,
    KeywordClass,
    KeywordContinue,
    KeywordConst,
    KeywordDebugger,
    KeywordDefault,
    KeywordDelete,
    KeywordDo,
    KeywordElse,
    KeywordExport,
    KeywordExtends,
    KeywordFalse,
    KeywordFinally,
    KeywordFor,
    KeywordFrom,
    KeywordFunction,
    KeywordGet,
    KeywordIf,
    KeywordIn,
    KeywordInstanceOf,
    KeywordImport,
    KeywordLet,
    KeywordNew,
    KeywordNull,
    KeywordOf,
    KeywordReturn,
    KeywordSet,
    KeywordStatic,
    KeywordSuper,
    KeywordSwitch,
    KeywordThis,
    KeywordThrow,
    KeywordTrue,
    KeywordTry,
    KeywordTypeOf,
    KeywordVar,
    KeywordVoid,
    KeywordWhile,
    KeywordWith,
    KeywordYield,
}

impl Token {
    pub fn is_right_assoc(self) -> bool {
        matches!(
            self,
            Token::Pow
                | Token::Ternary
                | Token::Arrow
                | Token::Equal
                | Token::AddAssign
                | Token::PowAssign
                | Token::SubAssign
                | Token::MulAssign
                | Token::DivAssign
                | Token::ModAssign
                | Token::ShiftLeftAssign
                | Token::ShiftRightAssign
                | Token::UShiftRightAssign
                | Token::BAndAssign
                | Token::XorAssign
                | Token::BOrAssign
                | Token::AndAssign
                | Token::OrAssign
                | Token::NullishAssign
        )
    }

    /// <https://developer.mozilla.org/en-US/docs/Web/JavaScript/Reference/Operators/Operator_Precedence>
    pub fn lbp(self) -> u8 {
        match self {
            Token::Dot | Token::OptionalChain | Token::LBrack | Token::LParen => 18,
            Token::Inc | Token::Dec => 16,
            Token::Pow => 14,
            Token::Mul | Token::Mod | Token::Div => 13,
            Token::Add | Token::Sub => 12,
            Token::ShiftLeft | Token::ShiftRight | Token::UShiftRight => 11,
            Token::Lt
            | Token::Lte
            | Token::Gt
            | Token::Gte
            | Token::KeywordIn
            | Token::KeywordInstanceOf => 10,
            Token::Equality
            | Token::Inequality
            | Token::StrictEquality
            | Token::StrictInequality => 9,
            Token::BAnd => 8,
            Token::Xor => 7,
            Token::BOr => 6,
            Token::And => 5,
            Token::Or | Token::Nullish => 4,
            Token::Equal
            | Token::AddAssign
            | Token::PowAssign
            | Token::SubAssign
            | Token::MulAssign
            | Token::DivAssign
            | Token::ModAssign
            | Token::ShiftLeftAssign
            | Token::ShiftRightAssign
            | Token::UShiftRightAssign
            | Token::BAndAssign
            | Token::XorAssign
            | Token::BOrAssign
            | Token::AndAssign
            | Token::OrAssign
            | Token::NullishAssign => 3,
            Token::Ternary => 2,
            Token::Comma => 1,
            _ => 0,
        }
    }

    /// Is this token a keyword that the parser treats contextually as a
    /// plain identifier in binding position (`let`, `async`, `await`,
    /// `yield`, `of`, `from`, `get`, `set`, `static`)?
    pub fn is_contextual_keyword(self) -> bool {
        matches!(
            self,
            Token::KeywordAsync
                | Token::KeywordAwait
                | Token::KeywordYield
                | Token::KeywordLet
                | Token::KeywordOf
                | Token::KeywordFrom
                | Token::KeywordGet
                | Token::KeywordSet
                | Token::KeywordStatic
        )
    }
}

static KEYWORDS: phf::Map<&'static str, Token> = phf::phf_map! {
    "await" => Token::KeywordAwait,
    "async" => Token::KeywordAsync,
    "break" => Token::KeywordBreak,
    "case" => Token::KeywordCase,
    "catch" => Token::KeywordCatch,
    "class" => Token::KeywordClass,
    "continue" => Token::KeywordContinue,
    "const" => Token::KeywordConst,
    "debugger" => Token::KeywordDebugger,
    "default" => Token::KeywordDefault,
    "delete" => Token::KeywordDelete,
    "do" => Token::KeywordDo,
    "else" => Token::KeywordElse,
    "export" => Token::KeywordExport,
    "extends" => Token::KeywordExtends,
    "false" => Token::KeywordFalse,
    "finally" => Token::KeywordFinally,
    "for" => Token::KeywordFor,
    "from" => Token::KeywordFrom,
    "function" => Token::KeywordFunction,
    "get" => Token::KeywordGet,
    "if" => Token::KeywordIf,
    "in" => Token::KeywordIn,
    "instanceof" => Token::KeywordInstanceOf,
    "import" => Token::KeywordImport,
    "let" => Token::KeywordLet,
    "new" => Token::KeywordNew,
    "null" => Token::KeywordNull,
    "of" => Token::KeywordOf,
    "return" => Token::KeywordReturn,
    "set" => Token::KeywordSet,
    "static" => Token::KeywordStatic,
    "super" => Token::KeywordSuper,
    "switch" => Token::KeywordSwitch,
    "this" => Token::KeywordThis,
    "throw" => Token::KeywordThrow,
    "true" => Token::KeywordTrue,
    "try" => Token::KeywordTry,
    "typeof" => Token::KeywordTypeOf,
    "var" => Token::KeywordVar,
    "void" => Token::KeywordVoid,
    "while" => Token::KeywordWhile,
    "with" => Token::KeywordWith,
    "yield" => Token::KeywordYield,
};

/// Tells the lexer whether a bare `/` should be read as division or as the
/// start of a regex literal. The parser flips this before calling `next()`
/// depending on whether the previous token could end an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashMode {
    Divide,
    Regex,
}

#[derive(Debug)]
pub struct Lexer<'a> {
    pub source: &'a str,
    /// `Option<char>` is memory-optimized to 4 bytes thanks to the UTF-8
    /// codepoint ceiling.
    pub codepoint: Option<char>,
    pub index: usize,
    pub token: Token,
    pub start: usize,
    pub has_newline_before: bool,
    pub open_template_count: usize,
    pub slash_mode: SlashMode,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            codepoint: source.chars().next(),
            index: 0,
            token: Token::Eof,
            start: 0,
            has_newline_before: true,
            open_template_count: 0,
            slash_mode: SlashMode::Regex,
        }
    }

    pub fn text(&self) -> &'a str {
        &self.source[self.start..self.index]
    }

    /// Resets the lexer to the given byte offset, re-reading from there.
    pub fn reset(&mut self, index: usize) {
        self.index = index;
        self.codepoint = self.source[self.index..].chars().next();
        self.next();
    }

    fn step(&mut self) {
        let Some(cp) = self.codepoint else {
            return;
        };
        self.index += cp.len_utf8();
        self.codepoint = self.source[self.index..].chars().next();
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.source[self.index + offset..].chars().next()
    }

    #[inline]
    fn continue_ident_fast(&mut self) {
        loop {
            match self.codepoint {
                Some('a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '$') => self.step(),
                Some(ch) if ch.is_ascii() => break,
                Some(_) => return self.continue_ident_slow(),
                None => break,
            }
        }
        if let Some(keyword) = KEYWORDS.get(self.text()) {
            self.token = *keyword;
        }
    }

    #[inline]
    fn continue_ident_slow(&mut self) {
        loop {
            let Some(ch) = self.codepoint else { break };
            if !unicode_id_start::is_id_continue(ch) && ch != '$' && ch != '_' {
                break;
            }
            self.step();
        }
        if let Some(keyword) = KEYWORDS.get(self.text()) {
            self.token = *keyword;
        }
    }

    /// Numeric literals: decimal, hex (`0x`), octal (`0o`), binary (`0b`),
    /// legacy octal (`0`-prefixed digits), scientific notation, numeric
    /// separators (`_`), and a trailing BigInt `n` suffix.
    fn continue_number(&mut self, first: char) {
        let mut is_float = false;
        if first == '0' {
            match self.codepoint {
                Some('x' | 'X') => {
                    self.step();
                    self.consume_digits(|c| c.is_ascii_hexdigit());
                    return self.finish_number(is_float);
                }
                Some('o' | 'O') => {
                    self.step();
                    self.consume_digits(|c| ('0'..='7').contains(&c));
                    return self.finish_number(is_float);
                }
                Some('b' | 'B') => {
                    self.step();
                    self.consume_digits(|c| c == '0' || c == '1');
                    return self.finish_number(is_float);
                }
                Some('0'..='9') => {
                    // Legacy octal or a decimal literal with a leading zero.
                    self.consume_digits(|c| c.is_ascii_digit());
                }
                _ => {}
            }
        } else {
            self.consume_digits(|c| c.is_ascii_digit());
        }

        if self.codepoint == Some('.') {
            is_float = true;
            self.step();
            self.consume_digits(|c| c.is_ascii_digit());
        }
        if matches!(self.codepoint, Some('e' | 'E')) {
            is_float = true;
            self.step();
            if matches!(self.codepoint, Some('+' | '-')) {
                self.step();
            }
            self.consume_digits(|c| c.is_ascii_digit());
        }
        self.finish_number(is_float);
    }

    fn consume_digits(&mut self, pred: impl Fn(char) -> bool) {
        loop {
            match self.codepoint {
                Some(c) if pred(c) => self.step(),
                Some('_') => self.step(),
                _ => break,
            }
        }
    }

    fn finish_number(&mut self, is_float: bool) {
        if !is_float && self.codepoint == Some('n') {
            self.step();
            self.token = Token::BigInt;
        } else {
            self.token = Token::Number;
        }
    }

    fn continue_string(&mut self, end: char) {
        let mut escaped = false;
        loop {
            match (escaped, self.codepoint) {
                (_, None | Some('\r' | '\n')) => {
                    self.token = Token::InvalidString;
                    break;
                }
                (false, ch) if ch == Some(end) => {
                    self.step();
                    break;
                }
                (false, Some('\\')) => escaped = true,
                _ => escaped = false,
            }
            self.step();
        }
    }

    fn continue_template(&mut self) {
        let mut escaped = false;
        loop {
            match (escaped, self.codepoint) {
                (_, None) => {
                    self.token = Token::InvalidString;
                    break;
                }
                (false, Some('`')) => {
                    self.step();
                    self.token = if self.token == Token::TemplateStart {
                        Token::NoSubstitutionTemplate
                    } else {
                        Token::TemplateEnd
                    };
                    break;
                }
                (false, Some('$')) if self.peek_at(1) == Some('{') => {
                    self.step();
                    self.step();
                    self.open_template_count += 1;
                    self.token = if self.token == Token::TemplateStart {
                        Token::TemplateStart
                    } else {
                        Token::TemplatePart
                    };
                    break;
                }
                (false, Some('\\')) => {
                    escaped = true;
                    self.step();
                }
                _ => {
                    escaped = false;
                    self.step();
                }
            }
        }
    }

    /// Called by the parser once it closes the `}` that ends a template
    /// interpolation hole, to resume scanning the literal's tail.
    pub fn resume_template(&mut self) {
        self.start = self.index;
        self.token = Token::TemplateStart; // reuse the "not yet closed" branch
        self.continue_template();
    }

    fn continue_regex(&mut self) {
        let mut in_class = false;
        let mut escaped = false;
        loop {
            match (escaped, in_class, self.codepoint) {
                (_, _, None | Some('\r' | '\n')) => {
                    self.token = Token::Invalid;
                    return;
                }
                (false, false, Some('/')) => {
                    self.step();
                    break;
                }
                (false, _, Some('\\')) => {
                    escaped = true;
                    self.step();
                }
                (false, false, Some('[')) => {
                    in_class = true;
                    self.step();
                }
                (false, true, Some(']')) => {
                    in_class = false;
                    self.step();
                }
                _ => {
                    escaped = false;
                    self.step();
                }
            }
        }
        // Flags.
        while matches!(self.codepoint, Some('a'..='z')) {
            self.step();
        }
        self.token = Token::Regex;
    }

    pub fn next(&mut self) {
        self.has_newline_before = false;

        'main: loop {
            self.start = self.index;

            match self.codepoint {
                None => self.token = Token::Eof,
                Some(' ' | '\t' | '\u{feff}' | '\u{a0}') => {
                    self.step();
                    continue 'main;
                }
                Some('\r' | '\n' | '\u{2028}' | '\u{2029}') => {
                    self.step();
                    self.has_newline_before = true;
                    continue 'main;
                }
                Some('a'..='z' | 'A'..='Z' | '_' | '$') => {
                    self.step();
                    self.token = Token::Ident;
                    self.continue_ident_fast();
                }
                Some('#') => {
                    self.step();
                    self.token = Token::PrivateIdent;
                    self.continue_ident_fast();
                    self.token = Token::PrivateIdent;
                }
                Some('0'..='9') => {
                    let first = self.codepoint.unwrap();
                    self.step();
                    self.continue_number(first);
                }
                Some('\'') => {
                    self.step();
                    self.token = Token::String;
                    self.continue_string('\'');
                }
                Some('"') => {
                    self.step();
                    self.token = Token::String;
                    self.continue_string('"');
                }
                Some('`') => {
                    self.step();
                    self.token = Token::TemplateStart;
                    self.continue_template();
                }
                Some('[') => {
                    self.step();
                    self.token = Token::LBrack;
                }
                Some(']') => {
                    self.step();
                    self.token = Token::RBrack;
                }
                Some('(') => {
                    self.step();
                    self.token = Token::LParen;
                }
                Some(')') => {
                    self.step();
                    self.token = Token::RParen;
                }
                Some('{') => {
                    self.step();
                    self.token = Token::LBrace;
                }
                Some('}') => {
                    self.step();
                    if self.open_template_count > 0 {
                        self.open_template_count -= 1;
                        self.continue_template();
                    } else {
                        self.token = Token::RBrace;
                    }
                }
                Some('+') => {
                    self.step();
                    self.token = match self.codepoint {
                        Some('+') => {
                            self.step();
                            Token::Inc
                        }
                        Some('=') => {
                            self.step();
                            Token::AddAssign
                        }
                        _ => Token::Add,
                    };
                }
                Some('-') => {
                    self.step();
                    self.token = match self.codepoint {
                        Some('-') => {
                            self.step();
                            Token::Dec
                        }
                        Some('=') => {
                            self.step();
                            Token::SubAssign
                        }
                        _ => Token::Sub,
                    };
                }
                Some('*') => {
                    self.step();
                    self.token = match self.codepoint {
                        Some('*') => {
                            self.step();
                            if self.codepoint == Some('=') {
                                self.step();
                                Token::PowAssign
                            } else {
                                Token::Pow
                            }
                        }
                        Some('=') => {
                            self.step();
                            Token::MulAssign
                        }
                        _ => Token::Mul,
                    };
                }
                Some('%') => {
                    self.step();
                    self.token = if self.codepoint == Some('=') {
                        self.step();
                        Token::ModAssign
                    } else {
                        Token::Mod
                    };
                }
                Some('/') => 'blk: {
                    self.step();
                    match self.codepoint {
                        Some('/') => {
                            loop {
                                self.step();
                                match self.codepoint {
                                    None | Some('\r' | '\n') => continue 'main,
                                    _ => {}
                                }
                            }
                        }
                        Some('*') => loop {
                            self.step();
                            match self.codepoint {
                                None => {
                                    self.token = Token::InvalidComment;
                                    break 'blk;
                                }
                                Some('*') if self.peek_at(1) == Some('/') => {
                                    self.step();
                                    self.step();
                                    continue 'main;
                                }
                                Some('\n') => {
                                    self.has_newline_before = true;
                                    // fallthrough to step below
                                }
                                _ => {}
                            }
                        },
                        Some('=') if self.slash_mode == SlashMode::Divide => {
                            self.step();
                            self.token = Token::DivAssign;
                        }
                        _ if self.slash_mode == SlashMode::Regex => {
                            self.continue_regex();
                        }
                        _ => {
                            self.token = Token::Div;
                        }
                    };
                }
                Some('=') => {
                    self.step();
                    self.token = match self.codepoint {
                        Some('>') => {
                            self.step();
                            Token::Arrow
                        }
                        Some('=') => {
                            self.step();
                            if self.codepoint == Some('=') {
                                self.step();
                                Token::StrictEquality
                            } else {
                                Token::Equality
                            }
                        }
                        _ => Token::Equal,
                    };
                }
                Some('!') => {
                    self.step();
                    self.token = if self.codepoint == Some('=') {
                        self.step();
                        if self.codepoint == Some('=') {
                            self.step();
                            Token::StrictInequality
                        } else {
                            Token::Inequality
                        }
                    } else {
                        Token::Not
                    };
                }
                Some('>') => {
                    self.step();
                    self.token = match self.codepoint {
                        Some('=') => {
                            self.step();
                            Token::Gte
                        }
                        Some('>') => {
                            self.step();
                            match self.codepoint {
                                Some('>') => {
                                    self.step();
                                    if self.codepoint == Some('=') {
                                        self.step();
                                        Token::UShiftRightAssign
                                    } else {
                                        Token::UShiftRight
                                    }
                                }
                                Some('=') => {
                                    self.step();
                                    Token::ShiftRightAssign
                                }
                                _ => Token::ShiftRight,
                            }
                        }
                        _ => Token::Gt,
                    };
                }
                Some('<') => {
                    self.step();
                    self.token = match self.codepoint {
                        Some('=') => {
                            self.step();
                            Token::Lte
                        }
                        Some('<') => {
                            self.step();
                            if self.codepoint == Some('=') {
                                self.step();
                                Token::ShiftLeftAssign
                            } else {
                                Token::ShiftLeft
                            }
                        }
                        _ => Token::Lt,
                    };
                }
                Some('|') => {
                    self.step();
                    self.token = match self.codepoint {
                        Some('|') => {
                            self.step();
                            if self.codepoint == Some('=') {
                                self.step();
                                Token::OrAssign
                            } else {
                                Token::Or
                            }
                        }
                        Some('=') => {
                            self.step();
                            Token::BOrAssign
                        }
                        _ => Token::BOr,
                    };
                }
                Some('&') => {
                    self.step();
                    self.token = match self.codepoint {
                        Some('&') => {
                            self.step();
                            if self.codepoint == Some('=') {
                                self.step();
                                Token::AndAssign
                            } else {
                                Token::And
                            }
                        }
                        Some('=') => {
                            self.step();
                            Token::BAndAssign
                        }
                        _ => Token::BAnd,
                    };
                }
                Some('^') => {
                    self.step();
                    self.token = if self.codepoint == Some('=') {
                        self.step();
                        Token::XorAssign
                    } else {
                        Token::Xor
                    };
                }
                Some('~') => {
                    self.step();
                    self.token = Token::BNot;
                }
                Some('?') => {
                    self.step();
                    self.token = match self.codepoint {
                        Some('?') => {
                            self.step();
                            if self.codepoint == Some('=') {
                                self.step();
                                Token::NullishAssign
                            } else {
                                Token::Nullish
                            }
                        }
                        Some('.') if !matches!(self.peek_at(1), Some('0'..='9')) => {
                            self.step();
                            Token::OptionalChain
                        }
                        _ => Token::Ternary,
                    };
                }
                Some('.') => {
                    self.step();
                    self.token = if self.codepoint == Some('.') && self.peek_at(1) == Some('.') {
                        self.step();
                        self.step();
                        Token::Spread
                    } else {
                        Token::Dot
                    };
                }
                Some(';') => {
                    self.step();
                    self.token = Token::Semi;
                }
                Some(':') => {
                    self.step();
                    self.token = Token::Colon;
                }
                Some(',') => {
                    self.step();
                    self.token = Token::Comma;
                }
                Some(ch) => 'blk: {
                    if ch.is_whitespace() {
                        self.step();
                        continue 'main;
                    }
                    if unicode_id_start::is_id_start(ch) {
                        self.step();
                        self.token = Token::Ident;
                        self.continue_ident_slow();
                        break 'blk;
                    }
                    self.step();
                    self.token = Token::Invalid;
                }
            }

            break;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    macro_rules! assert_tokens {
        ($source: expr, $tokens: expr) => {{
            let expected: &[Token] = $tokens;
            let mut out = Vec::<Token>::with_capacity(expected.len());
            let source: &str = $source;
            let mut stream = Lexer::new(source);
            loop {
                stream.next();
                if stream.token == Token::Eof {
                    break;
                }
                out.push(stream.token);
            }
            assert_eq!(out.as_slice(), expected);
        }};
    }

    #[test]
    fn unicode_identifiers() {
        assert_tokens!(
            "ሀ zቐ ኂd bꡅa",
            &[Token::Ident, Token::Ident, Token::Ident, Token::Ident]
        );
    }

    #[test]
    fn operators() {
        assert_tokens!(
            "+ += ++ - -= -- * *= % %= ** **= . ...",
            &[
                Token::Add,
                Token::AddAssign,
                Token::Inc,
                Token::Sub,
                Token::SubAssign,
                Token::Dec,
                Token::Mul,
                Token::MulAssign,
                Token::Mod,
                Token::ModAssign,
                Token::Pow,
                Token::PowAssign,
                Token::Dot,
                Token::Spread,
            ]
        );
    }

    #[test]
    fn numeric_literals() {
        let mut lex = Lexer::new("0x1F 0o17 0b101 1_000.5e-2 10n");
        let mut kinds = Vec::new();
        loop {
            lex.next();
            if lex.token == Token::Eof {
                break;
            }
            kinds.push(lex.token);
        }
        assert_eq!(
            kinds,
            vec![
                Token::Number,
                Token::Number,
                Token::Number,
                Token::Number,
                Token::BigInt,
            ]
        );
    }

    #[test]
    fn private_name() {
        let mut lex = Lexer::new("#x");
        lex.next();
        assert_eq!(lex.token, Token::PrivateIdent);
        assert_eq!(lex.text(), "#x");
    }

    #[test]
    fn template_with_interpolation() {
        let mut lex = Lexer::new("`a${1}b`");
        lex.next();
        assert_eq!(lex.token, Token::TemplateStart);
    }

    #[test]
    fn asi_newline_tracking() {
        let mut lex = Lexer::new("a\nb");
        lex.next();
        assert!(!lex.has_newline_before);
        lex.next();
        assert!(lex.has_newline_before);
    }
}
