use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::Result;

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Token {
    Word(String),
    Pipe,
    And,
    Or,
    Semi,
    Background,
    RedirectIn,
    // `>>` 是两个连续的 RedirectOut
    RedirectOut,
}

impl Token {
    pub fn text(&self) -> &str {
        match self {
            Token::Word(word) => word,
            Token::Pipe => "|",
            Token::And => "&&",
            Token::Or => "||",
            Token::Semi => ";",
            Token::Background => "&",
            Token::RedirectIn => "<",
            Token::RedirectOut => ">",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuote,
    DoubleQuote,
}

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    line_len: usize,
    state: State,
    buffer: String,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.chars().peekable(),
            line_len: input.len(),
            state: State::Normal,
            buffer: String::new(),
            tokens: Vec::new(),
        }
    }

    /// 把整行切分成 token
    ///
    /// 输出中不含引号。开引号会结束正在构建的单词，闭引号不会，
    /// 所以 `a'b'c` 得到 `a` 和 `bc`。
    pub fn tokenize(mut self) -> Result<Vec<Token>> {
        // 单词缓冲区与 token 表都不会超过整行长度
        self.buffer.try_reserve(self.line_len)?;
        self.tokens.try_reserve(self.line_len)?;

        while let Some(c) = self.read_char() {
            match self.state {
                State::Normal => self.normal(c)?,
                State::SingleQuote => self.single_quoted(c),
                State::DoubleQuote => self.double_quoted(c),
            }
        }
        self.flush()?;
        Ok(self.tokens)
    }

    fn read_char(&mut self) -> Option<char> {
        self.input.next()
    }

    fn peek_char(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    /// 缓冲区保留容量，单词按实际长度另行分配
    fn flush(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            let mut word = String::new();
            word.try_reserve_exact(self.buffer.len())?;
            word.push_str(&self.buffer);
            self.buffer.clear();
            self.tokens.push(Token::Word(word));
        }
        Ok(())
    }

    fn emit(&mut self, token: Token) -> Result<()> {
        self.flush()?;
        self.tokens.push(token);
        Ok(())
    }

    fn normal(&mut self, c: char) -> Result<()> {
        match c {
            c if c.is_whitespace() => self.flush()?,
            '\'' => {
                self.flush()?;
                self.state = State::SingleQuote;
            }
            '"' => {
                self.flush()?;
                self.state = State::DoubleQuote;
            }
            '\\' => {
                if let Some(escaped) = self.read_char() {
                    self.buffer.push(escaped);
                }
            }
            '|' => {
                if self.peek_char() == Some('|') {
                    self.read_char();
                    self.emit(Token::Or)?;
                } else {
                    self.emit(Token::Pipe)?;
                }
            }
            '&' => {
                if self.peek_char() == Some('&') {
                    self.read_char();
                    self.emit(Token::And)?;
                } else {
                    self.emit(Token::Background)?;
                }
            }
            ';' => self.emit(Token::Semi)?,
            '<' => self.emit(Token::RedirectIn)?,
            '>' => self.emit(Token::RedirectOut)?,
            c => self.buffer.push(c),
        }
        Ok(())
    }

    fn single_quoted(&mut self, c: char) {
        if c == '\'' {
            self.state = State::Normal;
        } else {
            self.buffer.push(c);
        }
    }

    fn double_quoted(&mut self, c: char) {
        match c {
            '"' => self.state = State::Normal,
            '\\' if matches!(self.peek_char(), Some('"' | '$' | '`' | '\\')) => {
                if let Some(escaped) = self.read_char() {
                    self.buffer.push(escaped);
                }
            }
            c => self.buffer.push(c),
        }
    }
}

/// 对一行输入分词
pub fn tokenize(line: &str) -> Result<Vec<Token>> {
    Lexer::new(line).tokenize()
}
