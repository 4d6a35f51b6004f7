use std::vec::IntoIter;

use super::ast::{Command, Redirection, Separator};
use super::lexer::Token;
use crate::error::{Result, ShellError};
use crate::shell::executor::variable::Variable;

pub const MAX_ARGS: usize = 256;

/// 解析结果：尽力构建的命令链，以及途中发现的语法错误
#[derive(Debug, Default)]
pub struct Parsed {
    pub commands: Vec<Command>,
    pub errors: Vec<String>,
}

impl Parsed {
    /// 有语法错误时整行作废
    pub fn into_result(self) -> Result<Vec<Command>> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ShellError::Syntax(error)),
            None => Ok(self.commands),
        }
    }
}

pub struct Parser<'a> {
    tokens: IntoIter<Token>,
    current_token: Option<Token>,
    variables: &'a Variable,
    current: Command,
    overflowed: bool,
    parsed: Parsed,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, variables: &'a Variable) -> Self {
        let mut tokens = tokens.into_iter();
        let current_token = tokens.next();
        Parser {
            tokens,
            current_token,
            variables,
            current: Command::default(),
            overflowed: false,
            parsed: Parsed::default(),
        }
    }

    fn next_token(&mut self) {
        self.current_token = self.tokens.next();
    }

    /// 构建命令链，末尾节点的分隔符总是 `End`；没有 token 时返回空链
    pub fn parse(mut self) -> Parsed {
        if self.current_token.is_none() {
            return self.parsed;
        }

        while let Some(token) = self.current_token.take() {
            match token {
                Token::Pipe => self.close_command(Separator::Pipe),
                Token::And => self.close_command(Separator::And),
                Token::Or => self.close_command(Separator::Or),
                Token::Semi => self.close_command(Separator::Sequence),
                Token::Background => self.close_command(Separator::Background),
                Token::RedirectIn => {
                    self.next_token();
                    if let Some(filename) = self.redirect_target("<") {
                        self.current.input = Some(filename);
                    }
                    continue;
                }
                Token::RedirectOut => {
                    self.next_token();
                    let append = self.current_token == Some(Token::RedirectOut);
                    if append {
                        self.next_token();
                    }
                    let operator = if append { ">>" } else { ">" };
                    if let Some(filename) = self.redirect_target(operator) {
                        self.current.output = Some(Redirection { filename, append });
                    }
                    continue;
                }
                Token::Word(word) => self.push_argument(&word),
            }
            self.next_token();
        }

        self.close_command(Separator::End);
        self.check_empty_commands();
        self.parsed
    }

    /// 分隔符两侧都必须有命令，`;` 与 `&` 之后的空尾部除外
    fn check_empty_commands(&mut self) {
        let commands = &self.parsed.commands;
        let last = commands.len() - 1;
        for (i, command) in commands.iter().enumerate() {
            if !command.is_empty() {
                continue;
            }
            let trailing_tail = i == last
                && i > 0
                && matches!(
                    commands[i - 1].separator,
                    Separator::Sequence | Separator::Background
                );
            if trailing_tail {
                continue;
            }
            let near = separator_text(
                i.checked_sub(1)
                    .map_or(command.separator, |prev| commands[prev].separator),
            );
            self.parsed
                .errors
                .push(format!("missing command near '{near}'"));
            return;
        }
    }

    fn close_command(&mut self, separator: Separator) {
        let mut command = std::mem::take(&mut self.current);
        command.separator = separator;
        self.overflowed = false;
        self.parsed.commands.push(command);
    }

    fn push_argument(&mut self, word: &str) {
        if self.current.arguments.len() >= MAX_ARGS {
            if !self.overflowed {
                self.overflowed = true;
                self.parsed
                    .errors
                    .push(format!("too many arguments (limit {MAX_ARGS})"));
            }
            return;
        }
        self.current.arguments.push(self.variables.expand(word));
    }

    /// 读取重定向目标；目标缺失时记录错误且不消耗后面的运算符
    fn redirect_target(&mut self, operator: &str) -> Option<String> {
        match &self.current_token {
            Some(Token::Word(filename)) => {
                let filename = self.variables.expand(filename);
                self.next_token();
                Some(filename)
            }
            Some(token) => {
                let error = format!("unexpected '{token}' after '{operator}'");
                self.parsed.errors.push(error);
                None
            }
            None => {
                self.parsed
                    .errors
                    .push(format!("expected file name after '{operator}'"));
                None
            }
        }
    }
}

fn separator_text(separator: Separator) -> &'static str {
    match separator {
        Separator::Pipe => "|",
        Separator::And => "&&",
        Separator::Or => "||",
        Separator::Sequence => ";",
        Separator::Background => "&",
        Separator::End => "newline",
    }
}

/// 便捷入口：token 序列 → 命令链
pub fn parse(tokens: Vec<Token>, variables: &Variable) -> Parsed {
    Parser::new(tokens, variables).parse()
}
