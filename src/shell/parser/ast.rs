/// 命令与下一条命令之间的关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Separator {
    Pipe,
    And,
    Or,
    Sequence,
    Background,
    #[default]
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub filename: String,
    pub append: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    /// argv 风格，第一个元素是程序名或内建命令名
    pub arguments: Vec<String>,
    pub input: Option<String>,
    pub output: Option<Redirection>,
    pub separator: Separator,
}

impl Command {
    pub fn program(&self) -> Option<&str> {
        self.arguments.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.arguments.is_empty()
    }
}

/// 一段由管道连接的命令，连同其后的分隔符
#[derive(Debug, Clone, Copy)]
pub struct Segment<'a> {
    pub commands: &'a [Command],
    pub separator: Separator,
}

/// 按分隔符把命令链切分为管道段
pub fn segments(chain: &[Command]) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut start = 0;
    for (i, command) in chain.iter().enumerate() {
        if command.separator != Separator::Pipe {
            segments.push(Segment {
                commands: &chain[start..=i],
                separator: command.separator,
            });
            start = i + 1;
        }
    }
    segments
}
