use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

use log::{debug, warn};

pub const MAX_ALIASES: usize = 128;

const DEFAULT_RC: &str = "# Default ashrc\n# Add your aliases here, e.g.\n# alias ll=ls -l\n";

#[derive(Debug, Default)]
pub struct Aliases {
    entries: Vec<(String, String)>,
}

impl Aliases {
    /// 读取 rc 文件中的 `alias name=expansion` 行，文件不存在时先创建
    pub fn ensure_and_load(rc_file: &Path) -> io::Result<Self> {
        let text = match fs::read_to_string(rc_file) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::write(rc_file, DEFAULT_RC)?;
                debug!("已创建默认 rc 文件 {}", rc_file.display());
                DEFAULT_RC.to_string()
            }
            Err(e) => return Err(e),
        };
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut aliases = Aliases::default();
        for line in text.lines() {
            let Some(rest) = line.trim_start().strip_prefix("alias ") else {
                continue;
            };
            let Some((name, expansion)) = rest.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() || name.contains(char::is_whitespace) {
                continue;
            }
            aliases.insert(name, strip_quotes(expansion.trim()));
        }
        aliases
    }

    /// 超出上限的条目被忽略；同名覆盖
    pub fn insert(&mut self, name: &str, expansion: &str) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = expansion.to_string();
            return true;
        }
        if self.entries.len() >= MAX_ALIASES {
            warn!("别名过多，忽略: {}", name);
            return false;
        }
        self.entries.push((name.to_string(), expansion.to_string()));
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 首个单词与别名完全相同时替换一次，不递归
    pub fn rewrite(&self, line: &str) -> String {
        let trimmed = line.trim_start();
        let word_end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        let (word, rest) = trimmed.split_at(word_end);
        match self.entries.iter().find(|(name, _)| name == word) {
            Some((_, expansion)) => format!("{}{}", expansion, rest),
            None => line.to_string(),
        }
    }
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}
