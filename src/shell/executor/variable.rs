use std::collections::HashMap;
use std::env;

use log::debug;

use crate::error::{Result, ShellError};

pub const MAX_NAME_LEN: usize = 64;
pub const MAX_VALUE_LEN: usize = 4096;
pub const MAX_VARIABLES: usize = 1024;

/// shell 变量，查不到时回退到进程环境变量
pub struct Variable {
    shell_name: String,
    local_vars: HashMap<String, String>,
}

impl Variable {
    pub fn new(shell_name: impl Into<String>) -> Self {
        Self {
            shell_name: shell_name.into(),
            local_vars: HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.local_vars
            .get(name)
            .cloned()
            .or_else(|| env::var(name).ok())
    }

    /// 新增或覆盖变量，后赋值的生效
    pub fn set(&mut self, name: &str, value: &str) -> Result<()> {
        if !is_valid_name(name) {
            return Err(ShellError::Variable(format!(
                "`{name}': not a valid identifier"
            )));
        }
        if name.len() > MAX_NAME_LEN {
            return Err(ShellError::Variable(format!(
                "{name}: name longer than {MAX_NAME_LEN} bytes"
            )));
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(ShellError::Variable(format!(
                "{name}: value longer than {MAX_VALUE_LEN} bytes"
            )));
        }
        if !self.local_vars.contains_key(name) && self.local_vars.len() >= MAX_VARIABLES {
            return Err(ShellError::Variable(format!(
                "{name}: too many variables (limit {MAX_VARIABLES})"
            )));
        }

        debug!("设置变量: {}={}", name, value);
        self.local_vars.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// 设置变量并同步到进程环境
    pub fn export(&mut self, name: &str, value: &str) -> Result<()> {
        self.set(name, value)?;
        debug!("导出环境变量: {}={}", name, value);
        env::set_var(name, value);
        Ok(())
    }

    /// 从左到右一遍替换 `$0` 与 `$NAME`
    ///
    /// 未设置的变量替换为空，后面没有变量名的 `$` 原样保留；替换结果不再展开。
    pub fn expand(&self, input: &str) -> String {
        if !input.contains('$') {
            return input.to_string();
        }

        let mut result = String::with_capacity(input.len());
        let mut chars = input.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '$' {
                result.push(c);
                continue;
            }

            if chars.peek() == Some(&'0') {
                chars.next();
                result.push_str(&self.shell_name);
                continue;
            }

            let mut var_name = String::new();
            while let Some(&next_char) = chars.peek() {
                if next_char.is_ascii_alphanumeric() || next_char == '_' {
                    var_name.push(next_char);
                    chars.next();
                } else {
                    break;
                }
            }

            if var_name.is_empty() {
                result.push('$');
            } else if let Some(value) = self.get(&var_name) {
                result.push_str(&value);
            }
        }
        result
    }
}

/// 首字符为字母或下划线，其余为字母、数字或下划线
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// 左侧是以字母开头的标识符时拆分 `NAME=value`
pub fn split_assignment(word: &str) -> Option<(&str, &str)> {
    let (name, value) = word.split_once('=')?;
    let starts_with_letter = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    if starts_with_letter && is_valid_name(name) {
        Some((name, value))
    } else {
        None
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let mut vars = Variable::new("ash");
        vars.set("X", "5").unwrap();
        assert_eq!(vars.get("X").as_deref(), Some("5"));
        vars.set("X", "6").unwrap();
        assert_eq!(vars.get("X").as_deref(), Some("6"));
    }

    #[test]
    fn test_get_falls_back_to_environment() {
        env::set_var("ASH_TEST_FALLBACK_VAR", "from-env");
        let vars = Variable::new("ash");
        assert_eq!(
            vars.get("ASH_TEST_FALLBACK_VAR").as_deref(),
            Some("from-env")
        );
        assert_eq!(vars.get("ASH_TEST_SURELY_UNSET_VAR"), None);
    }

    #[test]
    fn test_expand_variables() {
        let mut vars = Variable::new("ash");
        vars.set("X", "5").unwrap();
        vars.set("NAME_1", "n").unwrap();
        assert_eq!(vars.expand("x=$X"), "x=5");
        assert_eq!(vars.expand("$X$NAME_1-end"), "5n-end");
        assert_eq!(vars.expand("$ASH_TEST_SURELY_UNSET_VAR"), "");
        assert_eq!(vars.expand("[$ASH_TEST_SURELY_UNSET_VAR]"), "[]");
    }

    #[test]
    fn test_expand_shell_name_and_bare_dollar() {
        let vars = Variable::new("ash");
        assert_eq!(vars.expand("$0"), "ash");
        assert_eq!(vars.expand("cost: 5$"), "cost: 5$");
        assert_eq!(vars.expand("$ $-"), "$ $-");
    }

    #[test]
    fn test_expand_is_not_recursive() {
        let mut vars = Variable::new("ash");
        vars.set("A", "$B").unwrap();
        vars.set("B", "deep").unwrap();
        assert_eq!(vars.expand("$A"), "$B");
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut vars = Variable::new("ash");
        assert!(vars.set("1X", "v").is_err());
        assert!(vars.set("A-B", "v").is_err());
        assert!(vars.set(&"N".repeat(MAX_NAME_LEN + 1), "v").is_err());
        assert!(vars.set("BIG", &"v".repeat(MAX_VALUE_LEN + 1)).is_err());
    }

    #[test]
    fn test_export_sets_environment() {
        let mut vars = Variable::new("ash");
        vars.export("ASH_TEST_EXPORTED", "yes").unwrap();
        assert_eq!(env::var("ASH_TEST_EXPORTED").as_deref(), Ok("yes"));
    }

    #[test]
    fn test_split_assignment() {
        assert_eq!(split_assignment("X=5"), Some(("X", "5")));
        assert_eq!(split_assignment("PATH=/a:/b=c"), Some(("PATH", "/a:/b=c")));
        assert_eq!(split_assignment("X="), Some(("X", "")));
        assert_eq!(split_assignment("_X=1"), None);
        assert_eq!(split_assignment("1X=1"), None);
        assert_eq!(split_assignment("--opt=1"), None);
        assert_eq!(split_assignment("plain"), None);
    }
}
