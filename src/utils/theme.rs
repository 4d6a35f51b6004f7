use colored::Colorize;
use std::collections::HashMap;

type Style = Box<dyn Fn(String) -> String>;

pub struct Theme {
    messages: HashMap<&'static str, String>,
    pub prompt_style: Style,
    pub path_style: Style,
    pub error_style: Style,
    pub warning_style: Style,
    pub success_style: Style,
}

impl Default for Theme {
    fn default() -> Self {
        let messages = HashMap::from([
            ("welcome", "Welcome to ash!".to_string()),
            (
                "first_run",
                "This looks like your first session. Aliases live in ~/.ashrc, type 'help' for the builtins.".to_string(),
            ),
            ("exit", "Bye.".to_string()),
            ("eof_signal", "exit".to_string()),
            ("interrupt_signal", "^C".to_string()),
            ("error", "ash: error".to_string()),
            ("status_error", "[error] Command exited with status".to_string()),
        ]);
        Theme {
            messages,
            prompt_style: Box::new(|s| s.bright_green().bold().to_string()),
            path_style: Box::new(|s| s.bright_blue().bold().to_string()),
            error_style: Box::new(|s| s.bright_red().bold().to_string()),
            warning_style: Box::new(|s| s.yellow().to_string()),
            success_style: Box::new(|s| s.bright_cyan().bold().to_string()),
        }
    }
}

impl Theme {
    pub fn get_message(&self, key: &str) -> String {
        self.messages.get(key).cloned().unwrap_or_default()
    }

    /// `user@host:dir$ `，root 用户以 `#` 结尾
    pub fn prompt(&self, user: &str, host: &str, dir: &str, is_root: bool) -> String {
        let symbol = if is_root { "#" } else { "$" };
        format!(
            "{}:{}{} ",
            (self.prompt_style)(format!("{}@{}", user, host)),
            (self.path_style)(dir.to_string()),
            symbol
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_layout() {
        colored::control::set_override(false);
        let theme = Theme::default();
        assert_eq!(theme.prompt("me", "box", "~/src", false), "me@box:~/src$ ");
        assert_eq!(theme.prompt("root", "box", "/", true), "root@box:/# ");
        colored::control::unset_override();
    }

    #[test]
    fn test_unknown_message_is_empty() {
        let theme = Theme::default();
        assert_eq!(theme.get_message("welcome"), "Welcome to ash!");
        assert_eq!(theme.get_message("nope"), "");
    }
}
