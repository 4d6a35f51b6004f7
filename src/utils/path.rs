use std::env;
use std::io;
use std::path::Path;

pub fn change_directory(target: &str) -> io::Result<()> {
    env::set_current_dir(target)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", target, e)))
}

/// 家目录及其子目录显示为 `~` 开头
pub fn display_dir(cwd: &str, home: &Path) -> String {
    let home = home.to_string_lossy();
    if home.is_empty() || home == "/" {
        return cwd.to_string();
    }
    match cwd.strip_prefix(home.as_ref()) {
        Some("") => "~".to_string(),
        Some(rest) if rest.starts_with('/') => format!("~{}", rest),
        _ => cwd.to_string(),
    }
}
