use dotenv::dotenv;
use log::warn;
use rustyline::EditMode;
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::shell::DEFAULT_MAX_JOBS;

pub struct Config {
    pub name: String,
    pub home: PathBuf,
    pub config_dir: PathBuf,
    pub history_file: PathBuf,
    pub rc_file: PathBuf,
    pub editor_mode: String,
    pub logger_level: String,
    pub logger_dir: PathBuf,
    pub log_to_stderr: bool,
    pub max_jobs: usize,
}

impl Config {
    fn default() -> Self {
        let home = env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/"));
        let config_dir = home.join(".config/ash");
        Config {
            name: String::from("ash"),
            history_file: home.join(".ashhistory"),
            rc_file: home.join(".ashrc"),
            logger_dir: config_dir.join("logs"),
            config_dir,
            home,
            editor_mode: String::from("emacs"),
            logger_level: String::from("warn"),
            log_to_stderr: false,
            max_jobs: DEFAULT_MAX_JOBS,
        }
    }

    pub fn new() -> Self {
        // 优先加载环境变量
        dotenv().ok();

        // 默认配置
        let mut config = Config::default();

        // 从环境变量加载配置
        if let Ok(dir) = env::var("ASH_CONFIG_DIR") {
            config.config_dir = PathBuf::from(dir);
            config.logger_dir = config.config_dir.join("logs");
        }

        if let Ok(history) = env::var("ASH_HISTORY") {
            config.history_file = PathBuf::from(history);
        }

        if let Ok(rc) = env::var("ASH_RC") {
            config.rc_file = PathBuf::from(rc);
        }

        if let Ok(editor) = env::var("ASH_EDITOR") {
            config.editor_mode = editor;
        }

        if let Ok(level) = env::var("ASH_LOG") {
            config.logger_level = level;
        }

        if let Ok(dir) = env::var("ASH_LOG_DIR") {
            config.logger_dir = PathBuf::from(dir);
        }

        config.log_to_stderr = env::var("ASH_LOG_STDERR").is_ok_and(|v| v == "1");

        if let Ok(max) = env::var("ASH_MAX_JOBS") {
            match max.parse::<usize>() {
                Ok(max) if max > 0 => config.max_jobs = max,
                _ => warn!("ASH_MAX_JOBS 无效: {}", max),
            }
        }

        // 确保历史文件目录存在
        if let Some(parent) = config.history_file.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("无法创建历史记录目录 {}: {}", parent.display(), e);
            }
        }

        config
    }

    pub fn get_edit_mode(&self) -> EditMode {
        match self.editor_mode.to_lowercase().as_str() {
            "vi" => EditMode::Vi,
            _ => EditMode::Emacs,
        }
    }
}
