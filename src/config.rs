//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ADCHAT__*` 覆盖（双下划线表示嵌套，如 `ADCHAT__ADS__TRIGGER_THRESHOLD=6`）。
//! 所有项均为进程级静态标量，会话中途不重新加载。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub ads: AdsSection,
    pub search: SearchSection,
}

/// [app] 段：应用名与退出指令
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 输入该词（不区分大小写）即结束会话
    #[serde(default = "default_quit_command")]
    pub quit_command: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            quit_command: default_quit_command(),
        }
    }
}

fn default_quit_command() -> String {
    "quit".to_string()
}

/// [llm] 段：后端选择、回复 token 上限与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 主回复的 token 上限
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    800
}

fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
    #[serde(default = "default_stream_timeout")]
    pub stream: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
            stream: default_stream_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

fn default_stream_timeout() -> u64 {
    120
}

/// [ads] 段：对话缓冲容量、判定快照大小、触发阈值与判定调用参数
#[derive(Debug, Clone, Deserialize)]
pub struct AdsSection {
    /// 关闭后仍计数与重置，但不再调用判定与搜索
    #[serde(default = "default_ads_enabled")]
    pub enabled: bool,
    /// 对话缓冲最多保留的 Turn 条数（user 与 assistant 各算一条）
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// 送去判定的最近 Turn 条数（默认 4 组问答）
    #[serde(default = "default_snapshot_size")]
    pub snapshot_size: usize,
    /// 每隔多少个用户回合触发一次判定
    #[serde(default = "default_trigger_threshold")]
    pub trigger_threshold: usize,
    #[serde(default = "default_judge_max_tokens")]
    pub judge_max_tokens: u32,
    #[serde(default = "default_judge_temperature")]
    pub judge_temperature: f32,
    #[serde(default = "default_judge_timeout_secs")]
    pub judge_timeout_secs: u64,
    /// 商品描述截断长度（字符）
    #[serde(default = "default_description_chars")]
    pub description_chars: usize,
}

impl Default for AdsSection {
    fn default() -> Self {
        Self {
            enabled: default_ads_enabled(),
            buffer_capacity: default_buffer_capacity(),
            snapshot_size: default_snapshot_size(),
            trigger_threshold: default_trigger_threshold(),
            judge_max_tokens: default_judge_max_tokens(),
            judge_temperature: default_judge_temperature(),
            judge_timeout_secs: default_judge_timeout_secs(),
            description_chars: default_description_chars(),
        }
    }
}

fn default_ads_enabled() -> bool {
    true
}

fn default_buffer_capacity() -> usize {
    100
}

fn default_snapshot_size() -> usize {
    8
}

fn default_trigger_threshold() -> usize {
    4
}

fn default_judge_max_tokens() -> u32 {
    256
}

fn default_judge_temperature() -> f32 {
    0.2
}

fn default_judge_timeout_secs() -> u64 {
    20
}

fn default_description_chars() -> usize {
    160
}

impl AdsSection {
    pub fn judge_timeout(&self) -> Duration {
        Duration::from_secs(self.judge_timeout_secs)
    }
}

/// [search] 段：SerpApi 引擎、地区/语言、结果数与超时
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_engine")]
    pub engine: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_gl")]
    pub gl: String,
    #[serde(default = "default_hl")]
    pub hl: String,
    #[serde(default = "default_num")]
    pub num: u32,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    /// 未设置时读取环境变量 SERPAPI_KEY
    pub api_key: Option<String>,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            engine: default_engine(),
            endpoint: default_endpoint(),
            gl: default_gl(),
            hl: default_hl(),
            num: default_num(),
            timeout_secs: default_search_timeout_secs(),
            api_key: None,
        }
    }
}

fn default_engine() -> String {
    "google_shopping".to_string()
}

fn default_endpoint() -> String {
    "https://serpapi.com/search.json".to_string()
}

fn default_gl() -> String {
    "us".to_string()
}

fn default_hl() -> String {
    "en".to_string()
}

fn default_num() -> u32 {
    10
}

fn default_search_timeout_secs() -> u64 {
    15
}

impl SearchSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 配置中的 api_key 优先，其次 SERPAPI_KEY
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("SERPAPI_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

impl AppConfig {
    /// 拒绝会让状态机失去意义的取值（容量、快照、阈值、token 上限为 0）
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let checks = [
            ("ads.buffer_capacity", self.ads.buffer_capacity == 0),
            ("ads.snapshot_size", self.ads.snapshot_size == 0),
            ("ads.trigger_threshold", self.ads.trigger_threshold == 0),
            ("ads.judge_max_tokens", self.ads.judge_max_tokens == 0),
            ("llm.max_tokens", self.llm.max_tokens == 0),
        ];
        for (key, is_zero) in checks {
            if is_zero {
                return Err(config::ConfigError::Message(format!(
                    "{key} must be greater than 0"
                )));
            }
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 ADCHAT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ADCHAT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ADCHAT")
            .separator("__")
            .try_parsing(true),
    );

    let cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.validate()?;
    Ok(cfg)
}
