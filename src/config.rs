use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;

/// When an ad id gets recorded in the seen store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeenPolicy {
    /// Mark after every delivery attempt: at-most-once delivery, an ad whose
    /// only attempt failed is never retried.
    Attempt,
    /// Mark only after confirmed success: at-least-once delivery, a crash
    /// between send and mark can repeat one post.
    Delivered,
}

/// How strictly the phone filter judges an extracted number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhonePolicy {
    /// No phone check at all.
    Off,
    /// Any extracted number with at least 9 digits.
    Lenient,
    /// Only 996-prefixed 12-digit or 0-prefixed 10-digit numbers.
    Strict,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_city_slug")]
    pub city_slug: String,
    #[serde(default = "default_city_name")]
    pub city_name: String,
    #[serde(default = "default_category_path")]
    pub category_path: String,
    #[serde(default = "default_pages")]
    pub pages: u32,
    #[serde(default = "default_ads_limit")]
    pub ads_limit: usize,
    #[serde(default = "default_max_price_kgs")]
    pub max_price_kgs: u32,
    #[serde(default = "default_allowed_rooms")]
    pub allowed_rooms: Vec<u32>,
    #[serde(default = "default_owner_only")]
    pub owner_only: bool,
    #[serde(default = "default_phone_policy")]
    pub phone_policy: PhonePolicy,
    #[serde(default = "default_seen_policy")]
    pub seen_policy: SeenPolicy,
    #[serde(default = "default_seen_namespace")]
    pub seen_namespace: String,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_check_interval_seconds")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://lalafo.kg".to_string()
}

fn default_city_slug() -> String {
    "bishkek".to_string()
}

fn default_city_name() -> String {
    "Бишкек".to_string()
}

fn default_category_path() -> String {
    "kvartiry/arenda-kvartir/dolgosrochnaya-arenda-kvartir".to_string()
}

fn default_pages() -> u32 {
    3
}

fn default_ads_limit() -> usize {
    100
}

fn default_max_price_kgs() -> u32 {
    50000
}

fn default_allowed_rooms() -> Vec<u32> {
    vec![1, 2]
}

fn default_owner_only() -> bool {
    true
}

fn default_phone_policy() -> PhonePolicy {
    PhonePolicy::Lenient
}

fn default_seen_policy() -> SeenPolicy {
    SeenPolicy::Delivered
}

fn default_seen_namespace() -> String {
    "v1".to_string()
}

fn default_db_path() -> String {
    "data/seen.db".to_string()
}

fn default_check_interval_seconds() -> u64 {
    300 // 5 minutes
}

fn default_page_delay_ms() -> u64 {
    1000
}

fn default_send_delay_ms() -> u64 {
    1500
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome Safari".to_string()
}

fn parse_seen_policy(s: &str) -> Result<SeenPolicy> {
    match s.to_lowercase().as_str() {
        "attempt" => Ok(SeenPolicy::Attempt),
        "delivered" => Ok(SeenPolicy::Delivered),
        other => anyhow::bail!("Unknown seen policy '{}' (expected 'attempt' or 'delivered')", other),
    }
}

fn parse_phone_policy(s: &str) -> Result<PhonePolicy> {
    match s.to_lowercase().as_str() {
        "off" => Ok(PhonePolicy::Off),
        "lenient" => Ok(PhonePolicy::Lenient),
        "strict" => Ok(PhonePolicy::Strict),
        other => anyhow::bail!("Unknown phone policy '{}' (expected 'off', 'lenient' or 'strict')", other),
    }
}

impl Config {
    pub fn default_values() -> Self {
        Config {
            bot_token: String::new(),
            chat_id: String::new(),
            base_url: default_base_url(),
            city_slug: default_city_slug(),
            city_name: default_city_name(),
            category_path: default_category_path(),
            pages: default_pages(),
            ads_limit: default_ads_limit(),
            max_price_kgs: default_max_price_kgs(),
            allowed_rooms: default_allowed_rooms(),
            owner_only: default_owner_only(),
            phone_policy: default_phone_policy(),
            seen_policy: default_seen_policy(),
            seen_namespace: default_seen_namespace(),
            db_path: default_db_path(),
            check_interval_seconds: default_check_interval_seconds(),
            page_delay_ms: default_page_delay_ms(),
            send_delay_ms: default_send_delay_ms(),
            listen_addr: default_listen_addr(),
            tracing_level: default_tracing_level(),
            user_agent: default_user_agent(),
        }
    }

    pub fn load() -> Result<Self> {
        let config_path = "data/config.yaml";

        let mut config: Config = if let Ok(config_str) = fs::read_to_string(config_path) {
            serde_yaml::from_str(&config_str)
                .with_context(|| format!("Failed to parse {}", config_path))?
        } else {
            Config::default_values()
        };

        // Override with environment variables if present
        if let Ok(token) = env::var("TELEGRAM_BOT_TOKEN") {
            config.bot_token = token;
        }

        if let Ok(chat_id) = env::var("TELEGRAM_CHAT_ID") {
            config.chat_id = chat_id;
        }

        if let Ok(base_url) = env::var("BASE_URL") {
            config.base_url = base_url;
        }

        if let Ok(city_slug) = env::var("CITY_SLUG") {
            config.city_slug = city_slug;
        }

        if let Ok(city_name) = env::var("CITY_NAME") {
            config.city_name = city_name;
        }

        if let Ok(category_path) = env::var("CATEGORY_PATH") {
            config.category_path = category_path;
        }

        if let Ok(pages) = env::var("PAGES") {
            config.pages = pages.parse()
                .context("Failed to parse PAGES environment variable")?;
        }

        if let Ok(ads_limit) = env::var("ADS_LIMIT") {
            config.ads_limit = ads_limit.parse()
                .context("Failed to parse ADS_LIMIT environment variable")?;
        }

        if let Ok(max_price) = env::var("MAX_PRICE_KGS") {
            config.max_price_kgs = max_price.parse()
                .context("Failed to parse MAX_PRICE_KGS environment variable")?;
        }

        if let Ok(rooms) = env::var("ALLOWED_ROOMS") {
            // Comma-separated room counts; an empty value disables the filter
            config.allowed_rooms = rooms
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.parse().context("Failed to parse ALLOWED_ROOMS environment variable"))
                .collect::<Result<Vec<u32>>>()?;
        }

        if let Ok(owner_only) = env::var("OWNER_ONLY") {
            config.owner_only = owner_only.parse()
                .context("Failed to parse OWNER_ONLY environment variable")?;
        }

        if let Ok(policy) = env::var("PHONE_POLICY") {
            config.phone_policy = parse_phone_policy(&policy)?;
        }

        if let Ok(policy) = env::var("SEEN_POLICY") {
            config.seen_policy = parse_seen_policy(&policy)?;
        }

        if let Ok(namespace) = env::var("SEEN_NAMESPACE") {
            config.seen_namespace = namespace;
        }

        if let Ok(db_path) = env::var("DB_PATH") {
            config.db_path = db_path;
        }

        if let Ok(interval) = env::var("CHECK_INTERVAL_SECONDS") {
            config.check_interval_seconds = interval.parse()
                .context("Failed to parse CHECK_INTERVAL_SECONDS environment variable")?;
        }

        if let Ok(delay) = env::var("PAGE_DELAY_MS") {
            config.page_delay_ms = delay.parse()
                .context("Failed to parse PAGE_DELAY_MS environment variable")?;
        }

        if let Ok(delay) = env::var("SEND_DELAY_MS") {
            config.send_delay_ms = delay.parse()
                .context("Failed to parse SEND_DELAY_MS environment variable")?;
        }

        if let Ok(addr) = env::var("LISTEN_ADDR") {
            config.listen_addr = addr;
        }

        if let Ok(level) = env::var("TRACING_LEVEL") {
            config.tracing_level = level;
        }

        if let Ok(user_agent) = env::var("USER_AGENT") {
            config.user_agent = user_agent;
        }

        Ok(config)
    }

    /// True when Telegram credentials are set; without them the fetch and
    /// filter stages still run but nothing gets delivered.
    pub fn has_credentials(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }

    pub fn config_file_exists() -> bool {
        std::path::Path::new("data/config.yaml").exists()
    }

    pub fn create_default() -> Result<()> {
        // Ensure data directory exists
        fs::create_dir_all("data")?;

        fs::write("data/config.yaml", DEFAULT_CONFIG_TEMPLATE)?;
        Ok(())
    }
}

/// Commented starter file written on first run. Values mirror the serde
/// defaults; environment variables override anything set here.
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# lalafowatch configuration. Every field is optional: missing fields fall
# back to built-in defaults, and environment variables override the file
# (TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID, MAX_PRICE_KGS, ...).

# Telegram credentials. Left empty the watcher still fetches and filters,
# it just delivers nothing (useful for dry runs).
bot_token: ""
chat_id: ""

# Listing source
base_url: "https://lalafo.kg"
city_slug: "bishkek"
city_name: "Бишкек"
category_path: "kvartiry/arenda-kvartir/dolgosrochnaya-arenda-kvartir"

# How many index pages to walk and how many matching ads to keep per run
pages: 3
ads_limit: 100

# Filters
max_price_kgs: 50000     # 0 disables the price check
allowed_rooms: [1, 2]    # empty list disables the rooms check
owner_only: true         # reject ads classified as agency-posted
phone_policy: "lenient"  # off | lenient | strict

# Dedup store
seen_policy: "delivered"  # delivered = mark on success, attempt = mark always
seen_namespace: "v1"      # bump to invalidate previously-seen ids
db_path: "data/seen.db"

# Timing
check_interval_seconds: 300
page_delay_ms: 1000
send_delay_ms: 1500

# Service
listen_addr: "0.0.0.0:8080"
tracing_level: "info"
user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome Safari"
"#;
