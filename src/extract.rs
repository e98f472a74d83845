use crate::config::Config;
use crate::location;
use crate::models::Ad;
use rand::Rng;
use regex::Regex;
use scraper::Html;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Title used when a page yields nothing better
pub const DEFAULT_TITLE: &str = "Объявление на Lalafo";

const DESCRIPTION_MAX_CHARS: usize = 1500;
const MAX_IMAGES: usize = 10;

static AD_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-id-(\d+)").expect("valid regex"));
static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\d\s]{2,})\s*KGS").expect("valid regex"));
static CREATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}\.\d{2}\.\d{4}\s*/\s*\d{2}:\d{2})").expect("valid regex"));
static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("valid regex"));
static TITLE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static IMAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https://img\d+\.lalafo\.com/[^\s"'<>]+"#).expect("valid regex"));
static DESC_TESTID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<div[^>]+data-testid="ad-description"[^>]*>(.*?)</div>"#)
        .expect("valid regex")
});
static DESC_ITEMPROP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<p[^>]*itemprop="description"[^>]*>(.*?)</p>"#).expect("valid regex")
});
static DESC_META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta\s+name="description"\s+content="(.*?)""#).expect("valid regex")
});
static SELLER_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""sellerName"\s*:\s*"([^"]+)""#).expect("valid regex"));
static USER_JSON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""userName"\s*:\s*"([^"]+)""#).expect("valid regex"));
static SELLER_TESTID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)data-testid="seller-name"[^>]*>(.*?)</[^>]+>"#).expect("valid regex")
});
static OWNER_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)Владелец[^<]*</[^>]+>\s*<[^>]*>(.*?)</[^>]+>").expect("valid regex")
});
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+996|0)?[\s\-]*\d{3}(?:[\s\-]*\d{2}){3}").expect("valid regex")
});
static URL_IN_TEXT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)https?://\S+").expect("valid regex"));
static LALAFO_MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)lalafo\.kg").expect("valid regex"));
static BRACKET_JUNK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【[^】]*】").expect("valid regex"));
static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("valid regex"));
static STYLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("valid regex"));
static WS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Digit-plus-room-word patterns, most specific first.
static ROOMS_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("hyphen-adjective", Regex::new(r"(?i)(\d)\s*-\s*комн").expect("valid regex")),
        ("word-form", Regex::new(r"(?i)(\d)\s+комнат[аы]").expect("valid regex")),
        ("abbreviated", Regex::new(r"(?i)(\d)\s*комн").expect("valid regex")),
    ]
});

/// One way of pulling a field out of a page; chains are tried in order and
/// the first hit wins.
pub struct Strategy {
    pub name: &'static str,
    pub run: fn(&str) -> Option<String>,
}

pub fn first_match(strategies: &[Strategy], html: &str) -> Option<String> {
    for strategy in strategies {
        if let Some(value) = (strategy.run)(html) {
            tracing::trace!("Extraction strategy '{}' matched", strategy.name);
            return Some(value);
        }
    }
    None
}

pub const TITLE_STRATEGIES: &[Strategy] = &[
    Strategy { name: "h1", run: title_from_h1 },
    Strategy { name: "title-tag", run: title_from_title_tag },
];

pub const DESCRIPTION_STRATEGIES: &[Strategy] = &[
    Strategy { name: "data-testid", run: description_from_testid },
    Strategy { name: "itemprop", run: description_from_itemprop },
    Strategy { name: "meta", run: description_from_meta },
];

pub const OWNER_NAME_STRATEGIES: &[Strategy] = &[
    Strategy { name: "seller-json", run: owner_name_from_seller_json },
    Strategy { name: "user-json", run: owner_name_from_user_json },
    Strategy { name: "seller-testid", run: owner_name_from_testid },
    Strategy { name: "owner-label", run: owner_name_from_label },
];

/// Collapse an HTML fragment (or a whole page) to plain text: scripts and
/// styles dropped, tags removed, entities decoded, whitespace collapsed.
pub fn strip_tags(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, " ");
    let without_styles = STYLE_RE.replace_all(&without_scripts, " ");
    let document = Html::parse_document(&without_styles);
    let text = document.root_element().text().collect::<Vec<_>>().join(" ");
    WS_RE.replace_all(&text, " ").trim().to_string()
}

/// Detail-page links on an index page: `/{city}/ads/<slug>-id-<digits>`,
/// resolved to absolute URLs, unique, first-seen order.
pub fn listing_links(html: &str, base_url: &str, city_slug: &str) -> Vec<String> {
    let pattern = format!(r#"(/{}/ads/[^"'<>\s]+-id-\d+)"#, regex::escape(city_slug));
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let base = base_url.trim_end_matches('/');
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for m in re.find_iter(html) {
        let href = format!("{}{}", base, m.as_str());
        if seen.insert(href.clone()) {
            links.push(href);
        }
    }

    links
}

/// Numeric id from the `-id-<digits>` suffix, else the last path segment.
pub fn ad_id(url: &str) -> String {
    if let Some(caps) = AD_ID_RE.captures(url) {
        if let Some(m) = caps.get(1) {
            return m.as_str().to_string();
        }
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(url)
        .to_string()
}

/// Grouped digits immediately followed by "KGS".
pub fn price_kgs(html: &str) -> Option<u32> {
    let caps = PRICE_RE.captures(html)?;
    let digits: String = caps
        .get(1)?
        .as_str()
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

pub fn rooms(html: &str) -> Option<u32> {
    for (name, re) in ROOMS_PATTERNS.iter() {
        if let Some(caps) = re.captures(html) {
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) {
                tracing::trace!("Rooms matched by '{}' pattern", name);
                return Some(n);
            }
        }
    }
    None
}

/// Keyword-set membership: owner keyword without any agency keyword means
/// owner-posted, agency keyword without the owner keyword means
/// agency-posted, both or neither is indeterminate.
pub fn is_owner(html: &str) -> Option<bool> {
    let has_owner = html.contains("Собственник");
    let has_agency = html.contains("Риэлтор") || html.contains("Агентств");

    match (has_owner, has_agency) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}

pub fn created(html: &str) -> Option<String> {
    CREATED_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn title(html: &str) -> String {
    first_match(TITLE_STRATEGIES, html).unwrap_or_else(|| DEFAULT_TITLE.to_string())
}

fn title_from_h1(html: &str) -> Option<String> {
    let caps = H1_RE.captures(html)?;
    let text = strip_tags(caps.get(1)?.as_str());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn title_from_title_tag(html: &str) -> Option<String> {
    let caps = TITLE_TAG_RE.captures(html)?;
    let text = strip_tags(caps.get(1)?.as_str());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// CDN photo URLs, kept to the poster category, unique, capped at 10.
pub fn images(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for m in IMAGE_RE.find_iter(html) {
        let url = m.as_str();
        if !url.contains("/posters/") {
            continue;
        }
        if seen.insert(url.to_string()) {
            out.push(url.to_string());
            if out.len() >= MAX_IMAGES {
                break;
            }
        }
    }

    out
}

pub fn description(html: &str) -> Option<String> {
    let fragment = first_match(DESCRIPTION_STRATEGIES, html)?;
    let clean = clean_description(&strip_tags(&fragment));
    if clean.is_empty() {
        return None;
    }
    Some(truncate_chars(&clean, DESCRIPTION_MAX_CHARS))
}

fn description_from_testid(html: &str) -> Option<String> {
    DESC_TESTID_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn description_from_itemprop(html: &str) -> Option<String> {
    DESC_ITEMPROP_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn description_from_meta(html: &str) -> Option<String> {
    DESC_META_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Drops embedded links, self-domain mentions and 【…】 artifacts.
fn clean_description(raw: &str) -> String {
    let s = URL_IN_TEXT_RE.replace_all(raw, "");
    let s = LALAFO_MENTION_RE.replace_all(&s, "");
    let s = BRACKET_JUNK_RE.replace_all(&s, " ");
    WS_RE.replace_all(&s, " ").trim().to_string()
}

pub fn owner_name(html: &str) -> Option<String> {
    first_match(OWNER_NAME_STRATEGIES, html)
}

fn owner_name_from_seller_json(html: &str) -> Option<String> {
    SELLER_JSON_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn owner_name_from_user_json(html: &str) -> Option<String> {
    USER_JSON_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn owner_name_from_testid(html: &str) -> Option<String> {
    let caps = SELLER_TESTID_RE.captures(html)?;
    let text = strip_tags(caps.get(1)?.as_str());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn owner_name_from_label(html: &str) -> Option<String> {
    let caps = OWNER_LABEL_RE.captures(html)?;
    let text = strip_tags(caps.get(1)?.as_str());
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// First plausible Kyrgyz number in the text; anything under 9 digits is
/// noise and gets skipped.
pub fn phone_from_text(text: &str) -> Option<String> {
    for m in PHONE_RE.find_iter(text) {
        let digit_count = m.as_str().chars().filter(|c| c.is_ascii_digit()).count();
        if digit_count >= 9 {
            return Some(WS_RE.replace_all(m.as_str(), " ").trim().to_string());
        }
    }
    None
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

/// Builds a full ad record from a detail page. Extraction misses show up as
/// absent fields, never as errors.
pub fn parse_ad<R: Rng>(html: &str, url: &str, config: &Config, rng: &mut R) -> Ad {
    let page_text = strip_tags(html);
    let desc = description(html);
    let phone = desc.as_deref().and_then(phone_from_text);
    let location = location::resolve(html, &page_text, desc.as_deref(), config, rng);

    Ad {
        id: ad_id(url),
        url: url.to_string(),
        title: title(html),
        price_kgs: price_kgs(html),
        rooms: rooms(html),
        is_owner: is_owner(html),
        created_raw: created(html),
        location,
        images: images(html),
        description: desc,
        owner_name: owner_name(html),
        phone,
    }
}
