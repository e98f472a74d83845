use crate::config::{Config, PhonePolicy};
use crate::models::Ad;
use regex::Regex;
use std::sync::LazyLock;

/// Why an ad was dropped. Not an error: rejected ads are logged and skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Rooms,
    Price,
    Agency,
    Phone,
}

static THREE_PLUS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(тр[её]хкомнатн|четыр[её]хкомнатн|пятикомнатн|многокомнатн|[3-9]\s*-?\s*комнатн)")
        .expect("valid regex")
});
static ONE_ROOM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(однокомнатн|1\s*-\s*комнатн|1\s+комн)").expect("valid regex")
});
static TWO_ROOM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(двухкомнатн|2\s*-\s*комнатн|2\s+комн)").expect("valid regex")
});

/// Rooms, price, owner, phone — in that order, first failure wins.
pub fn check(ad: &Ad, config: &Config) -> Result<(), Rejection> {
    if !config.allowed_rooms.is_empty() && !rooms_eligible(ad, &config.allowed_rooms) {
        return Err(Rejection::Rooms);
    }

    if config.max_price_kgs > 0 {
        match ad.price_kgs {
            Some(price) if price <= config.max_price_kgs => {}
            _ => return Err(Rejection::Price),
        }
    }

    // Only an explicit agency classification rejects; indeterminate passes
    if config.owner_only && ad.is_owner == Some(false) {
        return Err(Rejection::Agency);
    }

    if !phone_ok(ad.phone.as_deref(), config.phone_policy) {
        return Err(Rejection::Phone);
    }

    Ok(())
}

fn rooms_eligible(ad: &Ad, allowed: &[u32]) -> bool {
    if let Some(rooms) = ad.rooms {
        return allowed.contains(&rooms);
    }

    // Second chance: the structured count is missing, classify from
    // title + description phrasing. Three-or-more phrasing always rejects,
    // no signal at all rejects too.
    let text = match &ad.description {
        Some(desc) => format!("{} {}", ad.title, desc),
        None => ad.title.clone(),
    };

    if THREE_PLUS_RE.is_match(&text) {
        return false;
    }
    if allowed.contains(&1) && ONE_ROOM_RE.is_match(&text) {
        return true;
    }
    if allowed.contains(&2) && TWO_ROOM_RE.is_match(&text) {
        return true;
    }
    false
}

fn phone_ok(phone: Option<&str>, policy: PhonePolicy) -> bool {
    match policy {
        PhonePolicy::Off => true,
        PhonePolicy::Lenient => match phone {
            Some(p) => p.chars().filter(|c| c.is_ascii_digit()).count() >= 9,
            None => false,
        },
        PhonePolicy::Strict => match phone {
            Some(p) => {
                let digits: String = p.chars().filter(|c| c.is_ascii_digit()).collect();
                (digits.len() == 12 && digits.starts_with("996"))
                    || (digits.len() == 10 && digits.starts_with('0'))
            }
            None => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad() -> Ad {
        Ad {
            id: "1".to_string(),
            url: "https://lalafo.kg/bishkek/ads/kvartira-id-1".to_string(),
            title: "Сдается квартира".to_string(),
            price_kgs: Some(40000),
            rooms: Some(2),
            is_owner: Some(true),
            created_raw: None,
            location: "Бишкек".to_string(),
            images: Vec::new(),
            description: None,
            owner_name: None,
            phone: Some("+996 555 12 34 56".to_string()),
        }
    }

    fn config() -> Config {
        Config::default_values()
    }

    #[test]
    fn test_passing_ad() {
        assert_eq!(check(&ad(), &config()), Ok(()));
    }

    #[test]
    fn test_rooms_outside_allowed_set() {
        let mut a = ad();
        a.rooms = Some(3);
        assert_eq!(check(&a, &config()), Err(Rejection::Rooms));
    }

    #[test]
    fn test_rooms_filter_disabled_by_empty_set() {
        let mut a = ad();
        a.rooms = Some(5);
        let mut cfg = config();
        cfg.allowed_rooms = Vec::new();
        assert_eq!(check(&a, &cfg), Ok(()));
    }

    #[test]
    fn test_textual_second_chance_accepts_one_room() {
        let mut a = ad();
        a.rooms = None;
        a.title = "Сдается однокомнатная квартира".to_string();
        assert_eq!(check(&a, &config()), Ok(()));
    }

    #[test]
    fn test_textual_second_chance_accepts_two_room_hyphen() {
        let mut a = ad();
        a.rooms = None;
        a.description = Some("Сдается 2-комнатная в центре".to_string());
        assert_eq!(check(&a, &config()), Ok(()));
    }

    #[test]
    fn test_three_plus_phrasing_never_eligible() {
        for phrase in [
            "трехкомнатная квартира",
            "трёхкомнатная квартира",
            "четырехкомнатная квартира",
            "многокомнатная квартира",
            "5-комнатная квартира",
        ] {
            let mut a = ad();
            a.rooms = None;
            a.title = phrase.to_string();
            assert_eq!(check(&a, &config()), Err(Rejection::Rooms), "{}", phrase);
        }
    }

    #[test]
    fn test_no_rooms_signal_rejects() {
        let mut a = ad();
        a.rooms = None;
        a.title = "Сдается квартира".to_string();
        assert_eq!(check(&a, &config()), Err(Rejection::Rooms));
    }

    #[test]
    fn test_price_over_ceiling() {
        let mut a = ad();
        a.price_kgs = Some(50001);
        assert_eq!(check(&a, &config()), Err(Rejection::Price));
    }

    #[test]
    fn test_price_missing() {
        let mut a = ad();
        a.price_kgs = None;
        assert_eq!(check(&a, &config()), Err(Rejection::Price));
    }

    #[test]
    fn test_price_ceiling_zero_disables() {
        let mut a = ad();
        a.price_kgs = None;
        let mut cfg = config();
        cfg.max_price_kgs = 0;
        assert_eq!(check(&a, &cfg), Ok(()));
    }

    #[test]
    fn test_agency_rejected_indeterminate_passes() {
        let mut a = ad();
        a.is_owner = Some(false);
        assert_eq!(check(&a, &config()), Err(Rejection::Agency));

        a.is_owner = None;
        assert_eq!(check(&a, &config()), Ok(()));
    }

    #[test]
    fn test_owner_only_off_passes_agency() {
        let mut a = ad();
        a.is_owner = Some(false);
        let mut cfg = config();
        cfg.owner_only = false;
        assert_eq!(check(&a, &cfg), Ok(()));
    }

    #[test]
    fn test_phone_lenient() {
        let mut a = ad();
        a.phone = None;
        assert_eq!(check(&a, &config()), Err(Rejection::Phone));

        a.phone = Some("555 12 34".to_string()); // 8 digits
        assert_eq!(check(&a, &config()), Err(Rejection::Phone));

        a.phone = Some("0555 12 34 56".to_string());
        assert_eq!(check(&a, &config()), Ok(()));
    }

    #[test]
    fn test_phone_strict() {
        let mut cfg = config();
        cfg.phone_policy = PhonePolicy::Strict;

        let mut a = ad();
        a.phone = Some("+996 555 12 34 56".to_string()); // 12 digits, 996 prefix
        assert_eq!(check(&a, &cfg), Ok(()));

        a.phone = Some("0555 12 34 56".to_string()); // 10 digits, 0 prefix
        assert_eq!(check(&a, &cfg), Ok(()));

        a.phone = Some("555 12 34 56".to_string()); // 9 digits, no prefix
        assert_eq!(check(&a, &cfg), Err(Rejection::Phone));
    }

    #[test]
    fn test_phone_off() {
        let mut cfg = config();
        cfg.phone_policy = PhonePolicy::Off;
        let mut a = ad();
        a.phone = None;
        assert_eq!(check(&a, &cfg), Ok(()));
    }

    #[test]
    fn test_filter_order_rooms_before_price() {
        let mut a = ad();
        a.rooms = Some(4);
        a.price_kgs = None;
        assert_eq!(check(&a, &config()), Err(Rejection::Rooms));
    }
}
