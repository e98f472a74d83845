use crate::models::Ad;

/// Telegram's caption limit; also applied to plain text messages.
pub const CAPTION_MAX_CHARS: usize = 1024;

/// Renders the message text for a delivered ad. Field order is fixed;
/// absent optional fields drop their lines. The result is HTML-escaped
/// per field (delivery uses parse_mode=HTML) and hard-truncated to the
/// caption cap by character count.
pub fn build(ad: &Ad) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("📍 <b>{}</b>", escape(&ad.location)));
    lines.push(String::new());
    lines.push(format!("🛏 {}", rooms_to_words(ad.rooms)));
    lines.push("🏠 Квартира • Долгосрочная аренда".to_string());
    lines.push(String::new());

    let price = match ad.price_kgs {
        Some(p) => format!("{} KGS", p),
        None => "Цена не указана".to_string(),
    };
    lines.push(format!("💰 <b>{}</b>", price));

    if let Some(name) = &ad.owner_name {
        lines.push(format!("👤 Контакт: {}", escape(name)));
    }

    let phone = ad.phone.as_deref().unwrap_or("не указан");
    lines.push(format!("📞 Телефон: {}", escape(phone)));

    if let Some(created) = &ad.created_raw {
        lines.push(format!("🕒 {}", escape(created)));
    }

    if let Some(desc) = &ad.description {
        lines.push(String::new());
        lines.push(format!("ℹ️ {}", escape(desc)));
    }

    truncate_chars(&lines.join("\n"), CAPTION_MAX_CHARS)
}

pub fn rooms_to_words(rooms: Option<u32>) -> String {
    match rooms {
        Some(1) => "одна комната".to_string(),
        Some(2) => "две комнаты".to_string(),
        Some(n) => format!("{} комнат", n),
        None => "квартира".to_string(),
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ad() -> Ad {
        Ad {
            id: "98765432".to_string(),
            url: "https://lalafo.kg/bishkek/ads/kvartira-id-98765432".to_string(),
            title: "Сдается 2-комнатная квартира".to_string(),
            price_kgs: Some(45000),
            rooms: Some(2),
            is_owner: Some(true),
            created_raw: Some("16.11.2025 / 16:28".to_string()),
            location: "Бишкек, Тунгуч".to_string(),
            images: Vec::new(),
            description: Some("Уютная квартира на долгий срок.".to_string()),
            owner_name: Some("Элмира".to_string()),
            phone: Some("+996 555 12 34 56".to_string()),
        }
    }

    #[test]
    fn test_full_caption_field_order() {
        let caption = build(&ad());
        let expected = "📍 <b>Бишкек, Тунгуч</b>\n\
                        \n\
                        🛏 две комнаты\n\
                        🏠 Квартира • Долгосрочная аренда\n\
                        \n\
                        💰 <b>45000 KGS</b>\n\
                        👤 Контакт: Элмира\n\
                        📞 Телефон: +996 555 12 34 56\n\
                        🕒 16.11.2025 / 16:28\n\
                        \n\
                        ℹ️ Уютная квартира на долгий срок.";
        assert_eq!(caption, expected);
    }

    #[test]
    fn test_optional_lines_dropped() {
        let mut a = ad();
        a.owner_name = None;
        a.created_raw = None;
        a.description = None;
        let caption = build(&a);
        assert!(!caption.contains("👤"));
        assert!(!caption.contains("🕒"));
        assert!(!caption.contains("ℹ️"));
        assert!(caption.contains("📞 Телефон: +996 555 12 34 56"));
    }

    #[test]
    fn test_missing_price_and_phone_placeholders() {
        let mut a = ad();
        a.price_kgs = None;
        a.phone = None;
        let caption = build(&a);
        assert!(caption.contains("💰 <b>Цена не указана</b>"));
        assert!(caption.contains("📞 Телефон: не указан"));
    }

    #[test]
    fn test_rooms_to_words() {
        assert_eq!(rooms_to_words(Some(1)), "одна комната");
        assert_eq!(rooms_to_words(Some(2)), "две комнаты");
        assert_eq!(rooms_to_words(Some(4)), "4 комнат");
        assert_eq!(rooms_to_words(None), "квартира");
    }

    #[test]
    fn test_html_escaping() {
        let mut a = ad();
        a.owner_name = Some("A & B <Realty>".to_string());
        let caption = build(&a);
        assert!(caption.contains("A &amp; B &lt;Realty&gt;"));
    }

    #[test]
    fn test_caption_never_exceeds_cap() {
        let mut a = ad();
        a.description = Some("ж".repeat(1500));
        let caption = build(&a);
        assert_eq!(caption.chars().count(), CAPTION_MAX_CHARS);
    }
}
