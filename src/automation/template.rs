use crate::db::contact::Contact;

/// Substitutes `{placeholder}` variables in a message template against a
/// contact. Supported: `{name}`, `{firstName}`, `{phone}`, `{email}`,
/// `{year}`. Unknown placeholders pass through untouched so a typo in a
/// template is visible in the rendered message instead of silently
/// disappearing.
pub fn render(template: &str, contact: &Contact, year: i32) -> String {
    template
        .replace("{name}", &contact.name)
        .replace("{firstName}", contact.first_name())
        .replace("{phone}", contact.phone.as_deref().unwrap_or(""))
        .replace("{email}", contact.email.as_deref().unwrap_or(""))
        .replace("{year}", &year.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contact() -> Contact {
        Contact {
            name: "Maria Santos".into(),
            phone: Some("+15550001111".into()),
            email: Some("maria@example.com".into()),
            ..Contact::default()
        }
    }

    #[test]
    fn test_substitutes_all_known_placeholders() {
        let body = render(
            "Hi {firstName} ({name}), confirm {phone} / {email} in {year}",
            &contact(),
            2026,
        );
        assert_eq!(
            body,
            "Hi Maria (Maria Santos), confirm +15550001111 / maria@example.com in 2026"
        );
    }

    #[test]
    fn test_missing_optional_fields_render_empty() {
        let bare = Contact {
            name: "Ana".into(),
            ..Contact::default()
        };
        assert_eq!(render("{phone}|{email}", &bare, 2026), "|");
    }

    #[test]
    fn test_unknown_placeholder_is_left_intact() {
        assert_eq!(
            render("Hello {nickname}", &contact(), 2026),
            "Hello {nickname}"
        );
    }
}
