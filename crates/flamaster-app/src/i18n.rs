//! Request locale selection.
//!
//! # Design
//!
//! - Locale selection is a pure function of the request header, the accepted list,
//!   and the session override; nothing is captured from the application.
//! - `Accept-Language` entries are ordered by quality; `q=0` entries never match.
//! - A session override wins unconditionally, then the best header match, then the
//!   configured default.

/// Pick the locale for a request.
///
/// `accept_language` is the raw header value, `accepted` the languages the
/// application serves, and `session_override` the value stored under the
/// locale session key.
#[must_use]
pub fn resolve_locale(
    accept_language: Option<&str>,
    accepted: &[String],
    session_override: Option<&str>,
    default: &str,
) -> String {
    if let Some(locale) = session_override.map(str::trim).filter(|value| !value.is_empty()) {
        return locale.to_string();
    }
    accept_language
        .and_then(|header| best_match(header, accepted))
        .map_or_else(|| default.to_string(), ToString::to_string)
}

/// Primary language subtag of a tag (`fr-CA` becomes `fr`).
#[must_use]
pub fn primary_subtag(tag: &str) -> &str {
    tag.split(['-', '_']).next().unwrap_or(tag).trim()
}

fn best_match<'a>(header: &str, accepted: &'a [String]) -> Option<&'a str> {
    let mut preferences = parse_accept_language(header);
    // Stable sort keeps header order among equal weights.
    preferences.sort_by(|left, right| right.1.total_cmp(&left.1));

    for (tag, _) in preferences {
        if tag == "*" {
            if let Some(first) = accepted.first() {
                return Some(first);
            }
            continue;
        }
        if let Some(exact) = accepted
            .iter()
            .find(|candidate| candidate.eq_ignore_ascii_case(tag))
        {
            return Some(exact);
        }
        let primary = primary_subtag(tag);
        if let Some(partial) = accepted
            .iter()
            .find(|candidate| primary_subtag(candidate).eq_ignore_ascii_case(primary))
        {
            return Some(partial);
        }
    }
    None
}

fn parse_accept_language(header: &str) -> Vec<(&str, f32)> {
    header
        .split(',')
        .filter_map(|part| {
            let mut components = part.split(';');
            let tag = components.next()?.trim();
            if tag.is_empty() {
                return None;
            }
            let quality = components
                .filter_map(|param| param.trim().strip_prefix("q="))
                .find_map(|value| value.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            (quality > 0.0).then_some((tag, quality))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted() -> Vec<String> {
        vec!["en".to_string(), "fr".to_string()]
    }

    #[test]
    fn header_match_selects_accepted_language() {
        assert_eq!(resolve_locale(Some("fr"), &accepted(), None, "en"), "fr");
    }

    #[test]
    fn session_override_beats_header() {
        assert_eq!(
            resolve_locale(Some("fr"), &accepted(), Some("en"), "en"),
            "en"
        );
    }

    #[test]
    fn quality_values_order_preferences() {
        assert_eq!(
            resolve_locale(Some("en;q=0.4, fr;q=0.8"), &accepted(), None, "en"),
            "fr"
        );
        assert_eq!(
            resolve_locale(Some("fr;q=0, en;q=0.1"), &accepted(), None, "de"),
            "en"
        );
    }

    #[test]
    fn region_tags_fall_back_to_primary_subtag() {
        assert_eq!(
            resolve_locale(Some("fr-CA,de;q=0.5"), &accepted(), None, "en"),
            "fr"
        );
        assert_eq!(primary_subtag("pt-BR"), "pt");
    }

    #[test]
    fn wildcard_and_misses() {
        assert_eq!(resolve_locale(Some("*"), &accepted(), None, "de"), "en");
        assert_eq!(resolve_locale(Some("ja, ko"), &accepted(), None, "de"), "de");
        assert_eq!(resolve_locale(None, &accepted(), Some("  "), "de"), "de");
    }
}
