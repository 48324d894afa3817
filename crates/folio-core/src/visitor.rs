use serde::Serialize;

/// Return `true` when `path` is excluded from analytics: an exact match of an
/// admin path, or an admin path followed by `/`.
///
/// `/admin` and `/admin/dashboard` match; `/administrator` does not.
pub fn is_admin_path<S: AsRef<str>>(path: &str, admin_paths: &[S]) -> bool {
    admin_paths.iter().any(|admin| {
        let admin = admin.as_ref();
        path == admin
            || path
                .strip_prefix(admin)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Device, browser, and OS inferred from a `User-Agent` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub device: String,
    pub browser: String,
    pub os: String,
}

const BROWSERS: &[&str] = &["Chrome", "Firefox", "Safari", "Edge", "Opera"];

/// Classify a `User-Agent` string by substring markers.
///
/// An absent or empty UA yields `Desktop / Unknown / Unknown`.
pub fn parse_user_agent(user_agent: Option<&str>) -> DeviceInfo {
    let ua = match user_agent.map(str::trim) {
        Some(ua) if !ua.is_empty() => ua,
        _ => {
            return DeviceInfo {
                device: "Desktop".to_string(),
                browser: "Unknown".to_string(),
                os: "Unknown".to_string(),
            }
        }
    };

    let device = if ua.contains("iPad") {
        "Tablet"
    } else if ["Mobile", "Android", "iPhone"].iter().any(|m| ua.contains(m)) {
        "Mobile"
    } else {
        "Desktop"
    };

    let browser = BROWSERS
        .iter()
        .find(|b| ua.contains(*b))
        .copied()
        .unwrap_or("Unknown");

    // Mobile markers first: iPad UAs carry "like Mac OS X" and Android UAs
    // carry "Linux".
    let os = if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else if ua.contains("Mac OS X") {
        "macOS"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        "Unknown"
    };

    DeviceInfo {
        device: device.to_string(),
        browser: browser.to_string(),
        os: os.to_string(),
    }
}

/// Source / medium / campaign triple derived from a referer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficSourceClass {
    pub source: &'static str,
    pub medium: &'static str,
    pub campaign: &'static str,
}

struct SourceRule {
    domains: &'static [&'static str],
    class: TrafficSourceClass,
}

const SOURCE_RULES: &[SourceRule] = &[
    SourceRule {
        domains: &["google.com"],
        class: TrafficSourceClass {
            source: "Google",
            medium: "organic",
            campaign: "google-search",
        },
    },
    SourceRule {
        domains: &["facebook.com", "fb.com"],
        class: TrafficSourceClass {
            source: "Facebook",
            medium: "social",
            campaign: "facebook",
        },
    },
    SourceRule {
        domains: &["linkedin.com", "lnkd.in"],
        class: TrafficSourceClass {
            source: "LinkedIn",
            medium: "social",
            campaign: "linkedin",
        },
    },
    SourceRule {
        domains: &["twitter.com", "t.co", "x.com"],
        class: TrafficSourceClass {
            source: "Twitter",
            medium: "social",
            campaign: "twitter",
        },
    },
    SourceRule {
        domains: &["instagram.com"],
        class: TrafficSourceClass {
            source: "Instagram",
            medium: "social",
            campaign: "instagram",
        },
    },
];

const DIRECT: TrafficSourceClass = TrafficSourceClass {
    source: "Direct",
    medium: "none",
    campaign: "direct",
};

const REFERRAL: TrafficSourceClass = TrafficSourceClass {
    source: "Referral",
    medium: "referral",
    campaign: "referral",
};

/// Classify a referer into a traffic source.
///
/// Used both when aggregating at ingestion time and when grouping raw
/// referers in reports, so the two views always agree.
pub fn classify_traffic_source(referer: Option<&str>) -> TrafficSourceClass {
    let Some(host) = referer.and_then(extract_referrer_domain) else {
        return DIRECT;
    };
    let host = host.trim_start_matches("www.").trim_start_matches("m.");

    // Country-specific Google domains (google.de, google.co.uk).
    if host.starts_with("google.") || host.contains(".google.") {
        return SOURCE_RULES[0].class.clone();
    }

    SOURCE_RULES
        .iter()
        .find(|rule| {
            rule.domains
                .iter()
                .any(|d| host == *d || host.ends_with(&format!(".{d}")))
        })
        .map(|rule| rule.class.clone())
        .unwrap_or(REFERRAL)
}

/// Extract the host from a referrer URL.
///
/// Returns `None` if referrer is empty or cannot be parsed to a non-empty host.
pub fn extract_referrer_domain(referrer: &str) -> Option<String> {
    let referrer = referrer.trim();
    if referrer.is_empty() {
        return None;
    }
    let stripped = referrer
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let domain = stripped
        .split(['/', '?', '#'])
        .next()?
        .split(':')
        .next()?;
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 13_2 like Mac OS X) AppleWebKit/605.1.15 \
                           (KHTML, like Gecko) Version/13.0.3 Mobile/15E148 Safari/604.1";
    const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
    const MAC_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    #[test]
    fn admin_path_exact_and_nested() {
        let admin = ["/admin", "/dashboard"];
        assert!(is_admin_path("/admin", &admin));
        assert!(is_admin_path("/admin/dashboard", &admin));
        assert!(is_admin_path("/dashboard/projects/1", &admin));
        assert!(!is_admin_path("/administrator", &admin));
        assert!(!is_admin_path("/projects", &admin));
    }

    #[test]
    fn ipad_is_tablet_on_ios() {
        let info = parse_user_agent(Some(IPAD_UA));
        assert_eq!(info.device, "Tablet");
        assert_eq!(info.os, "iOS");
        assert_eq!(info.browser, "Safari");
    }

    #[test]
    fn android_is_mobile_on_android() {
        let info = parse_user_agent(Some(ANDROID_UA));
        assert_eq!(info.device, "Mobile");
        assert_eq!(info.os, "Android");
        assert_eq!(info.browser, "Chrome");
    }

    #[test]
    fn mac_chrome_is_desktop() {
        let info = parse_user_agent(Some(MAC_UA));
        assert_eq!(info.device, "Desktop");
        assert_eq!(info.os, "macOS");
        assert_eq!(info.browser, "Chrome");
    }

    #[test]
    fn missing_user_agent_defaults() {
        for ua in [None, Some(""), Some("   ")] {
            let info = parse_user_agent(ua);
            assert_eq!(info.device, "Desktop");
            assert_eq!(info.browser, "Unknown");
            assert_eq!(info.os, "Unknown");
        }
    }

    #[test]
    fn referer_classification() {
        assert_eq!(
            classify_traffic_source(Some("https://www.google.com/search?q=rust")).source,
            "Google"
        );
        assert_eq!(
            classify_traffic_source(Some("https://www.google.co.uk/")).medium,
            "organic"
        );
        assert_eq!(classify_traffic_source(None).source, "Direct");
        assert_eq!(classify_traffic_source(Some("")).campaign, "direct");
        assert_eq!(
            classify_traffic_source(Some("https://unknown-blog.example")).source,
            "Referral"
        );
        assert_eq!(
            classify_traffic_source(Some("https://t.co/abc")).source,
            "Twitter"
        );
        assert_eq!(
            classify_traffic_source(Some("https://m.facebook.com/story")).campaign,
            "facebook"
        );
    }

    #[test]
    fn lookalike_domains_are_referrals() {
        assert_eq!(
            classify_traffic_source(Some("https://notfacebook.com/")).source,
            "Referral"
        );
    }

    #[test]
    fn extract_referrer_domain_strips_port_and_query() {
        assert_eq!(
            extract_referrer_domain("http://Example.com:8080/a?b=c").as_deref(),
            Some("example.com")
        );
        assert_eq!(extract_referrer_domain(""), None);
    }
}
