//! Coarse User-Agent classification for hit metadata.

/// Device class of a User-Agent: `bot`, `tablet`, `mobile` or `desktop`.
pub fn device_class(user_agent: &str) -> &'static str {
    let ua = user_agent.to_ascii_lowercase();

    if ["bot", "crawler", "spider", "curl/", "wget/"]
        .iter()
        .any(|marker| ua.contains(marker))
    {
        "bot"
    } else if ua.contains("ipad")
        || ua.contains("tablet")
        || (ua.contains("android") && !ua.contains("mobile"))
    {
        "tablet"
    } else if ua.contains("mobile") || ua.contains("iphone") || ua.contains("ipod") {
        "mobile"
    } else {
        "desktop"
    }
}

/// Browser family of a User-Agent, if recognised.
///
/// Order matters: Edge and Opera also announce Chrome, and Chrome announces
/// Safari.
pub fn browser_family(user_agent: &str) -> Option<&'static str> {
    if user_agent.contains("Edg/") || user_agent.contains("Edge/") {
        Some("Edge")
    } else if user_agent.contains("OPR/") || user_agent.contains("Opera") {
        Some("Opera")
    } else if user_agent.contains("Firefox/") || user_agent.contains("FxiOS/") {
        Some("Firefox")
    } else if user_agent.contains("Chrome/") || user_agent.contains("CriOS/") {
        Some("Chrome")
    } else if user_agent.contains("Safari/") {
        Some("Safari")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_DESKTOP: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const FIREFOX_ANDROID_TABLET: &str = "Mozilla/5.0 (Android 13; Tablet; rv:120.0) Gecko/120.0 Firefox/120.0";
    const EDGE: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
    const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn test_device_class() {
        assert_eq!(device_class(CHROME_DESKTOP), "desktop");
        assert_eq!(device_class(SAFARI_IPHONE), "mobile");
        assert_eq!(device_class(FIREFOX_ANDROID_TABLET), "tablet");
        assert_eq!(device_class(GOOGLEBOT), "bot");
        assert_eq!(device_class("curl/8.4.0"), "bot");
    }

    #[test]
    fn test_browser_family() {
        assert_eq!(browser_family(CHROME_DESKTOP), Some("Chrome"));
        assert_eq!(browser_family(SAFARI_IPHONE), Some("Safari"));
        assert_eq!(browser_family(FIREFOX_ANDROID_TABLET), Some("Firefox"));
        assert_eq!(browser_family(EDGE), Some("Edge"));
        assert_eq!(browser_family("curl/8.4.0"), None);
    }
}
