use regex::Regex;

const ID_PATTERN: &str = r"[A-Za-z0-9_-]{11}";

/// Recognises YouTube watch links and extracts the 11-character video id.
///
/// Accepted shapes:
/// - `https://(www|m|music|gaming.)youtube.com/watch?...v=<id>`
/// - `https://youtube.com/(embed|v|shorts|live)/<id>`
/// - `https://(www.)youtube-nocookie.com/embed/<id>`
/// - `https://youtu.be/<id>`
pub struct YouTubeUrlValidator {
    long_form: Regex,
    short_form: Regex,
}

impl YouTubeUrlValidator {
    pub fn new() -> Self {
        let long_form = format!(
            r"^https?://(?:(?:www|m|music|gaming)\.)?(?:youtube\.com|youtube-nocookie\.com)/(?:watch\?(?:[^#]*&)?v=|embed/|v/|shorts/|live/)({id})(?:[?&#/].*)?$",
            id = ID_PATTERN
        );
        let short_form = format!(r"^https?://youtu\.be/({id})(?:[?&#/].*)?$", id = ID_PATTERN);

        Self {
            long_form: Regex::new(&long_form).expect("static youtube pattern"),
            short_form: Regex::new(&short_form).expect("static youtu.be pattern"),
        }
    }

    pub fn video_id<'a>(&self, url: &'a str) -> Option<&'a str> {
        let url = url.trim();
        self.long_form
            .captures(url)
            .or_else(|| self.short_form.captures(url))
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    pub fn is_valid(&self, url: &str) -> bool {
        self.video_id(url).is_some()
    }
}

impl Default for YouTubeUrlValidator {
    fn default() -> Self {
        Self::new()
    }
}
