use crate::models::CandidatePost;

/// Extensions a direct media URL's path may end with
const ALLOWED_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".gifv", ".webm"];

/// Decides whether a feed post may be downloaded at all
#[derive(Debug, Clone)]
pub struct SafetyFilter {
    media_host_prefix: String,
}

impl SafetyFilter {
    pub fn new(media_host_prefix: impl Into<String>) -> Self {
        Self {
            media_host_prefix: media_host_prefix.into(),
        }
    }

    pub fn is_unsafe(&self, post: &CandidatePost) -> bool {
        post.hidden
            || post.quarantine
            || post.banned_by.as_deref().is_some_and(|by| !by.is_empty())
            || post.score < 1
            || !post.subreddit_type.eq_ignore_ascii_case("public")
            || !self.is_media_url_safe(post.url.as_deref())
    }

    #[inline]
    pub fn is_safe(&self, post: &CandidatePost) -> bool {
        !self.is_unsafe(post)
    }

    /// A media URL must live on the trusted host and point at an image or clip file.
    pub fn is_media_url_safe(&self, url: Option<&str>) -> bool {
        let Some(url) = url.filter(|u| !u.trim().is_empty()) else {
            return false;
        };
        if !url.starts_with(&self.media_host_prefix) {
            return false;
        }

        // Query strings and fragments don't count towards the extension.
        let path = match url::Url::parse(url) {
            Ok(parsed) => parsed.path().to_ascii_lowercase(),
            Err(_) => return false,
        };
        ALLOWED_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "https://i.redd.it/";

    fn filter() -> SafetyFilter {
        SafetyFilter::new(PREFIX)
    }

    fn safe_post() -> CandidatePost {
        CandidatePost {
            subreddit: "birbs".to_string(),
            score: 5,
            subreddit_type: "public".to_string(),
            url: Some("https://i.redd.it/img.png".to_string()),
            post_hint: Some("image".to_string()),
            permalink: "/r/birbs/comments/1/".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_baseline_post_is_safe() {
        assert!(filter().is_safe(&safe_post()));
        assert!(!filter().is_unsafe(&safe_post()));
    }

    #[test]
    fn test_each_flag_makes_post_unsafe() {
        let cases: Vec<(&str, CandidatePost)> = vec![
            ("hidden", CandidatePost { hidden: true, ..safe_post() }),
            ("quarantine", CandidatePost { quarantine: true, ..safe_post() }),
            (
                "banned_by",
                CandidatePost {
                    banned_by: Some("AutoModerator".to_string()),
                    ..safe_post()
                },
            ),
            ("zero score", CandidatePost { score: 0, ..safe_post() }),
            ("negative score", CandidatePost { score: -3, ..safe_post() }),
            (
                "private subreddit",
                CandidatePost {
                    subreddit_type: "private".to_string(),
                    ..safe_post()
                },
            ),
            (
                "restricted subreddit",
                CandidatePost {
                    subreddit_type: "restricted".to_string(),
                    ..safe_post()
                },
            ),
            ("no url", CandidatePost { url: None, ..safe_post() }),
        ];

        for (name, post) in cases {
            assert!(filter().is_unsafe(&post), "{} should be unsafe", name);
            assert_eq!(filter().is_safe(&post), !filter().is_unsafe(&post));
        }
    }

    #[test]
    fn test_empty_banned_by_is_not_a_ban() {
        let post = CandidatePost {
            banned_by: Some(String::new()),
            ..safe_post()
        };
        assert!(filter().is_safe(&post));
    }

    #[test]
    fn test_subreddit_type_is_case_insensitive() {
        let post = CandidatePost {
            subreddit_type: "PUBLIC".to_string(),
            ..safe_post()
        };
        assert!(filter().is_safe(&post));
    }

    #[test]
    fn test_media_url_rules() {
        let f = filter();
        assert!(f.is_media_url_safe(Some("https://i.redd.it/a.jpg")));
        assert!(f.is_media_url_safe(Some("https://i.redd.it/a.JPEG")));
        assert!(f.is_media_url_safe(Some("https://i.redd.it/a.gifv")));
        assert!(f.is_media_url_safe(Some("https://i.redd.it/a.webm?width=640")));

        assert!(!f.is_media_url_safe(None));
        assert!(!f.is_media_url_safe(Some("")));
        assert!(!f.is_media_url_safe(Some("   ")));
        assert!(!f.is_media_url_safe(Some("https://imgur.com/a.jpg")));
        assert!(!f.is_media_url_safe(Some("http://i.redd.it/a.jpg")));
        assert!(!f.is_media_url_safe(Some("https://i.redd.it/a.mp4")));
        assert!(!f.is_media_url_safe(Some("https://i.redd.it/a")));
    }

    #[test]
    fn test_unsafe_url_wins_over_everything_else() {
        let post = CandidatePost {
            score: 10_000,
            url: Some("https://example.com/birb.png".to_string()),
            ..safe_post()
        };
        assert!(filter().is_unsafe(&post));
    }

    #[test]
    fn test_prefix_is_configurable() {
        let f = SafetyFilter::new("https://trusted.host/");
        let post = CandidatePost {
            url: Some("https://trusted.host/img.png".to_string()),
            ..safe_post()
        };
        assert!(f.is_safe(&post));
        assert!(filter().is_unsafe(&post));
    }
}
